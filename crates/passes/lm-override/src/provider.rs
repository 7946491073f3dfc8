//! Rule index and lookup

use crate::document::{ClassMeta, MetaDocument, MethodMeta, NamespaceMeta, PropertyMeta};
use crate::error::{MetadataError, RuleLocation};
use crate::template::CodeTemplate;
use indexmap::{IndexMap, IndexSet};
use lm_source::{Accessibility, SemanticModel, SymbolId, SymbolKind};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// What a lookup asks for
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum LookupKind {
    /// Output name replacing the member's own
    Rename,
    /// Code replacing the whole access or call
    CodeTemplate,
    /// Whether call sites drop trailing generic arguments
    IgnoreGenericArgs,
}

/// A lookup hit
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action<'rules> {
    /// Use this name
    Rename(&'rules str),
    /// Expand this template
    Template(&'rules CodeTemplate),
    /// Pass no generic arguments
    IgnoreGenericArgs,
}

#[derive(Debug, Clone)]
struct MethodRule {
    meta: MethodMeta,
    template: Option<CodeTemplate>,
    location: RuleLocation,
}

impl MethodRule {
    fn action(&self, kind: LookupKind) -> Option<Action<'_>> {
        match kind {
            LookupKind::Rename => self.meta.rename.as_deref().map(Action::Rename),
            LookupKind::CodeTemplate => self.template.as_ref().map(Action::Template),
            LookupKind::IgnoreGenericArgs => self.meta.ignore_generic.then_some(Action::IgnoreGenericArgs),
        }
    }
}

#[derive(Debug, Clone)]
struct PropertyRule {
    meta: PropertyMeta,
    get: Option<CodeTemplate>,
    set: Option<CodeTemplate>,
    location: RuleLocation,
}

#[derive(Debug, Clone)]
struct FieldRule {
    template: Option<CodeTemplate>,
    location: RuleLocation,
}

#[derive(Debug, Clone)]
struct TypeRules {
    rename: Option<String>,
    location: RuleLocation,
    fields: IndexMap<String, FieldRule>,
    properties: IndexMap<String, PropertyRule>,
    methods: IndexMap<String, Vec<MethodRule>>,
}

impl TypeRules {
    fn member_location(&self, member: &str, index: usize) -> RuleLocation {
        RuleLocation {
            member: Some(member.to_owned()),
            index,
            ..self.location.clone()
        }
    }

    /// Fields and properties are separate namespaces; a name may repeat
    /// across them but not within one
    fn check_member_name(
        &self,
        name: &str,
        kind: &str,
        index: usize,
        previous: Option<&RuleLocation>,
    ) -> Result<(), MetadataError> {
        if name.is_empty() {
            return Err(MetadataError::MalformedMetadataDocument {
                message: format!("{kind} name must not be empty"),
                location: self.member_location(name, index),
                previous: None,
            });
        }
        if let Some(previous) = previous {
            return Err(MetadataError::MalformedMetadataDocument {
                message: format!("{kind} `{name}` already exists"),
                location: self.member_location(name, index),
                previous: Some(previous.clone()),
            });
        }
        Ok(())
    }
}

/// Override rules from every loaded document, immutable once loading ends
#[derive(Debug, Clone, Default)]
pub struct OverrideProvider {
    namespaces: IndexMap<String, (String, RuleLocation)>,
    types: IndexMap<String, TypeRules>,
    export_attributes: IndexSet<String>,
}

impl OverrideProvider {
    /// Provider without rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate every document in order
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, MetadataError> {
        let mut provider = Self::new();
        for path in paths {
            let path = path.as_ref();
            let label = path.display().to_string();
            let text = fs::read_to_string(path).map_err(|source| MetadataError::Io {
                path: label.clone(),
                source,
            })?;
            let document = Self::parse_document(&label, &text)?;
            provider.add_document(&label, document)?;
        }
        Ok(provider)
    }

    /// Decode a document; `.json` paths are JSON, everything else TOML
    pub fn parse_document(path: &str, text: &str) -> Result<MetaDocument, MetadataError> {
        let parsed = if Path::new(path)
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
        {
            serde_json::from_str(text).map_err(|error| error.to_string())
        } else {
            toml::from_str(text).map_err(|error| error.to_string())
        };
        parsed.map_err(|message| MetadataError::Parse {
            path: path.to_owned(),
            message,
        })
    }

    /// Validate and index one document
    pub fn add_document(&mut self, path: &str, document: MetaDocument) -> Result<(), MetadataError> {
        for (index, namespace) in document.assembly.namespaces.iter().enumerate() {
            self.add_namespace(path, index, namespace)?;
        }
        for (index, attribute) in document.export.attributes.iter().enumerate() {
            if attribute.is_empty() {
                return Err(MetadataError::MalformedMetadataDocument {
                    message: "exported attribute name must not be empty".to_owned(),
                    location: RuleLocation {
                        document: path.to_owned(),
                        namespace: "export".to_owned(),
                        index,
                        ..RuleLocation::default()
                    },
                    previous: None,
                });
            }
            self.export_attributes.insert(attribute.clone());
        }
        debug!(
            document = path,
            types = self.types.len(),
            exports = self.export_attributes.len(),
            "loaded override metadata"
        );
        Ok(())
    }

    fn add_namespace(&mut self, path: &str, index: usize, namespace: &NamespaceMeta) -> Result<(), MetadataError> {
        let location = RuleLocation {
            document: path.to_owned(),
            namespace: namespace.name.clone(),
            index,
            ..RuleLocation::default()
        };
        if namespace.name.is_empty() {
            return Err(MetadataError::MalformedMetadataDocument {
                message: "namespace name must not be empty".to_owned(),
                location,
                previous: None,
            });
        }
        if let Some(rename) = &namespace.rename {
            if let Some((_, previous)) = self.namespaces.get(&namespace.name) {
                return Err(MetadataError::MalformedMetadataDocument {
                    message: format!("namespace `{}` is renamed twice", namespace.name),
                    location,
                    previous: Some(previous.clone()),
                });
            }
            self.namespaces
                .insert(namespace.name.clone(), (rename.clone(), location.clone()));
        }
        for (class_index, class) in namespace.classes.iter().enumerate() {
            let class_location = RuleLocation {
                class: Some(class.name.clone()),
                index: class_index,
                ..location.clone()
            };
            self.add_class(&namespace.name, class, class_location)?;
        }
        Ok(())
    }

    fn add_class(&mut self, namespace: &str, class: &ClassMeta, location: RuleLocation) -> Result<(), MetadataError> {
        if class.name.is_empty() {
            return Err(MetadataError::MalformedMetadataDocument {
                message: format!("class name in namespace `{namespace}` must not be empty"),
                location,
                previous: None,
            });
        }
        let key = format!("{namespace}.{}", class.name);
        if let Some(previous) = self.types.get(&key) {
            return Err(MetadataError::MalformedMetadataDocument {
                message: format!("type `{key}` already exists"),
                location,
                previous: Some(previous.location.clone()),
            });
        }

        let mut rules = TypeRules {
            rename: class.rename.clone(),
            location,
            fields: IndexMap::new(),
            properties: IndexMap::new(),
            methods: IndexMap::new(),
        };
        for (index, field) in class.fields.iter().enumerate() {
            let previous = rules.fields.get(&field.name).map(|rule| &rule.location);
            rules.check_member_name(&field.name, "field", index, previous)?;
            let rule = FieldRule {
                template: field.template.as_deref().map(CodeTemplate::parse),
                location: rules.member_location(&field.name, index),
            };
            rules.fields.insert(field.name.clone(), rule);
        }
        for (index, property) in class.properties.iter().enumerate() {
            let previous = rules.properties.get(&property.name).map(|rule| &rule.location);
            rules.check_member_name(&property.name, "property", index, previous)?;
            let rule = PropertyRule {
                get: property.get.as_ref().map(|get| CodeTemplate::parse(&get.template)),
                set: property.set.as_ref().map(|set| CodeTemplate::parse(&set.template)),
                meta: property.clone(),
                location: rules.member_location(&property.name, index),
            };
            rules.properties.insert(property.name.clone(), rule);
        }
        for (index, method) in class.methods.iter().enumerate() {
            let location = rules.member_location(&method.name, index);
            if method.name.is_empty() {
                return Err(MetadataError::MalformedMetadataDocument {
                    message: "method name must not be empty".to_owned(),
                    location,
                    previous: None,
                });
            }
            let overloads = rules.methods.entry(method.name.clone()).or_default();
            if let Some(clash) = overloads
                .iter()
                .find(|rule| rule.meta.discriminators() == method.discriminators())
            {
                return Err(MetadataError::AmbiguousOverrideRule {
                    member: format!("{key}.{}", method.name),
                    first: clash.location.clone(),
                    second: location,
                });
            }
            overloads.push(MethodRule {
                template: method.template.as_deref().map(CodeTemplate::parse),
                meta: method.clone(),
                location,
            });
        }
        trace!(key = %key, "indexed type rules");
        self.types.insert(key, rules);
        Ok(())
    }

    /// Number of indexed type rule sets
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Whether no document contributed anything
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.namespaces.is_empty() && self.export_attributes.is_empty()
    }

    /// Whether uses of this attribute type are exported
    pub fn is_export_attribute(&self, full_name: &str) -> bool {
        self.export_attributes.contains(full_name)
    }

    /// Output name of a namespace
    pub fn namespace_rename(&self, namespace: &str) -> Option<&str> {
        self.namespaces.get(namespace).map(|(rename, _)| rename.as_str())
    }

    fn type_key(model: &SemanticModel, type_id: SymbolId) -> String {
        let name = model.full_name(type_id);
        match model.type_detail(type_id) {
            Some(detail) if !detail.type_params.is_empty() => format!("{name}^{}", detail.type_params.len()),
            _ => name,
        }
    }

    fn rules_for(&self, model: &SemanticModel, member: SymbolId) -> Option<&TypeRules> {
        let owner = model.declaring_type(member)?;
        self.types.get(&Self::type_key(model, owner))
    }

    /// Output name of a type not compiled from source
    pub fn type_rename(&self, model: &SemanticModel, type_id: SymbolId) -> Option<&str> {
        if !model.symbol(type_id).may_have_override() {
            return None;
        }
        self.types
            .get(&Self::type_key(model, type_id))
            .and_then(|rules| rules.rename.as_deref())
    }

    /// Look up an action for a member symbol
    ///
    /// Only public members not compiled from source are eligible. A method
    /// without a direct rule falls back to the method it overrides, then to
    /// the interface methods it implements. Two method rules that both match
    /// and disagree on the requested action are ambiguous.
    pub fn lookup(
        &self,
        model: &SemanticModel,
        symbol: SymbolId,
        kind: LookupKind,
    ) -> Result<Option<Action<'_>>, MetadataError> {
        let data = model.symbol(symbol);
        let action = match data.kind {
            SymbolKind::Method => return self.method_action(model, symbol, kind),
            SymbolKind::Property => self.property_rule(model, symbol).and_then(|rule| match kind {
                LookupKind::Rename => rule.meta.rename.as_deref().map(Action::Rename),
                LookupKind::CodeTemplate => rule.get.as_ref().map(Action::Template),
                LookupKind::IgnoreGenericArgs => None,
            }),
            SymbolKind::Field if data.may_have_override() && kind == LookupKind::CodeTemplate => self
                .rules_for(model, symbol)
                .and_then(|rules| rules.fields.get(&data.name))
                .and_then(|rule| rule.template.as_ref())
                .map(Action::Template),
            _ => None,
        };
        Ok(action)
    }

    fn method_action(
        &self,
        model: &SemanticModel,
        method: SymbolId,
        kind: LookupKind,
    ) -> Result<Option<Action<'_>>, MetadataError> {
        let data = model.symbol(method);
        if data.accessibility != Accessibility::Public {
            return Ok(None);
        }
        if !data.from_code
            && let Some(action) = self.direct_method_action(model, method, kind)?
        {
            trace!(method = %data.name, ?kind, "override rule matched");
            return Ok(Some(action));
        }
        let Some(detail) = model.method(method) else {
            return Ok(None);
        };
        if let Some(overridden) = detail.overridden {
            return self.method_action(model, overridden, kind);
        }
        for interface_method in &detail.implements {
            if let Some(action) = self.method_action(model, *interface_method, kind)? {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    fn direct_method_action(
        &self,
        model: &SemanticModel,
        method: SymbolId,
        kind: LookupKind,
    ) -> Result<Option<Action<'_>>, MetadataError> {
        let Some(rules) = self.rules_for(model, method) else {
            return Ok(None);
        };
        let Some(overloads) = rules.methods.get(model.name(method)) else {
            return Ok(None);
        };
        if let [only] = overloads.as_slice()
            && only.meta.is_unconditional()
        {
            return Ok(only.action(kind));
        }
        let mut matching = overloads
            .iter()
            .filter(|rule| signature_matches(&rule.meta, model, method));
        let Some(first) = matching.next() else {
            return Ok(None);
        };
        let action = first.action(kind);
        for other in matching {
            let other_action = other.action(kind);
            if other_action.is_some() && action.is_some() && other_action != action {
                let member = model.declaring_type(method).map_or_else(
                    || model.name(method).to_owned(),
                    |owner| format!("{}.{}", model.full_name(owner), model.name(method)),
                );
                return Err(MetadataError::AmbiguousOverrideRule {
                    member,
                    first: first.location.clone(),
                    second: other.location.clone(),
                });
            }
        }
        Ok(action)
    }

    /// Output name of a method, if a rule renames it
    pub fn method_rename(&self, model: &SemanticModel, method: SymbolId) -> Result<Option<&str>, MetadataError> {
        Ok(match self.method_action(model, method, LookupKind::Rename)? {
            Some(Action::Rename(name)) => Some(name),
            _ => None,
        })
    }

    /// Template replacing calls of a method
    pub fn method_template(
        &self,
        model: &SemanticModel,
        method: SymbolId,
    ) -> Result<Option<&CodeTemplate>, MetadataError> {
        Ok(match self.method_action(model, method, LookupKind::CodeTemplate)? {
            Some(Action::Template(template)) => Some(template),
            _ => None,
        })
    }

    /// Whether calls of a method drop their generic arguments
    pub fn ignores_generic_args(&self, model: &SemanticModel, method: SymbolId) -> Result<bool, MetadataError> {
        Ok(self
            .method_action(model, method, LookupKind::IgnoreGenericArgs)?
            .is_some())
    }

    /// Template replacing reads of a field
    pub fn field_template(&self, model: &SemanticModel, field: SymbolId) -> Option<&CodeTemplate> {
        let data = model.symbol(field);
        if !data.may_have_override() {
            return None;
        }
        self.rules_for(model, field)?.fields.get(&data.name)?.template.as_ref()
    }

    fn property_rule(&self, model: &SemanticModel, property: SymbolId) -> Option<&PropertyRule> {
        let data = model.symbol(property);
        if !data.may_have_override() {
            return None;
        }
        self.rules_for(model, property)?.properties.get(&data.name)
    }

    /// Output name of a property, if a rule renames it
    pub fn property_rename(&self, model: &SemanticModel, property: SymbolId) -> Option<&str> {
        self.property_rule(model, property)?.meta.rename.as_deref()
    }

    /// Template replacing a property read (`is_get`) or write
    pub fn property_template(&self, model: &SemanticModel, property: SymbolId, is_get: bool) -> Option<&CodeTemplate> {
        let rule = self.property_rule(model, property)?;
        if is_get { rule.get.as_ref() } else { rule.set.as_ref() }
    }

    /// Forced field (`Some(true)`) or accessor (`Some(false)`) lowering
    pub fn property_is_field(&self, model: &SemanticModel, property: SymbolId) -> Option<bool> {
        self.property_rule(model, property)?.meta.is_field
    }
}

fn signature_matches(rule: &MethodMeta, model: &SemanticModel, method: SymbolId) -> bool {
    let Some(detail) = model.method(method) else {
        return false;
    };
    let params = model.params(method);
    if rule.arg_count.is_some_and(|count| count != params.len()) {
        return false;
    }
    if rule
        .generic_arg_count
        .is_some_and(|count| count != detail.type_params.len())
    {
        return false;
    }
    if let Some(ret) = rule.ret_type.as_deref()
        && !ret.is_empty()
        && model.type_match_name(&detail.return_type) != ret
    {
        return false;
    }
    if let Some(args) = &rule.args {
        if args.len() != params.len() {
            return false;
        }
        let all_match = args.iter().zip(params).all(|(expected, param)| {
            model
                .type_of(*param)
                .is_some_and(|ty| model.type_match_name(ty) == *expected)
        });
        if !all_match {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_source::{ModelBuilder, TypeRef};

    fn external_math(builder: &mut ModelBuilder) -> (SymbolId, SymbolId, SymbolId, SymbolId) {
        let math = builder.external_class("System", "Math");
        let int = builder.int();
        let one = builder.method(math, "Max", &[("a", int.clone())], int.clone());
        let two = builder.method(math, "Max", &[("a", int.clone()), ("b", int.clone())], int.clone());
        let three = builder.method(
            math,
            "Max",
            &[("a", int.clone()), ("b", int.clone()), ("c", int.clone())],
            int.clone(),
        );
        for method in [one, two, three] {
            builder.make_public(method).make_static(method);
        }
        (math, one, two, three)
    }

    fn provider(toml: &str) -> OverrideProvider {
        let document = OverrideProvider::parse_document("core.toml", toml);
        let mut provider = OverrideProvider::new();
        let added = document.and_then(|document| provider.add_document("core.toml", document));
        assert!(added.is_ok(), "{added:?}");
        provider
    }

    #[test]
    fn test_single_unconditional_rule_matches_every_overload() {
        let mut builder = ModelBuilder::new();
        let (_, one, two, three) = external_math(&mut builder);
        let model = builder.finish();
        let provider = provider(
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Math"
            [[assembly.namespace.class.method]]
            name = "Max"
            rename = "max"
            "#,
        );

        for method in [one, two, three] {
            assert_eq!(provider.method_rename(&model, method).ok().flatten(), Some("max"));
        }
    }

    #[test]
    fn test_count_discriminated_rules_fail_closed() {
        let mut builder = ModelBuilder::new();
        let (_, one, two, three) = external_math(&mut builder);
        let model = builder.finish();
        let provider = provider(
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Math"
            [[assembly.namespace.class.method]]
            name = "Max"
            arg-count = 2
            template = "math.max({0}, {1})"
            [[assembly.namespace.class.method]]
            name = "Max"
            arg-count = 3
            template = "math.max({0}, {1}, {2})"
            "#,
        );

        let source = |method| {
            provider
                .method_template(&model, method)
                .ok()
                .flatten()
                .map(CodeTemplate::source)
        };
        assert_eq!(source(two), Some("math.max({0}, {1})"));
        assert_eq!(source(three), Some("math.max({0}, {1}, {2})"));
        assert_eq!(source(one), None);
    }

    #[test]
    fn test_override_falls_back_to_base_rule() {
        let mut builder = ModelBuilder::new();
        let object = builder.external_class("System", "Object");
        let string = builder.string();
        let base = builder.method(object, "ToString", &[], string.clone());
        builder.make_public(base);
        let point = builder.class("App", "Point");
        let derived = builder.method(point, "ToString", &[], string);
        builder.make_public(derived);
        builder.set_overridden(derived, base);
        let private = builder.method(point, "Hidden", &[], TypeRef::Void);
        builder.set_overridden(private, base);
        let model = builder.finish();
        let provider = provider(
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Object"
            [[assembly.namespace.class.method]]
            name = "ToString"
            rename = "__tostring"
            "#,
        );

        assert_eq!(provider.method_rename(&model, derived).ok().flatten(), Some("__tostring"));
        assert_eq!(provider.method_rename(&model, private).ok().flatten(), None);
    }

    #[test]
    fn test_disagreeing_matches_are_ambiguous_at_use() {
        let mut builder = ModelBuilder::new();
        let (_, one, two, _) = external_math(&mut builder);
        let model = builder.finish();
        let provider = provider(
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Math"
            [[assembly.namespace.class.method]]
            name = "Max"
            arg-count = 2
            template = "math.max({0}, {1})"
            [[assembly.namespace.class.method]]
            name = "Max"
            ret-type = "System.Int32"
            template = "math.max({0}, {1}, 0)"
            "#,
        );

        let result = provider.method_template(&model, two);
        let Err(MetadataError::AmbiguousOverrideRule { member, first, second }) = result else {
            panic!("expected ambiguity, got {result:?}");
        };
        assert_eq!(member, "System.Math.Max");
        assert_eq!((first.index, second.index), (0, 1));

        let single = provider.method_template(&model, one).ok().flatten();
        assert_eq!(single.map(CodeTemplate::source), Some("math.max({0}, {1}, 0)"));
    }

    #[test]
    fn test_identical_discriminators_are_ambiguous() {
        let document = OverrideProvider::parse_document(
            "dup.toml",
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Math"
            [[assembly.namespace.class.method]]
            name = "Abs"
            arg-count = 1
            [[assembly.namespace.class.method]]
            name = "Abs"
            arg-count = 1
            "#,
        );
        let mut provider = OverrideProvider::new();
        let result = document.and_then(|document| provider.add_document("dup.toml", document));
        let Err(MetadataError::AmbiguousOverrideRule { first, second, .. }) = result else {
            panic!("expected ambiguity, got {result:?}");
        };
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
    }

    #[test]
    fn test_duplicate_members_and_types_are_malformed() {
        let duplicate_property = OverrideProvider::parse_document(
            "props.toml",
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "String"
            [[assembly.namespace.class.property]]
            name = "Length"
            is-field = false
            [[assembly.namespace.class.property]]
            name = "Length"
            is-field = true
            "#,
        );
        let mut provider = OverrideProvider::new();
        let result = duplicate_property.and_then(|document| provider.add_document("props.toml", document));
        assert!(matches!(
            result,
            Err(MetadataError::MalformedMetadataDocument { previous: Some(_), .. })
        ));

        let field_and_property = OverrideProvider::parse_document(
            "shared.toml",
            r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "String"
            [[assembly.namespace.class.field]]
            name = "Length"
            [[assembly.namespace.class.property]]
            name = "Length"
            is-field = false
            "#,
        );
        let mut provider = OverrideProvider::new();
        let shared = field_and_property.and_then(|document| provider.add_document("shared.toml", document));
        let Ok(_) = shared else {
            panic!("a field and a property may share a name");
        };

        let class = r#"
            [[assembly.namespace]]
            name = "System"
            [[assembly.namespace.class]]
            name = "Console"
            "#;
        let mut provider = OverrideProvider::new();
        let first = OverrideProvider::parse_document("a.toml", class).and_then(|doc| provider.add_document("a.toml", doc));
        let Ok(_) = first else {
            panic!("unexpected error");
        };
        let second = OverrideProvider::parse_document("b.toml", class).and_then(|doc| provider.add_document("b.toml", doc));
        let Err(error) = second else {
            panic!("duplicate type accepted");
        };
        let documents: Vec<&str> = error.locations().iter().map(|loc| loc.document.as_str()).collect();
        assert_eq!(documents, vec!["b.toml", "a.toml"]);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = OverrideProvider::parse_document("bad.toml", "[[assembly.namespace]]\nname = \"X\"\nbogus = 1\n");
        assert!(matches!(result, Err(MetadataError::Parse { .. })));
    }

    #[test]
    fn test_json_documents_and_files() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else {
            panic!("no temp dir");
        };
        let path = dir.path().join("meta.json");
        let written = fs::write(
            &path,
            r#"{ "export": { "attributes": ["Game.SaveAttribute"] },
                 "assembly": { "namespace": [ { "name": "Game", "rename": "G" } ] } }"#,
        );
        let Ok(_) = written else {
            panic!("unexpected error");
        };
        let loaded = OverrideProvider::load_files(&[path]);
        let Ok(provider) = loaded else {
            panic!("load failed: {loaded:?}");
        };
        assert!(provider.is_export_attribute("Game.SaveAttribute"));
        assert_eq!(provider.namespace_rename("Game"), Some("G"));
    }
}

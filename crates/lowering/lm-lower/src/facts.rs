//! Program-wide facts gathered before any unit is lowered
//!
//! Partial types may spread over several units. Every fragment is collected
//! first, so a type is emitted once, complete, in the unit of its first
//! fragment. Constructor counts and static-constructor presence of each type
//! are derived here as well, because derived types in other units shape their
//! constructor calls after them.

use crate::members::{self, Storage};
use indexmap::IndexMap;
use lm_source::{CompilationUnit, MemberDecl, NamespaceMember, SemanticModel, SymbolId, TypeDecl, TypeKind, TypeRef};
use rustc_hash::FxHashMap;
use std::ptr;
use tracing::debug;

/// A type declaration and the index of the unit holding it
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'units> {
    /// Unit index
    pub unit: usize,
    /// Declaration
    pub decl: &'units TypeDecl,
}

/// Emission-relevant facts of one type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFacts {
    /// Constructors after synthesis: declared, plus a struct's zero-argument
    /// one, or a single synthesized one
    pub ctor_count: usize,
    /// The type emits `__staticCtor__`
    pub has_static_ctor: bool,
    /// Some instance member initializes through `__init__`
    pub has_init: bool,
}

/// Fragments and facts of every type compiled in this run
#[derive(Debug, Default)]
pub struct ProgramFacts<'units> {
    fragments: IndexMap<SymbolId, Vec<Fragment<'units>>>,
    types: FxHashMap<SymbolId, TypeFacts>,
}

impl<'units> ProgramFacts<'units> {
    /// Gather every fragment of every unit, then derive type facts
    pub fn collect(model: &SemanticModel, units: &'units [CompilationUnit]) -> Self {
        let mut facts = Self::default();
        for (index, unit) in units.iter().enumerate() {
            for member in &unit.members {
                facts.visit_namespace_member(index, member);
            }
        }
        let types: Vec<SymbolId> = facts.fragments.keys().copied().collect();
        for ty in types {
            facts.compute(model, ty);
        }
        debug!(
            types = facts.fragments.len(),
            partial = facts.partial_types().count(),
            "collected type fragments"
        );
        facts
    }

    fn visit_namespace_member(&mut self, unit: usize, member: &'units NamespaceMember) {
        match member {
            NamespaceMember::Namespace(namespace) => {
                for inner in &namespace.members {
                    self.visit_namespace_member(unit, inner);
                }
            }
            NamespaceMember::Type(decl) => self.visit_type(unit, decl),
        }
    }

    fn visit_type(&mut self, unit: usize, decl: &'units TypeDecl) {
        self.fragments
            .entry(decl.symbol)
            .or_default()
            .push(Fragment { unit, decl });
        for member in &decl.members {
            if let MemberDecl::Type(nested) = member {
                self.visit_type(unit, nested);
            }
        }
    }

    /// Every fragment of a type, in unit order
    pub fn fragments(&self, ty: SymbolId) -> &[Fragment<'units>] {
        self.fragments.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Unit that emits a type
    pub fn owner_unit(&self, ty: SymbolId) -> Option<usize> {
        self.fragments(ty).first().map(|fragment| fragment.unit)
    }

    /// Whether `decl` is the fragment a type is emitted at
    pub fn is_first_fragment(&self, decl: &TypeDecl) -> bool {
        self.fragments(decl.symbol)
            .first()
            .is_some_and(|fragment| ptr::eq(fragment.decl, decl))
    }

    /// Types declared in more than one fragment
    pub fn partial_types(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.fragments
            .iter()
            .filter(|(_, fragments)| fragments.len() > 1)
            .map(|(ty, _)| *ty)
    }

    /// Facts of a type; types not compiled in this run have none
    pub fn type_facts(&self, ty: SymbolId) -> TypeFacts {
        self.types.get(&ty).copied().unwrap_or_default()
    }

    fn compute(&mut self, model: &SemanticModel, ty: SymbolId) -> TypeFacts {
        if let Some(facts) = self.types.get(&ty) {
            return *facts;
        }
        // Placeholder against inheritance cycles in malformed input
        self.types.insert(ty, TypeFacts::default());

        let kind = model.type_kind(ty).unwrap_or(TypeKind::Class);
        if !matches!(kind, TypeKind::Class | TypeKind::Struct) {
            return TypeFacts::default();
        }
        let has_nested = self.has_nested_types(ty);
        let mut has_init = false;
        let mut has_static_init = false;
        for fragment in self.fragments(ty) {
            for member in &fragment.decl.members {
                let Some((symbol, init)) = members::storage_member(model, member) else {
                    continue;
                };
                match members::storage(model, symbol, init, has_nested) {
                    Storage::InstanceInit => has_init = true,
                    Storage::TypeLocal | Storage::StaticSlot => {
                        has_static_init |= members::static_statement_needed(model, symbol, init);
                    }
                    Storage::TableEntry | Storage::InstanceDefault => {}
                }
            }
        }
        let has_static_ctor = has_static_init || model.static_constructor(ty).is_some() || extends_itself(model, ty);

        let declared = model.constructors(ty);
        let ctor_count = if kind == TypeKind::Struct {
            let has_zero_arg = declared.iter().any(|ctor| model.params(*ctor).is_empty());
            declared.len() + usize::from(!has_zero_arg)
        } else if declared.is_empty() {
            let base = model
                .base_of(ty)
                .filter(|base| self.fragments.contains_key(base))
                .map(|base| self.compute(model, base))
                .unwrap_or_default();
            usize::from(has_init || base.ctor_count > 1 || base.has_static_ctor)
        } else {
            declared.len()
        };

        let facts = TypeFacts {
            ctor_count,
            has_static_ctor,
            has_init,
        };
        self.types.insert(ty, facts);
        facts
    }

    /// Whether any fragment of a type declares a nested type
    pub fn has_nested_types(&self, ty: SymbolId) -> bool {
        self.fragments(ty).iter().any(|fragment| {
            fragment
                .decl
                .members
                .iter()
                .any(|member| matches!(member, MemberDecl::Type(_)))
        })
    }
}

/// Whether a type's base is instantiated over the type itself
pub(crate) fn extends_itself(model: &SemanticModel, ty: SymbolId) -> bool {
    fn mentions(candidate: &TypeRef, ty: SymbolId) -> bool {
        match candidate {
            TypeRef::Named { symbol, args } => *symbol == ty || args.iter().any(|arg| mentions(arg, ty)),
            TypeRef::Array(inner) | TypeRef::Nullable(inner) => mentions(inner, ty),
            TypeRef::Param(_) | TypeRef::Void | TypeRef::Dynamic => false,
        }
    }
    model
        .type_detail(ty)
        .and_then(|detail| detail.base.as_ref())
        .is_some_and(|base| base.args().iter().any(|arg| mentions(arg, ty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_source::{Expr, ExprKind, FieldDecl, NamespaceDecl};
    use lm_span::{FileId, Span};

    fn unit(file: u32, members: Vec<NamespaceMember>) -> CompilationUnit {
        CompilationUnit {
            file: FileId::new(file),
            path: format!("f{file}.cs"),
            text: None,
            members,
        }
    }

    fn decl(symbol: SymbolId, members: Vec<MemberDecl>) -> TypeDecl {
        TypeDecl {
            symbol,
            members,
            attributes: Vec::new(),
            span: Span::detached(),
        }
    }

    #[test]
    fn test_partial_type_is_owned_by_first_fragment() {
        let mut builder = lm_source::ModelBuilder::new();
        let ty = builder.class("App", "Shape");
        let model = builder.finish();
        let units = vec![
            unit(0, vec![NamespaceMember::Type(decl(ty, Vec::new()))]),
            unit(
                1,
                vec![NamespaceMember::Namespace(NamespaceDecl {
                    name: "App".to_owned(),
                    members: vec![NamespaceMember::Type(decl(ty, Vec::new()))],
                    span: Span::detached(),
                })],
            ),
        ];
        let facts = ProgramFacts::collect(&model, &units);

        assert_eq!(facts.fragments(ty).len(), 2);
        assert_eq!(facts.owner_unit(ty), Some(0));
        assert_eq!(facts.partial_types().collect::<Vec<_>>(), vec![ty]);
        let NamespaceMember::Type(first) = &units[0].members[0] else {
            panic!("unexpected member");
        };
        assert!(facts.is_first_fragment(first));
    }

    #[test]
    fn test_constructor_counts() {
        let mut builder = lm_source::ModelBuilder::new();
        let int = builder.int();
        let point = builder.struct_type("App", "Point");
        builder.constructor(point, &[("x", int.clone())]);
        let base = builder.class("App", "Base");
        builder.constructor(base, &[]);
        builder.constructor(base, &[("x", int.clone())]);
        let derived = builder.class("App", "Derived");
        builder.set_base(derived, TypeRef::named(base));
        let plain = builder.class("App", "Plain");
        let object = builder.object();
        let field = builder.field(plain, "items", object.clone());
        let creation = Expr::new(
            ExprKind::ObjectCreation {
                ty: object.clone(),
                ctor: None,
                args: Vec::new(),
                initializers: Vec::new(),
            },
            object,
        );
        let model = builder.finish();
        let field_decl = MemberDecl::Field(FieldDecl {
            symbol: field,
            initializer: Some(creation),
            span: Span::detached(),
        });
        let units = vec![unit(
            0,
            vec![
                NamespaceMember::Type(decl(point, Vec::new())),
                NamespaceMember::Type(decl(base, Vec::new())),
                NamespaceMember::Type(decl(derived, Vec::new())),
                NamespaceMember::Type(decl(plain, vec![field_decl])),
            ],
        )];
        let facts = ProgramFacts::collect(&model, &units);

        assert_eq!(facts.type_facts(point).ctor_count, 2);
        assert_eq!(facts.type_facts(base).ctor_count, 2);
        assert_eq!(facts.type_facts(derived).ctor_count, 1);
        let plain_facts = facts.type_facts(plain);
        assert!(plain_facts.has_init);
        assert_eq!(plain_facts.ctor_count, 1);
        assert!(!plain_facts.has_static_ctor);
    }
}

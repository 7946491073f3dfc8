//! Semantic model: the resolved symbol table produced by the front end
//!
//! The compiler never resolves names itself. Every name, member access and
//! invocation in the source tree points at a [`SymbolId`] in this table, and
//! the queries here answer the questions lowering needs (kinds, types,
//! inheritance, constructors) without re-validating anything.

use crate::types::{SpecialType, TypeRef};
use lm_span::FileSpan;
use serde::{Deserialize, Serialize};

/// Unique ID for a resolved symbol
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// Position in the symbol table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a symbol denotes
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Local variable
    Local,
    /// Method, lambda or indexer parameter
    Parameter,
    /// Field, including enum members
    Field,
    /// Property or indexer
    Property,
    /// Event
    Event,
    /// Method, constructor, accessor, operator or local function
    Method,
    /// Class, struct, interface, enum or delegate
    NamedType,
    /// Namespace
    Namespace,
    /// Generic type parameter
    TypeParameter,
    /// Statement label
    Label,
    /// Variable bound by a query clause
    RangeVariable,
}

/// Declared accessibility
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Accessibility {
    /// Visible everywhere
    Public,
    /// Visible to derived types
    Protected,
    /// Visible inside the assembly
    Internal,
    /// Visible to derived types or inside the assembly
    ProtectedInternal,
    /// Visible inside the declaring type
    #[default]
    Private,
}

/// Compile-time constant value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// The null reference
    Null,
    /// Boolean constant
    Bool(bool),
    /// Integral constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// Character constant
    Char(char),
    /// String constant
    String(String),
}

impl Constant {
    /// Whether the constant is falsy in the target (`nil` or `false`)
    pub fn is_falsy(&self) -> bool {
        matches!(self, Self::Null | Self::Bool(false))
    }
}

/// How a parameter or argument is passed
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RefKind {
    /// By value
    #[default]
    None,
    /// `ref`
    Ref,
    /// `out`
    Out,
    /// `in`
    In,
    /// `params` array
    Params,
}

impl RefKind {
    /// Whether the callee can write back through this slot
    pub fn is_ref_or_out(self) -> bool {
        matches!(self, Self::Ref | Self::Out)
    }
}

/// Flavor of a method symbol
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MethodKind {
    /// Ordinary named method
    #[default]
    Ordinary,
    /// Instance constructor
    Constructor,
    /// Static constructor
    StaticConstructor,
    /// User-defined operator
    Operator,
    /// User-defined conversion
    Conversion,
    /// Property or indexer getter
    PropertyGet,
    /// Property or indexer setter
    PropertySet,
    /// Event adder
    EventAdd,
    /// Event remover
    EventRemove,
    /// Local function
    LocalFunction,
    /// Anonymous function
    Lambda,
}

/// Flavor of a named type
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TypeKind {
    /// Reference type
    #[default]
    Class,
    /// Value type
    Struct,
    /// Interface
    Interface,
    /// Enumeration
    Enum,
    /// Delegate
    Delegate,
}

/// Signature of a method-like symbol
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDetail {
    /// Method flavor
    #[serde(default)]
    pub method_kind: MethodKind,
    /// Parameters in declaration order
    #[serde(default)]
    pub params: Vec<SymbolId>,
    /// Declared return type
    #[serde(default = "TypeRef::void")]
    pub return_type: TypeRef,
    /// Method-level type parameters
    #[serde(default)]
    pub type_params: Vec<SymbolId>,
    /// Method this one overrides
    #[serde(default)]
    pub overridden: Option<SymbolId>,
    /// Interface methods this one implements
    #[serde(default)]
    pub implements: Vec<SymbolId>,
    /// Declared as an extension method
    #[serde(default)]
    pub is_extension: bool,
    /// Abstract or interface method without a body
    #[serde(default)]
    pub is_abstract: bool,
    /// Property or event this accessor belongs to
    #[serde(default)]
    pub associated: Option<SymbolId>,
}

/// Shape of a named type
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDetail {
    /// Type flavor
    #[serde(default)]
    pub type_kind: TypeKind,
    /// Dotted namespace, empty for the global namespace
    #[serde(default)]
    pub namespace: String,
    /// Base class, if any besides the implicit root
    #[serde(default)]
    pub base: Option<TypeRef>,
    /// Implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<TypeRef>,
    /// Type parameters
    #[serde(default)]
    pub type_params: Vec<SymbolId>,
    /// Predefined type this symbol stands for
    #[serde(default)]
    pub special: Option<SpecialType>,
    /// Members across all partial fragments, in declaration order
    #[serde(default)]
    pub members: Vec<SymbolId>,
    /// Delegate signature, for delegate types
    #[serde(default)]
    pub invoke: Option<SymbolId>,
}

/// Kind-specific symbol data
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum SymbolDetail {
    /// Nothing beyond the common data
    #[default]
    None,
    /// Local, parameter, field or range variable
    Variable {
        /// Declared type
        ty: TypeRef,
        /// Passing mode, for parameters
        #[serde(default)]
        ref_kind: RefKind,
        /// `readonly` field
        #[serde(default)]
        is_readonly: bool,
        /// `const` field or local
        #[serde(default)]
        is_const: bool,
        /// Optional parameter
        #[serde(default)]
        has_default: bool,
    },
    /// Property or indexer
    Property {
        /// Property type
        ty: TypeRef,
        /// Getter accessor
        #[serde(default)]
        getter: Option<SymbolId>,
        /// Setter accessor
        #[serde(default)]
        setter: Option<SymbolId>,
        /// Auto-implemented: no accessor bodies
        #[serde(default)]
        is_auto: bool,
        /// Indexer parameters, empty for plain properties
        #[serde(default)]
        params: Vec<SymbolId>,
    },
    /// Event
    Event {
        /// Delegate type
        ty: TypeRef,
        /// Declared without accessor bodies
        #[serde(default)]
        is_field_like: bool,
    },
    /// Method-like symbol
    Method(MethodDetail),
    /// Named type
    Type(TypeDetail),
}

/// One entry of the symbol table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolData {
    /// Simple name as written in source
    pub name: String,
    /// Symbol kind
    pub kind: SymbolKind,
    /// Static member or type-level symbol
    #[serde(default)]
    pub is_static: bool,
    /// Declared accessibility
    #[serde(default)]
    pub accessibility: Accessibility,
    /// Declaring type or namespace
    #[serde(default)]
    pub containing: Option<SymbolId>,
    /// Declared in the program being compiled
    #[serde(default)]
    pub from_code: bool,
    /// Constant value for constants and enum members
    #[serde(default)]
    pub constant: Option<Constant>,
    /// Fully qualified attribute type names applied to the symbol
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Kind-specific data
    #[serde(default)]
    pub detail: SymbolDetail,
    /// Declaration site, when declared in source
    #[serde(default)]
    pub location: Option<FileSpan>,
}

impl SymbolData {
    /// Create a symbol with only the common fields set
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_static: false,
            accessibility: Accessibility::Private,
            containing: None,
            from_code: true,
            constant: None,
            attributes: Vec::new(),
            detail: SymbolDetail::None,
            location: None,
        }
    }

    /// Private accessibility, ignoring protected-or-internal nuances
    pub fn is_private(&self) -> bool {
        self.accessibility == Accessibility::Private
    }

    /// Eligible for override metadata: public and defined outside the program
    pub fn may_have_override(&self) -> bool {
        self.accessibility == Accessibility::Public && !self.from_code
    }
}

/// The symbol table and the queries lowering runs against it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticModel {
    symbols: Vec<SymbolData>,
}

impl SemanticModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a symbol and return its id
    pub fn alloc(&mut self, data: SymbolData) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(data);
        id
    }

    /// Look up a symbol. Ids always come from this model.
    pub fn symbol(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.index()]
    }

    /// Mutable access, used while building a model
    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id.index()]
    }

    /// Checked lookup, for ids read from untrusted input
    pub fn get(&self, id: SymbolId) -> Option<&SymbolData> {
        self.symbols.get(id.index())
    }

    /// Number of symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the model holds no symbols
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Iterate over all symbols with their ids
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SymbolData)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, data)| (SymbolId(index as u32), data))
    }

    /// Simple name of a symbol
    pub fn name(&self, id: SymbolId) -> &str {
        &self.symbol(id).name
    }

    /// Method signature, if `id` is method-like
    pub fn method(&self, id: SymbolId) -> Option<&MethodDetail> {
        match &self.symbol(id).detail {
            SymbolDetail::Method(detail) => Some(detail),
            _ => None,
        }
    }

    /// Type shape, if `id` is a named type
    pub fn type_detail(&self, id: SymbolId) -> Option<&TypeDetail> {
        match &self.symbol(id).detail {
            SymbolDetail::Type(detail) => Some(detail),
            _ => None,
        }
    }

    /// Declared type of a variable, property or event, or a method's return type
    pub fn type_of(&self, id: SymbolId) -> Option<&TypeRef> {
        match &self.symbol(id).detail {
            SymbolDetail::Variable { ty, .. }
            | SymbolDetail::Property { ty, .. }
            | SymbolDetail::Event { ty, .. } => Some(ty),
            SymbolDetail::Method(detail) => Some(&detail.return_type),
            SymbolDetail::Type(_) | SymbolDetail::None => None,
        }
    }

    /// Passing mode of a parameter
    pub fn ref_kind(&self, id: SymbolId) -> RefKind {
        match &self.symbol(id).detail {
            SymbolDetail::Variable { ref_kind, .. } => *ref_kind,
            _ => RefKind::None,
        }
    }

    /// Whether a field or local is `readonly`
    pub fn is_readonly(&self, id: SymbolId) -> bool {
        match &self.symbol(id).detail {
            SymbolDetail::Variable { is_readonly, .. } => *is_readonly,
            SymbolDetail::Property { setter, .. } => setter.is_none(),
            _ => false,
        }
    }

    /// Whether a field or local is `const`
    pub fn is_const(&self, id: SymbolId) -> bool {
        match &self.symbol(id).detail {
            SymbolDetail::Variable { is_const, .. } => *is_const,
            _ => false,
        }
    }

    /// Type flavor of a named type
    pub fn type_kind(&self, id: SymbolId) -> Option<TypeKind> {
        self.type_detail(id).map(|detail| detail.type_kind)
    }

    /// Nearest enclosing named type of a member, or the type itself
    pub fn declaring_type(&self, id: SymbolId) -> Option<SymbolId> {
        let mut current = self.symbol(id).containing;
        while let Some(candidate) = current {
            if self.symbol(candidate).kind == SymbolKind::NamedType {
                return Some(candidate);
            }
            current = self.symbol(candidate).containing;
        }
        None
    }

    /// Dotted namespace of a type, walking out of nested types
    pub fn namespace_of(&self, type_id: SymbolId) -> String {
        let mut current = type_id;
        loop {
            let data = self.symbol(current);
            match data.containing {
                Some(outer) if self.symbol(outer).kind == SymbolKind::NamedType => current = outer,
                _ => {
                    return self
                        .type_detail(current)
                        .map(|detail| detail.namespace.clone())
                        .unwrap_or_default();
                }
            }
        }
    }

    /// Type name qualified by outer types, without the namespace
    pub fn nested_name(&self, type_id: SymbolId) -> String {
        let mut parts = vec![self.name(type_id).to_owned()];
        let mut current = self.symbol(type_id).containing;
        while let Some(outer) = current {
            if self.symbol(outer).kind != SymbolKind::NamedType {
                break;
            }
            parts.push(self.name(outer).to_owned());
            current = self.symbol(outer).containing;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Fully qualified dotted name of a type
    pub fn full_name(&self, type_id: SymbolId) -> String {
        let namespace = self.namespace_of(type_id);
        let nested = self.nested_name(type_id);
        if namespace.is_empty() {
            nested
        } else {
            format!("{namespace}.{nested}")
        }
    }

    /// Direct base class of a type
    pub fn base_of(&self, type_id: SymbolId) -> Option<SymbolId> {
        self.type_detail(type_id)
            .and_then(|detail| detail.base.as_ref())
            .and_then(TypeRef::symbol)
    }

    /// Members of a type, in declaration order
    pub fn members(&self, type_id: SymbolId) -> &[SymbolId] {
        self.type_detail(type_id)
            .map_or(&[], |detail| detail.members.as_slice())
    }

    /// Instance constructors declared on a type
    pub fn constructors(&self, type_id: SymbolId) -> Vec<SymbolId> {
        self.members(type_id)
            .iter()
            .copied()
            .filter(|member| {
                self.method(*member)
                    .is_some_and(|detail| detail.method_kind == MethodKind::Constructor)
            })
            .collect()
    }

    /// Explicit static constructor of a type
    pub fn static_constructor(&self, type_id: SymbolId) -> Option<SymbolId> {
        self.members(type_id).iter().copied().find(|member| {
            self.method(*member)
                .is_some_and(|detail| detail.method_kind == MethodKind::StaticConstructor)
        })
    }

    /// Parameters of a method-like symbol or an indexer
    pub fn params(&self, id: SymbolId) -> &[SymbolId] {
        match &self.symbol(id).detail {
            SymbolDetail::Method(detail) => &detail.params,
            SymbolDetail::Property { params, .. } => params,
            _ => &[],
        }
    }

    /// Whether `id` names an instance method with ref/out parameters
    pub fn has_ref_or_out_params(&self, id: SymbolId) -> bool {
        self.params(id)
            .iter()
            .any(|param| self.ref_kind(*param).is_ref_or_out())
    }

    /// Whether a symbol carries an attribute by qualified name
    pub fn has_attribute(&self, id: SymbolId, attribute: &str) -> bool {
        self.symbol(id)
            .attributes
            .iter()
            .any(|name| name == attribute)
    }

    /// Find the symbol standing for a predefined type
    pub fn special_type(&self, special: SpecialType) -> Option<SymbolId> {
        self.iter().find_map(|(id, data)| match &data.detail {
            SymbolDetail::Type(detail) if detail.special == Some(special) => Some(id),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;

    #[test]
    fn test_full_name_of_nested_type() {
        let mut builder = ModelBuilder::new();
        let outer = builder.class("Game.Core", "World");
        let inner = builder.nested_class(outer, "Cell");
        let model = builder.finish();

        assert_eq!(model.full_name(outer), "Game.Core.World");
        assert_eq!(model.full_name(inner), "Game.Core.World.Cell");
        assert_eq!(model.namespace_of(inner), "Game.Core");
    }

    #[test]
    fn test_constructors_listed_in_order() {
        let mut builder = ModelBuilder::new();
        let ty = builder.class("App", "Point");
        let int = builder.int();
        let first = builder.constructor(ty, &[]);
        let second = builder.constructor(ty, &[("x", int.clone())]);
        builder.static_constructor(ty);
        let model = builder.finish();

        assert_eq!(model.constructors(ty), vec![first, second]);
        assert!(model.static_constructor(ty).is_some());
    }

    #[test]
    fn test_override_eligibility() {
        let mut data = SymbolData::new("Length", SymbolKind::Property);
        data.accessibility = Accessibility::Public;
        data.from_code = false;
        assert!(data.may_have_override());

        data.from_code = true;
        assert!(!data.may_have_override());
    }
}

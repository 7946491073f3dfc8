//! Static types attached to expressions and symbols

use crate::model::{SemanticModel, SymbolId, SymbolKind, TypeKind};
use serde::{Deserialize, Serialize};

/// Predefined types the lowering rules single out
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SpecialType {
    /// Root of the class hierarchy
    Object,
    /// Boolean
    Boolean,
    /// UTF-16 code unit
    Char,
    /// Signed 8-bit
    SByte,
    /// Unsigned 8-bit
    Byte,
    /// Signed 16-bit
    Int16,
    /// Unsigned 16-bit
    UInt16,
    /// Signed 32-bit
    Int32,
    /// Unsigned 32-bit
    UInt32,
    /// Signed 64-bit
    Int64,
    /// Unsigned 64-bit
    UInt64,
    /// 32-bit float
    Single,
    /// 64-bit float
    Double,
    /// String
    String,
    /// Root of all delegate types
    Delegate,
    /// Sequence interface used by iterators and queries
    Enumerable,
}

impl SpecialType {
    /// Integral numeric types
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::SByte
                | Self::Byte
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
                | Self::Char
        )
    }

    /// Floating point types
    pub fn is_float(self) -> bool {
        matches!(self, Self::Single | Self::Double)
    }

    /// Types whose default value is not `nil`
    pub fn is_primitive_value(self) -> bool {
        self.is_integer() || self.is_float() || self == Self::Boolean
    }
}

/// A reference to a type as seen at a use site
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TypeRef {
    /// Named type with generic arguments
    Named {
        /// The type's symbol
        symbol: SymbolId,
        /// Generic arguments, empty for non-generic types
        #[serde(default)]
        args: Vec<TypeRef>,
    },
    /// Generic type parameter
    Param(SymbolId),
    /// Single-dimensional array
    Array(Box<TypeRef>),
    /// Nullable value type
    Nullable(Box<TypeRef>),
    /// No value
    Void,
    /// Dynamically typed, or unknown
    #[default]
    Dynamic,
}

impl TypeRef {
    /// The `void` type
    pub fn void() -> Self {
        Self::Void
    }

    /// Non-generic named type
    pub fn named(symbol: SymbolId) -> Self {
        Self::Named {
            symbol,
            args: Vec::new(),
        }
    }

    /// Symbol of a named type
    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            Self::Named { symbol, .. } => Some(*symbol),
            _ => None,
        }
    }

    /// Generic arguments of a named type
    pub fn args(&self) -> &[Self] {
        match self {
            Self::Named { args, .. } => args,
            _ => &[],
        }
    }

    /// Whether this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// The underlying type of a nullable, or the type itself
    pub fn strip_nullable(&self) -> &Self {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Whether `param` occurs anywhere inside this type
    pub fn mentions_param(&self, param: SymbolId) -> bool {
        match self {
            Self::Param(id) => *id == param,
            Self::Named { args, .. } => args.iter().any(|arg| arg.mentions_param(param)),
            Self::Array(inner) | Self::Nullable(inner) => inner.mentions_param(param),
            Self::Void | Self::Dynamic => false,
        }
    }

    /// Whether this type mentions any type parameter
    pub fn is_open(&self) -> bool {
        match self {
            Self::Param(_) => true,
            Self::Named { args, .. } => args.iter().any(Self::is_open),
            Self::Array(inner) | Self::Nullable(inner) => inner.is_open(),
            Self::Void | Self::Dynamic => false,
        }
    }
}

impl SemanticModel {
    /// Predefined type a reference stands for
    pub fn special(&self, ty: &TypeRef) -> Option<SpecialType> {
        ty.symbol()
            .and_then(|symbol| self.type_detail(symbol))
            .and_then(|detail| detail.special)
    }

    /// Integral numeric type, nullable or not
    pub fn is_integer(&self, ty: &TypeRef) -> bool {
        self.special(ty.strip_nullable())
            .is_some_and(SpecialType::is_integer)
            || self.is_enum(ty.strip_nullable())
    }

    /// Floating point type, nullable or not
    pub fn is_float(&self, ty: &TypeRef) -> bool {
        self.special(ty.strip_nullable())
            .is_some_and(SpecialType::is_float)
    }

    /// The string type
    pub fn is_string(&self, ty: &TypeRef) -> bool {
        self.special(ty) == Some(SpecialType::String)
    }

    /// The char type
    pub fn is_char(&self, ty: &TypeRef) -> bool {
        self.special(ty) == Some(SpecialType::Char)
    }

    /// Boolean, nullable or not
    pub fn is_bool(&self, ty: &TypeRef) -> bool {
        self.special(ty.strip_nullable()) == Some(SpecialType::Boolean)
    }

    /// Nullable value type
    pub fn is_nullable(&self, ty: &TypeRef) -> bool {
        matches!(ty, TypeRef::Nullable(_))
    }

    /// Enumeration type
    pub fn is_enum(&self, ty: &TypeRef) -> bool {
        ty.symbol()
            .and_then(|symbol| self.type_kind(symbol))
            .is_some_and(|kind| kind == TypeKind::Enum)
    }

    /// Delegate type
    pub fn is_delegate(&self, ty: &TypeRef) -> bool {
        ty.symbol().is_some_and(|symbol| {
            self.type_kind(symbol) == Some(TypeKind::Delegate)
                || self.special(ty) == Some(SpecialType::Delegate)
        })
    }

    /// Value type: struct, enum or primitive
    pub fn is_value_type(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Nullable(_) => true,
            TypeRef::Named { symbol, .. } => {
                matches!(self.type_kind(*symbol), Some(TypeKind::Struct | TypeKind::Enum))
                    || self.special(ty).is_some_and(SpecialType::is_primitive_value)
            }
            _ => false,
        }
    }

    /// Whether a value of this type may be `nil` or `false` in the target
    pub fn may_be_falsy(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Nullable(_) | TypeRef::Param(_) | TypeRef::Dynamic => true,
            TypeRef::Void => false,
            TypeRef::Array(_) => true,
            TypeRef::Named { .. } => self.is_bool(ty) || !self.is_value_type(ty),
        }
    }

    /// Whether `ty` converts to `target` by identity or reference upcast
    pub fn is_subclass_of(&self, ty: &TypeRef, target: &TypeRef) -> bool {
        if ty == target {
            return true;
        }
        if self.special(target) == Some(SpecialType::Object) {
            return !matches!(ty, TypeRef::Void);
        }
        let (Some(start), Some(goal)) = (ty.symbol(), target.symbol()) else {
            return false;
        };
        let mut pending = vec![start];
        let mut visited = Vec::new();
        while let Some(current) = pending.pop() {
            if current == goal {
                return true;
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);
            if let Some(detail) = self.type_detail(current) {
                pending.extend(detail.base.iter().filter_map(TypeRef::symbol));
                pending.extend(detail.interfaces.iter().filter_map(TypeRef::symbol));
            }
        }
        false
    }

    /// Element type of a sequence type, when it can be read off the reference
    pub fn element_type(&self, ty: &TypeRef) -> Option<TypeRef> {
        match ty {
            TypeRef::Array(inner) => Some((**inner).clone()),
            TypeRef::Named { args, .. } if args.len() == 1 => args.first().cloned(),
            _ => None,
        }
    }

    /// Name used by override rules: `ns.Name`, with `^N` for generic types
    pub fn type_match_name(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Named { symbol, args } => {
                let name = self.full_name(*symbol);
                if args.is_empty() {
                    name
                } else {
                    format!("{name}^{}", args.len())
                }
            }
            TypeRef::Param(symbol) => self.name(*symbol).to_owned(),
            TypeRef::Array(inner) => format!("{}[]", self.type_match_name(inner)),
            TypeRef::Nullable(inner) => format!("System.Nullable^1[{}]", self.type_match_name(inner)),
            TypeRef::Void => "System.Void".to_owned(),
            TypeRef::Dynamic => "dynamic".to_owned(),
        }
    }

    /// Whether `id` is a type parameter symbol
    pub fn is_type_param(&self, id: SymbolId) -> bool {
        self.symbol(id).kind == SymbolKind::TypeParameter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;

    #[test]
    fn test_falsy_types() {
        let mut builder = ModelBuilder::new();
        let point = builder.struct_type("App", "Point");
        let int = builder.int();
        let boolean = builder.bool();
        let string = builder.string();
        let model = builder.finish();

        assert!(model.may_be_falsy(&boolean));
        assert!(model.may_be_falsy(&string));
        assert!(model.may_be_falsy(&TypeRef::Nullable(Box::new(int.clone()))));
        assert!(!model.may_be_falsy(&int));
        assert!(!model.may_be_falsy(&TypeRef::named(point)));
    }

    #[test]
    fn test_subclass_walks_bases_and_interfaces() {
        let mut builder = ModelBuilder::new();
        let shape = builder.interface("Geo", "IShape");
        let base = builder.class("Geo", "Polygon");
        let derived = builder.class("Geo", "Square");
        builder.set_base(derived, TypeRef::named(base));
        builder.add_interface(base, TypeRef::named(shape));
        let object = builder.object();
        let model = builder.finish();

        let square = TypeRef::named(derived);
        assert!(model.is_subclass_of(&square, &TypeRef::named(shape)));
        assert!(model.is_subclass_of(&square, &object));
        assert!(!model.is_subclass_of(&TypeRef::named(base), &square));
    }

    #[test]
    fn test_type_match_name_marks_arity() {
        let mut builder = ModelBuilder::new();
        let list = builder.generic_class("System.Collections.Generic", "List", &["T"]);
        let int = builder.int();
        let model = builder.finish();

        let closed = TypeRef::Named {
            symbol: list,
            args: vec![int.clone()],
        };
        assert_eq!(model.type_match_name(&closed), "System.Collections.Generic.List^1");
        assert_eq!(model.type_match_name(&int), "System.Int32");
    }
}

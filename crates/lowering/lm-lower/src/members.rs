//! Where members live in the emitted type closure
//!
//! Storage decides, per field-like member, between a public result-table
//! entry, a type-level local, a slot written by the static constructor and
//! the instance initializer. Access modes decide whether a property or event
//! is reached as a plain field or through accessor closures.

use lm_override::OverrideProvider;
use lm_source::{Constant, Expr, MemberDecl, SemanticModel, SpecialType, SymbolDetail, SymbolId, TypeKind, TypeRef};

/// Home of a field, auto-property or field-like event
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Storage {
    /// Static constant exported as a result-table entry
    TableEntry,
    /// Private static kept as a type-level local
    TypeLocal,
    /// Static assigned on the type table by the static constructor
    StaticSlot,
    /// Instance member assigned by `__init__`
    InstanceInit,
    /// Instance member whose constant default sits in the result table
    InstanceDefault,
}

/// How reads and writes reach a property or event
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum AccessMode {
    /// `target.Name`
    Field,
    /// `target:getName()` and friends
    Accessor,
}

/// The storage-bearing symbol of a member declaration and its initializer
pub(crate) fn storage_member<'decl>(
    model: &SemanticModel,
    member: &'decl MemberDecl,
) -> Option<(SymbolId, Option<&'decl Expr>)> {
    match member {
        MemberDecl::Field(decl) => Some((decl.symbol, decl.initializer.as_ref())),
        MemberDecl::Property(decl) if is_auto_property(model, decl.symbol) => {
            Some((decl.symbol, decl.initializer.as_ref()))
        }
        MemberDecl::Event(decl) if is_field_like_event(model, decl.symbol) => {
            Some((decl.symbol, decl.initializer.as_ref()))
        }
        _ => None,
    }
}

pub(crate) fn is_auto_property(model: &SemanticModel, property: SymbolId) -> bool {
    matches!(model.symbol(property).detail, SymbolDetail::Property { is_auto: true, .. })
}

pub(crate) fn is_field_like_event(model: &SemanticModel, event: SymbolId) -> bool {
    matches!(
        model.symbol(event).detail,
        SymbolDetail::Event {
            is_field_like: true,
            ..
        }
    )
}

/// Storage of a member given its initializer
///
/// `has_nested` keeps private statics off type-level locals, since nested
/// types are emitted as separate closures that cannot see them.
pub(crate) fn storage(model: &SemanticModel, symbol: SymbolId, init: Option<&Expr>, has_nested: bool) -> Storage {
    let data = model.symbol(symbol);
    let local = data.is_private() && !has_nested;
    if data.is_static {
        let constant = init
            .and_then(|init| init.constant.as_ref())
            .or(data.constant.as_ref());
        let exported = !data.is_private()
            && constant.is_some()
            && (model.is_const(symbol) || model.is_readonly(symbol));
        return match (exported, local) {
            (true, _) => Storage::TableEntry,
            (false, true) => Storage::TypeLocal,
            (false, false) => Storage::StaticSlot,
        };
    }
    let ty = model.type_of(symbol).cloned().unwrap_or_default();
    match init {
        Some(init) if init.constant.is_some() => Storage::InstanceDefault,
        Some(_) => Storage::InstanceInit,
        None if needs_default_call(model, &ty) => Storage::InstanceInit,
        None => Storage::InstanceDefault,
    }
}

/// Whether the static constructor must assign a static member
pub(crate) fn static_statement_needed(model: &SemanticModel, symbol: SymbolId, init: Option<&Expr>) -> bool {
    let ty = model.type_of(symbol).cloned().unwrap_or_default();
    match init {
        Some(init) => init.constant.as_ref().is_none_or(|constant| *constant != Constant::Null),
        None => default_constant(model, &ty).is_some() || needs_default_call(model, &ty),
    }
}

/// Constant default value of a type, when it is not `nil`
pub(crate) fn default_constant(model: &SemanticModel, ty: &TypeRef) -> Option<Constant> {
    if model.is_nullable(ty) {
        return None;
    }
    if model.is_enum(ty) {
        return Some(Constant::Int(0));
    }
    match model.special(ty)? {
        SpecialType::Boolean => Some(Constant::Bool(false)),
        SpecialType::Char => Some(Constant::Char('\0')),
        special if special.is_float() => Some(Constant::Float(0.0)),
        special if special.is_integer() => Some(Constant::Int(0)),
        _ => None,
    }
}

/// Whether a type's default is a fresh struct value built at run time
pub(crate) fn needs_default_call(model: &SemanticModel, ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Named { symbol, .. } => {
            model.type_kind(*symbol) == Some(TypeKind::Struct) && model.special(ty).is_none()
        }
        _ => false,
    }
}

/// Constructors in emission order: zero-argument first, then declaration
/// order. `None` stands for the zero-argument constructor synthesized for a
/// struct that declares none.
pub(crate) fn ctor_order(model: &SemanticModel, ty: SymbolId) -> Vec<Option<SymbolId>> {
    let declared = model.constructors(ty);
    let (zero_arg, rest): (Vec<SymbolId>, Vec<SymbolId>) = declared
        .into_iter()
        .partition(|ctor| model.params(*ctor).is_empty());
    let mut order: Vec<Option<SymbolId>> = Vec::with_capacity(zero_arg.len() + rest.len() + 1);
    if zero_arg.is_empty() && model.type_kind(ty) == Some(TypeKind::Struct) {
        order.push(None);
    }
    order.extend(zero_arg.into_iter().map(Some));
    order.extend(rest.into_iter().map(Some));
    order
}

/// One-based position of a constructor in [`ctor_order`]
pub(crate) fn ctor_index(model: &SemanticModel, ty: SymbolId, ctor: Option<SymbolId>) -> usize {
    ctor_order(model, ty)
        .iter()
        .position(|candidate| *candidate == ctor)
        .map_or(1, |index| index + 1)
}

/// Access mode of a property
///
/// A metadata `is-field` flag wins. Interface properties and accessors that
/// override or implement something go through accessors; so do properties
/// with written accessor bodies. Auto-properties are plain fields.
pub(crate) fn property_mode(model: &SemanticModel, overrides: &OverrideProvider, property: SymbolId) -> AccessMode {
    if let Some(is_field) = overrides.property_is_field(model, property) {
        return if is_field { AccessMode::Field } else { AccessMode::Accessor };
    }
    let data = model.symbol(property);
    let SymbolDetail::Property {
        getter,
        setter,
        is_auto,
        params,
        ..
    } = &data.detail
    else {
        return AccessMode::Field;
    };
    if !params.is_empty() {
        return AccessMode::Accessor;
    }
    let in_interface = model
        .declaring_type(property)
        .and_then(|owner| model.type_kind(owner))
        .is_some_and(|kind| kind == TypeKind::Interface);
    if in_interface {
        return AccessMode::Accessor;
    }
    let polymorphic = getter.iter().chain(setter.iter()).any(|accessor| {
        model.method(*accessor).is_some_and(|detail| {
            detail.overridden.is_some() || !detail.implements.is_empty() || detail.is_abstract
        })
    });
    if polymorphic {
        return AccessMode::Accessor;
    }
    if *is_auto { AccessMode::Field } else { AccessMode::Accessor }
}

/// Access mode of an event: field-like events are fields holding a delegate
pub(crate) fn event_mode(model: &SemanticModel, event: SymbolId) -> AccessMode {
    let in_interface = model
        .declaring_type(event)
        .and_then(|owner| model.type_kind(owner))
        .is_some_and(|kind| kind == TypeKind::Interface);
    if is_field_like_event(model, event) && !in_interface {
        AccessMode::Field
    } else {
        AccessMode::Accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_source::ModelBuilder;

    #[test]
    fn test_static_storage() {
        let mut builder = ModelBuilder::new();
        let int = builder.int();
        let ty = builder.class("App", "Config");
        let limit = builder.field(ty, "Limit", int.clone());
        builder.make_public(limit).make_const(limit, Constant::Int(5));
        let hidden = builder.field(ty, "hidden", int.clone());
        builder.make_static(hidden);
        let shared = builder.field(ty, "Shared", int);
        builder.make_static(shared).make_public(shared);
        let model = builder.finish();
        let five = Expr::literal(Constant::Int(5), TypeRef::Dynamic);

        assert_eq!(storage(&model, limit, Some(&five), false), Storage::TableEntry);
        assert_eq!(storage(&model, hidden, Some(&five), false), Storage::TypeLocal);
        assert_eq!(storage(&model, hidden, Some(&five), true), Storage::StaticSlot);
        assert_eq!(storage(&model, shared, None, false), Storage::StaticSlot);
        assert!(static_statement_needed(&model, shared, None));
    }

    #[test]
    fn test_instance_storage_and_defaults() {
        let mut builder = ModelBuilder::new();
        let int = builder.int();
        let string = builder.string();
        let point = builder.struct_type("App", "Point");
        let ty = builder.class("App", "Shape");
        let count = builder.field(ty, "count", int.clone());
        let label = builder.field(ty, "label", string.clone());
        let origin = builder.field(ty, "origin", TypeRef::named(point));
        let model = builder.finish();

        assert_eq!(storage(&model, count, None, false), Storage::InstanceDefault);
        assert_eq!(storage(&model, label, None, false), Storage::InstanceDefault);
        assert_eq!(storage(&model, origin, None, false), Storage::InstanceInit);
        assert_eq!(default_constant(&model, &int), Some(Constant::Int(0)));
        assert_eq!(default_constant(&model, &string), None);
        assert_eq!(default_constant(&model, &TypeRef::Nullable(Box::new(int))), None);
    }

    #[test]
    fn test_property_modes() {
        let mut builder = ModelBuilder::new();
        let int = builder.int();
        let ty = builder.class("App", "Shape");
        let auto = builder.auto_property(ty, "Size", int.clone());
        let computed = builder.property(ty, "Area", int.clone(), false);
        let shape_interface = builder.interface("App", "IShape");
        let declared = builder.auto_property(shape_interface, "Size", int);
        let model = builder.finish();
        let overrides = OverrideProvider::new();

        assert_eq!(property_mode(&model, &overrides, auto), AccessMode::Field);
        assert_eq!(property_mode(&model, &overrides, computed), AccessMode::Accessor);
        assert_eq!(property_mode(&model, &overrides, declared), AccessMode::Accessor);
    }

    #[test]
    fn test_constructor_order_puts_zero_arg_first() {
        let mut builder = ModelBuilder::new();
        let int = builder.int();
        let ty = builder.class("App", "Shape");
        let one = builder.constructor(ty, &[("x", int.clone())]);
        let zero = builder.constructor(ty, &[]);
        let point = builder.struct_type("App", "Point");
        let sized = builder.constructor(point, &[("x", int)]);
        let model = builder.finish();

        assert_eq!(ctor_order(&model, ty), vec![Some(zero), Some(one)]);
        assert_eq!(ctor_index(&model, ty, Some(one)), 2);
        assert_eq!(ctor_order(&model, point), vec![None, Some(sized)]);
        assert_eq!(ctor_index(&model, point, None), 1);
    }
}

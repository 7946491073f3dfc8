//! Programmatic construction of semantic models and source trees
//!
//! Front ends that do not go through the JSON bundle, and the test suites of
//! every downstream crate, build their input through [`ModelBuilder`]. The
//! builder seeds the predefined `System` types so that operator and literal
//! lowering can recognize them.

use crate::model::{
    Accessibility, Constant, MethodDetail, MethodKind, RefKind, SemanticModel, SymbolData,
    SymbolDetail, SymbolId, SymbolKind, TypeDetail, TypeKind,
};
use crate::tree::{Argument, BinaryOp, Expr, ExprKind};
use crate::types::{SpecialType, TypeRef};
use rustc_hash::FxHashMap;

const PREDEFINED: &[(SpecialType, &str)] = &[
    (SpecialType::Object, "Object"),
    (SpecialType::Boolean, "Boolean"),
    (SpecialType::Char, "Char"),
    (SpecialType::Byte, "Byte"),
    (SpecialType::Int32, "Int32"),
    (SpecialType::Int64, "Int64"),
    (SpecialType::Single, "Single"),
    (SpecialType::Double, "Double"),
    (SpecialType::String, "String"),
    (SpecialType::Delegate, "Delegate"),
];

/// Incrementally builds a [`SemanticModel`]
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    model: SemanticModel,
    predefined: FxHashMap<SpecialType, SymbolId>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Builder seeded with the predefined `System` types
    pub fn new() -> Self {
        let mut builder = Self {
            model: SemanticModel::new(),
            predefined: FxHashMap::default(),
        };
        for (special, name) in PREDEFINED {
            let id = builder.alloc_type("System", name, TypeKind::Class, false);
            if let SymbolDetail::Type(detail) = &mut builder.model.symbol_mut(id).detail {
                detail.special = Some(*special);
                if special.is_primitive_value() {
                    detail.type_kind = TypeKind::Struct;
                }
            }
            builder.predefined.insert(*special, id);
        }
        let enumerable = builder.alloc_type("System.Collections.Generic", "IEnumerable", TypeKind::Interface, false);
        builder.type_param(enumerable, "T");
        if let SymbolDetail::Type(detail) = &mut builder.model.symbol_mut(enumerable).detail {
            detail.special = Some(SpecialType::Enumerable);
        }
        builder.predefined.insert(SpecialType::Enumerable, enumerable);
        builder
    }

    /// Finish building
    pub fn finish(self) -> SemanticModel {
        self.model
    }

    /// Model built so far
    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    /// Mutable access to a symbol, for flags the helpers do not cover
    pub fn edit(&mut self, id: SymbolId) -> &mut SymbolData {
        self.model.symbol_mut(id)
    }

    /// Predefined type by kind
    pub fn special(&self, special: SpecialType) -> TypeRef {
        self.predefined
            .get(&special)
            .map_or(TypeRef::Dynamic, |id| TypeRef::named(*id))
    }

    /// `int`
    pub fn int(&self) -> TypeRef {
        self.special(SpecialType::Int32)
    }

    /// `long`
    pub fn long(&self) -> TypeRef {
        self.special(SpecialType::Int64)
    }

    /// `double`
    pub fn double(&self) -> TypeRef {
        self.special(SpecialType::Double)
    }

    /// `bool`
    pub fn bool(&self) -> TypeRef {
        self.special(SpecialType::Boolean)
    }

    /// `char`
    pub fn char(&self) -> TypeRef {
        self.special(SpecialType::Char)
    }

    /// `string`
    pub fn string(&self) -> TypeRef {
        self.special(SpecialType::String)
    }

    /// `object`
    pub fn object(&self) -> TypeRef {
        self.special(SpecialType::Object)
    }

    /// `IEnumerable<elem>`
    pub fn enumerable(&self, elem: TypeRef) -> TypeRef {
        match self.predefined.get(&SpecialType::Enumerable) {
            Some(id) => TypeRef::Named {
                symbol: *id,
                args: vec![elem],
            },
            None => TypeRef::Dynamic,
        }
    }

    fn alloc_type(&mut self, namespace: &str, name: &str, kind: TypeKind, from_code: bool) -> SymbolId {
        let mut data = SymbolData::new(name, SymbolKind::NamedType);
        data.accessibility = Accessibility::Public;
        data.is_static = true;
        data.from_code = from_code;
        data.detail = SymbolDetail::Type(TypeDetail {
            type_kind: kind,
            namespace: namespace.to_owned(),
            ..TypeDetail::default()
        });
        self.model.alloc(data)
    }

    /// Public class declared in the program
    pub fn class(&mut self, namespace: &str, name: &str) -> SymbolId {
        self.alloc_type(namespace, name, TypeKind::Class, true)
    }

    /// Public struct declared in the program
    pub fn struct_type(&mut self, namespace: &str, name: &str) -> SymbolId {
        self.alloc_type(namespace, name, TypeKind::Struct, true)
    }

    /// Public interface declared in the program
    pub fn interface(&mut self, namespace: &str, name: &str) -> SymbolId {
        self.alloc_type(namespace, name, TypeKind::Interface, true)
    }

    /// Public enum declared in the program
    pub fn enum_type(&mut self, namespace: &str, name: &str) -> SymbolId {
        self.alloc_type(namespace, name, TypeKind::Enum, true)
    }

    /// Public class from a referenced library
    pub fn external_class(&mut self, namespace: &str, name: &str) -> SymbolId {
        self.alloc_type(namespace, name, TypeKind::Class, false)
    }

    /// Generic class with the given type parameter names
    pub fn generic_class(&mut self, namespace: &str, name: &str, params: &[&str]) -> SymbolId {
        let id = self.class(namespace, name);
        for param in params {
            self.type_param(id, param);
        }
        id
    }

    /// Class nested inside `outer`
    pub fn nested_class(&mut self, outer: SymbolId, name: &str) -> SymbolId {
        let id = self.alloc_type("", name, TypeKind::Class, true);
        self.model.symbol_mut(id).containing = Some(outer);
        self.push_member(outer, id);
        id
    }

    /// Add a type parameter to a type or method
    pub fn type_param(&mut self, owner: SymbolId, name: &str) -> SymbolId {
        let mut data = SymbolData::new(name, SymbolKind::TypeParameter);
        data.containing = Some(owner);
        let id = self.model.alloc(data);
        match &mut self.model.symbol_mut(owner).detail {
            SymbolDetail::Type(detail) => detail.type_params.push(id),
            SymbolDetail::Method(detail) => detail.type_params.push(id),
            _ => {}
        }
        id
    }

    /// Set a type's base class
    pub fn set_base(&mut self, ty: SymbolId, base: TypeRef) {
        if let SymbolDetail::Type(detail) = &mut self.model.symbol_mut(ty).detail {
            detail.base = Some(base);
        }
    }

    /// Add an implemented interface
    pub fn add_interface(&mut self, ty: SymbolId, interface: TypeRef) {
        if let SymbolDetail::Type(detail) = &mut self.model.symbol_mut(ty).detail {
            detail.interfaces.push(interface);
        }
    }

    fn push_member(&mut self, owner: SymbolId, member: SymbolId) {
        if let SymbolDetail::Type(detail) = &mut self.model.symbol_mut(owner).detail {
            detail.members.push(member);
        }
    }

    fn alloc_member(&mut self, owner: SymbolId, name: &str, kind: SymbolKind, detail: SymbolDetail) -> SymbolId {
        let mut data = SymbolData::new(name, kind);
        data.containing = Some(owner);
        data.from_code = self.model.symbol(owner).from_code;
        data.detail = detail;
        let id = self.model.alloc(data);
        self.push_member(owner, id);
        id
    }

    /// Mark a symbol static
    pub fn make_static(&mut self, id: SymbolId) -> &mut Self {
        self.model.symbol_mut(id).is_static = true;
        self
    }

    /// Mark a symbol public
    pub fn make_public(&mut self, id: SymbolId) -> &mut Self {
        self.model.symbol_mut(id).accessibility = Accessibility::Public;
        self
    }

    /// Mark a field `readonly`
    pub fn make_readonly(&mut self, id: SymbolId) -> &mut Self {
        if let SymbolDetail::Variable { is_readonly, .. } = &mut self.model.symbol_mut(id).detail {
            *is_readonly = true;
        }
        self
    }

    /// Make a field or local a constant with the given value
    pub fn make_const(&mut self, id: SymbolId, value: Constant) -> &mut Self {
        let data = self.model.symbol_mut(id);
        data.constant = Some(value);
        data.is_static = data.kind == SymbolKind::Field;
        if let SymbolDetail::Variable { is_const, .. } = &mut data.detail {
            *is_const = true;
        }
        self
    }

    /// Record an attribute on a symbol
    pub fn add_attribute(&mut self, id: SymbolId, attribute: &str) -> &mut Self {
        self.model.symbol_mut(id).attributes.push(attribute.to_owned());
        self
    }

    /// Private instance field
    pub fn field(&mut self, owner: SymbolId, name: &str, ty: TypeRef) -> SymbolId {
        self.alloc_member(owner, name, SymbolKind::Field, variable(ty, RefKind::None))
    }

    /// Enum member with its value
    pub fn enum_member(&mut self, owner: SymbolId, name: &str, value: i64) -> SymbolId {
        let id = self.field(owner, name, TypeRef::named(owner));
        self.make_public(id).make_const(id, Constant::Int(value));
        id
    }

    fn accessor(&mut self, owner: SymbolId, prefix: &str, name: &str, kind: MethodKind, associated: SymbolId) -> SymbolId {
        let mut data = SymbolData::new(format!("{prefix}_{name}"), SymbolKind::Method);
        data.containing = Some(owner);
        data.from_code = self.model.symbol(owner).from_code;
        data.detail = SymbolDetail::Method(MethodDetail {
            method_kind: kind,
            associated: Some(associated),
            ..MethodDetail::default()
        });
        self.model.alloc(data)
    }

    /// Private instance auto-property with getter and setter
    pub fn auto_property(&mut self, owner: SymbolId, name: &str, ty: TypeRef) -> SymbolId {
        self.property_impl(owner, name, ty, true, true, true)
    }

    /// Private instance property with accessor bodies
    pub fn property(&mut self, owner: SymbolId, name: &str, ty: TypeRef, has_setter: bool) -> SymbolId {
        self.property_impl(owner, name, ty, true, has_setter, false)
    }

    fn property_impl(
        &mut self,
        owner: SymbolId,
        name: &str,
        ty: TypeRef,
        has_getter: bool,
        has_setter: bool,
        is_auto: bool,
    ) -> SymbolId {
        let id = self.alloc_member(
            owner,
            name,
            SymbolKind::Property,
            SymbolDetail::Property {
                ty: ty.clone(),
                getter: None,
                setter: None,
                is_auto,
                params: Vec::new(),
            },
        );
        let getter = has_getter.then(|| self.accessor(owner, "get", name, MethodKind::PropertyGet, id));
        let setter = has_setter.then(|| self.accessor(owner, "set", name, MethodKind::PropertySet, id));
        if let Some(getter) = getter
            && let SymbolDetail::Method(detail) = &mut self.model.symbol_mut(getter).detail
        {
            detail.return_type = ty.clone();
        }
        if let Some(setter) = setter {
            let value = self.param(setter, "value", ty.clone(), RefKind::None);
            if let SymbolDetail::Method(detail) = &mut self.model.symbol_mut(setter).detail {
                detail.params.push(value);
            }
        }
        if let SymbolDetail::Property {
            getter: slot_get,
            setter: slot_set,
            ..
        } = &mut self.model.symbol_mut(id).detail
        {
            *slot_get = getter;
            *slot_set = setter;
        }
        id
    }

    /// Public instance indexer `this[index]`
    pub fn indexer(&mut self, owner: SymbolId, index_ty: TypeRef, ty: TypeRef) -> SymbolId {
        let id = self.property_impl(owner, "Item", ty, true, true, false);
        let param = self.param(id, "index", index_ty, RefKind::None);
        if let SymbolDetail::Property { params, .. } = &mut self.model.symbol_mut(id).detail {
            params.push(param);
        }
        self.make_public(id);
        id
    }

    /// Private instance event
    pub fn event(&mut self, owner: SymbolId, name: &str, ty: TypeRef, is_field_like: bool) -> SymbolId {
        self.alloc_member(
            owner,
            name,
            SymbolKind::Event,
            SymbolDetail::Event { ty, is_field_like },
        )
    }

    fn param(&mut self, owner: SymbolId, name: &str, ty: TypeRef, ref_kind: RefKind) -> SymbolId {
        let mut data = SymbolData::new(name, SymbolKind::Parameter);
        data.containing = Some(owner);
        data.detail = variable(ty, ref_kind);
        self.model.alloc(data)
    }

    fn method_impl(
        &mut self,
        owner: SymbolId,
        name: &str,
        kind: MethodKind,
        params: &[(&str, TypeRef, RefKind)],
        ret: TypeRef,
    ) -> SymbolId {
        let id = self.alloc_member(
            owner,
            name,
            SymbolKind::Method,
            SymbolDetail::Method(MethodDetail {
                method_kind: kind,
                return_type: ret,
                ..MethodDetail::default()
            }),
        );
        let ids: Vec<SymbolId> = params
            .iter()
            .map(|(param, ty, ref_kind)| self.param(id, param, ty.clone(), *ref_kind))
            .collect();
        if let SymbolDetail::Method(detail) = &mut self.model.symbol_mut(id).detail {
            detail.params = ids;
        }
        id
    }

    /// Private instance method with by-value parameters
    pub fn method(&mut self, owner: SymbolId, name: &str, params: &[(&str, TypeRef)], ret: TypeRef) -> SymbolId {
        let params: Vec<(&str, TypeRef, RefKind)> = params
            .iter()
            .map(|(param, ty)| (*param, ty.clone(), RefKind::None))
            .collect();
        self.method_impl(owner, name, MethodKind::Ordinary, &params, ret)
    }

    /// Private instance method with explicit passing modes
    pub fn method_with_refs(
        &mut self,
        owner: SymbolId,
        name: &str,
        params: &[(&str, TypeRef, RefKind)],
        ret: TypeRef,
    ) -> SymbolId {
        self.method_impl(owner, name, MethodKind::Ordinary, params, ret)
    }

    /// Public instance constructor
    pub fn constructor(&mut self, owner: SymbolId, params: &[(&str, TypeRef)]) -> SymbolId {
        let params: Vec<(&str, TypeRef, RefKind)> = params
            .iter()
            .map(|(param, ty)| (*param, ty.clone(), RefKind::None))
            .collect();
        let id = self.method_impl(owner, ".ctor", MethodKind::Constructor, &params, TypeRef::Void);
        self.make_public(id);
        id
    }

    /// Static constructor
    pub fn static_constructor(&mut self, owner: SymbolId) -> SymbolId {
        let id = self.method_impl(owner, ".cctor", MethodKind::StaticConstructor, &[], TypeRef::Void);
        self.make_static(id);
        id
    }

    /// Public static user-defined operator
    pub fn operator(&mut self, owner: SymbolId, name: &str, params: &[(&str, TypeRef)], ret: TypeRef) -> SymbolId {
        let params: Vec<(&str, TypeRef, RefKind)> = params
            .iter()
            .map(|(param, ty)| (*param, ty.clone(), RefKind::None))
            .collect();
        let id = self.method_impl(owner, name, MethodKind::Operator, &params, ret);
        self.make_static(id).make_public(id);
        id
    }

    /// Mark `method` as overriding `base`
    pub fn set_overridden(&mut self, method: SymbolId, base: SymbolId) {
        if let SymbolDetail::Method(detail) = &mut self.model.symbol_mut(method).detail {
            detail.overridden = Some(base);
        }
    }

    /// Mark `method` as implementing `interface_method`
    pub fn add_implementation(&mut self, method: SymbolId, interface_method: SymbolId) {
        if let SymbolDetail::Method(detail) = &mut self.model.symbol_mut(method).detail {
            detail.implements.push(interface_method);
        }
    }

    /// Lambda symbol with by-value parameters; returns the parameter ids
    pub fn lambda_params(&mut self, params: &[(&str, TypeRef)]) -> Vec<SymbolId> {
        let mut data = SymbolData::new("<lambda>", SymbolKind::Method);
        data.detail = SymbolDetail::Method(MethodDetail {
            method_kind: MethodKind::Lambda,
            ..MethodDetail::default()
        });
        let lambda = self.model.alloc(data);
        params
            .iter()
            .map(|(param, ty)| self.param(lambda, param, ty.clone(), RefKind::None))
            .collect()
    }

    /// Local variable of a method
    pub fn local(&mut self, owner: SymbolId, name: &str, ty: TypeRef) -> SymbolId {
        let mut data = SymbolData::new(name, SymbolKind::Local);
        data.containing = Some(owner);
        data.detail = variable(ty, RefKind::None);
        self.model.alloc(data)
    }

    /// Query range variable
    pub fn range_var(&mut self, name: &str, ty: TypeRef) -> SymbolId {
        let mut data = SymbolData::new(name, SymbolKind::RangeVariable);
        data.detail = variable(ty, RefKind::None);
        self.model.alloc(data)
    }

    /// Statement label
    pub fn label(&mut self, name: &str) -> SymbolId {
        self.model.alloc(SymbolData::new(name, SymbolKind::Label))
    }

    /// Expression naming a symbol, typed from the symbol
    pub fn name(&self, id: SymbolId) -> Expr {
        let ty = self.model.type_of(id).cloned().unwrap_or_default();
        Expr::new(ExprKind::Name(id), ty)
    }

    /// `this` of the given type
    pub fn this(&self, ty: SymbolId) -> Expr {
        Expr::new(ExprKind::This, TypeRef::named(ty))
    }

    /// Integer literal
    pub fn int_lit(&self, value: i64) -> Expr {
        Expr::literal(Constant::Int(value), self.int())
    }

    /// Boolean literal
    pub fn bool_lit(&self, value: bool) -> Expr {
        Expr::literal(Constant::Bool(value), self.bool())
    }

    /// String literal
    pub fn string_lit(&self, value: &str) -> Expr {
        Expr::literal(Constant::String(value.to_owned()), self.string())
    }

    /// `null` of the given type
    pub fn null_lit(&self, ty: TypeRef) -> Expr {
        Expr::literal(Constant::Null, ty)
    }

    /// `target.member`, typed from the member
    pub fn member(&self, target: Expr, member: SymbolId) -> Expr {
        let ty = self.model.type_of(member).cloned().unwrap_or_default();
        Expr::new(
            ExprKind::Member {
                target: Box::new(target),
                member,
            },
            ty,
        )
    }

    /// Call of `method` through `callee` with by-value arguments
    pub fn call(&self, callee: Expr, method: SymbolId, args: Vec<Expr>) -> Expr {
        let ty = self.model.type_of(method).cloned().unwrap_or_default();
        Expr::new(
            ExprKind::Invocation {
                callee: Box::new(callee),
                method: Some(method),
                args: args.into_iter().map(Argument::value).collect(),
                type_args: Vec::new(),
            },
            ty,
        )
    }

    /// Binary operation with an explicit result type
    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr, ty: TypeRef) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                method: None,
            },
            ty,
        )
    }

    /// Simple assignment
    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        Expr::new(
            ExprKind::Assignment {
                op: None,
                target: Box::new(target),
                value: Box::new(value),
                method: None,
            },
            ty,
        )
    }
}

fn variable(ty: TypeRef, ref_kind: RefKind) -> SymbolDetail {
    SymbolDetail::Variable {
        ty,
        ref_kind,
        is_readonly: false,
        is_const: false,
        has_default: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_types_are_seeded() {
        let builder = ModelBuilder::new();
        let model = builder.model();
        assert!(model.is_integer(&builder.int()));
        assert!(model.is_string(&builder.string()));
        assert!(model.is_bool(&builder.bool()));
        assert_eq!(model.full_name(builder.int().symbol().unwrap_or(SymbolId(0))), "System.Int32");
    }

    #[test]
    fn test_auto_property_gets_accessors() {
        let mut builder = ModelBuilder::new();
        let ty = builder.class("App", "Player");
        let int = builder.int();
        let prop = builder.auto_property(ty, "Health", int);
        let model = builder.finish();

        match &model.symbol(prop).detail {
            SymbolDetail::Property {
                getter,
                setter,
                is_auto,
                ..
            } => {
                assert!(*is_auto);
                assert!(getter.is_some());
                let setter = setter.unwrap_or(prop);
                assert_eq!(model.params(setter).len(), 1);
            }
            other => panic!("expected property detail, got {other:?}"),
        }
        assert_eq!(model.members(ty), &[prop]);
    }
}

//! Type declarations
//!
//! A class, struct or interface becomes a registration call on its namespace
//! whose closure declares one local per member, runs static initialization,
//! defines constructors and member closures, then returns the public table.
//! All fragments of a partial type are assembled together at the first one.

use crate::context::{LowerCtx, LowerResult, MemberSlot, TypeState};
use crate::error::LowerError;
use crate::facts::extends_itself;
use crate::members::{self, AccessMode, Storage};
use crate::walker::invoke::CallShape;
use crate::walker::stmt::seal;
use lm_scope::FrameKind;
use lm_source::{
    AttributeUse, Body, Constant, ConstructorDecl, EventDecl, Expr as SrcExpr, InitializerKind, MemberDecl, MethodKind,
    PropertyDecl, SemanticModel, SpecialType, SymbolId, TypeDecl, TypeKind, TypeRef,
};
use lm_span::Span;
use lm_target::{Block, Expr, Function, Name, Stmt, TableItem};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// Pieces of one type closure, collected in any order and closed in a
/// fixed one
#[derive(Debug, Default)]
struct TypeBuilder {
    /// Member locals, declared together at the top
    locals: Vec<Name>,
    static_ctor: Option<Stmt>,
    ctors: Vec<Stmt>,
    closures: Vec<Stmt>,
    /// Result table: inheritance and attributes, storage, then members
    table: Vec<TableItem>,
}

impl TypeBuilder {
    fn close(self, type_params: Vec<Name>) -> Block {
        let mut body = Block::new();
        if !self.locals.is_empty() {
            body.push(Stmt::Local {
                names: self.locals,
                values: Vec::new(),
            });
        }
        body.stmts.extend(self.static_ctor);
        body.stmts.extend(self.ctors);
        body.stmts.extend(self.closures);
        body.push(Stmt::Return(vec![Expr::Table(self.table)]));
        if type_params.is_empty() {
            return body;
        }
        Block::of(vec![Stmt::Return(vec![Expr::function(Function::new(type_params, body))])])
    }
}

/// Members of every fragment of a type
struct Parts<'decl> {
    ty: SymbolId,
    kind: TypeKind,
    members: Vec<&'decl MemberDecl>,
    attributes: Vec<&'decl AttributeUse>,
    has_nested: bool,
    span: Span,
}

impl<'decl> Parts<'decl> {
    /// Storage-bearing members with their initializers
    fn storage<'this>(
        &'this self,
        model: &'this SemanticModel,
    ) -> impl Iterator<Item = (SymbolId, Option<&'decl SrcExpr>, Span)> + 'this {
        self.members.iter().filter_map(move |member| {
            members::storage_member(model, *member).map(|(symbol, init)| (symbol, init, member_span(member)))
        })
    }

    fn static_ctor(&self, model: &SemanticModel) -> Option<&'decl ConstructorDecl> {
        self.members.iter().find_map(|member| match *member {
            MemberDecl::Constructor(decl)
                if model
                    .method(decl.symbol)
                    .is_some_and(|detail| detail.method_kind == MethodKind::StaticConstructor) =>
            {
                Some(decl)
            }
            _ => None,
        })
    }
}

fn member_span(member: &MemberDecl) -> Span {
    match member {
        MemberDecl::Field(decl) => decl.span,
        MemberDecl::Property(decl) | MemberDecl::Indexer(decl) => decl.span,
        MemberDecl::Event(decl) => decl.span,
        MemberDecl::Method(decl) => decl.span,
        MemberDecl::Constructor(decl) => decl.span,
        MemberDecl::Type(decl) => decl.span,
        MemberDecl::EnumMember(decl) => decl.span,
    }
}

fn accessor_local(is_property: bool, is_get: bool, name: &str) -> String {
    let prefix = match (is_property, is_get) {
        (true, true) => "get",
        (true, false) => "set",
        (false, true) => "add",
        (false, false) => "remove",
    };
    format!("{prefix}{name}")
}

fn ctor_local(index: usize, count: usize) -> String {
    if count == 1 {
        "__ctor__".to_owned()
    } else {
        format!("__ctor{}__", index + 1)
    }
}

fn keyed(name: &str, value: Expr) -> TableItem {
    TableItem::Keyed(Name::new(name), value)
}

impl LowerCtx<'_> {
    /// Emit a type, then its nested types, as registrations on `namespace`
    pub(crate) fn lower_type(&mut self, decl: &TypeDecl, namespace: &Name, out: &mut Block) -> LowerResult<()> {
        let model = self.model;
        let facts = self.facts;
        let ty = decl.symbol;
        let fragments: Vec<&TypeDecl> = match facts.fragments(ty) {
            [] => vec![decl],
            fragments => fragments.iter().map(|fragment| fragment.decl).collect(),
        };
        let kind = model.type_kind(ty).unwrap_or_default();
        debug!(ty = %model.full_name(ty), ?kind, fragments = fragments.len(), "lowering type");
        match kind {
            TypeKind::Delegate => {}
            TypeKind::Enum => {
                self.lower_enum(ty, &fragments, namespace, out)?;
                self.type_count += 1;
            }
            TypeKind::Class | TypeKind::Struct | TypeKind::Interface => {
                let parts = Parts {
                    ty,
                    kind,
                    members: fragments.iter().flat_map(|fragment| &fragment.members).collect(),
                    attributes: fragments.iter().flat_map(|fragment| &fragment.attributes).collect(),
                    has_nested: fragments
                        .iter()
                        .any(|fragment| fragment.members.iter().any(|member| matches!(member, MemberDecl::Type(_)))),
                    span: decl.span,
                };
                let body = self.lower_type_closure(&parts)?;
                out.push(self.registration(namespace, kind, ty, Function::new(vec![namespace.clone()], body)));
                self.type_count += 1;
            }
        }

        for fragment in &fragments {
            for member in &fragment.members {
                if let MemberDecl::Type(nested) = member
                    && (facts.fragments(nested.symbol).is_empty() || facts.is_first_fragment(nested))
                {
                    self.lower_type(nested, namespace, out)?;
                }
            }
        }
        Ok(())
    }

    /// `namespace.class("Name", closure)`
    fn registration(&self, namespace: &Name, kind: TypeKind, ty: SymbolId, closure: Function) -> Stmt {
        let method = match kind {
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Class | TypeKind::Delegate => "class",
        };
        let registrar = Expr::member(Expr::Ident(namespace.clone()), method);
        Stmt::Expr(Expr::call(
            registrar,
            vec![Expr::string(self.model.nested_name(ty)), Expr::function(closure)],
        ))
    }

    fn lower_enum(&mut self, ty: SymbolId, fragments: &[&TypeDecl], namespace: &Name, out: &mut Block) -> LowerResult<()> {
        let model = self.model;
        let enum_ty = TypeRef::named(ty);
        let mut table = Vec::new();
        for member in fragments.iter().flat_map(|fragment| &fragment.members) {
            if let MemberDecl::EnumMember(decl) = member {
                let value = model.symbol(decl.symbol).constant.clone().unwrap_or(Constant::Int(0));
                let name = self.member_name(decl.symbol, decl.span)?;
                table.push(keyed(&name, self.constant_expr(&value, &enum_ty)));
            }
        }
        let body = Block::of(vec![Stmt::Return(vec![Expr::Table(table)])]);
        out.push(self.registration(namespace, TypeKind::Enum, ty, Function::new(vec![namespace.clone()], body)));
        self.exports.push(self.type_path(ty));
        Ok(())
    }

    fn lower_type_closure(&mut self, parts: &Parts<'_>) -> LowerResult<Block> {
        let at = self.at(parts.span);
        self.scopes.push(FrameKind::Type, Some(at));
        self.types.push(TypeState {
            symbol: parts.ty,
            locals: FxHashMap::default(),
        });
        let assembled = self.assemble(parts);
        self.types.pop();
        self.scopes
            .pop()
            .map_err(|error| LowerError::from_scope(error, at))?;
        assembled
    }

    fn assemble(&mut self, parts: &Parts<'_>) -> LowerResult<Block> {
        let model = self.model;
        let type_params: Vec<Name> = model
            .type_detail(parts.ty)
            .map(|detail| detail.type_params.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|param| self.declare(param))
            .collect();

        let mut builder = TypeBuilder::default();
        self.declare_accessor_locals(parts, &mut builder)?;
        self.declare_member_locals(parts, &mut builder)?;
        let init = self
            .needs_instance_init(parts)
            .then(|| self.bind_local(None, "__init__", &mut builder));
        let static_ctor = self
            .needs_static_ctor(parts)
            .then(|| self.bind_local(None, "__staticCtor__", &mut builder));
        let ctors = self.declare_ctor_locals(parts, init.is_some(), &mut builder);

        self.lower_type_header(parts, &mut builder)?;
        self.lower_storage_entries(parts, &mut builder)?;
        if let Some(local) = static_ctor {
            let function = self.lower_static_ctor(parts)?;
            builder.static_ctor = Some(Stmt::assign(Expr::Ident(local.clone()), Expr::function(function)));
            builder.table.push(keyed("__staticCtor__", Expr::Ident(local)));
        }
        if let Some(local) = &init {
            let function = self.lower_instance_init(parts)?;
            builder.ctors.push(Stmt::assign(Expr::Ident(local.clone()), Expr::function(function)));
        }
        self.lower_ctors(parts, &ctors, init.as_ref(), &mut builder)?;
        if parts.kind == TypeKind::Struct {
            self.lower_struct_support(parts, &mut builder)?;
        }
        self.lower_member_closures(parts, &mut builder)?;

        trace!(
            locals = builder.locals.len(),
            ctors = ctors.len(),
            entries = builder.table.len(),
            "type closed"
        );
        Ok(builder.close(type_params))
    }

    /// Reserve a type-level local, keyed by `slot` when members reach it
    fn bind_local(&mut self, slot: Option<MemberSlot>, preferred: &str, builder: &mut TypeBuilder) -> Name {
        let name = self.scopes.fresh(preferred);
        if let Some(slot) = slot
            && let Some(state) = self.types.last_mut()
        {
            state.locals.insert(slot, name.clone());
        }
        builder.locals.push(name.clone());
        name
    }

    /// Accessor closures a property emits, as (getter, setter)
    fn property_closures(&self, parts: &Parts<'_>, decl: &PropertyDecl) -> (bool, bool) {
        let model = self.model;
        let indexer = !model.params(decl.symbol).is_empty();
        if !indexer && members::property_mode(model, self.overrides, decl.symbol) == AccessMode::Field {
            return (false, false);
        }
        if members::is_auto_property(model, decl.symbol) {
            let concrete = parts.kind != TypeKind::Interface;
            return (concrete, concrete);
        }
        let getter = decl.expression_body.is_some() || decl.getter.as_ref().is_some_and(|getter| getter.body.is_some());
        let setter = decl.setter.as_ref().is_some_and(|setter| setter.body.is_some());
        (getter, setter)
    }

    fn event_closures(&self, decl: &EventDecl) -> (bool, bool) {
        if members::event_mode(self.model, decl.symbol) == AccessMode::Field {
            return (false, false);
        }
        (
            decl.adder.as_ref().is_some_and(|adder| adder.body.is_some()),
            decl.remover.as_ref().is_some_and(|remover| remover.body.is_some()),
        )
    }

    /// Accessor locals go first so they keep their exact accessor names
    fn declare_accessor_locals(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        for member in &parts.members {
            let (symbol, is_property, (get, set), span) = match member {
                MemberDecl::Property(decl) | MemberDecl::Indexer(decl) => {
                    (decl.symbol, true, self.property_closures(parts, decl), decl.span)
                }
                MemberDecl::Event(decl) => (decl.symbol, false, self.event_closures(decl), decl.span),
                _ => continue,
            };
            let name = self.member_name(symbol, span)?;
            for (is_get, wanted) in [(true, get), (false, set)] {
                if wanted {
                    let local = accessor_local(is_property, is_get, &name);
                    self.bind_local(Some(MemberSlot::Accessor(symbol, is_get)), &local, builder);
                }
            }
        }
        Ok(())
    }

    fn declare_member_locals(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        for member in &parts.members {
            match member {
                MemberDecl::Method(decl) if decl.body.is_some() => {
                    let name = self.member_name(decl.symbol, decl.span)?;
                    self.bind_local(Some(MemberSlot::Member(decl.symbol)), &name, builder);
                }
                MemberDecl::Field(_) | MemberDecl::Property(_) | MemberDecl::Event(_) => {
                    let Some((symbol, init)) = members::storage_member(model, member) else {
                        continue;
                    };
                    if members::storage(model, symbol, init, parts.has_nested) == Storage::TypeLocal {
                        let name = self.member_name(symbol, member_span(member))?;
                        self.bind_local(Some(MemberSlot::Member(symbol)), &name, builder);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Constructors in emission order with their locals; the zero-argument
    /// one first
    fn declare_ctor_locals(
        &mut self,
        parts: &Parts<'_>,
        has_init: bool,
        builder: &mut TypeBuilder,
    ) -> Vec<(Option<SymbolId>, Name)> {
        if parts.kind == TypeKind::Interface {
            return Vec::new();
        }
        let model = self.model;
        let mut order = members::ctor_order(model, parts.ty);
        if order.is_empty() {
            let base = model
                .base_of(parts.ty)
                .map(|base| self.facts.type_facts(base))
                .unwrap_or_default();
            if has_init || base.ctor_count > 1 || base.has_static_ctor {
                order.push(None);
            }
        }
        let count = order.len();
        order
            .into_iter()
            .enumerate()
            .map(|(index, ctor)| {
                let local = self.bind_local(ctor.map(MemberSlot::Ctor), &ctor_local(index, count), builder);
                (ctor, local)
            })
            .collect()
    }

    fn needs_instance_init(&self, parts: &Parts<'_>) -> bool {
        let model = self.model;
        parts.kind != TypeKind::Interface
            && parts.storage(model).any(|(symbol, init, _)| {
                members::storage(model, symbol, init, parts.has_nested) == Storage::InstanceInit
            })
    }

    fn needs_static_ctor(&self, parts: &Parts<'_>) -> bool {
        let model = self.model;
        let statics = parts.storage(model).any(|(symbol, init, _)| {
            matches!(
                members::storage(model, symbol, init, parts.has_nested),
                Storage::TypeLocal | Storage::StaticSlot
            ) && members::static_statement_needed(model, symbol, init)
        });
        statics || parts.static_ctor(model).is_some() || extends_itself(model, parts.ty)
    }

    /// `__inherits__` and `__attributes__`
    fn lower_type_header(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        let Some(detail) = model.type_detail(parts.ty) else {
            return Ok(());
        };
        let at = self.at(parts.span);
        let supers: Vec<&TypeRef> = detail
            .base
            .iter()
            .filter(|base| model.special(base) != Some(SpecialType::Object))
            .chain(&detail.interfaces)
            .collect();
        if !supers.is_empty() {
            self.enter_function(None, at);
            let out = self.synthetic("out");
            let list = supers
                .into_iter()
                .map(|ty| TableItem::Positional(self.type_expr_in(ty, Some(&out))))
                .collect();
            self.leave_function()?;
            let body = Block::of(vec![Stmt::Return(vec![Expr::Table(list)])]);
            builder
                .table
                .push(keyed("__inherits__", Expr::function(Function::new(vec![out], body))));
        }

        let exported: Vec<&AttributeUse> = parts
            .attributes
            .iter()
            .copied()
            .filter(|attribute| self.is_exported_attribute(&attribute.ty))
            .collect();
        if exported.is_empty() {
            return Ok(());
        }
        self.enter_function(None, at);
        let out = self.synthetic("out");
        let mut body = Block::new();
        let mut list = Vec::with_capacity(exported.len());
        for attribute in exported {
            let mut args = Vec::with_capacity(attribute.args.len());
            for arg in &attribute.args {
                args.push(self.lower_expr(arg, &mut body)?);
            }
            list.push(TableItem::Positional(Expr::call(
                self.type_expr_in(&attribute.ty, Some(&out)),
                args,
            )));
        }
        self.leave_function()?;
        body.push(Stmt::Return(vec![Expr::Table(list)]));
        builder
            .table
            .push(keyed("__attributes__", Expr::function(Function::new(vec![out], body))));
        self.exports.push(self.type_path(parts.ty));
        Ok(())
    }

    fn is_exported_attribute(&self, ty: &TypeRef) -> bool {
        let Some(symbol) = ty.symbol() else {
            return false;
        };
        let full_name = self.model.full_name(symbol);
        self.options.export_all_attributes
            || self.options.export_attributes.contains(&full_name)
            || self.overrides.is_export_attribute(&full_name)
    }

    /// Constant statics and constant instance defaults live in the result
    /// table
    fn lower_storage_entries(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        for (symbol, init, span) in parts.storage(model) {
            let data = model.symbol(symbol);
            if parts.kind == TypeKind::Interface && !data.is_static {
                continue;
            }
            let ty = model.type_of(symbol).cloned().unwrap_or_default();
            let constant = match members::storage(model, symbol, init, parts.has_nested) {
                Storage::TableEntry => init
                    .and_then(|init| init.constant.clone())
                    .or_else(|| data.constant.clone()),
                Storage::InstanceDefault => match init {
                    Some(init) => init.constant.clone(),
                    None => members::default_constant(model, &ty),
                },
                Storage::TypeLocal | Storage::StaticSlot | Storage::InstanceInit => None,
            };
            if let Some(constant) = constant.filter(|constant| *constant != Constant::Null) {
                let name = self.member_name(symbol, span)?;
                builder.table.push(keyed(&name, self.constant_expr(&constant, &ty)));
            }
        }
        Ok(())
    }

    /// Open a function frame whose first parameter is the receiver
    fn enter_receiver_function(&mut self, span: Span) -> LowerResult<Name> {
        self.enter_function(None, self.at(span));
        let this = self.synthetic("this");
        self.function_mut(span)?.this = Some(this.clone());
        Ok(this)
    }

    /// Static initializers, lazy ones first, then the explicit static
    /// constructor body; `this` is the type table
    fn lower_static_ctor(&mut self, parts: &Parts<'_>) -> LowerResult<Function> {
        let model = self.model;
        let this = self.enter_receiver_function(parts.span)?;
        let generic = model
            .type_detail(parts.ty)
            .is_some_and(|detail| !detail.type_params.is_empty());
        let mut lazy = Block::new();
        let mut body = Block::new();
        for (symbol, init, span) in parts.storage(model) {
            let storage = members::storage(model, symbol, init, parts.has_nested);
            if !matches!(storage, Storage::TypeLocal | Storage::StaticSlot)
                || !members::static_statement_needed(model, symbol, init)
            {
                continue;
            }
            let ty = model.type_of(symbol).cloned().unwrap_or_default();
            let out = if generic && ty.is_open() { &mut lazy } else { &mut body };
            let value = match init {
                Some(init) => self.lower_expr(init, out)?,
                None => self.default_value(&ty),
            };
            let target = match self.type_local(MemberSlot::Member(symbol)) {
                Some(local) if storage == Storage::TypeLocal => Expr::Ident(local.clone()),
                _ => Expr::member(Expr::Ident(this.clone()), self.member_name(symbol, span)?),
            };
            out.push(Stmt::assign(target, value));
        }
        if let Some(decl) = parts.static_ctor(model)
            && let Some(block) = &decl.body
        {
            self.lower_block(&block.stmts, &mut body)?;
        }
        self.leave_function()?;
        lazy.stmts.extend(body.stmts);
        seal(&mut lazy);
        Ok(Function::new(vec![this], lazy))
    }

    /// `__init__`: instance members that need a run-time value
    fn lower_instance_init(&mut self, parts: &Parts<'_>) -> LowerResult<Function> {
        let model = self.model;
        let this = self.enter_receiver_function(parts.span)?;
        let mut body = Block::new();
        for (symbol, init, span) in parts.storage(model) {
            if members::storage(model, symbol, init, parts.has_nested) != Storage::InstanceInit {
                continue;
            }
            let ty = model.type_of(symbol).cloned().unwrap_or_default();
            let value = match init {
                Some(init) => self.lower_expr(init, &mut body)?,
                None => self.default_value(&ty),
            };
            let target = Expr::member(Expr::Ident(this.clone()), self.member_name(symbol, span)?);
            body.push(Stmt::assign(target, value));
        }
        self.leave_function()?;
        Ok(Function::new(vec![this], body))
    }

    fn lower_ctors(
        &mut self,
        parts: &Parts<'_>,
        ctors: &[(Option<SymbolId>, Name)],
        init: Option<&Name>,
        builder: &mut TypeBuilder,
    ) -> LowerResult<()> {
        let decls: FxHashMap<SymbolId, &ConstructorDecl> = parts
            .members
            .iter()
            .filter_map(|member| match member {
                MemberDecl::Constructor(decl) => Some((decl.symbol, decl)),
                _ => None,
            })
            .collect();
        for (ctor, local) in ctors {
            let decl = ctor.and_then(|ctor| decls.get(&ctor).copied());
            let function = self.lower_ctor(parts, decl, init)?;
            builder
                .ctors
                .push(Stmt::assign(Expr::Ident(local.clone()), Expr::function(function)));
        }
        let slot = match ctors {
            [] => return Ok(()),
            [(_, only)] => Expr::Ident(only.clone()),
            many => Expr::Table(
                many.iter()
                    .map(|(_, local)| TableItem::Positional(Expr::Ident(local.clone())))
                    .collect(),
            ),
        };
        builder.table.push(keyed("__ctor__", slot));
        Ok(())
    }

    /// One constructor: instance initializer unless it chains to a sibling,
    /// then the chained or implicit base call, then the body
    fn lower_ctor(&mut self, parts: &Parts<'_>, decl: Option<&ConstructorDecl>, init: Option<&Name>) -> LowerResult<Function> {
        let span = decl.map_or(parts.span, |decl| decl.span);
        let params = match decl {
            Some(decl) => self.begin_function(decl.symbol, true, false, span)?,
            None => vec![self.enter_receiver_function(span)?],
        };
        let this = self
            .this_name()
            .cloned()
            .ok_or_else(|| LowerError::unsupported("constructor without a receiver", self.at(span)))?;
        let mut body = Block::new();
        let initializer = decl.and_then(|decl| decl.initializer.as_ref());
        let chains = initializer.is_some_and(|initializer| initializer.kind == InitializerKind::This);
        if !chains && let Some(init) = init {
            body.push(Stmt::Expr(Expr::call(Expr::Ident(init.clone()), vec![Expr::Ident(this.clone())])));
        }
        match initializer {
            Some(initializer) => {
                let callee = match initializer.kind {
                    InitializerKind::This => match self.type_local(MemberSlot::Ctor(initializer.ctor)) {
                        Some(local) => Expr::Ident(local.clone()),
                        None => self.ctor_slot(&TypeRef::named(parts.ty), Some(initializer.ctor)),
                    },
                    InitializerKind::Base => {
                        let base = self
                            .model
                            .type_detail(parts.ty)
                            .and_then(|detail| detail.base.clone())
                            .unwrap_or_default();
                        self.ctor_slot(&base, Some(initializer.ctor))
                    }
                };
                let lowered = self.lower_arguments(
                    vec![Expr::Ident(this.clone())],
                    &initializer.args,
                    Some(initializer.ctor),
                    &[],
                    &mut body,
                )?;
                let call = Expr::call(callee, lowered.values);
                if lowered.refs.is_empty() {
                    body.push(Stmt::Expr(call));
                } else {
                    let shape = CallShape {
                        call,
                        refs: lowered.refs,
                        returns_value: false,
                    };
                    self.assign_results(None, shape, &mut body)?;
                }
            }
            None => {
                if let Some(callee) = self.implicit_base_ctor(parts.ty) {
                    body.push(Stmt::Expr(Expr::call(callee, vec![Expr::Ident(this)])));
                }
            }
        }
        match decl {
            Some(decl) => {
                if let Some(block) = &decl.body {
                    self.lower_block(&block.stmts, &mut body)?;
                }
                self.finish_function(decl.symbol, params, body, false)
            }
            None => {
                self.leave_function()?;
                seal(&mut body);
                Ok(Function::new(params, body))
            }
        }
    }

    /// `T.__ctor__`, indexed when `T` has more than one constructor
    fn ctor_slot(&self, ty: &TypeRef, ctor: Option<SymbolId>) -> Expr {
        let model = self.model;
        let slot = Expr::member(self.type_expr(ty), "__ctor__");
        let Some(symbol) = ty.symbol() else {
            return slot;
        };
        let count = if self.facts.fragments(symbol).is_empty() {
            model.constructors(symbol).len()
        } else {
            self.facts.type_facts(symbol).ctor_count
        };
        if count <= 1 {
            return slot;
        }
        let index = i64::try_from(members::ctor_index(model, symbol, ctor)).unwrap_or(1);
        Expr::Index {
            target: Box::new(slot),
            key: Box::new(Expr::int(index)),
        }
    }

    /// Zero-argument base constructor a constructor calls when it declares
    /// no initializer; only bases compiled in this run have one to call. A
    /// base with only a static constructor is called through the slot it
    /// inherits from `System.Object`
    fn implicit_base_ctor(&self, ty: SymbolId) -> Option<Expr> {
        let model = self.model;
        let base = model.type_detail(ty)?.base.clone()?;
        let symbol = base.symbol()?;
        if self.facts.fragments(symbol).is_empty() {
            return None;
        }
        let facts = self.facts.type_facts(symbol);
        if facts.ctor_count == 0 && !facts.has_static_ctor {
            return None;
        }
        let zero_arg = model
            .constructors(symbol)
            .into_iter()
            .find(|ctor| model.params(*ctor).is_empty());
        Some(self.ctor_slot(&base, zero_arg))
    }

    /// `__default__` and `__clone__` of a struct
    fn lower_struct_support(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        let fresh = Block::of(vec![Stmt::Return(vec![Expr::call(self.self_type_expr(parts.ty), Vec::new())])]);
        builder
            .table
            .push(keyed("__default__", Expr::function(Function::new(Vec::new(), fresh))));

        let this = self.enter_receiver_function(parts.span)?;
        let mut fields = Vec::new();
        for (symbol, _, span) in parts.storage(model) {
            if model.symbol(symbol).is_static {
                continue;
            }
            let name = Name::new(self.member_name(symbol, span)?);
            let value = Expr::Member {
                target: Box::new(Expr::Ident(this.clone())),
                name: name.clone(),
                colon: false,
            };
            fields.push(TableItem::Keyed(name, value));
        }
        self.leave_function()?;
        let copy = Expr::call(
            Expr::ident("setmetatable"),
            vec![
                Expr::Table(fields),
                Expr::call(Expr::ident("getmetatable"), vec![Expr::Ident(this.clone())]),
            ],
        );
        let body = Block::of(vec![Stmt::Return(vec![copy])]);
        builder
            .table
            .push(keyed("__clone__", Expr::function(Function::new(vec![this], body))));
        Ok(())
    }

    /// Methods and accessors, in declaration order
    fn lower_member_closures(&mut self, parts: &Parts<'_>, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        for member in &parts.members {
            match member {
                MemberDecl::Method(decl) => {
                    let Some(local) = self.type_local(MemberSlot::Member(decl.symbol)).cloned() else {
                        continue;
                    };
                    let has_this = !model.symbol(decl.symbol).is_static;
                    let function = self.lower_function(decl.symbol, decl.body.as_ref(), has_this, false, decl.span)?;
                    self.push_closure(decl.symbol, local, function, None, parts, builder)?;
                }
                MemberDecl::Property(decl) | MemberDecl::Indexer(decl) => {
                    self.lower_property_closures(parts, decl, builder)?;
                }
                MemberDecl::Event(decl) => {
                    for (is_get, accessor) in [(true, &decl.adder), (false, &decl.remover)] {
                        let Some(local) = self.type_local(MemberSlot::Accessor(decl.symbol, is_get)).cloned() else {
                            continue;
                        };
                        let Some(accessor) = accessor else {
                            continue;
                        };
                        let has_this = !model.symbol(decl.symbol).is_static;
                        let function =
                            self.lower_function(accessor.symbol, accessor.body.as_ref(), has_this, false, accessor.span)?;
                        let key = accessor_local(false, is_get, &self.member_name(decl.symbol, decl.span)?);
                        self.push_closure(decl.symbol, local, function, Some(Name::new(key)), parts, builder)?;
                    }
                }
                MemberDecl::Field(_)
                | MemberDecl::Constructor(_)
                | MemberDecl::Type(_)
                | MemberDecl::EnumMember(_) => {}
            }
        }
        Ok(())
    }

    fn lower_property_closures(&mut self, parts: &Parts<'_>, decl: &PropertyDecl, builder: &mut TypeBuilder) -> LowerResult<()> {
        let model = self.model;
        let has_this = !model.symbol(decl.symbol).is_static;
        let auto = members::is_auto_property(model, decl.symbol);
        for is_get in [true, false] {
            let Some(local) = self.type_local(MemberSlot::Accessor(decl.symbol, is_get)).cloned() else {
                continue;
            };
            let function = if auto {
                self.storage_accessor(decl.symbol, is_get, decl.span)?
            } else if is_get {
                match (&decl.expression_body, &decl.getter) {
                    (Some(expr), getter) => {
                        let symbol = getter.as_ref().map_or(decl.symbol, |getter| getter.symbol);
                        let body = Body::Expr(expr.clone());
                        self.lower_function(symbol, Some(&body), has_this, false, decl.span)?
                    }
                    (None, Some(getter)) => {
                        self.lower_function(getter.symbol, getter.body.as_ref(), has_this, false, getter.span)?
                    }
                    (None, None) => continue,
                }
            } else {
                let Some(setter) = &decl.setter else {
                    continue;
                };
                self.lower_function(setter.symbol, setter.body.as_ref(), has_this, false, setter.span)?
            };
            let key = accessor_local(true, is_get, &self.member_name(decl.symbol, decl.span)?);
            self.push_closure(decl.symbol, local, function, Some(Name::new(key)), parts, builder)?;
        }
        Ok(())
    }

    /// Accessor over the storage of an auto-property reached in accessor
    /// mode
    fn storage_accessor(&mut self, property: SymbolId, is_get: bool, span: Span) -> LowerResult<Function> {
        let model = self.model;
        let is_static = model.symbol(property).is_static;
        let name = self.member_name(property, span)?;
        let mut params = Vec::new();
        let target = if let Some(local) = self.type_local(MemberSlot::Member(property)).cloned() {
            self.enter_function(None, self.at(span));
            Expr::Ident(local)
        } else if is_static {
            self.enter_function(None, self.at(span));
            Expr::member(self.self_type_expr(self.model.declaring_type(property).unwrap_or(property)), name)
        } else {
            let this = self.enter_receiver_function(span)?;
            params.push(this.clone());
            Expr::member(Expr::Ident(this), name)
        };
        let body = if is_get {
            Block::of(vec![Stmt::Return(vec![target])])
        } else {
            let value = self.synthetic("value");
            params.push(value.clone());
            Block::of(vec![Stmt::assign(target, Expr::Ident(value))])
        };
        self.leave_function()?;
        Ok(Function::new(params, body))
    }

    /// Assign a member closure to its local and expose it when visible
    /// outside the type closure
    fn push_closure(
        &mut self,
        member: SymbolId,
        local: Name,
        function: Function,
        key: Option<Name>,
        parts: &Parts<'_>,
        builder: &mut TypeBuilder,
    ) -> LowerResult<()> {
        let model = self.model;
        let exposed = !model.symbol(member).is_private() || parts.has_nested;
        builder
            .closures
            .push(Stmt::assign(Expr::Ident(local.clone()), Expr::function(function)));
        if exposed {
            let key = match key {
                Some(key) => key,
                None => Name::new(self.member_name(member, Span::detached())?),
            };
            builder.table.push(TableItem::Keyed(key, Expr::Ident(local)));
        }
        Ok(())
    }
}

//! Expression lowering
//!
//! Every case returns the target expression standing for the value and pushes
//! the statements that must run first into `out`. Operands are evaluated
//! left to right; when a later operand needs statements of its own, earlier
//! impure operands are cached so the source evaluation order holds.

use crate::access::Place;
use crate::context::{LowerCtx, LowerResult, MemberSlot};
use crate::error::LowerError;
use crate::members::{self, AccessMode};
use lm_source::{
    BinaryOp, Constant, Expr as SrcExpr, ExprKind, InterpolationPart, LambdaBody, SymbolId, SymbolKind, TypeRef,
    UnaryOp,
};
use lm_span::Span;
use lm_target::{BinOp, Block, Expr, Function, IfStmt, Literal, Name, PropertyAdapter, Stmt};
use std::mem;

/// Where the receiver of a member access comes from
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'src> {
    /// No receiver written: `this` or the declaring type
    Implicit,
    /// A source receiver expression
    Source(&'src SrcExpr),
}

impl<'src> Target<'src> {
    pub(crate) fn of(target: &'src SrcExpr) -> Self {
        Self::Source(target.unparen())
    }
}

/// Lowered receiver of a member access
#[derive(Debug, Clone)]
pub(crate) enum Receiver {
    /// Static member; the expression names the declaring type
    Static(Expr),
    /// Instance member on a value
    Instance(Expr),
    /// Instance member reached through `base`
    Base { this: Expr, base: Expr },
}

impl LowerCtx<'_> {
    /// Lower an expression for its value
    pub(crate) fn lower_expr(&mut self, expr: &SrcExpr, out: &mut Block) -> LowerResult<Expr> {
        if let Some(constant) = &expr.constant
            && self.inlines_constant(expr, constant)
        {
            return Ok(self.constant_expr(constant, &expr.ty));
        }
        match &expr.kind {
            ExprKind::Literal(constant) => Ok(self.constant_expr(constant, &expr.ty)),
            ExprKind::Name(symbol) => self.lower_name(*symbol, expr.span, out),
            ExprKind::This | ExprKind::Base => self.this_expr(expr.span),
            ExprKind::Member { target, member } => self.lower_member(Target::of(target), *member, expr.span, out),
            ExprKind::DynamicMember { target, name } => {
                let target = self.lower_expr(target, out)?;
                Ok(Expr::member(target, name.clone()))
            }
            ExprKind::Element { target, args, indexer } => {
                self.element_place(target, args, *indexer, expr.span, out)?.read()
            }
            ExprKind::Invocation { .. } => self.lower_invocation(expr, out),
            ExprKind::ObjectCreation {
                ty,
                ctor,
                args,
                initializers,
            } => self.lower_object_creation(expr, ty, *ctor, args, initializers, out),
            ExprKind::ArrayCreation { elem, items } => {
                let items: Vec<&SrcExpr> = items.iter().collect();
                let items = self.lower_operands(&items, out)?;
                Ok(Expr::call(self.type_expr(&TypeRef::Array(Box::new(elem.clone()))), items))
            }
            ExprKind::Assignment {
                op,
                target,
                value,
                method,
            } => self.lower_assignment(*op, target, value, *method, true, expr.span, out),
            ExprKind::Binary {
                op,
                left,
                right,
                method,
            } => self.lower_binary(expr, *op, left, right, *method, out),
            ExprKind::Unary { op, operand, method } if op.is_step() => {
                self.lower_step(*op, operand, *method, true, expr.span, out)
            }
            ExprKind::Unary { op, operand, method } => self.lower_unary(*op, operand, *method, expr.span, out),
            ExprKind::Conditional {
                cond,
                when_true,
                when_false,
            } => self.lower_conditional(cond, when_true, when_false, out),
            ExprKind::Is {
                operand,
                ty,
                designation,
            } => self.lower_is(operand, ty, *designation, out),
            ExprKind::As { operand, ty } => {
                let value = self.lower_expr(operand, out)?;
                if self.model.is_subclass_of(&operand.ty, ty) {
                    return Ok(value);
                }
                Ok(Expr::call(Expr::path("System.as"), vec![value, self.type_expr(ty)]))
            }
            ExprKind::Cast { operand, ty } => {
                let value = self.lower_expr(operand, out)?;
                if self.model.is_subclass_of(&operand.ty, ty) {
                    return Ok(value);
                }
                Ok(Expr::call(Expr::path("System.cast"), vec![self.type_expr(ty), value]))
            }
            ExprKind::Lambda { params, body } => self.lower_lambda(params, body, expr.span),
            ExprKind::Query(query) => self.lower_query(query, out),
            ExprKind::Paren(inner) => self.lower_expr(inner, out),
            ExprKind::TypeOf(ty) => Ok(Expr::call(Expr::path("System.typeof"), vec![self.type_expr(ty)])),
            ExprKind::Default(ty) => Ok(self.default_value(ty)),
            ExprKind::Interpolated(parts) => self.lower_interpolated(parts, out),
            ExprKind::TypeName(ty) => Ok(self.type_expr(ty)),
        }
    }

    /// Lower operands left to right, keeping their evaluation order when a
    /// later one needs statements
    pub(crate) fn lower_operands(&mut self, exprs: &[&SrcExpr], out: &mut Block) -> LowerResult<Vec<Expr>> {
        let mut values: Vec<Expr> = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let mut prelude = Block::new();
            let value = self.lower_expr(expr, &mut prelude)?;
            if !prelude.is_empty() {
                self.cache_all(&mut values, out)?;
            }
            out.stmts.extend(prelude.stmts);
            values.push(value);
        }
        Ok(values)
    }

    /// Cache every already-lowered value that could observe later effects.
    /// Field reads are copied too, since a later operand may write the field
    pub(crate) fn cache_all(&mut self, values: &mut [Expr], out: &mut Block) -> LowerResult<()> {
        for value in values.iter_mut() {
            if value.is_pure() {
                continue;
            }
            let temp = self.temp()?;
            out.push(Stmt::local(temp.clone(), mem::replace(value, Expr::Ident(temp))));
        }
        Ok(())
    }

    /// Lower an expression evaluated only for its effects
    pub(crate) fn lower_expr_stmt(&mut self, expr: &SrcExpr, out: &mut Block) -> LowerResult<()> {
        match &expr.kind {
            ExprKind::Paren(inner) => self.lower_expr_stmt(inner, out),
            ExprKind::Assignment {
                op,
                target,
                value,
                method,
            } => self
                .lower_assignment(*op, target, value, *method, false, expr.span, out)
                .map(drop),
            ExprKind::Unary { op, operand, method } if op.is_step() => self
                .lower_step(*op, operand, *method, false, expr.span, out)
                .map(drop),
            ExprKind::Invocation { .. } => self.lower_invocation_stmt(expr, out),
            _ => {
                let value = self.lower_expr(expr, out)?;
                self.discard(value, out)
            }
        }
    }

    /// Emit a value whose result is unused
    pub(crate) fn discard(&mut self, value: Expr, out: &mut Block) -> LowerResult<()> {
        match value {
            Expr::Call { .. } | Expr::PropertyAdapter(_) | Expr::Template(_) => out.push(Stmt::Expr(value)),
            pure if pure.is_pure() => {}
            other => {
                let temp = self.temp()?;
                out.push(Stmt::local(temp, other));
            }
        }
        Ok(())
    }

    /// Constants are inlined unless they are long strings read through a
    /// named field
    fn inlines_constant(&self, expr: &SrcExpr, constant: &Constant) -> bool {
        match &expr.kind {
            ExprKind::Name(symbol) | ExprKind::Member { member: symbol, .. }
                if self.model.symbol(*symbol).kind == SymbolKind::Field =>
            {
                !matches!(constant, Constant::String(text) if text.chars().count() > self.options.inline_string_const_len)
            }
            ExprKind::Assignment { .. } | ExprKind::Invocation { .. } | ExprKind::Unary { .. } => false,
            _ => true,
        }
    }

    /// Target literal for a constant of static type `ty`
    pub(crate) fn constant_expr(&self, constant: &Constant, ty: &TypeRef) -> Expr {
        let literal = match constant {
            Constant::Null => Literal::Nil,
            Constant::Bool(value) => Literal::Bool(*value),
            Constant::Int(value) if self.model.is_float(ty) => Literal::Float(*value as f64),
            Constant::Int(value) => Literal::Int(*value),
            Constant::Float(value) => Literal::Float(*value),
            Constant::Char(ch) => Literal::Char(*ch),
            Constant::String(text) => Literal::Str(text.clone()),
        };
        Expr::Literal(literal)
    }

    /// Default value of a type
    pub(crate) fn default_value(&self, ty: &TypeRef) -> Expr {
        if let Some(constant) = members::default_constant(self.model, ty) {
            return self.constant_expr(&constant, ty);
        }
        if members::needs_default_call(self.model, ty) {
            return Expr::call(Expr::member(self.type_expr(ty), "__default__"), Vec::new());
        }
        if matches!(ty, TypeRef::Param(_)) {
            return Expr::call(Expr::path("System.default"), vec![self.type_expr(ty)]);
        }
        Expr::nil()
    }

    pub(crate) fn this_expr(&self, span: Span) -> LowerResult<Expr> {
        self.this_name()
            .cloned()
            .map(Expr::Ident)
            .ok_or_else(|| LowerError::unsupported("`this` outside an instance member", self.at(span)))
    }

    fn lower_name(&mut self, symbol: SymbolId, span: Span, out: &mut Block) -> LowerResult<Expr> {
        match self.model.symbol(symbol).kind {
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::Label => self.resolve(symbol, span).map(Expr::Ident),
            SymbolKind::RangeVariable => match self.range_vars.get(&symbol) {
                Some(path) => Ok(path.clone()),
                None => self.resolve(symbol, span).map(Expr::Ident),
            },
            SymbolKind::Field | SymbolKind::Property | SymbolKind::Event | SymbolKind::Method => {
                self.lower_member(Target::Implicit, symbol, span, out)
            }
            SymbolKind::NamedType => Ok(self.type_expr(&TypeRef::named(symbol))),
            SymbolKind::TypeParameter => Ok(self.type_expr(&TypeRef::Param(symbol))),
            SymbolKind::Namespace => Err(LowerError::unsupported("namespace used as a value", self.at(span))),
        }
    }

    fn lower_member(&mut self, target: Target<'_>, member: SymbolId, span: Span, out: &mut Block) -> LowerResult<Expr> {
        match self.model.symbol(member).kind {
            SymbolKind::Method => self.method_group(target, member, span, out),
            SymbolKind::NamedType => Ok(self.type_expr(&TypeRef::named(member))),
            SymbolKind::Field | SymbolKind::Property | SymbolKind::Event => {
                self.member_place(target, member, span, out)?.read()
            }
            _ => Err(LowerError::unsupported(
                format!("member access to `{}`", self.model.name(member)),
                self.at(span),
            )),
        }
    }

    /// Expression naming the type that declares a static member
    pub(crate) fn static_owner(&self, member: SymbolId, target: Target<'_>) -> Expr {
        let Some(owner) = self.model.declaring_type(member) else {
            return Expr::ident(self.model.name(member));
        };
        if let Target::Source(expr) = target
            && let ExprKind::TypeName(ty) = &expr.kind
            && ty.symbol() == Some(owner)
        {
            return self.type_expr(ty);
        }
        if self.current_type() == Some(owner) {
            return self.self_type_expr(owner);
        }
        self.type_expr(&TypeRef::named(owner))
    }

    /// Type expression for `base.member`
    fn base_owner(&self, member: SymbolId) -> Expr {
        let owner = self.model.declaring_type(member);
        let base = self
            .current_type()
            .and_then(|ty| self.model.type_detail(ty))
            .and_then(|detail| detail.base.clone())
            .filter(|base| base.symbol() == owner);
        match (base, owner) {
            (Some(base), _) => self.type_expr(&base),
            (None, Some(owner)) => self.type_expr(&TypeRef::named(owner)),
            (None, None) => Expr::path("System.Object"),
        }
    }

    /// Lower the receiver of a member access
    pub(crate) fn lower_receiver(
        &mut self,
        member: SymbolId,
        target: Target<'_>,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Receiver> {
        if self.model.symbol(member).is_static {
            return Ok(Receiver::Static(self.static_owner(member, target)));
        }
        match target {
            Target::Implicit => Ok(Receiver::Instance(self.this_expr(span)?)),
            Target::Source(expr) => match &expr.kind {
                ExprKind::This => Ok(Receiver::Instance(self.this_expr(span)?)),
                ExprKind::Base => Ok(Receiver::Base {
                    this: self.this_expr(span)?,
                    base: self.base_owner(member),
                }),
                _ => Ok(Receiver::Instance(self.lower_expr(expr, out)?)),
            },
        }
    }

    /// Place for a field, property or event access
    pub(crate) fn member_place(
        &mut self,
        target: Target<'_>,
        member: SymbolId,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Place> {
        let receiver = self.lower_receiver(member, target, span, out)?;
        self.member_place_on(member, receiver, span)
    }

    /// Place for a member on an already lowered receiver
    pub(crate) fn member_place_on(&mut self, member: SymbolId, receiver: Receiver, span: Span) -> LowerResult<Place> {
        let model = self.model;
        match model.symbol(member).kind {
            SymbolKind::Field => {
                if let Some(template) = self.overrides.field_template(model, member) {
                    return Ok(Place::Template {
                        receiver: template_receiver(receiver),
                        args: Vec::new(),
                        get: Some(template.clone()),
                        set: None,
                        span: self.at(span),
                    });
                }
                self.field_place(member, receiver, span)
            }
            SymbolKind::Property => {
                let get = self.overrides.property_template(model, member, true).cloned();
                let set = self.overrides.property_template(model, member, false).cloned();
                if get.is_some() || set.is_some() {
                    return Ok(Place::Template {
                        receiver: template_receiver(receiver),
                        args: Vec::new(),
                        get,
                        set,
                        span: self.at(span),
                    });
                }
                match members::property_mode(model, self.overrides, member) {
                    AccessMode::Field => self.field_place(member, receiver, span),
                    AccessMode::Accessor => self.accessor_place(member, receiver, Vec::new(), true, span),
                }
            }
            SymbolKind::Event => match members::event_mode(model, member) {
                AccessMode::Field => self.field_place(member, receiver, span),
                AccessMode::Accessor => self.accessor_place(member, receiver, Vec::new(), false, span),
            },
            _ => Err(LowerError::unsupported(
                format!("assignment to `{}`", model.name(member)),
                self.at(span),
            )),
        }
    }

    fn field_place(&mut self, member: SymbolId, receiver: Receiver, span: Span) -> LowerResult<Place> {
        if self.is_own_member(member)
            && let Some(local) = self.type_local(MemberSlot::Member(member))
        {
            return Ok(Place::Name(local.clone()));
        }
        let name = Name::new(self.member_name(member, span)?);
        Ok(match receiver {
            Receiver::Static(target) | Receiver::Instance(target) | Receiver::Base { this: target, .. } => {
                Place::Field { target, name }
            }
        })
    }

    /// Place for a property, indexer or event reached through accessors
    pub(crate) fn accessor_place(
        &mut self,
        member: SymbolId,
        receiver: Receiver,
        args: Vec<Expr>,
        is_property: bool,
        span: Span,
    ) -> LowerResult<Place> {
        let name = Name::new(self.member_name(member, span)?);
        let own_local = self.is_own_member(member) && self.type_local(MemberSlot::Accessor(member, true)).is_some();
        let private = self.model.symbol(member).is_private();
        let adapter = |target: Option<Expr>, colon: bool, args: Vec<Expr>| PropertyAdapter {
            target,
            name: name.clone(),
            is_get: true,
            is_property,
            colon,
            args,
        };
        let prepend = |first: Expr, rest: Vec<Expr>| {
            let mut all = Vec::with_capacity(rest.len() + 1);
            all.push(first);
            all.extend(rest);
            all
        };
        Ok(Place::Accessor(match receiver {
            Receiver::Static(_) if own_local => adapter(None, false, args),
            Receiver::Static(owner) => adapter(Some(owner), false, args),
            Receiver::Instance(this) if own_local && private => adapter(None, false, prepend(this, args)),
            Receiver::Instance(target) => adapter(Some(target), true, args),
            Receiver::Base { this, base } => adapter(Some(base), false, prepend(this, args)),
        }))
    }

    /// Place for `target[args]`
    pub(crate) fn element_place(
        &mut self,
        target: &SrcExpr,
        args: &[SrcExpr],
        indexer: Option<SymbolId>,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Place> {
        let receiver = match indexer {
            Some(indexer) => self.lower_receiver(indexer, Target::Source(target.unparen()), span, out)?,
            None => Receiver::Instance(self.lower_expr(target, out)?),
        };
        let mut prelude = Block::new();
        let operands: Vec<&SrcExpr> = args.iter().collect();
        let index_args = self.lower_operands(&operands, &mut prelude)?;
        let receiver = if prelude.is_empty() {
            receiver
        } else {
            self.cache_receiver(receiver, out)?
        };
        out.stmts.extend(prelude.stmts);

        let Some(indexer) = indexer else {
            let Receiver::Instance(target) = receiver else {
                return Err(LowerError::unsupported("element access on a type", self.at(span)));
            };
            return Ok(Place::Accessor(PropertyAdapter {
                target: Some(target),
                name: Name::new(""),
                is_get: true,
                is_property: true,
                colon: true,
                args: index_args,
            }));
        };
        let model = self.model;
        let get = self.overrides.property_template(model, indexer, true).cloned();
        let set = self.overrides.property_template(model, indexer, false).cloned();
        if get.is_some() || set.is_some() {
            return Ok(Place::Template {
                receiver: template_receiver(receiver),
                args: index_args,
                get,
                set,
                span: self.at(span),
            });
        }
        self.accessor_place(indexer, receiver, index_args, true, span)
    }

    pub(crate) fn cache_receiver(&mut self, receiver: Receiver, out: &mut Block) -> LowerResult<Receiver> {
        Ok(match receiver {
            Receiver::Instance(target) => Receiver::Instance(self.cache(target, out)?),
            other => other,
        })
    }

    /// Lower an assignment target
    pub(crate) fn lower_place(&mut self, target: &SrcExpr, out: &mut Block) -> LowerResult<Place> {
        let target = target.unparen();
        match &target.kind {
            ExprKind::Name(symbol) => match self.model.symbol(*symbol).kind {
                SymbolKind::Local | SymbolKind::Parameter => Ok(Place::Name(self.resolve(*symbol, target.span)?)),
                SymbolKind::Field | SymbolKind::Property | SymbolKind::Event => {
                    self.member_place(Target::Implicit, *symbol, target.span, out)
                }
                _ => Err(LowerError::unsupported("assignment target", self.at(target.span))),
            },
            ExprKind::Member { target: receiver, member } => {
                self.member_place(Target::of(receiver), *member, target.span, out)
            }
            ExprKind::Element { target: receiver, args, indexer } => {
                self.element_place(receiver, args, *indexer, target.span, out)
            }
            ExprKind::DynamicMember { target: receiver, name } => Ok(Place::Field {
                target: self.lower_expr(receiver, out)?,
                name: Name::new(name.clone()),
            }),
            _ => Err(LowerError::unsupported("assignment target", self.at(target.span))),
        }
    }

    /// Event reached through accessors on the left of `+=`/`-=`
    fn accessor_event<'src>(&self, target: &'src SrcExpr) -> Option<(SymbolId, Target<'src>)> {
        let target = target.unparen();
        let (member, receiver) = match &target.kind {
            ExprKind::Name(symbol) => (*symbol, Target::Implicit),
            ExprKind::Member { target: receiver, member } => (*member, Target::of(receiver)),
            _ => return None,
        };
        (self.model.symbol(member).kind == SymbolKind::Event
            && members::event_mode(self.model, member) == AccessMode::Accessor)
            .then_some((member, receiver))
    }

    /// Simple or compound assignment; the returned expression is the
    /// assigned value when `used`
    #[allow(clippy::too_many_arguments, reason = "one parameter per assignment part")]
    pub(crate) fn lower_assignment(
        &mut self,
        op: Option<BinaryOp>,
        target: &SrcExpr,
        value: &SrcExpr,
        method: Option<SymbolId>,
        used: bool,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        if let Some(op @ (BinaryOp::Add | BinaryOp::Sub)) = op
            && let Some((event, receiver)) = self.accessor_event(target)
        {
            let receiver = self.lower_receiver(event, receiver, span, out)?;
            let Place::Accessor(adapter) = self.accessor_place(event, receiver, Vec::new(), false, span)? else {
                return Err(LowerError::unsupported("event accessor", self.at(span)));
            };
            let handler = self.lower_expr(value, out)?;
            let mut args = adapter.args.clone();
            args.push(handler);
            out.push(Stmt::Expr(Expr::PropertyAdapter(Box::new(PropertyAdapter {
                is_get: op == BinaryOp::Add,
                args,
                ..adapter
            }))));
            return Ok(Expr::nil());
        }

        let place = self.lower_place(target, out)?;
        let (place, new_value) = match op {
            None => {
                let mut prelude = Block::new();
                let lowered = self.lower_expr(value, &mut prelude)?;
                let place = if prelude.is_empty() {
                    place
                } else {
                    self.stabilize(place, out)?
                };
                out.stmts.extend(prelude.stmts);
                (place, lowered)
            }
            Some(op) => {
                let place = self.stabilize(place, out)?;
                let mut current = place.read()?;
                let mut prelude = Block::new();
                let rhs = self.lower_expr(value, &mut prelude)?;
                if !prelude.is_empty() {
                    current = self.cache(current, out)?;
                }
                out.stmts.extend(prelude.stmts);
                let combined = self.combine_binary(op, (&target.ty, current), (&value.ty, rhs), method, span)?;
                (place, combined)
            }
        };
        if used {
            let cached = self.cache(new_value, out)?;
            out.push(place.write(cached.clone())?);
            Ok(cached)
        } else {
            out.push(place.write(new_value)?);
            Ok(Expr::nil())
        }
    }

    /// `++`/`--` in prefix or postfix form
    pub(crate) fn lower_step(
        &mut self,
        op: UnaryOp,
        operand: &SrcExpr,
        method: Option<SymbolId>,
        used: bool,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let place = self.lower_place(operand, out)?;
        let place = self.stabilize(place, out)?;
        let current = place.read()?;
        let increment = matches!(op, UnaryOp::PreIncrement | UnaryOp::PostIncrement);
        let postfix = matches!(op, UnaryOp::PostIncrement | UnaryOp::PostDecrement);
        let step = |ctx: &mut Self, value: Expr| -> LowerResult<Expr> {
            if let Some(method) = method {
                return ctx.invoke_static(method, vec![value], Vec::new(), span);
            }
            let op = if increment { BinOp::Add } else { BinOp::Sub };
            Ok(Expr::binary(op, value, Expr::int(1)))
        };
        if !used {
            let next = step(self, current)?;
            out.push(place.write(next)?);
            return Ok(Expr::nil());
        }
        let temp = self.temp()?;
        if postfix {
            out.push(Stmt::local(temp.clone(), current));
            let next = step(self, Expr::Ident(temp.clone()))?;
            out.push(place.write(next)?);
        } else {
            let next = step(self, current)?;
            out.push(Stmt::local(temp.clone(), next));
            out.push(place.write(Expr::Ident(temp.clone()))?);
        }
        Ok(Expr::Ident(temp))
    }

    /// `cond ? a : b`
    ///
    /// `and`/`or` chaining is only sound when `a` can never be falsy.
    fn lower_conditional(
        &mut self,
        cond: &SrcExpr,
        when_true: &SrcExpr,
        when_false: &SrcExpr,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let cond_value = self.lower_expr(cond, out)?;
        let mut then = Block::new();
        let true_value = self.lower_expr(when_true, &mut then)?;
        let mut otherwise = Block::new();
        let false_value = self.lower_expr(when_false, &mut otherwise)?;

        let falsy = match &when_true.constant {
            Some(constant) => constant.is_falsy(),
            None => true_value.may_be_falsy() && self.model.may_be_falsy(&when_true.ty),
        };
        if then.is_empty() && otherwise.is_empty() && !falsy {
            return Ok(Expr::binary(
                BinOp::Or,
                Expr::binary(BinOp::And, cond_value, true_value),
                false_value,
            ));
        }
        let temp = self.temp()?;
        out.push(Stmt::declare(temp.clone()));
        then.push(Stmt::assign(Expr::Ident(temp.clone()), true_value));
        otherwise.push(Stmt::assign(Expr::Ident(temp.clone()), false_value));
        out.push(Stmt::If(Box::new(IfStmt {
            otherwise: Some(otherwise),
            ..IfStmt::new(cond_value, then)
        })));
        Ok(Expr::Ident(temp))
    }

    /// `x is T` and `x is T v`
    fn lower_is(
        &mut self,
        operand: &SrcExpr,
        ty: &TypeRef,
        designation: Option<SymbolId>,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let mut value = self.lower_expr(operand, out)?;
        if let Some(var) = designation {
            let name = self.declare(var);
            out.push(Stmt::local(name.clone(), value));
            value = Expr::Ident(name);
        }
        let model = self.model;
        if model.is_subclass_of(&operand.ty, ty) {
            if model.is_value_type(&operand.ty) && !model.is_nullable(&operand.ty) {
                self.discard(value, out)?;
                return Ok(Expr::boolean(true));
            }
            return Ok(Expr::binary(BinOp::Ne, value, Expr::nil()));
        }
        Ok(Expr::call(Expr::path("System.is"), vec![value, self.type_expr(ty)]))
    }

    /// Lambda as a closure sharing the enclosing receiver
    fn lower_lambda(&mut self, params: &[SymbolId], body: &LambdaBody, span: Span) -> LowerResult<Expr> {
        self.enter_closure(self.at(span));
        let names = params.iter().map(|param| self.declare(*param)).collect();
        let mut block = Block::new();
        match body {
            LambdaBody::Expr(expr) if expr.ty.is_void() => self.lower_expr_stmt(expr, &mut block)?,
            LambdaBody::Expr(expr) => {
                let value = self.lower_expr(expr, &mut block)?;
                block.push(Stmt::Return(vec![value]));
            }
            LambdaBody::Block(inner) => self.lower_block(&inner.stmts, &mut block)?,
        }
        self.leave_function()?;
        Ok(Expr::function(Function::new(names, block)))
    }

    /// Interpolated string as a concatenation chain
    fn lower_interpolated(&mut self, parts: &[InterpolationPart], out: &mut Block) -> LowerResult<Expr> {
        let holes: Vec<&SrcExpr> = parts
            .iter()
            .filter_map(|part| match part {
                InterpolationPart::Expr(expr) => Some(expr),
                InterpolationPart::Text(_) => None,
            })
            .collect();
        let mut values = self.lower_operands(&holes, out)?.into_iter().zip(holes);
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                InterpolationPart::Text(text) => pieces.push(Expr::string(text.clone())),
                InterpolationPart::Expr(_) => {
                    if let Some((value, hole)) = values.next() {
                        pieces.push(self.stringify(&hole.ty, value));
                    }
                }
            }
        }
        Ok(pieces
            .into_iter()
            .reduce(|left, right| Expr::binary(BinOp::Concat, left, right))
            .unwrap_or_else(|| Expr::string("")))
    }

    /// A method used as a value
    fn method_group(&mut self, target: Target<'_>, method: SymbolId, span: Span, out: &mut Block) -> LowerResult<Expr> {
        if self.is_local_like(method) {
            return self.resolve(method, span).map(Expr::Ident);
        }
        let name = self.member_name(method, span)?;
        let own_local = if self.is_own_member(method) {
            self.type_local(MemberSlot::Member(method)).cloned()
        } else {
            None
        };
        let private = self.model.symbol(method).is_private();
        let bind = |target: Expr, function: Expr| Expr::call(Expr::path("System.bind"), vec![target, function]);
        Ok(match self.lower_receiver(method, target, span, out)? {
            Receiver::Static(owner) => own_local.map_or_else(|| Expr::member(owner, name), Expr::Ident),
            Receiver::Instance(target) => {
                let target = self.cache(target, out)?;
                let function = match own_local {
                    Some(local) if private => Expr::Ident(local),
                    _ => Expr::member(target.clone(), name),
                };
                bind(target, function)
            }
            Receiver::Base { this, base } => bind(this, Expr::member(base, name)),
        })
    }
}

fn template_receiver(receiver: Receiver) -> Option<Expr> {
    match receiver {
        Receiver::Static(_) => None,
        Receiver::Instance(target) | Receiver::Base { this: target, .. } => Some(target),
    }
}

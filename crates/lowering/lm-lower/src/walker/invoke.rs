//! Invocations and object creation
//!
//! A call may need more than one statement: `ref`/`out` arguments come back
//! as extra return values and are assigned after the call.

use crate::access::Place;
use crate::context::{LowerCtx, LowerResult, MemberSlot};
use crate::error::LowerError;
use crate::members;
use crate::walker::expr::{Receiver, Target};
use lm_source::{
    Argument, Constant, Expr as SrcExpr, ExprKind, MemberInit, MethodKind, RefKind, SymbolId, TypeKind, TypeRef,
};
use lm_span::Span;
use lm_target::{Block, Expr, Literal, Stmt};
use tracing::trace;

/// A lowered call before its results are consumed
pub(crate) struct CallShape {
    pub call: Expr,
    /// Places receiving the trailing `ref`/`out` results, in order
    pub refs: Vec<Place>,
    /// The call yields a primary value ahead of the `ref`/`out` results
    pub returns_value: bool,
}

/// Lowered arguments with the places written back after the call
pub(crate) struct Arguments {
    pub values: Vec<Expr>,
    pub refs: Vec<Place>,
}

impl LowerCtx<'_> {
    /// Invocation used as a value
    pub(crate) fn lower_invocation(&mut self, expr: &SrcExpr, out: &mut Block) -> LowerResult<Expr> {
        let shape = self.lower_call(expr, out)?;
        if shape.refs.is_empty() {
            return Ok(shape.call);
        }
        let temp = self.temp()?;
        out.push(Stmt::declare(temp.clone()));
        self.assign_results(Some(Expr::Ident(temp.clone())), shape, out)?;
        Ok(Expr::Ident(temp))
    }

    /// Invocation evaluated for its effects
    pub(crate) fn lower_invocation_stmt(&mut self, expr: &SrcExpr, out: &mut Block) -> LowerResult<()> {
        let shape = self.lower_call(expr, out)?;
        if shape.refs.is_empty() {
            out.push(Stmt::Expr(shape.call));
            return Ok(());
        }
        let primary = if shape.returns_value {
            let temp = self.temp()?;
            out.push(Stmt::declare(temp.clone()));
            Some(Expr::Ident(temp))
        } else {
            None
        };
        self.assign_results(primary, shape, out)
    }

    /// One multiple assignment receiving the primary value and every
    /// `ref`/`out` result; accessor places are written afterwards
    pub(crate) fn assign_results(&mut self, primary: Option<Expr>, shape: CallShape, out: &mut Block) -> LowerResult<()> {
        let mut targets: Vec<Expr> = primary.into_iter().collect();
        let mut after = Vec::new();
        for place in shape.refs {
            if place.is_simple() {
                targets.push(place.read()?);
            } else {
                let temp = self.temp()?;
                out.push(Stmt::declare(temp.clone()));
                targets.push(Expr::Ident(temp.clone()));
                after.push(place.write(Expr::Ident(temp))?);
            }
        }
        out.push(Stmt::Assign {
            targets,
            values: vec![shape.call],
        });
        out.stmts.extend(after);
        Ok(())
    }

    /// Lower the call itself; the caller decides how results are consumed
    pub(crate) fn lower_call(&mut self, expr: &SrcExpr, out: &mut Block) -> LowerResult<CallShape> {
        let ExprKind::Invocation {
            callee,
            method,
            args,
            type_args,
        } = &expr.kind
        else {
            return Err(LowerError::unsupported("call", self.at(expr.span)));
        };
        let returns_value = !expr.ty.is_void();
        let model = self.model;
        let callee = callee.unparen();

        let Some(method) = *method else {
            return self.delegate_call(callee, callee, args, None, returns_value, out);
        };
        if model.declaring_type(method).and_then(|owner| model.type_kind(owner)) == Some(TypeKind::Delegate) {
            let value = match &callee.kind {
                ExprKind::Member { target, member } if *member == method => target.unparen(),
                _ => callee,
            };
            return self.delegate_call(value, callee, args, Some(method), returns_value, out);
        }

        let detail = model.method(method).cloned().unwrap_or_default();
        let target = match &callee.kind {
            ExprKind::Member { target, .. } => Target::of(target),
            _ => Target::Implicit,
        };
        let generic = self.type_arguments(method, type_args, expr.span)?;

        if detail.method_kind == MethodKind::LocalFunction {
            let name = self.resolve(method, expr.span)?;
            let lowered = self.lower_arguments(Vec::new(), args, Some(method), &generic, out)?;
            return Ok(CallShape {
                call: Expr::call(Expr::Ident(name), lowered.values),
                refs: lowered.refs,
                returns_value,
            });
        }

        let template = model
            .symbol(method)
            .may_have_override()
            .then(|| self.overrides.method_template(model, method))
            .transpose()
            .map_err(|error| LowerError::from_metadata(error, self.at(expr.span)))?
            .flatten()
            .cloned();
        let is_static = model.symbol(method).is_static;
        // `x.Ext(y)` as opposed to `Owner.Ext(x, y)`
        let reduced_extension = match target {
            Target::Source(source) if detail.is_extension => !matches!(source.kind, ExprKind::TypeName(_)),
            _ => false,
        };

        if let Some(template) = template {
            let mut leading = Vec::new();
            let receiver = if reduced_extension {
                if let Target::Source(source) = target {
                    leading.push(self.lower_expr(source, out)?);
                }
                None
            } else if is_static {
                None
            } else {
                match self.lower_receiver(method, target, expr.span, out)? {
                    Receiver::Instance(value) | Receiver::Base { this: value, .. } => Some(value),
                    Receiver::Static(_) => None,
                }
            };
            let receiver_count = usize::from(receiver.is_some());
            let mut all = receiver.into_iter().collect::<Vec<_>>();
            all.extend(leading);
            let lowered = self.lower_arguments(all, args, Some(method), &[], out)?;
            let mut values = lowered.values;
            let rest = values.split_off(receiver_count);
            let type_exprs: Vec<Expr> = type_args.iter().map(|ty| self.type_expr(ty)).collect();
            let call = template
                .bind(values.first(), &rest, &type_exprs)
                .map_err(|error| LowerError::from_template(error, self.at(expr.span)))?;
            trace!(method = model.name(method), "template call");
            return Ok(CallShape {
                call,
                refs: lowered.refs,
                returns_value,
            });
        }

        let name = self.member_name(method, expr.span)?;
        if reduced_extension && let Target::Source(source) = target {
            let owner = self.static_owner(method, Target::Implicit);
            let receiver = self.lower_expr(source, out)?;
            let lowered = self.lower_arguments(vec![receiver], args, Some(method), &generic, out)?;
            return Ok(CallShape {
                call: Expr::call(Expr::member(owner, name), lowered.values),
                refs: lowered.refs,
                returns_value,
            });
        }

        let own_local = if self.is_own_member(method) {
            self.type_local(MemberSlot::Member(method)).cloned()
        } else {
            None
        };
        let private = model.symbol(method).is_private() && detail.overridden.is_none();
        let (function, leading, colon) = match self.lower_receiver(method, target, expr.span, out)? {
            Receiver::Static(owner) => (
                own_local.map_or_else(|| Expr::member(owner, name.clone()), Expr::Ident),
                Vec::new(),
                false,
            ),
            Receiver::Instance(this) => match own_local {
                Some(local) if private => (Expr::Ident(local), vec![this], false),
                _ => (Expr::nil(), vec![this], true),
            },
            Receiver::Base { this, base } => (Expr::member(base, name.clone()), vec![this], false),
        };
        let lowered = self.lower_arguments(leading, args, Some(method), &generic, out)?;
        let call = if colon {
            let mut values = lowered.values.into_iter();
            let receiver = values.next().unwrap_or_else(Expr::nil);
            Expr::call(Expr::method(receiver, name), values.collect())
        } else {
            Expr::call(function, lowered.values)
        };
        Ok(CallShape {
            call,
            refs: lowered.refs,
            returns_value,
        })
    }

    /// Invoke a delegate value
    fn delegate_call(
        &mut self,
        value: &SrcExpr,
        callee: &SrcExpr,
        args: &[Argument],
        invoke: Option<SymbolId>,
        returns_value: bool,
        out: &mut Block,
    ) -> LowerResult<CallShape> {
        let function = self.lower_expr(value, out)?;
        let lowered = self.lower_arguments(vec![function], args, invoke, &[], out)?;
        let mut values = lowered.values.into_iter();
        let function = values
            .next()
            .ok_or_else(|| LowerError::unsupported("delegate invocation", self.at(callee.span)))?;
        Ok(CallShape {
            call: Expr::call(function, values.collect()),
            refs: lowered.refs,
            returns_value,
        })
    }

    /// Type expressions passed after the arguments of a generic method
    fn type_arguments(&self, method: SymbolId, type_args: &[TypeRef], span: Span) -> LowerResult<Vec<Expr>> {
        let model = self.model;
        let generic = model
            .method(method)
            .is_some_and(|detail| !detail.type_params.is_empty());
        if !generic || type_args.is_empty() {
            return Ok(Vec::new());
        }
        let ignored = model.symbol(method).may_have_override()
            && self
                .overrides
                .ignores_generic_args(model, method)
                .map_err(|error| LowerError::from_metadata(error, self.at(span)))?;
        if ignored {
            return Ok(Vec::new());
        }
        Ok(type_args.iter().map(|ty| self.type_expr(ty)).collect())
    }

    /// Lower call arguments after `leading` values, keeping evaluation order
    pub(crate) fn lower_arguments(
        &mut self,
        leading: Vec<Expr>,
        args: &[Argument],
        method: Option<SymbolId>,
        type_args: &[Expr],
        out: &mut Block,
    ) -> LowerResult<Arguments> {
        let model = self.model;
        let params = method.map_or(&[][..], |method| model.params(method));
        let packed = params
            .last()
            .filter(|param| model.ref_kind(**param) == RefKind::Params)
            .map(|param| (params.len() - 1, model.type_of(*param).cloned().unwrap_or_default()));

        let lead_count = leading.len();
        // A reduced extension call passes its receiver as the first parameter
        let offset = usize::from(
            lead_count > 0 && method.and_then(|method| model.method(method)).is_some_and(|detail| detail.is_extension),
        );
        let mut values = leading;
        let mut refs = Vec::new();
        let mut spread: Option<(usize, TypeRef)> = None;
        for (index, arg) in args.iter().enumerate() {
            if let Some((position, array_ty)) = &packed
                && index + offset == *position
            {
                let passes_array = args.len() + offset == position + 1
                    && (matches!(arg.expr.ty, TypeRef::Array(_)) || arg.expr.constant == Some(Constant::Null));
                if !passes_array {
                    spread = Some((values.len(), array_ty.clone()));
                }
            }
            let mut prelude = Block::new();
            let value = match arg.ref_kind {
                RefKind::Ref | RefKind::Out => {
                    let place = self.lower_place(&arg.expr, &mut prelude)?;
                    let place = self.stabilize(place, &mut prelude)?;
                    let value = if arg.ref_kind == RefKind::Out {
                        Expr::nil()
                    } else {
                        place.read()?
                    };
                    refs.push(place);
                    value
                }
                RefKind::None | RefKind::In | RefKind::Params => self.lower_expr(&arg.expr, &mut prelude)?,
            };
            if !prelude.is_empty() {
                self.cache_all(&mut values, out)?;
            }
            out.stmts.extend(prelude.stmts);
            values.push(value);
        }

        if let Some((start, array_ty)) = spread {
            let items = values.split_off(start);
            let elem = match array_ty {
                TypeRef::Array(elem) => *elem,
                other => other,
            };
            values.push(Expr::call(
                self.type_expr(&TypeRef::Array(Box::new(elem))),
                items,
            ));
        }

        if type_args.is_empty() {
            while values.len() > lead_count && matches!(values.last(), Some(Expr::Literal(Literal::Nil))) {
                values.pop();
            }
        } else {
            values.extend(type_args.iter().cloned());
        }
        Ok(Arguments { values, refs })
    }

    /// Call a static method, such as a user-defined operator, on lowered
    /// arguments
    pub(crate) fn invoke_static(
        &mut self,
        method: SymbolId,
        args: Vec<Expr>,
        type_args: Vec<Expr>,
        span: Span,
    ) -> LowerResult<Expr> {
        let model = self.model;
        if model.symbol(method).may_have_override()
            && let Some(template) = self
                .overrides
                .method_template(model, method)
                .map_err(|error| LowerError::from_metadata(error, self.at(span)))?
        {
            return template
                .bind(None, &args, &type_args)
                .map_err(|error| LowerError::from_template(error, self.at(span)));
        }
        let callee = match self.is_own_member(method).then(|| self.type_local(MemberSlot::Member(method))) {
            Some(Some(local)) => Expr::Ident(local.clone()),
            _ => {
                let owner = self.static_owner(method, Target::Implicit);
                Expr::member(owner, self.member_name(method, span)?)
            }
        };
        let mut all = args;
        all.extend(type_args);
        Ok(Expr::call(callee, all))
    }

    /// `new T(args) { inits }`
    pub(crate) fn lower_object_creation(
        &mut self,
        expr: &SrcExpr,
        ty: &TypeRef,
        ctor: Option<SymbolId>,
        args: &[Argument],
        initializers: &[MemberInit],
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let model = self.model;
        if model.is_delegate(ty) {
            return match args.first() {
                Some(arg) => self.lower_expr(&arg.expr, out),
                None => Err(LowerError::unsupported("delegate creation without a target", self.at(expr.span))),
            };
        }
        let template = match ctor {
            Some(ctor) if model.symbol(ctor).may_have_override() => self
                .overrides
                .method_template(model, ctor)
                .map_err(|error| LowerError::from_metadata(error, self.at(expr.span)))?
                .cloned(),
            _ => None,
        };

        let lowered = self.lower_arguments(Vec::new(), args, ctor, &[], out)?;
        let creation = if let Some(template) = template {
            let type_exprs: Vec<Expr> = ty.args().iter().map(|arg| self.type_expr(arg)).collect();
            template
                .bind(None, &lowered.values, &type_exprs)
                .map_err(|error| LowerError::from_template(error, self.at(expr.span)))?
        } else {
            let type_expr = self.type_expr(ty);
            let symbol = ty.symbol();
            let count = symbol.map_or(0, |symbol| {
                if self.facts.fragments(symbol).is_empty() {
                    model.constructors(symbol).len()
                } else {
                    self.facts.type_facts(symbol).ctor_count
                }
            });
            let index = symbol.map_or(1, |symbol| members::ctor_index(model, symbol, ctor));
            if count > 1 && index > 1 {
                let index = i64::try_from(index).unwrap_or(i64::MAX);
                let mut all = vec![type_expr, Expr::int(index)];
                all.extend(lowered.values);
                Expr::call(Expr::path("System.new"), all)
            } else {
                Expr::call(type_expr, lowered.values)
            }
        };

        let value = if lowered.refs.is_empty() {
            creation
        } else {
            let temp = self.temp()?;
            out.push(Stmt::declare(temp.clone()));
            let shape = CallShape {
                call: creation,
                refs: lowered.refs,
                returns_value: true,
            };
            self.assign_results(Some(Expr::Ident(temp.clone())), shape, out)?;
            Expr::Ident(temp)
        };
        if initializers.is_empty() {
            return Ok(value);
        }
        let temp = self.temp()?;
        out.push(Stmt::local(temp.clone(), value));
        for init in initializers {
            let receiver = if model.symbol(init.member).is_static {
                Receiver::Static(self.static_owner(init.member, Target::Implicit))
            } else {
                Receiver::Instance(Expr::Ident(temp.clone()))
            };
            let place = self.member_place_on(init.member, receiver, init.value.span)?;
            let assigned = self.lower_expr(&init.value, out)?;
            out.push(place.write(assigned)?);
        }
        Ok(Expr::Ident(temp))
    }
}

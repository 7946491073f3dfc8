//! `switch`, `try` and `using`
//!
//! A switch becomes an `if` chain, wrapped in a one-shot `repeat` when a
//! `break` inside it must leave early, with labelled sections when `goto case`
//! is used. Protected regions run as closures handed to the runtime; a
//! `return` inside one yields `true` followed by the returned values, which
//! the caller re-returns.

use crate::context::{Breakable, LowerCtx, LowerResult, SectionKey};
use crate::error::LowerError;
use crate::walker::stmt::{case_key, declares_locals, seal};
use lm_scope::FrameKind;
use lm_source::{
    Block as SrcBlock, CatchClause, Expr as SrcExpr, LocalDeclarator, Pattern, Stmt as SrcStmt, StmtKind, SwitchLabel,
    SwitchSection, SymbolId, TypeRef,
};
use lm_span::Span;
use lm_target::{BinOp, Block, Expr, Function, IfStmt, Name, Stmt, UnOp};
use std::{iter, mem};
use tracing::trace;

/// Which nested statements a scan enters
#[derive(Copy, Clone, Debug)]
pub(crate) struct Descend {
    pub loops: bool,
    pub switches: bool,
}

impl Descend {
    pub(crate) const ALL: Self = Self {
        loops: true,
        switches: true,
    };
    pub(crate) const SWITCHES: Self = Self {
        loops: false,
        switches: true,
    };
    pub(crate) const LOOPS: Self = Self {
        loops: true,
        switches: false,
    };
    pub(crate) const NONE: Self = Self {
        loops: false,
        switches: false,
    };
}

/// Whether `pred` holds for `stmt` or a statement nested in it. Local
/// function bodies are never entered.
pub(crate) fn any_stmt(stmt: &SrcStmt, descend: Descend, pred: impl Fn(&StmtKind) -> bool) -> bool {
    any_in(stmt, descend, &pred)
}

fn any_in(stmt: &SrcStmt, descend: Descend, pred: &dyn Fn(&StmtKind) -> bool) -> bool {
    if pred(&stmt.kind) {
        return true;
    }
    let all = |stmts: &[SrcStmt]| stmts.iter().any(|inner| any_in(inner, descend, pred));
    match &stmt.kind {
        StmtKind::Block(block) => all(&block.stmts),
        StmtKind::If { then, otherwise, .. } => {
            any_in(then, descend, pred) || otherwise.as_deref().is_some_and(|other| any_in(other, descend, pred))
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::ForEach { body, .. } => descend.loops && any_in(body, descend, pred),
        StmtKind::Switch { sections, .. } => {
            descend.switches && sections.iter().any(|section| all(&section.stmts))
        }
        StmtKind::Labeled { stmt: inner, .. } | StmtKind::Using { body: inner, .. } => any_in(inner, descend, pred),
        StmtKind::Try {
            block,
            catches,
            finally,
        } => {
            all(&block.stmts)
                || catches.iter().any(|clause| all(&clause.block.stmts))
                || finally.as_ref().is_some_and(|block| all(&block.stmts))
        }
        StmtKind::Local(_)
        | StmtKind::Expr(_)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Return(_)
        | StmtKind::YieldReturn(_)
        | StmtKind::YieldBreak
        | StmtKind::Goto(_)
        | StmtKind::GotoCase(_)
        | StmtKind::GotoDefault
        | StmtKind::Throw(_)
        | StmtKind::LocalFunction(_)
        | StmtKind::Empty => false,
    }
}

/// A `break` that does not simply end its section
fn has_inner_break(section: &SwitchSection) -> bool {
    let stmts = match section.stmts.split_last() {
        Some((last, rest)) if matches!(last.kind, StmtKind::Break) => rest,
        _ => section.stmts.as_slice(),
    };
    stmts
        .iter()
        .any(|stmt| any_stmt(stmt, Descend::NONE, |kind| matches!(kind, StmtKind::Break)))
}

fn has_section_jump(section: &SwitchSection) -> bool {
    section.stmts.iter().any(|stmt| {
        any_stmt(stmt, Descend::LOOPS, |kind| {
            matches!(kind, StmtKind::GotoCase(_) | StmtKind::GotoDefault)
        })
    })
}

/// `a or b` over conditions, `None` standing for `true`
fn any_of(conds: Vec<Option<Expr>>) -> Option<Expr> {
    let mut combined: Option<Expr> = None;
    for cond in conds {
        let cond = cond?;
        combined = Some(match combined {
            Some(left) => Expr::binary(BinOp::Or, left, cond),
            None => cond,
        });
    }
    combined
}

/// Declare the top-level locals of `block` in `hoisted` instead, so they
/// stay visible after `block` is nested in an `if`
fn hoist_locals(block: &mut Block, hoisted: &mut Block) {
    for stmt in &mut block.stmts {
        if let Stmt::Local { names, values } = stmt {
            hoisted.push(Stmt::Local {
                names: names.clone(),
                values: Vec::new(),
            });
            let values = if values.is_empty() { vec![Expr::nil()] } else { mem::take(values) };
            let targets = names.iter().cloned().map(Expr::Ident).collect();
            *stmt = Stmt::Assign { targets, values };
        }
    }
}

/// Merge a lone nested `if` in the else block into the `elseif` chain
fn flatten_else(if_stmt: &mut IfStmt) {
    let Some(otherwise) = &mut if_stmt.otherwise else {
        return;
    };
    if otherwise.stmts.len() != 1 {
        return;
    }
    if let Some(Stmt::If(inner)) = otherwise.stmts.pop() {
        let inner = *inner;
        if_stmt.else_ifs.push((inner.cond, inner.then));
        if_stmt.else_ifs.extend(inner.else_ifs);
        if_stmt.otherwise = inner.otherwise;
    }
}

/// One lowered switch section
struct Arm {
    prelude: Block,
    cond: Option<Expr>,
    is_default: bool,
    body: Block,
}

impl LowerCtx<'_> {
    pub(crate) fn lower_switch(
        &mut self,
        subject: &SrcExpr,
        sections: &[SwitchSection],
        span: Span,
        out: &mut Block,
    ) -> LowerResult<()> {
        let labelled = sections.iter().any(has_section_jump);
        let wrapped = labelled || sections.iter().any(has_inner_break);
        trace!(sections = sections.len(), labelled, wrapped, "switch");

        let mut scope = Block::new();
        let lowered_subject = self.lower_expr(subject, &mut scope)?;
        let binds = sections.iter().flat_map(|section| &section.labels).any(|label| {
            matches!(
                label,
                SwitchLabel::Pattern {
                    pattern: Pattern::Declaration { .. },
                    ..
                }
            )
        });
        let subject_name = match lowered_subject {
            Expr::Ident(name) if !binds => name,
            other => {
                let temp = self.temp()?;
                scope.push(Stmt::local(temp.clone(), other));
                temp
            }
        };

        let mut labels = Vec::new();
        let mut section_labels = Vec::new();
        if labelled {
            for section in sections {
                let label = self.synthetic("case");
                for source_label in &section.labels {
                    let key = match source_label {
                        SwitchLabel::Case(value)
                        | SwitchLabel::Pattern {
                            pattern: Pattern::Constant(value),
                            ..
                        } => SectionKey::Case(case_key(value)),
                        SwitchLabel::Default => SectionKey::Default,
                        SwitchLabel::Pattern { .. } => continue,
                    };
                    labels.push((key, label.clone()));
                }
                section_labels.push(label);
            }
        }

        let depth = self.closure_depth();
        self.function_mut(span)?.breakables.push(Breakable::Switch {
            labels,
            continue_escapes: false,
            depth,
        });
        let arms = self.lower_arms(&subject_name, subject, sections, wrapped || labelled);
        let popped = self.function_mut(span)?.breakables.pop();
        let arms = arms?;
        let continue_escapes = matches!(
            popped,
            Some(Breakable::Switch {
                continue_escapes: true,
                ..
            })
        );

        let mut chain = Vec::new();
        let mut default = None;
        let mut tail = Vec::new();
        for (arm, label) in arms.into_iter().zip(section_labels.iter().map(Some).chain(iter::repeat(None))) {
            let body = match label {
                Some(label) => {
                    tail.push(Stmt::Label(label.clone()));
                    tail.push(Stmt::Do(arm.body));
                    Block::of(vec![Stmt::Goto(label.clone())])
                }
                None => arm.body,
            };
            if arm.is_default {
                default = Some((arm.prelude, body));
            } else {
                chain.push((arm.prelude, arm.cond, body));
            }
        }
        let mut otherwise = default.map(|(prelude, body)| {
            let mut block = prelude;
            block.stmts.extend(body.stmts);
            block
        });
        if labelled && otherwise.is_none() {
            otherwise = Some(Block::of(vec![Stmt::Break]));
        }
        for (prelude, cond, body) in chain.into_iter().rev() {
            let Some(cond) = cond else {
                let mut block = prelude;
                block.stmts.extend(body.stmts);
                otherwise = Some(block);
                continue;
            };
            let mut if_stmt = IfStmt::new(cond, body);
            if_stmt.otherwise = otherwise.take().filter(|block| !block.is_empty());
            flatten_else(&mut if_stmt);
            let mut block = prelude;
            block.push(Stmt::If(Box::new(if_stmt)));
            otherwise = Some(block);
        }
        if let Some(dispatch) = otherwise {
            scope.stmts.extend(dispatch.stmts);
        }
        scope.stmts.extend(tail);

        if wrapped || labelled {
            seal(&mut scope);
            out.push(Stmt::Repeat {
                body: scope,
                until: Expr::int(1),
            });
            if continue_escapes && let Some(flag) = self.loop_flag() {
                out.push(Stmt::if_then(Expr::Ident(flag), Block::of(vec![Stmt::Break])));
            }
        } else if declares_locals(&scope) {
            out.push(Stmt::Do(scope));
        } else {
            out.stmts.extend(scope.stmts);
        }
        Ok(())
    }

    fn lower_arms(
        &mut self,
        subject_name: &Name,
        subject: &SrcExpr,
        sections: &[SwitchSection],
        keep_breaks: bool,
    ) -> LowerResult<Vec<Arm>> {
        let mut arms = Vec::with_capacity(sections.len());
        for section in sections {
            let mut tests = Vec::with_capacity(section.labels.len());
            let mut is_default = false;
            for label in &section.labels {
                let mut setup = Block::new();
                let cond = match label {
                    SwitchLabel::Default => {
                        is_default = true;
                        continue;
                    }
                    SwitchLabel::Case(value) => {
                        let value = self.lower_expr(value, &mut setup)?;
                        Some(Expr::binary(BinOp::Eq, Expr::Ident(subject_name.clone()), value))
                    }
                    SwitchLabel::Pattern { pattern, when } => {
                        let test = self.pattern_test(subject_name, &subject.ty, pattern, &mut setup)?;
                        match when {
                            Some(when) => Some(self.guarded(test, when, &mut setup)?),
                            None => test,
                        }
                    }
                };
                tests.push((setup, cond));
            }
            let (prelude, cond) = self.label_chain(tests)?;
            let mut body = Block::new();
            self.lower_block(&section.stmts, &mut body)?;
            let ends_in_break = section
                .stmts
                .last()
                .is_some_and(|stmt| matches!(stmt.kind, StmtKind::Break));
            if !keep_breaks && ends_in_break && matches!(body.stmts.last(), Some(Stmt::Break)) {
                body.stmts.pop();
            }
            arms.push(Arm {
                prelude,
                cond,
                is_default,
                body,
            });
        }
        Ok(arms)
    }

    /// `test and guard`, where statements the guard needs only run once
    /// `test` holds
    fn guarded(&mut self, test: Option<Expr>, when: &SrcExpr, setup: &mut Block) -> LowerResult<Expr> {
        let mut guard_setup = Block::new();
        let guard = self.lower_expr(when, &mut guard_setup)?;
        let test = match test {
            Some(test) if !guard_setup.is_empty() => test,
            Some(test) => return Ok(Expr::binary(BinOp::And, test, guard)),
            None => {
                setup.stmts.extend(guard_setup.stmts);
                return Ok(guard);
            }
        };
        let matched = self.temp()?;
        hoist_locals(&mut guard_setup, setup);
        setup.push(Stmt::local(matched.clone(), test));
        guard_setup.push(Stmt::assign(Expr::Ident(matched.clone()), guard));
        setup.push(Stmt::if_then(Expr::Ident(matched.clone()), guard_setup));
        Ok(Expr::Ident(matched))
    }

    /// Prelude and condition of one section's labels, tested in order; the
    /// setup of a later label only runs while no earlier label matched
    fn label_chain(&mut self, tests: Vec<(Block, Option<Expr>)>) -> LowerResult<(Block, Option<Expr>)> {
        let mut prelude = Block::new();
        if tests.iter().skip(1).all(|(setup, _)| setup.is_empty()) {
            let mut conds = Vec::with_capacity(tests.len());
            for (setup, cond) in tests {
                prelude.stmts.extend(setup.stmts);
                conds.push(cond);
            }
            return Ok((prelude, any_of(conds)));
        }
        let matched = self.temp()?;
        for (index, (mut setup, cond)) in tests.into_iter().enumerate() {
            let cond = cond.unwrap_or_else(|| Expr::boolean(true));
            if index == 0 {
                prelude.stmts.extend(setup.stmts);
                prelude.push(Stmt::local(matched.clone(), cond));
            } else {
                hoist_locals(&mut setup, &mut prelude);
                setup.push(Stmt::assign(Expr::Ident(matched.clone()), cond));
                prelude.push(Stmt::if_then(Expr::unary(UnOp::Not, Expr::Ident(matched.clone())), setup));
            }
        }
        Ok((prelude, Some(Expr::Ident(matched))))
    }

    /// Condition matching a pattern against the switch subject; `None` always matches
    fn pattern_test(
        &mut self,
        subject_name: &Name,
        subject_ty: &TypeRef,
        pattern: &Pattern,
        prelude: &mut Block,
    ) -> LowerResult<Option<Expr>> {
        let subject = Expr::Ident(subject_name.clone());
        Ok(match pattern {
            Pattern::Declaration { ty, var } => {
                self.scopes.bind(*var, subject_name.clone());
                Some(self.type_test(subject, subject_ty, ty))
            }
            Pattern::Type(ty) => Some(self.type_test(subject, subject_ty, ty)),
            Pattern::Constant(value) => {
                let value = self.lower_expr(value, prelude)?;
                Some(Expr::binary(BinOp::Eq, subject, value))
            }
            Pattern::Discard => None,
        })
    }

    fn type_test(&self, value: Expr, value_ty: &TypeRef, ty: &TypeRef) -> Expr {
        if self.model.is_subclass_of(value_ty, ty) {
            Expr::binary(BinOp::Ne, value, Expr::nil())
        } else {
            Expr::call(Expr::path("System.is"), vec![value, self.type_expr(ty)])
        }
    }

    /// Continue flag of the innermost loop
    fn loop_flag(&self) -> Option<Name> {
        self.function()?.breakables.iter().rev().find_map(|breakable| match breakable {
            Breakable::Loop { flag, .. } => Some(flag.clone()),
            Breakable::Switch { .. } => None,
        })?
    }

    /// Lower statements into a protected-region closure body
    fn protected_body(
        &mut self,
        params: &[SymbolId],
        body: ProtectedBody<'_>,
        span: Span,
    ) -> LowerResult<(Function, Option<usize>)> {
        let at = self.at(span);
        self.scopes.push(FrameKind::Function, Some(at));
        self.function_mut(span)?.protected.push(None);
        let lowered = self.protected_statements(params, body);
        let arity = self.function_mut(span)?.protected.pop().flatten();
        let popped = self.scopes.pop();
        let (names, mut block) = lowered?;
        popped.map_err(|error| LowerError::from_scope(error, at))?;
        seal(&mut block);
        Ok((Function::new(names, block), arity))
    }

    fn protected_statements(
        &mut self,
        params: &[SymbolId],
        body: ProtectedBody<'_>,
    ) -> LowerResult<(Vec<Name>, Block)> {
        let names = params.iter().map(|param| self.declare(*param)).collect();
        let mut block = Block::new();
        match body {
            ProtectedBody::Stmts(stmts) => self.lower_block(stmts, &mut block)?,
            ProtectedBody::Stmt(stmt) => block = self.lower_nested(stmt)?,
        }
        Ok((names, block))
    }

    pub(crate) fn lower_try(
        &mut self,
        block: &SrcBlock,
        catches: &[CatchClause],
        finally: Option<&SrcBlock>,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<()> {
        let (try_fn, try_arity) = self.protected_body(&[], ProtectedBody::Stmts(&block.stmts), block.span)?;
        let mut arity = try_arity;
        let catch_fn = if catches.is_empty() {
            None
        } else {
            let (function, catch_arity) = self.lower_catches(catches, span)?;
            arity = max_arity(arity, catch_arity);
            Some(function)
        };
        let finally_fn = match finally {
            Some(finally) => Some(self.protected_body(&[], ProtectedBody::Stmts(&finally.stmts), finally.span)?.0),
            None => None,
        };
        let mut args = vec![Expr::function(try_fn)];
        match (catch_fn, finally_fn) {
            (Some(catch_fn), Some(finally_fn)) => {
                args.push(Expr::function(catch_fn));
                args.push(Expr::function(finally_fn));
            }
            (Some(catch_fn), None) => args.push(Expr::function(catch_fn)),
            (None, Some(finally_fn)) => {
                args.push(Expr::nil());
                args.push(Expr::function(finally_fn));
            }
            (None, None) => {}
        }
        self.finish_protected(Expr::call(Expr::path("System.try"), args), arity, span, out)
    }

    /// The catch closure: one parameter holding the exception, handlers
    /// chosen by type and filter, rethrow when none matches
    fn lower_catches(&mut self, catches: &[CatchClause], span: Span) -> LowerResult<(Function, Option<usize>)> {
        let at = self.at(span);
        self.scopes.push(FrameKind::Function, Some(at));
        self.function_mut(span)?.protected.push(None);
        let lowered = self.catch_chain(catches, span);
        let function = self.function_mut(span)?;
        let arity = function.protected.pop().flatten();
        function.catch_vars.pop();
        let popped = self.scopes.pop();
        let (param, mut block) = lowered?;
        popped.map_err(|error| LowerError::from_scope(error, at))?;
        seal(&mut block);
        Ok((Function::new(vec![param], block), arity))
    }

    fn catch_chain(&mut self, catches: &[CatchClause], span: Span) -> LowerResult<(Name, Block)> {
        let param = match catches.iter().find_map(|clause| clause.var) {
            Some(var) => self.declare(var),
            None => self.synthetic("e"),
        };
        for var in catches.iter().filter_map(|clause| clause.var) {
            self.scopes.bind(var, param.clone());
        }
        self.function_mut(span)?.catch_vars.push(param.clone());

        let mut arms = Vec::with_capacity(catches.len());
        for clause in catches {
            let mut prelude = Block::new();
            let test = clause.ty.as_ref().map(|ty| {
                Expr::call(
                    Expr::path("System.is"),
                    vec![Expr::Ident(param.clone()), self.type_expr(ty)],
                )
            });
            let cond = match &clause.filter {
                Some(filter) => Some(self.guarded(test, filter, &mut prelude)?),
                None => test,
            };
            let mut body = Block::new();
            self.lower_block(&clause.block.stmts, &mut body)?;
            arms.push((prelude, cond, body));
        }

        let rethrow = Block::of(vec![Stmt::Expr(Expr::call(
            Expr::path("System.throw"),
            vec![Expr::Ident(param.clone())],
        ))]);
        let mut otherwise = Some(rethrow);
        for (prelude, cond, body) in arms.into_iter().rev() {
            let Some(cond) = cond else {
                let mut block = prelude;
                block.stmts.extend(body.stmts);
                otherwise = Some(block);
                continue;
            };
            let mut if_stmt = IfStmt::new(cond, body);
            if_stmt.otherwise = otherwise.take();
            flatten_else(&mut if_stmt);
            let mut block = prelude;
            block.push(Stmt::If(Box::new(if_stmt)));
            otherwise = Some(block);
        }
        Ok((param, otherwise.unwrap_or_default()))
    }

    pub(crate) fn lower_using(
        &mut self,
        decl: Option<&LocalDeclarator>,
        expr: Option<&SrcExpr>,
        body: &SrcStmt,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<()> {
        let (resource, params) = match (decl, expr) {
            (Some(decl), _) => {
                let value = match &decl.init {
                    Some(init) => self.lower_expr(init, out)?,
                    None => Expr::nil(),
                };
                (value, vec![decl.symbol])
            }
            (None, Some(expr)) => (self.lower_expr(expr, out)?, Vec::new()),
            (None, None) => (Expr::nil(), Vec::new()),
        };
        let (function, arity) = self.protected_body(&params, ProtectedBody::Stmt(body), span)?;
        let call = Expr::call(Expr::path("System.using"), vec![resource, Expr::function(function)]);
        self.finish_protected(call, arity, span, out)
    }

    /// Run a protected call and re-return what a `return` inside produced
    fn finish_protected(&mut self, call: Expr, arity: Option<usize>, span: Span, out: &mut Block) -> LowerResult<()> {
        let Some(arity) = arity else {
            out.push(Stmt::Expr(call));
            return Ok(());
        };
        let ok = self.synthetic("ok");
        let mut names = vec![ok.clone()];
        for _ in 0..arity {
            names.push(self.temp()?);
        }
        let values: Vec<Expr> = names.iter().skip(1).cloned().map(Expr::Ident).collect();
        out.push(Stmt::Local {
            names,
            values: vec![call],
        });
        let mut then = Block::new();
        self.emit_raw_return(values, span, &mut then)?;
        out.push(Stmt::if_then(Expr::Ident(ok), then));
        Ok(())
    }
}


/// Statements run inside a protected-region closure
#[derive(Clone, Copy)]
enum ProtectedBody<'src> {
    Stmts(&'src [SrcStmt]),
    Stmt(&'src SrcStmt),
}

fn max_arity(left: Option<usize>, right: Option<usize>) -> Option<usize> {
    match (left, right) {
        (Some(left), Some(right)) => Some(left.max(right)),
        (left, right) => left.or(right),
    }
}

//! Statement lowering and function bodies

use crate::context::{Breakable, LowerCtx, LowerResult, SectionKey};
use crate::error::LowerError;
use crate::walker::control::{Descend, any_stmt};
use lm_source::{Body, Expr as SrcExpr, LocalDeclarator, MethodDecl, Stmt as SrcStmt, StmtKind, SymbolId, TypeRef};
use lm_span::Span;
use lm_target::{Block, Expr, Function, IfStmt, Name, Stmt, UnOp};
use std::{mem, slice};
use tracing::trace;

/// Wrap every `return`/`break` that is not the last statement of its block
/// in `do ... end`, since the target only accepts them last
pub(crate) fn seal(block: &mut Block) {
    let last = block.stmts.len().saturating_sub(1);
    for (index, stmt) in block.stmts.iter_mut().enumerate() {
        if index < last && matches!(stmt, Stmt::Return(_) | Stmt::Break) {
            let jump = mem::replace(stmt, Stmt::Break);
            *stmt = Stmt::Do(Block::of(vec![jump]));
        }
    }
}

/// Whether a lowered block introduces locals at its top level
pub(crate) fn declares_locals(block: &Block) -> bool {
    block
        .stmts
        .iter()
        .any(|stmt| matches!(stmt, Stmt::Local { .. } | Stmt::LocalFunction { .. }))
}

/// Whether a body contains `yield return` or `yield break`
pub(crate) fn is_iterator(body: &Body) -> bool {
    match body {
        Body::Block(block) => block.stmts.iter().any(|stmt| {
            any_stmt(stmt, Descend::ALL, |kind| {
                matches!(kind, StmtKind::YieldReturn(_) | StmtKind::YieldBreak)
            })
        }),
        Body::Expr(_) => false,
    }
}

impl LowerCtx<'_> {
    /// Open a function frame for a member or local function and declare its
    /// parameters. Instance members get a leading receiver parameter; generic
    /// methods get their type parameters after the value parameters.
    pub(crate) fn begin_function(
        &mut self,
        symbol: SymbolId,
        has_this: bool,
        closure: bool,
        span: Span,
    ) -> LowerResult<Vec<Name>> {
        let at = self.at(span);
        if closure {
            self.enter_closure(at);
        } else {
            self.enter_function(None, at);
        }
        let mut params = Vec::new();
        if has_this && !closure {
            let this = self.synthetic("this");
            self.function_mut(span)?.this = Some(this.clone());
            params.push(this);
        }
        let model = self.model;
        for param in model.params(symbol) {
            let name = self.declare(*param);
            if model.ref_kind(*param).is_ref_or_out() {
                self.function_mut(span)?.ref_params.push(name.clone());
            }
            params.push(name);
        }
        if let Some(detail) = model.method(symbol) {
            for type_param in &detail.type_params {
                params.push(self.declare(*type_param));
            }
        }
        Ok(params)
    }

    /// Close the frame opened by [`Self::begin_function`]
    pub(crate) fn finish_function(
        &mut self,
        symbol: SymbolId,
        params: Vec<Name>,
        mut body: Block,
        iterator: bool,
    ) -> LowerResult<Function> {
        let model = self.model;
        let return_type = model.type_of(symbol).cloned().unwrap_or(TypeRef::Void);
        let state = self.leave_function()?;
        if return_type.is_void() && !state.ref_params.is_empty() && !body.ends_in_jump() {
            body.push(Stmt::Return(state.ref_params.into_iter().map(Expr::Ident).collect()));
        }
        seal(&mut body);
        if !iterator {
            return Ok(Function::new(params, body));
        }
        trace!(method = model.name(symbol), "iterator body");
        let enumerator = model.type_match_name(&return_type).contains("IEnumerator");
        let helper = if enumerator {
            "System.yieldIEnumerator"
        } else {
            "System.yieldIEnumerable"
        };
        let element = model
            .element_type(&return_type)
            .map_or_else(|| Expr::path("System.Object"), |ty| self.type_expr(&ty));
        let inner = Function {
            has_yield: true,
            ..Function::new(params.clone(), body)
        };
        let mut args = vec![Expr::function(inner), element];
        args.extend(params.iter().cloned().map(Expr::Ident));
        let wrapped = Block::of(vec![Stmt::Return(vec![Expr::call(Expr::path(helper), args)])]);
        Ok(Function::new(params, wrapped))
    }

    /// Lower a method-like member or local function to a function literal
    pub(crate) fn lower_function(
        &mut self,
        symbol: SymbolId,
        body: Option<&Body>,
        has_this: bool,
        closure: bool,
        span: Span,
    ) -> LowerResult<Function> {
        let params = self.begin_function(symbol, has_this, closure, span)?;
        let mut block = Block::new();
        let iterator = body.is_some_and(is_iterator);
        if let Some(body) = body {
            self.lower_body(symbol, body, &mut block)?;
        }
        self.finish_function(symbol, params, block, iterator)
    }

    /// Statements of a method body
    pub(crate) fn lower_body(&mut self, symbol: SymbolId, body: &Body, out: &mut Block) -> LowerResult<()> {
        match body {
            Body::Block(block) => self.lower_block(&block.stmts, out),
            Body::Expr(expr) => {
                let returns_value = self.model.type_of(symbol).is_some_and(|ty| !ty.is_void());
                if returns_value {
                    let value = self.lower_expr(expr, out)?;
                    self.emit_return(vec![value], expr.span, out)
                } else {
                    self.lower_expr_stmt(expr, out)
                }
            }
        }
    }

    /// Lower a statement list into `out`
    ///
    /// Local functions are hoisted to the top, statements after a jump are
    /// dropped unless labeled, and early jumps are sealed.
    pub(crate) fn lower_block(&mut self, stmts: &[SrcStmt], out: &mut Block) -> LowerResult<()> {
        self.declare_labels(stmts);
        self.hoist_local_functions(stmts, out)?;
        let mut dead = false;
        for stmt in stmts {
            if matches!(stmt.kind, StmtKind::LocalFunction(_)) {
                continue;
            }
            if dead && !matches!(stmt.kind, StmtKind::Labeled { .. }) {
                continue;
            }
            let mark = out.stmts.len();
            self.lower_stmt(stmt, out)?;
            dead = out.stmts.len() > mark && out.ends_in_jump();
        }
        seal(out);
        Ok(())
    }

    /// Lower one statement as a block of its own
    pub(crate) fn lower_nested(&mut self, stmt: &SrcStmt) -> LowerResult<Block> {
        let mut block = Block::new();
        match &stmt.kind {
            StmtKind::Block(inner) => self.lower_block(&inner.stmts, &mut block)?,
            _ => self.lower_block(slice::from_ref(stmt), &mut block)?,
        }
        Ok(block)
    }

    fn declare_labels(&mut self, stmts: &[SrcStmt]) {
        for stmt in stmts {
            let mut current = stmt;
            while let StmtKind::Labeled { label, stmt: inner } = &current.kind {
                if self.scopes.resolve(*label).is_none() {
                    self.declare(*label);
                }
                current = inner;
            }
        }
    }

    fn hoist_local_functions(&mut self, stmts: &[SrcStmt], out: &mut Block) -> LowerResult<()> {
        let functions: Vec<&MethodDecl> = stmts
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::LocalFunction(decl) => Some(decl),
                _ => None,
            })
            .collect();
        match functions.as_slice() {
            [] => {}
            [decl] => {
                let name = self.declare(decl.symbol);
                let function = self.lower_function(decl.symbol, decl.body.as_ref(), false, true, decl.span)?;
                out.push(Stmt::LocalFunction { name, function });
            }
            many => {
                // Mutually recursive local functions need every name in scope first
                let names: Vec<Name> = many.iter().map(|decl| self.declare(decl.symbol)).collect();
                out.push(Stmt::Local {
                    names: names.clone(),
                    values: Vec::new(),
                });
                for (decl, name) in many.iter().zip(names) {
                    let function = self.lower_function(decl.symbol, decl.body.as_ref(), false, true, decl.span)?;
                    out.push(Stmt::assign(Expr::Ident(name), Expr::function(function)));
                }
            }
        }
        Ok(())
    }

    /// Lower one statement into `out`
    pub(crate) fn lower_stmt(&mut self, stmt: &SrcStmt, out: &mut Block) -> LowerResult<()> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Block(inner) => {
                let mut block = Block::new();
                self.lower_block(&inner.stmts, &mut block)?;
                if declares_locals(&block) {
                    out.push(Stmt::Do(block));
                } else {
                    out.stmts.extend(block.stmts);
                }
            }
            StmtKind::Local(decls) => {
                for decl in decls {
                    self.lower_local(decl, out)?;
                }
            }
            StmtKind::Expr(expr) => self.lower_expr_stmt(expr, out)?,
            StmtKind::If { cond, then, otherwise } => self.lower_if(cond, then, otherwise.as_deref(), out)?,
            StmtKind::While { cond, body } => {
                let mut prelude = Block::new();
                let cond_value = self.lower_expr(cond, &mut prelude)?;
                let body = self.lower_loop_body(body, span)?;
                out.push(guarded_loop(cond_value, prelude, body));
            }
            StmtKind::DoWhile { body, cond } => {
                let mut block = self.lower_loop_body(body, span)?;
                let mut prelude = Block::new();
                let cond_value = self.lower_expr(cond, &mut prelude)?;
                if !block.ends_in_jump() {
                    block.stmts.extend(prelude.stmts);
                }
                out.push(Stmt::Repeat {
                    body: block,
                    until: Expr::unary(UnOp::Not, cond_value),
                });
            }
            StmtKind::For {
                decls,
                init,
                cond,
                step,
                body,
            } => self.lower_for(decls, init, cond.as_ref(), step, body, span, out)?,
            StmtKind::ForEach { var, collection, body } => {
                let sequence = self.lower_expr(collection, out)?;
                let discard = self.synthetic("_");
                let name = self.declare(*var);
                let body = self.lower_loop_body(body, span)?;
                out.push(Stmt::ForIn {
                    names: vec![discard, name],
                    exprs: vec![Expr::call(Expr::path("System.each"), vec![sequence])],
                    body,
                });
            }
            StmtKind::Switch { subject, sections } => self.lower_switch(subject, sections, span, out)?,
            StmtKind::Break => self.lower_break(span, out)?,
            StmtKind::Continue => self.lower_continue(span, out)?,
            StmtKind::Return(value) => {
                let values = match value {
                    Some(value) => vec![self.lower_expr(value, out)?],
                    None => Vec::new(),
                };
                self.emit_return(values, span, out)?;
            }
            StmtKind::YieldReturn(value) => {
                let value = self.lower_expr(value, out)?;
                out.push(Stmt::Expr(Expr::call(Expr::path("System.yieldReturn"), vec![value])));
            }
            StmtKind::YieldBreak => self.emit_raw_return(Vec::new(), span, out)?,
            StmtKind::Goto(label) => out.push(Stmt::Goto(self.resolve(*label, span)?)),
            StmtKind::GotoCase(value) => {
                let key = SectionKey::Case(case_key(value));
                out.push(Stmt::Goto(self.section_label(&key, span)?));
            }
            StmtKind::GotoDefault => out.push(Stmt::Goto(self.section_label(&SectionKey::Default, span)?)),
            StmtKind::Labeled { label, stmt: inner } => {
                out.push(Stmt::Label(self.resolve(*label, span)?));
                self.lower_stmt(inner, out)?;
            }
            StmtKind::Throw(value) => {
                let value = match value {
                    Some(value) => self.lower_expr(value, out)?,
                    None => self
                        .function()
                        .and_then(|function| function.catch_vars.last())
                        .cloned()
                        .map(Expr::Ident)
                        .ok_or_else(|| LowerError::unsupported("rethrow outside a catch clause", self.at(span)))?,
                };
                out.push(Stmt::Expr(Expr::call(Expr::path("System.throw"), vec![value])));
            }
            StmtKind::Try {
                block,
                catches,
                finally,
            } => self.lower_try(block, catches, finally.as_ref(), span, out)?,
            StmtKind::Using { decl, expr, body } => self.lower_using(decl.as_ref(), expr.as_ref(), body, span, out)?,
            StmtKind::LocalFunction(decl) => {
                let name = self.declare(decl.symbol);
                let function = self.lower_function(decl.symbol, decl.body.as_ref(), false, true, decl.span)?;
                out.push(Stmt::LocalFunction { name, function });
            }
            StmtKind::Empty => {}
        }
        Ok(())
    }

    pub(crate) fn lower_local(&mut self, decl: &LocalDeclarator, out: &mut Block) -> LowerResult<()> {
        let value = match &decl.init {
            Some(init) => Some(self.lower_expr(init, out)?),
            None => None,
        };
        let name = self.declare(decl.symbol);
        out.push(match value {
            Some(value) => Stmt::local(name, value),
            None => Stmt::declare(name),
        });
        Ok(())
    }

    /// `if`/`else if` chains flatten into one `if ... elseif ... end`
    fn lower_if(
        &mut self,
        cond: &SrcExpr,
        then: &SrcStmt,
        otherwise: Option<&SrcStmt>,
        out: &mut Block,
    ) -> LowerResult<()> {
        let cond_value = self.lower_expr(cond, out)?;
        let then_block = self.lower_nested(then)?;
        let mut if_stmt = IfStmt::new(cond_value, then_block);
        let mut rest = otherwise;
        while let Some(stmt) = rest {
            match &stmt.kind {
                StmtKind::If {
                    cond,
                    then,
                    otherwise: next,
                } => {
                    let mut prelude = Block::new();
                    let next_cond = self.lower_expr(cond, &mut prelude)?;
                    if !prelude.is_empty() {
                        // The condition needs statements: keep it nested under `else`
                        let mut nested = prelude;
                        let nested_then = self.lower_nested(then)?;
                        let mut inner = IfStmt::new(next_cond, nested_then);
                        if let Some(next) = next {
                            inner.otherwise = Some(self.lower_nested(next)?);
                        }
                        nested.push(Stmt::If(Box::new(inner)));
                        if_stmt.otherwise = Some(nested);
                        break;
                    }
                    let branch = self.lower_nested(then)?;
                    if_stmt.else_ifs.push((next_cond, branch));
                    rest = next.as_deref();
                }
                _ => {
                    if_stmt.otherwise = Some(self.lower_nested(stmt)?);
                    rest = None;
                }
            }
        }
        out.push(Stmt::If(Box::new(if_stmt)));
        Ok(())
    }

    #[allow(clippy::too_many_arguments, reason = "one parameter per loop part")]
    fn lower_for(
        &mut self,
        decls: &[LocalDeclarator],
        init: &[SrcExpr],
        cond: Option<&SrcExpr>,
        step: &[SrcExpr],
        body: &SrcStmt,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<()> {
        let mut scope = Block::new();
        for decl in decls {
            self.lower_local(decl, &mut scope)?;
        }
        for expr in init {
            self.lower_expr_stmt(expr, &mut scope)?;
        }
        let mut prelude = Block::new();
        let cond_value = match cond {
            Some(cond) => self.lower_expr(cond, &mut prelude)?,
            None => Expr::boolean(true),
        };
        let mut block = self.lower_loop_body(body, span)?;
        if !block.ends_in_jump() {
            for expr in step {
                self.lower_expr_stmt(expr, &mut block)?;
            }
        }
        scope.push(guarded_loop(cond_value, prelude, block));
        if declares_locals(&scope) {
            out.push(Stmt::Do(scope));
        } else {
            out.stmts.extend(scope.stmts);
        }
        Ok(())
    }

    /// Lower a loop body, adding continue emulation when a `continue`
    /// targets this loop
    pub(crate) fn lower_loop_body(&mut self, body: &SrcStmt, span: Span) -> LowerResult<Block> {
        let continues = any_stmt(body, Descend::SWITCHES, |kind| matches!(kind, StmtKind::Continue));
        let flag = continues.then(|| self.synthetic("continue"));
        let depth = self.closure_depth();
        self.function_mut(span)?.breakables.push(Breakable::Loop {
            flag: flag.clone(),
            depth,
        });
        let lowered = self.lower_nested(body);
        self.function_mut(span)?.breakables.pop();
        let mut inner = lowered?;
        let Some(flag) = flag else {
            return Ok(inner);
        };
        if !inner.ends_in_jump() {
            inner.push(Stmt::assign(Expr::Ident(flag.clone()), Expr::boolean(true)));
        }
        seal(&mut inner);
        Ok(Block::of(vec![
            Stmt::declare(flag.clone()),
            Stmt::Repeat {
                body: inner,
                until: Expr::boolean(true),
            },
            Stmt::if_then(
                Expr::unary(UnOp::Not, Expr::Ident(flag)),
                Block::of(vec![Stmt::Break]),
            ),
        ]))
    }

    fn lower_break(&mut self, span: Span, out: &mut Block) -> LowerResult<()> {
        let depth = self.closure_depth();
        match self.function().and_then(|function| function.breakables.last()) {
            Some(Breakable::Loop { depth: level, .. } | Breakable::Switch { depth: level, .. }) if *level == depth => {
                out.push(Stmt::Break);
                Ok(())
            }
            Some(_) => Err(LowerError::unsupported("break out of a protected region", self.at(span))),
            None => Err(LowerError::unsupported("break outside a loop or switch", self.at(span))),
        }
    }

    fn lower_continue(&mut self, span: Span, out: &mut Block) -> LowerResult<()> {
        let depth = self.closure_depth();
        let at = self.at(span);
        let function = self.function_mut(span)?;
        let Some(position) = function
            .breakables
            .iter()
            .rposition(|breakable| matches!(breakable, Breakable::Loop { .. }))
        else {
            return Err(LowerError::unsupported("continue outside a loop", at));
        };
        let Some(Breakable::Loop {
            flag: Some(flag),
            depth: level,
        }) = function.breakables.get(position).cloned()
        else {
            return Err(LowerError::unsupported("continue without a loop flag", at));
        };
        if level != depth {
            return Err(LowerError::unsupported("continue out of a protected region", at));
        }
        for breakable in &mut function.breakables[position + 1..] {
            if let Breakable::Switch { continue_escapes, .. } = breakable {
                *continue_escapes = true;
            }
        }
        out.push(Stmt::assign(Expr::Ident(flag), Expr::boolean(true)));
        out.push(Stmt::Break);
        Ok(())
    }

    /// Label of a switch section reached through `goto case`/`goto default`
    fn section_label(&self, key: &SectionKey, span: Span) -> LowerResult<Name> {
        self.function()
            .and_then(|function| {
                function.breakables.iter().rev().find_map(|breakable| match breakable {
                    Breakable::Switch { labels, .. } => Some(labels),
                    Breakable::Loop { .. } => None,
                })
            })
            .and_then(|labels| labels.iter().find(|(candidate, _)| candidate == key))
            .map(|(_, label)| label.clone())
            .ok_or_else(|| LowerError::unsupported("goto to a missing switch section", self.at(span)))
    }

    /// `return`, with trailing ref/out parameters and the protected-region
    /// protocol applied
    pub(crate) fn emit_return(&mut self, mut values: Vec<Expr>, span: Span, out: &mut Block) -> LowerResult<()> {
        if let Some(function) = self.function() {
            values.extend(function.ref_params.iter().cloned().map(Expr::Ident));
        }
        self.emit_raw_return(values, span, out)
    }

    /// `return` of already complete values
    pub(crate) fn emit_raw_return(&mut self, mut values: Vec<Expr>, span: Span, out: &mut Block) -> LowerResult<()> {
        let function = self.function_mut(span)?;
        if let Some(arity) = function.protected.last_mut() {
            *arity = Some(arity.unwrap_or(0).max(values.len()));
            values.insert(0, Expr::boolean(true));
        }
        out.push(Stmt::Return(values));
        Ok(())
    }
}

/// `while` loop whose condition may need statements of its own
fn guarded_loop(cond: Expr, prelude: Block, body: Block) -> Stmt {
    if prelude.is_empty() {
        return Stmt::While { cond, body };
    }
    let mut guarded = prelude;
    guarded.push(Stmt::if_then(Expr::unary(UnOp::Not, cond), Block::of(vec![Stmt::Break])));
    guarded.stmts.extend(body.stmts);
    Stmt::While {
        cond: Expr::boolean(true),
        body: guarded,
    }
}

/// Key of a `case` value, shared by labels and `goto case`
pub(crate) fn case_key(value: &SrcExpr) -> String {
    match &value.constant {
        Some(constant) => format!("{constant:?}"),
        None => format!("{:?}", value.kind),
    }
}

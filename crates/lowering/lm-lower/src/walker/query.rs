//! Query expressions
//!
//! Each clause becomes a `Linq.*` call on the running sequence with selector
//! closures over the live range variables. Once two variables are live they
//! travel together in a two-field pack table; a variable buried in nested
//! packs is read through one member access per level.

use crate::context::{LowerCtx, LowerResult};
use lm_source::{Constant, Expr as SrcExpr, ExprKind, QueryBody, QueryClause, QueryEnd, QueryExpr, SymbolId};
use lm_span::Span;
use lm_target::{Block, Expr, Function, Name, Stmt, TableItem};
use tracing::trace;

/// Live range variables of a query, each with its pack depth
#[derive(Debug, Clone)]
struct Live {
    vars: Vec<(SymbolId, usize)>,
}

impl Live {
    fn var(var: SymbolId) -> Self {
        Self { vars: vec![(var, 0)] }
    }

    /// The single unpacked variable
    fn sole(&self) -> Option<SymbolId> {
        match self.vars.as_slice() {
            [(var, 0)] => Some(*var),
            _ => None,
        }
    }

    /// Pack the live variables together with `var`
    fn packed_with(mut self, var: SymbolId) -> Self {
        for (_, depth) in &mut self.vars {
            *depth += 1;
        }
        self.vars.push((var, 1));
        self
    }
}

fn linq(method: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::path(&format!("Linq.{method}")), args)
}

/// Whether a terminal `select` can fold into the result selector of the
/// body's only clause
fn folds_select(body: &QueryBody) -> Option<&SrcExpr> {
    match (&body.clauses[..], &body.end) {
        ([_], QueryEnd::Select(select)) => Some(select),
        _ => None,
    }
}

/// `expr` is just a read of `var`
fn is_var(expr: &SrcExpr, var: SymbolId) -> bool {
    matches!(expr.unparen().kind, ExprKind::Name(symbol) if symbol == var)
}

impl LowerCtx<'_> {
    pub(crate) fn lower_query(&mut self, query: &QueryExpr, out: &mut Block) -> LowerResult<Expr> {
        let collection = self.lower_expr(&query.from.expr, out)?;
        let pack = self.synthetic("__");
        self.declare(query.from.var);
        trace!(clauses = query.body.clauses.len(), "query");
        self.lower_query_body(collection, &query.body, Live::var(query.from.var), &pack, out)
    }

    fn lower_query_body(
        &mut self,
        mut collection: Expr,
        body: &QueryBody,
        mut live: Live,
        pack: &Name,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let folded = folds_select(body);
        for clause in &body.clauses {
            match clause {
                QueryClause::From(from) => {
                    let span = from.expr.span;
                    let selector = self.selector(&[&live], pack, span, |ctx, block| ctx.lower_expr(&from.expr, block))?;
                    self.declare(from.var);
                    let (result, result_ty) = self.result_selector(&live, from.var, folded, pack, span)?;
                    collection = linq("SelectMany", vec![collection, selector, result, result_ty]);
                    if folded.is_some() {
                        return self.continue_query(collection, body, pack, out);
                    }
                    live = live.packed_with(from.var);
                }
                QueryClause::Let { var, expr } => {
                    let own_key = self.live_param(&live, pack, expr.span)?;
                    let key = self.declare(*var);
                    let selector = self.selector(&[&live], pack, expr.span, |ctx, block| {
                        let value = ctx.lower_expr(expr, block)?;
                        Ok(Expr::Table(vec![
                            TableItem::Keyed(own_key.clone(), Expr::Ident(own_key)),
                            TableItem::Keyed(key, value),
                        ]))
                    })?;
                    collection = linq("Select", vec![collection, selector, Expr::path("System.AnonymousType")]);
                    live = live.packed_with(*var);
                }
                QueryClause::Where(cond) => {
                    if cond.constant == Some(Constant::Bool(true)) {
                        continue;
                    }
                    let selector = self.selector(&[&live], pack, cond.span, |ctx, block| ctx.lower_expr(cond, block))?;
                    collection = linq("Where", vec![collection, selector]);
                }
                QueryClause::OrderBy(orderings) => {
                    for (index, ordering) in orderings.iter().enumerate() {
                        let method = match (index == 0, ordering.descending) {
                            (true, false) => "OrderBy",
                            (true, true) => "OrderByDescending",
                            (false, false) => "ThenBy",
                            (false, true) => "ThenByDescending",
                        };
                        let key = &ordering.key;
                        let selector = self.selector(&[&live], pack, key.span, |ctx, block| ctx.lower_expr(key, block))?;
                        let key_ty = self.type_expr(&key.ty);
                        collection = linq(method, vec![collection, selector, Expr::nil(), key_ty]);
                    }
                }
                QueryClause::Join(join) => {
                    let span = join.expr.span;
                    let inner = self.lower_expr(&join.expr, out)?;
                    self.declare(join.var);
                    let outer_key = self.selector(&[&live], pack, join.left_key.span, |ctx, block| {
                        ctx.lower_expr(&join.left_key, block)
                    })?;
                    let key_ty = self.type_expr(&join.left_key.ty);
                    let inner_key = self.selector(&[&Live::var(join.var)], pack, join.right_key.span, |ctx, block| {
                        ctx.lower_expr(&join.right_key, block)
                    })?;
                    let (method, second) = match join.into {
                        Some(into) => {
                            self.declare(into);
                            ("GroupJoin", into)
                        }
                        None => ("Join", join.var),
                    };
                    let (result, result_ty) = self.result_selector(&live, second, folded, pack, span)?;
                    collection = linq(
                        method,
                        vec![collection, inner, outer_key, inner_key, result, Expr::nil(), key_ty, result_ty],
                    );
                    if folded.is_some() {
                        return self.continue_query(collection, body, pack, out);
                    }
                    live = live.packed_with(second);
                }
            }
        }

        collection = match &body.end {
            QueryEnd::Select(select) => {
                if live.sole().is_some_and(|var| is_var(select, var)) {
                    collection
                } else {
                    let selector = self.selector(&[&live], pack, select.span, |ctx, block| ctx.lower_expr(select, block))?;
                    let ty = self.type_expr(&select.ty);
                    linq("Select", vec![collection, selector, ty])
                }
            }
            QueryEnd::Group { element, key } => {
                let key_selector = self.selector(&[&live], pack, key.span, |ctx, block| ctx.lower_expr(key, block))?;
                let key_ty = self.type_expr(&key.ty);
                if live.sole().is_some_and(|var| is_var(element, var)) {
                    linq("GroupBy", vec![collection, key_selector, key_ty])
                } else {
                    let element_selector =
                        self.selector(&[&live], pack, element.span, |ctx, block| ctx.lower_expr(element, block))?;
                    let element_ty = self.type_expr(&element.ty);
                    linq("GroupBy", vec![collection, key_selector, element_selector, key_ty, element_ty])
                }
            }
        };
        self.continue_query(collection, body, pack, out)
    }

    fn continue_query(&mut self, collection: Expr, body: &QueryBody, pack: &Name, out: &mut Block) -> LowerResult<Expr> {
        let Some(continuation) = &body.continuation else {
            return Ok(collection);
        };
        self.declare(continuation.var);
        self.lower_query_body(collection, &continuation.body, Live::var(continuation.var), pack, out)
    }

    /// Result selector of a `from` or `join`: the folded `select`, or a pack
    /// of the live variables and the new one
    fn result_selector(
        &mut self,
        live: &Live,
        var: SymbolId,
        folded: Option<&SrcExpr>,
        pack: &Name,
        span: Span,
    ) -> LowerResult<(Expr, Expr)> {
        if let Some(select) = folded {
            let selector = self.selector(&[live, &Live::var(var)], pack, span, |ctx, block| {
                ctx.lower_expr(select, block)
            })?;
            return Ok((selector, self.type_expr(&select.ty)));
        }
        let first = self.live_param(live, pack, span)?;
        let second = self.resolve(var, span)?;
        let table = Expr::Table(vec![
            TableItem::Keyed(first.clone(), Expr::Ident(first.clone())),
            TableItem::Keyed(second.clone(), Expr::Ident(second.clone())),
        ]);
        let function = Function::new(vec![first, second], Block::of(vec![Stmt::Return(vec![table])]));
        Ok((Expr::function(function), Expr::path("System.AnonymousType")))
    }

    /// Closure over the given live sets whose body is produced by `body`
    fn selector(
        &mut self,
        lives: &[&Live],
        pack: &Name,
        span: Span,
        body: impl FnOnce(&mut Self, &mut Block) -> LowerResult<Expr>,
    ) -> LowerResult<Expr> {
        let mut params = Vec::with_capacity(lives.len());
        let mut saved = Vec::new();
        for live in lives {
            let param = self.live_param(live, pack, span)?;
            for (var, depth) in &live.vars {
                let path = self.range_path(*var, *depth, &param, span)?;
                let previous = self.range_vars.insert(*var, path);
                saved.push((*var, previous));
            }
            params.push(param);
        }
        self.enter_closure(self.at(span));
        let mut block = Block::new();
        let lowered = body(self, &mut block);
        let left = self.leave_function();
        for (var, previous) in saved.into_iter().rev() {
            match previous {
                Some(path) => self.range_vars.insert(var, path),
                None => self.range_vars.remove(&var),
            };
        }
        let value = lowered?;
        left?;
        block.push(Stmt::Return(vec![value]));
        Ok(Expr::function(Function::new(params, block)))
    }

    /// `param`, or `param.__ ... .name` with one access per pack level
    fn range_path(&self, var: SymbolId, depth: usize, param: &Name, span: Span) -> LowerResult<Expr> {
        let name = self.resolve(var, span)?;
        if depth == 0 {
            return Ok(Expr::Ident(name));
        }
        let mut path = Expr::Ident(param.clone());
        for _ in 1..depth {
            path = Expr::member(path, param.as_str());
        }
        Ok(Expr::member(path, name.as_str()))
    }

    /// Parameter a selector takes for a live set: the variable itself, or the pack
    fn live_param(&self, live: &Live, pack: &Name, span: Span) -> LowerResult<Name> {
        match live.sole() {
            Some(var) => self.resolve(var, span),
            None => Ok(pack.clone()),
        }
    }
}

//! Operator selection
//!
//! Source operators map onto target operators or runtime helpers depending on
//! operand types and the [`RuntimeProfile`](crate::RuntimeProfile).

use crate::context::{LowerCtx, LowerResult};
use lm_source::{BinaryOp, Expr as SrcExpr, SymbolId, TypeRef, UnaryOp};
use lm_span::Span;
use lm_target::{BinOp, Block, Expr, IfStmt, Literal, Stmt, UnOp};

/// Runtime helper standing in for an operator, with its nullable variant
fn helper(name: &str, nullable: bool) -> Expr {
    if nullable {
        Expr::path(&format!("System.{name}OfNull"))
    } else {
        Expr::path(&format!("System.{name}"))
    }
}

impl LowerCtx<'_> {
    /// Lower a binary expression, short-circuit forms included
    pub(crate) fn lower_binary(
        &mut self,
        expr: &SrcExpr,
        op: BinaryOp,
        left: &SrcExpr,
        right: &SrcExpr,
        method: Option<SymbolId>,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        match op {
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr if method.is_none() => {
                self.lower_short_circuit(op == BinaryOp::LogicalAnd, left, right, out)
            }
            BinaryOp::Coalesce => self.lower_coalesce(left, right, out),
            _ => {
                let mut operands = self.lower_operands(&[left, right], out)?.into_iter();
                let (Some(lowered_left), Some(lowered_right)) = (operands.next(), operands.next()) else {
                    return Ok(Expr::nil());
                };
                self.combine_binary(
                    op,
                    (&left.ty, lowered_left),
                    (&right.ty, lowered_right),
                    method,
                    expr.span,
                )
            }
        }
    }

    /// Apply a non-short-circuit operator to lowered operands
    pub(crate) fn combine_binary(
        &mut self,
        op: BinaryOp,
        (left_ty, left): (&TypeRef, Expr),
        (right_ty, right): (&TypeRef, Expr),
        method: Option<SymbolId>,
        span: Span,
    ) -> LowerResult<Expr> {
        let model = self.model;
        if let Some(method) = method {
            return self.invoke_static(method, vec![left, right], Vec::new(), span);
        }
        let nullable = model.is_nullable(left_ty) || model.is_nullable(right_ty);
        let integral = model.is_integer(left_ty) && model.is_integer(right_ty);
        let boolean = model.is_bool(left_ty) && model.is_bool(right_ty);
        let profile = self.options.profile;
        Ok(match op {
            BinaryOp::Add if model.is_string(left_ty) || model.is_string(right_ty) => Expr::binary(
                BinOp::Concat,
                self.stringify(left_ty, left),
                self.stringify(right_ty, right),
            ),
            BinaryOp::Add if model.is_delegate(left_ty) => {
                Expr::call(Expr::path("System.DelegateCombine"), vec![left, right])
            }
            BinaryOp::Sub if model.is_delegate(left_ty) => {
                Expr::call(Expr::path("System.DelegateRemove"), vec![left, right])
            }
            BinaryOp::Add => Expr::binary(BinOp::Add, left, right),
            BinaryOp::Sub => Expr::binary(BinOp::Sub, left, right),
            BinaryOp::Mul => Expr::binary(BinOp::Mul, left, right),
            BinaryOp::Div if integral && profile.floor_division && !nullable => {
                Expr::binary(BinOp::FloorDiv, left, right)
            }
            BinaryOp::Div if integral => Expr::call(helper("div", nullable), vec![left, right]),
            BinaryOp::Div => Expr::binary(BinOp::Div, left, right),
            BinaryOp::Mod => Expr::call(helper("mod", nullable), vec![left, right]),
            BinaryOp::BitAnd if boolean => Expr::binary(BinOp::And, left, right),
            BinaryOp::BitOr if boolean => Expr::binary(BinOp::Or, left, right),
            BinaryOp::BitXor if boolean => Expr::binary(BinOp::Ne, left, right),
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                let (native, name) = match op {
                    BinaryOp::BitAnd => (BinOp::BitAnd, "band"),
                    BinaryOp::BitOr => (BinOp::BitOr, "bor"),
                    _ => (BinOp::BitXor, "xor"),
                };
                if profile.native_bitwise && !nullable {
                    Expr::binary(native, left, right)
                } else {
                    Expr::call(helper(name, nullable), vec![left, right])
                }
            }
            BinaryOp::Shl | BinaryOp::Shr => {
                let (native, name) = if op == BinaryOp::Shl {
                    (BinOp::Shl, "sl")
                } else {
                    (BinOp::Shr, "sr")
                };
                if profile.native_shift && !nullable {
                    Expr::binary(native, left, right)
                } else {
                    Expr::call(helper(name, nullable), vec![left, right])
                }
            }
            BinaryOp::Eq => Expr::binary(BinOp::Eq, left, right),
            BinaryOp::Ne => Expr::binary(BinOp::Ne, left, right),
            BinaryOp::Lt => Expr::binary(BinOp::Lt, left, right),
            BinaryOp::Le => Expr::binary(BinOp::Le, left, right),
            BinaryOp::Gt => Expr::binary(BinOp::Gt, left, right),
            BinaryOp::Ge => Expr::binary(BinOp::Ge, left, right),
            BinaryOp::LogicalAnd => Expr::binary(BinOp::And, left, right),
            BinaryOp::LogicalOr => Expr::binary(BinOp::Or, left, right),
            BinaryOp::Coalesce => Expr::binary(BinOp::Or, left, right),
        })
    }

    /// Operand of a concatenation
    pub(crate) fn stringify(&self, ty: &TypeRef, value: Expr) -> Expr {
        if self.model.is_string(ty) && !matches!(value, Expr::Literal(Literal::Nil)) {
            return value;
        }
        if self.model.is_char(ty) {
            return match value {
                Expr::Literal(Literal::Char(ch)) => Expr::string(ch.to_string()),
                other => Expr::call(Expr::path("string.char"), vec![other]),
            };
        }
        Expr::call(Expr::path("System.toString"), vec![value])
    }

    fn lower_short_circuit(
        &mut self,
        is_and: bool,
        left: &SrcExpr,
        right: &SrcExpr,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let lowered_left = self.lower_expr(left, out)?;
        let mut prelude = Block::new();
        let lowered_right = self.lower_expr(right, &mut prelude)?;
        let op = if is_and { BinOp::And } else { BinOp::Or };
        if prelude.is_empty() {
            return Ok(Expr::binary(op, lowered_left, lowered_right));
        }
        // The right operand's statements may only run when it is evaluated
        let temp = self.temp()?;
        out.push(Stmt::local(temp.clone(), lowered_left));
        prelude.push(Stmt::assign(Expr::Ident(temp.clone()), lowered_right));
        let cond = if is_and {
            Expr::Ident(temp.clone())
        } else {
            Expr::unary(UnOp::Not, Expr::Ident(temp.clone()))
        };
        out.push(Stmt::if_then(cond, prelude));
        Ok(Expr::Ident(temp))
    }

    /// `left ?? right`: `or` when `left` can never be `false`
    fn lower_coalesce(&mut self, left: &SrcExpr, right: &SrcExpr, out: &mut Block) -> LowerResult<Expr> {
        let lowered_left = self.lower_expr(left, out)?;
        let mut prelude = Block::new();
        let lowered_right = self.lower_expr(right, &mut prelude)?;
        if !self.model.is_bool(&left.ty) && prelude.is_empty() {
            return Ok(Expr::binary(BinOp::Or, lowered_left, lowered_right));
        }
        let temp = self.temp()?;
        out.push(Stmt::local(temp.clone(), lowered_left));
        prelude.push(Stmt::assign(Expr::Ident(temp.clone()), lowered_right));
        let is_nil = Expr::binary(BinOp::Eq, Expr::Ident(temp.clone()), Expr::nil());
        out.push(Stmt::If(Box::new(IfStmt::new(is_nil, prelude))));
        Ok(Expr::Ident(temp))
    }

    /// Lower a non-stepping unary expression
    pub(crate) fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &SrcExpr,
        method: Option<SymbolId>,
        span: Span,
        out: &mut Block,
    ) -> LowerResult<Expr> {
        let value = self.lower_expr(operand, out)?;
        if let Some(method) = method {
            return self.invoke_static(method, vec![value], Vec::new(), span);
        }
        let nullable = self.model.is_nullable(&operand.ty);
        Ok(match op {
            UnaryOp::Minus => Expr::unary(UnOp::Neg, value),
            UnaryOp::Not => Expr::unary(UnOp::Not, value),
            UnaryOp::BitNot if self.options.profile.native_bitwise && !nullable => Expr::unary(UnOp::BitNot, value),
            UnaryOp::BitNot => Expr::call(helper("bnot", nullable), vec![value]),
            UnaryOp::Plus
            | UnaryOp::PreIncrement
            | UnaryOp::PreDecrement
            | UnaryOp::PostIncrement
            | UnaryOp::PostDecrement => value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::ProgramFacts;
    use crate::options::{LowerOptions, RuntimeProfile};
    use lm_override::OverrideProvider;
    use lm_render::Renderer;
    use lm_source::ModelBuilder;
    use lm_span::FileId;

    fn render_with(profile: RuntimeProfile, op: BinaryOp, nullable: bool) -> String {
        let builder = ModelBuilder::new();
        let int = builder.int();
        let ty = if nullable { TypeRef::Nullable(Box::new(int)) } else { int };
        let model = builder.finish();
        let overrides = OverrideProvider::new();
        let options = LowerOptions::with_profile(profile);
        let facts = ProgramFacts::default();
        let mut ctx = LowerCtx::new(&model, &overrides, &options, &facts, FileId::new(0));
        let combined = ctx.combine_binary(
            op,
            (&ty, Expr::ident("a")),
            (&ty, Expr::ident("b")),
            None,
            Span::detached(),
        );
        combined
            .map(|expr| Renderer::new(4).render_expr(&expr))
            .unwrap_or_default()
    }

    #[test]
    fn test_integer_operators_follow_profile() {
        let newest = RuntimeProfile::newest();
        let classic = RuntimeProfile::classic();
        assert_eq!(render_with(newest, BinaryOp::Div, false), "a // b");
        assert_eq!(render_with(classic, BinaryOp::Div, false), "System.div(a, b)");
        assert_eq!(render_with(newest, BinaryOp::Div, true), "System.divOfNull(a, b)");
        assert_eq!(render_with(newest, BinaryOp::BitAnd, false), "a & b");
        assert_eq!(render_with(classic, BinaryOp::BitXor, false), "System.xor(a, b)");
        assert_eq!(render_with(classic, BinaryOp::Shl, false), "System.sl(a, b)");
        assert_eq!(render_with(newest, BinaryOp::Shr, true), "System.srOfNull(a, b)");
        assert_eq!(render_with(newest, BinaryOp::Mod, false), "System.mod(a, b)");
    }
}

//! Text rendering of target trees
//!
//! Only whitespace, parentheses and literal spelling are decided here.
//! Every lowering decision has already been made by the time a [`Chunk`]
//! reaches the renderer.

mod literal;

pub use literal::{is_identifier, quote_string, KEYWORDS};

use lm_target::{BinOp, Block, Chunk, Expr, Function, IfStmt, Literal, Name, Stmt, TableItem, TemplatePart, UnOp};

/// Pretty-printer for target trees
#[derive(Debug, Clone)]
pub struct Renderer {
    indent: usize,
    level: usize,
    out: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Renderer {
    /// Renderer indenting by `indent` spaces per level
    pub fn new(indent: usize) -> Self {
        Self {
            indent,
            level: 0,
            out: String::new(),
        }
    }

    /// Render a whole chunk
    pub fn render_chunk(mut self, chunk: &Chunk) -> String {
        self.block(&chunk.body);
        self.out
    }

    /// Render one statement at the top level
    pub fn render_stmt(mut self, stmt: &Stmt) -> String {
        self.stmt(stmt);
        self.out
    }

    /// Render one expression
    pub fn render_expr(mut self, expr: &Expr) -> String {
        self.expr(expr);
        self.out
    }

    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn start_line(&mut self) {
        for _ in 0..self.level * self.indent {
            self.out.push(' ');
        }
    }

    fn end_line(&mut self) {
        self.out.push('\n');
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    fn nested(&mut self, block: &Block) {
        self.level += 1;
        self.block(block);
        self.level -= 1;
    }

    fn names(&mut self, names: &[Name]) {
        let joined: Vec<&str> = names.iter().map(Name::as_str).collect();
        self.push(&joined.join(", "));
    }

    fn expr_list(&mut self, exprs: &[Expr]) {
        for (index, expr) in exprs.iter().enumerate() {
            if index > 0 {
                self.push(", ");
            }
            self.expr(expr);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        self.start_line();
        match stmt {
            Stmt::Local { names, values } => {
                self.push("local ");
                self.names(names);
                if !values.is_empty() {
                    self.push(" = ");
                    self.expr_list(values);
                }
            }
            Stmt::LocalFunction { name, function } => {
                self.push("local function ");
                self.push(name.as_str());
                self.function_tail(function);
            }
            Stmt::Assign { targets, values } => {
                self.expr_list(targets);
                self.push(" = ");
                self.expr_list(values);
            }
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::If(if_stmt) => self.if_stmt(if_stmt),
            Stmt::While { cond, body } => {
                self.push("while ");
                self.expr(cond);
                self.push(" do");
                self.end_line();
                self.nested(body);
                self.start_line();
                self.push("end");
            }
            Stmt::Repeat { body, until } => {
                self.push("repeat");
                self.end_line();
                self.nested(body);
                self.start_line();
                self.push("until ");
                self.expr(until);
            }
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.push("for ");
                self.push(var.as_str());
                self.push(" = ");
                self.expr(start);
                self.push(", ");
                self.expr(limit);
                if let Some(step) = step {
                    self.push(", ");
                    self.expr(step);
                }
                self.push(" do");
                self.end_line();
                self.nested(body);
                self.start_line();
                self.push("end");
            }
            Stmt::ForIn { names, exprs, body } => {
                self.push("for ");
                self.names(names);
                self.push(" in ");
                self.expr_list(exprs);
                self.push(" do");
                self.end_line();
                self.nested(body);
                self.start_line();
                self.push("end");
            }
            Stmt::Do(body) => {
                self.push("do");
                self.end_line();
                self.nested(body);
                self.start_line();
                self.push("end");
            }
            Stmt::Return(values) => {
                self.push("return");
                if !values.is_empty() {
                    self.push(" ");
                    self.expr_list(values);
                }
            }
            Stmt::Break => self.push("break"),
            Stmt::Goto(label) => {
                self.push("goto ");
                self.push(label.as_str());
            }
            Stmt::Label(label) => {
                self.push("::");
                self.push(label.as_str());
                self.push("::");
            }
            Stmt::Comment(text) => {
                self.push("-- ");
                self.push(text);
            }
        }
        self.end_line();
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt) {
        self.push("if ");
        self.expr(&if_stmt.cond);
        self.push(" then");
        self.end_line();
        self.nested(&if_stmt.then);
        for (cond, block) in &if_stmt.else_ifs {
            self.start_line();
            self.push("elseif ");
            self.expr(cond);
            self.push(" then");
            self.end_line();
            self.nested(block);
        }
        if let Some(otherwise) = &if_stmt.otherwise {
            self.start_line();
            self.push("else");
            self.end_line();
            self.nested(otherwise);
        }
        self.start_line();
        self.push("end");
    }

    fn function_tail(&mut self, function: &Function) {
        self.push(" (");
        self.names(&function.params);
        if function.vararg {
            if !function.params.is_empty() {
                self.push(", ");
            }
            self.push("...");
        }
        self.push(")");
        if function.body.is_empty() {
            self.push(" end");
            return;
        }
        self.end_line();
        self.nested(&function.body);
        self.start_line();
        self.push("end");
    }

    /// Whether `expr` can stand as a prefix expression (callee or receiver)
    fn is_prefix(expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::Ident(_)
                | Expr::Member { .. }
                | Expr::Index { .. }
                | Expr::Call { .. }
                | Expr::Paren(_)
                | Expr::PropertyAdapter(_)
        )
    }

    fn prefix(&mut self, expr: &Expr) {
        if Self::is_prefix(expr) {
            self.expr(expr);
        } else {
            self.push("(");
            self.expr(expr);
            self.push(")");
        }
    }

    fn operand(&mut self, expr: &Expr, parent: u8, needs_strict: bool) {
        let child = match expr {
            Expr::Binary { op, .. } => Some(op.precedence()),
            Expr::Unary { .. } => Some(UnOp::PRECEDENCE),
            _ => None,
        };
        let wrap = child.is_some_and(|child| child < parent || (needs_strict && child == parent));
        if wrap {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    fn binary(&mut self, op: BinOp, left: &Expr, right: &Expr) {
        let precedence = op.precedence();
        let right_assoc = op.is_right_assoc();
        self.operand(left, precedence, right_assoc);
        self.push(" ");
        self.push(&op.to_string());
        self.push(" ");
        self.operand(right, precedence, !right_assoc);
    }

    fn table(&mut self, items: &[TableItem]) {
        if items.is_empty() {
            self.push("{}");
            return;
        }
        let multiline = items.iter().any(|item| {
            matches!(
                item,
                TableItem::Keyed(_, Expr::Function(_)) | TableItem::Positional(Expr::Function(_))
            )
        });
        if multiline {
            self.push("{");
            self.end_line();
            self.level += 1;
            for (index, item) in items.iter().enumerate() {
                self.start_line();
                self.table_item(item);
                if index + 1 < items.len() {
                    self.push(",");
                }
                self.end_line();
            }
            self.level -= 1;
            self.start_line();
            self.push("}");
        } else {
            self.push("{ ");
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    self.push(", ");
                }
                self.table_item(item);
            }
            self.push(" }");
        }
    }

    fn table_item(&mut self, item: &TableItem) {
        match item {
            TableItem::Positional(value) => self.expr(value),
            TableItem::Keyed(name, value) => {
                if is_identifier(name.as_str()) {
                    self.push(name.as_str());
                } else {
                    self.push("[");
                    self.push(&quote_string(name.as_str()));
                    self.push("]");
                }
                self.push(" = ");
                self.expr(value);
            }
            TableItem::Indexed(key, value) => {
                self.push("[");
                self.expr(key);
                self.push("] = ");
                self.expr(value);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(literal) => self.push(&literal::render_literal(literal)),
            Expr::Ident(name) => self.push(name.as_str()),
            Expr::Vararg => self.push("..."),
            Expr::Table(items) => self.table(items),
            Expr::Member { target, name, colon } => {
                self.prefix(target);
                self.push(if *colon { ":" } else { "." });
                self.push(name.as_str());
            }
            Expr::Index { target, key } => {
                self.prefix(target);
                self.push("[");
                self.expr(key);
                self.push("]");
            }
            Expr::Call { callee, args } => {
                self.prefix(callee);
                self.push("(");
                self.expr_list(args);
                self.push(")");
            }
            Expr::Function(function) => {
                self.push("function");
                self.function_tail(function);
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Unary { op, operand } => {
                self.push(&op.to_string());
                let nested_minus = *op == UnOp::Neg
                    && matches!(
                        operand.as_ref(),
                        Expr::Unary { op: UnOp::Neg, .. } | Expr::Literal(Literal::Int(i64::MIN..0))
                    );
                if nested_minus {
                    self.push("(");
                    self.expr(operand);
                    self.push(")");
                } else {
                    self.operand(operand, UnOp::PRECEDENCE, false);
                }
            }
            Expr::Paren(inner) => {
                self.push("(");
                self.expr(inner);
                self.push(")");
            }
            Expr::PropertyAdapter(adapter) => self.expr(&adapter.to_call()),
            Expr::Template(parts) => {
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => self.push(text),
                        TemplatePart::Expr(inner) => self.expr(inner),
                    }
                }
            }
        }
    }
}

/// Render a chunk with the given indentation width
pub fn render(chunk: &Chunk, indent: usize) -> String {
    Renderer::new(indent).render_chunk(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use lm_target::PropertyAdapter;

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    #[test]
    fn test_precedence_parentheses() {
        let sum = Expr::binary(BinOp::Add, ident("a"), ident("b"));
        let product = Expr::binary(BinOp::Mul, sum.clone(), ident("c"));
        assert_eq!(Renderer::default().render_expr(&product), "(a + b) * c");

        let left_nested = Expr::binary(BinOp::Sub, Expr::binary(BinOp::Sub, ident("a"), ident("b")), ident("c"));
        assert_eq!(Renderer::default().render_expr(&left_nested), "a - b - c");

        let right_nested = Expr::binary(BinOp::Sub, ident("a"), Expr::binary(BinOp::Sub, ident("b"), ident("c")));
        assert_eq!(Renderer::default().render_expr(&right_nested), "a - (b - c)");

        let negated = Expr::unary(UnOp::Not, Expr::binary(BinOp::Eq, ident("a"), ident("b")));
        assert_eq!(Renderer::default().render_expr(&negated), "not (a == b)");
    }

    #[test]
    fn test_callee_needs_prefix_form() {
        let function = Expr::function(Function::new(Vec::new(), Block::new()));
        let call = Expr::call(function, Vec::new());
        assert_eq!(Renderer::default().render_expr(&call), "(function () end)()");

        let method = Expr::call(Expr::method(Expr::string("a"), "rep"), vec![Expr::int(3)]);
        assert_eq!(Renderer::default().render_expr(&method), "(\"a\"):rep(3)");
    }

    #[test]
    fn test_property_adapter_renders_as_call() {
        let adapter = PropertyAdapter {
            target: Some(ident("player")),
            name: Name::from("Health"),
            is_get: false,
            is_property: true,
            colon: true,
            args: vec![Expr::int(10)],
        };
        let rendered = Renderer::default().render_expr(&Expr::PropertyAdapter(Box::new(adapter)));
        assert_eq!(rendered, "player:setHealth(10)");
    }

    #[test]
    fn test_render_statements() {
        let mut if_stmt = IfStmt::new(
            Expr::binary(BinOp::Gt, ident("x"), Expr::int(0)),
            Block::of(vec![Stmt::Return(vec![ident("x")])]),
        );
        if_stmt.otherwise = Some(Block::of(vec![Stmt::Return(vec![Expr::unary(UnOp::Neg, ident("x"))])]));
        let function = Function::new(vec![Name::from("x")], Block::of(vec![Stmt::If(Box::new(if_stmt))]));
        let chunk = Chunk {
            body: Block::of(vec![
                Stmt::LocalFunction {
                    name: Name::from("abs"),
                    function,
                },
                Stmt::local(
                    Name::from("t"),
                    Expr::Table(vec![
                        TableItem::Keyed(Name::from("abs"), ident("abs")),
                        TableItem::Keyed(Name::from("end"), Expr::boolean(true)),
                    ]),
                ),
            ]),
        };

        expect![[r#"
            local function abs (x)
              if x > 0 then
                return x
              else
                return -x
              end
            end
            local t = { abs = abs, ["end"] = true }
        "#]]
        .assert_eq(&render(&chunk, 2));
    }
}

//! Read-only traversal of target trees

use crate::node::{Block, Expr, Function, Name, Stmt, TableItem, TemplatePart};

/// Visitor over target nodes; default methods recurse
pub trait Visitor {
    /// Visit a statement
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    /// Visit an expression
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Visit a function literal or local function
    fn visit_function(&mut self, function: &Function) {
        walk_function(self, function);
    }

    /// Visit a name introduced by a declaration
    fn visit_declaration(&mut self, _name: &Name) {}
}

/// Visit every statement of a block
pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in &block.stmts {
        visitor.visit_stmt(stmt);
    }
}

/// Visit the parameters and body of a function
pub fn walk_function<V: Visitor + ?Sized>(visitor: &mut V, function: &Function) {
    for param in &function.params {
        visitor.visit_declaration(param);
    }
    walk_block(visitor, &function.body);
}

/// Visit the children of a statement
pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Local { names, values } => {
            for value in values {
                visitor.visit_expr(value);
            }
            for name in names {
                visitor.visit_declaration(name);
            }
        }
        Stmt::LocalFunction { name, function } => {
            visitor.visit_declaration(name);
            visitor.visit_function(function);
        }
        Stmt::Assign { targets, values } => {
            for expr in targets.iter().chain(values) {
                visitor.visit_expr(expr);
            }
        }
        Stmt::Expr(expr) => visitor.visit_expr(expr),
        Stmt::If(if_stmt) => {
            visitor.visit_expr(&if_stmt.cond);
            walk_block(visitor, &if_stmt.then);
            for (cond, block) in &if_stmt.else_ifs {
                visitor.visit_expr(cond);
                walk_block(visitor, block);
            }
            if let Some(block) = &if_stmt.otherwise {
                walk_block(visitor, block);
            }
        }
        Stmt::While { cond, body } => {
            visitor.visit_expr(cond);
            walk_block(visitor, body);
        }
        Stmt::Repeat { body, until } => {
            walk_block(visitor, body);
            visitor.visit_expr(until);
        }
        Stmt::NumericFor {
            var,
            start,
            limit,
            step,
            body,
        } => {
            visitor.visit_expr(start);
            visitor.visit_expr(limit);
            if let Some(step) = step {
                visitor.visit_expr(step);
            }
            visitor.visit_declaration(var);
            walk_block(visitor, body);
        }
        Stmt::ForIn { names, exprs, body } => {
            for expr in exprs {
                visitor.visit_expr(expr);
            }
            for name in names {
                visitor.visit_declaration(name);
            }
            walk_block(visitor, body);
        }
        Stmt::Do(body) => walk_block(visitor, body),
        Stmt::Return(values) => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        Stmt::Break | Stmt::Goto(_) | Stmt::Label(_) | Stmt::Comment(_) => {}
    }
}

/// Visit the children of an expression
pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Literal(_) | Expr::Ident(_) | Expr::Vararg => {}
        Expr::Table(items) => {
            for item in items {
                match item {
                    TableItem::Positional(value) | TableItem::Keyed(_, value) => visitor.visit_expr(value),
                    TableItem::Indexed(key, value) => {
                        visitor.visit_expr(key);
                        visitor.visit_expr(value);
                    }
                }
            }
        }
        Expr::Member { target, .. } => visitor.visit_expr(target),
        Expr::Index { target, key } => {
            visitor.visit_expr(target);
            visitor.visit_expr(key);
        }
        Expr::Call { callee, args } => {
            visitor.visit_expr(callee);
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Function(function) => visitor.visit_function(function),
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::Unary { operand, .. } => visitor.visit_expr(operand),
        Expr::Paren(inner) => visitor.visit_expr(inner),
        Expr::PropertyAdapter(adapter) => {
            if let Some(target) = &adapter.target {
                visitor.visit_expr(target);
            }
            for arg in &adapter.args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Template(parts) => {
            for part in parts {
                if let TemplatePart::Expr(inner) = part {
                    visitor.visit_expr(inner);
                }
            }
        }
    }
}

struct DeclarationCollector {
    names: Vec<Name>,
}

impl Visitor for DeclarationCollector {
    fn visit_declaration(&mut self, name: &Name) {
        self.names.push(name.clone());
    }
}

/// Every name declared by `function` and the closures nested inside it,
/// in declaration order
pub fn declared_names(function: &Function) -> Vec<Name> {
    let mut collector = DeclarationCollector { names: Vec::new() };
    collector.visit_function(function);
    collector.names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_names_include_nested_closures() {
        let inner = Function::new(
            vec![Name::from("item")],
            Block::of(vec![Stmt::declare(Name::from("t00"))]),
        );
        let outer = Function::new(
            vec![Name::from("this"), Name::from("items")],
            Block::of(vec![
                Stmt::local(Name::from("count"), Expr::int(0)),
                Stmt::Expr(Expr::call(Expr::ident("each"), vec![Expr::function(inner)])),
            ]),
        );

        let names: Vec<String> = declared_names(&outer).into_iter().map(|name| name.0).collect();
        assert_eq!(names, vec!["this", "items", "count", "item", "t00"]);
    }
}

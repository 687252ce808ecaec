//! Expression language used by formulas and guard conditions.
//!
//! Code is tokenized with logos ([`lexer`]), parsed with chumsky
//! ([`parser`]) and evaluated against a [`Scope`] ([`eval`]). Evaluation is
//! pure: the only inputs are the fields of one JSON object and `now`.

pub mod eval;
pub mod lexer;
pub mod parser;

use serde_json::Value;

pub use eval::{display, evaluate, truthy, EvalError, Scope};
pub use parser::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Array(Vec<Expr>),
}

impl Expr {
    /// Identifier roots the expression reads, sorted and deduplicated.
    ///
    /// `a.b[c]` depends on `a` and `c`; function names are not identifiers.
    pub fn free_identifiers(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names.sort();
        names.dedup();
        names
    }

    fn collect_identifiers(&self, names: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ident(name) => names.push(name.clone()),
            Expr::Member(target, _) => target.collect_identifiers(names),
            Expr::Index(target, index) => {
                target.collect_identifiers(names);
                index.collect_identifiers(names);
            }
            Expr::Unary(_, operand) => operand.collect_identifiers(names),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_identifiers(names);
                rhs.collect_identifiers(names);
            }
            Expr::Ternary(condition, then, otherwise) => {
                condition.collect_identifiers(names);
                then.collect_identifiers(names);
                otherwise.collect_identifiers(names);
            }
            Expr::Call(_, args) | Expr::Array(args) => {
                args.iter().for_each(|arg| arg.collect_identifiers(names))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_identifiers_skip_functions_and_members() {
        let expr = parse("max(a.total, b[i]) + len(items) * a.rate").unwrap();
        assert_eq!(expr.free_identifiers(), vec!["a", "b", "i", "items"]);
    }
}

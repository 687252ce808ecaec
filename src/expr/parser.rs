//! Expression grammar over the token stream.
//!
//! Precedence, loosest first: ternary, `||`, `&&`, equality, comparison,
//! sum, product, unary, postfix access, atoms.

use chumsky::prelude::*;
use chumsky::Stream;
use logos::Logos;
use serde_json::{Number, Value};

use super::lexer::Token;
use super::{BinaryOp, Expr, UnaryOp};
use crate::error::ExpressionError;

type ParserError = Simple<Token>;

/// Parse formula or condition code.
pub fn parse(code: &str) -> Result<Expr, ExpressionError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(code).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(ExpressionError {
                    code: code.to_string(),
                    message: format!("unexpected character {:?}", &code[span.clone()]),
                    offset: Some(span.start),
                })
            }
        }
    }
    let end_of_input = code.len()..code.len() + 1;
    let stream = Stream::from_iter(end_of_input, tokens.into_iter());
    expression()
        .then_ignore(end())
        .parse(stream)
        .map_err(|errors| {
            let first = errors.first();
            let message = match first {
                Some(error) => match error.found() {
                    Some(found) => format!("unexpected `{found}`"),
                    None => "unexpected end of expression".to_string(),
                },
                None => "invalid expression".to_string(),
            };
            ExpressionError {
                code: code.to_string(),
                message,
                offset: first.map(|error| error.span().start),
            }
        })
}

fn number(text: &str) -> Option<Value> {
    if !text.contains(['.', 'e', 'E']) {
        if let Ok(integer) = text.parse::<i64>() {
            return Some(Value::from(integer));
        }
    }
    let float = text.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

enum Access {
    Member(String),
    Index(Expr),
}

fn ident() -> impl Parser<Token, String, Error = ParserError> + Clone {
    select! { Token::Ident(name) => name }
}

fn binary<P, O>(operand: P, operator: O) -> BoxedParser<'static, Token, Expr, ParserError>
where
    P: Parser<Token, Expr, Error = ParserError> + Clone + 'static,
    O: Parser<Token, BinaryOp, Error = ParserError> + Clone + 'static,
{
    operand
        .clone()
        .then(operator.then(operand).repeated())
        .foldl(|lhs, (op, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
        .boxed()
}

fn expression() -> impl Parser<Token, Expr, Error = ParserError> + Clone {
    recursive(|expr| {
        let literal = select! {
            Token::Number(text) => text,
        }
        .try_map(|text, span| {
            number(&text)
                .map(Expr::Literal)
                .ok_or_else(|| Simple::custom(span, format!("invalid number {text}")))
        })
        .or(select! {
            Token::Str(text) => Expr::Literal(Value::String(text)),
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
        });

        let arguments = expr
            .clone()
            .separated_by(just(Token::Comma))
            .delimited_by(just(Token::OpenParen), just(Token::CloseParen));
        let call = ident()
            .then(arguments)
            .map(|(function, args)| Expr::Call(function, args));

        let array = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
            .map(Expr::Array);

        let parenthesized = expr
            .clone()
            .delimited_by(just(Token::OpenParen), just(Token::CloseParen));

        let atom = choice((
            literal,
            call,
            ident().map(Expr::Ident),
            array,
            parenthesized,
        ))
        .boxed();

        let access = just(Token::Dot)
            .ignore_then(ident())
            .map(Access::Member)
            .or(expr
                .clone()
                .delimited_by(just(Token::OpenBracket), just(Token::CloseBracket))
                .map(Access::Index));
        let postfix = atom
            .then(access.repeated())
            .foldl(|target, access| match access {
                Access::Member(name) => Expr::Member(Box::new(target), name),
                Access::Index(index) => Expr::Index(Box::new(target), Box::new(index)),
            })
            .boxed();

        let unary = just(Token::Minus)
            .to(UnaryOp::Neg)
            .or(just(Token::Bang).to(UnaryOp::Not))
            .repeated()
            .then(postfix)
            .foldr(|op, operand| Expr::Unary(op, Box::new(operand)))
            .boxed();

        let product = binary(
            unary,
            just(Token::Star)
                .to(BinaryOp::Mul)
                .or(just(Token::Slash).to(BinaryOp::Div))
                .or(just(Token::Percent).to(BinaryOp::Rem)),
        );
        let sum = binary(
            product,
            just(Token::Plus)
                .to(BinaryOp::Add)
                .or(just(Token::Minus).to(BinaryOp::Sub)),
        );
        let comparison = binary(
            sum,
            choice((
                just(Token::Le).to(BinaryOp::Le),
                just(Token::Lt).to(BinaryOp::Lt),
                just(Token::Ge).to(BinaryOp::Ge),
                just(Token::Gt).to(BinaryOp::Gt),
            )),
        );
        let equality = binary(
            comparison,
            just(Token::EqEq)
                .to(BinaryOp::Eq)
                .or(just(Token::NotEq).to(BinaryOp::Ne)),
        );
        let and = binary(equality, just(Token::And).to(BinaryOp::And));
        let or = binary(and, just(Token::Or).to(BinaryOp::Or));

        or.then(
            just(Token::Question)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Colon))
                .then(expr)
                .or_not(),
        )
        .map(|(condition, branches)| match branches {
            Some((then, otherwise)) => {
                Expr::Ternary(Box::new(condition), Box::new(then), Box::new(otherwise))
            }
            None => condition,
        })
    })
}

//! Scalar text programs.
//!
//! One program per built-in type and format string. Strings are quoted and
//! escaped, booleans are `true`/`false`, the rest delegate to the number,
//! date-time and monetary grammars.

use chrono::{DateTime, FixedOffset};
use chumsky::prelude::*;
use serde_json::Value;

use super::datetime::DateTimeFormat;
use super::monetary::MonetaryFormat;
use super::number::NumberFormat;
use crate::model::builtin::MONETARY_AMOUNT;
use crate::parsing::TextParser;

/// Types parsed and drafted by a single text program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Boolean,
    Integer,
    Long,
    Double,
    DateTime,
    MonetaryAmount,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "String" => ScalarType::String,
            "Boolean" => ScalarType::Boolean,
            "Integer" => ScalarType::Integer,
            "Long" => ScalarType::Long,
            "Double" => ScalarType::Double,
            "DateTime" => ScalarType::DateTime,
            MONETARY_AMOUNT => ScalarType::MonetaryAmount,
            _ => return None,
        })
    }
}

/// Inputs a scalar parser may depend on besides the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarContext {
    /// Offset assumed when a date-time format has no `Z`.
    pub utc_offset: FixedOffset,
    /// Supplies the year when a format has none.
    pub now: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarProgram {
    String,
    Boolean,
    Number(NumberFormat),
    DateTime(DateTimeFormat),
    Monetary(MonetaryFormat),
}

impl ScalarProgram {
    /// Compile `format` for `ty`; the error is a human readable reason.
    pub fn compile(ty: ScalarType, format: Option<&str>) -> Result<Self, String> {
        match ty {
            ScalarType::String | ScalarType::Boolean if format.is_some() => {
                Err("this type takes no format".to_string())
            }
            ScalarType::String => Ok(ScalarProgram::String),
            ScalarType::Boolean => Ok(ScalarProgram::Boolean),
            ScalarType::Integer | ScalarType::Long => {
                NumberFormat::integer(format).map(ScalarProgram::Number)
            }
            ScalarType::Double => NumberFormat::double(format).map(ScalarProgram::Number),
            ScalarType::DateTime => DateTimeFormat::compile(format).map(ScalarProgram::DateTime),
            ScalarType::MonetaryAmount => {
                MonetaryFormat::compile(format).map(ScalarProgram::Monetary)
            }
        }
    }

    pub(crate) fn parser(&self, context: &ScalarContext) -> TextParser<Value> {
        match self {
            ScalarProgram::String => string_literal().map(Value::String).boxed(),
            ScalarProgram::Boolean => just("true")
                .to(Value::Bool(true))
                .or(just("false").to(Value::Bool(false)))
                .boxed(),
            ScalarProgram::Number(format) => format.parser(),
            ScalarProgram::DateTime(format) => format.parser(context),
            ScalarProgram::Monetary(format) => format.parser(),
        }
    }

    pub fn draft(&self, value: &Value) -> Result<String, String> {
        match self {
            ScalarProgram::String => value
                .as_str()
                .map(quote)
                .ok_or_else(|| format!("{value} is not a string")),
            ScalarProgram::Boolean => value
                .as_bool()
                .map(|b| b.to_string())
                .ok_or_else(|| format!("{value} is not a boolean")),
            ScalarProgram::Number(format) => format.draft(value),
            ScalarProgram::DateTime(format) => format.draft(value),
            ScalarProgram::Monetary(format) => format.draft(value),
        }
    }
}

/// Strings are written double quoted with `\\`, `\"` and `\n` escapes.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn string_literal() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('\\'),
        just('"'),
        just('n').to('\n'),
    )));
    none_of("\\\"\n")
        .or(escape)
        .repeated()
        .delimited_by(just('"'), just('"'))
        .collect::<String>()
}

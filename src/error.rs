//! Error taxonomy.
//!
//! Every stage has its own error type so callers can match on exactly what
//! went wrong; [`Error`] wraps them all for the `?`-heavy facade.

use chumsky::error::{Simple, SimpleReason};
use serde_json::Value;
use thiserror::Error;

/// A location inside a text, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub offset: usize,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
}

impl Position {
    /// Locate a character offset inside `text`.
    pub fn locate(text: &str, offset: usize) -> Self {
        let mut line = 1;
        let mut column = 1;
        for c in text.chars().take(offset) {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        Position {
            offset,
            line,
            column,
        }
    }
}

/// Expected tokens, found token and message of a chumsky error.
pub(crate) fn describe(error: &Simple<char>) -> (Vec<String>, Option<String>, String) {
    let mut expected: Vec<String> = error
        .expected()
        .map(|token| match token {
            Some(c) => format!("{c:?}"),
            None => "end of input".to_string(),
        })
        .collect();
    expected.sort();
    expected.dedup();
    let found = error.found().map(|c| format!("{c:?}"));
    let message = match error.reason() {
        SimpleReason::Custom(message) => message.clone(),
        SimpleReason::Unclosed { delimiter, .. } => format!("unclosed {delimiter:?}"),
        SimpleReason::Unexpected => match &found {
            Some(found) => format!("unexpected {found}"),
            None => "unexpected end of input".to_string(),
        },
    };
    (expected, found, message)
}

/// Malformed template markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub expected: Vec<String>,
    pub message: String,
}

/// A template reference that does not agree with the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("unknown property `{0}`")]
    UnknownProperty(String),
    #[error("property `{0}` is not an array")]
    NotArray(String),
    #[error("property `{0}` is not optional")]
    NotOptional(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("array property `{0}` can only be used in a list or join block")]
    ArrayNotAllowed(String),
    #[error("property `{0}` is not a Boolean")]
    NotBoolean(String),
}

impl BindError {
    /// Name of the offending property or type.
    pub fn name(&self) -> &str {
        match self {
            BindError::UnknownProperty(name)
            | BindError::NotArray(name)
            | BindError::NotOptional(name)
            | BindError::UnknownType(name)
            | BindError::ArrayNotAllowed(name)
            | BindError::NotBoolean(name) => name,
        }
    }
}

/// Formula or condition code that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expression `{code}`: {message}")]
pub struct ExpressionError {
    pub code: String,
    pub message: String,
    /// Character offset inside `code`, when known.
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no parser for type `{0}`")]
    UnknownParser(String),
    #[error("invalid format `{format}` for {element_type}: {message}")]
    InvalidFormat {
        element_type: String,
        format: String,
        message: String,
    },
    #[error("`{0}` has no bound type")]
    Unbound(String),
}

/// Rendered text that the template grammar does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {}:{}: {message}", position.line, position.column)]
pub struct ParseError {
    pub position: Position,
    pub expected: Vec<String>,
    pub found: Option<String>,
    pub message: String,
}

impl ParseError {
    pub(crate) fn from_simple(text: &str, error: &Simple<char>) -> Self {
        let (expected, found, message) = describe(error);
        ParseError {
            position: Position::locate(text, error.span().start),
            expected,
            found,
            message,
        }
    }
}

/// The same variable captured twice with different values.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("`{name}` captured as {first} and later as {second} (at {}:{})", position.line, position.column)]
pub struct ConsistencyError {
    pub name: String,
    pub first: Value,
    pub second: Value,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("missing value for `{0}`")]
    MissingField(String),
    #[error("`{name}` should be {expected}")]
    TypeMismatch { name: String, expected: String },
    #[error("cannot draft `{name}` as {element_type}: {reason}")]
    InvalidValue {
        name: String,
        element_type: String,
        reason: String,
    },
    #[error("evaluating `{name}` failed: {message}")]
    Evaluation { name: String, message: String },
    #[error("list `{0}` is empty and would not parse back")]
    EmptyList(String),
}

impl DraftError {
    pub fn name(&self) -> &str {
        match self {
            DraftError::MissingField(name) | DraftError::EmptyList(name) => name,
            DraftError::TypeMismatch { name, .. }
            | DraftError::InvalidValue { name, .. }
            | DraftError::Evaluation { name, .. } => name,
        }
    }
}

/// Schema files that cannot be loaded.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid JSON model: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML model: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("declaration `{0}` is defined twice")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Bind,
    Expression,
    Registry,
    Parse,
    Consistency,
    Draft,
    Model,
    Config,
}

/// Where an error happened: a named template node or a point in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location<'a> {
    Node(&'a str),
    Text(Position),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::Bind(_) => ErrorKind::Bind,
            Error::Expression(_) => ErrorKind::Expression,
            Error::Registry(_) => ErrorKind::Registry,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Consistency(_) => ErrorKind::Consistency,
            Error::Draft(_) => ErrorKind::Draft,
            Error::Model(_) => ErrorKind::Model,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn location(&self) -> Option<Location<'_>> {
        match self {
            Error::Syntax(e) => Some(Location::Text(Position {
                offset: 0,
                line: e.line,
                column: e.column,
            })),
            Error::Bind(e) => Some(Location::Node(e.name())),
            Error::Registry(RegistryError::UnknownParser(name))
            | Error::Registry(RegistryError::Unbound(name)) => Some(Location::Node(name)),
            Error::Registry(RegistryError::InvalidFormat { element_type, .. }) => {
                Some(Location::Node(element_type))
            }
            Error::Parse(e) => Some(Location::Text(e.position)),
            Error::Consistency(e) => Some(Location::Text(e.position)),
            Error::Draft(e) => Some(Location::Node(e.name())),
            Error::Expression(_) | Error::Model(_) | Error::Config(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_counts_lines_and_columns() {
        let text = "ab\ncd\nef";
        assert_eq!(
            Position::locate(text, 4),
            Position {
                offset: 4,
                line: 2,
                column: 2
            }
        );
        assert_eq!(Position::locate(text, 0).line, 1);
    }

    #[test]
    fn kind_and_location() {
        let err: Error = BindError::NotArray("items".into()).into();
        assert_eq!(err.kind(), ErrorKind::Bind);
        assert_eq!(err.location(), Some(Location::Node("items")));
        assert_eq!(err.to_string(), "property `items` is not an array");
    }
}

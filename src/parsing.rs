//! Parser compiler.
//!
//! A [`TypedTemplate`] is compiled into one chumsky parser that accepts
//! exactly what the draft interpreter and [`crate::doc::markdown`] produce for
//! it, and recovers the data record. Variables delegate to the
//! [`ParsingTable`]; everything else is literal text, alternatives and
//! repetitions.
//!
//! Compiled parsers are `Rc`-based and stay on the thread that compiled them.
//! Compile once per thread and reuse the [`TemplateParser`] for many texts.

pub(crate) mod captures;
pub(crate) mod compiler;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use chumsky::prelude::*;
use serde_json::Value;

use crate::config::{IdentifierSettings, Settings};
use crate::error::{ParseError, Position, Result};
use crate::registry::ParsingTable;
use crate::template::TypedTemplate;
use captures::{Captured, Folder};
use compiler::Compiler;

/// Parser over rendered text.
pub(crate) type TextParser<O> = BoxedParser<'static, char, O, Simple<char>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Supplies the year when a date format has none.
    pub now: DateTime<FixedOffset>,
    /// Offset of dates whose format has no zone.
    pub utc_offset: FixedOffset,
}

impl ParseOptions {
    /// The current time, in the configured default offset.
    pub fn now(settings: &Settings) -> Self {
        let utc_offset = FixedOffset::east_opt(settings.parsing.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        ParseOptions {
            now: Utc::now().with_timezone(&utc_offset),
            utc_offset,
        }
    }

    /// A fixed time; dates without a zone take its offset.
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        ParseOptions {
            now,
            utc_offset: *now.offset(),
        }
    }
}

pub struct TemplateParser {
    parser: TextParser<Captured>,
    identifiers: IdentifierSettings,
}

impl std::fmt::Debug for TemplateParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateParser")
            .field("identifiers", &self.identifiers)
            .finish_non_exhaustive()
    }
}

impl TemplateParser {
    /// Recover the data record that `text` was drafted from.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let captured = self.parser.parse(text).map_err(|errors| {
            errors
                .iter()
                .max_by_key(|error| error.span().start)
                .map(|error| ParseError::from_simple(text, error))
                .unwrap_or_else(|| ParseError {
                    position: Position::default(),
                    expected: Vec::new(),
                    found: None,
                    message: "text does not match the template".to_string(),
                })
        })?;
        let value = Folder::new(text).fold(captured)?;
        tracing::debug!(
            clause_id = ?value.get(&self.identifiers.clause),
            contract_id = ?value.get(&self.identifiers.contract),
            "parsed text"
        );
        Ok(value)
    }
}

pub fn compile(
    template: &TypedTemplate,
    table: &ParsingTable,
    options: ParseOptions,
) -> Result<TemplateParser> {
    tracing::debug!(kind = ?template.kind(), r#type = template.element_type(), "compiling parser");
    let body = Compiler::new(table, options).root(template)?;
    let parser = body
        .then_ignore(filter(|c: &char| c.is_whitespace()).repeated())
        .then_ignore(end())
        .boxed();
    Ok(TemplateParser {
        parser,
        identifiers: table.settings().identifiers.clone(),
    })
}

//! # clausemark
//!
//! Bidirectional clause templates.
//!
//! A template is markdown with `{{...}}` tags. It is read into a tree
//! ([`building`]), bound against a schema ([`binding`]) and its formulas are
//! analyzed ([`formulas`]). The bound template then works both ways:
//!
//! - [`parsing`] compiles it into a parser that turns rendered text back into
//!   the JSON record it was drafted from
//! - [`drafting`] turns a JSON record into a document tree, which
//!   [`doc::markdown`] renders as text the parser accepts
//!
//! Variables are parsed and drafted through the [`registry::ParsingTable`],
//! which compiles one format program per type and format and shares it across
//! threads.
//!
//! ```text
//! let template = Template::from_markup(markup, TemplateKind::Clause, "Sale", &models)?;
//! let table = ParsingTable::new(Arc::new(models));
//! let data = template.parse(&table, text)?;
//! let text = template.draft_markdown(&table, &data, now)?;
//! ```

pub mod binding;
pub mod building;
pub mod config;
pub mod doc;
pub mod drafting;
pub mod error;
pub mod expr;
pub mod formulas;
pub mod model;
pub mod parsing;
pub mod registry;
pub mod template;

pub use crate::config::{Loader, Settings};
pub use error::{Error, ErrorKind, Result};
pub use model::{Declaration, Models, Property, SchemaAdapter};
pub use parsing::{ParseOptions, TemplateParser};
pub use registry::ParsingTable;
pub use template::{Template, TemplateKind, TypedTemplate};

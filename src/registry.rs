//! Parsing-table registry.
//!
//! Maps `(element type, format)` to an [`Entry`]: a compiled scalar format
//! program for built-in types, or a synthesized and bound template fragment
//! for compound schema types. Entries are compiled at most once per table;
//! callers racing on the same key block on the same cell and observe the same
//! `Arc`.

pub mod datetime;
pub mod monetary;
pub mod number;
pub mod scalar;
mod synthesis;

use chumsky::prelude::*;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::binding;
use crate::config::Settings;
use crate::doc;
use crate::drafting::Drafter;
use crate::error::{DraftError, RegistryError, Result};
use crate::model::SchemaAdapter;
use crate::parsing::captures::Captured;
use crate::parsing::compiler::Compiler;
use crate::parsing::TextParser;
use crate::template::Node;

pub use scalar::{ScalarContext, ScalarProgram, ScalarType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub element_type: String,
    pub format: Option<String>,
}

/// A bound `With`-shaped fragment describing a compound type.
#[derive(Debug)]
pub struct CompoundEntry {
    pub element_type: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    Scalar(Arc<ScalarProgram>),
    Compound(Arc<CompoundEntry>),
}

impl Entry {
    /// Whether both entries are the same cached compilation.
    pub fn ptr_eq(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Scalar(a), Entry::Scalar(b)) => Arc::ptr_eq(a, b),
            (Entry::Compound(a), Entry::Compound(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub struct ParsingTable {
    schema: Arc<dyn SchemaAdapter>,
    settings: Settings,
    entries: Mutex<HashMap<EntryKey, Arc<OnceCell<Entry>>>>,
}

impl std::fmt::Debug for ParsingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsingTable")
            .field("settings", &self.settings)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ParsingTable {
    pub fn new(schema: Arc<dyn SchemaAdapter>) -> Self {
        Self::with_settings(schema, Settings::default())
    }

    pub fn with_settings(schema: Arc<dyn SchemaAdapter>, settings: Settings) -> Self {
        ParsingTable {
            schema,
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &dyn SchemaAdapter {
        self.schema.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of keys requested so far, compiled or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EntryKey, Arc<OnceCell<Entry>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up or compile the entry for `element_type` and `format`.
    ///
    /// The map lock is only held to find the key's cell; compilation runs
    /// under the cell, so distinct keys compile concurrently and compound
    /// synthesis may request other entries.
    pub fn entry(&self, element_type: &str, format: Option<&str>) -> Result<Entry, RegistryError> {
        let key = EntryKey {
            element_type: element_type.to_string(),
            format: format.map(str::to_string),
        };
        let cell = self.lock().entry(key.clone()).or_default().clone();
        if let Some(entry) = cell.get() {
            tracing::trace!(element_type, ?format, "parsing table hit");
            return Ok(entry.clone());
        }
        cell.get_or_try_init(|| {
            tracing::debug!(element_type, ?format, "compiling parsing table entry");
            self.compile(&key)
        })
        .cloned()
    }

    fn compile(&self, key: &EntryKey) -> Result<Entry, RegistryError> {
        if let Some(scalar) = ScalarType::from_name(&key.element_type) {
            let program = ScalarProgram::compile(scalar, key.format.as_deref()).map_err(|message| {
                RegistryError::InvalidFormat {
                    element_type: key.element_type.clone(),
                    format: key.format.clone().unwrap_or_default(),
                    message,
                }
            })?;
            return Ok(Entry::Scalar(Arc::new(program)));
        }

        let declaration = self
            .schema
            .declaration(&key.element_type)
            .filter(|declaration| !declaration.is_enum())
            .ok_or_else(|| RegistryError::UnknownParser(key.element_type.clone()))?;
        if let Some(format) = &key.format {
            return Err(RegistryError::InvalidFormat {
                element_type: key.element_type.clone(),
                format: format.clone(),
                message: "compound types take no format".to_string(),
            });
        }
        let fragment = synthesis::synthesize(declaration);
        let children = binding::bind_fragment(fragment, self.schema(), &declaration.name)
            .map_err(|e| RegistryError::UnknownParser(e.name().to_string()))?;
        Ok(Entry::Compound(Arc::new(CompoundEntry {
            element_type: declaration.name.clone(),
            children,
        })))
    }

    /// Values of `element_type` are records: a declared, non-enum type
    /// without a scalar program.
    pub fn is_compound(&self, element_type: &str) -> bool {
        ScalarType::from_name(element_type).is_none()
            && self
                .schema
                .declaration(element_type)
                .is_some_and(|declaration| !declaration.is_enum())
    }

    /// Parser for a value of `element_type` bound to `name`.
    pub(crate) fn parser(
        &self,
        name: &str,
        element_type: &str,
        format: Option<&str>,
        compiler: &mut Compiler<'_>,
    ) -> Result<TextParser<Captured>> {
        match self.entry(element_type, format)? {
            Entry::Scalar(program) => {
                tracing::trace!(name, element_type, "scalar parser");
                Ok(program.parser(compiler.scalar_context()).map(Captured::Value).boxed())
            }
            Entry::Compound(compound) => compiler.compound(&compound),
        }
    }

    /// Draft `value` as `element_type`: scalars become one pre-rendered
    /// fragment, compound values their synthesized fragment.
    pub(crate) fn draft(
        &self,
        name: &str,
        element_type: &str,
        format: Option<&str>,
        value: &Value,
        drafter: &Drafter<'_>,
    ) -> Result<Vec<doc::Node>> {
        match self.entry(element_type, format)? {
            Entry::Scalar(program) => {
                let text = program.draft(value).map_err(|reason| DraftError::InvalidValue {
                    name: name.to_string(),
                    element_type: element_type.to_string(),
                    reason,
                })?;
                Ok(vec![doc::Node::fragment(text)])
            }
            Entry::Compound(compound) => {
                if !value.is_object() {
                    return Err(DraftError::TypeMismatch {
                        name: name.to_string(),
                        expected: format!("a {element_type} object"),
                    }
                    .into());
                }
                drafter.nodes(&compound.children, value)
            }
        }
    }
}

/// Relationship values reference their target as `resource:<Type>#<id>`.
pub fn resource_uri(element_type: &str, id: &str) -> String {
    format!("resource:{element_type}#{id}")
}

/// The identifier part of a relationship value.
pub fn resource_id(value: &str) -> Option<&str> {
    value
        .strip_prefix("resource:")
        .and_then(|rest| rest.split_once('#'))
        .map(|(_, id)| id)
}

/// First alternative that matches wins.
pub(crate) fn alternatives<O: 'static>(
    parsers: impl IntoIterator<Item = TextParser<O>>,
) -> TextParser<O> {
    parsers
        .into_iter()
        .reduce(|first, second| first.or(second).boxed())
        .unwrap_or_else(|| {
            empty()
                .try_map(|(), span| Err(Simple::custom(span, "no alternatives")))
                .boxed()
        })
}

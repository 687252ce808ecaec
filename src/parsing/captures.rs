//! Parse results before they become JSON.
//!
//! Grammars return [`Slot`]s; folding turns them into records once the whole
//! text matched, which is where repeated captures are checked against each
//! other and clause identifiers are generated.

use serde_json::{Map, Value};
use std::ops::Range;
use uuid::Uuid;

use crate::error::{ConsistencyError, Position};

/// Name of the slot a `{{this}}` variable captures into.
pub(crate) const THIS: &str = "this";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Captured {
    Value(Value),
    Record {
        class: String,
        /// Field receiving a fresh identifier.
        identifier: Option<String>,
        slots: Vec<Slot>,
    },
    /// The value captured by `this` among the slots.
    Unwrapped(Vec<Slot>),
    Array(Vec<Captured>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    pub name: String,
    pub value: Captured,
    pub span: Range<usize>,
}

impl Slot {
    pub fn new(name: impl Into<String>, value: Captured, span: Range<usize>) -> Self {
        Slot {
            name: name.into(),
            value,
            span,
        }
    }
}

pub(crate) struct Folder<'t> {
    text: &'t str,
}

impl<'t> Folder<'t> {
    pub fn new(text: &'t str) -> Self {
        Folder { text }
    }

    pub fn fold(&self, captured: Captured) -> Result<Value, ConsistencyError> {
        match captured {
            Captured::Value(value) => Ok(value),
            Captured::Array(items) => items
                .into_iter()
                .map(|item| self.fold(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Captured::Unwrapped(slots) => {
                let mut found: Option<Value> = None;
                for slot in slots.into_iter().filter(|slot| slot.name == THIS) {
                    let span = slot.span.clone();
                    let value = self.fold(slot.value)?;
                    match &found {
                        Some(first) if *first != value => {
                            return Err(self.inconsistent(THIS, first.clone(), value, &span))
                        }
                        Some(_) => {}
                        None => found = Some(value),
                    }
                }
                Ok(found.unwrap_or(Value::Null))
            }
            Captured::Record {
                class,
                identifier,
                slots,
            } => {
                let mut record = Map::new();
                record.insert("$class".to_string(), Value::String(class));
                for slot in slots.into_iter().filter(|slot| slot.name != THIS) {
                    self.merge(&mut record, slot)?;
                }
                if let Some(field) = identifier {
                    record
                        .entry(field)
                        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
                }
                Ok(Value::Object(record))
            }
        }
    }

    fn merge(&self, record: &mut Map<String, Value>, slot: Slot) -> Result<(), ConsistencyError> {
        let value = self.fold(slot.value)?;
        match record.get(&slot.name) {
            Some(first) if *first != value => {
                Err(self.inconsistent(&slot.name, first.clone(), value, &slot.span))
            }
            Some(_) => Ok(()),
            None => {
                record.insert(slot.name, value);
                Ok(())
            }
        }
    }

    fn inconsistent(
        &self,
        name: &str,
        first: Value,
        second: Value,
        span: &Range<usize>,
    ) -> ConsistencyError {
        ConsistencyError {
            name: name.to_string(),
            first,
            second,
            position: Position::locate(self.text, span.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(name: &str, value: Value, start: usize) -> Slot {
        Slot::new(name, Captured::Value(value), start..start + 1)
    }

    #[test]
    fn records_get_class_and_identifier() {
        let folded = Folder::new("")
            .fold(Captured::Record {
                class: "Sale".into(),
                identifier: Some("clauseId".into()),
                slots: vec![value("seller", json!("A"), 0)],
            })
            .unwrap();
        assert_eq!(folded["$class"], "Sale");
        assert_eq!(folded["seller"], "A");
        assert!(Uuid::parse_str(folded["clauseId"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn repeated_captures_must_agree() {
        let text = "A then\nB";
        let record = |second: &str| Captured::Record {
            class: "Sale".into(),
            identifier: None,
            slots: vec![value("seller", json!("A"), 0), value("seller", json!(second), 7)],
        };
        assert!(Folder::new(text).fold(record("A")).is_ok());
        let err = Folder::new(text).fold(record("B")).unwrap_err();
        assert_eq!(err.name, "seller");
        assert_eq!((err.position.line, err.position.column), (2, 1));
    }

    #[test]
    fn unwrapped_takes_this() {
        let folded = Folder::new("")
            .fold(Captured::Array(vec![
                Captured::Unwrapped(vec![value(THIS, json!(1), 0)]),
                Captured::Unwrapped(vec![value("late", json!(true), 0), value(THIS, json!(2), 0)]),
            ]))
            .unwrap();
        assert_eq!(folded, json!([1, 2]));
    }
}

//! Schema model.
//!
//! Templates are checked against declarations reached through the
//! [`SchemaAdapter`] trait. [`Models`] is the in-memory implementation, loaded
//! from JSON or YAML and seeded with the built-in declarations from
//! [`builtin`].

pub mod builtin;
pub mod instance;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ModelError;

/// Primitive type names known to every schema.
pub const PRIMITIVES: &[&str] = &["String", "Boolean", "Integer", "Long", "Double", "DateTime"];

pub fn is_primitive_type(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl Decorator {
    /// First argument of the first `@Format` in `decorators`.
    pub fn format(decorators: &[Decorator]) -> Option<&str> {
        decorators
            .iter()
            .find(|d| d.name == "Format")
            .and_then(|d| d.arguments.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub relationship: bool,
    #[serde(default)]
    pub decorators: Vec<Decorator>,
}

impl Property {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            type_name: type_name.into(),
            array: false,
            optional: false,
            relationship: false,
            decorators: Vec::new(),
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn relationship(mut self) -> Self {
        self.relationship = true;
        self
    }

    pub fn decorated(mut self, name: impl Into<String>, arguments: &[&str]) -> Self {
        self.decorators.push(Decorator {
            name: name.into(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn element_type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_primitive(&self) -> bool {
        is_primitive_type(&self.type_name)
    }

    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Concept,
    Asset,
    Participant,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// Identifying field for assets and participants.
    #[serde(default)]
    pub identified_by: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, rename = "values")]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub decorators: Vec<Decorator>,
}

impl Declaration {
    pub fn concept(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Declaration {
            name: name.into(),
            kind: DeclarationKind::Concept,
            identified_by: None,
            properties,
            enum_values: Vec::new(),
            decorators: Vec::new(),
        }
    }

    pub fn asset(
        name: impl Into<String>,
        identified_by: impl Into<String>,
        properties: Vec<Property>,
    ) -> Self {
        Declaration {
            name: name.into(),
            kind: DeclarationKind::Asset,
            identified_by: Some(identified_by.into()),
            properties,
            enum_values: Vec::new(),
            decorators: Vec::new(),
        }
    }

    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        Declaration {
            name: name.into(),
            kind: DeclarationKind::Enum,
            identified_by: None,
            properties: Vec::new(),
            enum_values: values.iter().map(|v| v.to_string()).collect(),
            decorators: Vec::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn decorators(&self) -> &[Decorator] {
        &self.decorators
    }

    pub fn is_enum(&self) -> bool {
        self.kind == DeclarationKind::Enum
    }
}

/// Read-only access to a schema.
pub trait SchemaAdapter: Send + Sync {
    fn declaration(&self, name: &str) -> Option<&Declaration>;

    fn is_enum(&self, name: &str) -> bool {
        self.declaration(name).is_some_and(Declaration::is_enum)
    }

    fn is_primitive(&self, name: &str) -> bool {
        is_primitive_type(name)
    }
}

/// In-memory schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Models {
    declarations: BTreeMap<String, Declaration>,
}

impl Default for Models {
    fn default() -> Self {
        Self::new()
    }
}

impl Models {
    /// A schema holding only the built-in declarations.
    pub fn new() -> Self {
        let declarations = builtin::declarations()
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Models { declarations }
    }

    /// Add user declarations on top of the built-ins. A user declaration may
    /// replace a built-in one but not another user declaration.
    pub fn with_declarations(
        declarations: impl IntoIterator<Item = Declaration>,
    ) -> Result<Self, ModelError> {
        let mut models = Models::new();
        let mut seen = Vec::new();
        for declaration in declarations {
            if seen.contains(&declaration.name) {
                return Err(ModelError::Duplicate(declaration.name));
            }
            seen.push(declaration.name.clone());
            models.insert(declaration);
        }
        Ok(models)
    }

    /// Expects a JSON array of declarations.
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let declarations: Vec<Declaration> = serde_json::from_str(text)?;
        Self::with_declarations(declarations)
    }

    /// Expects a YAML sequence of declarations.
    pub fn from_yaml(text: &str) -> Result<Self, ModelError> {
        let declarations: Vec<Declaration> = serde_yaml::from_str(text)?;
        Self::with_declarations(declarations)
    }

    pub fn insert(&mut self, declaration: Declaration) {
        self.declarations.insert(declaration.name.clone(), declaration);
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }
}

impl SchemaAdapter for Models {
    fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_models() {
        let models = Models::from_yaml(
            r#"
- name: Sale
  kind: concept
  properties:
    - { name: seller, type: String }
    - { name: amount, type: Double, decorators: [{ name: Format, arguments: ["0,0.00"] }] }
    - { name: notes, type: String, optional: true }
- name: Color
  kind: enum
  values: [RED, GREEN]
"#,
        )
        .unwrap();
        let sale = models.declaration("Sale").unwrap();
        assert_eq!(
            Decorator::format(&sale.property("amount").unwrap().decorators),
            Some("0,0.00")
        );
        assert!(sale.property("notes").unwrap().is_optional());
        assert!(models.is_enum("Color"));
        assert!(models.is_enum("CurrencyCode"));
        assert!(models.declaration("MonetaryAmount").is_some());
    }

    #[test]
    fn duplicate_user_declarations_are_rejected() {
        let result = Models::from_json(
            r#"[{"name": "A", "kind": "concept"}, {"name": "A", "kind": "asset"}]"#,
        );
        assert!(matches!(result, Err(ModelError::Duplicate(name)) if name == "A"));
    }

    #[test]
    fn primitives_are_not_declarations() {
        let models = Models::new();
        assert!(models.is_primitive("DateTime"));
        assert!(models.declaration("DateTime").is_none());
    }
}

//! Draft interpreter.
//!
//! Walks a typed template against a JSON data object and produces a
//! [`doc::Node`] document. The output mirrors what the parser compiler
//! accepts: variables become pre-rendered fragments, formulas formula results,
//! dynamic lists real list elements and, inside contracts, nested clauses
//! delimited clause regions.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use uuid::Uuid;

use crate::doc::{self, Element};
use crate::error::{DraftError, RegistryError, Result};
use crate::expr::{self, Scope};
use crate::model::instance;
use crate::registry::{self, ParsingTable};
use crate::registry::scalar::quote;
use crate::template::{
    ClauseBlock, Conditional, EnumVariable, Formula, JoinBlock, ListBlock, Node, OptionalBlock,
    TypedTemplate, Variable, WithBlock,
};

pub fn draft(
    template: &TypedTemplate,
    table: &ParsingTable,
    data: &Value,
    now: DateTime<FixedOffset>,
) -> Result<doc::Node> {
    if !data.is_object() {
        return Err(DraftError::TypeMismatch {
            name: template.element_type().to_string(),
            expected: "an object".to_string(),
        }
        .into());
    }
    let identifiers = &table.settings().identifiers;
    let (children, in_contract, identifier) = match template.root() {
        Node::Clause(clause) => (&clause.children, false, &identifiers.clause),
        Node::Contract(contract) => (&contract.children, true, &identifiers.contract),
        other => {
            return Err(RegistryError::Unbound(other.name().unwrap_or("root").to_string()).into())
        }
    };
    tracing::debug!(kind = ?template.kind(), r#type = template.element_type(), "drafting");
    let drafter = Drafter {
        table,
        root: data,
        now,
        in_contract,
    };
    let children = drafter.nodes(children, data)?;
    Ok(doc::Node(Element::Document {
        data: Some(record(data, Some(template.element_type()), identifier)),
        children,
    }))
}

pub(crate) struct Drafter<'t> {
    table: &'t ParsingTable,
    /// Formulas see the top-level data whatever the current scope.
    root: &'t Value,
    now: DateTime<FixedOffset>,
    in_contract: bool,
}

/// The scoped value a node refers to; `this` is the scope itself.
fn field<'v>(scope: &'v Value, name: &str) -> Option<&'v Value> {
    let value = if name == "this" {
        Some(scope)
    } else {
        scope.get(name)
    };
    value.filter(|value| !value.is_null())
}

fn required<'v>(scope: &'v Value, name: &str) -> Result<&'v Value> {
    field(scope, name).ok_or_else(|| DraftError::MissingField(name.to_string()).into())
}

fn array<'v>(scope: &'v Value, name: &str) -> Result<&'v Vec<Value>> {
    required(scope, name)?.as_array().ok_or_else(|| {
        DraftError::TypeMismatch {
            name: name.to_string(),
            expected: "an array".to_string(),
        }
        .into()
    })
}

impl Drafter<'_> {
    pub(crate) fn nodes(&self, nodes: &[Node], scope: &Value) -> Result<Vec<doc::Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            out.extend(self.node(node, scope)?);
        }
        Ok(out)
    }

    fn node(&self, node: &Node, scope: &Value) -> Result<Vec<doc::Node>> {
        match node {
            Node::Variable(variable) => self.variable(variable, scope),
            Node::EnumVariable(variable) => enum_variable(variable, scope),
            Node::Formula(formula) => Ok(vec![self.formula(formula)?]),
            Node::Conditional(conditional) => self.conditional(conditional, scope),
            Node::Optional(optional) => self.optional(optional, scope),
            Node::With(with) => self.with(with, scope),
            Node::List(list) => Ok(vec![self.list(list, scope)?]),
            Node::Join(join) => self.join(join, scope),
            Node::Clause(clause) => self.clause(clause, scope),
            Node::Contract(contract) => self.nodes(&contract.children, scope),
            Node::Markup(element) => {
                let element = element.try_map_ref(|children| self.nodes(children, scope))?;
                Ok(vec![doc::Node(element)])
            }
        }
    }

    fn variable(&self, variable: &Variable, scope: &Value) -> Result<Vec<doc::Node>> {
        let element_type = variable
            .element_type
            .as_deref()
            .ok_or_else(|| RegistryError::Unbound(variable.name.clone()))?;
        let value = required(scope, &variable.name)?;
        if variable.identified_by.is_some() {
            let id = value
                .as_str()
                .and_then(registry::resource_id)
                .ok_or_else(|| DraftError::InvalidValue {
                    name: variable.name.clone(),
                    element_type: element_type.to_string(),
                    reason: format!("{value} is not a resource reference"),
                })?;
            return Ok(vec![doc::Node::fragment(quote(id))]);
        }
        self.table.draft(
            &variable.name,
            element_type,
            variable.format.as_deref(),
            value,
            self,
        )
    }

    fn formula(&self, formula: &Formula) -> Result<doc::Node> {
        let expression = expr::parse(&formula.code)?;
        let value = expr::evaluate(&expression, &Scope::new(self.root, &self.now)).map_err(|e| {
            DraftError::Evaluation {
                name: formula.name.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(doc::Node(Element::Formula {
            name: formula.name.clone(),
            value: expr::display(&value),
        }))
    }

    fn condition(&self, name: &str, code: &str, scope: &Value) -> Result<bool> {
        let expression = expr::parse(code)?;
        let value = expr::evaluate(&expression, &Scope::new(scope, &self.now)).map_err(|e| {
            DraftError::Evaluation {
                name: name.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(expr::truthy(&value))
    }

    fn conditional(&self, conditional: &Conditional, scope: &Value) -> Result<Vec<doc::Node>> {
        let live = match &conditional.condition {
            Some(code) => self.condition(&conditional.name, code, scope)?,
            None => required(scope, &conditional.name)?
                .as_bool()
                .ok_or_else(|| DraftError::TypeMismatch {
                    name: conditional.name.clone(),
                    expected: "a boolean".to_string(),
                })?,
        };
        let (kept, dropped) = if live {
            ((&conditional.when_true, scope), (&conditional.when_false, &Value::Null))
        } else {
            ((&conditional.when_false, &Value::Null), (&conditional.when_true, scope))
        };
        // The dead branch is visited too, but the data need not satisfy it.
        if let Err(error) = self.nodes(dropped.0, dropped.1) {
            tracing::trace!(name = %conditional.name, %error, "dead branch did not draft");
        }
        self.nodes(kept.0, kept.1)
    }

    fn optional(&self, optional: &OptionalBlock, scope: &Value) -> Result<Vec<doc::Node>> {
        if let Some(value) = field(scope, &optional.name) {
            return self.nodes(&optional.when_some, value);
        }
        if let Some(element_type) = &optional.element_type {
            let placeholder = instance::placeholder(self.table.schema(), element_type);
            if let Err(error) = self.nodes(&optional.when_some, &placeholder) {
                tracing::trace!(name = %optional.name, %error, "placeholder branch did not draft");
            }
        }
        self.nodes(&optional.when_none, &Value::Null)
    }

    fn with(&self, with: &WithBlock, scope: &Value) -> Result<Vec<doc::Node>> {
        let value = required(scope, &with.name)?;
        if !value.is_object() {
            return Err(DraftError::TypeMismatch {
                name: with.name.clone(),
                expected: "an object".to_string(),
            }
            .into());
        }
        self.nodes(&with.children, value)
    }

    fn list(&self, list: &ListBlock, scope: &Value) -> Result<doc::Node> {
        let elements = array(scope, &list.name)?;
        if elements.is_empty() {
            return Err(DraftError::EmptyList(list.name.clone()).into());
        }
        let items = elements
            .iter()
            .map(|element| {
                let children = self.nodes(&list.children, element)?;
                Ok(doc::Node(Element::Item { children }))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(doc::Node(Element::List {
            list_kind: list.kind,
            start: 1,
            children: items,
        }))
    }

    fn join(&self, join: &JoinBlock, scope: &Value) -> Result<Vec<doc::Node>> {
        let elements = array(scope, &join.name)?;
        let mut out = Vec::new();
        for (index, element) in elements.iter().enumerate() {
            if index > 0 && !join.separator.is_empty() {
                out.push(doc::Node::text(join.separator.clone()));
            }
            out.extend(self.nodes(&join.children, element)?);
        }
        Ok(out)
    }

    fn clause(&self, clause: &ClauseBlock, scope: &Value) -> Result<Vec<doc::Node>> {
        let value = required(scope, &clause.name)?;
        if !value.is_object() {
            return Err(DraftError::TypeMismatch {
                name: clause.name.clone(),
                expected: "an object".to_string(),
            }
            .into());
        }
        if let Some(code) = &clause.condition {
            if !self.condition(&clause.name, code, value)? {
                tracing::trace!(name = %clause.name, "clause condition is false");
                return Ok(Vec::new());
            }
        }
        let children = self.nodes(&clause.children, value)?;
        if !self.in_contract {
            return Ok(children);
        }
        Ok(vec![doc::Node(Element::Clause {
            name: clause.name.clone(),
            src: clause.src.clone(),
            data: Some(record(
                value,
                clause.element_type.as_deref(),
                &self.table.settings().identifiers.clause,
            )),
            children,
        })])
    }
}

/// `value` with its class and a fresh identifier under `identifier`.
fn record(value: &Value, class: Option<&str>, identifier: &str) -> Value {
    let mut record = value.clone();
    if let Value::Object(fields) = &mut record {
        if let Some(class) = class {
            fields
                .entry("$class")
                .or_insert_with(|| Value::String(class.to_string()));
        }
        fields.insert(
            identifier.to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );
    }
    record
}

fn enum_variable(variable: &EnumVariable, scope: &Value) -> Result<Vec<doc::Node>> {
    let value = required(scope, &variable.name)?;
    let text = value
        .as_str()
        .filter(|text| variable.enum_values.iter().any(|allowed| allowed == text))
        .ok_or_else(|| DraftError::InvalidValue {
            name: variable.name.clone(),
            element_type: variable.element_type.clone(),
            reason: format!("{value} is not one of {}", variable.enum_values.join(", ")),
        })?;
    Ok(vec![doc::Node::fragment(text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::building::build;
    use crate::doc::markdown::render;
    use crate::error::Error;
    use crate::model::{Declaration, Models, Property};
    use crate::template::TemplateKind;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn models() -> Models {
        Models::with_declarations([
            Declaration::concept(
                "Loan",
                vec![
                    Property::new("borrower", "String"),
                    Property::new("amount", "Double").decorated("Format", &["0,0.00"]),
                    Property::new("secured", "Boolean"),
                    Property::new("collateral", "String").optional(),
                    Property::new("payments", "Integer").array(),
                    Property::new("lender", "Bank").relationship(),
                    Property::new("grade", "Grade"),
                ],
            ),
            Declaration::asset("Bank", "bankId", vec![Property::new("bankId", "String")]),
            Declaration::enumeration("Grade", &["A", "B"]),
        ])
        .unwrap()
    }

    fn data() -> Value {
        json!({
            "$class": "Loan",
            "borrower": "Ann",
            "amount": 1500.0,
            "secured": false,
            "payments": [100, 200],
            "lender": "resource:Bank#acme",
            "grade": "B"
        })
    }

    fn draft_text(markup: &str, data: &Value) -> Result<String> {
        let models = models();
        let table = ParsingTable::new(Arc::new(models.clone()));
        let typed = bind(build(markup).unwrap(), &models, TemplateKind::Clause, "Loan").unwrap();
        let typed = crate::formulas::analyze(typed).unwrap();
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        Ok(render(&[draft(&typed, &table, data, now)?]))
    }

    #[test]
    fn variables_use_formats() {
        assert_eq!(
            draft_text("{{borrower}} owes {{amount}} to {{lender}}, grade {{grade}}", &data())
                .unwrap(),
            "\"Ann\" owes 1,500.00 to \"acme\", grade B"
        );
    }

    #[test]
    fn conditionals_keep_the_live_branch() {
        let markup = "{{#if secured}}Secured{{else}}Unsecured{{/if}} loan";
        assert_eq!(draft_text(markup, &data()).unwrap(), "Unsecured loan");
        let mut secured = data();
        secured["secured"] = json!(true);
        assert_eq!(draft_text(markup, &secured).unwrap(), "Secured loan");
    }

    #[test]
    fn absent_optional_drafts_the_none_branch() {
        let markup = "{{#optional collateral}}backed by {{this}}{{else}}unbacked{{/optional}}";
        assert_eq!(draft_text(markup, &data()).unwrap(), "unbacked");
        let mut backed = data();
        backed["collateral"] = json!("a house");
        assert_eq!(draft_text(markup, &backed).unwrap(), "backed by \"a house\"");
    }

    #[test]
    fn joins_and_formulas() {
        assert_eq!(
            draft_text(
                "{{#join payments separator=\" + \"}}{{this}}{{/join}} = {{% sum(payments) %}}",
                &data()
            )
            .unwrap(),
            "100 + 200 = {{% 300 %}}"
        );
    }

    #[test]
    fn lists_become_list_elements() {
        assert_eq!(
            draft_text("{{#ulist payments}}\n- {{this}}\n{{/ulist}}", &data()).unwrap(),
            "- 100\n- 200"
        );
        let mut empty = data();
        empty["payments"] = json!([]);
        let err = draft_text("{{#ulist payments}}\n- {{this}}\n{{/ulist}}", &empty).unwrap_err();
        assert!(matches!(err, Error::Draft(DraftError::EmptyList(_))));
    }

    #[test]
    fn missing_and_invalid_values() {
        let mut missing = data();
        missing.as_object_mut().unwrap().remove("borrower");
        assert!(matches!(
            draft_text("{{borrower}}", &missing).unwrap_err(),
            Error::Draft(DraftError::MissingField(name)) if name == "borrower"
        ));
        let mut invalid = data();
        invalid["grade"] = json!("Z");
        assert!(matches!(
            draft_text("{{grade}}", &invalid).unwrap_err(),
            Error::Draft(DraftError::InvalidValue { .. })
        ));
    }

    #[test]
    fn formula_errors_name_the_formula() {
        let err = draft_text("{{% amount / 0 %}}", &data()).unwrap_err();
        assert!(matches!(
            err,
            Error::Draft(DraftError::Evaluation { name, .. }) if name == "formula_1"
        ));
    }

    #[rstest]
    #[case("Loan{{#if secured}} against {{collateral}}{{/if}}.")]
    #[case("Loan{{#if condition=\"collateral != null\"}} against {{collateral}}{{/if}}.")]
    fn dead_branches_need_no_data(#[case] markup: &str) {
        assert_eq!(draft_text(markup, &data()).unwrap(), "Loan.");
        let mut secured = data();
        secured["secured"] = json!(true);
        secured["collateral"] = json!("a house");
        assert_eq!(draft_text(markup, &secured).unwrap(), "Loan against \"a house\".");
    }

    #[test]
    fn live_branch_errors_are_reported() {
        let mut secured = data();
        secured["secured"] = json!(true);
        assert!(matches!(
            draft_text("{{#if secured}}{{collateral}}{{/if}}", &secured).unwrap_err(),
            Error::Draft(DraftError::MissingField(name)) if name == "collateral"
        ));
    }

    #[test]
    fn root_document_carries_its_record() {
        let models = models();
        let table = ParsingTable::new(Arc::new(models.clone()));
        let typed = bind(build("{{borrower}}").unwrap(), &models, TemplateKind::Contract, "Loan")
            .unwrap();
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let mut input = data();
        input.as_object_mut().unwrap().remove("$class");
        let document = draft(&typed, &table, &input, now).unwrap();
        let record = document.data().unwrap();
        assert_eq!(record["$class"], "Loan");
        assert_eq!(record["borrower"], "Ann");
        assert!(Uuid::parse_str(record["contractId"].as_str().unwrap()).is_ok());
        assert!(record.get("clauseId").is_none());
    }
}

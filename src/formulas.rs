//! Formula analyzer.
//!
//! Parses every formula of a bound template once, records its free
//! identifiers as dependencies and checks that conditional and clause guard
//! expressions are well formed.

use serde::Serialize;

use crate::error::ExpressionError;
use crate::expr;
use crate::template::{ClauseBlock, Conditional, Node, TypedTemplate};

/// A formula as written in the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaSource {
    pub name: String,
    pub code: String,
}

pub fn analyze(mut template: TypedTemplate) -> Result<TypedTemplate, ExpressionError> {
    analyze_node(template.root_mut())?;
    Ok(template)
}

fn analyze_node(node: &mut Node) -> Result<(), ExpressionError> {
    match node {
        Node::Formula(formula) => {
            formula.dependencies = expr::parse(&formula.code)?.free_identifiers();
            tracing::trace!(name = %formula.name, dependencies = ?formula.dependencies, "analyzed formula");
        }
        Node::Conditional(Conditional {
            condition: Some(code),
            ..
        })
        | Node::Clause(ClauseBlock {
            condition: Some(code),
            ..
        }) => {
            expr::parse(code)?;
        }
        _ => {}
    }
    for children in node.child_lists_mut() {
        for child in children.iter_mut() {
            analyze_node(child)?;
        }
    }
    Ok(())
}

/// Every formula in document order.
pub fn collect(template: &TypedTemplate) -> Vec<FormulaSource> {
    let mut formulas = Vec::new();
    collect_node(template.root(), &mut formulas);
    formulas
}

fn collect_node(node: &Node, formulas: &mut Vec<FormulaSource>) {
    if let Node::Formula(formula) = node {
        formulas.push(FormulaSource {
            name: formula.name.clone(),
            code: formula.code.clone(),
        });
    }
    for children in node.child_lists() {
        for child in children {
            collect_node(child, formulas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::building::build;
    use crate::model::{Declaration, Models, Property};
    use crate::template::TemplateKind;

    fn typed(markup: &str) -> TypedTemplate {
        let models = Models::with_declarations([Declaration::concept(
            "Loan",
            vec![
                Property::new("principal", "Double"),
                Property::new("rate", "Double"),
            ],
        )])
        .unwrap();
        bind(build(markup).unwrap(), &models, TemplateKind::Clause, "Loan").unwrap()
    }

    #[test]
    fn fills_dependencies() {
        let template = analyze(typed("Interest: {{% principal * rate / 100 %}}")).unwrap();
        let mut found = Vec::new();
        fn walk(node: &Node, found: &mut Vec<Vec<String>>) {
            if let Node::Formula(f) = node {
                found.push(f.dependencies.clone());
            }
            node.child_lists()
                .into_iter()
                .flatten()
                .for_each(|child| walk(child, found));
        }
        walk(template.root(), &mut found);
        assert_eq!(found, vec![vec!["principal".to_string(), "rate".to_string()]]);
    }

    #[test]
    fn collects_in_document_order() {
        let template = analyze(typed("{{% 1 %}}\n\n{{% principal %}}")).unwrap();
        assert_eq!(
            collect(&template),
            vec![
                FormulaSource {
                    name: "formula_1".into(),
                    code: "1".into()
                },
                FormulaSource {
                    name: "formula_2".into(),
                    code: "principal".into()
                },
            ]
        );
    }

    #[test]
    fn malformed_formula() {
        let err = analyze(typed("{{% principal * %}}")).unwrap_err();
        assert_eq!(err.code, "principal *");
    }

    #[test]
    fn malformed_condition() {
        let err = analyze(typed("{{#if condition=\"rate >\"}}high{{/if}}")).unwrap_err();
        assert_eq!(err.code, "rate >");
    }
}

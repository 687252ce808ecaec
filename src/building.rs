//! Template tree builder.
//!
//! Markup is read in two layers. [`blocks`] classifies lines into headings,
//! quotes, lists, fences, clause and list regions and paragraphs; each
//! paragraph is then handed to the chumsky grammar in [`inline`].
//!
//! Formulas and conditionals guarded by an expression have no property name
//! of their own; after reading they are named `formula_<n>` and
//! `condition_<n>` in document order.

mod blocks;
mod inline;

use crate::error::SyntaxError;
use crate::template::Node;

pub(crate) const DEFAULT_SEPARATOR: &str = ", ";

/// Read template markup into an untyped node list.
pub fn build(markup: &str) -> Result<Vec<Node>, SyntaxError> {
    let mut nodes = blocks::read(markup)?;
    let mut names = Names::default();
    for node in &mut nodes {
        names.assign(node);
    }
    tracing::debug!(blocks = nodes.len(), "read template markup");
    Ok(nodes)
}

#[derive(Default)]
struct Names {
    formulas: usize,
    conditions: usize,
}

impl Names {
    fn assign(&mut self, node: &mut Node) {
        match node {
            Node::Formula(formula) if formula.name.is_empty() => {
                self.formulas += 1;
                formula.name = format!("formula_{}", self.formulas);
            }
            Node::Conditional(conditional)
                if conditional.name.is_empty() && conditional.condition.is_some() =>
            {
                self.conditions += 1;
                conditional.name = format!("condition_{}", self.conditions);
            }
            _ => {}
        }
        for children in node.child_lists_mut() {
            for child in children.iter_mut() {
                self.assign(child);
            }
        }
    }
}

//! Generic template fragments for compound types.
//!
//! `Address { street, zip?, lines[] }` is written as
//! `street "Main St", zip 12345, lines ["a", "b"]`: one `name value` entry per
//! property, entries separated by `, `, arrays bracketed and joined, optional
//! entries (including their leading separator) wrapped in an optional block.

use crate::building::DEFAULT_SEPARATOR;
use crate::model::Declaration;
use crate::template::{JoinBlock, Node, OptionalBlock, Variable};

pub(crate) fn synthesize(declaration: &Declaration) -> Vec<Node> {
    let mut nodes = Vec::new();
    let properties = declaration
        .properties
        .iter()
        .filter(|property| !property.name.starts_with('$'));
    for (index, property) in properties.enumerate() {
        let lead = if index == 0 {
            format!("{} ", property.name)
        } else {
            format!("{DEFAULT_SEPARATOR}{} ", property.name)
        };
        // Inside an optional block the cursor is the property itself.
        let target = if property.optional {
            "this"
        } else {
            property.name.as_str()
        };
        let mut entry = vec![Node::text(lead)];
        if property.array {
            entry.push(Node::text("["));
            entry.push(Node::Join(JoinBlock {
                name: target.to_string(),
                element_type: None,
                separator: DEFAULT_SEPARATOR.to_string(),
                children: vec![Node::Variable(Variable::new("this"))],
            }));
            entry.push(Node::text("]"));
        } else {
            entry.push(Node::Variable(Variable::new(target)));
        }

        if property.optional {
            nodes.push(Node::Optional(OptionalBlock {
                name: property.name.clone(),
                element_type: None,
                when_some: entry,
                when_none: Vec::new(),
            }));
        } else {
            nodes.extend(entry);
        }
    }
    tracing::trace!(r#type = %declaration.name, nodes = nodes.len(), "synthesized fragment");
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind_fragment;
    use crate::model::{Models, Property};

    #[test]
    fn one_entry_per_property() {
        let declaration = Declaration::concept(
            "Address",
            vec![
                Property::new("street", "String"),
                Property::new("lines", "String").array(),
                Property::new("zip", "Integer").optional(),
            ],
        );
        let nodes = synthesize(&declaration);
        assert_eq!(nodes.len(), 7);
        assert_eq!(nodes[0], Node::text("street "));
        assert_eq!(nodes[2], Node::text(", lines "));
        let Node::Optional(optional) = &nodes[6] else {
            panic!("expected an optional block");
        };
        assert_eq!(optional.when_some[0], Node::text(", zip "));

        let models = Models::with_declarations([declaration.clone()]).unwrap();
        let bound = bind_fragment(nodes, &models, "Address").unwrap();
        assert_eq!(bound.len(), 7);
    }

    #[test]
    fn skips_system_fields() {
        let declaration = Declaration::asset(
            "Party",
            "partyId",
            vec![
                Property::new("$identifier", "String"),
                Property::new("partyId", "String"),
            ],
        );
        assert_eq!(synthesize(&declaration)[0], Node::text("partyId "));
    }
}

//! Generic document tree.
//!
//! [`Element`] is generic over its child type so templates can embed plain
//! markup (`Element<template::Node>`) while drafted output uses [`Node`]. The
//! tree serializes as JSON objects tagged with `kind`.

pub mod markdown;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Bullet,
    Ordered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Element<N> {
    /// Drafted documents carry the record of their root clause or contract.
    Document {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        children: Vec<N>,
    },
    Paragraph {
        children: Vec<N>,
    },
    Heading {
        level: u8,
        children: Vec<N>,
    },
    BlockQuote {
        children: Vec<N>,
    },
    List {
        list_kind: ListKind,
        start: u32,
        children: Vec<N>,
    },
    Item {
        children: Vec<N>,
    },
    CodeBlock {
        info: Option<String>,
        text: String,
    },
    ThematicBreak,
    /// A delimited clause region; drafted clauses carry their record in `data`.
    Clause {
        name: String,
        src: Option<String>,
        data: Option<Value>,
        children: Vec<N>,
    },
    Text {
        text: String,
    },
    Emph {
        children: Vec<N>,
    },
    Strong {
        children: Vec<N>,
    },
    Code {
        text: String,
    },
    Softbreak,
    Linebreak,
    /// Already rendered text, emitted without escaping.
    Fragment {
        text: String,
    },
    /// The evaluated result of a formula.
    Formula {
        name: String,
        value: String,
    },
}

impl<N> Element<N> {
    /// Discriminator, matching the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Document { .. } => "document",
            Element::Paragraph { .. } => "paragraph",
            Element::Heading { .. } => "heading",
            Element::BlockQuote { .. } => "block_quote",
            Element::List { .. } => "list",
            Element::Item { .. } => "item",
            Element::CodeBlock { .. } => "code_block",
            Element::ThematicBreak => "thematic_break",
            Element::Clause { .. } => "clause",
            Element::Text { .. } => "text",
            Element::Emph { .. } => "emph",
            Element::Strong { .. } => "strong",
            Element::Code { .. } => "code",
            Element::Softbreak => "softbreak",
            Element::Linebreak => "linebreak",
            Element::Fragment { .. } => "fragment",
            Element::Formula { .. } => "formula",
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Element::Document { .. }
                | Element::Paragraph { .. }
                | Element::Heading { .. }
                | Element::BlockQuote { .. }
                | Element::List { .. }
                | Element::Item { .. }
                | Element::CodeBlock { .. }
                | Element::ThematicBreak
                | Element::Clause { .. }
        )
    }

    pub fn children(&self) -> &[N] {
        match self {
            Element::Document { children, .. }
            | Element::Paragraph { children }
            | Element::Heading { children, .. }
            | Element::BlockQuote { children }
            | Element::List { children, .. }
            | Element::Item { children }
            | Element::Clause { children, .. }
            | Element::Emph { children }
            | Element::Strong { children } => children,
            Element::CodeBlock { .. }
            | Element::ThematicBreak
            | Element::Text { .. }
            | Element::Code { .. }
            | Element::Softbreak
            | Element::Linebreak
            | Element::Fragment { .. }
            | Element::Formula { .. } => &[],
        }
    }

    /// Rebuild the element with transformed children, consuming it.
    pub fn try_map<M, E>(
        self,
        mut f: impl FnMut(Vec<N>) -> Result<Vec<M>, E>,
    ) -> Result<Element<M>, E> {
        Ok(match self {
            Element::Document { data, children } => Element::Document {
                data,
                children: f(children)?,
            },
            Element::Paragraph { children } => Element::Paragraph {
                children: f(children)?,
            },
            Element::Heading { level, children } => Element::Heading {
                level,
                children: f(children)?,
            },
            Element::BlockQuote { children } => Element::BlockQuote {
                children: f(children)?,
            },
            Element::List {
                list_kind,
                start,
                children,
            } => Element::List {
                list_kind,
                start,
                children: f(children)?,
            },
            Element::Item { children } => Element::Item {
                children: f(children)?,
            },
            Element::Clause {
                name,
                src,
                data,
                children,
            } => Element::Clause {
                name,
                src,
                data,
                children: f(children)?,
            },
            Element::Emph { children } => Element::Emph {
                children: f(children)?,
            },
            Element::Strong { children } => Element::Strong {
                children: f(children)?,
            },
            Element::CodeBlock { info, text } => Element::CodeBlock { info, text },
            Element::ThematicBreak => Element::ThematicBreak,
            Element::Text { text } => Element::Text { text },
            Element::Code { text } => Element::Code { text },
            Element::Softbreak => Element::Softbreak,
            Element::Linebreak => Element::Linebreak,
            Element::Fragment { text } => Element::Fragment { text },
            Element::Formula { name, value } => Element::Formula { name, value },
        })
    }

    /// Like [`Element::try_map`] but borrows the element.
    pub fn try_map_ref<M, E>(
        &self,
        mut f: impl FnMut(&[N]) -> Result<Vec<M>, E>,
    ) -> Result<Element<M>, E> {
        Ok(match self {
            Element::Document { data, children } => Element::Document {
                data: data.clone(),
                children: f(children)?,
            },
            Element::Paragraph { children } => Element::Paragraph {
                children: f(children)?,
            },
            Element::Heading { level, children } => Element::Heading {
                level: *level,
                children: f(children)?,
            },
            Element::BlockQuote { children } => Element::BlockQuote {
                children: f(children)?,
            },
            Element::List {
                list_kind,
                start,
                children,
            } => Element::List {
                list_kind: *list_kind,
                start: *start,
                children: f(children)?,
            },
            Element::Item { children } => Element::Item {
                children: f(children)?,
            },
            Element::Clause {
                name,
                src,
                data,
                children,
            } => Element::Clause {
                name: name.clone(),
                src: src.clone(),
                data: data.clone(),
                children: f(children)?,
            },
            Element::Emph { children } => Element::Emph {
                children: f(children)?,
            },
            Element::Strong { children } => Element::Strong {
                children: f(children)?,
            },
            Element::CodeBlock { info, text } => Element::CodeBlock {
                info: info.clone(),
                text: text.clone(),
            },
            Element::ThematicBreak => Element::ThematicBreak,
            Element::Text { text } => Element::Text { text: text.clone() },
            Element::Code { text } => Element::Code { text: text.clone() },
            Element::Softbreak => Element::Softbreak,
            Element::Linebreak => Element::Linebreak,
            Element::Fragment { text } => Element::Fragment { text: text.clone() },
            Element::Formula { name, value } => Element::Formula {
                name: name.clone(),
                value: value.clone(),
            },
        })
    }
}

/// A node of a drafted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(pub Element<Node>);

impl Node {
    pub fn element(&self) -> &Element<Node> {
        &self.0
    }

    pub fn kind(&self) -> &'static str {
        self.0.kind()
    }

    pub fn children(&self) -> &[Node] {
        self.0.children()
    }

    pub fn document(children: Vec<Node>) -> Self {
        Node(Element::Document {
            data: None,
            children,
        })
    }

    /// The record a drafted document or clause region was produced from.
    pub fn data(&self) -> Option<&Value> {
        match &self.0 {
            Element::Document { data, .. } | Element::Clause { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Node(Element::Paragraph { children })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Node(Element::Text { text: text.into() })
    }

    pub fn fragment(text: impl Into<String>) -> Self {
        Node(Element::Fragment { text: text.into() })
    }

    /// Concatenated text of every leaf, without markup.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Node, out: &mut String) {
    match &node.0 {
        Element::Text { text } | Element::Fragment { text } | Element::Code { text } => {
            out.push_str(text)
        }
        Element::CodeBlock { text, .. } => out.push_str(text),
        Element::Formula { value, .. } => out.push_str(value),
        Element::Softbreak | Element::Linebreak => out.push('\n'),
        other => other
            .children()
            .iter()
            .for_each(|child| collect_text(child, out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_kind_tag() {
        let node = Node::paragraph(vec![Node::text("hi"), Node(Element::Softbreak)]);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "paragraph",
                "children": [{"kind": "text", "text": "hi"}, {"kind": "softbreak"}]
            })
        );
        let back: Node = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn children_of_leaves_are_empty() {
        let text: Element<Node> = Element::Text { text: "x".into() };
        assert!(text.children().is_empty());
        assert_eq!(text.kind(), "text");
        assert!(!text.is_block());
    }

    #[test]
    fn try_map_preserves_fields() {
        let heading = Element::Heading {
            level: 2,
            children: vec![1, 2, 3],
        };
        let mapped: Element<String> = heading
            .try_map(|children| {
                Ok::<_, ()>(children.into_iter().map(|n| n.to_string()).collect())
            })
            .unwrap();
        assert_eq!(
            mapped,
            Element::Heading {
                level: 2,
                children: vec!["1".to_string(), "2".to_string(), "3".to_string()]
            }
        );
    }

    #[test]
    fn plain_text_flattens_leaves() {
        let node = Node::document(vec![Node::paragraph(vec![
            Node::text("a "),
            Node(Element::Strong {
                children: vec![Node::text("b")],
            }),
            Node::fragment(" c"),
        ])]);
        assert_eq!(node.plain_text(), "a b c");
    }
}

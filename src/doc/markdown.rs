//! Markdown renderer.
//!
//! The output is exactly what the template grammars in [`crate::parsing`]
//! accept, so the separators and line prefixes used here are shared with the
//! parser compiler through the `pub(crate)` helpers below.

use super::{Element, ListKind, Node};
use crate::config::Settings;

pub(crate) const QUOTE_PREFIX: &str = "> ";
pub(crate) const THEMATIC_BREAK: &str = "---";
pub(crate) const CLAUSE_CLOSE: &str = "{{/clause}}";
pub(crate) const FORMULA_OPEN: &str = "{{%";
pub(crate) const FORMULA_CLOSE: &str = "%}}";

/// Characters that are backslash-escaped in rendered text.
pub(crate) const ESCAPED: &[char] = &['\\', '*', '`', '{', '}'];

/// Continuation indent of list item lines.
pub(crate) fn item_indent(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Bullet => "  ",
        ListKind::Ordered => "   ",
    }
}

/// Line break inside a block.
pub(crate) fn newline(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    out.push('\n');
    out.push_str(prefix);
    out
}

/// Blank line between two blocks; the blank line carries no trailing spaces.
pub(crate) fn block_separator(prefix: &str) -> String {
    let mut out = String::from("\n");
    out.push_str(prefix.trim_end());
    out.push('\n');
    out.push_str(prefix);
    out
}

pub(crate) fn clause_open(name: &str, src: Option<&str>) -> String {
    let mut out = String::from("{{#clause ");
    out.push_str(name);
    if let Some(src) = src {
        out.push_str(" src=\"");
        out.push_str(src);
        out.push('"');
    }
    out.push_str("}}");
    out
}

pub(crate) fn code_block(info: Option<&str>, text: &str, prefix: &str) -> String {
    let mut out = String::from("```");
    out.push_str(info.unwrap_or_default());
    for line in text.lines() {
        out.push_str(&newline(prefix));
        out.push_str(line);
    }
    out.push_str(&newline(prefix));
    out.push_str("```");
    out
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ESCAPED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone)]
pub struct Renderer {
    bullet: char,
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer { bullet: '-' }
    }
}

impl Renderer {
    pub fn new(settings: &Settings) -> Self {
        Renderer {
            bullet: settings.rendering.bullet,
        }
    }

    pub fn render(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        self.blocks(nodes, "", &mut out);
        out
    }

    fn blocks(&self, nodes: &[Node], prefix: &str, out: &mut String) {
        for (index, node) in nodes.iter().enumerate() {
            if index > 0 {
                out.push_str(&block_separator(prefix));
            }
            self.block(node, prefix, out);
        }
    }

    fn block(&self, node: &Node, prefix: &str, out: &mut String) {
        match &node.0 {
            Element::Document { children, .. } | Element::Item { children } => {
                self.blocks(children, prefix, out)
            }
            Element::Paragraph { children } => self.inlines(children, prefix, out),
            Element::Heading { level, children } => {
                out.push_str(&"#".repeat(usize::from(*level)));
                out.push(' ');
                self.inlines(children, prefix, out);
            }
            Element::BlockQuote { children } => {
                out.push_str(QUOTE_PREFIX);
                let inner = format!("{prefix}{QUOTE_PREFIX}");
                self.blocks(children, &inner, out);
            }
            Element::List {
                list_kind,
                start,
                children,
            } => {
                let inner = format!("{prefix}{}", item_indent(*list_kind));
                for (index, item) in children.iter().enumerate() {
                    if index > 0 {
                        out.push_str(&newline(prefix));
                    }
                    match list_kind {
                        ListKind::Bullet => {
                            out.push(self.bullet);
                            out.push(' ');
                        }
                        ListKind::Ordered => {
                            out.push_str(&format!("{}. ", *start as usize + index));
                        }
                    }
                    match &item.0 {
                        Element::Item { children } => self.blocks(children, &inner, out),
                        _ => self.block(item, &inner, out),
                    }
                }
            }
            Element::CodeBlock { info, text } => {
                out.push_str(&code_block(info.as_deref(), text, prefix))
            }
            Element::ThematicBreak => out.push_str(THEMATIC_BREAK),
            Element::Clause {
                name,
                src,
                children,
                ..
            } => {
                out.push_str(&clause_open(name, src.as_deref()));
                out.push_str(&newline(prefix));
                if !children.is_empty() {
                    self.blocks(children, prefix, out);
                    out.push_str(&newline(prefix));
                }
                out.push_str(CLAUSE_CLOSE);
            }
            _ => self.inline(node, prefix, out),
        }
    }

    fn inlines(&self, nodes: &[Node], prefix: &str, out: &mut String) {
        for node in nodes {
            self.inline(node, prefix, out);
        }
    }

    fn inline(&self, node: &Node, prefix: &str, out: &mut String) {
        match &node.0 {
            Element::Text { text } => out.push_str(&escape_text(text)),
            Element::Emph { children } => {
                out.push('*');
                self.inlines(children, prefix, out);
                out.push('*');
            }
            Element::Strong { children } => {
                out.push_str("**");
                self.inlines(children, prefix, out);
                out.push_str("**");
            }
            Element::Code { text } => {
                out.push('`');
                out.push_str(text);
                out.push('`');
            }
            Element::Softbreak => out.push_str(&newline(prefix)),
            Element::Linebreak => {
                out.push('\\');
                out.push_str(&newline(prefix));
            }
            Element::Fragment { text } => out.push_str(text),
            Element::Formula { value, .. } => {
                out.push_str(FORMULA_OPEN);
                out.push(' ');
                out.push_str(value);
                out.push(' ');
                out.push_str(FORMULA_CLOSE);
            }
            _ => self.block(node, prefix, out),
        }
    }
}

/// Render with default settings.
pub fn render(nodes: &[Node]) -> String {
    Renderer::default().render(nodes)
}

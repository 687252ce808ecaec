//! Line-based block reader.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::inline;
use crate::doc::{Element, ListKind};
use crate::error::{describe, SyntaxError};
use crate::template::{ClauseBlock, ListBlock, Node};

static REGION_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\{\{#(clause|ulist|olist)\s+([A-Za-z_$][\w$]*)((?:\s+\w+="[^"]*")*)\s*\}\}\s*$"#)
        .unwrap()
});
static REGION_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{/(clause|ulist|olist)\}\}\s*$").unwrap());
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6}) ").unwrap());
static THEMATIC_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---\s*$").unwrap());
static BULLET_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*] ").unwrap());
static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\. ").unwrap());

/// A source line, possibly with a quote or item prefix already stripped.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    /// 1-based line number in the markup
    number: usize,
    /// 1-based column of `text` in the markup
    column: usize,
}

impl<'a> Line<'a> {
    fn skip(self, bytes: usize) -> Line<'a> {
        Line {
            text: &self.text[bytes..],
            number: self.number,
            column: self.column + self.text[..bytes].chars().count(),
        }
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.number,
            column: self.column,
            expected: Vec::new(),
            message: message.into(),
        }
    }
}

pub(super) fn read(markup: &str) -> Result<Vec<Node>, SyntaxError> {
    let lines: Vec<Line> = markup
        .lines()
        .enumerate()
        .map(|(index, text)| Line {
            text,
            number: index + 1,
            column: 1,
        })
        .collect();
    read_blocks(&lines)
}

fn read_blocks(lines: &[Line]) -> Result<Vec<Node>, SyntaxError> {
    let mut nodes = Vec::new();
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index];
        if line.is_blank() {
            index += 1;
            continue;
        }
        let (node, next) = if let Some(captures) = REGION_OPEN.captures(line.text) {
            read_region(lines, index, &captures)?
        } else if REGION_CLOSE.is_match(line.text) {
            return Err(line.error("closing tag without a matching opening tag"));
        } else if let Some(info) = line.text.strip_prefix("```") {
            read_fence(lines, index, info)?
        } else if let Some(captures) = HEADING.captures(line.text) {
            let marker = &captures[1];
            let children = read_inlines(&[line.skip(marker.len() + 1)])?;
            let node = Node::Markup(Element::Heading {
                level: marker.len() as u8,
                children,
            });
            (node, index + 1)
        } else if THEMATIC_BREAK.is_match(line.text) {
            (Node::Markup(Element::ThematicBreak), index + 1)
        } else if line.text.starts_with('>') {
            read_quote(lines, index)?
        } else if BULLET_ITEM.is_match(line.text) {
            read_list(lines, index, ListKind::Bullet)?
        } else if ORDERED_ITEM.is_match(line.text) {
            read_list(lines, index, ListKind::Ordered)?
        } else {
            read_paragraph(lines, index)?
        };
        nodes.push(node);
        index = next;
    }
    Ok(nodes)
}

fn starts_block(line: &Line) -> bool {
    REGION_OPEN.is_match(line.text)
        || REGION_CLOSE.is_match(line.text)
        || line.text.starts_with("```")
        || line.text.starts_with('>')
        || HEADING.is_match(line.text)
        || THEMATIC_BREAK.is_match(line.text)
        || BULLET_ITEM.is_match(line.text)
        || ORDERED_ITEM.is_match(line.text)
}

fn read_region(
    lines: &[Line],
    index: usize,
    captures: &Captures,
) -> Result<(Node, usize), SyntaxError> {
    let line = lines[index];
    let tag = &captures[1];
    let name = captures[2].to_string();
    let close = find_close(lines, index, tag)?;
    let children = read_blocks(&lines[index + 1..close])?;

    let mut src = None;
    let mut condition = None;
    let attributes = captures.get(3).map_or("", |m| m.as_str());
    for attribute in ATTRIBUTE.captures_iter(attributes) {
        match (tag, &attribute[1]) {
            ("clause", "src") => src = Some(attribute[2].to_string()),
            ("clause", "condition") => condition = Some(attribute[2].to_string()),
            (_, other) => {
                return Err(line.error(format!("unknown attribute `{other}` on {tag}")));
            }
        }
    }

    let node = match tag {
        "clause" => Node::Clause(ClauseBlock {
            name,
            element_type: None,
            src,
            condition,
            children,
        }),
        _ => {
            let kind = if tag == "ulist" {
                ListKind::Bullet
            } else {
                ListKind::Ordered
            };
            Node::List(ListBlock {
                name,
                kind,
                element_type: None,
                children: item_template(children, kind).ok_or_else(|| {
                    line.error(format!("{tag} must contain exactly one list item"))
                })?,
            })
        }
    };
    Ok((node, close + 1))
}

fn find_close(lines: &[Line], index: usize, tag: &str) -> Result<usize, SyntaxError> {
    let mut depth = 0usize;
    for (offset, line) in lines[index..].iter().enumerate() {
        if REGION_OPEN
            .captures(line.text)
            .is_some_and(|c| &c[1] == tag)
        {
            depth += 1;
        } else if REGION_CLOSE
            .captures(line.text)
            .is_some_and(|c| &c[1] == tag)
        {
            depth -= 1;
            if depth == 0 {
                return Ok(index + offset);
            }
        }
    }
    Err(lines[index].error(format!("unclosed {{{{#{tag}}}}}")))
}

/// The item template of a `ulist`/`olist` region is the content of its single item.
fn item_template(children: Vec<Node>, kind: ListKind) -> Option<Vec<Node>> {
    let [Node::Markup(Element::List {
        list_kind,
        children: items,
        ..
    })] = <[Node; 1]>::try_from(children).ok()?
    else {
        return None;
    };
    if list_kind != kind {
        return None;
    }
    let [Node::Markup(Element::Item { children })] = <[Node; 1]>::try_from(items).ok()? else {
        return None;
    };
    Some(children)
}

fn read_fence(lines: &[Line], index: usize, info: &str) -> Result<(Node, usize), SyntaxError> {
    let info = info.trim();
    let body: Vec<&str> = lines[index + 1..]
        .iter()
        .take_while(|line| line.text.trim_end() != "```")
        .map(|line| line.text)
        .collect();
    let close = index + 1 + body.len();
    if close >= lines.len() {
        return Err(lines[index].error("unclosed code fence"));
    }
    let node = Node::Markup(Element::CodeBlock {
        info: (!info.is_empty()).then(|| info.to_string()),
        text: body.join("\n"),
    });
    Ok((node, close + 1))
}

fn read_quote(lines: &[Line], index: usize) -> Result<(Node, usize), SyntaxError> {
    let inner: Vec<Line> = lines[index..]
        .iter()
        .take_while(|line| line.text.starts_with('>'))
        .map(|line| {
            if line.text.starts_with("> ") {
                line.skip(2)
            } else {
                line.skip(1)
            }
        })
        .collect();
    let next = index + inner.len();
    let children = read_blocks(&inner)?;
    Ok((Node::Markup(Element::BlockQuote { children }), next))
}

fn marker_len(line: &Line, kind: ListKind) -> Option<usize> {
    match kind {
        ListKind::Bullet => BULLET_ITEM.find(line.text).map(|m| m.end()),
        ListKind::Ordered => ORDERED_ITEM.find(line.text).map(|m| m.end()),
    }
}

fn read_list(lines: &[Line], index: usize, kind: ListKind) -> Result<(Node, usize), SyntaxError> {
    let indent = crate::doc::markdown::item_indent(kind);
    let start = match kind {
        ListKind::Bullet => 1,
        ListKind::Ordered => ORDERED_ITEM
            .captures(lines[index].text)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(1),
    };
    let mut items = Vec::new();
    let mut cursor = index;
    while let Some(marker) = lines.get(cursor).and_then(|line| marker_len(line, kind)) {
        let mut item_lines = vec![lines[cursor].skip(marker)];
        cursor += 1;
        while let Some(line) = lines.get(cursor) {
            if line.text.starts_with(indent) {
                item_lines.push(line.skip(indent.len()));
            } else if line.is_blank() && continues_item(&lines[cursor..], indent) {
                item_lines.push(Line { text: "", ..*line });
            } else {
                break;
            }
            cursor += 1;
        }
        items.push(Node::Markup(Element::Item {
            children: read_blocks(&item_lines)?,
        }));
    }
    let node = Node::Markup(Element::List {
        list_kind: kind,
        start,
        children: items,
    });
    Ok((node, cursor))
}

/// Blank lines stay inside an item only when indented content follows them.
fn continues_item(lines: &[Line], indent: &str) -> bool {
    lines
        .iter()
        .find(|line| !line.is_blank())
        .is_some_and(|line| line.text.starts_with(indent))
}

fn read_paragraph(lines: &[Line], index: usize) -> Result<(Node, usize), SyntaxError> {
    let mut end = index + 1;
    while end < lines.len() && !lines[end].is_blank() && !starts_block(&lines[end]) {
        end += 1;
    }
    let children = read_inlines(&lines[index..end])?;
    Ok((Node::Markup(Element::Paragraph { children }), end))
}

fn read_inlines(lines: &[Line]) -> Result<Vec<Node>, SyntaxError> {
    let text = lines
        .iter()
        .map(|line| line.text)
        .collect::<Vec<_>>()
        .join("\n");
    inline::read(&text).map_err(|errors| {
        let Some(error) = errors.first() else {
            return lines[0].error("invalid inline markup");
        };
        let (expected, _, message) = describe(error);
        let (line, column) = locate(lines, error.span().start);
        SyntaxError {
            line,
            column,
            expected,
            message,
        }
    })
}

/// Map a character offset in the joined paragraph back to the markup.
fn locate(lines: &[Line], offset: usize) -> (usize, usize) {
    let mut remaining = offset;
    for line in lines {
        let width = line.text.chars().count();
        if remaining <= width {
            return (line.number, line.column + remaining);
        }
        remaining -= width + 1;
    }
    let last = lines[lines.len() - 1];
    (last.number, last.column + last.text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_continuation_lines_are_dedented() {
        let nodes = read("- first\n  second\n\n  third\n- next").unwrap();
        let [Node::Markup(Element::List { children, .. })] = nodes.as_slice() else {
            panic!("expected one list, got {nodes:?}");
        };
        assert_eq!(children.len(), 2);
        let Node::Markup(Element::Item { children: first }) = &children[0] else {
            panic!("expected an item");
        };
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn quoted_lines_are_read_recursively() {
        let nodes = read("> one\n>\n> - two").unwrap();
        let [Node::Markup(Element::BlockQuote { children })] = nodes.as_slice() else {
            panic!("expected a quote");
        };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn fence_keeps_text_verbatim() {
        let nodes = read("```json\n{\"a\": *1*}\n```").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Markup(Element::CodeBlock {
                info: Some("json".into()),
                text: "{\"a\": *1*}".into(),
            })]
        );
    }

    #[test]
    fn nested_regions_of_the_same_tag() {
        let nodes = read(
            "{{#clause outer}}\n{{#clause inner}}\nx\n{{/clause}}\n{{/clause}}\nafter",
        )
        .unwrap();
        assert_eq!(nodes.len(), 2);
        let Node::Clause(outer) = &nodes[0] else {
            panic!("expected a clause");
        };
        assert!(matches!(&outer.children[..], [Node::Clause(inner)] if inner.name == "inner"));
    }

    #[test]
    fn rejects_unknown_region_attribute() {
        let err = read("{{#ulist items sep=\",\"}}\n- x\n{{/ulist}}").unwrap_err();
        assert!(err.message.contains("sep"));
    }

    #[test]
    fn error_columns_account_for_prefixes() {
        let err = read("> text {{broken").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.column >= 8);
    }
}

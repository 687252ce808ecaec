//! Inline template grammar.
//!
//! Block tags (`{{#if}}`, `{{#optional}}`, `{{#with}}`, `{{#join}}`) nest
//! through [`recursive`]; emphasis must enclose at least one node so `**`
//! is never read as two empty emphases.

use chumsky::prelude::*;

use super::DEFAULT_SEPARATOR;
use crate::doc::markdown::{FORMULA_CLOSE, FORMULA_OPEN};
use crate::doc::Element;
use crate::template::{Conditional, Formula, JoinBlock, Node, OptionalBlock, Variable, WithBlock};

pub(super) fn read(text: &str) -> Result<Vec<Node>, Vec<Simple<char>>> {
    inlines().then_ignore(end()).parse(text)
}

fn ident() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    filter(|c: &char| c.is_ascii_alphabetic() || *c == '_' || *c == '$')
        .chain(filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '$').repeated())
        .collect::<String>()
        .try_map(|name, span| {
            if name == "else" {
                Err(Simple::custom(span, "`else` outside of a block"))
            } else {
                Ok(name)
            }
        })
}

fn quoted() -> impl Parser<char, String, Error = Simple<char>> + Clone {
    just('"')
        .ignore_then(filter(|c: &char| *c != '"').repeated().collect::<String>())
        .then_ignore(just('"'))
}

fn spaces() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just(' ').repeated().ignored()
}

fn spaces1() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just(' ').repeated().at_least(1).ignored()
}

/// `{{#keyword ` up to the tag's argument.
fn open(keyword: &'static str) -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just("{{#").ignore_then(just(keyword)).ignore_then(spaces1())
}

fn tag_end() -> impl Parser<char, (), Error = Simple<char>> + Clone {
    spaces().ignore_then(just("}}")).ignored()
}

fn close(keyword: &'static str) -> impl Parser<char, (), Error = Simple<char>> + Clone {
    just("{{/")
        .ignore_then(just(keyword))
        .ignore_then(just("}}"))
        .ignored()
}

fn inlines() -> impl Parser<char, Vec<Node>, Error = Simple<char>> + Clone {
    recursive(|inlines| {
        let nonempty = inlines.clone().try_map(|nodes: Vec<Node>, span| {
            if nodes.is_empty() {
                Err(Simple::custom(span, "expected content"))
            } else {
                Ok(nodes)
            }
        });
        let otherwise = just("{{else}}")
            .ignore_then(inlines.clone())
            .or_not()
            .map(Option::unwrap_or_default);

        let formula = just(FORMULA_OPEN)
            .ignore_then(take_until(just(FORMULA_CLOSE)))
            .map(|(code, _)| {
                Node::Formula(Formula {
                    name: String::new(),
                    code: code.into_iter().collect::<String>().trim().to_string(),
                    dependencies: Vec::new(),
                })
            })
            .boxed();

        let guard = just("condition=")
            .ignore_then(quoted())
            .map(|code| (String::new(), Some(code)))
            .or(ident().map(|name| (name, None)));
        let conditional = open("if")
            .ignore_then(guard)
            .then_ignore(tag_end())
            .then(inlines.clone())
            .then(otherwise.clone())
            .then_ignore(close("if"))
            .map(|(((name, condition), when_true), when_false)| {
                Node::Conditional(Conditional {
                    name,
                    condition,
                    when_true,
                    when_false,
                })
            })
            .boxed();

        let optional = open("optional")
            .ignore_then(ident())
            .then_ignore(tag_end())
            .then(inlines.clone())
            .then(otherwise)
            .then_ignore(close("optional"))
            .map(|((name, when_some), when_none)| {
                Node::Optional(OptionalBlock {
                    name,
                    element_type: None,
                    when_some,
                    when_none,
                })
            })
            .boxed();

        let with = open("with")
            .ignore_then(ident())
            .then_ignore(tag_end())
            .then(inlines.clone())
            .then_ignore(close("with"))
            .map(|(name, children)| {
                Node::With(WithBlock {
                    name,
                    element_type: None,
                    children,
                })
            })
            .boxed();

        let separator = spaces1()
            .ignore_then(just("separator="))
            .ignore_then(quoted())
            .or_not()
            .map(|separator| separator.unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()));
        let join = open("join")
            .ignore_then(ident())
            .then(separator)
            .then_ignore(tag_end())
            .then(inlines.clone())
            .then_ignore(close("join"))
            .map(|((name, separator), children)| {
                Node::Join(JoinBlock {
                    name,
                    element_type: None,
                    separator,
                    children,
                })
            })
            .boxed();

        let format = spaces1()
            .ignore_then(just("as"))
            .ignore_then(spaces1())
            .ignore_then(quoted())
            .or_not();
        let variable = just("{{")
            .ignore_then(spaces())
            .ignore_then(ident())
            .then(format)
            .then_ignore(tag_end())
            .map(|(name, format)| {
                Node::Variable(Variable {
                    format,
                    ..Variable::new(name)
                })
            })
            .boxed();

        let linebreak = just('\\')
            .then(just('\n'))
            .to(Node::Markup(Element::Linebreak))
            .boxed();
        let escaped = just('\\')
            .ignore_then(any())
            .map(|c: char| Node::text(c))
            .boxed();
        let strong = just("**")
            .ignore_then(nonempty.clone())
            .then_ignore(just("**"))
            .map(|children| Node::Markup(Element::Strong { children }))
            .boxed();
        let emph = just('*')
            .ignore_then(nonempty)
            .then_ignore(just('*'))
            .map(|children| Node::Markup(Element::Emph { children }))
            .boxed();
        let code = just('`')
            .ignore_then(filter(|c: &char| *c != '`').repeated().collect::<String>())
            .then_ignore(just('`'))
            .map(|text| Node::Markup(Element::Code { text }))
            .boxed();
        let softbreak = just('\n').to(Node::Markup(Element::Softbreak)).boxed();
        // A single `{` is text; `{{` must open a tag.
        let brace = just('{')
            .then(just('{').or_not())
            .try_map(|(_, next), span| match next {
                None => Ok(Node::text('{')),
                Some(_) => Err(Simple::custom(span, "unknown tag")),
            })
            .boxed();
        let text = none_of("\\*`{\n")
            .repeated()
            .at_least(1)
            .collect::<String>()
            .map(|text: String| Node::text(text))
            .boxed();

        choice((
            formula,
            conditional,
            optional,
            with,
            join,
            variable,
            linebreak,
            escaped,
            strong,
            emph,
            code,
            softbreak,
            brace,
            text,
        ))
        .repeated()
        .map(merge_text)
    })
}

/// Escapes and text runs arrive as separate nodes; join neighbours.
fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (Some(Node::Markup(Element::Text { text: last })), Node::Markup(Element::Text { text })) =
            (merged.last_mut(), &node)
        {
            last.push_str(text);
            continue;
        }
        merged.push(node);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_become_text() {
        assert_eq!(read(r"a\*b\{c").unwrap(), vec![Node::text("a*b{c")]);
    }

    #[test]
    fn lone_brace_is_text() {
        assert_eq!(read("a { b").unwrap(), vec![Node::text("a { b")]);
    }

    #[test]
    fn strong_and_emphasis() {
        let nodes = read("**bold** and *it*").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Markup(Element::Strong {
                    children: vec![Node::text("bold")]
                }),
                Node::text(" and "),
                Node::Markup(Element::Emph {
                    children: vec![Node::text("it")]
                }),
            ]
        );
    }

    #[test]
    fn join_with_default_and_custom_separator() {
        let nodes = read(r#"{{#join xs}}{{this}}{{/join}} {{#join ys separator=" | "}}{{this}}{{/join}}"#)
            .unwrap();
        let separators: Vec<_> = nodes
            .iter()
            .filter_map(|n| match n {
                Node::Join(j) => Some(j.separator.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(separators, vec![", ", " | "]);
    }

    #[test]
    fn formula_code_is_opaque() {
        let nodes = read("{{% a > 1 ? \"}}\" : b %}}").unwrap();
        assert!(matches!(&nodes[..], [Node::Formula(f)] if f.code == "a > 1 ? \"}}\" : b"));
    }

    #[test]
    fn optional_with_else() {
        let nodes = read("{{#optional notes}}Notes: {{this}}{{else}}none{{/optional}}").unwrap();
        let [Node::Optional(optional)] = nodes.as_slice() else {
            panic!("expected an optional block");
        };
        assert_eq!(optional.when_none, vec![Node::text("none")]);
        assert_eq!(optional.when_some.len(), 2);
    }

    #[test]
    fn line_breaks() {
        let nodes = read("a\\\nb\nc").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::text("a"),
                Node::Markup(Element::Linebreak),
                Node::text("b"),
                Node::Markup(Element::Softbreak),
                Node::text("c"),
            ]
        );
    }

    #[test]
    fn unterminated_tag_fails() {
        assert!(read("{{name").is_err());
        assert!(read("{{#with a}}x").is_err());
    }
}

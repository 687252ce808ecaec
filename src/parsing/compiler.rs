//! Typed template to chumsky grammar.
//!
//! Block lists are separated by a blank line carrying the current line
//! prefix; a conditional clause may be missing from the text together with
//! its separator. The prefix stack mirrors the renderer: quotes add `> `,
//! list items add their continuation indent.

use chumsky::prelude::*;
use chumsky::recursive::Recursive;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;

use super::captures::{Captured, Slot, THIS};
use super::{ParseOptions, TextParser};
use crate::doc::markdown::{
    block_separator, clause_open, code_block, escape_text, item_indent, newline, CLAUSE_CLOSE,
    FORMULA_CLOSE, FORMULA_OPEN, QUOTE_PREFIX, THEMATIC_BREAK,
};
use crate::doc::{Element, ListKind};
use crate::error::{RegistryError, Result};
use crate::registry::{self, alternatives, CompoundEntry, ParsingTable, ScalarContext, ScalarProgram};
use crate::template::{
    ClauseBlock, Conditional, EnumVariable, JoinBlock, ListBlock, Node, OptionalBlock, TypedTemplate,
    Variable, WithBlock,
};

type Slots = TextParser<Vec<Slot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Quote,
    Item(ListKind),
}

pub(crate) struct Compiler<'t> {
    table: &'t ParsingTable,
    scalar: ScalarContext,
    bullet: char,
    in_contract: bool,
    prefixes: Vec<Prefix>,
    /// Compound parsers being defined, referenced weakly by their own body.
    in_progress: HashMap<String, Recursive<'static, char, Captured, Simple<char>>>,
    compounds: HashMap<String, TextParser<Captured>>,
}

fn nothing() -> Slots {
    empty().to(Vec::new()).boxed()
}

fn literal(text: String) -> Slots {
    if text.is_empty() {
        return nothing();
    }
    just(text).to(Vec::new()).boxed()
}

fn join(first: Slots, second: Slots) -> Slots {
    first
        .then(second)
        .map(|(mut slots, more)| {
            slots.extend(more);
            slots
        })
        .boxed()
}

fn concat(parsers: Vec<Slots>) -> Slots {
    parsers.into_iter().fold(nothing(), join)
}

fn single(name: String, value: TextParser<Captured>) -> Slots {
    value
        .map_with_span(move |value, span| vec![Slot::new(name.clone(), value, span)])
        .boxed()
}

fn flagged(branch: Slots, name: String, flag: bool) -> Slots {
    branch
        .map_with_span(move |mut slots, span| {
            slots.push(Slot::new(name.clone(), Captured::Value(Value::Bool(flag)), span));
            slots
        })
        .boxed()
}

fn formula() -> Slots {
    just(FORMULA_OPEN)
        .ignore_then(take_until(just(FORMULA_CLOSE)))
        .to(Vec::new())
        .boxed()
}

fn bound(name: &str, element_type: &Option<String>) -> Result<String> {
    element_type
        .clone()
        .ok_or_else(|| RegistryError::Unbound(name.to_string()).into())
}

impl<'t> Compiler<'t> {
    pub fn new(table: &'t ParsingTable, options: ParseOptions) -> Self {
        Compiler {
            table,
            scalar: ScalarContext {
                utc_offset: options.utc_offset,
                now: options.now,
            },
            bullet: table.settings().rendering.bullet,
            in_contract: false,
            prefixes: Vec::new(),
            in_progress: HashMap::new(),
            compounds: HashMap::new(),
        }
    }

    pub fn scalar_context(&self) -> &ScalarContext {
        &self.scalar
    }

    pub fn root(mut self, template: &TypedTemplate) -> Result<TextParser<Captured>> {
        let identifiers = self.table.settings().identifiers.clone();
        let (children, identifier) = match template.root() {
            Node::Clause(clause) => (&clause.children, identifiers.clause),
            Node::Contract(contract) => {
                self.in_contract = true;
                (&contract.children, identifiers.contract)
            }
            other => {
                return Err(RegistryError::Unbound(other.name().unwrap_or("root").to_string()).into())
            }
        };
        let class = template.element_type().to_string();
        let body = self.blocks(children)?;
        tracing::debug!(compounds = self.compounds.len(), "compiled template grammar");
        Ok(body
            .map(move |slots| Captured::Record {
                class: class.clone(),
                identifier: Some(identifier.clone()),
                slots,
            })
            .boxed())
    }

    fn prefix(&self) -> String {
        self.prefixes
            .iter()
            .map(|prefix| match prefix {
                Prefix::Quote => QUOTE_PREFIX,
                Prefix::Item(kind) => item_indent(*kind),
            })
            .collect()
    }

    fn nested<T>(&mut self, prefix: Prefix, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.prefixes.push(prefix);
        let result = f(self);
        self.prefixes.pop();
        result
    }

    /// Whether drafting may leave the block out entirely.
    fn elidable(&self, node: &Node) -> bool {
        match node {
            Node::Clause(clause) => {
                clause.condition.is_some() || (!self.in_contract && clause.children.is_empty())
            }
            _ => false,
        }
    }

    fn blocks(&mut self, nodes: &[Node]) -> Result<Slots> {
        let separator = block_separator(&self.prefix());
        let mut compiled = Vec::with_capacity(nodes.len());
        for node in nodes {
            compiled.push((self.node(node)?, self.elidable(node)));
        }
        // Built back to front: `first` parses the remaining blocks when none
        // has been seen yet, `later` when a separator must precede them.
        let mut first = nothing();
        let mut later = nothing();
        for (parser, elidable) in compiled.into_iter().rev() {
            let present_first = join(parser.clone(), later.clone());
            let present_later = join(
                just(separator.clone()).ignore_then(parser).boxed(),
                later.clone(),
            );
            (first, later) = if elidable {
                (
                    present_first.or(first).boxed(),
                    present_later.or(later).boxed(),
                )
            } else {
                (present_first, present_later)
            };
        }
        Ok(first)
    }

    fn inlines(&mut self, nodes: &[Node]) -> Result<Slots> {
        let mut parsers = Vec::with_capacity(nodes.len());
        for node in nodes {
            parsers.push(self.node(node)?);
        }
        Ok(concat(parsers))
    }

    fn node(&mut self, node: &Node) -> Result<Slots> {
        match node {
            Node::Variable(variable) => self.variable(variable),
            Node::EnumVariable(variable) => Ok(enum_variable(variable)),
            Node::Formula(_) => Ok(formula()),
            Node::Conditional(conditional) => self.conditional(conditional),
            Node::Optional(optional) => self.optional(optional),
            Node::With(with) => self.with(with),
            Node::List(list) => self.list_block(list),
            Node::Join(join) => self.join(join),
            Node::Clause(clause) => self.clause(clause),
            Node::Contract(contract) => self.blocks(&contract.children),
            Node::Markup(element) => self.element(element),
        }
    }

    fn variable(&mut self, variable: &Variable) -> Result<Slots> {
        let element_type = bound(&variable.name, &variable.element_type)?;
        let value = if variable.identified_by.is_some() {
            ScalarProgram::String
                .parser(&self.scalar)
                .map(move |id| match id {
                    Value::String(id) => Captured::Value(Value::String(registry::resource_uri(
                        &element_type,
                        &id,
                    ))),
                    other => Captured::Value(other),
                })
                .boxed()
        } else {
            let table = self.table;
            table.parser(
                &variable.name,
                &element_type,
                variable.format.as_deref(),
                self,
            )?
        };
        Ok(single(variable.name.clone(), value))
    }

    fn conditional(&mut self, conditional: &Conditional) -> Result<Slots> {
        let when_true = self.inlines(&conditional.when_true)?;
        let when_false = self.inlines(&conditional.when_false)?;
        if conditional.condition.is_some() {
            return Ok(when_true.or(when_false).boxed());
        }
        let name = conditional.name.clone();
        Ok(flagged(when_true, name.clone(), true)
            .or(flagged(when_false, name, false))
            .boxed())
    }

    fn optional(&mut self, optional: &OptionalBlock) -> Result<Slots> {
        let element_type = bound(&optional.name, &optional.element_type)?;
        let wrap = self.element_wrapper(&element_type);
        let some = self.inlines(&optional.when_some)?.map(wrap).boxed();
        let none = self.inlines(&optional.when_none)?;
        Ok(single(optional.name.clone(), some).or(none).boxed())
    }

    fn with(&mut self, with: &WithBlock) -> Result<Slots> {
        let class = bound(&with.name, &with.element_type)?;
        let body = self.inlines(&with.children)?;
        Ok(single(
            with.name.clone(),
            body.map(move |slots| Captured::Record {
                class: class.clone(),
                identifier: None,
                slots,
            })
            .boxed(),
        ))
    }

    fn marker(&self, kind: ListKind) -> TextParser<()> {
        match kind {
            ListKind::Bullet => just(format!("{} ", self.bullet)).ignored().boxed(),
            ListKind::Ordered => filter(|c: &char| c.is_ascii_digit())
                .repeated()
                .at_least(1)
                .then(just(". "))
                .ignored()
                .boxed(),
        }
    }

    fn list_block(&mut self, list: &ListBlock) -> Result<Slots> {
        let element_type = bound(&list.name, &list.element_type)?;
        let outer = self.prefix();
        let item = self.nested(Prefix::Item(list.kind), |this| this.blocks(&list.children))?;
        let items = self
            .marker(list.kind)
            .ignore_then(item)
            .map(self.element_wrapper(&element_type))
            .separated_by(just(newline(&outer)))
            .at_least(1)
            .map(Captured::Array)
            .boxed();
        Ok(single(list.name.clone(), items))
    }

    fn join(&mut self, join: &JoinBlock) -> Result<Slots> {
        let element_type = bound(&join.name, &join.element_type)?;
        let item = self.inlines(&join.children)?;
        let items = item
            .map(self.element_wrapper(&element_type))
            .separated_by(just(escape_text(&join.separator)))
            .map(Captured::Array)
            .boxed();
        Ok(single(join.name.clone(), items))
    }

    fn clause(&mut self, clause: &ClauseBlock) -> Result<Slots> {
        let class = bound(&clause.name, &clause.element_type)?;
        let identifier = self.table.settings().identifiers.clause.clone();
        let body = self.blocks(&clause.children)?;
        let body = if self.in_contract {
            self.region(&clause.name, clause.src.as_deref(), body)
        } else {
            body
        };
        let record = body
            .map(move |slots| Captured::Record {
                class: class.clone(),
                identifier: Some(identifier.clone()),
                slots,
            })
            .boxed();
        Ok(single(clause.name.clone(), record))
    }

    /// `{{#clause name}}`, the body on its own lines, `{{/clause}}`.
    fn region(&self, name: &str, src: Option<&str>, body: Slots) -> Slots {
        let line = just(newline(&self.prefix()));
        just(clause_open(name, src))
            .ignore_then(line.clone())
            .ignore_then(body.then_ignore(line).or_not().map(Option::unwrap_or_default))
            .then_ignore(just(CLAUSE_CLOSE))
            .boxed()
    }

    fn element(&mut self, element: &Element<Node>) -> Result<Slots> {
        let prefix = self.prefix();
        Ok(match element {
            Element::Document { children, .. } | Element::Item { children } => {
                self.blocks(children)?
            }
            Element::Paragraph { children } => self.inlines(children)?,
            Element::Heading { level, children } => join(
                literal(format!("{} ", "#".repeat(usize::from(*level)))),
                self.inlines(children)?,
            ),
            Element::BlockQuote { children } => {
                let body = self.nested(Prefix::Quote, |this| this.blocks(children))?;
                join(literal(QUOTE_PREFIX.to_string()), body)
            }
            Element::List {
                list_kind,
                start,
                children,
            } => self.static_list(*list_kind, *start, children)?,
            Element::CodeBlock { info, text } => literal(code_block(info.as_deref(), text, &prefix)),
            Element::ThematicBreak => literal(THEMATIC_BREAK.to_string()),
            Element::Clause {
                name,
                src,
                children,
                ..
            } => {
                let body = self.blocks(children)?;
                self.region(name, src.as_deref(), body)
            }
            Element::Text { text } => literal(escape_text(text)),
            Element::Emph { children } => concat(vec![
                literal("*".to_string()),
                self.inlines(children)?,
                literal("*".to_string()),
            ]),
            Element::Strong { children } => concat(vec![
                literal("**".to_string()),
                self.inlines(children)?,
                literal("**".to_string()),
            ]),
            Element::Code { text } => literal(format!("`{text}`")),
            Element::Softbreak => literal(newline(&prefix)),
            Element::Linebreak => literal(format!("\\{}", newline(&prefix))),
            Element::Fragment { text } => literal(text.clone()),
            Element::Formula { .. } => formula(),
        })
    }

    fn static_list(&mut self, kind: ListKind, start: u32, items: &[Node]) -> Result<Slots> {
        let outer = self.prefix();
        let mut parsers = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut lead = if index > 0 {
                newline(&outer)
            } else {
                String::new()
            };
            match kind {
                ListKind::Bullet => lead.push_str(&format!("{} ", self.bullet)),
                ListKind::Ordered => lead.push_str(&format!("{}. ", start as usize + index)),
            }
            let content = self.nested(Prefix::Item(kind), |this| match item {
                Node::Markup(Element::Item { children }) => this.blocks(children),
                other => this.node(other),
            })?;
            parsers.push(join(literal(lead), content));
        }
        Ok(concat(parsers))
    }

    /// Folds the slots of one array element or optional value: the `this`
    /// capture when there is one, a record for compound types, otherwise
    /// `null` for a value the text does not show.
    fn element_wrapper(&self, element_type: &str) -> impl Fn(Vec<Slot>) -> Captured + Clone {
        let class = self
            .table
            .is_compound(element_type)
            .then(|| element_type.to_string());
        move |slots: Vec<Slot>| {
            if slots.iter().any(|slot| slot.name == THIS) {
                Captured::Unwrapped(slots)
            } else if let Some(class) = &class {
                Captured::Record {
                    class: class.clone(),
                    identifier: None,
                    slots,
                }
            } else {
                Captured::Value(Value::Null)
            }
        }
    }

    /// Parser for a compound value. Recursive types refer back to the parser
    /// being defined.
    pub(crate) fn compound(&mut self, entry: &CompoundEntry) -> Result<TextParser<Captured>> {
        let key = entry.element_type.clone();
        if let Some(parser) = self.compounds.get(&key) {
            return Ok(parser.clone());
        }
        if let Some(parser) = self.in_progress.get(&key) {
            return Ok(parser.clone().boxed());
        }

        let mut failure = None;
        let class = key.clone();
        let parser = recursive(|this| {
            self.in_progress.insert(key.clone(), this);
            match self.inlines(&entry.children) {
                Ok(body) => body
                    .map(move |slots| Captured::Record {
                        class: class.clone(),
                        identifier: None,
                        slots,
                    })
                    .boxed(),
                Err(error) => {
                    failure = Some(error);
                    alternatives(Vec::new())
                }
            }
        })
        .boxed();
        self.in_progress.remove(&key);
        if let Some(error) = failure {
            return Err(error);
        }
        tracing::trace!(r#type = %key, "compiled compound parser");
        self.compounds.insert(key, parser.clone());
        Ok(parser)
    }
}

fn enum_variable(variable: &EnumVariable) -> Slots {
    let mut values = variable.enum_values.clone();
    // `GOLD` must not be read as the prefix `GO` of another value.
    values.sort_by_key(|value| Reverse(value.chars().count()));
    let choice = alternatives(
        values
            .into_iter()
            .map(|value| just(value.clone()).to(Value::String(value)).boxed()),
    );
    single(variable.name.clone(), choice.map(Captured::Value).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::build;
    use crate::binding::bind;
    use crate::model::{Declaration, Models, Property};
    use crate::parsing::compile;
    use crate::template::TemplateKind;
    use chrono::DateTime;
    use serde_json::json;
    use std::sync::Arc;

    fn models() -> Models {
        Models::with_declarations([
            Declaration::concept(
                "Order",
                vec![
                    Property::new("buyer", "String"),
                    Property::new("items", "Line").array(),
                    Property::new("shipTo", "Address").optional(),
                    Property::new("express", "Boolean"),
                    Property::new("tags", "String").array(),
                ],
            ),
            Declaration::concept(
                "Line",
                vec![
                    Property::new("sku", "String"),
                    Property::new("qty", "Integer"),
                ],
            ),
            Declaration::concept(
                "Address",
                vec![
                    Property::new("city", "String"),
                    Property::new("parent", "Address").optional(),
                ],
            ),
            Declaration::enumeration("Size", &["S", "SM", "SMALL"]),
        ])
        .unwrap()
    }

    fn parse(markup: &str, text: &str) -> Result<Value> {
        let models = models();
        let table = ParsingTable::new(Arc::new(models.clone()));
        let typed = bind(build(markup).unwrap(), &models, TemplateKind::Clause, "Order").unwrap();
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        compile(&typed, &table, ParseOptions::at(now))?.parse(text)
    }

    #[test]
    fn blocks_are_separated_by_blank_lines() {
        let value = parse("Buyer {{buyer}}\n\n> Express: {{express}}", "Buyer \"Ann\"\n\n> Express: true")
            .unwrap();
        assert_eq!(value["buyer"], "Ann");
        assert_eq!(value["express"], true);
    }

    #[test]
    fn quoted_paragraphs_carry_the_prefix() {
        let value = parse(
            "> {{buyer}}\n>\n> more",
            "> \"Ann\"\n>\n> more",
        )
        .unwrap();
        assert_eq!(value["buyer"], "Ann");
    }

    #[test]
    fn compound_optional_recurses() {
        let value = parse(
            "{{#optional shipTo}}Ship to {{this}}{{/optional}}",
            "Ship to city \"Oslo\", parent city \"Norway\"",
        )
        .unwrap();
        assert_eq!(
            value["shipTo"],
            json!({
                "$class": "Address",
                "city": "Oslo",
                "parent": {"$class": "Address", "city": "Norway"}
            })
        );
    }

    #[test]
    fn ordered_list_of_records() {
        let value = parse(
            "{{#olist items}}\n1. {{qty}} x {{sku}}\n{{/olist}}",
            "1. 2 x \"A\"\n2. 1 x \"B\"",
        )
        .unwrap();
        assert_eq!(
            value["items"],
            json!([
                {"$class": "Line", "qty": 2, "sku": "A"},
                {"$class": "Line", "qty": 1, "sku": "B"}
            ])
        );
    }

    #[test]
    fn true_branch_wins_when_both_match() {
        let value = parse("Fee{{#if express}} due{{else}} due{{/if}}.", "Fee due.").unwrap();
        assert_eq!(value["express"], true);
    }

    #[test]
    fn items_without_this_are_null() {
        let value = parse("{{#ulist tags}}\n- item\n{{/ulist}}", "- item\n- item").unwrap();
        assert_eq!(value["tags"], json!([null, null]));
    }

    #[test]
    fn formulas_are_opaque() {
        let value = parse("Total {{% 1 + 2 %}} for {{buyer}}", "Total {{% 3 %}} for \"Ann\"").unwrap();
        assert_eq!(value["buyer"], "Ann");
    }

    #[test]
    fn enum_values_prefer_the_longest_match() {
        let values = vec!["S".to_string(), "SM".to_string(), "SMALL".to_string()];
        let parser = enum_variable(&EnumVariable {
            name: "size".into(),
            element_type: "Size".into(),
            enum_values: values,
            decorators: Vec::new(),
        })
        .then_ignore(end());
        let slots = parser.parse("SMALL").unwrap();
        assert_eq!(slots[0].value, Captured::Value(json!("SMALL")));
        assert!(parser.parse("SMA").is_err());
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        assert!(parse("{{buyer}}", "\"Ann\"\n\n").is_ok());
        assert!(parse("{{buyer}}", "\"Ann\" x").is_err());
    }
}

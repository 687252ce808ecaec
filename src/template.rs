//! Template syntax tree and the [`Template`] facade.
//!
//! The builder produces untyped [`Node`]s (every `element_type` is `None`);
//! [`crate::binding::bind`] turns them into a [`TypedTemplate`], which only this
//! crate can construct. A [`Template`] shares its typed tree through an `Arc`
//! and never mutates it again.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::sync::Arc;

use crate::doc::{self, markdown::Renderer, Element, ListKind};
use crate::error::Result;
use crate::formulas::FormulaSource;
use crate::model::{Decorator, SchemaAdapter};
use crate::parsing::{ParseOptions, TemplateParser};
use crate::registry::ParsingTable;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub element_type: Option<String>,
    pub format: Option<String>,
    /// Identifier field of the target when the property is a relationship.
    pub identified_by: Option<String>,
    pub decorators: Vec<Decorator>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            element_type: None,
            format: None,
            identified_by: None,
            decorators: Vec::new(),
        }
    }

    pub fn formatted(name: impl Into<String>, format: impl Into<String>) -> Self {
        Variable {
            format: Some(format.into()),
            ..Variable::new(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariable {
    pub name: String,
    pub element_type: String,
    pub enum_values: Vec<String>,
    pub decorators: Vec<Decorator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub name: String,
    pub code: String,
    /// Free identifiers of `code`, filled by the formula analyzer.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub name: String,
    /// Guard expression; without one the conditional reads a Boolean property.
    pub condition: Option<String>,
    pub when_true: Vec<Node>,
    pub when_false: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalBlock {
    pub name: String,
    pub element_type: Option<String>,
    pub when_some: Vec<Node>,
    pub when_none: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithBlock {
    pub name: String,
    pub element_type: Option<String>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListBlock {
    pub name: String,
    pub kind: ListKind,
    pub element_type: Option<String>,
    /// Template of a single item.
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinBlock {
    pub name: String,
    pub element_type: Option<String>,
    pub separator: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClauseBlock {
    pub name: String,
    pub element_type: Option<String>,
    pub src: Option<String>,
    pub condition: Option<String>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractBlock {
    pub element_type: Option<String>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Variable(Variable),
    EnumVariable(EnumVariable),
    Formula(Formula),
    Conditional(Conditional),
    Optional(OptionalBlock),
    With(WithBlock),
    List(ListBlock),
    Join(JoinBlock),
    Clause(ClauseBlock),
    Contract(ContractBlock),
    Markup(Element<Node>),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Markup(Element::Text { text: text.into() })
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Node::Markup(Element::Paragraph { children })
    }

    /// Name of the property or generated name the node is bound to.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Variable(v) => Some(&v.name),
            Node::EnumVariable(v) => Some(&v.name),
            Node::Formula(f) => Some(&f.name),
            Node::Conditional(c) => Some(&c.name),
            Node::Optional(o) => Some(&o.name),
            Node::With(w) => Some(&w.name),
            Node::List(l) => Some(&l.name),
            Node::Join(j) => Some(&j.name),
            Node::Clause(c) => Some(&c.name),
            Node::Contract(_) | Node::Markup(_) => None,
        }
    }

    /// Every child list, in document order.
    pub fn child_lists(&self) -> Vec<&[Node]> {
        match self {
            Node::Variable(_) | Node::EnumVariable(_) | Node::Formula(_) => Vec::new(),
            Node::Conditional(c) => vec![c.when_true.as_slice(), c.when_false.as_slice()],
            Node::Optional(o) => vec![o.when_some.as_slice(), o.when_none.as_slice()],
            Node::With(w) => vec![w.children.as_slice()],
            Node::List(l) => vec![l.children.as_slice()],
            Node::Join(j) => vec![j.children.as_slice()],
            Node::Clause(c) => vec![c.children.as_slice()],
            Node::Contract(c) => vec![c.children.as_slice()],
            Node::Markup(e) => vec![e.children()],
        }
    }

    /// Mutable counterpart of [`Node::child_lists`].
    pub(crate) fn child_lists_mut(&mut self) -> Vec<&mut Vec<Node>> {
        match self {
            Node::Variable(_) | Node::EnumVariable(_) | Node::Formula(_) => Vec::new(),
            Node::Conditional(c) => vec![&mut c.when_true, &mut c.when_false],
            Node::Optional(o) => vec![&mut o.when_some, &mut o.when_none],
            Node::With(w) => vec![&mut w.children],
            Node::List(l) => vec![&mut l.children],
            Node::Join(j) => vec![&mut j.children],
            Node::Clause(c) => vec![&mut c.children],
            Node::Contract(c) => vec![&mut c.children],
            Node::Markup(e) => match e {
                Element::Document { children, .. }
                | Element::Paragraph { children }
                | Element::Heading { children, .. }
                | Element::BlockQuote { children }
                | Element::List { children, .. }
                | Element::Item { children }
                | Element::Clause { children, .. }
                | Element::Emph { children }
                | Element::Strong { children } => vec![children],
                _ => Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Clause,
    Contract,
}

/// A template whose references have been resolved against a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedTemplate {
    kind: TemplateKind,
    element_type: String,
    root: Node,
}

impl TypedTemplate {
    pub(crate) fn new(kind: TemplateKind, element_type: String, root: Node) -> Self {
        TypedTemplate {
            kind,
            element_type,
            root,
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn element_type(&self) -> &str {
        &self.element_type
    }

    /// A `Clause` or `Contract` node wrapping the template body.
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }
}

/// A bound, analyzed template ready for parsing and drafting.
#[derive(Debug, Clone)]
pub struct Template {
    typed: Arc<TypedTemplate>,
}

impl Template {
    /// Read, bind and analyze template markup.
    pub fn from_markup(
        markup: &str,
        kind: TemplateKind,
        root_type: &str,
        schema: &dyn SchemaAdapter,
    ) -> Result<Self> {
        let nodes = crate::building::build(markup)?;
        Self::from_nodes(nodes, kind, root_type, schema)
    }

    /// Bind and analyze an already built node list.
    pub fn from_nodes(
        nodes: Vec<Node>,
        kind: TemplateKind,
        root_type: &str,
        schema: &dyn SchemaAdapter,
    ) -> Result<Self> {
        let typed = crate::binding::bind(nodes, schema, kind, root_type)?;
        let typed = crate::formulas::analyze(typed)?;
        Ok(Template {
            typed: Arc::new(typed),
        })
    }

    pub fn typed(&self) -> &TypedTemplate {
        &self.typed
    }

    pub fn kind(&self) -> TemplateKind {
        self.typed.kind()
    }

    pub fn formulas(&self) -> Vec<FormulaSource> {
        crate::formulas::collect(&self.typed)
    }

    /// Compile a parser for rendered text, using the current time for dates
    /// without a year.
    pub fn parser(&self, table: &ParsingTable) -> Result<TemplateParser> {
        self.parser_with(table, ParseOptions::now(table.settings()))
    }

    pub fn parser_with(&self, table: &ParsingTable, options: ParseOptions) -> Result<TemplateParser> {
        crate::parsing::compile(&self.typed, table, options)
    }

    /// One-shot parse; compile once with [`Template::parser`] to parse many texts.
    pub fn parse(&self, table: &ParsingTable, text: &str) -> Result<Value> {
        self.parser(table)?.parse(text)
    }

    pub fn draft(
        &self,
        table: &ParsingTable,
        data: &Value,
        now: DateTime<FixedOffset>,
    ) -> Result<doc::Node> {
        crate::drafting::draft(&self.typed, table, data, now)
    }

    pub fn draft_markdown(
        &self,
        table: &ParsingTable,
        data: &Value,
        now: DateTime<FixedOffset>,
    ) -> Result<String> {
        let document = self.draft(table, data, now)?;
        Ok(Renderer::new(table.settings()).render(&[document]))
    }
}

//! Type binder.
//!
//! Walks the untyped tree depth first with a cursor on the schema: the type
//! whose properties the current names refer to. A reference resolves to
//! exactly one property or binding fails. `this` names the cursor itself.
//!
//! Cursor rules:
//! - the true branch of a conditional keeps the cursor, the false branch has none
//! - the some-branch of an optional points at the optional property, the
//!   none-branch has none
//! - list and join children see the array's element, `with` and nested
//!   clause children the property's type

use crate::error::BindError;
use crate::model::{Decorator, Property, SchemaAdapter};
use crate::template::{
    ClauseBlock, Conditional, ContractBlock, EnumVariable, JoinBlock, ListBlock, Node,
    OptionalBlock, TemplateKind, TypedTemplate, Variable, WithBlock,
};

/// Identifier field of relationship targets that do not declare one.
pub const DEFAULT_IDENTIFIER: &str = "$identifier";

/// What a name resolved to.
#[derive(Debug, Clone)]
struct Target {
    type_name: String,
    array: bool,
    optional: bool,
    relationship: bool,
    decorators: Vec<Decorator>,
}

impl Target {
    fn of_type(type_name: &str, schema: &dyn SchemaAdapter) -> Self {
        Target {
            type_name: type_name.to_string(),
            array: false,
            optional: false,
            relationship: false,
            decorators: declared_decorators(type_name, schema),
        }
    }

    /// Property decorators come first, so they win over the declaration's.
    fn from_property(property: &Property, schema: &dyn SchemaAdapter) -> Self {
        let mut decorators = property.decorators.clone();
        decorators.extend(declared_decorators(property.element_type_name(), schema));
        Target {
            type_name: property.element_type_name().to_string(),
            array: property.is_array(),
            optional: property.is_optional(),
            relationship: property.is_relationship(),
            decorators,
        }
    }

    /// The value inside an array or optional.
    fn element(&self) -> Self {
        Target {
            array: false,
            optional: false,
            ..self.clone()
        }
    }
}

fn declared_decorators(type_name: &str, schema: &dyn SchemaAdapter) -> Vec<Decorator> {
    schema
        .declaration(type_name)
        .map(|declaration| declaration.decorators().to_vec())
        .unwrap_or_default()
}

/// Bind a template body against `root_type` and wrap it in its root node.
pub fn bind(
    nodes: Vec<Node>,
    schema: &dyn SchemaAdapter,
    kind: TemplateKind,
    root_type: &str,
) -> Result<TypedTemplate, BindError> {
    tracing::debug!(?kind, root_type, "binding template");
    let children = bind_fragment(nodes, schema, root_type)?;
    let root = match kind {
        TemplateKind::Clause => Node::Clause(ClauseBlock {
            name: root_type.to_string(),
            element_type: Some(root_type.to_string()),
            src: None,
            condition: None,
            children,
        }),
        TemplateKind::Contract => Node::Contract(ContractBlock {
            element_type: Some(root_type.to_string()),
            children,
        }),
    };
    Ok(TypedTemplate::new(kind, root_type.to_string(), root))
}

/// Bind nodes whose cursor is a value of `type_name`.
pub fn bind_fragment(
    nodes: Vec<Node>,
    schema: &dyn SchemaAdapter,
    type_name: &str,
) -> Result<Vec<Node>, BindError> {
    let declared = schema
        .declaration(type_name)
        .is_some_and(|declaration| !declaration.is_enum());
    if !declared {
        return Err(BindError::UnknownType(type_name.to_string()));
    }
    let binder = Binder { schema };
    binder.bind_nodes(nodes, Some(&Target::of_type(type_name, schema)))
}

struct Binder<'s> {
    schema: &'s dyn SchemaAdapter,
}

impl Binder<'_> {
    fn bind_nodes(&self, nodes: Vec<Node>, cursor: Option<&Target>) -> Result<Vec<Node>, BindError> {
        nodes
            .into_iter()
            .map(|node| self.bind_node(node, cursor))
            .collect()
    }

    fn bind_node(&self, node: Node, cursor: Option<&Target>) -> Result<Node, BindError> {
        Ok(match node {
            Node::Variable(variable) => self.bind_variable(variable, cursor)?,
            Node::EnumVariable(_) | Node::Formula(_) => node,
            Node::Conditional(conditional) => {
                if conditional.condition.is_none() {
                    let target = self.resolve(&conditional.name, cursor)?;
                    if target.array || target.type_name != "Boolean" {
                        return Err(BindError::NotBoolean(conditional.name));
                    }
                }
                Node::Conditional(Conditional {
                    when_true: self.bind_nodes(conditional.when_true, cursor)?,
                    when_false: self.bind_nodes(conditional.when_false, None)?,
                    ..conditional
                })
            }
            Node::Optional(optional) => {
                let target = self.resolve(&optional.name, cursor)?;
                if !target.optional {
                    return Err(BindError::NotOptional(optional.name));
                }
                let inner = Target {
                    optional: false,
                    ..target.clone()
                };
                Node::Optional(OptionalBlock {
                    element_type: Some(target.type_name),
                    when_some: self.bind_nodes(optional.when_some, Some(&inner))?,
                    when_none: self.bind_nodes(optional.when_none, None)?,
                    name: optional.name,
                })
            }
            Node::With(with) => {
                let target = self.resolve(&with.name, cursor)?;
                if target.array {
                    return Err(BindError::ArrayNotAllowed(with.name));
                }
                self.check_type(&target.type_name)?;
                let inner = target.element();
                Node::With(WithBlock {
                    children: self.bind_nodes(with.children, Some(&inner))?,
                    element_type: Some(target.type_name),
                    name: with.name,
                })
            }
            Node::List(list) => {
                let target = self.resolve(&list.name, cursor)?;
                if !target.array {
                    return Err(BindError::NotArray(list.name));
                }
                self.check_type(&target.type_name)?;
                let element = target.element();
                Node::List(ListBlock {
                    children: self.bind_nodes(list.children, Some(&element))?,
                    element_type: Some(target.type_name),
                    ..list
                })
            }
            Node::Join(join) => {
                let target = self.resolve(&join.name, cursor)?;
                if !target.array {
                    return Err(BindError::NotArray(join.name));
                }
                self.check_type(&target.type_name)?;
                let element = target.element();
                Node::Join(JoinBlock {
                    children: self.bind_nodes(join.children, Some(&element))?,
                    element_type: Some(target.type_name),
                    ..join
                })
            }
            Node::Clause(clause) => {
                let target = self.resolve(&clause.name, cursor)?;
                if target.array {
                    return Err(BindError::ArrayNotAllowed(clause.name));
                }
                self.check_type(&target.type_name)?;
                let inner = target.element();
                Node::Clause(ClauseBlock {
                    children: self.bind_nodes(clause.children, Some(&inner))?,
                    element_type: Some(target.type_name),
                    ..clause
                })
            }
            Node::Contract(contract) => Node::Contract(ContractBlock {
                element_type: cursor.map(|c| c.type_name.clone()),
                children: self.bind_nodes(contract.children, cursor)?,
            }),
            Node::Markup(element) => {
                Node::Markup(element.try_map(|children| self.bind_nodes(children, cursor))?)
            }
        })
    }

    fn bind_variable(&self, variable: Variable, cursor: Option<&Target>) -> Result<Node, BindError> {
        let target = self.resolve(&variable.name, cursor)?;
        if target.array {
            return Err(BindError::ArrayNotAllowed(variable.name));
        }
        if let Some(declaration) = self.schema.declaration(&target.type_name) {
            if declaration.is_enum() {
                tracing::trace!(name = %variable.name, r#type = %target.type_name, "bound enum variable");
                return Ok(Node::EnumVariable(EnumVariable {
                    name: variable.name,
                    element_type: target.type_name,
                    enum_values: declaration.enum_values.clone(),
                    decorators: target.decorators,
                }));
            }
        }
        self.check_type(&target.type_name)?;
        let identified_by = if target.relationship {
            let identifier = self
                .schema
                .declaration(&target.type_name)
                .and_then(|d| d.identified_by.clone())
                .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());
            Some(identifier)
        } else {
            None
        };
        let format = variable
            .format
            .or_else(|| Decorator::format(&target.decorators).map(str::to_string));
        tracing::trace!(name = %variable.name, r#type = %target.type_name, ?format, "bound variable");
        Ok(Node::Variable(Variable {
            name: variable.name,
            element_type: Some(target.type_name),
            format,
            identified_by,
            decorators: target.decorators,
        }))
    }

    fn resolve(&self, name: &str, cursor: Option<&Target>) -> Result<Target, BindError> {
        let unknown = || BindError::UnknownProperty(name.to_string());
        let cursor = cursor.ok_or_else(unknown)?;
        if name == "this" {
            return Ok(cursor.clone());
        }
        if cursor.array {
            return Err(unknown());
        }
        let declaration = self
            .schema
            .declaration(&cursor.type_name)
            .ok_or_else(unknown)?;
        let property = declaration.property(name).ok_or_else(unknown)?;
        Ok(Target::from_property(property, self.schema))
    }

    fn check_type(&self, type_name: &str) -> Result<(), BindError> {
        if self.schema.is_primitive(type_name) || self.schema.declaration(type_name).is_some() {
            Ok(())
        } else {
            Err(BindError::UnknownType(type_name.to_string()))
        }
    }
}

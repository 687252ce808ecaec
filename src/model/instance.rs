//! Placeholder instances.
//!
//! Draft mode walks the branch of an absent optional against a made-up value
//! of the right shape, so the branch is checked even though its output is
//! thrown away.

use serde_json::{json, Map, Value};

use super::{is_primitive_type, DeclarationKind, SchemaAdapter};

const MAX_DEPTH: usize = 8;

/// Build a minimal value of type `type_name`.
///
/// Optional properties are left out and arrays get a single element. Beyond a
/// fixed nesting depth compound values collapse to `null`, which keeps
/// recursive types finite.
pub fn placeholder(schema: &dyn SchemaAdapter, type_name: &str) -> Value {
    build(schema, type_name, 0)
}

fn build(schema: &dyn SchemaAdapter, type_name: &str, depth: usize) -> Value {
    if is_primitive_type(type_name) {
        return primitive(type_name);
    }
    if depth >= MAX_DEPTH {
        return Value::Null;
    }
    let Some(declaration) = schema.declaration(type_name) else {
        return Value::Null;
    };
    if declaration.kind == DeclarationKind::Enum {
        return declaration
            .enum_values
            .first()
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null);
    }
    let mut record = Map::new();
    record.insert("$class".to_string(), Value::String(declaration.name.clone()));
    for property in &declaration.properties {
        if property.optional || property.name.starts_with('$') {
            continue;
        }
        let value = if property.relationship {
            Value::String(format!("resource:{}#placeholder", property.type_name))
        } else {
            build(schema, &property.type_name, depth + 1)
        };
        let value = if property.array {
            Value::Array(vec![value])
        } else {
            value
        };
        record.insert(property.name.clone(), value);
    }
    Value::Object(record)
}

fn primitive(type_name: &str) -> Value {
    match type_name {
        "String" => json!("placeholder"),
        "Boolean" => json!(false),
        "Integer" | "Long" => json!(0),
        "Double" => json!(0.0),
        "DateTime" => json!("1970-01-01T00:00:00.000Z"),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declaration, Models, Property};

    #[test]
    fn fills_required_fields_only() {
        let models = Models::with_declarations([Declaration::concept(
            "Address",
            vec![
                Property::new("street", "String"),
                Property::new("floor", "Integer").optional(),
                Property::new("tags", "String").array(),
                Property::new("price", "MonetaryAmount"),
            ],
        )])
        .unwrap();
        assert_eq!(
            placeholder(&models, "Address"),
            json!({
                "$class": "Address",
                "street": "placeholder",
                "tags": ["placeholder"],
                "price": {"$class": "MonetaryAmount", "doubleValue": 0.0, "currencyCode": "USD"}
            })
        );
    }

    #[test]
    fn recursive_types_terminate() {
        let models = Models::with_declarations([Declaration::concept(
            "Node",
            vec![Property::new("next", "Node")],
        )])
        .unwrap();
        let mut value = &placeholder(&models, "Node");
        let mut depth = 0;
        while let Some(next) = value.get("next") {
            value = next;
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert!(value.is_null());
    }
}

//! End-to-end behaviour of single clauses: parse rendered text, draft from data.

use chrono::DateTime;
use clausemark::error::Error;
use clausemark::{Declaration, Models, ParsingTable, Property, Template, TemplateKind};
use rstest::rstest;
use serde_json::{json, Value};
use std::sync::Arc;

const SALE: &str = "Between {{seller}} and {{buyer}} for {{amount}} {{currency}}";

fn models() -> Models {
    Models::with_declarations([
        Declaration::concept(
            "Sale",
            vec![
                Property::new("seller", "String"),
                Property::new("buyer", "String"),
                Property::new("amount", "Double"),
                Property::new("currency", "Currency"),
            ],
        ),
        Declaration::enumeration("Currency", &["USD", "GBP", "EUR"]),
        Declaration::concept("Numbers", vec![Property::new("items", "Item").array()]),
        Declaration::concept("Item", vec![Property::new("n", "Integer")]),
        Declaration::concept("Payment", vec![Property::new("late", "Boolean")]),
    ])
    .unwrap()
}

fn setup(markup: &str, root: &str) -> (Template, ParsingTable) {
    let models = models();
    let template = Template::from_markup(markup, TemplateKind::Clause, root, &models).unwrap();
    (template, ParsingTable::new(Arc::new(models)))
}

fn now() -> DateTime<chrono::FixedOffset> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap()
}

#[test]
fn parses_variables_and_enums() {
    let (template, table) = setup(SALE, "Sale");
    let value = template
        .parse(&table, r#"Between "A" and "B" for 10.00 EUR"#)
        .unwrap();
    assert_eq!(value["$class"], "Sale");
    assert_eq!(value["seller"], "A");
    assert_eq!(value["buyer"], "B");
    assert_eq!(value["amount"], 10.0);
    assert_eq!(value["currency"], "EUR");
    assert!(value["clauseId"].is_string());
}

#[test]
fn unknown_enum_value_is_reported_at_the_token() {
    let (template, table) = setup(SALE, "Sale");
    let text = r#"Between "A" and "B" for 10.00 ZZZ"#;
    let err = template.parse(&table, text).unwrap_err();
    let Error::Parse(err) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    let offset = text.find("ZZZ").unwrap();
    assert_eq!(err.position.offset, offset);
    assert_eq!((err.position.line, err.position.column), (1, offset + 1));
}

#[test]
fn list_items_become_records() {
    let (template, table) = setup("{{#ulist items}}\n- {{n}}\n{{/ulist}}", "Numbers");
    let value = template.parse(&table, "- 1\n- 2\n- 3").unwrap();
    assert_eq!(
        value["items"],
        json!([
            {"$class": "Item", "n": 1},
            {"$class": "Item", "n": 2},
            {"$class": "Item", "n": 3}
        ])
    );
}

#[rstest]
#[case(false, "Payment is due.")]
#[case(true, "Payment is due, with a late fee.")]
fn conditional_with_empty_false_branch(#[case] late: bool, #[case] expected: &str) {
    let (template, table) = setup("Payment is due{{#if late}}, with a late fee{{/if}}.", "Payment");
    let text = template
        .draft_markdown(&table, &json!({"$class": "Payment", "late": late}), now())
        .unwrap();
    assert_eq!(text, expected);
    let value = template.parse(&table, &text).unwrap();
    assert_eq!(value["late"], late);
}

#[rstest]
#[case(r#"Between "A" and "B" for 10.00"#)]
#[case(r#"Between A and "B" for 10.00 EUR"#)]
#[case(r#"Between "A" and "B" for ten EUR"#)]
#[case(r#"Between "A" and "B" for 10.00 EUR and more"#)]
fn malformed_texts_are_rejected(#[case] text: &str) {
    let (template, table) = setup(SALE, "Sale");
    assert!(matches!(template.parse(&table, text), Err(Error::Parse(_))));
}

#[test]
fn drafted_text_parses_back() {
    let (template, table) = setup(SALE, "Sale");
    let data = json!({
        "$class": "Sale",
        "seller": "Acme \"Widgets\"",
        "buyer": "Bob",
        "amount": 99.5,
        "currency": "GBP"
    });
    let text = template.draft_markdown(&table, &data, now()).unwrap();
    assert_eq!(text, r#"Between "Acme \"Widgets\"" and "Bob" for 99.5 GBP"#);
    let mut value = template.parse(&table, &text).unwrap();
    value.as_object_mut().unwrap().remove("clauseId");
    assert_eq!(value, data);
}

#[test]
fn drafting_reports_missing_data() {
    let (template, table) = setup(SALE, "Sale");
    let err = template
        .draft(&table, &json!({"seller": "A", "amount": 1.0, "currency": "USD"}), now())
        .unwrap_err();
    assert_eq!(err.kind(), clausemark::ErrorKind::Draft);
    assert_eq!(err.to_string(), "missing value for `buyer`");
    assert!(matches!(
        template.draft(&table, &Value::Null, now()),
        Err(Error::Draft(_))
    ));
}

#[test]
fn binding_rejects_unknown_properties() {
    let err = Template::from_markup("{{nobody}}", TemplateKind::Clause, "Sale", &models()).unwrap_err();
    assert_eq!(err.kind(), clausemark::ErrorKind::Bind);
}

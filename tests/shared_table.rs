//! One parsing table shared by many threads.

use clausemark::registry::Entry;
use clausemark::{Declaration, Models, ParsingTable, Property, Template, TemplateKind};
use std::sync::Arc;
use std::thread;

fn models() -> Models {
    Models::with_declarations([
        Declaration::concept(
            "Invoice",
            vec![
                Property::new("customer", "Party"),
                Property::new("total", "Double").decorated("Format", &["0,0.00"]),
                Property::new("due", "DateTime").decorated("Format", &["DD/MM/YYYY"]),
            ],
        ),
        Declaration::concept(
            "Party",
            vec![
                Property::new("name", "String"),
                Property::new("vat", "String").optional(),
            ],
        ),
    ])
    .unwrap()
}

#[test]
fn threads_share_compiled_entries() {
    let models = models();
    let template = Template::from_markup(
        "Invoice for {{customer}}: {{total}} due {{due}}",
        TemplateKind::Clause,
        "Invoice",
        &models,
    )
    .unwrap();
    let table = Arc::new(ParsingTable::new(Arc::new(models)));

    let handles: Vec<_> = (0..8)
        .map(|index| {
            let table = Arc::clone(&table);
            let template = template.clone();
            thread::spawn(move || {
                let text = format!(
                    "Invoice for name \"C{index}\": 1,000.0{index} due 0{}/02/2024",
                    index + 1
                );
                let parser = template.parser(&table).unwrap();
                let value = parser.parse(&text).unwrap();
                assert_eq!(value["customer"]["name"], format!("C{index}"));
                (
                    table.entry("Double", Some("0,0.00")).unwrap(),
                    table.entry("Party", None).unwrap(),
                )
            })
        })
        .collect();
    let entries: Vec<(Entry, Entry)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(entries
        .windows(2)
        .all(|pair| pair[0].0.ptr_eq(&pair[1].0) && pair[0].1.ptr_eq(&pair[1].1)));
    // Double, DateTime, Party and the String inside Party.
    assert_eq!(table.len(), 4);
}

#[test]
fn one_parser_parses_many_texts() {
    let models = models();
    let template = Template::from_markup(
        "{{customer}} owes {{total}}",
        TemplateKind::Clause,
        "Invoice",
        &models,
    )
    .unwrap();
    let table = ParsingTable::new(Arc::new(models));
    let parser = template.parser(&table).unwrap();
    let first = parser.parse("name \"A\" owes 1.00").unwrap();
    let second = parser.parse("name \"B\", vat \"X1\" owes 2,500.25").unwrap();
    assert_eq!(first["total"], 1.0);
    assert_eq!(second["customer"]["vat"], "X1");
    assert_eq!(second["total"], 2500.25);
    assert_ne!(first["clauseId"], second["clauseId"]);
}

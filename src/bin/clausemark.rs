//! Command-line interface for clausemark
//! Parses rendered clauses back into JSON, drafts clauses from JSON and lists template formulas.
//!
//! Usage:
//!   clausemark parse `<text>` --template `<file>` --model `<file>` --type `<Type>`
//!   clausemark draft `<data>` --template `<file>` --model `<file>` --type `<Type>` [--format `<format>`]
//!   clausemark formulas --template `<file>` --model `<file>` --type `<Type>`
//!
//! Every subcommand also takes `--config <file>` and repeatable `--set key=value` overrides.

use chrono::{FixedOffset, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use clausemark::{Loader, Models, ParsingTable, Settings, Template, TemplateKind};
use std::path::Path;
use std::sync::Arc;

const LOCAL_CONFIG: &str = "clausemark.toml";

fn template_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("template")
                .long("template")
                .short('t')
                .help("Path to the template markup")
                .required(true),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .short('m')
                .help("Path to the schema (.json, .yaml or .yml)")
                .required(true),
        )
        .arg(
            Arg::new("type")
                .long("type")
                .help("Name of the template's root type")
                .required(true),
        )
        .arg(
            Arg::new("contract")
                .long("contract")
                .help("Treat the template as a contract rather than a clause")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file layered over the built-in defaults (default: ./clausemark.toml if present)"),
        )
        .arg(
            Arg::new("set")
                .long("set")
                .value_name("KEY=VALUE")
                .help("Override one setting, e.g. parsing.utc_offset_minutes=60")
                .action(ArgAction::Append),
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let matches = Command::new("clausemark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parse and draft documents with clause templates")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(template_args(
            Command::new("parse").about("Extract the data of a rendered text").arg(
                Arg::new("path")
                    .help("Path to the rendered text")
                    .required(true)
                    .index(1),
            ),
        ))
        .subcommand(template_args(
            Command::new("draft")
                .about("Draft a text from JSON data")
                .arg(
                    Arg::new("path")
                        .help("Path to the JSON data")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format ('markdown' or 'json')")
                        .default_value("markdown"),
                ),
        ))
        .subcommand(template_args(
            Command::new("formulas").about("List the formulas of a template"),
        ))
        .get_matches();

    match matches.subcommand() {
        Some(("parse", parse_matches)) => handle_parse_command(parse_matches),
        Some(("draft", draft_matches)) => handle_draft_command(draft_matches),
        Some(("formulas", formulas_matches)) => handle_formulas_command(formulas_matches),
        _ => unreachable!(),
    }
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, error);
    std::process::exit(1);
}

fn read(path: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("Error reading {}", path), e))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_else(|| fail("Missing argument", name))
}

fn load_settings(matches: &ArgMatches) -> Settings {
    let mut loader = match matches.get_one::<String>("config") {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new().with_optional_file(LOCAL_CONFIG),
    };
    for assignment in matches.get_many::<String>("set").into_iter().flatten() {
        loader = loader
            .with_assignment(assignment)
            .unwrap_or_else(|e| fail("Configuration error", e));
    }
    loader
        .build()
        .unwrap_or_else(|e| fail("Configuration error", e))
}

fn load_models(path: &str) -> Models {
    let text = read(path);
    let yaml = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    let models = if yaml {
        Models::from_yaml(&text)
    } else {
        Models::from_json(&text)
    };
    models.unwrap_or_else(|e| fail("Model error", e))
}

/// Template, schema and table shared by every subcommand.
fn load(matches: &ArgMatches) -> (Template, ParsingTable) {
    let settings = load_settings(matches);
    let models = load_models(required(matches, "model"));
    let kind = if matches.get_flag("contract") {
        TemplateKind::Contract
    } else {
        TemplateKind::Clause
    };
    let markup = read(required(matches, "template"));
    let template = Template::from_markup(&markup, kind, required(matches, "type"), &models)
        .unwrap_or_else(|e| fail("Template error", e));
    let table = ParsingTable::with_settings(Arc::new(models), settings);
    (template, table)
}

fn print_json(value: &impl serde::Serialize) {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| fail("Output error", e));
    println!("{}", text);
}

/// Handle the parse command
fn handle_parse_command(matches: &ArgMatches) {
    let (template, table) = load(matches);
    let text = read(required(matches, "path"));
    let data = template
        .parse(&table, &text)
        .unwrap_or_else(|e| fail("Parse error", e));
    print_json(&data);
}

/// Handle the draft command
fn handle_draft_command(matches: &ArgMatches) {
    let (template, table) = load(matches);
    let data: serde_json::Value = serde_json::from_str(&read(required(matches, "path")))
        .unwrap_or_else(|e| fail("Invalid JSON data", e));
    let offset = FixedOffset::east_opt(table.settings().parsing.utc_offset_minutes * 60)
        .unwrap_or_else(|| fail("Configuration error", "UTC offset out of range"));
    let now = Utc::now().with_timezone(&offset);
    match required(matches, "format") {
        "markdown" => {
            let text = template
                .draft_markdown(&table, &data, now)
                .unwrap_or_else(|e| fail("Draft error", e));
            println!("{}", text);
        }
        "json" => {
            let document = template
                .draft(&table, &data, now)
                .unwrap_or_else(|e| fail("Draft error", e));
            print_json(&document);
        }
        other => {
            eprintln!("Format '{}' not supported", other);
            eprintln!("Available formats: markdown, json");
            std::process::exit(1);
        }
    }
}

/// Handle the formulas command
fn handle_formulas_command(matches: &ArgMatches) {
    let (template, _) = load(matches);
    print_json(&template.formulas());
}

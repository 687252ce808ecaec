//! Monetary amount formats.
//!
//! A format combines one number pattern (as for doubles) with `CCC` (the ISO
//! currency code) and/or `K` (the currency symbol), e.g. `0,0.00 CCC` or
//! `K0,0.00`. Values are `MonetaryAmount` objects.

use chumsky::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::alternatives;
use super::number::NumberFormat;
use crate::model::builtin::{self, CURRENCY_SYMBOLS, MONETARY_AMOUNT};
use crate::parsing::TextParser;

pub const DEFAULT_FORMAT: &str = "0,0.00 CCC";

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CCC|K|0[^0-9CK]0[^0-9CK]0+|0[^0-9CK]0+|0").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Amount(NumberFormat),
    Code,
    Symbol,
}

#[derive(Debug, Clone)]
enum Part {
    Nothing,
    Amount(f64),
    Code(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonetaryFormat {
    tokens: Vec<Token>,
}

impl MonetaryFormat {
    pub fn compile(format: Option<&str>) -> Result<Self, String> {
        let format = format.unwrap_or(DEFAULT_FORMAT);
        let mut tokens = Vec::new();
        let mut last = 0;
        for found in TOKEN.find_iter(format) {
            if found.start() > last {
                tokens.push(Token::Literal(format[last..found.start()].to_string()));
            }
            tokens.push(match found.as_str() {
                "CCC" => Token::Code,
                "K" => Token::Symbol,
                number => Token::Amount(NumberFormat::double(Some(number))?),
            });
            last = found.end();
        }
        if last < format.len() {
            tokens.push(Token::Literal(format[last..].to_string()));
        }

        let amounts = tokens
            .iter()
            .filter(|t| matches!(t, Token::Amount(_)))
            .count();
        if amounts != 1 {
            return Err(format!("expected one amount pattern, found {amounts}"));
        }
        if !tokens.iter().any(|t| matches!(t, Token::Code | Token::Symbol)) {
            return Err("expected `CCC` or `K`".to_string());
        }
        Ok(MonetaryFormat { tokens })
    }

    pub(crate) fn parser(&self) -> TextParser<Value> {
        let mut parts: TextParser<Vec<Part>> = empty().to(Vec::new()).boxed();
        for token in &self.tokens {
            let part = match token {
                Token::Literal(text) => just(text.clone()).to(Part::Nothing).boxed(),
                Token::Amount(number) => number.double_parser().map(Part::Amount).boxed(),
                Token::Code => alternatives(
                    builtin::currency_codes().map(|code| just(code).to(Part::Code(code)).boxed()),
                ),
                Token::Symbol => alternatives(
                    CURRENCY_SYMBOLS
                        .iter()
                        .map(|&(code, symbol)| just(symbol).to(Part::Code(code)).boxed()),
                ),
            };
            parts = parts
                .then(part)
                .map(|(mut parts, part)| {
                    parts.push(part);
                    parts
                })
                .boxed();
        }
        parts.try_map(|parts, span| assemble(parts).map_err(|m| Simple::custom(span, m))).boxed()
    }

    pub fn draft(&self, value: &Value) -> Result<String, String> {
        let amount = value
            .get("doubleValue")
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("{value} has no doubleValue"))?;
        let code = value
            .get("currencyCode")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("{value} has no currencyCode"))?;
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Amount(number) => out.push_str(&number.draft_double(amount)),
                Token::Code => out.push_str(code),
                Token::Symbol => out.push_str(
                    builtin::symbol_for(code).ok_or_else(|| format!("no symbol for {code}"))?,
                ),
            }
        }
        Ok(out)
    }
}

fn assemble(parts: Vec<Part>) -> Result<Value, String> {
    let mut amount = None;
    let mut code: Option<&str> = None;
    for part in parts {
        match part {
            Part::Nothing => {}
            Part::Amount(value) => amount = Some(value),
            Part::Code(found) => match code {
                Some(previous) if previous != found => {
                    return Err(format!("currency {found} contradicts {previous}"))
                }
                _ => code = Some(found),
            },
        }
    }
    let amount = amount.ok_or("missing amount")?;
    let code = code.ok_or("missing currency")?;
    Ok(json!({
        "$class": MONETARY_AMOUNT,
        "doubleValue": amount,
        "currencyCode": code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn money(amount: f64, code: &str) -> Value {
        json!({"$class": MONETARY_AMOUNT, "doubleValue": amount, "currencyCode": code})
    }

    fn parse(format: &str, text: &str) -> Option<Value> {
        MonetaryFormat::compile(Some(format))
            .unwrap()
            .parser()
            .then_ignore(end())
            .parse(text)
            .ok()
    }

    #[rstest]
    #[case(DEFAULT_FORMAT, money(1234.5, "USD"), "1,234.50 USD")]
    #[case("K0,0.00", money(99.0, "EUR"), "€99.00")]
    #[case("0.0,00 K (CCC)", money(-12.25, "GBP"), "-12,25 £ (GBP)")]
    #[case("CCC 0", money(500.0, "JPY"), "JPY 500")]
    fn drafts_and_parses(#[case] format: &str, #[case] value: Value, #[case] text: &str) {
        let compiled = MonetaryFormat::compile(Some(format)).unwrap();
        assert_eq!(compiled.draft(&value).unwrap(), text);
        assert_eq!(parse(format, text), Some(value));
    }

    #[test]
    fn symbol_and_code_must_agree() {
        assert_eq!(parse("K0 CCC", "$10 EUR"), None);
    }

    #[test]
    fn symbol_alone_names_the_currency() {
        assert_eq!(parse("K0.00", "¥3.00"), Some(money(3.0, "JPY")));
    }

    #[rstest]
    #[case("0.00")]
    #[case("CCC")]
    #[case("0.00 K 0")]
    fn rejects_incomplete_formats(#[case] format: &str) {
        assert!(MonetaryFormat::compile(Some(format)).is_err());
    }

    #[test]
    fn unknown_code_fails_to_parse() {
        assert_eq!(parse(DEFAULT_FORMAT, "1.00 XYZ"), None);
    }
}

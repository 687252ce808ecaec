//! Number formats.
//!
//! Integers accept `0` or `0<g>0` (grouping separator `g`). Doubles accept
//! `0`, `0<d>0…` (decimal separator and places) and `0<g>0<d>0…`; without a
//! format a double is a plain decimal and integral values draft as `10.0`.

use chumsky::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use crate::parsing::TextParser;

static INTEGER_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0(?:([^0-9])0)?$").unwrap());
static DECIMAL_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0(?:([^0-9])(0+))?$").unwrap());
static GROUPED_DECIMAL_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0([^0-9])0([^0-9])(0+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decimal {
    separator: char,
    places: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    integral: bool,
    /// `None` is the plain, unformatted layout.
    layout: Option<(Option<char>, Option<Decimal>)>,
}

fn single_char(text: &str) -> char {
    text.chars().next().unwrap_or_default()
}

impl NumberFormat {
    pub fn integer(format: Option<&str>) -> Result<Self, String> {
        let Some(format) = format else {
            return Ok(NumberFormat {
                integral: true,
                layout: None,
            });
        };
        let captures = INTEGER_FORMAT
            .captures(format)
            .ok_or_else(|| "expected `0` or `0,0`".to_string())?;
        let grouping = captures.get(1).map(|m| single_char(m.as_str()));
        Ok(NumberFormat {
            integral: true,
            layout: Some((grouping, None)),
        })
    }

    pub fn double(format: Option<&str>) -> Result<Self, String> {
        let Some(format) = format else {
            return Ok(NumberFormat {
                integral: false,
                layout: None,
            });
        };
        let (grouping, decimal) = if let Some(c) = DECIMAL_FORMAT.captures(format) {
            let decimal = c.get(1).zip(c.get(2)).map(|(separator, places)| Decimal {
                separator: single_char(separator.as_str()),
                places: places.as_str().len(),
            });
            (None, decimal)
        } else if let Some(c) = GROUPED_DECIMAL_FORMAT.captures(format) {
            let grouping = single_char(&c[1]);
            let separator = single_char(&c[2]);
            if grouping == separator {
                return Err("grouping and decimal separators must differ".to_string());
            }
            let decimal = Decimal {
                separator,
                places: c[3].len(),
            };
            (Some(grouping), Some(decimal))
        } else {
            return Err("expected `0`, `0.00` or `0,0.00`".to_string());
        };
        Ok(NumberFormat {
            integral: false,
            layout: Some((grouping, decimal)),
        })
    }

    /// Parser for the integer part, sign included, as plain digits.
    fn integer_digits(&self) -> TextParser<String> {
        let sign = just('-').or_not();
        let grouping = self.layout.and_then(|(grouping, _)| grouping);
        let digits = match grouping {
            None => digits().collect::<String>().boxed(),
            Some(separator) => digit()
                .repeated()
                .at_least(1)
                .at_most(3)
                .chain::<char, _, _>(
                    just(separator)
                        .ignore_then(digit().repeated().exactly(3))
                        .repeated()
                        .flatten(),
                )
                .collect::<String>()
                .boxed(),
        };
        sign.then(digits)
            .map(|(sign, digits)| match sign {
                Some(_) => format!("-{digits}"),
                None => digits,
            })
            .boxed()
    }

    pub(crate) fn integer_parser(&self) -> TextParser<Value> {
        self.integer_digits()
            .try_map(|text, span| {
                text.parse::<i64>()
                    .map(Value::from)
                    .map_err(|e| Simple::custom(span, format!("invalid integer: {e}")))
            })
            .boxed()
    }

    pub(crate) fn double_parser(&self) -> TextParser<f64> {
        let text = match self.layout {
            None => {
                let fraction = just('.')
                    .chain::<char, _, _>(digits())
                    .or_not()
                    .map(Option::unwrap_or_default);
                let exponent = one_of("eE")
                    .chain::<char, _, _>(one_of("+-").or_not())
                    .chain::<char, _, _>(digits())
                    .or_not()
                    .map(Option::unwrap_or_default);
                just('-')
                    .or_not()
                    .chain::<char, _, _>(digits())
                    .chain::<char, _, _>(fraction)
                    .chain::<char, _, _>(exponent)
                    .collect::<String>()
                    .boxed()
            }
            Some((_, decimal)) => {
                let fraction = match decimal {
                    Some(decimal) => just(decimal.separator)
                        .ignore_then(digits())
                        .collect::<String>()
                        .map(|digits| format!(".{digits}"))
                        .boxed(),
                    None => empty().to(String::new()).boxed(),
                };
                self.integer_digits()
                    .then(fraction)
                    .map(|(integer, fraction)| integer + &fraction)
                    .boxed()
            }
        };
        text.try_map(|text, span| {
            text.parse::<f64>()
                .map_err(|e| Simple::custom(span, format!("invalid number: {e}")))
        })
        .boxed()
    }

    pub(crate) fn parser(&self) -> TextParser<Value> {
        if self.integral {
            return self.integer_parser();
        }
        self.double_parser()
            .try_map(|value, span| {
                Number::from_f64(value)
                    .map(Value::Number)
                    .ok_or_else(|| Simple::custom(span, "number out of range"))
            })
            .boxed()
    }

    pub fn draft(&self, value: &Value) -> Result<String, String> {
        if self.integral {
            let integer = value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|f| f.fract() == 0.0 && I64_RANGE.contains(f))
                        .map(|f| f as i64)
                })
                .ok_or_else(|| format!("{value} is not an integer"))?;
            return Ok(self.draft_integer(integer));
        }
        let double = value
            .as_f64()
            .ok_or_else(|| format!("{value} is not a number"))?;
        Ok(self.draft_double(double))
    }

    fn draft_integer(&self, value: i64) -> String {
        let grouping = self.layout.and_then(|(grouping, _)| grouping);
        let digits = group(&value.unsigned_abs().to_string(), grouping);
        if value < 0 {
            format!("-{digits}")
        } else {
            digits
        }
    }

    pub(crate) fn draft_double(&self, value: f64) -> String {
        let Some((grouping, decimal)) = self.layout else {
            return if value.fract() == 0.0 && value.abs() < 1e15 {
                format!("{value:.1}")
            } else {
                format!("{value}")
            };
        };
        let places = decimal.map_or(0, |d| d.places);
        let text = format!("{:.*}", places, value.abs());
        let (integer, fraction) = text.split_once('.').unwrap_or((&text, ""));
        let mut out = String::new();
        if value < 0.0 && text.chars().any(|c| c != '0' && c != '.') {
            out.push('-');
        }
        out.push_str(&group(integer, grouping));
        if let Some(decimal) = decimal {
            out.push(decimal.separator);
            out.push_str(fraction);
        }
        out
    }
}

/// Floats that convert to `i64` exactly; `i64::MAX as f64` is already 2^63.
const I64_RANGE: std::ops::Range<f64> = i64::MIN as f64..i64::MAX as f64;

fn digit() -> impl Parser<char, char, Error = Simple<char>> + Clone {
    filter(|c: &char| c.is_ascii_digit())
}

fn digits() -> impl Parser<char, Vec<char>, Error = Simple<char>> + Clone {
    digit().repeated().at_least(1)
}

/// Insert `separator` between groups of three digits, from the right.
fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, c) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn parse(format: &NumberFormat, text: &str) -> Option<Value> {
        format.parser().then_ignore(end()).parse(text).ok()
    }

    #[rstest]
    #[case(None, json!(1234567), "1234567")]
    #[case(Some("0,0"), json!(1234567), "1,234,567")]
    #[case(Some("0 0"), json!(-1000), "-1 000")]
    #[case(Some("0,0"), json!(999), "999")]
    fn integers(#[case] format: Option<&str>, #[case] value: Value, #[case] text: &str) {
        let format = NumberFormat::integer(format).unwrap();
        assert_eq!(format.draft(&value).unwrap(), text);
        assert_eq!(parse(&format, text), Some(value));
    }

    #[rstest]
    #[case(None, json!(10.0), "10.0")]
    #[case(None, json!(2.5), "2.5")]
    #[case(Some("0.00"), json!(3.5), "3.50")]
    #[case(Some("0,0.00"), json!(1234567.891), "1,234,567.89")]
    #[case(Some("0.0,00"), json!(-1234.5), "-1.234,50")]
    #[case(Some("0"), json!(42.0), "42")]
    fn doubles(#[case] format: Option<&str>, #[case] value: Value, #[case] text: &str) {
        let format = NumberFormat::double(format).unwrap();
        assert_eq!(format.draft(&value).unwrap(), text);
        assert!(parse(&format, text).is_some());
    }

    #[test]
    fn default_double_accepts_exponents() {
        let format = NumberFormat::double(None).unwrap();
        assert_eq!(parse(&format, "1.5e3"), Some(json!(1500.0)));
        assert_eq!(parse(&format, "10.00"), Some(json!(10.0)));
    }

    #[test]
    fn grouped_integers_require_full_groups() {
        let format = NumberFormat::integer(Some("0,0")).unwrap();
        assert_eq!(parse(&format, "1,23"), None);
        assert_eq!(parse(&format, "1234"), None);
    }

    #[rstest]
    #[case("0.0.0")]
    #[case("#,##0")]
    #[case("0,0,00")]
    fn rejects_malformed_double_formats(#[case] format: &str) {
        assert!(NumberFormat::double(Some(format)).is_err());
    }

    #[test]
    fn rejects_non_integers() {
        let format = NumberFormat::integer(None).unwrap();
        assert!(format.draft(&json!(1.5)).is_err());
        assert!(format.draft(&json!("1")).is_err());
    }

    #[test]
    fn integers_beyond_i64_are_not_truncated() {
        let format = NumberFormat::integer(None).unwrap();
        assert_eq!(format.draft(&json!(3.0)), Ok("3".to_string()));
        assert!(format.draft(&json!(1e20)).is_err());
        assert!(format.draft(&json!(-1e20)).is_err());
    }

    proptest! {
        #[test]
        fn grouped_integer_round_trip(value in prop::num::i64::ANY) {
            let format = NumberFormat::integer(Some("0,0")).unwrap();
            let text = format.draft(&json!(value)).unwrap();
            prop_assert_eq!(parse(&format, &text), Some(json!(value)));
        }

        #[test]
        fn two_place_double_round_trip(cents in -10_000_000_000i64..10_000_000_000i64) {
            let value = cents as f64 / 100.0;
            let format = NumberFormat::double(Some("0,0.00")).unwrap();
            let text = format.draft(&json!(value)).unwrap();
            let parsed = parse(&format, &text).and_then(|v| v.as_f64()).unwrap();
            prop_assert!((parsed - value).abs() < 1e-9);
        }

        #[test]
        fn default_double_round_trip(value in -1e12f64..1e12f64) {
            let format = NumberFormat::double(None).unwrap();
            let text = format.draft(&json!(value)).unwrap();
            prop_assert_eq!(parse(&format, &text), Some(json!(value)));
        }
    }
}

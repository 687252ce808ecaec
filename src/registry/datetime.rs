//! Date-time formats.
//!
//! A format is a sequence of tokens (`YYYY`, `MM`, `D`, `MMMM`, `HH`, `hh`,
//! `A`, `mm`, `ss`, `SSS`, `Z`, …) and literal text; `[...]` escapes a
//! literal. Parsed values are RFC 3339 strings with millisecond precision.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Timelike};
use chumsky::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::alternatives;
use super::scalar::ScalarContext;
use crate::parsing::TextParser;

pub const DEFAULT_FORMAT: &str = "YYYY-MM-DDTHH:mm:ss.SSSZ";

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|YYYY|YY|MMMM|MMM|MM|M|DD|D|HH|H|hh|h|mm|ss|SSS|Z|A|a").unwrap()
});

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    Hour,
    Hour12,
    Minute,
    Second,
    Millis,
    Offset,
    Pm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    FullYear,
    ShortYear,
    MonthName,
    MonthAbbr,
    Month { padded: bool },
    Day { padded: bool },
    Hour { padded: bool },
    Hour12 { padded: bool },
    Minute,
    Second,
    Millis,
    Offset,
    Meridiem { upper: bool },
}

impl Token {
    fn from_match(text: &str) -> Token {
        match text {
            "YYYY" => Token::FullYear,
            "YY" => Token::ShortYear,
            "MMMM" => Token::MonthName,
            "MMM" => Token::MonthAbbr,
            "MM" => Token::Month { padded: true },
            "M" => Token::Month { padded: false },
            "DD" => Token::Day { padded: true },
            "D" => Token::Day { padded: false },
            "HH" => Token::Hour { padded: true },
            "H" => Token::Hour { padded: false },
            "hh" => Token::Hour12 { padded: true },
            "h" => Token::Hour12 { padded: false },
            "mm" => Token::Minute,
            "ss" => Token::Second,
            "SSS" => Token::Millis,
            "Z" => Token::Offset,
            "A" => Token::Meridiem { upper: true },
            "a" => Token::Meridiem { upper: false },
            escaped => Token::Literal(escaped.trim_start_matches('[').trim_end_matches(']').into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeFormat {
    tokens: Vec<Token>,
}

impl DateTimeFormat {
    pub fn compile(format: Option<&str>) -> Result<Self, String> {
        let format = format.unwrap_or(DEFAULT_FORMAT);
        let mut tokens = Vec::new();
        let mut last = 0;
        for found in TOKEN.find_iter(format) {
            if found.start() > last {
                tokens.push(Token::Literal(format[last..found.start()].to_string()));
            }
            tokens.push(Token::from_match(found.as_str()));
            last = found.end();
        }
        if last < format.len() {
            tokens.push(Token::Literal(format[last..].to_string()));
        }
        tokens.retain(|token| !matches!(token, Token::Literal(text) if text.is_empty()));

        let has = |wanted: fn(&Token) -> bool| tokens.iter().any(wanted);
        if !has(|t| !matches!(t, Token::Literal(_))) {
            return Err("a date-time format needs at least one field".to_string());
        }
        if has(|t| matches!(t, Token::Hour12 { .. })) && !has(|t| matches!(t, Token::Meridiem { .. }))
        {
            return Err("12-hour clock needs `A` or `a`".to_string());
        }
        Ok(DateTimeFormat { tokens })
    }

    pub(crate) fn parser(&self, context: &ScalarContext) -> TextParser<Value> {
        let mut fields: TextParser<Vec<(Field, i64)>> = empty().to(Vec::new()).boxed();
        for token in &self.tokens {
            fields = fields
                .then(token_parser(token))
                .map(|(mut fields, field)| {
                    fields.extend(field);
                    fields
                })
                .boxed();
        }
        let context = *context;
        fields
            .try_map(move |fields, span| {
                assemble(&fields, &context)
                    .map(|date| Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
                    .map_err(|message| Simple::custom(span, message))
            })
            .boxed()
    }

    pub fn draft(&self, value: &Value) -> Result<String, String> {
        let text = value
            .as_str()
            .ok_or_else(|| format!("{value} is not a date-time string"))?;
        let date = DateTime::parse_from_rfc3339(text).map_err(|e| format!("{text:?}: {e}"))?;
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::FullYear => out.push_str(&format!("{:04}", date.year())),
                Token::ShortYear => out.push_str(&format!("{:02}", date.year().rem_euclid(100))),
                Token::MonthName => out.push_str(MONTHS[date.month0() as usize]),
                Token::MonthAbbr => out.push_str(&MONTHS[date.month0() as usize][..3]),
                Token::Month { padded } => out.push_str(&pad(date.month(), *padded)),
                Token::Day { padded } => out.push_str(&pad(date.day(), *padded)),
                Token::Hour { padded } => out.push_str(&pad(date.hour(), *padded)),
                Token::Hour12 { padded } => out.push_str(&pad(date.hour12().1, *padded)),
                Token::Minute => out.push_str(&format!("{:02}", date.minute())),
                Token::Second => out.push_str(&format!("{:02}", date.second())),
                Token::Millis => {
                    out.push_str(&format!("{:03}", date.timestamp_subsec_millis().min(999)))
                }
                Token::Offset => out.push_str(&offset_text(date.offset().local_minus_utc())),
                Token::Meridiem { upper } => {
                    let pm = date.hour12().0;
                    out.push_str(match (pm, *upper) {
                        (false, true) => "AM",
                        (true, true) => "PM",
                        (false, false) => "am",
                        (true, false) => "pm",
                    });
                }
            }
        }
        Ok(out)
    }
}

fn pad(value: u32, padded: bool) -> String {
    if padded {
        format!("{value:02}")
    } else {
        value.to_string()
    }
}

fn offset_text(seconds: i32) -> String {
    if seconds == 0 {
        return "Z".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.unsigned_abs() / 60;
    format!("{sign}{:02}:{:02}", minutes / 60, minutes % 60)
}

fn number(min: usize, max: usize) -> TextParser<i64> {
    filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(min)
        .at_most(max)
        .collect::<String>()
        .try_map(|digits, span| {
            digits
                .parse::<i64>()
                .map_err(|e| Simple::custom(span, e.to_string()))
        })
        .boxed()
}

fn field(field: Field, digits: TextParser<i64>) -> TextParser<Option<(Field, i64)>> {
    digits.map(move |value| Some((field, value))).boxed()
}

fn token_parser(token: &Token) -> TextParser<Option<(Field, i64)>> {
    let width = |padded: bool| if padded { 2 } else { 1 };
    match token {
        Token::Literal(text) => just(text.clone()).to(None).boxed(),
        Token::FullYear => field(Field::Year, number(4, 4)),
        Token::ShortYear => field(Field::Year, number(2, 2).map(|year| 2000 + year).boxed()),
        Token::MonthName => field(
            Field::Month,
            alternatives(
                MONTHS
                    .into_iter()
                    .zip(1..)
                    .map(|(name, month)| just(name).to(month).boxed()),
            ),
        ),
        Token::MonthAbbr => field(
            Field::Month,
            alternatives(
                MONTHS
                    .into_iter()
                    .zip(1..)
                    .map(|(name, month)| just(&name[..3]).to(month).boxed()),
            ),
        ),
        Token::Month { padded } => field(Field::Month, number(width(*padded), 2)),
        Token::Day { padded } => field(Field::Day, number(width(*padded), 2)),
        Token::Hour { padded } => field(Field::Hour, number(width(*padded), 2)),
        Token::Hour12 { padded } => field(Field::Hour12, number(width(*padded), 2)),
        Token::Minute => field(Field::Minute, number(2, 2)),
        Token::Second => field(Field::Second, number(2, 2)),
        Token::Millis => field(Field::Millis, number(3, 3)),
        Token::Offset => {
            let sign = just('+').to(1).or(just('-').to(-1));
            let numeric = sign
                .then(number(2, 2))
                .then_ignore(just(':').or_not())
                .then(number(2, 2))
                .map(|((sign, hours), minutes)| sign * (hours * 3600 + minutes * 60));
            field(Field::Offset, just('Z').to(0).or(numeric).boxed())
        }
        Token::Meridiem { upper } => {
            let (am, pm) = if *upper { ("AM", "PM") } else { ("am", "pm") };
            field(Field::Pm, just(am).to(0).or(just(pm).to(1)).boxed())
        }
    }
}

fn assemble(fields: &[(Field, i64)], context: &ScalarContext) -> Result<DateTime<FixedOffset>, String> {
    let get = |wanted: Field| {
        fields
            .iter()
            .rev()
            .find(|(field, _)| *field == wanted)
            .map(|(_, value)| *value)
    };
    let year = get(Field::Year).unwrap_or_else(|| i64::from(context.now.year()));
    let month = get(Field::Month).unwrap_or(1);
    let day = get(Field::Day).unwrap_or(1);
    let hour = match (get(Field::Hour), get(Field::Hour12), get(Field::Pm)) {
        (Some(hour), _, _) => hour,
        (None, Some(hour), Some(pm)) => hour % 12 + 12 * pm,
        (None, Some(hour), None) => hour,
        (None, None, _) => 0,
    };
    let minute = get(Field::Minute).unwrap_or(0);
    let second = get(Field::Second).unwrap_or(0);
    let millis = get(Field::Millis).unwrap_or(0);
    let offset = match get(Field::Offset) {
        Some(seconds) => FixedOffset::east_opt(seconds as i32).ok_or("invalid UTC offset")?,
        None => context.utc_offset,
    };

    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| format!("invalid date {year:04}-{month:02}-{day:02}"))?;
    let local = date
        .and_hms_milli_opt(hour as u32, minute as u32, second as u32, millis as u32)
        .ok_or_else(|| format!("invalid time {hour:02}:{minute:02}:{second:02}"))?;
    offset
        .from_local_datetime(&local)
        .single()
        .ok_or_else(|| "ambiguous local time".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn context() -> ScalarContext {
        let utc = FixedOffset::east_opt(0).unwrap();
        ScalarContext {
            utc_offset: utc,
            now: utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn parse(format: &str, text: &str) -> Result<Value, Vec<Simple<char>>> {
        DateTimeFormat::compile(Some(format))
            .unwrap()
            .parser(&context())
            .then_ignore(end())
            .parse(text)
    }

    #[rstest]
    #[case("DD/MM/YYYY", "2024-03-07T00:00:00.000Z", "07/03/2024")]
    #[case("D MMMM YYYY", "2024-03-07T00:00:00.000Z", "7 March 2024")]
    #[case("MMM D, YYYY h:mm A", "2024-12-25T18:05:00.000Z", "Dec 25, 2024 6:05 PM")]
    #[case(DEFAULT_FORMAT, "2024-01-02T03:04:05.678+02:00", "2024-01-02T03:04:05.678+02:00")]
    #[case("YYYY-MM-DD [at] HH:mm", "2024-02-29T23:59:00.000Z", "2024-02-29 at 23:59")]
    fn drafts_and_parses(#[case] format: &str, #[case] value: &str, #[case] text: &str) {
        let compiled = DateTimeFormat::compile(Some(format)).unwrap();
        assert_eq!(compiled.draft(&json!(value)).unwrap(), text);
        assert_eq!(parse(format, text).unwrap(), json!(value));
    }

    #[test]
    fn short_years_are_this_century() {
        assert_eq!(parse("DD.MM.YY", "01.02.24").unwrap(), json!("2024-02-01T00:00:00.000Z"));
    }

    #[test]
    fn uses_configured_offset_without_zone() {
        let mut ctx = context();
        ctx.utc_offset = FixedOffset::east_opt(3600).unwrap();
        let value = DateTimeFormat::compile(Some("YYYY-MM-DD"))
            .unwrap()
            .parser(&ctx)
            .then_ignore(end())
            .parse("2024-05-01")
            .unwrap();
        assert_eq!(value, json!("2024-05-01T00:00:00.000+01:00"));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse("DD/MM/YYYY", "31/02/2023").is_err());
    }

    #[test]
    fn midnight_and_noon_on_twelve_hour_clock() {
        assert_eq!(
            parse("YYYY-MM-DD h A", "2024-01-01 12 AM").unwrap(),
            json!("2024-01-01T00:00:00.000Z")
        );
        assert_eq!(
            parse("YYYY-MM-DD h A", "2024-01-01 12 PM").unwrap(),
            json!("2024-01-01T12:00:00.000Z")
        );
    }

    #[test]
    fn missing_year_comes_from_now() {
        assert_eq!(parse("D MMMM", "7 March").unwrap(), json!("2024-03-07T00:00:00.000Z"));
        let compiled = DateTimeFormat::compile(Some("D MMMM")).unwrap();
        assert_eq!(compiled.draft(&json!("2023-03-07T00:00:00.000Z")).unwrap(), "7 March");
    }

    #[rstest]
    #[case("[today]")]
    #[case("YYYY hh:mm")]
    fn rejects_incomplete_formats(#[case] format: &str) {
        assert!(DateTimeFormat::compile(Some(format)).is_err());
    }

    #[test]
    fn draft_rejects_non_dates() {
        let format = DateTimeFormat::compile(None).unwrap();
        assert!(format.draft(&json!("yesterday")).is_err());
        assert!(format.draft(&json!(5)).is_err());
    }
}

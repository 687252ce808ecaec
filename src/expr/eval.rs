//! Sandboxed evaluator.

use chrono::{DateTime, Duration, FixedOffset, SecondsFormat};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("`{function}` expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("{operation}: {message}")]
    Type { operation: String, message: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid date `{0}`")]
    InvalidDate(String),
}

fn type_error(operation: impl Into<String>, message: impl Into<String>) -> EvalError {
    EvalError::Type {
        operation: operation.into(),
        message: message.into(),
    }
}

/// Names visible to an expression: the fields of one object plus `now`.
#[derive(Debug, Clone)]
pub struct Scope<'a> {
    fields: Option<&'a Map<String, Value>>,
    now: Value,
}

impl<'a> Scope<'a> {
    pub fn new(data: &'a Value, now: &DateTime<FixedOffset>) -> Self {
        Scope {
            fields: data.as_object(),
            now: Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Absent fields read as `null`.
    fn lookup(&self, name: &str) -> Value {
        if name == "now" {
            return self.now.clone();
        }
        self.fields
            .and_then(|fields| fields.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Text shown for a formula result.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => Ok(scope.lookup(name)),
        Expr::Member(target, name) => match evaluate(target, scope)? {
            Value::Object(fields) => Ok(fields.get(name).cloned().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(type_error(
                format!(".{name}"),
                format!("{other} has no fields"),
            )),
        },
        Expr::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null)),
                (Value::Object(fields), Value::String(key)) => {
                    Ok(fields.get(key).cloned().unwrap_or(Value::Null))
                }
                (Value::Null, _) => Ok(Value::Null),
                _ => Err(type_error("[]", format!("cannot index {target} with {index}"))),
            }
        }
        Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!truthy(&evaluate(operand, scope)?))),
        Expr::Unary(UnaryOp::Neg, operand) => match evaluate(operand, scope)? {
            Value::Number(n) => match n.as_i64().and_then(i64::checked_neg) {
                Some(i) => Ok(Value::from(i)),
                None => float(-as_f64(&n)),
            },
            other => Err(type_error("-", format!("{other} is not a number"))),
        },
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let result = truthy(&evaluate(lhs, scope)?) && truthy(&evaluate(rhs, scope)?);
            Ok(Value::Bool(result))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let result = truthy(&evaluate(lhs, scope)?) || truthy(&evaluate(rhs, scope)?);
            Ok(Value::Bool(result))
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, evaluate(lhs, scope)?, evaluate(rhs, scope)?),
        Expr::Ternary(condition, then, otherwise) => {
            if truthy(&evaluate(condition, scope)?) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, args)
        }
    }
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn float(value: f64) -> Result<Value, EvalError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| type_error("arithmetic", "result is not a finite number"))
}

/// Integral floats come back as integers where that is lossless.
fn integral(value: f64) -> Result<Value, EvalError> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Ok(Value::from(value as i64))
    } else {
        float(value)
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(equal(&lhs, &rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }
    if op == BinaryOp::Add && (lhs.is_string() || rhs.is_string()) {
        return Ok(Value::String(display(&lhs) + &display(&rhs)));
    }
    let (Value::Number(a), Value::Number(b)) = (&lhs, &rhs) else {
        return Err(type_error(
            format!("{op:?}"),
            format!("{lhs} and {rhs} are not numbers"),
        ));
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div if y == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            BinaryOp::Rem if y == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }
    let (x, y) = (as_f64(a), as_f64(b));
    match op {
        BinaryOp::Add => float(x + y),
        BinaryOp::Sub => float(x - y),
        BinaryOp::Mul => float(x * y),
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => Err(EvalError::DivisionByZero),
        BinaryOp::Div => float(x / y),
        BinaryOp::Rem => float(x % y),
        _ => Err(type_error(format!("{op:?}"), "not an arithmetic operator")),
    }
}

fn equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => as_f64(a) == as_f64(b),
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, EvalError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => as_f64(a)
            .partial_cmp(&as_f64(b))
            .ok_or_else(|| type_error("compare", "not comparable")),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(type_error("compare", format!("cannot compare {lhs} with {rhs}"))),
    }
}

// ============================================================================
// BUILT-IN FUNCTIONS
// ============================================================================

fn arity(function: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Arity {
            function: function.to_string(),
            expected: expected.to_string(),
            found: args.len(),
        })
    }
}

fn number_arg(function: &str, value: &Value) -> Result<f64, EvalError> {
    value
        .as_f64()
        .ok_or_else(|| type_error(function, format!("{value} is not a number")))
}

fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| type_error(function, format!("{value} is not a string")))
}

fn date_arg(value: &Value) -> Result<DateTime<FixedOffset>, EvalError> {
    let text = value
        .as_str()
        .ok_or_else(|| EvalError::InvalidDate(value.to_string()))?;
    DateTime::parse_from_rfc3339(text).map_err(|_| EvalError::InvalidDate(text.to_string()))
}

/// `min`/`max` take either several numbers or one array of numbers.
fn numbers(function: &str, args: &[Value]) -> Result<Vec<f64>, EvalError> {
    let values: &[Value] = match args {
        [Value::Array(items)] => items,
        _ => args,
    };
    if values.is_empty() {
        return Err(EvalError::Arity {
            function: function.to_string(),
            expected: "at least 1".to_string(),
            found: 0,
        });
    }
    values.iter().map(|v| number_arg(function, v)).collect()
}

/// Keep integers integral when every input was an integer.
fn preserve_kind(args: &[Value], value: f64) -> Result<Value, EvalError> {
    let all_integers = args.iter().all(|a| match a {
        Value::Array(items) => items.iter().all(|i| i.is_i64()),
        other => other.is_i64(),
    });
    if all_integers {
        integral(value)
    } else {
        float(value)
    }
}

fn call(function: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match function {
        "abs" => {
            arity(function, &args, 1)?;
            preserve_kind(&args, number_arg(function, &args[0])?.abs())
        }
        "min" => {
            let values = numbers(function, &args)?;
            preserve_kind(&args, values.into_iter().fold(f64::INFINITY, f64::min))
        }
        "max" => {
            let values = numbers(function, &args)?;
            preserve_kind(&args, values.into_iter().fold(f64::NEG_INFINITY, f64::max))
        }
        "round" => {
            let (value, places) = match args.as_slice() {
                [value] => (number_arg(function, value)?, 0),
                [value, places] => (
                    number_arg(function, value)?,
                    number_arg(function, places)? as i32,
                ),
                _ => {
                    return Err(EvalError::Arity {
                        function: function.to_string(),
                        expected: "1 or 2".to_string(),
                        found: args.len(),
                    })
                }
            };
            if places <= 0 {
                integral(value.round())
            } else {
                let scale = 10f64.powi(places);
                float((value * scale).round() / scale)
            }
        }
        "floor" => {
            arity(function, &args, 1)?;
            integral(number_arg(function, &args[0])?.floor())
        }
        "ceil" => {
            arity(function, &args, 1)?;
            integral(number_arg(function, &args[0])?.ceil())
        }
        "len" => {
            arity(function, &args, 1)?;
            let length = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(fields) => fields.len(),
                Value::Null => 0,
                other => return Err(type_error(function, format!("{other} has no length"))),
            };
            Ok(Value::from(length))
        }
        "sum" => {
            arity(function, &args, 1)?;
            let Value::Array(items) = &args[0] else {
                return Err(type_error(function, "expects an array"));
            };
            let total = items
                .iter()
                .map(|item| number_arg(function, item))
                .sum::<Result<f64, _>>()?;
            preserve_kind(&args, total)
        }
        "upper" => {
            arity(function, &args, 1)?;
            Ok(Value::String(string_arg(function, &args[0])?.to_uppercase()))
        }
        "lower" => {
            arity(function, &args, 1)?;
            Ok(Value::String(string_arg(function, &args[0])?.to_lowercase()))
        }
        "concat" => Ok(Value::String(args.iter().map(display).collect())),
        "contains" => {
            arity(function, &args, 2)?;
            let found = match (&args[0], &args[1]) {
                (Value::String(haystack), needle) => haystack.contains(&display(needle)),
                (Value::Array(items), needle) => items.iter().any(|item| equal(item, needle)),
                (other, _) => return Err(type_error(function, format!("cannot search {other}"))),
            };
            Ok(Value::Bool(found))
        }
        "year" | "month" | "day" => {
            arity(function, &args, 1)?;
            use chrono::Datelike;
            let date = date_arg(&args[0])?;
            let part = match function {
                "year" => i64::from(date.year()),
                "month" => i64::from(date.month()),
                _ => i64::from(date.day()),
            };
            Ok(Value::from(part))
        }
        "addDays" => {
            arity(function, &args, 2)?;
            let date = date_arg(&args[0])?;
            let days = number_arg(function, &args[1])?;
            if !days.is_finite() || days.fract() != 0.0 {
                return Err(type_error(function, format!("{days} is not a whole number of days")));
            }
            let shifted = Duration::try_days(days as i64)
                .and_then(|delta| date.checked_add_signed(delta))
                .ok_or_else(|| EvalError::InvalidDate(display(&args[0])))?;
            Ok(Value::String(
                shifted.to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }
        "daysBetween" => {
            arity(function, &args, 2)?;
            let from = date_arg(&args[0])?;
            let to = date_arg(&args[1])?;
            Ok(Value::from(to.signed_duration_since(from).num_days()))
        }
        _ => Err(EvalError::UnknownFunction(function.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use rstest::rstest;
    use serde_json::json;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap()
    }

    fn eval(code: &str, data: Value) -> Result<Value, EvalError> {
        let now = now();
        evaluate(&parse(code).unwrap(), &Scope::new(&data, &now))
    }

    #[rstest]
    #[case("1 + 2 * 3", json!(7))]
    #[case("7 / 2", json!(3.5))]
    #[case("8 / 2", json!(4))]
    #[case("7 % 3", json!(1))]
    #[case("price * qty", json!(25.0))]
    #[case("'a' + 1", json!("a1"))]
    #[case("qty > 1 && !late", json!(true))]
    #[case("late ? 'late' : 'on time'", json!("on time"))]
    #[case("missing == null", json!(true))]
    #[case("items[1].n", json!(2))]
    #[case("len(items)", json!(2))]
    #[case("sum([1, 2, 3])", json!(6))]
    #[case("max(1, 4, 2)", json!(4))]
    #[case("min([2.5, 1.5])", json!(1.5))]
    #[case("round(2.346, 2)", json!(2.35))]
    #[case("round(2.5)", json!(3))]
    #[case("floor(-1.5)", json!(-2))]
    #[case("upper('eur')", json!("EUR"))]
    #[case("concat('a', 1, true)", json!("a1true"))]
    #[case("contains(['x', 'y'], 'y')", json!(true))]
    #[case("year(now)", json!(2024))]
    #[case("addDays(now, 30)", json!("2024-03-31T12:00:00.000Z"))]
    #[case("daysBetween('2024-01-01T00:00:00Z', now)", json!(60))]
    fn evaluates(#[case] code: &str, #[case] expected: Value) {
        let data = json!({
            "price": 12.5,
            "qty": 2,
            "late": false,
            "items": [{"n": 1}, {"n": 2}]
        });
        assert_eq!(eval(code, data).unwrap(), expected);
    }

    #[rstest]
    #[case("addDays(now, 1e18)")]
    #[case("addDays(now, -1e18)")]
    #[case("addDays(now, 100000000000000)")]
    fn out_of_range_dates_are_errors(#[case] code: &str) {
        assert!(matches!(eval(code, json!({})), Err(EvalError::InvalidDate(_))));
    }

    #[test]
    fn partial_days_are_rejected() {
        assert!(matches!(
            eval("addDays(now, 1.5)", json!({})),
            Err(EvalError::Type { .. })
        ));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("1 / 0", json!({})), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn unknown_function() {
        assert_eq!(
            eval("shell('rm')", json!({})),
            Err(EvalError::UnknownFunction("shell".into()))
        );
    }

    #[test]
    fn type_errors() {
        assert!(matches!(eval("'a' * 2", json!({})), Err(EvalError::Type { .. })));
        assert!(matches!(eval("1 < 'a'", json!({})), Err(EvalError::Type { .. })));
    }

    #[test]
    fn display_formats_results() {
        assert_eq!(display(&json!("x")), "x");
        assert_eq!(display(&json!(2.5)), "2.5");
        assert_eq!(display(&json!([1, "a"])), "1, a");
        assert_eq!(display(&Value::Null), "");
    }
}

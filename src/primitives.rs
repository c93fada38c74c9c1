use std::cmp::Ordering;
use std::io::{self, Write};

use tracing::warn;

use crate::evaluator::{EvalError, EvalResult, apply};
use crate::source::Span;
use crate::types::{PrimitiveFunc, Procedure, Value};

/// Every native procedure, by the name it is bound to in the global
/// environment.
pub static BUILTINS: &[(&str, PrimitiveFunc)] = &[
    // Operators
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("%", prim_mod),
    ("=", prim_equals),
    ("<", prim_less_than),
    (">", prim_greater_than),
    ("<=", prim_less_than_or_equals),
    (">=", prim_greater_than_or_equals),
    // Functions
    ("sin", prim_sin),
    ("cos", prim_cos),
    ("sqrt", prim_sqrt),
    ("print", prim_print),
    ("str", prim_str),
    ("concat", prim_concat),
    ("range", prim_range),
    ("length", prim_length),
    ("map", prim_map),
    ("filter", prim_filter),
    ("list", prim_list),
    ("and", prim_and),
    ("or", prim_or),
    ("not", prim_not),
];

// Checks the number of arguments
macro_rules! check_arity {
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(arity_error(
                $name,
                format!("at least {}", $expected),
                $args.len(),
                $span,
            ));
        }
    };
    // Variant for range of args (inclusive)
    ($args:expr, $min:expr, $max:expr, $span:expr, $name:expr) => {
        if !($min..=$max).contains(&$args.len()) {
            return Err(arity_error(
                $name,
                format!("{} or {}", $min, $max),
                $args.len(),
                $span,
            ));
        }
    };
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(arity_error(
                $name,
                format!("exactly {}", $expected),
                $args.len(),
                $span,
            ));
        }
    };
}

fn arity_error(name: &str, expected: String, found: usize, span: Span) -> EvalError {
    EvalError::Arity {
        name: name.to_string(),
        expected,
        found,
        span,
    }
}

fn type_mismatch(name: &str, expected: &str, found: &Value, span: Span) -> EvalError {
    EvalError::TypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        found: found.type_name(),
        span,
    }
}

fn arithmetic_error(name: &str, message: &str, span: Span) -> EvalError {
    EvalError::Arithmetic(format!("{} in '{}'", message, name), span)
}

// --- Numbers ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    fn from_value(value: &Value) -> Option<Number> {
        match value {
            Value::Integer(n) => Some(Number::Int(*n)),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    // Integers compare exactly; anything involving a float goes through f64.
    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(n) => Value::Integer(n),
            Number::Float(x) => Value::Float(x),
        }
    }
}

fn expect_number(value: &Value, span: Span, name: &str) -> EvalResult<Number> {
    Number::from_value(value).ok_or_else(|| type_mismatch(name, "a number", value, span))
}

fn expect_integer(value: &Value, span: Span, name: &str) -> EvalResult<i64> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(type_mismatch(name, "an integer", other, span)),
    }
}

fn expect_procedure<'a>(value: &'a Value, span: Span, name: &str) -> EvalResult<&'a Procedure> {
    match value {
        Value::Procedure(procedure) => Ok(procedure),
        other => Err(type_mismatch(name, "a procedure", other, span)),
    }
}

// The empty list sentinel counts as a list with no items.
fn expect_list(value: Value, span: Span, name: &str) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::Nil => Ok(Vec::new()),
        other => Err(type_mismatch(name, "a list", &other, span)),
    }
}

/// Combines two numbers, staying in integers while both sides are integers.
fn combine(
    name: &str,
    left: Number,
    right: Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    span: Span,
) -> EvalResult<Number> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => int_op(a, b)
            .map(Number::Int)
            .ok_or_else(|| arithmetic_error(name, "integer overflow", span)),
        (a, b) => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn fold_numbers(
    args: Vec<Value>,
    span: Span,
    identity: Number,
    name: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult {
    let mut acc = identity;
    for arg in &args {
        let num = expect_number(arg, span, name)?;
        acc = combine(name, acc, num, int_op, float_op, span)?;
    }
    Ok(acc.into())
}

pub fn prim_add(args: Vec<Value>, span: Span) -> EvalResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    fold_numbers(args, span, Number::Int(0), "+", i64::checked_add, |a, b| a + b)
}

pub fn prim_mul(args: Vec<Value>, span: Span) -> EvalResult {
    // (*) -> 1
    fold_numbers(args, span, Number::Int(1), "*", i64::checked_mul, |a, b| a * b)
}

pub fn prim_sub(args: Vec<Value>, span: Span) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    check_arity!(args, min 1, span, "-");
    let first = expect_number(&args[0], span, "-")?;
    if args.len() == 1 {
        return match first {
            Number::Int(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| arithmetic_error("-", "integer overflow", span)),
            Number::Float(x) => Ok(Value::Float(-x)),
        };
    }
    let mut acc = first;
    for arg in &args[1..] {
        let num = expect_number(arg, span, "-")?;
        acc = combine("-", acc, num, i64::checked_sub, |a, b| a - b, span)?;
    }
    Ok(acc.into())
}

fn divide(dividend: f64, divisor: f64, span: Span) -> EvalResult<f64> {
    if divisor == 0.0 {
        Err(arithmetic_error("/", "division by zero", span))
    } else {
        Ok(dividend / divisor)
    }
}

pub fn prim_div(args: Vec<Value>, span: Span) -> EvalResult {
    // (/ x) -> 1/x
    // (/ x y z) -> x / y / z, always a float
    check_arity!(args, min 1, span, "/");
    let first = expect_number(&args[0], span, "/")?.as_f64();
    if args.len() == 1 {
        return divide(1.0, first, span).map(Value::Float);
    }
    let mut acc = first;
    for arg in &args[1..] {
        acc = divide(acc, expect_number(arg, span, "/")?.as_f64(), span)?;
    }
    Ok(Value::Float(acc))
}

pub fn prim_mod(args: Vec<Value>, span: Span) -> EvalResult {
    // Floored: the result has the sign of the divisor, (% -7 3) -> 2
    check_arity!(args, 2, span, "%");
    let dividend = expect_number(&args[0], span, "%")?;
    let divisor = expect_number(&args[1], span, "%")?;
    match (dividend, divisor) {
        (Number::Int(_), Number::Int(0)) => Err(arithmetic_error("%", "modulo by zero", span)),
        (Number::Int(a), Number::Int(b)) => {
            let r = a
                .checked_rem(b)
                .ok_or_else(|| arithmetic_error("%", "integer overflow", span))?;
            let r = if r != 0 && (r < 0) != (b < 0) { r + b } else { r };
            Ok(Value::Integer(r))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            if b == 0.0 {
                return Err(arithmetic_error("%", "modulo by zero", span));
            }
            let r = a % b;
            let r = if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r };
            Ok(Value::Float(r))
        }
    }
}

// --- Comparison ---

// `()` and an empty list value are the same list.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::List(items), Value::Nil) | (Value::Nil, Value::List(items)) => items.is_empty(),
        _ => match (Number::from_value(left), Number::from_value(right)) {
            (Some(a), Some(b)) => a.compare(b) == Some(Ordering::Equal),
            _ => left == right,
        },
    }
}

pub fn prim_equals(args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "=");
    Ok(Value::Boolean(values_equal(&args[0], &args[1])))
}

/// Orders two numbers or two strings; anything else is a type mismatch.
fn compare_with(
    args: Vec<Value>,
    span: Span,
    name: &str,
    accept: fn(Ordering) -> bool,
) -> EvalResult {
    check_arity!(args, 2, span, name);
    let (left, right) = (&args[0], &args[1]);
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (Number::from_value(left), Number::from_value(right)) {
            (Some(a), Some(b)) => a.compare(b),
            (Some(_), None) => return Err(type_mismatch(name, "a number", right, span)),
            (None, _) if matches!(left, Value::String(_)) => {
                return Err(type_mismatch(name, "a string", right, span));
            }
            (None, _) => {
                return Err(type_mismatch(name, "a number or string", left, span));
            }
        },
    };
    // NaN compares false against everything
    Ok(Value::Boolean(ordering.is_some_and(accept)))
}

pub fn prim_less_than(args: Vec<Value>, span: Span) -> EvalResult {
    compare_with(args, span, "<", Ordering::is_lt)
}

pub fn prim_greater_than(args: Vec<Value>, span: Span) -> EvalResult {
    compare_with(args, span, ">", Ordering::is_gt)
}

pub fn prim_less_than_or_equals(args: Vec<Value>, span: Span) -> EvalResult {
    compare_with(args, span, "<=", Ordering::is_le)
}

pub fn prim_greater_than_or_equals(args: Vec<Value>, span: Span) -> EvalResult {
    compare_with(args, span, ">=", Ordering::is_ge)
}

// --- Math ---

fn unary_float(args: Vec<Value>, span: Span, name: &str, func: fn(f64) -> f64) -> EvalResult {
    check_arity!(args, 1, span, name);
    let x = expect_number(&args[0], span, name)?.as_f64();
    Ok(Value::Float(func(x)))
}

pub fn prim_sin(args: Vec<Value>, span: Span) -> EvalResult {
    unary_float(args, span, "sin", f64::sin)
}

pub fn prim_cos(args: Vec<Value>, span: Span) -> EvalResult {
    unary_float(args, span, "cos", f64::cos)
}

pub fn prim_sqrt(args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "sqrt");
    let x = expect_number(&args[0], span, "sqrt")?.as_f64();
    if x < 0.0 {
        return Err(arithmetic_error("sqrt", "math domain error", span));
    }
    Ok(Value::Float(x.sqrt()))
}

// --- Strings and output ---

// `print` shows a value exactly as it displays, one per line.
fn write_printed(out: &mut impl Write, value: &Value) -> io::Result<()> {
    writeln!(out, "{}", value)
}

pub fn prim_print(mut args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "print");
    let value = args.swap_remove(0);
    if let Err(err) = write_printed(&mut io::stdout().lock(), &value) {
        warn!(%err, "print could not write to stdout");
    }
    Ok(value)
}

pub fn prim_str(args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "str");
    Ok(Value::String(args[0].to_string()))
}

pub fn prim_concat(args: Vec<Value>, _span: Span) -> EvalResult {
    Ok(Value::String(args.iter().map(|v| v.to_string()).collect()))
}

// --- Lists ---

pub fn prim_range(args: Vec<Value>, span: Span) -> EvalResult {
    // (range n) -> 0..n
    // (range a b) -> a..b
    check_arity!(args, 1, 2, span, "range");
    let (start, end) = if let [end] = args.as_slice() {
        (0, expect_integer(end, span, "range")?)
    } else {
        (
            expect_integer(&args[0], span, "range")?,
            expect_integer(&args[1], span, "range")?,
        )
    };
    Ok(Value::List((start..end).map(Value::Integer).collect()))
}

pub fn prim_length(args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "length");
    let len = match &args[0] {
        Value::List(items) => items.len(),
        Value::Nil => 0,
        Value::String(s) => s.chars().count(),
        other => return Err(type_mismatch("length", "a list or string", other, span)),
    };
    Ok(Value::Integer(len as i64))
}

pub fn prim_map(mut args: Vec<Value>, span: Span) -> EvalResult {
    // (map f items)
    check_arity!(args, 2, span, "map");
    let items = expect_list(args.pop().unwrap_or(Value::Nil), span, "map")?;
    let func = expect_procedure(&args[0], span, "map")?;
    let mapped = items
        .into_iter()
        .map(|item| apply(func, vec![item], span))
        .collect::<EvalResult<Vec<Value>>>()?;
    Ok(Value::List(mapped))
}

pub fn prim_filter(mut args: Vec<Value>, span: Span) -> EvalResult {
    // (filter pred items)
    check_arity!(args, 2, span, "filter");
    let items = expect_list(args.pop().unwrap_or(Value::Nil), span, "filter")?;
    let predicate = expect_procedure(&args[0], span, "filter")?;
    let mut kept = Vec::new();
    for item in items {
        if apply(predicate, vec![item.clone()], span)?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::List(kept))
}

pub fn prim_list(args: Vec<Value>, _span: Span) -> EvalResult {
    Ok(Value::List(args))
}

// --- Logic ---
// These see both operands already evaluated. `(and a b)` and `(or a b)` in
// call position are special forms instead; these remain for use as values.

pub fn prim_and(mut args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "and");
    let right = args.swap_remove(1);
    let left = args.swap_remove(0);
    Ok(if left.is_truthy() { right } else { left })
}

pub fn prim_or(mut args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "or");
    let right = args.swap_remove(1);
    let left = args.swap_remove(0);
    Ok(if left.is_truthy() { left } else { right })
}

pub fn prim_not(args: Vec<Value>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "not");
    Ok(Value::Boolean(!args[0].is_truthy()))
}

// Numeric and aggregation functions

use crate::evaluator::EvaluatorError;
use crate::utils::round_half_even;
use crate::value::JValue;

/// Apply `f` to a number argument; Undefined passes through.
pub fn map_number(value: &JValue, f: impl FnOnce(f64) -> f64) -> JValue {
    match value.as_f64() {
        Some(n) => JValue::Number(f(n)),
        None => JValue::Undefined,
    }
}

fn numbers(value: &JValue) -> Vec<f64> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(JValue::as_f64).collect())
        .unwrap_or_default()
}

pub fn sum(value: &JValue) -> Result<JValue, EvaluatorError> {
    if value.is_undefined() {
        return Ok(JValue::Undefined);
    }
    Ok(JValue::Number(numbers(value).iter().sum()))
}

pub fn max(value: &JValue) -> Result<JValue, EvaluatorError> {
    Ok(numbers(value)
        .into_iter()
        .reduce(f64::max)
        .map(JValue::Number)
        .unwrap_or(JValue::Undefined))
}

pub fn min(value: &JValue) -> Result<JValue, EvaluatorError> {
    Ok(numbers(value)
        .into_iter()
        .reduce(f64::min)
        .map(JValue::Number)
        .unwrap_or(JValue::Undefined))
}

pub fn average(value: &JValue) -> Result<JValue, EvaluatorError> {
    let values = numbers(value);
    if values.is_empty() {
        return Ok(JValue::Undefined);
    }
    Ok(JValue::Number(
        values.iter().sum::<f64>() / values.len() as f64,
    ))
}

/// JSON number syntax, with an optional leading minus.
fn is_decimal(s: &str) -> bool {
    let b = s.as_bytes();
    let digit = |i: usize| b.get(i).is_some_and(u8::is_ascii_digit);
    let mut i = 0;
    if b.first() == Some(&b'-') {
        i += 1;
    }
    match b.get(i) {
        Some(b'0') => i += 1,
        Some(c) if c.is_ascii_digit() => {
            while digit(i) {
                i += 1;
            }
        }
        _ => return false,
    }
    if b.get(i) == Some(&b'.') {
        i += 1;
        let start = i;
        while digit(i) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    if matches!(b.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(b.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let start = i;
        while digit(i) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == b.len()
}

fn parse_number(s: &str) -> Option<f64> {
    if is_decimal(s) {
        return s.parse::<f64>().ok().filter(|n| n.is_finite());
    }
    let (radix, digits) = match s.get(..2) {
        Some("0x") | Some("0X") => (16, &s[2..]),
        Some("0o") | Some("0O") => (8, &s[2..]),
        Some("0b") | Some("0B") => (2, &s[2..]),
        _ => return None,
    };
    u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
}

/// `$number(arg)`: numbers, numeric strings (decimal, `0x`, `0o`, `0b`) and booleans.
pub fn number(value: &JValue) -> Result<JValue, EvaluatorError> {
    let cast_error = || {
        EvaluatorError::evaluation_error(
            "D3030",
            format!("Unable to cast value to a number: {}", value),
        )
    };
    match value {
        JValue::Undefined => Ok(JValue::Undefined),
        JValue::Number(_) => Ok(value.clone()),
        JValue::Bool(b) => Ok(JValue::Number(if *b { 1.0 } else { 0.0 })),
        JValue::String(s) => parse_number(s).map(JValue::Number).ok_or_else(cast_error),
        _ => Err(cast_error()),
    }
}

/// `$round(n[, precision])`, rounding half to even.
pub fn round(value: &JValue, precision: &JValue) -> JValue {
    let precision = precision.as_f64().map(|p| p.trunc() as i32).unwrap_or(0);
    map_number(value, |n| round_half_even(n, precision))
}

pub fn power(base: &JValue, exponent: &JValue) -> Result<JValue, EvaluatorError> {
    let (base, exponent) = match (base.as_f64(), exponent.as_f64()) {
        (Some(base), Some(exponent)) => (base, exponent),
        _ => return Ok(JValue::Undefined),
    };
    let result = base.powf(exponent);
    if !result.is_finite() {
        return Err(EvaluatorError::evaluation_error(
            "D3061",
            format!(
                "The power function has resulted in a value that cannot be represented as a JSON number: base={}, exponent={}",
                base, exponent
            ),
        ));
    }
    Ok(JValue::Number(result))
}

pub fn sqrt(value: &JValue) -> Result<JValue, EvaluatorError> {
    match value.as_f64() {
        Some(n) if n < 0.0 => Err(EvaluatorError::evaluation_error(
            "D3060",
            format!("The sqrt function cannot be applied to a negative number: {}", n),
        )),
        Some(n) => Ok(JValue::Number(n.sqrt())),
        None => Ok(JValue::Undefined),
    }
}

/// `$formatBase(n[, radix])`: the rounded integer written in base 2 to 36.
pub fn format_base(value: &JValue, radix: &JValue) -> Result<JValue, EvaluatorError> {
    let n = match value.as_f64() {
        Some(n) => round_half_even(n, 0),
        None => return Ok(JValue::Undefined),
    };
    let radix = radix.as_f64().map(|r| r.trunc() as i64).unwrap_or(10);
    if !(2..=36).contains(&radix) {
        return Err(EvaluatorError::evaluation_error(
            "D3100",
            format!(
                "The radix of the formatBase function must be between 2 and 36. It was given {}",
                radix
            ),
        ));
    }
    let radix = radix as u128;
    let mut magnitude = n.abs() as u128;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % radix) as u32;
        digits.push(std::char::from_digit(digit, radix as u32).unwrap_or('0'));
        magnitude /= radix;
        if magnitude == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(JValue::from(digits.iter().rev().collect::<String>()))
}

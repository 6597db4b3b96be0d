// Number formatting and text helpers shared by the evaluator and built-ins

/// Format a number the way JavaScript's `Number.prototype.toString` does.
///
/// Integers print without a fraction, magnitudes outside `[1e-7, 1e21)` use
/// exponent notation (`1e+21`, `1e-7`), and negative zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // Shortest round-trip digits, e.g. "-1.2345e3"
    let sci = format!("{:e}", n);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let k = digits.len() as i32;
    let point = exponent + 1;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((point - k) as usize));
    } else if 0 < point && point <= 21 {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(&digits);
    } else {
        let e = point - 1;
        out.push_str(&digits[..1]);
        if k > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if e < 0 { '-' } else { '+' });
        out.push_str(&e.abs().to_string());
    }
    out
}

/// Round to 15 significant digits, as `Number(n.toPrecision(15))`.
pub fn to_precision_15(n: f64) -> f64 {
    if !n.is_finite() || n == 0.0 {
        return n;
    }
    format!("{:.14e}", n).parse().unwrap_or(n)
}

/// Shift the decimal point of `n` by `places` without binary drift.
fn shift_decimal(n: f64, places: i32) -> f64 {
    format!("{}e{}", n, places).parse().unwrap_or(n)
}

/// Round half to even at `precision` decimal places (negative precision
/// rounds to tens, hundreds, ...).
pub fn round_half_even(n: f64, precision: i32) -> f64 {
    if !n.is_finite() {
        return n;
    }
    let shifted = if precision == 0 {
        n
    } else {
        shift_decimal(n, precision)
    };
    let floor = shifted.floor();
    let diff = shifted - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    let result = if precision == 0 {
        rounded
    } else {
        shift_decimal(rounded, -precision)
    };
    // -0 prints as 0 anyway; keep the arithmetic result tidy
    if result == 0.0 {
        0.0
    } else {
        result
    }
}

/// Number of Unicode scalar values in `s`.
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Converts a byte offset into `s` to a character offset.
#[inline]
pub fn char_offset(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// `Array.prototype.slice` over characters, with negative indexes counting
/// from the end.
pub fn slice_chars(s: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let clamp = |i: i64| -> usize {
        if i < 0 {
            (len + i).max(0) as usize
        } else {
            i.min(len) as usize
        }
    };
    let from = clamp(start);
    let to = end.map(clamp).unwrap_or(len as usize);
    if from >= to {
        return String::new();
    }
    chars[from..to].iter().collect()
}

/// Compile a regex literal's pattern with its `i`/`m` flags.
pub fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, regex::Error> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number_integers_and_fractions() {
        assert_eq!(format_number(500.0), "500");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(123.456), "123.456");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_format_number_exponent_thresholds() {
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e21), "1.5e+21");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(-2.5e-8), "-2.5e-8");
    }

    #[test]
    fn test_to_precision_15() {
        assert_eq!(to_precision_15(0.1 + 0.2), 0.3);
        assert_eq!(to_precision_15(1.0 / 3.0), 0.333333333333333);
        assert_eq!(to_precision_15(42.0), 42.0);
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.5, 0), 0.0);
        assert_eq!(round_half_even(1.5, 0), 2.0);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(-2.5, 0), -2.0);
        assert_eq!(round_half_even(-3.5, 0), -4.0);
        assert_eq!(round_half_even(3.7, 0), 4.0);
        assert_eq!(round_half_even(123.456, 2), 123.46);
        assert_eq!(round_half_even(2.675, 2), 2.68);
        assert_eq!(round_half_even(12345.0, -2), 12300.0);
        assert_eq!(round_half_even(12350.0, -2), 12400.0);
    }

    #[test]
    fn test_slice_chars() {
        assert_eq!(slice_chars("hello", 1, Some(3)), "el");
        assert_eq!(slice_chars("hello", -3, None), "llo");
        assert_eq!(slice_chars("héllo", 1, Some(2)), "é");
        assert_eq!(slice_chars("abc", 5, None), "");
    }

    #[test]
    fn test_build_regex_flags() {
        assert!(build_regex("^abc$", "i").unwrap().is_match("ABC"));
        assert!(!build_regex("^abc$", "").unwrap().is_match("ABC"));
        assert!(build_regex("^b$", "m").unwrap().is_match("a\nb"));
        assert!(build_regex("a)", "").is_err());
    }
}

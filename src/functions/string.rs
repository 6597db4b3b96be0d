// String functions
// Lengths and offsets count Unicode code points, not bytes

use base64::Engine;
use indexmap::IndexMap;

use crate::environment::FrameId;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::utils::{char_len, char_offset, format_number, slice_chars, to_precision_15};
use crate::value::{JValue, JsonFormat};

/// One match of a regex against a string, with code point offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexMatch {
    pub matched: String,
    pub start: usize,
    pub end: usize,
    /// Capture groups; groups that did not participate are `null`.
    pub groups: Vec<JValue>,
}

impl RegexMatch {
    /// The object a regex value returns when invoked directly.
    pub fn to_value(&self) -> JValue {
        let mut map = IndexMap::new();
        map.insert("match".to_string(), JValue::from(self.matched.as_str()));
        map.insert("start".to_string(), JValue::from(self.start));
        map.insert("end".to_string(), JValue::from(self.end));
        map.insert("groups".to_string(), JValue::array(self.groups.clone()));
        JValue::object(map)
    }

    /// The object `$match` reports.
    fn to_match_object(&self) -> JValue {
        let mut map = IndexMap::new();
        map.insert("match".to_string(), JValue::from(self.matched.as_str()));
        map.insert("index".to_string(), JValue::from(self.start));
        map.insert("groups".to_string(), JValue::array(self.groups.clone()));
        JValue::object(map)
    }
}

/// Successive matches of `re` in `s`, at most `limit` of them.
///
/// Only the first match may be empty; an empty match after it would never
/// advance and raises `D1004`.
pub fn regex_matches(
    re: &regex::Regex,
    s: &str,
    limit: Option<usize>,
) -> Result<Vec<RegexMatch>, EvaluatorError> {
    let mut found = Vec::new();
    let mut from = 0;
    while limit.map_or(true, |limit| found.len() < limit) {
        let captures = match re.captures_at(s, from) {
            Some(captures) => captures,
            None => break,
        };
        let whole = match captures.get(0) {
            Some(whole) => whole,
            None => break,
        };
        if !found.is_empty() && whole.as_str().is_empty() {
            return Err(EvaluatorError::evaluation_error(
                "D1004",
                "Regular expression matches zero length string",
            ));
        }
        found.push(RegexMatch {
            matched: whole.as_str().to_string(),
            start: char_offset(s, whole.start()),
            end: char_offset(s, whole.end()),
            groups: captures
                .iter()
                .skip(1)
                .map(|group| group.map_or(JValue::Null, |g| JValue::from(g.as_str())))
                .collect(),
        });
        from = whole.end();
        if from >= s.len() {
            break;
        }
    }
    Ok(found)
}

/// `$string()` text for a defined value.
pub fn stringify(value: &JValue, pretty: bool) -> Result<String, EvaluatorError> {
    match value {
        JValue::String(s) => Ok(s.to_string()),
        JValue::Number(n) if !n.is_finite() => Err(EvaluatorError::evaluation_error(
            "D3001",
            "Attempting to invoke string function on Infinity or NaN",
        )),
        JValue::Number(n) => Ok(format_number(to_precision_15(*n))),
        other => {
            let format = JsonFormat {
                indent: pretty.then_some(2),
                stringify: true,
            };
            Ok(other.to_json(format).unwrap_or_default())
        }
    }
}

/// Operand text for `&`: Undefined contributes nothing.
pub fn stringify_or_empty(value: &JValue) -> Result<String, EvaluatorError> {
    if value.is_undefined() {
        Ok(String::new())
    } else {
        stringify(value, false)
    }
}

pub fn string(value: &JValue, pretty: &JValue) -> Result<JValue, EvaluatorError> {
    if value.is_undefined() {
        return Ok(JValue::Undefined);
    }
    stringify(value, pretty.as_bool().unwrap_or(false)).map(JValue::from)
}

/// Apply `f` to a string argument; Undefined passes through.
pub fn map_str(value: &JValue, f: impl FnOnce(&str) -> String) -> JValue {
    match value.as_str() {
        Some(s) => JValue::from(f(s)),
        None => JValue::Undefined,
    }
}

pub fn length(value: &JValue) -> JValue {
    match value.as_str() {
        Some(s) => JValue::from(char_len(s)),
        None => JValue::Undefined,
    }
}

fn integer_arg(value: &JValue) -> Option<i64> {
    value.as_f64().map(|n| n.trunc() as i64)
}

/// `$substring(str, start[, length])`; a negative start counts from the end.
pub fn substring(value: &JValue, start: &JValue, length: &JValue) -> JValue {
    let s = match value.as_str() {
        Some(s) => s,
        None => return JValue::Undefined,
    };
    let len = char_len(s) as i64;
    let mut start = integer_arg(start).unwrap_or(0);
    if len + start < 0 {
        start = 0;
    }
    match integer_arg(length) {
        Some(count) if count <= 0 => JValue::from(""),
        Some(count) => {
            let end = if start >= 0 {
                start + count
            } else {
                len + start + count
            };
            JValue::from(slice_chars(s, start, Some(end)))
        }
        None => JValue::from(slice_chars(s, start, None)),
    }
}

pub fn substring_before(value: &JValue, chars: &JValue) -> JValue {
    match (value.as_str(), chars.as_str()) {
        (Some(s), Some(chars)) => match s.find(chars) {
            Some(index) => JValue::from(&s[..index]),
            None => JValue::from(s),
        },
        (Some(s), None) => JValue::from(s),
        _ => JValue::Undefined,
    }
}

pub fn substring_after(value: &JValue, chars: &JValue) -> JValue {
    match (value.as_str(), chars.as_str()) {
        (Some(s), Some(chars)) => match s.find(chars) {
            Some(index) => JValue::from(&s[index + chars.len()..]),
            None => JValue::from(s),
        },
        (Some(s), None) => JValue::from(s),
        _ => JValue::Undefined,
    }
}

/// Collapse runs of spaces, tabs and line breaks to one space and strip the ends.
pub fn trim(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending = false;
    for c in s.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r') {
            pending = true;
        } else {
            if pending && !out.is_empty() {
                out.push(' ');
            }
            pending = false;
            out.push(c);
        }
    }
    out
}

/// `$pad(str, width[, char])`: positive width pads on the right, negative on the left.
pub fn pad(value: &JValue, width: &JValue, fill: &JValue) -> JValue {
    let s = match value.as_str() {
        Some(s) => s,
        None => return JValue::Undefined,
    };
    let width = width.as_f64().unwrap_or(0.0);
    let fill = match fill.as_str() {
        Some(fill) if !fill.is_empty() => fill,
        _ => " ",
    };
    let target = width.abs().trunc() as usize;
    let missing = target.saturating_sub(char_len(s));
    if missing == 0 {
        return JValue::from(s);
    }
    let padding: String = fill.chars().cycle().take(missing).collect();
    if width > 0.0 {
        JValue::from(format!("{}{}", s, padding))
    } else {
        JValue::from(format!("{}{}", padding, s))
    }
}

pub fn contains(value: &JValue, pattern: &JValue) -> JValue {
    let s = match value.as_str() {
        Some(s) => s,
        None => return JValue::Undefined,
    };
    match pattern {
        JValue::String(p) => JValue::Bool(s.contains(p.as_ref())),
        JValue::Regex(re) => JValue::Bool(re.is_match(s)),
        _ => JValue::Undefined,
    }
}

fn limit_arg(limit: &JValue, code: &'static str, function: &str) -> Result<Option<usize>, EvaluatorError> {
    match limit.as_f64() {
        Some(n) if n < 0.0 => Err(EvaluatorError::evaluation_error(
            code,
            format!(
                "Third argument of {} function must evaluate to a positive number",
                function
            ),
        )),
        Some(n) => Ok(Some(n.floor() as usize)),
        None => Ok(None),
    }
}

/// `$split(str, separator[, limit])`
pub fn split(value: &JValue, separator: &JValue, limit: &JValue) -> Result<JValue, EvaluatorError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(JValue::Undefined),
    };
    let limit = limit_arg(limit, "D3020", "split")?;
    let parts: Vec<String> = match separator {
        JValue::String(sep) if sep.is_empty() => s.chars().map(String::from).collect(),
        JValue::String(sep) => s.split(sep.as_ref()).map(str::to_string).collect(),
        JValue::Regex(re) => {
            let mut parts = Vec::new();
            let mut position = 0;
            for m in regex_matches(re, s, None)? {
                let (start, end) = (byte_index(s, m.start), byte_index(s, m.end));
                parts.push(s[position..start].to_string());
                position = end;
            }
            parts.push(s[position..].to_string());
            parts
        }
        _ => return Ok(JValue::Undefined),
    };
    let parts = parts
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(JValue::from)
        .collect();
    Ok(JValue::array(parts))
}

fn byte_index(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn join(value: &JValue, separator: &JValue) -> JValue {
    let items = match value.as_array() {
        Some(items) => items,
        None => return JValue::Undefined,
    };
    let separator = separator.as_str().unwrap_or("");
    let parts: Vec<&str> = items.iter().filter_map(JValue::as_str).collect();
    JValue::from(parts.join(separator))
}

/// `$match(str, regex[, limit])`
pub fn match_regex(value: &JValue, pattern: &JValue, limit: &JValue) -> Result<JValue, EvaluatorError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(JValue::Undefined),
    };
    let limit = limit_arg(limit, "D3040", "match")?;
    let re = match pattern {
        JValue::Regex(re) => re,
        _ => {
            return Err(EvaluatorError::type_error(
                "T0410",
                "Argument 2 of function match does not match function signature",
            ))
        }
    };
    let found = regex_matches(re, s, limit)?;
    Ok(JValue::sequence(
        found.iter().map(RegexMatch::to_match_object).collect(),
    ))
}

/// `$replace(str, pattern, replacement[, limit])`
pub fn replace(
    ev: &mut Evaluator,
    value: &JValue,
    pattern: &JValue,
    replacement: &JValue,
    limit: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(JValue::Undefined),
    };
    if pattern.as_str() == Some("") {
        return Err(EvaluatorError::evaluation_error(
            "D3010",
            "Second argument of replace function cannot be an empty string",
        ));
    }
    let limit = limit_arg(limit, "D3011", "replace")?;

    let found = match pattern {
        JValue::String(p) => {
            let mut found = Vec::new();
            let mut from = 0;
            while limit.map_or(true, |limit| found.len() < limit) {
                let index = match s[from..].find(p.as_ref()) {
                    Some(index) => from + index,
                    None => break,
                };
                found.push(RegexMatch {
                    matched: p.to_string(),
                    start: char_offset(s, index),
                    end: char_offset(s, index + p.len()),
                    groups: Vec::new(),
                });
                from = index + p.len();
            }
            found
        }
        JValue::Regex(re) => regex_matches(re, s, limit)?,
        _ => return Ok(JValue::Undefined),
    };

    let mut out = String::with_capacity(s.len());
    let mut position = 0;
    for m in &found {
        let (start, end) = (byte_index(s, m.start), byte_index(s, m.end));
        out.push_str(&s[position..start]);
        match replacement {
            JValue::String(text) if pattern.is_string() => out.push_str(text),
            JValue::String(text) => out.push_str(&substitute(text, m)),
            func if func.is_function() => {
                match ev.apply_callback(func, vec![m.to_value()], context, frame)? {
                    JValue::String(text) => out.push_str(&text),
                    _ => {
                        return Err(EvaluatorError::evaluation_error(
                            "D3012",
                            "Attempted to replace a matched string with a non-string value",
                        ))
                    }
                }
            }
            _ => {}
        }
        position = end;
    }
    out.push_str(&s[position..]);
    Ok(JValue::from(out))
}

/// Expand `$0`, `$1`.. and `$$` in a replacement string.
///
/// A group reference takes as many digits as the group count has, falling
/// back to one digit fewer when that names a group that does not exist.
fn substitute(replacement: &str, m: &RegexMatch) -> String {
    let bytes = replacement.as_bytes();
    let mut out = String::with_capacity(replacement.len());
    let mut position = 0;
    while let Some(offset) = replacement[position..].find('$') {
        let index = position + offset;
        out.push_str(&replacement[position..index]);
        position = index + 1;
        match bytes.get(position) {
            Some(b'$') => {
                out.push('$');
                position += 1;
            }
            Some(b'0') => {
                out.push_str(&m.matched);
                position += 1;
            }
            _ => {
                let groups = m.groups.len();
                let max_digits = if groups == 0 {
                    1
                } else {
                    groups.to_string().len()
                };
                let rest = &replacement[position..];
                let mut group = leading_number(rest, max_digits);
                if max_digits > 1 && group.is_some_and(|g| g > groups) {
                    group = leading_number(rest, max_digits - 1);
                }
                match group {
                    Some(g) => {
                        if let Some(JValue::String(text)) = g.checked_sub(1).and_then(|i| m.groups.get(i)) {
                            out.push_str(text);
                        }
                        position += g.to_string().len();
                    }
                    None => out.push('$'),
                }
            }
        }
    }
    out.push_str(&replacement[position..]);
    out
}

fn leading_number(s: &str, max_digits: usize) -> Option<usize> {
    let digits: String = s
        .chars()
        .take(max_digits)
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

pub fn base64_encode(value: &JValue) -> JValue {
    map_str(value, |s| {
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
    })
}

pub fn base64_decode(value: &JValue) -> Result<JValue, EvaluatorError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(JValue::Undefined),
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s.as_bytes())
        .map_err(|e| {
            EvaluatorError::evaluation_error("D3140", format!("Malformed base64 string: {}", e))
        })?;
    Ok(JValue::from(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Characters `encodeURIComponent` leaves alone.
const UNRESERVED_MARKS: &str = "-_.!~*'()";
/// Further characters `encodeURI` leaves alone.
const RESERVED: &str = ";,/?:@&=+$#";

/// `$encodeUrlComponent` / `$encodeUrl` (`whole_url`).
pub fn encode_url(value: &JValue, whole_url: bool) -> JValue {
    map_str(value, |s| {
        let mut out = String::with_capacity(s.len());
        let mut buf = [0u8; 4];
        for c in s.chars() {
            if c.is_ascii_alphanumeric()
                || UNRESERVED_MARKS.contains(c)
                || (whole_url && RESERVED.contains(c))
            {
                out.push(c);
            } else {
                out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
            }
        }
        out
    })
}

/// `$decodeUrlComponent` / `$decodeUrl` (`whole_url`). The whole-URL form
/// leaves escapes of reserved characters encoded.
pub fn decode_url(value: &JValue, whole_url: bool) -> Result<JValue, EvaluatorError> {
    let s = match value.as_str() {
        Some(s) => s,
        None => return Ok(JValue::Undefined),
    };
    let malformed = || EvaluatorError::evaluation_error("D3140", "Malformed URL passed to decodeURI");
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }
        let hex = bytes.get(i + 1..i + 3).ok_or_else(malformed)?;
        let text = std::str::from_utf8(hex).map_err(|_| malformed())?;
        let byte = u8::from_str_radix(text, 16).map_err(|_| malformed())?;
        if whole_url && byte.is_ascii() && RESERVED.contains(byte as char) {
            decoded.extend_from_slice(&bytes[i..i + 3]);
        } else {
            decoded.push(byte);
        }
        i += 3;
    }
    let text = String::from_utf8(decoded).map_err(|_| malformed())?;
    Ok(JValue::from(text))
}

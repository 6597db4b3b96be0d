// Function signature validation and type checking
// Signatures such as `<s-nn?:s>` are compiled into a regex over one-letter
// argument type symbols

use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::evaluator::EvaluatorError;
use crate::value::JValue;

/// Signature parse errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("S0401: Type parameters can only be applied to functions and arrays")]
    InvalidSubtype { offset: usize },

    #[error("S0402: Choice groups containing parameterized types are not supported")]
    ParameterizedChoice { offset: usize },

    #[error("S0401: Unbalanced brackets in signature {0}")]
    Unbalanced(String),

    #[error("S0401: Unknown type symbol '{symbol}' in signature")]
    UnknownSymbol { symbol: char, offset: usize },
}

/// Parameter type
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Null,
    Object,
    Array,
    Function,
    /// `j`: any JSON value
    Json,
    /// `x`: anything
    Any,
    /// `(sf)`: one of the listed symbols
    Choice(String),
}

/// Function parameter definition
#[derive(Debug, Clone)]
pub struct Parameter {
    pub param_type: ParamType,
    /// `<n>` on arrays and `<s:o>` on functions
    pub subtype: Option<String>,
    /// `-`: the context value stands in when the argument is omitted
    pub context: bool,
    regex: String,
    context_regex: Option<Regex>,
}

/// Function signature
#[derive(Debug, Clone)]
pub struct Signature {
    source: String,
    params: Vec<Parameter>,
    matcher: Regex,
}

/// One-letter type symbol of a runtime value.
pub fn type_symbol(value: &JValue) -> char {
    match value {
        JValue::Undefined => 'm',
        JValue::Null => 'l',
        JValue::Bool(_) => 'b',
        JValue::Number(_) => 'n',
        JValue::String(_) => 's',
        JValue::Array(..) => 'a',
        JValue::Object(_) => 'o',
        JValue::Lambda(_) | JValue::Builtin(_) | JValue::Regex(_) => 'f',
    }
}

fn array_of(symbol: &str) -> &'static str {
    match symbol {
        "a" => "arrays",
        "b" => "booleans",
        "f" => "functions",
        "n" => "numbers",
        "o" => "objects",
        "s" => "strings",
        _ => "values",
    }
}

fn closing_bracket(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 1;
    let mut position = start + 1;
    while position < chars.len() {
        if chars[position] == close {
            depth -= 1;
            if depth == 0 {
                return Some(position);
            }
        } else if chars[position] == open {
            depth += 1;
        }
        position += 1;
    }
    None
}

impl Signature {
    /// Parse a signature such as `<s-nn?:s>`. The return type is not checked.
    pub fn parse(source: &str) -> Result<Self, SignatureError> {
        let chars: Vec<char> = source.chars().collect();
        let mut params: Vec<Parameter> = Vec::new();
        let mut position = 1;

        while position < chars.len() {
            let symbol = chars[position];
            if symbol == ':' {
                break;
            }
            let simple = |param_type: ParamType, regex: &str| Parameter {
                param_type,
                subtype: None,
                context: false,
                regex: regex.to_string(),
                context_regex: None,
            };
            match symbol {
                's' => params.push(simple(ParamType::String, "[sm]")),
                'n' => params.push(simple(ParamType::Number, "[nm]")),
                'b' => params.push(simple(ParamType::Boolean, "[bm]")),
                'l' => params.push(simple(ParamType::Null, "[lm]")),
                'o' => params.push(simple(ParamType::Object, "[om]")),
                'a' => params.push(simple(ParamType::Array, "[asnblfom]")),
                'f' => params.push(simple(ParamType::Function, "f")),
                'j' => params.push(simple(ParamType::Json, "[asnblom]")),
                'x' => params.push(simple(ParamType::Any, "[asnblfom]")),
                '-' => {
                    if let Some(prev) = params.last_mut() {
                        prev.context = true;
                        prev.context_regex = Regex::new(&format!("^{}$", prev.regex)).ok();
                        prev.regex.push('?');
                    }
                }
                '?' | '+' => {
                    if let Some(prev) = params.last_mut() {
                        prev.regex.push(symbol);
                    }
                }
                '(' => {
                    let end = closing_bracket(&chars, position, '(', ')')
                        .ok_or_else(|| SignatureError::Unbalanced(source.to_string()))?;
                    let choice: String = chars[position + 1..end].iter().collect();
                    if choice.contains('<') {
                        return Err(SignatureError::ParameterizedChoice { offset: position });
                    }
                    params.push(simple(
                        ParamType::Choice(choice.clone()),
                        &format!("[{}m]", choice),
                    ));
                    position = end;
                }
                '<' => {
                    let accepts = matches!(
                        params.last().map(|p| &p.param_type),
                        Some(ParamType::Array) | Some(ParamType::Function)
                    );
                    if !accepts {
                        return Err(SignatureError::InvalidSubtype { offset: position });
                    }
                    let end = closing_bracket(&chars, position, '<', '>')
                        .ok_or_else(|| SignatureError::Unbalanced(source.to_string()))?;
                    if let Some(prev) = params.last_mut() {
                        prev.subtype = Some(chars[position + 1..end].iter().collect());
                    }
                    position = end;
                }
                '>' => {}
                other => {
                    return Err(SignatureError::UnknownSymbol {
                        symbol: other,
                        offset: position,
                    })
                }
            }
            position += 1;
        }

        let pattern: String = params.iter().map(|p| format!("({})", p.regex)).collect();
        let matcher = Regex::new(&format!("^{}$", pattern))
            .map_err(|_| SignatureError::Unbalanced(source.to_string()))?;
        Ok(Signature {
            source: source.to_string(),
            params,
            matcher,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Number of declared parameters, used when a higher-order function
    /// decides how many arguments to pass.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Parameters a higher-order caller must supply: optional ones are left
    /// out, context parameters are not.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.context || !p.regex.ends_with('?'))
            .count()
    }

    /// Fewest and most arguments a call may supply; `None` when variadic.
    fn arity_range(&self) -> (usize, Option<usize>) {
        let min = self
            .params
            .iter()
            .filter(|p| !p.regex.ends_with('?'))
            .count();
        let max = if self.params.iter().any(|p| p.regex.ends_with('+')) {
            None
        } else {
            Some(self.params.len())
        };
        (min, max)
    }

    /// Check `args` against the signature, filling in the context value for
    /// `-` parameters and wrapping single values passed where an array is
    /// expected.
    pub fn validate(
        &self,
        args: Vec<JValue>,
        context: &JValue,
        name: &str,
    ) -> Result<Vec<JValue>, EvaluatorError> {
        let (min, max) = self.arity_range();
        let actual = args.len();
        if max.is_some_and(|max| actual > max) || actual < min {
            let expected = match max {
                Some(max) if max == min => format!("{}", max),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(EvaluatorError::type_error(
                "T0410",
                format!(
                    "Function {} expects {} argument(s) but received {}",
                    name, expected, actual
                ),
            ));
        }

        let supplied: String = args.iter().map(type_symbol).collect();
        let captures = match self.matcher.captures(&supplied) {
            Some(captures) => captures,
            None => return Err(self.mismatch(&supplied, name)),
        };

        let mut validated = Vec::with_capacity(self.params.len());
        let mut arg_index = 0;
        for (index, param) in self.params.iter().enumerate() {
            let matched = captures.get(index + 1).map(|m| m.as_str()).unwrap_or("");
            if matched.is_empty() {
                if param.context {
                    let symbol = type_symbol(context).to_string();
                    let compatible = param
                        .context_regex
                        .as_ref()
                        .is_some_and(|re| re.is_match(&symbol));
                    if !compatible {
                        return Err(EvaluatorError::type_error(
                            "T0411",
                            format!(
                                "Context value is not a compatible type with argument {} of function {}",
                                index + 1,
                                name
                            ),
                        ));
                    }
                    validated.push(context.clone());
                } else {
                    validated.push(args.get(arg_index).cloned().unwrap_or(JValue::Undefined));
                    arg_index += 1;
                }
                continue;
            }
            for single in matched.chars() {
                let arg = args.get(arg_index).cloned().unwrap_or(JValue::Undefined);
                if param.param_type == ParamType::Array {
                    if single == 'm' {
                        validated.push(JValue::Undefined);
                    } else {
                        self.check_array_subtype(param, single, matched, &arg, index, name)?;
                        if single == 'a' {
                            validated.push(arg);
                        } else {
                            validated.push(JValue::array(vec![arg]));
                        }
                    }
                } else {
                    validated.push(arg);
                }
                arg_index += 1;
            }
        }
        Ok(validated)
    }

    fn check_array_subtype(
        &self,
        param: &Parameter,
        single: char,
        matched: &str,
        arg: &JValue,
        index: usize,
        name: &str,
    ) -> Result<(), EvaluatorError> {
        let subtype = match &param.subtype {
            Some(subtype) => subtype,
            None => return Ok(()),
        };
        let ok = if single != 'a' {
            matched == subtype
        } else {
            match arg.as_array() {
                Some(items) if !items.is_empty() => {
                    let first = type_symbol(&items[0]);
                    subtype.starts_with(first)
                        && items.iter().all(|item| type_symbol(item) == first)
                }
                _ => true,
            }
        };
        if ok {
            Ok(())
        } else {
            Err(EvaluatorError::type_error(
                "T0412",
                format!(
                    "Argument {} of function {} must be an array of {}",
                    index + 1,
                    name,
                    array_of(subtype)
                ),
            ))
        }
    }

    /// Locate the first parameter the supplied symbols fail to match.
    fn mismatch(&self, supplied: &str, name: &str) -> EvaluatorError {
        let mut partial = String::from("^");
        let mut good_to = 0;
        for param in &self.params {
            partial.push_str(&param.regex);
            match Regex::new(&partial).ok().and_then(|re| re.find(supplied)) {
                Some(m) => good_to = m.end(),
                None => break,
            }
        }
        EvaluatorError::type_error(
            "T0410",
            format!(
                "Argument {} of function {} does not match function signature",
                good_to + 1,
                name
            ),
        )
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl serde::Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Signature::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sig(s: &str) -> Signature {
        Signature::parse(s).unwrap()
    }

    #[test]
    fn test_parse_params() {
        let s = sig("<s-nn?:s>");
        assert_eq!(s.arity(), 3);
        assert!(s.params()[0].context);
        assert_eq!(s.params()[1].param_type, ParamType::Number);

        let s = sig("<a<n>:n>");
        assert_eq!(s.params()[0].subtype.as_deref(), Some("n"));

        let s = sig("<s-(sf)(sf)n?:s>");
        assert_eq!(s.params()[1].param_type, ParamType::Choice("sf".into()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Signature::parse("<s<n>:s>"),
            Err(SignatureError::InvalidSubtype { .. })
        ));
        assert!(matches!(
            Signature::parse("<(a<n>):s>"),
            Err(SignatureError::ParameterizedChoice { .. })
        ));
        assert!(matches!(
            Signature::parse("<q:s>"),
            Err(SignatureError::UnknownSymbol { symbol: 'q', .. })
        ));
    }

    #[test]
    fn test_context_argument_is_inserted() {
        let s = sig("<s-:s>");
        let args = s.validate(vec![], &JValue::from("ctx"), "$uppercase").unwrap();
        assert_eq!(args, vec![JValue::from("ctx")]);

        let err = s.validate(vec![], &JValue::from(1i64), "$uppercase").unwrap_err();
        assert_eq!(err.code(), "T0411");
    }

    #[test]
    fn test_single_value_wrapped_as_array() {
        let s = sig("<a<n>:n>");
        let args = s.validate(vec![JValue::from(5i64)], &JValue::Undefined, "$sum").unwrap();
        assert_eq!(args, vec![JValue::from(json!([5]))]);
    }

    #[test]
    fn test_array_subtype_checked() {
        let s = sig("<a<n>:n>");
        let err = s
            .validate(vec![json!([1, "two"]).into()], &JValue::Undefined, "$sum")
            .unwrap_err();
        assert_eq!(err.code(), "T0412");
        assert!(err.to_string().contains("must be an array of numbers"));
    }

    #[test]
    fn test_arity_errors_name_function_and_counts() {
        let s = sig("<s-nn?:s>");
        let err = s
            .validate(
                vec![
                    JValue::from("a"),
                    JValue::from(1i64),
                    JValue::from(2i64),
                    JValue::from(3i64),
                ],
                &JValue::Undefined,
                "$substring",
            )
            .unwrap_err();
        assert_eq!(err.code(), "T0410");
        let message = err.to_string();
        assert!(message.contains("$substring"));
        assert!(message.contains("received 4"));
    }

    #[test]
    fn test_type_mismatch_names_argument() {
        let s = sig("<n-n:n>");
        let err = s
            .validate(
                vec![JValue::from(2i64), JValue::from("x")],
                &JValue::Undefined,
                "$power",
            )
            .unwrap_err();
        assert_eq!(err.code(), "T0410");
        assert!(err.to_string().contains("Argument 2 of function $power"));
    }

    #[test]
    fn test_undefined_arguments_match_optional_types() {
        let s = sig("<s-:s>");
        let args = s
            .validate(vec![JValue::Undefined], &JValue::from("ctx"), "$trim")
            .unwrap();
        assert_eq!(args, vec![JValue::Undefined]);
    }

    #[test]
    fn test_variadic() {
        let s = sig("<a+>");
        let args = s
            .validate(
                vec![json!([1]).into(), json!([2]).into(), json!([3]).into()],
                &JValue::Undefined,
                "$zip",
            )
            .unwrap();
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_serde_as_source_text() {
        let s = sig("<n-n?:n>");
        let text = serde_json::to_string(&s).unwrap();
        assert_eq!(text, "\"<n-n?:n>\"");
        let back: Signature = serde_json::from_str(&text).unwrap();
        assert_eq!(back, s);
    }
}

// jsonata-eval - JSONata expressions evaluated against JSON documents
// Copyright (c) 2025 jsonata-eval contributors
// Licensed under the MIT License

//! # jsonata-eval
//!
//! A Rust implementation of JSONata, the JSON query and transformation language.
//!
//! The whole contract is text in, text out: an expression and a JSON document
//! go in, and either the JSON text of the result or an error comes back.
//!
//! ```
//! let out = jsonata_eval::evaluate("$sum(items.price)", r#"{"items": [{"price": 2}, {"price": 3}]}"#);
//! assert_eq!(out.unwrap(), "5");
//! ```
//!
//! ## Architecture
//!
//! - `lexer` - Tokenizer (JSONata text to tokens)
//! - `parser` - Pratt parser (tokens to AST)
//! - `ast` - Abstract Syntax Tree definitions
//! - `evaluator` - Tree-walking evaluator with a depth guard
//! - `environment` - Frame arena for variable scopes
//! - `functions` - Built-in function library
//! - `signature` - Function signature parsing and argument validation
//! - `value` - Document model with Undefined, sequences and functions
//! - `datetime` - Date/time handling functions
//! - `utils` - Number formatting and string helpers

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

pub mod ast;
pub mod datetime;
pub mod environment;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod signature;
pub mod utils;
pub mod value;

pub use ast::AstNode;
pub use evaluator::{EvalOptions, Evaluator, EvaluatorError};
pub use parser::ParserError;
pub use value::{JValue, JsonFormat};

/// Text returned when an expression produces no value.
pub const UNDEFINED: &str = "undefined";

/// Errors from compiling or evaluating an expression.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] ParserError),

    #[error(transparent)]
    Evaluation(#[from] EvaluatorError),

    #[error("Invalid JSON input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    #[error("Input is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Coarse classification of an [`Error`], for callers that map failures to
/// status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input document is not valid JSON.
    InvalidJson,
    /// An argument could not be read at all.
    InvalidArgs,
    /// The expression failed to parse or to evaluate.
    Expression,
}

impl Error {
    /// The JSONata error code, e.g. `S0201` or `T2001`.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax(e) => e.code(),
            Error::Evaluation(e) => e.code(),
            Error::InvalidInput(_) => "JSON",
            Error::InvalidUtf8(_) => "UTF8",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidJson,
            Error::InvalidUtf8(_) => ErrorKind::InvalidArgs,
            Error::Syntax(_) | Error::Evaluation(_) => ErrorKind::Expression,
        }
    }
}

/// A compiled JSONata expression that can be evaluated against data.
///
/// Compile once, then evaluate any number of times. Compiled expressions hold
/// no per-evaluation state and can be shared across threads.
///
/// ```
/// use jsonata_eval::JsonataExpression;
///
/// let expr = JsonataExpression::compile("orders[price > 100].product").unwrap();
/// let out = expr.evaluate(r#"{"orders": [{"product": "A", "price": 150}]}"#).unwrap();
/// assert_eq!(out, r#""A""#);
/// ```
#[derive(Debug, Clone)]
pub struct JsonataExpression {
    ast: AstNode,
    options: EvalOptions,
}

impl JsonataExpression {
    pub fn compile(expression: &str) -> Result<Self, Error> {
        let ast = parser::parse(expression)?;
        debug!(expression, "compiled expression");
        Ok(JsonataExpression {
            ast,
            options: EvalOptions::default(),
        })
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ast(&self) -> &AstNode {
        &self.ast
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Evaluate against JSON text; empty input means no input document.
    ///
    /// Returns compact JSON, or [`UNDEFINED`] when the result is Undefined.
    pub fn evaluate(&self, input: &str) -> Result<String, Error> {
        self.evaluate_with_bindings(input, &IndexMap::new())
    }

    /// Like [`evaluate`](Self::evaluate), with extra variables bound in the
    /// outermost scope. Names are given without the leading `$`.
    pub fn evaluate_with_bindings(
        &self,
        input: &str,
        bindings: &IndexMap<String, JValue>,
    ) -> Result<String, Error> {
        let input = parse_input(input)?;
        let result = self.evaluate_value(&input, bindings)?;
        Ok(result.to_json_string())
    }

    /// Evaluate against an already parsed document.
    pub fn evaluate_value(
        &self,
        input: &JValue,
        bindings: &IndexMap<String, JValue>,
    ) -> Result<JValue, Error> {
        let mut evaluator = Evaluator::with_options(self.options);
        for (name, value) in bindings {
            evaluator.bind(name.trim_start_matches('$'), value.clone());
        }
        let result = evaluator.evaluate(&self.ast, input)?;
        debug!(result_type = ?result.type_name(), "evaluated expression");
        Ok(result)
    }

    /// Evaluate and write the result with the given JSON layout.
    pub fn evaluate_json(&self, input: &str, format: JsonFormat) -> Result<String, Error> {
        let input = parse_input(input)?;
        let result = self.evaluate_value(&input, &IndexMap::new())?;
        Ok(result
            .to_json(format)
            .unwrap_or_else(|| UNDEFINED.to_string()))
    }
}

impl fmt::Display for JsonataExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.ast)
    }
}

/// Parse JSON input text; empty or whitespace-only text means no document.
pub fn parse_input(input: &str) -> Result<JValue, Error> {
    if input.trim().is_empty() {
        return Ok(JValue::Undefined);
    }
    Ok(JValue::from_json_str(input)?)
}

/// Compile an expression for repeated evaluation.
pub fn compile(expression: &str) -> Result<JsonataExpression, Error> {
    JsonataExpression::compile(expression)
}

/// Evaluate `expression` against the JSON text `input` in one step.
///
/// An empty `input` evaluates with no input document. An Undefined result is
/// returned as the text `undefined`.
pub fn evaluate(expression: &str, input: &str) -> Result<String, Error> {
    JsonataExpression::compile(expression)?.evaluate(input)
}

/// [`evaluate`] for callers holding raw bytes.
pub fn evaluate_bytes(expression: &[u8], input: &[u8]) -> Result<String, Error> {
    let expression = std::str::from_utf8(expression)?;
    let input = std::str::from_utf8(input)?;
    evaluate(expression, input)
}

// Expression evaluator
// Walks the AST against a JValue input; path results are flattened per step
// and every node's sequence result is collapsed before it is returned

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::ast::{AstNode, BinaryOp, PathExpr, PathStep, SortTerm, Stage, TransformDef};
use crate::environment::{Environment, FrameId};
use crate::functions::{self, BuiltinFn};
use crate::value::{ArrayFlags, Closure, JValue, STACK_RED_ZONE, STACK_SEGMENT};

/// Default bound on nested evaluation before `U1001` is raised.
pub const DEFAULT_MAX_DEPTH: usize = 300;

/// Default bound on the number of items a range may allocate.
pub const DEFAULT_MAX_RANGE: usize = 10_000_000;

/// Evaluator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("{code}: {message}")]
    TypeError { code: &'static str, message: String },

    #[error("{code}: {message}")]
    ReferenceError { code: &'static str, message: String },

    #[error("{code}: {message}")]
    EvaluationError { code: &'static str, message: String },

    #[error("U1001: Stack overflow error: evaluation exceeded the maximum depth of {max}")]
    DepthExceeded { max: usize },
}

impl EvaluatorError {
    pub fn type_error(code: &'static str, message: impl Into<String>) -> Self {
        EvaluatorError::TypeError {
            code,
            message: message.into(),
        }
    }

    pub fn reference_error(code: &'static str, message: impl Into<String>) -> Self {
        EvaluatorError::ReferenceError {
            code,
            message: message.into(),
        }
    }

    pub fn evaluation_error(code: &'static str, message: impl Into<String>) -> Self {
        EvaluatorError::EvaluationError {
            code,
            message: message.into(),
        }
    }

    /// JSONata error code, e.g. `T2001`
    pub fn code(&self) -> &'static str {
        match self {
            EvaluatorError::TypeError { code, .. }
            | EvaluatorError::ReferenceError { code, .. }
            | EvaluatorError::EvaluationError { code, .. } => code,
            EvaluatorError::DepthExceeded { .. } => "U1001",
        }
    }
}

/// Limits applied to a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvalOptions {
    /// Maximum nesting of evaluation (recursive lambdas, deep expressions).
    pub max_depth: usize,
    /// Maximum number of items the `..` operator may produce.
    pub max_range: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            max_range: DEFAULT_MAX_RANGE,
        }
    }
}

/// A context value plus the positional variables bound along a path.
#[derive(Debug, Clone)]
struct Tuple {
    context: JValue,
    bindings: Vec<(String, JValue)>,
}

impl Tuple {
    fn new(context: JValue) -> Self {
        Tuple {
            context,
            bindings: Vec::new(),
        }
    }

    fn bind(&mut self, name: &str, value: JValue) {
        match self.bindings.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.bindings.push((name.to_string(), value)),
        }
    }
}

enum GroupInput {
    Values(JValue),
    Tuples(Vec<Tuple>),
}

/// Tree-walking evaluator.
///
/// One evaluator serves one evaluation: it owns the variable frames, the
/// timestamp reported by `$now()`/`$millis()` and the compiled regexes.
pub struct Evaluator {
    env: Environment,
    options: EvalOptions,
    depth: usize,
    timestamp: DateTime<Utc>,
    regexes: HashMap<(String, String), Rc<regex::Regex>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_options(EvalOptions::default())
    }

    pub fn with_options(options: EvalOptions) -> Self {
        Evaluator {
            env: Environment::new(),
            options,
            depth: 0,
            timestamp: Utc::now(),
            regexes: HashMap::new(),
        }
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Bind a variable in the outermost frame, visible as `$name`.
    pub fn bind(&mut self, name: impl Into<String>, value: JValue) {
        let root = self.env.root();
        self.env.bind(root, name, value);
    }

    /// Instant fixed for the lifetime of this evaluator.
    pub(crate) fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Evaluate an expression against an input document.
    ///
    /// A top-level array is wrapped so that `$` still refers to the whole
    /// array while path steps iterate over its members.
    pub fn evaluate(&mut self, ast: &AstNode, input: &JValue) -> Result<JValue, EvaluatorError> {
        let input = wrap_input(input);
        let root = self.env.root();
        self.env.bind(root, "$", input.clone());
        self.eval(ast, &input, root)
    }

    /// Evaluate `ast` with `input` as `$` in a child of `frame` (`$eval`).
    pub(crate) fn evaluate_nested(
        &mut self,
        ast: &AstNode,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let input = wrap_input(input);
        let mark = self.env.mark();
        let child = self.env.push(frame);
        self.env.bind(child, "$", input.clone());
        let result = self.eval(ast, &input, child)?;
        self.release(mark, &result);
        Ok(result)
    }

    pub(crate) fn eval(
        &mut self,
        node: &AstNode,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        if self.depth >= self.options.max_depth {
            return Err(EvaluatorError::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.eval_node(node, input, frame)
        });
        self.depth -= 1;
        Ok(result?.collapse())
    }

    fn eval_node(
        &mut self,
        node: &AstNode,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        match node {
            AstNode::String(s) => Ok(JValue::string(s.as_str())),
            AstNode::Number(n) => Ok(JValue::Number(*n)),
            AstNode::Boolean(b) => Ok(JValue::Bool(*b)),
            AstNode::Null => Ok(JValue::Null),
            AstNode::Regex { pattern, flags } => {
                self.compile_regex(pattern, flags).map(JValue::Regex)
            }
            AstNode::Name(name) => Ok(lookup_field(input, name)),
            AstNode::Variable(name) => Ok(self.lookup_variable(name, input, frame)),
            AstNode::Wildcard => Ok(wildcard(input)),
            AstNode::Descendant => Ok(descendants(input)),
            AstNode::Path(path) => self.evaluate_path(path, input, frame),
            AstNode::Filter {
                input: inner,
                predicates,
                keep_array,
            } => {
                let mut value = self.eval(inner, input, frame)?;
                for predicate in predicates {
                    value = self.apply_filter(predicate, value, frame)?;
                }
                if *keep_array {
                    value = value.flagged(ArrayFlags::KEEP_SINGLETON);
                }
                Ok(value)
            }
            AstNode::Group { input: inner, pairs } => {
                let value = self.eval(inner, input, frame)?;
                self.evaluate_group(pairs, GroupInput::Values(value), frame)
            }
            AstNode::Sort(terms) => {
                let sorted = self.sort_values(terms, input.to_members(), frame)?;
                Ok(JValue::sequence(sorted))
            }
            AstNode::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs, input, frame),
            AstNode::Negate(operand) => match self.eval(operand, input, frame)? {
                JValue::Undefined => Ok(JValue::Undefined),
                JValue::Number(n) => Ok(JValue::Number(-n)),
                other => Err(EvaluatorError::evaluation_error(
                    "D1002",
                    format!("Cannot negate a non-numeric value: {}", other),
                )),
            },
            AstNode::Array { items, cons } => self.evaluate_array(items, *cons, input, frame),
            AstNode::Object(pairs) => {
                self.evaluate_group(pairs, GroupInput::Values(input.clone()), frame)
            }
            AstNode::Block(exprs) => self.evaluate_block(exprs, input, frame),
            AstNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, input, frame)?.to_boolean() {
                    self.eval(then_branch, input, frame)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch, input, frame)
                } else {
                    Ok(JValue::Undefined)
                }
            }
            AstNode::Bind { name, value } => {
                let value = self.eval(value, input, frame)?;
                self.env.bind(frame, name.as_str(), value.clone());
                Ok(value)
            }
            AstNode::Apply { lhs, rhs } => self.evaluate_apply(lhs, rhs, input, frame),
            AstNode::Function { procedure, args } => {
                self.evaluate_function(procedure, args, input, frame, None)
            }
            AstNode::Partial { procedure, args } => {
                self.evaluate_partial(procedure, args, input, frame)
            }
            AstNode::Placeholder => Ok(JValue::Undefined),
            AstNode::Lambda(def) => Ok(JValue::closure(Closure::Lambda {
                def: Arc::clone(def),
                frame,
                input: input.clone(),
            })),
            AstNode::Transform(def) => Ok(JValue::closure(Closure::Transform {
                def: Arc::clone(def),
                frame,
            })),
        }
    }

    fn lookup_variable(&self, name: &str, input: &JValue, frame: FrameId) -> JValue {
        if name.is_empty() {
            return unwrap_outer(input);
        }
        if let Some(value) = self.env.lookup(frame, name) {
            return value.clone();
        }
        BuiltinFn::from_name(name)
            .map(JValue::Builtin)
            .unwrap_or(JValue::Undefined)
    }

    fn compile_regex(&mut self, pattern: &str, flags: &str) -> Result<Rc<regex::Regex>, EvaluatorError> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = self.regexes.get(&key) {
            return Ok(Rc::clone(re));
        }
        let re = crate::utils::build_regex(pattern, flags).map_err(|e| {
            EvaluatorError::evaluation_error(
                "S0303",
                format!("Invalid regular expression /{}/: {}", pattern, e),
            )
        })?;
        let re = Rc::new(re);
        self.regexes.insert(key, Rc::clone(&re));
        Ok(re)
    }

    /// Drop frames pushed since `mark` unless `result` may still refer to them.
    fn release(&mut self, mark: usize, result: &JValue) {
        if !result.contains_function() {
            self.env.release(mark);
        }
    }

    // ── Paths ────────────────────────────────────────────────────────────────

    fn evaluate_path(
        &mut self,
        path: &PathExpr,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        // A leading variable is evaluated once, not per member of the input
        let first_is_variable = matches!(
            path.steps.first().map(|s| &s.node),
            Some(AstNode::Variable(_))
        );
        let mut current: Vec<JValue> = match input {
            JValue::Array(items, _) if !first_is_variable => items.as_ref().clone(),
            other => vec![other.clone()],
        };

        let mut result = JValue::sequence(Vec::new());
        let mut tuple_mode = false;
        let mut tuples: Option<Vec<Tuple>> = None;
        let last = path.steps.len().saturating_sub(1);

        for (index, step) in path.steps.iter().enumerate() {
            tuple_mode |= step.tuple;
            if index == 0 && matches!(step.node, AstNode::Array { cons: true, .. }) {
                // An array constructor at the head sees the whole input at once
                let context = JValue::sequence(current);
                let mut value = self.eval(&step.node, &context, frame)?;
                for predicate in step.filters() {
                    value = self.apply_filter(predicate, value, frame)?;
                }
                result = value;
            } else if tuple_mode {
                tuples = Some(self.evaluate_tuple_step(step, &current, tuples.take(), frame)?);
            } else {
                result = self.evaluate_step(step, &current, frame, index == last)?;
            }

            if !tuple_mode {
                match &result {
                    JValue::Undefined => break,
                    JValue::Array(items, _) if items.is_empty() => break,
                    _ => {}
                }
            }
            current = result.to_members();
        }

        if tuple_mode {
            let tuples = tuples.unwrap_or_default();
            if let Some(pairs) = &path.group {
                return self.evaluate_group(pairs, GroupInput::Tuples(tuples), frame);
            }
            result = JValue::sequence(tuples.into_iter().map(|t| t.context).collect());
        }

        if path.keep_singleton {
            if result.has_flag(ArrayFlags::CONS) && !result.is_sequence() {
                result = JValue::sequence(vec![result]);
            }
            result = result.flagged(ArrayFlags::KEEP_SINGLETON);
        }

        match &path.group {
            Some(pairs) => self.evaluate_group(pairs, GroupInput::Values(result), frame),
            None => Ok(result),
        }
    }

    /// Evaluate one step against every member of the input sequence.
    fn evaluate_step(
        &mut self,
        step: &PathStep,
        input: &[JValue],
        frame: FrameId,
        last: bool,
    ) -> Result<JValue, EvaluatorError> {
        if let AstNode::Sort(terms) = &step.node {
            let sorted = self.sort_values(terms, input.to_vec(), frame)?;
            let mut result = JValue::sequence(sorted);
            for predicate in step.filters() {
                result = self.apply_filter(predicate, result, frame)?;
            }
            return Ok(result);
        }

        let mut results = Vec::with_capacity(input.len());
        for item in input {
            let mut value = self.eval(&step.node, item, frame)?;
            for predicate in step.filters() {
                value = self.apply_filter(predicate, value, frame)?;
            }
            if !value.is_undefined() {
                results.push(value);
            }
        }

        // A single array value at the end of a path keeps its structure
        if last && results.len() == 1 && results[0].is_array() && !results[0].is_sequence() {
            return Ok(results.swap_remove(0));
        }

        let mut flattened = Vec::with_capacity(results.len());
        for value in results {
            match value {
                JValue::Array(items, flags) if !flags.contains(ArrayFlags::CONS) => {
                    flattened.extend(items.iter().cloned())
                }
                other => flattened.push(other),
            }
        }
        Ok(JValue::sequence(flattened))
    }

    fn evaluate_tuple_step(
        &mut self,
        step: &PathStep,
        input: &[JValue],
        tuples: Option<Vec<Tuple>>,
        frame: FrameId,
    ) -> Result<Vec<Tuple>, EvaluatorError> {
        if let AstNode::Sort(terms) = &step.node {
            let sorted = match tuples {
                Some(tuples) => self.sort_tuples(terms, tuples, frame)?,
                None => {
                    let sorted = self.sort_values(terms, input.to_vec(), frame)?;
                    sorted
                        .into_iter()
                        .enumerate()
                        .map(|(position, value)| {
                            let mut tuple = Tuple::new(value);
                            if let Some(name) = &step.index {
                                tuple.bind(name, JValue::from(position));
                            }
                            tuple
                        })
                        .collect()
                }
            };
            return self.apply_tuple_stages(&step.stages, sorted, frame);
        }

        let tuples = tuples.unwrap_or_else(|| input.iter().cloned().map(Tuple::new).collect());
        let mut result = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            let value = self.eval_in_tuple(&step.node, tuple, frame)?;
            let members = match value {
                JValue::Undefined => continue,
                JValue::Array(items, _) => items.as_ref().clone(),
                other => vec![other],
            };
            for (position, member) in members.into_iter().enumerate() {
                let mut next = tuple.clone();
                next.context = member;
                if let Some(name) = &step.index {
                    next.bind(name, JValue::from(position));
                }
                result.push(next);
            }
        }
        self.apply_tuple_stages(&step.stages, result, frame)
    }

    fn apply_tuple_stages(
        &mut self,
        stages: &[Stage],
        mut tuples: Vec<Tuple>,
        frame: FrameId,
    ) -> Result<Vec<Tuple>, EvaluatorError> {
        for stage in stages {
            match stage {
                Stage::Filter(predicate) => {
                    tuples = self.filter_tuples(predicate, tuples, frame)?;
                }
                Stage::Index(name) => {
                    for (position, tuple) in tuples.iter_mut().enumerate() {
                        tuple.bind(name, JValue::from(position));
                    }
                }
            }
        }
        Ok(tuples)
    }

    /// Evaluate `node` with the tuple's bindings in scope.
    fn eval_in_tuple(
        &mut self,
        node: &AstNode,
        tuple: &Tuple,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        if tuple.bindings.is_empty() {
            return self.eval(node, &tuple.context, frame);
        }
        let mark = self.env.mark();
        let child = self.env.push(frame);
        for (name, value) in &tuple.bindings {
            self.env.bind(child, name.as_str(), value.clone());
        }
        let result = self.eval(node, &tuple.context, child)?;
        self.release(mark, &result);
        Ok(result)
    }

    // ── Predicates ───────────────────────────────────────────────────────────

    /// `input[predicate]`: a number selects by 1-based position (negative
    /// from the end), anything else keeps the members it is truthy for.
    fn apply_filter(
        &mut self,
        predicate: &AstNode,
        input: JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let items = match input {
            JValue::Array(items, _) => items,
            JValue::Undefined => Rc::new(Vec::new()),
            other => Rc::new(vec![other]),
        };

        if let AstNode::Number(n) = predicate {
            return Ok(match position(*n, items.len()).and_then(|i| items.get(i)) {
                Some(item @ JValue::Array(..)) => item.clone(),
                Some(item) => JValue::sequence(vec![item.clone()]),
                None => JValue::sequence(Vec::new()),
            });
        }

        let mut results = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let res = self.eval(predicate, item, frame)?;
            if predicate_selects(&res, index, items.len()) {
                results.push(item.clone());
            }
        }
        Ok(JValue::sequence(results))
    }

    fn filter_tuples(
        &mut self,
        predicate: &AstNode,
        tuples: Vec<Tuple>,
        frame: FrameId,
    ) -> Result<Vec<Tuple>, EvaluatorError> {
        let len = tuples.len();
        if let AstNode::Number(n) = predicate {
            return Ok(position(*n, len)
                .and_then(|i| tuples.into_iter().nth(i))
                .into_iter()
                .collect());
        }
        let mut results = Vec::new();
        for (index, tuple) in tuples.into_iter().enumerate() {
            let res = self.eval_in_tuple(predicate, &tuple, frame)?;
            if predicate_selects(&res, index, len) {
                results.push(tuple);
            }
        }
        Ok(results)
    }

    // ── Sorting ──────────────────────────────────────────────────────────────

    fn sort_values(
        &mut self,
        terms: &[SortTerm],
        items: Vec<JValue>,
        frame: FrameId,
    ) -> Result<Vec<JValue>, EvaluatorError> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let mut keys = Vec::with_capacity(terms.len());
            for term in terms {
                keys.push(self.eval(&term.expr, &item, frame)?);
            }
            keyed.push((item, keys));
        }
        let sorted = functions::array::merge_sort(keyed, &mut |a, b| {
            sort_key_order(terms, &a.1, &b.1)
        })?;
        Ok(sorted.into_iter().map(|(item, _)| item).collect())
    }

    fn sort_tuples(
        &mut self,
        terms: &[SortTerm],
        tuples: Vec<Tuple>,
        frame: FrameId,
    ) -> Result<Vec<Tuple>, EvaluatorError> {
        if tuples.len() <= 1 {
            return Ok(tuples);
        }
        let mut keyed = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut keys = Vec::with_capacity(terms.len());
            for term in terms {
                keys.push(self.eval_in_tuple(&term.expr, &tuple, frame)?);
            }
            keyed.push((tuple, keys));
        }
        let sorted = functions::array::merge_sort(keyed, &mut |a, b| {
            sort_key_order(terms, &a.1, &b.1)
        })?;
        Ok(sorted.into_iter().map(|(tuple, _)| tuple).collect())
    }

    // ── Constructors and grouping ────────────────────────────────────────────

    fn evaluate_array(
        &mut self,
        items: &[AstNode],
        cons: bool,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            let value = self.eval(item, input, frame)?;
            match value {
                JValue::Undefined => {}
                // Nested constructors stay nested; other arrays are spliced in
                value if matches!(item, AstNode::Array { .. }) => result.push(value),
                JValue::Array(members, _) => result.extend(members.iter().cloned()),
                other => result.push(other),
            }
        }
        let flags = if cons {
            ArrayFlags::CONS
        } else {
            ArrayFlags::NONE
        };
        Ok(JValue::Array(Rc::new(result), flags))
    }

    /// Object constructor over the input: each member is assigned to the
    /// group named by each key expression, then each value expression is
    /// evaluated once per group with the group's members as context.
    fn evaluate_group(
        &mut self,
        pairs: &[(AstNode, AstNode)],
        input: GroupInput,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        // key -> (pair index, member indexes), in first-seen key order
        let mut groups: IndexMap<String, (usize, Vec<usize>)> = IndexMap::new();
        let mut result = IndexMap::new();

        match input {
            GroupInput::Values(value) => {
                let mut items = match value {
                    JValue::Array(items, _) => items.as_ref().clone(),
                    other => vec![other],
                };
                if items.is_empty() {
                    items.push(JValue::Undefined);
                }
                for (item_index, item) in items.iter().enumerate() {
                    for (pair_index, (key_expr, _)) in pairs.iter().enumerate() {
                        let key = self.eval(key_expr, item, frame)?;
                        add_to_group(&mut groups, key, pair_index, item_index)?;
                    }
                }
                for (key, (pair_index, members)) in groups {
                    let context = members.iter().fold(JValue::Undefined, |acc, &i| {
                        functions::array::append(acc, items[i].clone())
                    });
                    let value = self.eval(&pairs[pair_index].1, &context, frame)?;
                    if !value.is_undefined() {
                        result.insert(key, value);
                    }
                }
            }
            GroupInput::Tuples(mut tuples) => {
                if tuples.is_empty() {
                    tuples.push(Tuple::new(JValue::Undefined));
                }
                for (item_index, tuple) in tuples.iter().enumerate() {
                    for (pair_index, (key_expr, _)) in pairs.iter().enumerate() {
                        let key = self.eval_in_tuple(key_expr, tuple, frame)?;
                        add_to_group(&mut groups, key, pair_index, item_index)?;
                    }
                }
                for (key, (pair_index, members)) in groups {
                    let merged = merge_tuples(members.iter().map(|&i| &tuples[i]));
                    let value = self.eval_in_tuple(&pairs[pair_index].1, &merged, frame)?;
                    if !value.is_undefined() {
                        result.insert(key, value);
                    }
                }
            }
        }
        Ok(JValue::object(result))
    }

    fn evaluate_block(
        &mut self,
        exprs: &[AstNode],
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let mark = self.env.mark();
        let child = self.env.push(frame);
        let mut result = JValue::Undefined;
        for expr in exprs {
            result = self.eval(expr, input, child)?;
        }
        self.release(mark, &result);
        Ok(result)
    }

    // ── Operators ────────────────────────────────────────────────────────────

    fn evaluate_binary(
        &mut self,
        op: BinaryOp,
        lhs: &AstNode,
        rhs: &AstNode,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        match op {
            BinaryOp::And => {
                if !self.eval(lhs, input, frame)?.to_boolean() {
                    return Ok(JValue::Bool(false));
                }
                Ok(JValue::Bool(self.eval(rhs, input, frame)?.to_boolean()))
            }
            BinaryOp::Or => {
                if self.eval(lhs, input, frame)?.to_boolean() {
                    return Ok(JValue::Bool(true));
                }
                Ok(JValue::Bool(self.eval(rhs, input, frame)?.to_boolean()))
            }
            BinaryOp::Coalesce => match self.eval(lhs, input, frame)? {
                JValue::Undefined => self.eval(rhs, input, frame),
                value => Ok(value),
            },
            BinaryOp::Default => {
                let value = self.eval(lhs, input, frame)?;
                if value.to_boolean() {
                    Ok(value)
                } else {
                    self.eval(rhs, input, frame)
                }
            }
            _ => {
                let left = self.eval(lhs, input, frame)?;
                let right = self.eval(rhs, input, frame)?;
                match op {
                    BinaryOp::Add
                    | BinaryOp::Subtract
                    | BinaryOp::Multiply
                    | BinaryOp::Divide
                    | BinaryOp::Modulo => arithmetic(op, &left, &right),
                    BinaryOp::Equal => Ok(JValue::Bool(
                        !left.is_undefined() && !right.is_undefined() && left == right,
                    )),
                    BinaryOp::NotEqual => Ok(JValue::Bool(
                        !left.is_undefined() && !right.is_undefined() && left != right,
                    )),
                    BinaryOp::LessThan
                    | BinaryOp::LessThanOrEqual
                    | BinaryOp::GreaterThan
                    | BinaryOp::GreaterThanOrEqual => compare(op, &left, &right),
                    BinaryOp::In => Ok(JValue::Bool(includes(&left, &right))),
                    BinaryOp::Concatenate => {
                        let mut text = functions::string::stringify_or_empty(&left)?;
                        text.push_str(&functions::string::stringify_or_empty(&right)?);
                        Ok(JValue::from(text))
                    }
                    BinaryOp::Range => self.range(&left, &right),
                    _ => Ok(JValue::Undefined),
                }
            }
        }
    }

    fn range(&self, left: &JValue, right: &JValue) -> Result<JValue, EvaluatorError> {
        if !left.is_undefined() && left.as_i64().is_none() {
            return Err(EvaluatorError::type_error(
                "T2003",
                "The left side of the range operator (..) must evaluate to an integer",
            ));
        }
        if !right.is_undefined() && right.as_i64().is_none() {
            return Err(EvaluatorError::type_error(
                "T2004",
                "The right side of the range operator (..) must evaluate to an integer",
            ));
        }
        let (start, end) = match (left.as_i64(), right.as_i64()) {
            (Some(start), Some(end)) => (start, end),
            _ => return Ok(JValue::Undefined),
        };
        if start > end {
            return Ok(JValue::Undefined);
        }
        let size = (end as i128 - start as i128 + 1) as u128;
        if size > self.options.max_range as u128 {
            return Err(EvaluatorError::evaluation_error(
                "D2014",
                format!(
                    "The size of the sequence allocated by the range operator (..) must not exceed {}. Attempted to allocate {}",
                    self.options.max_range, size
                ),
            ));
        }
        Ok(JValue::sequence(
            (start..=end).map(|n| JValue::Number(n as f64)).collect(),
        ))
    }

    // ── Functions ────────────────────────────────────────────────────────────

    fn evaluate_function(
        &mut self,
        procedure: &AstNode,
        args: &[AstNode],
        input: &JValue,
        frame: FrameId,
        applied: Option<JValue>,
    ) -> Result<JValue, EvaluatorError> {
        let func = self.eval(procedure, input, frame)?;
        if func.is_undefined() {
            if let Some(name) = procedure.as_bare_name() {
                if self.lookup_variable(name, input, frame).is_function() {
                    return Err(EvaluatorError::reference_error(
                        "T1005",
                        format!(
                            "Attempted to invoke a non-function. Did you mean ${}?",
                            name
                        ),
                    ));
                }
            }
        }

        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(value) = applied {
            values.push(value);
        }
        for arg in args {
            values.push(self.eval(arg, input, frame)?);
        }
        self.apply_function(&func, values, input, frame, procedure_name(procedure))
    }

    fn evaluate_partial(
        &mut self,
        procedure: &AstNode,
        args: &[AstNode],
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let mut bound = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                AstNode::Placeholder => bound.push(None),
                other => bound.push(Some(self.eval(other, input, frame)?)),
            }
        }
        let target = self.eval(procedure, input, frame)?;
        if !target.is_function() {
            if let Some(name) = procedure.as_bare_name() {
                if target.is_undefined() && self.lookup_variable(name, input, frame).is_function() {
                    return Err(EvaluatorError::reference_error(
                        "T1007",
                        format!(
                            "Attempted to partially apply a non-function. Did you mean ${}?",
                            name
                        ),
                    ));
                }
            }
            return Err(EvaluatorError::reference_error(
                "T1008",
                "Attempted to partially apply a non-function",
            ));
        }
        Ok(JValue::closure(Closure::Partial {
            target,
            args: bound,
        }))
    }

    /// `lhs ~> rhs`: call rhs with lhs as its first argument, or compose two functions.
    fn evaluate_apply(
        &mut self,
        lhs: &AstNode,
        rhs: &AstNode,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        let value = self.eval(lhs, input, frame)?;
        if let AstNode::Function { procedure, args } = rhs {
            return self.evaluate_function(procedure, args, input, frame, Some(value));
        }
        let func = self.eval(rhs, input, frame)?;
        if !func.is_function() {
            return Err(EvaluatorError::type_error(
                "T2006",
                "The right side of the function application operator ~> must be a function",
            ));
        }
        if value.is_function() {
            return Ok(JValue::closure(Closure::Chain {
                first: value,
                then: func,
            }));
        }
        self.apply_function(&func, vec![value], input, frame, procedure_name(rhs))
    }

    /// Invoke any function value. `name` is used in error messages only.
    pub(crate) fn apply_function(
        &mut self,
        func: &JValue,
        args: Vec<JValue>,
        input: &JValue,
        frame: FrameId,
        name: &str,
    ) -> Result<JValue, EvaluatorError> {
        match func {
            JValue::Builtin(builtin) => {
                let context = unwrap_outer(input);
                let args = match builtin.signature() {
                    Some(signature) => signature.validate(args, &context, builtin.name())?,
                    None => args,
                };
                trace!(function = builtin.name(), args = args.len(), "invoking built-in");
                builtin.invoke(self, args, &context, frame)
            }
            JValue::Lambda(closure) => {
                let closure = Rc::clone(closure);
                self.apply_closure(&closure, args, input, frame, name)
            }
            JValue::Regex(re) => {
                let re = Rc::clone(re);
                match args.first() {
                    Some(JValue::String(s)) => {
                        let found = functions::string::regex_matches(&re, s, Some(1))?;
                        Ok(found
                            .first()
                            .map(functions::string::RegexMatch::to_value)
                            .unwrap_or(JValue::Undefined))
                    }
                    Some(JValue::Undefined) | None => Ok(JValue::Undefined),
                    Some(_) => Err(EvaluatorError::type_error(
                        "T0410",
                        "Argument 1 of function regex does not match function signature",
                    )),
                }
            }
            _ => Err(EvaluatorError::reference_error(
                "T1006",
                "Attempted to invoke a non-function",
            )),
        }
    }

    fn apply_closure(
        &mut self,
        closure: &Closure,
        args: Vec<JValue>,
        input: &JValue,
        frame: FrameId,
        name: &str,
    ) -> Result<JValue, EvaluatorError> {
        let label = if name.is_empty() { "lambda" } else { name };
        match closure {
            Closure::Lambda {
                def,
                frame: defined_in,
                input: captured,
            } => {
                let args = match &def.signature {
                    Some(signature) => signature.validate(args, input, label)?,
                    None => {
                        if args.len() > def.params.len() {
                            return Err(EvaluatorError::type_error(
                                "T0410",
                                format!(
                                    "Function {} expects {} argument(s) but received {}",
                                    label,
                                    def.params.len(),
                                    args.len()
                                ),
                            ));
                        }
                        args
                    }
                };
                trace!(function = %label, params = def.params.len(), "invoking lambda");

                let mark = self.env.mark();
                let child = self.env.push(*defined_in);
                let mut args = args.into_iter();
                for param in &def.params {
                    let value = args.next().unwrap_or(JValue::Undefined);
                    self.env.bind(child, param.as_str(), value);
                }
                let result = self.eval(&def.body, captured, child)?;
                self.release(mark, &result);
                Ok(result)
            }
            Closure::Partial { target, args: bound } => {
                let mut supplied = args.into_iter();
                let full: Vec<JValue> = bound
                    .iter()
                    .map(|slot| match slot {
                        Some(value) => value.clone(),
                        None => supplied.next().unwrap_or(JValue::Undefined),
                    })
                    .collect();
                self.apply_function(target, full, input, frame, name)
            }
            Closure::Transform {
                def,
                frame: defined_in,
            } => {
                if args.len() > 1 {
                    return Err(EvaluatorError::type_error(
                        "T0410",
                        format!(
                            "Function transform expects 1 argument(s) but received {}",
                            args.len()
                        ),
                    ));
                }
                let target = args.into_iter().next().unwrap_or(JValue::Undefined);
                self.apply_transform(def, *defined_in, target)
            }
            Closure::Chain { first, then } => {
                let intermediate = self.apply_function(first, args, input, frame, name)?;
                self.apply_function(then, vec![intermediate], input, frame, name)
            }
        }
    }

    /// Call `func` from a higher-order built-in, passing only as many of
    /// `args` as the function declares.
    pub(crate) fn apply_callback(
        &mut self,
        func: &JValue,
        mut args: Vec<JValue>,
        input: &JValue,
        frame: FrameId,
    ) -> Result<JValue, EvaluatorError> {
        args.truncate(function_arity(func));
        self.apply_function(func, args, input, frame, "")
    }

    // ── Transform ────────────────────────────────────────────────────────────

    /// Apply `| pattern | update, delete |` to a copy of `target`.
    fn apply_transform(
        &mut self,
        def: &TransformDef,
        frame: FrameId,
        target: JValue,
    ) -> Result<JValue, EvaluatorError> {
        if target.is_undefined() {
            return Ok(JValue::Undefined);
        }
        if self
            .env
            .lookup(frame, "clone")
            .is_some_and(|clone| !clone.is_function())
        {
            return Err(EvaluatorError::type_error(
                "T2013",
                "The transform expression clones the input object using the $clone() function. This has been overridden in the current scope by a non-function.",
            ));
        }
        if !(target.is_object() || target.is_array()) {
            return Err(EvaluatorError::type_error(
                "T0410",
                "Argument 1 of function transform does not match function signature",
            ));
        }

        let matches = self.eval(&def.pattern, &target, frame)?.to_members();
        let mut edits: HashMap<*const IndexMap<String, JValue>, ObjectEdit> = HashMap::new();

        for matched in &matches {
            let update = self.eval(&def.update, matched, frame)?;
            let update = match update {
                JValue::Undefined => None,
                JValue::Object(map) => Some(map),
                other => {
                    return Err(EvaluatorError::type_error(
                        "T2011",
                        format!(
                            "The insert/update clause of the transform expression must evaluate to an object: {}",
                            other
                        ),
                    ))
                }
            };

            let mut deletes = Vec::new();
            if let Some(delete) = &def.delete {
                let deletions = self.eval(delete, matched, frame)?;
                if !deletions.is_undefined() {
                    let names = match &deletions {
                        JValue::Array(..) => deletions.clone(),
                        other => JValue::array(vec![other.clone()]),
                    };
                    if !names.is_array_of_strings() {
                        return Err(EvaluatorError::type_error(
                            "T2012",
                            format!(
                                "The delete clause of the transform expression must evaluate to a string or array of strings: {}",
                                deletions
                            ),
                        ));
                    }
                    deletes = names
                        .to_members()
                        .iter()
                        .filter_map(|n| n.as_str().map(str::to_string))
                        .collect();
                }
            }

            if let JValue::Object(map) = matched {
                let edit = edits.entry(Rc::as_ptr(map)).or_default();
                if let Some(update) = update {
                    for (key, value) in update.iter() {
                        edit.updates.insert(key.clone(), value.clone());
                    }
                }
                edit.deletes.extend(deletes);
            }
        }

        Ok(rewrite(&target, &edits))
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ObjectEdit {
    updates: IndexMap<String, JValue>,
    deletes: Vec<String>,
}

/// Rebuild `value`, applying the edits recorded for matched objects.
fn rewrite(value: &JValue, edits: &HashMap<*const IndexMap<String, JValue>, ObjectEdit>) -> JValue {
    match value {
        JValue::Object(map) => {
            let mut out: IndexMap<String, JValue> = map
                .iter()
                .map(|(key, value)| (key.clone(), rewrite(value, edits)))
                .collect();
            if let Some(edit) = edits.get(&Rc::as_ptr(map)) {
                for (key, value) in &edit.updates {
                    out.insert(key.clone(), value.clone());
                }
                for key in &edit.deletes {
                    out.shift_remove(key);
                }
            }
            JValue::object(out)
        }
        JValue::Array(items, flags) => JValue::Array(
            Rc::new(items.iter().map(|item| rewrite(item, edits)).collect()),
            *flags,
        ),
        other => other.clone(),
    }
}

/// Wrap a top-level array so `$` can still see it whole.
fn wrap_input(input: &JValue) -> JValue {
    if input.is_array() && !input.is_sequence() {
        JValue::Array(
            Rc::new(vec![input.clone()]),
            ArrayFlags::SEQUENCE | ArrayFlags::OUTER_WRAPPER,
        )
    } else {
        input.clone()
    }
}

/// The value `$` denotes: the wrapped array rather than its wrapper.
fn unwrap_outer(input: &JValue) -> JValue {
    match input {
        JValue::Array(items, flags) if flags.contains(ArrayFlags::OUTER_WRAPPER) => {
            items.first().cloned().unwrap_or(JValue::Undefined)
        }
        other => other.clone(),
    }
}

/// Field lookup, mapped over arrays and flattening array-valued fields.
pub(crate) fn lookup_field(input: &JValue, key: &str) -> JValue {
    match input {
        JValue::Array(items, _) => {
            let mut result = Vec::new();
            for item in items.iter() {
                match lookup_field(item, key) {
                    JValue::Undefined => {}
                    JValue::Array(values, _) => result.extend(values.iter().cloned()),
                    other => result.push(other),
                }
            }
            JValue::sequence(result)
        }
        JValue::Object(map) => map.get(key).cloned().unwrap_or(JValue::Undefined),
        _ => JValue::Undefined,
    }
}

/// `*`: the values of every field, arrays flattened.
fn wildcard(input: &JValue) -> JValue {
    let input = unwrap_outer(input);
    let values: Vec<JValue> = match &input {
        JValue::Object(map) => map.values().cloned().collect(),
        JValue::Array(items, _) => items.as_ref().clone(),
        _ => return JValue::sequence(Vec::new()),
    };
    let mut results = Vec::with_capacity(values.len());
    // Splicing in an array value leaves a plain array behind
    let mut plain = false;
    for value in values {
        if value.is_array() {
            results.extend(flatten(&value));
            plain = true;
        } else {
            results.push(value);
        }
    }
    if plain {
        JValue::array(results)
    } else {
        JValue::sequence(results)
    }
}

fn flatten(value: &JValue) -> Vec<JValue> {
    let mut out = Vec::new();
    let mut stack = vec![value.clone()];
    while let Some(v) = stack.pop() {
        match v {
            JValue::Array(items, _) => stack.extend(items.iter().rev().cloned()),
            other => out.push(other),
        }
    }
    out
}

/// `**`: every value below the input, depth first, arrays not included themselves.
fn descendants(input: &JValue) -> JValue {
    if input.is_undefined() {
        return JValue::Undefined;
    }
    let mut out = Vec::new();
    let mut stack = vec![input.clone()];
    while let Some(value) = stack.pop() {
        match &value {
            JValue::Array(items, _) => stack.extend(items.iter().rev().cloned()),
            JValue::Object(map) => {
                stack.extend(map.values().rev().cloned());
                out.push(value);
            }
            _ => out.push(value),
        }
    }
    if out.len() == 1 {
        out.swap_remove(0)
    } else {
        JValue::sequence(out)
    }
}

/// 1-based position from a predicate number; negative counts from the end.
fn position(n: f64, len: usize) -> Option<usize> {
    let index = n.floor();
    if index >= 1.0 {
        let i = index as usize - 1;
        (i < len).then_some(i)
    } else if index <= -1.0 {
        len.checked_sub((-index) as usize)
    } else {
        None
    }
}

fn predicate_selects(result: &JValue, index: usize, len: usize) -> bool {
    match result {
        JValue::Number(n) => position(*n, len) == Some(index),
        JValue::Array(values, _) if result.is_array_of_numbers() => values
            .iter()
            .any(|v| v.as_f64().and_then(|n| position(n, len)) == Some(index)),
        other => other.to_boolean(),
    }
}

fn add_to_group(
    groups: &mut IndexMap<String, (usize, Vec<usize>)>,
    key: JValue,
    pair_index: usize,
    item_index: usize,
) -> Result<(), EvaluatorError> {
    match key {
        JValue::Undefined => Ok(()),
        JValue::String(key) => {
            match groups.get_mut(&*key) {
                Some(entry) if entry.0 == pair_index => entry.1.push(item_index),
                // The same key from a later pair replaces the earlier group
                Some(entry) => *entry = (pair_index, vec![item_index]),
                None => {
                    groups.insert(key.to_string(), (pair_index, vec![item_index]));
                }
            }
            Ok(())
        }
        other => Err(EvaluatorError::type_error(
            "T1003",
            format!(
                "Key in object structure must evaluate to a string; got: {}",
                other
            ),
        )),
    }
}

/// Combine the tuples of one group: contexts and bindings are appended.
fn merge_tuples<'a>(tuples: impl Iterator<Item = &'a Tuple>) -> Tuple {
    let mut merged = Tuple::new(JValue::Undefined);
    for tuple in tuples {
        merged.context = functions::array::append(merged.context, tuple.context.clone());
        for (name, value) in &tuple.bindings {
            match merged.bindings.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => {
                    slot.1 = functions::array::append(slot.1.clone(), value.clone())
                }
                None => merged.bindings.push((name.clone(), value.clone())),
            }
        }
    }
    merged
}

/// True when the item keyed by `a` must come after the one keyed by `b`.
fn sort_key_order(terms: &[SortTerm], a: &[JValue], b: &[JValue]) -> Result<bool, EvaluatorError> {
    use std::cmp::Ordering;

    for (term, (x, y)) in terms.iter().zip(a.iter().zip(b.iter())) {
        let ordering = match (x, y) {
            // Undefined keys sort last whatever the direction
            (JValue::Undefined, JValue::Undefined) => continue,
            (JValue::Undefined, _) => return Ok(true),
            (_, JValue::Undefined) => return Ok(false),
            (JValue::Number(p), JValue::Number(q)) => p.partial_cmp(q).unwrap_or(Ordering::Equal),
            (JValue::String(p), JValue::String(q)) => compare_strings(p, q),
            (x, y) => {
                let sortable = |v: &JValue| v.is_number() || v.is_string();
                if !sortable(x) || !sortable(y) {
                    return Err(EvaluatorError::type_error(
                        "T2008",
                        "The expressions within an order-by clause must evaluate to numeric or string values",
                    ));
                }
                return Err(EvaluatorError::type_error(
                    "T2007",
                    format!(
                        "Type mismatch within order-by clause. All values must be of the same type: {} and {}",
                        x, y
                    ),
                ));
            }
        };
        let ordering = if term.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return Ok(ordering == Ordering::Greater);
        }
    }
    Ok(false)
}

/// String ordering by UTF-16 code units.
pub(crate) fn compare_strings(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn arithmetic(op: BinaryOp, left: &JValue, right: &JValue) -> Result<JValue, EvaluatorError> {
    if !left.is_undefined() && !left.is_number() {
        return Err(EvaluatorError::type_error(
            "T2001",
            format!("The left side of the {} operator must evaluate to a number", op),
        ));
    }
    if !right.is_undefined() && !right.is_number() {
        return Err(EvaluatorError::type_error(
            "T2002",
            format!("The right side of the {} operator must evaluate to a number", op),
        ));
    }
    let (l, r) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(JValue::Undefined),
    };
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => l / r,
        _ => l % r,
    };
    if !result.is_finite() {
        return Err(EvaluatorError::evaluation_error(
            "D1001",
            format!(
                "Number out of range: {} {} {} is not a finite number",
                crate::utils::format_number(l),
                op,
                crate::utils::format_number(r)
            ),
        ));
    }
    Ok(JValue::Number(result))
}

fn compare(op: BinaryOp, left: &JValue, right: &JValue) -> Result<JValue, EvaluatorError> {
    use std::cmp::Ordering;

    let comparable = |v: &JValue| v.is_undefined() || v.is_number() || v.is_string();
    if !comparable(left) || !comparable(right) {
        return Err(EvaluatorError::type_error(
            "T2010",
            format!(
                "The expressions either side of operator \"{}\" must evaluate to numeric or string values",
                op
            ),
        ));
    }
    let ordering = match (left, right) {
        (JValue::Undefined, _) | (_, JValue::Undefined) => return Ok(JValue::Undefined),
        (JValue::Number(l), JValue::Number(r)) => match l.partial_cmp(r) {
            Some(ordering) => ordering,
            None => return Ok(JValue::Bool(false)),
        },
        (JValue::String(l), JValue::String(r)) => compare_strings(l, r),
        _ => {
            return Err(EvaluatorError::type_error(
                "T2009",
                format!(
                    "The values {} and {} either side of operator \"{}\" must be of the same data type",
                    left, right, op
                ),
            ))
        }
    };
    let result = match op {
        BinaryOp::LessThan => ordering == Ordering::Less,
        BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOp::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(JValue::Bool(result))
}

/// `in`: membership by strict equality; containers match only themselves.
fn includes(left: &JValue, right: &JValue) -> bool {
    if left.is_undefined() || right.is_undefined() {
        return false;
    }
    let strict = |candidate: &JValue| match (left, candidate) {
        (JValue::Array(a, _), JValue::Array(b, _)) => Rc::ptr_eq(a, b),
        (JValue::Object(a), JValue::Object(b)) => Rc::ptr_eq(a, b),
        (JValue::Array(..), _) | (JValue::Object(_), _) => false,
        (l, c) => l == c,
    };
    match right {
        JValue::Array(items, _) => items.iter().any(strict),
        other => strict(other),
    }
}

/// Name used for a call target in error messages.
fn procedure_name(procedure: &AstNode) -> &str {
    match procedure {
        AstNode::Variable(name) => name,
        other => other.as_bare_name().unwrap_or(""),
    }
}

/// Number of arguments a higher-order function passes to `func`.
pub(crate) fn function_arity(func: &JValue) -> usize {
    match func {
        JValue::Builtin(builtin) => builtin
            .signature()
            .map(|signature| signature.required_arity())
            .unwrap_or(1),
        JValue::Lambda(closure) => match closure.as_ref() {
            Closure::Lambda { def, .. } => def.params.len(),
            Closure::Partial { args, .. } => args.iter().filter(|a| a.is_none()).count(),
            Closure::Transform { .. } => 1,
            Closure::Chain { first, .. } => function_arity(first),
        },
        JValue::Regex(_) => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval_with(expr: &str, data: &str) -> Result<JValue, EvaluatorError> {
        let ast = parse(expr).unwrap();
        let data = if data.is_empty() {
            JValue::Undefined
        } else {
            JValue::from_json_str(data).unwrap()
        };
        Evaluator::new().evaluate(&ast, &data)
    }

    fn eval(expr: &str, data: &str) -> String {
        eval_with(expr, data).unwrap().to_json_string()
    }

    fn error_code(expr: &str, data: &str) -> &'static str {
        eval_with(expr, data).unwrap_err().code()
    }

    #[test]
    fn test_evaluate_literals() {
        let mut evaluator = Evaluator::new();
        let data = JValue::Null;

        let result = evaluator.evaluate(&AstNode::string("hello"), &data).unwrap();
        assert_eq!(result, JValue::from("hello"));

        let result = evaluator.evaluate(&AstNode::Number(42.0), &data).unwrap();
        assert_eq!(result, JValue::from(42i64));

        let result = evaluator.evaluate(&AstNode::Boolean(true), &data).unwrap();
        assert_eq!(result, JValue::Bool(true));

        let result = evaluator.evaluate(&AstNode::Null, &data).unwrap();
        assert_eq!(result, JValue::Null);
    }

    #[test]
    fn test_evaluate_variables() {
        let mut evaluator = Evaluator::new();
        evaluator.bind("x", JValue::from(100i64));

        let result = evaluator.evaluate(&AstNode::variable("x"), &JValue::Null).unwrap();
        assert_eq!(result, JValue::from(100i64));

        // Unbound variables are undefined, not an error
        let result = evaluator
            .evaluate(&AstNode::variable("missing"), &JValue::Null)
            .unwrap();
        assert!(result.is_undefined());
    }

    #[test]
    fn test_evaluate_path() {
        let data = r#"{"foo": {"bar": {"baz": 42}}}"#;
        assert_eq!(eval("foo", data), r#"{"bar":{"baz":42}}"#);
        assert_eq!(eval("foo.bar.baz", data), "42");
        assert_eq!(eval("missing", data), "undefined");
        assert_eq!(eval("foo.bar.missing", data), "undefined");
    }

    #[test]
    fn test_path_flattens_arrays() {
        let data = r#"{"Account": {"Order": [
            {"Product": [{"Price": 34.45, "Quantity": 2}, {"Price": 21.67, "Quantity": 1}]},
            {"Product": [{"Price": 34.45, "Quantity": 4}, {"Price": 107.99, "Quantity": 1}]}
        ]}}"#;
        assert_eq!(
            eval("Account.Order.Product.Price", data),
            "[34.45,21.67,34.45,107.99]"
        );
        assert_eq!(eval("Account.Order.Product.Quantity[0]", data), "undefined");
        assert_eq!(eval("Account.Order[1].Product[1].Price", data), "34.45");
        assert_eq!(eval("Account.Order[2].Product[2].Price", data), "107.99");
        assert_eq!(eval("Account.Order.Product[-1].Price", data), "[21.67,107.99]");
        assert_eq!(
            eval("$round($sum(Account.Order.Product.(Price * Quantity)), 2)", data),
            "336.36"
        );
    }

    #[test]
    fn test_last_step_array_keeps_structure() {
        let data = r#"{"a": {"b": [1, 2, 3]}, "c": [{"d": [1]}, {"d": [2]}]}"#;
        assert_eq!(eval("a.b", data), "[1,2,3]");
        assert_eq!(eval("c.d", data), "[1,2]");
        assert_eq!(eval("a.b[]", data), "[1,2,3]");
    }

    #[test]
    fn test_keep_singleton_array() {
        let data = r#"{"a": [{"b": 1}]}"#;
        assert_eq!(eval("a.b", data), "1");
        assert_eq!(eval("a.b[]", data), "[1]");
        assert_eq!(eval("a[].b", data), "[1]");
    }

    #[test]
    fn test_top_level_array_input() {
        let data = "[10, 20, 30]";
        assert_eq!(eval("$", data), "[10,20,30]");
        assert_eq!(eval("$[1]", data), "10");
        assert_eq!(eval("$[-1]", data), "30");
        assert_eq!(eval("$[0]", data), "undefined");
        assert_eq!(eval("$[$ > 15]", data), "[20,30]");
        assert_eq!(eval("$$", data), "[10,20,30]");
    }

    #[test]
    fn test_predicates() {
        let data = r#"{"items": [{"n": 1, "ok": true}, {"n": 2, "ok": false}, {"n": 3, "ok": true}]}"#;
        assert_eq!(eval("items[ok].n", data), "[1,3]");
        assert_eq!(eval("items[n > 1][1].n", data), "2");
        assert_eq!(eval("items[[1, 3]].n", data), "[1,3]");
        assert_eq!(eval("items[n = 5]", data), "undefined");
    }

    #[test]
    fn test_wildcard_and_descendants() {
        let data = r#"{"a": {"x": 1, "y": [2, 3]}, "b": {"c": {"x": 4}}}"#;
        assert_eq!(eval("a.*", data), "[1,2,3]");
        assert_eq!(eval("**.x", data), "[1,4]");
        assert_eq!(eval("b.**", data), r#"[{"c":{"x":4}},{"x":4},4]"#);
    }

    #[test]
    fn test_arithmetic_operations() {
        assert_eq!(eval("10 + 5", ""), "15");
        assert_eq!(eval("10 - 5", ""), "5");
        assert_eq!(eval("10 * 5", ""), "50");
        assert_eq!(eval("10 / 4", ""), "2.5");
        assert_eq!(eval("10 % 3", ""), "1");
        assert_eq!(eval("-(2 + 3)", ""), "-5");
        assert_eq!(eval("missing + 1", "{}"), "undefined");
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(error_code("\"a\" + 1", ""), "T2001");
        assert_eq!(error_code("1 + \"a\"", ""), "T2002");
        assert_eq!(error_code("10 / 0", ""), "D1001");
        assert_eq!(error_code("-\"a\"", ""), "D1002");
    }

    #[test]
    fn test_comparison_operations() {
        assert_eq!(eval("5 = 5", ""), "true");
        assert_eq!(eval("5 != 5", ""), "false");
        assert_eq!(eval("\"a\" < \"b\"", ""), "true");
        assert_eq!(eval("3 >= 3", ""), "true");
        assert_eq!(eval("missing = 1", "{}"), "false");
        assert_eq!(eval("missing < 1", "{}"), "undefined");
        assert_eq!(eval("[1, 2] = [1, 2]", ""), "true");
        assert_eq!(error_code("1 < \"a\"", ""), "T2009");
        assert_eq!(error_code("true < 1", ""), "T2010");
    }

    #[test]
    fn test_logical_operations() {
        assert_eq!(eval("true and false", ""), "false");
        assert_eq!(eval("true or false", ""), "true");
        assert_eq!(eval("missing or 1", "{}"), "true");
        // Right side is never evaluated
        assert_eq!(eval("false and (1 + \"a\")", ""), "false");
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("\"a\" & \"b\"", ""), "\"ab\"");
        assert_eq!(eval("\"n=\" & 5", ""), "\"n=5\"");
        assert_eq!(eval("missing & \"x\"", "{}"), "\"x\"");
        assert_eq!(eval("\"v\" & [1, true]", ""), "\"v[1,true]\"");
    }

    #[test]
    fn test_range_operator() {
        assert_eq!(eval("[1..5]", ""), "[1,2,3,4,5]");
        assert_eq!(eval("[1..3, 7]", ""), "[1,2,3,7]");
        assert_eq!(eval("[5..1]", ""), "[]");
        assert_eq!(error_code("[1.5..3]", ""), "T2003");
        assert_eq!(error_code("[1..\"a\"]", ""), "T2004");
        assert_eq!(error_code("[1..100000000]", ""), "D2014");
    }

    #[test]
    fn test_range_outside_array_constructor() {
        assert_eq!(eval("(1..3)", ""), "[1,2,3]");
        assert_eq!(eval("$sum(1..3)", ""), "6");
        assert_eq!(eval("1..2 + 1", ""), "[1,2,3]");
        let phones = r#"{"Phone": [{"n": "a"}, {"n": "b"}, {"n": "c"}]}"#;
        assert_eq!(eval("Phone[1..2].n", phones), r#"["a","b"]"#);
        assert_eq!(eval("Phone[-2..-1].n", phones), r#"["b","c"]"#);
    }

    #[test]
    fn test_in_operator() {
        assert_eq!(eval("3 in [1, 2, 3]", ""), "true");
        assert_eq!(eval("\"a\" in \"a\"", ""), "true");
        assert_eq!(eval("4 in [1, 2, 3]", ""), "false");
        assert_eq!(eval("missing in [1]", "{}"), "false");
    }

    #[test]
    fn test_coalesce_and_default() {
        assert_eq!(eval("missing ?? 5", "{}"), "5");
        assert_eq!(eval("0 ?? 5", ""), "0");
        assert_eq!(eval("0 ?: 5", ""), "5");
        assert_eq!(eval("\"x\" ?: 5", ""), "\"x\"");
    }

    #[test]
    fn test_array_construction() {
        assert_eq!(eval("[1, [2, 3], $x]", ""), "[1,[2,3]]");
        assert_eq!(eval("[a, b]", r#"{"a": [1, 2], "b": 3}"#), "[1,2,3]");
        assert_eq!(eval("[]", ""), "[]");
    }

    #[test]
    fn test_object_construction() {
        assert_eq!(eval("{\"a\": 1, \"b\": missing}", "{}"), r#"{"a":1}"#);
        assert_eq!(eval("{\"x\": 1, \"y\": 2, \"x\": 3}", ""), r#"{"x":3,"y":2}"#);
        assert_eq!(error_code("{1: 2}", ""), "T1003");
    }

    #[test]
    fn test_group_by() {
        let data = r#"{"items": [
            {"cat": "a", "v": 1}, {"cat": "b", "v": 2}, {"cat": "a", "v": 3}
        ]}"#;
        assert_eq!(
            eval("items{cat: $sum(v)}", data),
            r#"{"a":4,"b":2}"#
        );
        assert_eq!(eval("items{cat: v}", data), r#"{"a":[1,3],"b":2}"#);
    }

    #[test]
    fn test_sort_is_stable() {
        let data = r#"[{"k": 1, "i": 1}, {"k": 0, "i": 2}, {"k": 1, "i": 3}]"#;
        assert_eq!(eval("$^(k).i", data), "[2,1,3]");
        assert_eq!(eval("$^(>k).i", data), "[1,3,2]");
        assert_eq!(eval("$^(>k, >i).i", data), "[3,1,2]");
        assert_eq!(error_code("$^(k = 1).i", data), "T2008");
    }

    #[test]
    fn test_sort_puts_undefined_last() {
        let data = r#"[{"k": 2}, {}, {"k": 1}]"#;
        assert_eq!(eval("$^(k).k", data), "[1,2]");
        assert_eq!(eval("$^(>k)", data), r#"[{"k":2},{"k":1},{}]"#);
    }

    #[test]
    fn test_positional_binding() {
        let data = r#"{"items": ["a", "b", "c"]}"#;
        assert_eq!(eval("items#$i.{\"v\": $, \"i\": $i}", data),
            r#"[{"v":"a","i":0},{"v":"b","i":1},{"v":"c","i":2}]"#);
        assert_eq!(eval("items#$i[$i > 0]", data), r#"["b","c"]"#);
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval("true ? 1 : 2", ""), "1");
        assert_eq!(eval("false ? 1 : 2", ""), "2");
        assert_eq!(eval("false ? 1", ""), "undefined");
        assert_eq!(eval("missing ? 1 : 2", "{}"), "2");
    }

    #[test]
    fn test_block_expression() {
        assert_eq!(eval("($x := 5; $y := $x * 2; $y + 1)", ""), "11");
        // Bindings do not leak out of a block
        assert_eq!(eval("(($x := 5); $x)", ""), "undefined");
    }

    #[test]
    fn test_lambdas_and_closures() {
        assert_eq!(eval("(function($x) { $x * 2 })(21)", ""), "42");
        assert_eq!(
            eval("($add := function($a) { function($b) { $a + $b } }; $add(2)(3))", ""),
            "5"
        );
        assert_eq!(
            eval("($fact := function($n) { $n <= 1 ? 1 : $n * $fact($n - 1) }; $fact(10))", ""),
            "3628800"
        );
        // Missing arguments are undefined; extra ones are rejected
        assert_eq!(eval("(function($a, $b) { $exists($b) })(1)", ""), "false");
        assert_eq!(error_code("(function($a) { $a })(1, 2)", ""), "T0410");
    }

    #[test]
    fn test_lambda_signature() {
        assert_eq!(eval("(function($a, $b)<nn:n> { $a + $b })(1, 2)", ""), "3");
        assert_eq!(
            error_code("(function($a, $b)<nn:n> { $a + $b })(1, \"x\")", ""),
            "T0410"
        );
    }

    #[test]
    fn test_lambda_errors_name_the_function() {
        let err = eval_with("($twice := function($a) { $a * 2 }; $twice(1, 2))", "").unwrap_err();
        assert_eq!(err.code(), "T0410");
        assert!(err.to_string().contains("Function twice expects 1"), "{}", err);

        let err = eval_with("(function($a) { $a })(1, 2)", "").unwrap_err();
        assert!(err.to_string().contains("Function lambda expects 1"), "{}", err);
    }

    #[test]
    fn test_partial_application() {
        assert_eq!(eval("($first := $substring(?, 0, 2); $first(\"hello\"))", ""), "\"he\"");
        assert_eq!(
            eval("($f := function($a, $b, $c) { $a & $b & $c }; $g := $f(\"x\", ?, ?); $g(\"y\", \"z\"))", ""),
            "\"xyz\""
        );
        assert_eq!(error_code("$nothing(?, 1)", ""), "T1008");
    }

    #[test]
    fn test_function_application_operator() {
        assert_eq!(eval("\"hello\" ~> $uppercase()", ""), "\"HELLO\"");
        assert_eq!(eval("\"hello\" ~> $substring(1, 2)", ""), "\"el\"");
        assert_eq!(
            eval("($f := $uppercase ~> $substring(?, 0, 3); $f(\"hello\"))", ""),
            "\"HEL\""
        );
        assert_eq!(error_code("1 ~> 2", ""), "T2006");
    }

    #[test]
    fn test_invoking_non_functions() {
        assert_eq!(error_code("$nothing()", ""), "T1006");
        assert_eq!(error_code("uppercase(\"a\")", "{}"), "T1005");
    }

    #[test]
    fn test_transform() {
        let data = r#"{"Account": {"Order": [{"id": 1, "tmp": true}, {"id": 2, "tmp": true}]}}"#;
        assert_eq!(
            eval("$ ~> |Account.Order|{\"ok\": id > 1}, \"tmp\"|", data),
            r#"{"Account":{"Order":[{"id":1,"ok":false},{"id":2,"ok":true}]}}"#
        );
        // The input document is untouched
        assert_eq!(
            eval("($t := |Account.Order|{\"id\": 0}|; [$t($).Account.Order.id, Account.Order.id])", data),
            "[0,0,1,2]"
        );
        assert_eq!(error_code("$ ~> |Account|5|", data), "T2011");
        assert_eq!(error_code("$ ~> |Account|{}, 5|", data), "T2012");
    }

    #[test]
    fn test_depth_limit() {
        let ast = parse("($f := function($n) { $f($n + 1) }; $f(0))").unwrap();
        let mut evaluator = Evaluator::with_options(EvalOptions {
            max_depth: 60,
            ..EvalOptions::default()
        });
        let err = evaluator.evaluate(&ast, &JValue::Null).unwrap_err();
        assert_eq!(err, EvaluatorError::DepthExceeded { max: 60 });
        assert_eq!(err.code(), "U1001");
    }

    #[test]
    fn test_frames_are_reclaimed_after_calls() {
        let ast = parse("$map([1..50], function($v) { ($w := $v; $w * 2) })").unwrap();
        let mut evaluator = Evaluator::new();
        evaluator.evaluate(&ast, &JValue::Null).unwrap();
        assert_eq!(evaluator.env.len(), 1);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: EvalOptions = serde_json::from_str(r#"{"max_depth": 50}"#).unwrap();
        assert_eq!(options.max_depth, 50);
        assert_eq!(options.max_range, DEFAULT_MAX_RANGE);
    }
}

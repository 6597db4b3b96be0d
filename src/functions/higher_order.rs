// Higher-order functions
// Callbacks receive (value, index, array) or (value, key, object), truncated
// to the number of parameters the callback declares

use indexmap::IndexMap;
use tracing::trace;

use crate::environment::FrameId;
use crate::evaluator::{function_arity, Evaluator, EvaluatorError};
use crate::parser::parse;
use crate::value::JValue;

pub fn map(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let items = match value.as_array() {
        Some(items) => items,
        None => return Ok(JValue::Undefined),
    };
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let args = vec![item.clone(), JValue::from(index), value.clone()];
        let result = ev.apply_callback(func, args, context, frame)?;
        if !result.is_undefined() {
            results.push(result);
        }
    }
    Ok(JValue::sequence(results))
}

pub fn filter(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let items = match value.as_array() {
        Some(items) => items,
        None => return Ok(JValue::Undefined),
    };
    let mut results = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let args = vec![item.clone(), JValue::from(index), value.clone()];
        if ev.apply_callback(func, args, context, frame)?.to_boolean() {
            results.push(item.clone());
        }
    }
    Ok(JValue::sequence(results))
}

/// The one member satisfying `func` (or the one member, without `func`).
pub fn single(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let items = match value.as_array() {
        Some(items) => items,
        None => return Ok(JValue::Undefined),
    };
    let mut found: Option<JValue> = None;
    for (index, item) in items.iter().enumerate() {
        let selected = if func.is_function() {
            let args = vec![item.clone(), JValue::from(index), value.clone()];
            ev.apply_callback(func, args, context, frame)?.to_boolean()
        } else {
            true
        };
        if selected {
            if found.is_some() {
                return Err(EvaluatorError::evaluation_error(
                    "D3138",
                    "The $single() function expected exactly 1 matching result. Instead it matched more.",
                ));
            }
            found = Some(item.clone());
        }
    }
    found.ok_or_else(|| {
        EvaluatorError::evaluation_error(
            "D3139",
            "The $single() function expected exactly 1 matching result. Instead it matched 0.",
        )
    })
}

/// `$reduce(array, function($acc, $v[, $i, $array])[, init])`
pub fn reduce(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    init: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let items = match value.as_array() {
        Some(items) => items,
        None => return Ok(JValue::Undefined),
    };
    if function_arity(func) < 2 {
        return Err(EvaluatorError::type_error(
            "D3050",
            "The second argument of reduce function must be a function with at least two arguments",
        ));
    }
    let (mut accumulator, start) = match (init, items.first()) {
        (JValue::Undefined, Some(first)) => (first.clone(), 1),
        _ => (init.clone(), 0),
    };
    for (index, item) in items.iter().enumerate().skip(start) {
        let args = vec![accumulator, item.clone(), JValue::from(index), value.clone()];
        accumulator = ev.apply_callback(func, args, context, frame)?;
    }
    Ok(accumulator)
}

/// Results of `func(value, key, object)` for every field.
pub fn each(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let map = match value.as_object() {
        Some(map) => map,
        None => return Ok(JValue::Undefined),
    };
    let mut results = Vec::with_capacity(map.len());
    for (key, field) in map.iter() {
        let args = vec![field.clone(), JValue::from(key.as_str()), value.clone()];
        let result = ev.apply_callback(func, args, context, frame)?;
        if !result.is_undefined() {
            results.push(result);
        }
    }
    Ok(JValue::sequence(results))
}

/// The fields for which `func(value, key, object)` is truthy.
pub fn sift(
    ev: &mut Evaluator,
    value: &JValue,
    func: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let map = match value.as_object() {
        Some(map) => map,
        None => return Ok(JValue::Undefined),
    };
    let mut kept = IndexMap::new();
    for (key, field) in map.iter() {
        let args = vec![field.clone(), JValue::from(key.as_str()), value.clone()];
        if ev.apply_callback(func, args, context, frame)?.to_boolean() {
            kept.insert(key.clone(), field.clone());
        }
    }
    if kept.is_empty() {
        return Ok(JValue::Undefined);
    }
    Ok(JValue::object(kept))
}

/// `$eval(expr[, focus])`: parse and evaluate text in the current scope.
pub fn eval(
    ev: &mut Evaluator,
    expression: &JValue,
    focus: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let text = match expression.as_str() {
        Some(text) => text,
        None => return Ok(JValue::Undefined),
    };
    let ast = parse(text).map_err(|e| {
        EvaluatorError::evaluation_error(
            "D3120",
            format!("Syntax error in expression passed to function eval: {}", e),
        )
    })?;
    trace!(expression = text, "evaluating nested expression");
    let focus = if focus.is_undefined() { context } else { focus };
    ev.evaluate_nested(&ast, focus, frame).map_err(|e| match e {
        depth @ EvaluatorError::DepthExceeded { .. } => depth,
        other => EvaluatorError::evaluation_error(
            "D3121",
            format!("Dynamic error evaluating the expression passed to function eval: {}", other),
        ),
    })
}

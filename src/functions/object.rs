// Object, boolean and error functions

use indexmap::IndexMap;

use crate::evaluator::{lookup_field, EvaluatorError};
use crate::value::JValue;

/// `$boolean(arg)`; Undefined stays Undefined.
pub fn boolean(value: &JValue) -> JValue {
    if value.is_undefined() {
        JValue::Undefined
    } else {
        JValue::Bool(value.to_boolean())
    }
}

/// Field names of an object, or of every object in an array without duplicates.
pub fn keys(value: &JValue) -> JValue {
    let mut names: Vec<JValue> = Vec::new();
    let mut collect = |map: &IndexMap<String, JValue>| {
        for key in map.keys() {
            let key = JValue::from(key.as_str());
            if !names.contains(&key) {
                names.push(key);
            }
        }
    };
    match value {
        JValue::Object(map) => collect(map),
        JValue::Array(items, _) => items.iter().filter_map(JValue::as_object).for_each(collect),
        _ => {}
    }
    JValue::sequence(names)
}

pub fn lookup(value: &JValue, key: &JValue) -> JValue {
    match key.as_str() {
        Some(key) => lookup_field(value, key),
        None => JValue::Undefined,
    }
}

/// Split objects into one single-field object per field.
pub fn spread(value: &JValue) -> JValue {
    match value {
        JValue::Object(map) => JValue::sequence(
            map.iter()
                .map(|(key, value)| {
                    let mut single = IndexMap::with_capacity(1);
                    single.insert(key.clone(), value.clone());
                    JValue::object(single)
                })
                .collect(),
        ),
        JValue::Array(items, _) => {
            let mut result = Vec::new();
            for item in items.iter() {
                result.extend(spread(item).to_members());
            }
            JValue::sequence(result)
        }
        other => other.clone(),
    }
}

/// Later objects overwrite fields of earlier ones.
pub fn merge(value: &JValue) -> JValue {
    let items = match value.as_array() {
        Some(items) => items,
        None => return JValue::Undefined,
    };
    let mut merged = IndexMap::new();
    for map in items.iter().filter_map(JValue::as_object) {
        for (key, value) in map.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    JValue::object(merged)
}

pub fn error(message: &JValue) -> EvaluatorError {
    EvaluatorError::evaluation_error(
        "D3137",
        message
            .as_str()
            .unwrap_or("$error() function evaluated")
            .to_string(),
    )
}

pub fn assert(condition: &JValue, message: &JValue) -> Result<JValue, EvaluatorError> {
    if condition.as_bool() == Some(false) {
        return Err(EvaluatorError::evaluation_error(
            "D3141",
            message
                .as_str()
                .unwrap_or("$assert() statement failed")
                .to_string(),
        ));
    }
    Ok(JValue::Undefined)
}

/// Deep copy following JSON rules: functions are dropped from objects and
/// become null in arrays, non-finite numbers become null.
pub fn deep_clone(value: &JValue) -> JValue {
    match value {
        JValue::Object(map) => JValue::object(
            map.iter()
                .filter(|(_, v)| !v.is_undefined() && !v.is_function())
                .map(|(key, v)| (key.clone(), deep_clone(v)))
                .collect(),
        ),
        JValue::Array(items, _) => JValue::array(
            items
                .iter()
                .filter(|v| !v.is_undefined())
                .map(deep_clone)
                .collect(),
        ),
        JValue::Number(n) if !n.is_finite() => JValue::Null,
        v if v.is_function() => JValue::Null,
        other => other.clone(),
    }
}

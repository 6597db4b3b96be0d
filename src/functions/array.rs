// Array functions and the stable merge sort shared with `^(...)`

use std::rc::Rc;

use rand::seq::SliceRandom;

use crate::environment::FrameId;
use crate::evaluator::{compare_strings, Evaluator, EvaluatorError};
use crate::value::JValue;

/// Stable merge sort. `after(a, b)` returns true when `a` must follow `b`.
pub fn merge_sort<T, E, F>(mut items: Vec<T>, after: &mut F) -> Result<Vec<T>, E>
where
    F: FnMut(&T, &T) -> Result<bool, E>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, after)?;
    let right = merge_sort(right, after)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => after(l, r)?,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        merged.extend(if take_right { right.next() } else { left.next() });
    }
    Ok(merged)
}

/// Concatenate two values into a plain array; Undefined on either side
/// yields the other side unchanged.
pub fn append(a: JValue, b: JValue) -> JValue {
    match (a, b) {
        (JValue::Undefined, b) => b,
        (a, JValue::Undefined) => a,
        (a, b) => {
            let mut items = a.to_members();
            items.extend(b.to_members());
            JValue::array(items)
        }
    }
}

pub fn count(value: &JValue) -> JValue {
    JValue::from(value.as_array().map_or(0, <[JValue]>::len))
}

pub fn reverse(value: &JValue) -> JValue {
    match value.as_array() {
        Some(items) => JValue::array(items.iter().rev().cloned().collect()),
        None => JValue::Undefined,
    }
}

pub fn shuffle(value: &JValue) -> JValue {
    match value.as_array() {
        Some(items) => {
            let mut items = items.to_vec();
            items.shuffle(&mut rand::thread_rng());
            JValue::array(items)
        }
        None => JValue::Undefined,
    }
}

/// Members in first-seen order with deep-equal duplicates removed.
pub fn distinct(value: &JValue) -> JValue {
    match value {
        JValue::Array(items, flags) => {
            let mut unique: Vec<JValue> = Vec::with_capacity(items.len());
            for item in items.iter() {
                if !unique.contains(item) {
                    unique.push(item.clone());
                }
            }
            JValue::Array(Rc::new(unique), *flags)
        }
        other => other.clone(),
    }
}

/// `$zip(a1, a2, ...)`: tuples of same-position members, as long as the shortest array.
pub fn zip(arrays: &[JValue]) -> JValue {
    let arrays: Vec<Vec<JValue>> = arrays.iter().map(JValue::to_members).collect();
    let len = arrays.iter().map(Vec::len).min().unwrap_or(0);
    JValue::array(
        (0..len)
            .map(|i| JValue::array(arrays.iter().map(|a| a[i].clone()).collect()))
            .collect(),
    )
}

/// `$sort(array[, before])`. Without a comparator all members must be
/// numbers or all strings.
pub fn sort(
    ev: &mut Evaluator,
    value: &JValue,
    comparator: &JValue,
    context: &JValue,
    frame: FrameId,
) -> Result<JValue, EvaluatorError> {
    let items = match value.as_array() {
        Some(items) => items.to_vec(),
        None => return Ok(JValue::Undefined),
    };
    if items.len() <= 1 {
        return Ok(JValue::array(items));
    }

    let sorted = if comparator.is_function() {
        merge_sort(items, &mut |a: &JValue, b: &JValue| {
            let swap = ev.apply_callback(comparator, vec![a.clone(), b.clone()], context, frame)?;
            Ok::<bool, EvaluatorError>(swap.to_boolean())
        })?
    } else if value.is_array_of_numbers() {
        merge_sort(items, &mut |a: &JValue, b: &JValue| {
            Ok::<bool, EvaluatorError>(a.as_f64() > b.as_f64())
        })?
    } else if value.is_array_of_strings() {
        merge_sort(items, &mut |a: &JValue, b: &JValue| {
            Ok::<bool, EvaluatorError>(
                compare_strings(a.as_str().unwrap_or(""), b.as_str().unwrap_or(""))
                    == std::cmp::Ordering::Greater,
            )
        })?
    } else {
        return Err(EvaluatorError::evaluation_error(
            "D3070",
            "The single argument form of the sort function can only be applied to an array of strings or an array of numbers. Use the second argument to specify a comparison function",
        ));
    };
    Ok(JValue::array(sorted))
}

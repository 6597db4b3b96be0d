//! Property-based tests for the evaluate contract
//!
//! Uses proptest to check identity round-trips, sort stability and the
//! error behaviour of malformed input across generated documents.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use jsonata_eval::{evaluate, ErrorKind, UNDEFINED};

// ============================================================================
// Test Strategies
// ============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,8}"
}

fn string_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _\\-\"\\\\\n\té]{0,16}"
}

/// Numbers whose shortest text form is the same in JSON and JSONata.
fn number_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        (-10_000i32..10_000).prop_map(|n| json!(f64::from(n) + 0.25)),
    ]
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        number_strategy(),
        string_strategy().prop_map(Value::String),
    ]
}

/// Scalars, flat arrays and flat objects.
fn simple_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        scalar_strategy(),
        prop::collection::vec(scalar_strategy(), 0..8).prop_map(Value::Array),
        prop::collection::vec((key_strategy(), scalar_strategy()), 0..8).prop_map(|fields| {
            let mut map = Map::new();
            for (key, value) in fields {
                map.insert(key, value);
            }
            Value::Object(map)
        }),
    ]
}

// ============================================================================
// Contract Properties
// ============================================================================

proptest! {
    /// `$` re-serializes any simple document unchanged
    #[test]
    fn prop_identity_round_trip(value in simple_value_strategy()) {
        let text = serde_json::to_string(&value).unwrap();
        let out = evaluate("$", &text).unwrap();
        prop_assert_eq!(out, text);
    }

    /// Pretty-printed input gives the same compact output
    #[test]
    fn prop_whitespace_is_insignificant(value in simple_value_strategy()) {
        let compact = serde_json::to_string(&value).unwrap();
        let pretty = serde_json::to_string_pretty(&value).unwrap();
        prop_assert_eq!(evaluate("$", &pretty).unwrap(), compact);
    }

    /// Truncated documents fail as invalid JSON whatever the expression
    #[test]
    fn prop_truncated_json_fails(
        fields in prop::collection::vec((key_strategy(), scalar_strategy()), 1..6),
        cut in 1usize..1000,
        expr in prop_oneof![Just("$"), Just("a.b"), Just("$count($)")],
    ) {
        let value = Value::Object(fields.into_iter().collect());
        let text = serde_json::to_string(&value).unwrap();
        let cut = text
            .char_indices()
            .map(|(i, _)| i)
            .filter(|&i| i > 0)
            .nth(cut % (text.chars().count() - 1))
            .unwrap_or(1);
        let err = evaluate(expr, &text[..cut]).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::InvalidJson);
    }

    /// Expressions with an unclosed bracket never evaluate
    #[test]
    fn prop_unbalanced_brackets_fail(
        open in prop_oneof![Just("("), Just("["), Just("{")],
        body in "[a-z]{1,6}",
        input in prop_oneof![Just(""), Just("{}"), Just("[1, 2]"), Just("{")],
    ) {
        let expr = format!("{}{}", open, body);
        let err = evaluate(&expr, input).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Expression);
    }

    /// Sorting by key keeps equal keys in input order
    #[test]
    fn prop_sort_is_stable(keys in prop::collection::vec(0i32..4, 1..30)) {
        let items: Vec<Value> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| json!({"k": k, "i": i}))
            .collect();
        let text = serde_json::to_string(&items).unwrap();
        let out = evaluate("[$^(k).i]", &text).unwrap();

        let mut expected: Vec<(i32, usize)> = keys.iter().copied().zip(0..).collect();
        expected.sort_by_key(|(k, _)| *k);
        let expected: Vec<usize> = expected.into_iter().map(|(_, i)| i).collect();
        prop_assert_eq!(out, serde_json::to_string(&expected).unwrap());
    }

    /// Field lookup through a path finds exactly the stored value
    #[test]
    fn prop_nested_path_lookup(a in key_strategy(), b in key_strategy(), leaf in number_strategy()) {
        let doc = json!({ a.clone(): { b.clone(): leaf.clone() } });
        let expr = format!("`{}`.`{}`", a, b);
        let out = evaluate(&expr, &doc.to_string()).unwrap();
        prop_assert_eq!(out, leaf.to_string());

        let missing = format!("`{}`.`{}`.nothing", a, b);
        prop_assert_eq!(evaluate(&missing, &doc.to_string()).unwrap(), UNDEFINED);
    }

    /// Positive and negative predicates address the same members
    #[test]
    fn prop_one_based_indexing(values in prop::collection::vec(any::<i32>(), 1..20), pick in 0usize..20) {
        let index = pick % values.len();
        let text = serde_json::to_string(&values).unwrap();
        let from_start = evaluate(&format!("$[{}]", index + 1), &text).unwrap();
        let from_end = evaluate(&format!("$[-{}]", values.len() - index), &text).unwrap();
        prop_assert_eq!(&from_start, &values[index].to_string());
        prop_assert_eq!(from_start, from_end);
    }
}

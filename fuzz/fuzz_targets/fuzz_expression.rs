#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary expression text against a fixed document.
    // Parsing and evaluation must return Ok or Err, never panic or overflow.
    if let Ok(expression) = std::str::from_utf8(data) {
        let _ = jsonata_eval::evaluate(
            expression,
            r#"{"a": [1, {"b": "x"}, [2, 3]], "c": {"d": null, "e": true}}"#,
        );
    }
});

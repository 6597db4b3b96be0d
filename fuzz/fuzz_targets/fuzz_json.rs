#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary input bytes through the identity and a descendant walk.
    let _ = jsonata_eval::evaluate_bytes(b"$", data);
    let _ = jsonata_eval::evaluate_bytes(b"**", data);
});

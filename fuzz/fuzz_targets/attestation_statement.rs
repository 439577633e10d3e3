#![no_main]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use imgsig_registry::decode_statement;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary statement JSON must decode or fail cleanly
    let _ = decode_statement(&BASE64.encode(data));
});

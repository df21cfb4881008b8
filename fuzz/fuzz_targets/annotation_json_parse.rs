//! Fuzz target for import annotation JSON parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mirvcs::model::io_json::from_json_str;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(annotations) = from_json_str(text) {
        for object in annotations.values().flatten() {
            let _ = object.geometry();
        }
    }
});

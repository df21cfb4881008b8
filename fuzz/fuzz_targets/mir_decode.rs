//! Fuzz target for collection file decoding.
//!
//! Feeds arbitrary bytes to every collection decoder, then re-encodes
//! whatever decoded successfully.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mirvcs::mir_file;
use mirvcs::model::{Annotations, Keywords, Metadatas, Tasks};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if let Ok(metadatas) = mir_file::decode::<Metadatas>(data) {
        let _ = mir_file::encode(&metadatas);
    }
    if let Ok(annotations) = mir_file::decode::<Annotations>(data) {
        let _ = mir_file::encode(&annotations);
    }
    if let Ok(keywords) = mir_file::decode::<Keywords>(data) {
        let _ = mir_file::encode(&keywords);
    }
    if let Ok(tasks) = mir_file::decode::<Tasks>(data) {
        let _ = mir_file::encode(&tasks);
    }
});

//! Fuzz target for revision parsing (`branch@task`, `tr:branch@task`).

#![no_main]

use libfuzzer_sys::fuzz_target;
use mirvcs::storage::{RevTid, TypedRev};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(rev) = text.parse::<RevTid>() {
        // Display must parse back to the same revision.
        let again: RevTid = rev.to_string().parse().expect("display reparses");
        assert_eq!(again, rev);
    }
    let _ = text.parse::<TypedRev>();
});

//! Fuzz target: Jotter entry framing
//!
//! Records arbitrary messages (embedded newlines, control bytes) and
//! verifies:
//! - No panics under arbitrary input
//! - Each `record` call adds exactly one entry
//! - `tail(n)` never returns more than `n` entries
//!
//! cargo fuzz run fuzz_jotter_entry

#![no_main]

use libfuzzer_sys::fuzz_target;
use nodeboot::jotter::JotterRegistry;

fuzz_target!(|data: &[u8]| {
    let Some((&n, rest)) = data.split_first() else {
        return;
    };
    let dir = std::env::temp_dir().join("nodeboot-fuzz-jotter");
    let jotter = JotterRegistry::new(dir).get("fuzz");
    jotter.clear();

    let text = String::from_utf8_lossy(rest);
    let messages: Vec<&str> = text.split('\0').take(16).collect();
    for msg in &messages {
        jotter.record(msg);
    }

    assert_eq!(jotter.entries().len(), messages.len());
    assert!(jotter.tail(n as usize).len() <= n as usize);
});

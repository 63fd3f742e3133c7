//! Fuzz target for group reference parsing.
//!
//! This fuzzer throws arbitrary text at `GroupReference::parse` and checks
//! that parsing never panics, is deterministic, and that foreign-triple
//! captures keep the promised shape.

#![no_main]

use libfuzzer_sys::fuzz_target;

use sgsync::modules::securitygroup::resolver::GroupReference;

fuzz_target!(|data: &[u8]| {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return,
    };

    let parsed = GroupReference::parse(text);

    match &parsed {
        GroupReference::Id(id) => {
            // Anything that is not a foreign triple passes through untouched
            assert_eq!(id, text);
        }
        GroupReference::Foreign {
            owner_id,
            group_id,
            group_name,
        } => {
            // Captures are non-empty, whitespace-free, and anchored to the
            // front of the input
            assert!(!owner_id.is_empty());
            assert!(!group_name.is_empty());
            assert!(group_id.starts_with("sg-"));
            assert!(!owner_id.chars().any(char::is_whitespace));
            assert!(!group_id.chars().any(char::is_whitespace));
            assert!(!group_name.chars().any(char::is_whitespace));
            assert!(text.starts_with(&format!("{}/", owner_id)));
        }
    }

    // Parsing is deterministic
    assert_eq!(parsed, GroupReference::parse(text));
});

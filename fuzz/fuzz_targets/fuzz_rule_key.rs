//! Fuzz target for canonical rule key derivation.
//!
//! This fuzzer derives keys from arbitrary rule fields and checks the
//! canonicalization guarantees: derivation never panics, is deterministic,
//! ignores protocol casing, and collapses every all-protocols spelling to
//! one key regardless of leftover port values.

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

use sgsync::modules::securitygroup::key::{derive_key, Direction};

/// Arbitrary rule fields feeding the key deriver
#[derive(Debug, Clone, Arbitrary)]
struct FuzzKeyInput {
    ingress: bool,
    protocol: String,
    from_port: Option<i64>,
    to_port: Option<i64>,
    target_group_id: Option<String>,
    target_cidr: Option<String>,
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut unstructured = Unstructured::new(data);

    let input = match FuzzKeyInput::arbitrary(&mut unstructured) {
        Ok(input) => input,
        Err(_) => return,
    };

    let direction = if input.ingress {
        Direction::Ingress
    } else {
        Direction::Egress
    };
    let group_id = input.target_group_id.as_deref();
    let cidr = input.target_cidr.as_deref();

    let key = derive_key(
        direction,
        &input.protocol,
        input.from_port,
        input.to_port,
        group_id,
        cidr,
    );

    // The direction prefix always survives canonicalization
    let prefix = match direction {
        Direction::Ingress => "in-",
        Direction::Egress => "out-",
    };
    assert!(key.as_str().starts_with(prefix));

    // Derivation is deterministic
    let again = derive_key(
        direction,
        &input.protocol,
        input.from_port,
        input.to_port,
        group_id,
        cidr,
    );
    assert_eq!(key, again);

    // Protocol casing never splits a key
    if input.protocol.is_ascii() {
        let upper = input.protocol.to_ascii_uppercase();
        let cased = derive_key(direction, &upper, input.from_port, input.to_port, group_id, cidr);
        assert_eq!(key, cased);
    }

    // Every all-protocols spelling shares one key, whatever the remote
    // side left in the port fields
    let sentinel = derive_key(direction, "-1", Some(-1), Some(-1), group_id, cidr);
    let alias = derive_key(
        direction,
        "all",
        input.from_port,
        input.to_port,
        group_id,
        cidr,
    );
    assert_eq!(sentinel, alias);
});

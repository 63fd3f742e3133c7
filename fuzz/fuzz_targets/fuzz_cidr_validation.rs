//! Fuzz target for CIDR validation.
//!
//! This fuzzer runs arbitrary text through the IPv4 and IPv6 CIDR
//! validators and checks that validation never panics and that masking is
//! idempotent: a canonical CIDR re-validates to itself with no warning.

#![no_main]

use libfuzzer_sys::fuzz_target;

use sgsync::modules::securitygroup::serializer::{validate_ipv4_cidr, validate_ipv6_cidr};

fuzz_target!(|data: &[u8]| {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return,
    };

    match validate_ipv4_cidr(text) {
        Ok((canonical, warning)) => {
            let (again, residual) =
                validate_ipv4_cidr(&canonical).expect("canonical IPv4 CIDR failed to re-validate");
            assert_eq!(again, canonical);
            assert!(residual.is_none());
            if warning.is_none() {
                // Clean input passes through untouched
                assert_eq!(canonical, text);
            }
        }
        Err(err) => {
            let _ = err.to_string();
        }
    }

    match validate_ipv6_cidr(text) {
        Ok((canonical, warning)) => {
            let (again, residual) =
                validate_ipv6_cidr(&canonical).expect("canonical IPv6 CIDR failed to re-validate");
            assert_eq!(again, canonical);
            assert!(residual.is_none());
            if warning.is_none() {
                assert_eq!(canonical, text);
            }
        }
        Err(err) => {
            let _ = err.to_string();
        }
    }
});

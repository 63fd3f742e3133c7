//! Fuzz target for rule expansion.
//!
//! This fuzzer feeds arbitrary rule declarations through `expand_rules` and
//! checks that expansion never panics, stays deterministic, never emits
//! duplicates, and never produces more rules than the declared port/source
//! grid allows.

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;

use sgsync::modules::securitygroup::expand::expand_rules;
use sgsync::modules::securitygroup::spec::{OneOrMany, PortEntry, RuleSpec};

/// Arbitrary ports entry: a number or free-form range text
#[derive(Debug, Clone, Arbitrary)]
enum FuzzPort {
    Number(i64),
    Text(String),
}

impl FuzzPort {
    fn into_entry(self) -> PortEntry {
        match self {
            FuzzPort::Number(n) => PortEntry::Number(n),
            FuzzPort::Text(s) => PortEntry::Text(s),
        }
    }
}

/// Arbitrary rule declaration mirroring the user-facing spec shape
#[derive(Debug, Clone, Arbitrary)]
struct FuzzRule {
    proto: Option<String>,
    ports: Option<Vec<FuzzPort>>,
    from_port: Option<i64>,
    to_port: Option<i64>,
    cidr_ip: Option<Vec<String>>,
    cidr_ipv6: Option<Vec<String>>,
    group_id: Option<Vec<String>>,
    group_name: Option<Vec<String>>,
    group_desc: Option<String>,
    rule_desc: Option<String>,
}

impl FuzzRule {
    fn into_spec(self) -> RuleSpec {
        RuleSpec {
            proto: self.proto,
            ports: self
                .ports
                .map(|entries| OneOrMany::Many(entries.into_iter().map(FuzzPort::into_entry).collect())),
            from_port: self.from_port,
            to_port: self.to_port,
            cidr_ip: self.cidr_ip.map(OneOrMany::Many),
            cidr_ipv6: self.cidr_ipv6.map(OneOrMany::Many),
            group_id: self.group_id.map(OneOrMany::Many),
            group_name: self.group_name.map(OneOrMany::Many),
            group_desc: self.group_desc,
            rule_desc: self.rule_desc,
        }
    }

    /// Upper bound on the rules this declaration can expand to
    fn grid_size(&self) -> usize {
        let ports = self.ports.as_ref().map(|p| p.len().max(1)).unwrap_or(1);
        let sources = self.cidr_ip.as_ref().map(|v| v.len()).unwrap_or(0)
            + self.cidr_ipv6.as_ref().map(|v| v.len()).unwrap_or(0)
            + self.group_id.as_ref().map(|v| v.len()).unwrap_or(0)
            + self.group_name.as_ref().map(|v| v.len()).unwrap_or(0);
        ports.saturating_mul(sources)
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut unstructured = Unstructured::new(data);

    // Structured declarations built from arbitrary field values
    if let Ok(rules) = Vec::<FuzzRule>::arbitrary(&mut unstructured) {
        if rules.len() > 8 {
            return;
        }
        let bound: usize = rules.iter().map(FuzzRule::grid_size).sum();
        let specs: Vec<RuleSpec> = rules.into_iter().map(FuzzRule::into_spec).collect();

        match expand_rules(&specs) {
            Ok(expanded) => {
                // The grid bound holds even before deduplication
                assert!(expanded.len() <= bound);

                // Expansion deduplicates
                let distinct: HashSet<_> = expanded.iter().collect();
                assert_eq!(distinct.len(), expanded.len());

                // Expansion is deterministic
                let again = expand_rules(&specs).expect("second expansion failed");
                assert_eq!(expanded, again);
            }
            Err(err) => {
                // Errors must render without panicking
                let _ = err.to_string();
            }
        }
    }

    // Raw bytes through the serde layer exercise the custom deserializers
    if let Ok(spec) = serde_json::from_slice::<RuleSpec>(data) {
        let _ = expand_rules(std::slice::from_ref(&spec));
    }
});

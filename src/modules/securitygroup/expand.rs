//! Rule expansion: multi-valued specs to single-port, single-source rules.
//!
//! Ports expand strictly before sources, so `ports: [80, 443]` with
//! `cidr_ip: [a, b]` yields (80,a), (80,b), (443,a), (443,b). Exact
//! duplicates produced by the expansion collapse to one, keeping the
//! first-seen order, which makes re-applying identical input a no-op.

use indexmap::IndexSet;

use super::spec::{ExpandedRuleSpec, PortEntry, RuleSource, RuleSpec};
use crate::modules::{ModuleError, ModuleResult};

/// Protocol assumed when a rule does not declare one
const DEFAULT_PROTOCOL: &str = "tcp";

/// Expand a list of user-declared rules into flat single-port, single-source
/// specs, validating the one-source-per-rule invariant along the way.
pub fn expand_rules(specs: &[RuleSpec]) -> ModuleResult<Vec<ExpandedRuleSpec>> {
    let mut expanded: IndexSet<ExpandedRuleSpec> = IndexSet::new();

    for (index, spec) in specs.iter().enumerate() {
        validate_sources(spec, index)?;

        let proto = spec
            .proto
            .clone()
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        let port_pairs = expand_ports(spec, index)?;
        let sources = collect_sources(spec);

        for (from_port, to_port) in &port_pairs {
            for source in &sources {
                expanded.insert(ExpandedRuleSpec {
                    proto: proto.clone(),
                    from_port: *from_port,
                    to_port: *to_port,
                    source: source.clone(),
                    group_desc: spec.group_desc.clone(),
                    rule_desc: spec.rule_desc.clone(),
                });
            }
        }
    }

    Ok(expanded.into_iter().collect())
}

/// Reject rules that set more than one source field, or none at all
fn validate_sources(spec: &RuleSpec, index: usize) -> ModuleResult<()> {
    let fields = spec.source_fields();
    match fields.len() {
        1 => Ok(()),
        0 => Err(ModuleError::InvalidParameter(format!(
            "rule {}: one of cidr_ip, cidr_ipv6, group_id or group_name is required",
            index
        ))),
        _ => Err(ModuleError::InvalidParameter(format!(
            "rule {}: specify {} OR {}, not both",
            index, fields[0], fields[1]
        ))),
    }
}

/// Flatten the `ports` field (or the explicit from/to pair) into port pairs
fn expand_ports(
    spec: &RuleSpec,
    index: usize,
) -> ModuleResult<Vec<(Option<i64>, Option<i64>)>> {
    match &spec.ports {
        None => Ok(vec![(spec.from_port, spec.to_port)]),
        Some(ports) => {
            if spec.from_port.is_some() || spec.to_port.is_some() {
                return Err(ModuleError::InvalidParameter(format!(
                    "rule {}: specify ports OR from_port/to_port, not both",
                    index
                )));
            }
            let entries = ports.to_vec();
            if entries.is_empty() {
                return Err(ModuleError::InvalidParameter(format!(
                    "rule {}: ports must not be an empty list",
                    index
                )));
            }
            let mut pairs = Vec::with_capacity(entries.len());
            for entry in entries {
                let (from, to) = parse_port_entry(&entry, index)?;
                pairs.push((Some(from), Some(to)));
            }
            Ok(pairs)
        }
    }
}

/// Parse one ports entry: a bare port maps to `(port, port)`, a range
/// string splits once on the first `-` with both halves trimmed.
fn parse_port_entry(entry: &PortEntry, index: usize) -> ModuleResult<(i64, i64)> {
    match entry {
        PortEntry::Number(n) => Ok((*n, *n)),
        PortEntry::Text(s) => {
            let text = s.trim();
            if let Some((start, end)) = text.split_once('-') {
                let from = parse_port_number(start.trim(), index, text)?;
                let to = parse_port_number(end.trim(), index, text)?;
                Ok((from, to))
            } else {
                let port = parse_port_number(text, index, text)?;
                Ok((port, port))
            }
        }
    }
}

fn parse_port_number(value: &str, index: usize, entry: &str) -> ModuleResult<i64> {
    value.parse::<i64>().map_err(|_| {
        ModuleError::InvalidParameter(format!(
            "rule {}: invalid port entry '{}'",
            index, entry
        ))
    })
}

/// Materialize the single populated source field, one entry per list element
fn collect_sources(spec: &RuleSpec) -> Vec<RuleSource> {
    if let Some(values) = &spec.cidr_ip {
        return values.to_vec().into_iter().map(RuleSource::CidrIpv4).collect();
    }
    if let Some(values) = &spec.cidr_ipv6 {
        return values.to_vec().into_iter().map(RuleSource::CidrIpv6).collect();
    }
    if let Some(values) = &spec.group_id {
        return values.to_vec().into_iter().map(RuleSource::GroupId).collect();
    }
    if let Some(values) = &spec.group_name {
        return values.to_vec().into_iter().map(RuleSource::GroupName).collect();
    }
    Vec::new()
}

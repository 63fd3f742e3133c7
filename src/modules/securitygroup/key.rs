//! Canonical rule keys.
//!
//! Reconciliation is a set diff over string keys of the form
//! `{direction}-{proto}-{from}-{to}-{target_group}-{target_cidr}`. Both the
//! desired rules and the rules read back from the remote API are keyed
//! through the same deriver, so the two sides compare equal exactly when an
//! operator would consider them the same rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::serializer::WirePermission;
use super::spec::ExpandedRuleSpec;

/// Protocol token meaning "all protocols"
pub const ALL_PROTOCOLS: &str = "-1";

/// Rule direction relative to the security group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    /// Short prefix used in rule keys
    pub fn key_prefix(self) -> &'static str {
        match self {
            Direction::Ingress => "in",
            Direction::Egress => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => write!(f, "ingress"),
            Direction::Egress => write!(f, "egress"),
        }
    }
}

/// Canonical identity of one rule for set-diff purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey(String);

impl RuleKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rule seen from either side of the diff, exposing the three fields the
/// key needs through one accessor surface.
#[derive(Debug, Clone, Copy)]
pub enum RuleView<'a> {
    /// A desired rule as declared (and expanded) by the user
    Desired(&'a ExpandedRuleSpec),
    /// A permission fragment read back from the remote API
    Remote(&'a WirePermission),
}

impl RuleView<'_> {
    pub fn protocol(&self) -> &str {
        match self {
            RuleView::Desired(rule) => &rule.proto,
            RuleView::Remote(perm) => &perm.ip_protocol,
        }
    }

    pub fn from_port(&self) -> Option<i64> {
        match self {
            RuleView::Desired(rule) => rule.from_port,
            RuleView::Remote(perm) => perm.from_port,
        }
    }

    pub fn to_port(&self) -> Option<i64> {
        match self {
            RuleView::Desired(rule) => rule.to_port,
            RuleView::Remote(perm) => perm.to_port,
        }
    }
}

/// True when the protocol token means "all protocols"
pub fn is_all_protocols(proto: &str) -> bool {
    matches!(proto.to_ascii_lowercase().as_str(), "-1" | "all")
}

/// Canonical protocol token: the all-protocols aliases collapse to `-1`,
/// anything else passes through
pub fn canonical_protocol(proto: &str) -> String {
    if is_all_protocols(proto) {
        ALL_PROTOCOLS.to_string()
    } else {
        proto.to_string()
    }
}

/// Derive the canonical key for a rule.
///
/// All-protocols rules collapse their port fields to one shared token no
/// matter which placeholder ports either side reports; other protocols
/// outside tcp/udp/icmp do the same when both ports are the `-1` sentinel.
/// The final key is lower-cased with every `-none` normalized to `-None`,
/// exactly one canonical spelling per rule.
pub fn derive_key(
    direction: Direction,
    protocol: &str,
    from_port: Option<i64>,
    to_port: Option<i64>,
    target_group_id: Option<&str>,
    target_cidr: Option<&str>,
) -> RuleKey {
    let proto = canonical_protocol(protocol);
    let named_protocol = matches!(
        proto.to_ascii_lowercase().as_str(),
        "icmp" | "tcp" | "udp"
    );

    let (from_token, to_token) = if proto == ALL_PROTOCOLS
        || (!named_protocol && from_port == Some(-1) && to_port == Some(-1))
    {
        ("none".to_string(), "none".to_string())
    } else {
        (format_port(from_port), format_port(to_port))
    };

    let key = format!(
        "{}-{}-{}-{}-{}-{}",
        direction.key_prefix(),
        proto,
        from_token,
        to_token,
        target_group_id.unwrap_or("None"),
        target_cidr.unwrap_or("None"),
    );

    RuleKey(key.to_lowercase().replace("-none", "-None"))
}

/// Key a rule view against its resolved target
pub fn derive_key_for(
    view: RuleView<'_>,
    direction: Direction,
    target_group_id: Option<&str>,
    target_cidr: Option<&str>,
) -> RuleKey {
    derive_key(
        direction,
        view.protocol(),
        view.from_port(),
        view.to_port(),
        target_group_id,
        target_cidr,
    )
}

fn format_port(port: Option<i64>) -> String {
    match port {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

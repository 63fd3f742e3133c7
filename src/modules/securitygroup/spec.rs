//! Rule specifications as declared by the user.
//!
//! A [`RuleSpec`] is the raw, possibly multi-valued form a rule arrives in
//! (`ports: [80, "8080-8099"]`, `cidr_ip: [a, b]`). Expansion flattens it
//! into [`ExpandedRuleSpec`] values carrying exactly one port pair and one
//! source.

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::modules::{ModuleError, ModuleResult};

/// Desired state for the managed security group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Group should exist and match the declared rules
    Present,
    /// Group should be deleted
    Absent,
}

impl GroupState {
    pub fn from_str(s: &str) -> ModuleResult<Self> {
        match s.to_lowercase().as_str() {
            "present" => Ok(GroupState::Present),
            "absent" => Ok(GroupState::Absent),
            other => Err(ModuleError::InvalidParameter(format!(
                "state must be 'present' or 'absent', got '{}'",
                other
            ))),
        }
    }
}

/// A scalar-or-list field, as YAML/JSON module parameters allow both
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(vs) => vs.clone(),
        }
    }
}

/// A single entry of the `ports` field: a number, or a string that may
/// hold a bare port or an `"N-M"` range
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(i64),
    Text(String),
}

/// One user-declared rule, prior to expansion.
///
/// Exactly one of `cidr_ip`, `cidr_ipv6`, `group_id`, `group_name` must be
/// set (each may be a list; expansion flattens it). `ports` may replace the
/// `from_port`/`to_port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Protocol: tcp, udp, icmp, a protocol number, or "-1"/"all"
    #[serde(default, alias = "protocol", deserialize_with = "de_opt_stringish")]
    pub proto: Option<String>,

    /// Port or list of ports/ranges; mutually exclusive with from_port/to_port
    #[serde(default)]
    pub ports: Option<OneOrMany<PortEntry>>,

    #[serde(default, deserialize_with = "de_opt_port")]
    pub from_port: Option<i64>,

    #[serde(default, deserialize_with = "de_opt_port")]
    pub to_port: Option<i64>,

    /// IPv4 CIDR source(s)
    #[serde(default, alias = "cidr_ipv4")]
    pub cidr_ip: Option<OneOrMany<String>>,

    /// IPv6 CIDR source(s)
    #[serde(default)]
    pub cidr_ipv6: Option<OneOrMany<String>>,

    /// Peer security group id(s); `owner/sg-id/name` marks a foreign group
    #[serde(default)]
    pub group_id: Option<OneOrMany<String>>,

    /// Peer security group name(s), resolved against known groups
    #[serde(default)]
    pub group_name: Option<OneOrMany<String>>,

    /// Description used when a referenced group must be created
    #[serde(default)]
    pub group_desc: Option<String>,

    /// Description attached to the grant this rule produces
    #[serde(default, alias = "rule_description", alias = "description")]
    pub rule_desc: Option<String>,
}

impl RuleSpec {
    /// Names of the source fields that are set on this spec
    pub fn source_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.cidr_ip.is_some() {
            fields.push("cidr_ip");
        }
        if self.cidr_ipv6.is_some() {
            fields.push("cidr_ipv6");
        }
        if self.group_id.is_some() {
            fields.push("group_id");
        }
        if self.group_name.is_some() {
            fields.push("group_name");
        }
        fields
    }
}

/// The single source of an expanded rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSource {
    CidrIpv4(String),
    CidrIpv6(String),
    GroupId(String),
    GroupName(String),
}

/// A rule flattened to one `(from_port, to_port)` pair and one source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedRuleSpec {
    pub proto: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub source: RuleSource,
    pub group_desc: Option<String>,
    pub rule_desc: Option<String>,
}

/// Accept strings and numbers alike (protocols may be declared as numbers)
fn de_opt_stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

/// Accept integers and numeric strings for port fields
fn de_opt_port<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom("port must be an integer")),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("port '{}' is not an integer", s))),
        Some(other) => Err(de::Error::custom(format!(
            "port must be an integer, got {}",
            other
        ))),
    }
}

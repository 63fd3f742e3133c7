//! Wire-shape serialization for security group permissions.
//!
//! [`WirePermission`] is the permission shape the remote API speaks: one
//! protocol/port header plus grant lists. Ports that do not apply are
//! omitted entirely (the remote side treats an explicit null differently
//! from an absent key), the protocol always travels as a string, and a
//! rule description rides on the individual grant.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::key::{canonical_protocol, is_all_protocols};
use super::resolver::ResolvedTarget;
use super::spec::ExpandedRuleSpec;
use crate::modules::{ModuleError, ModuleResult};

/// One permission in the remote API's native shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePermission {
    #[serde(rename = "IpProtocol")]
    pub ip_protocol: String,

    #[serde(rename = "FromPort", default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i64>,

    #[serde(rename = "ToPort", default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i64>,

    #[serde(rename = "IpRanges", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<IpRange>,

    #[serde(rename = "Ipv6Ranges", default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<Ipv6Range>,

    #[serde(
        rename = "UserIdGroupPairs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub user_id_group_pairs: Vec<UserIdGroupPair>,
}

/// An IPv4 CIDR grant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    #[serde(rename = "CidrIp")]
    pub cidr_ip: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An IPv6 CIDR grant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Range {
    #[serde(rename = "CidrIpv6")]
    pub cidr_ipv6: String,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A peer security group grant; `user_id` is set for foreign groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdGroupPair {
    #[serde(rename = "GroupId")]
    pub group_id: String,

    #[serde(rename = "UserId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Serialize an expanded rule and its resolved target into the wire shape.
///
/// All-protocols rules collapse to protocol `-1` with both ports cleared;
/// `owner_id` is the owning account of a foreign target group, attached to
/// the group grant so the remote side can address it.
pub fn to_wire(
    rule: &ExpandedRuleSpec,
    target: &ResolvedTarget,
    owner_id: Option<&str>,
) -> WirePermission {
    let (ip_protocol, from_port, to_port) = if is_all_protocols(&rule.proto) {
        (canonical_protocol(&rule.proto), None, None)
    } else {
        (rule.proto.clone(), rule.from_port, rule.to_port)
    };

    let mut permission = WirePermission {
        ip_protocol,
        from_port,
        to_port,
        ..Default::default()
    };

    match target {
        ResolvedTarget::Ipv4(cidr) => permission.ip_ranges.push(IpRange {
            cidr_ip: cidr.clone(),
            description: rule.rule_desc.clone(),
        }),
        ResolvedTarget::Ipv6(cidr) => permission.ipv6_ranges.push(Ipv6Range {
            cidr_ipv6: cidr.clone(),
            description: rule.rule_desc.clone(),
        }),
        ResolvedTarget::Group(group_id) => permission.user_id_group_pairs.push(UserIdGroupPair {
            group_id: group_id.clone(),
            user_id: owner_id.map(str::to_string),
            description: rule.rule_desc.clone(),
        }),
    }

    permission
}

/// Validate an IPv4 CIDR, masking host bits.
///
/// Returns the canonical network CIDR plus a warning when host bits were
/// set; a CIDR that does not parse at all is an error.
pub fn validate_ipv4_cidr(cidr: &str) -> ModuleResult<(String, Option<String>)> {
    let (addr_text, prefix_text) = cidr
        .split_once('/')
        .ok_or_else(|| invalid_cidr(cidr, "missing prefix length"))?;
    let addr: Ipv4Addr = addr_text
        .trim()
        .parse()
        .map_err(|_| invalid_cidr(cidr, "bad address"))?;
    let prefix: u8 = prefix_text
        .trim()
        .parse()
        .map_err(|_| invalid_cidr(cidr, "bad prefix length"))?;
    if prefix > 32 {
        return Err(invalid_cidr(cidr, "prefix length exceeds 32"));
    }

    let bits = u32::from(addr);
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    let network = bits & mask;

    if network == bits {
        return Ok((cidr.to_string(), None));
    }

    let canonical = format!("{}/{}", Ipv4Addr::from(network), prefix);
    let warning = format!(
        "CIDR {} has host bits set, treating it as {}",
        cidr, canonical
    );
    Ok((canonical, Some(warning)))
}

/// IPv6 companion of [`validate_ipv4_cidr`]
pub fn validate_ipv6_cidr(cidr: &str) -> ModuleResult<(String, Option<String>)> {
    let (addr_text, prefix_text) = cidr
        .split_once('/')
        .ok_or_else(|| invalid_cidr(cidr, "missing prefix length"))?;
    let addr: Ipv6Addr = addr_text
        .trim()
        .parse()
        .map_err(|_| invalid_cidr(cidr, "bad address"))?;
    let prefix: u8 = prefix_text
        .trim()
        .parse()
        .map_err(|_| invalid_cidr(cidr, "bad prefix length"))?;
    if prefix > 128 {
        return Err(invalid_cidr(cidr, "prefix length exceeds 128"));
    }

    let bits = u128::from(addr);
    let mask = if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    };
    let network = bits & mask;

    if network == bits {
        return Ok((cidr.to_string(), None));
    }

    let canonical = format!("{}/{}", Ipv6Addr::from(network), prefix);
    let warning = format!(
        "CIDR {} has host bits set, treating it as {}",
        cidr, canonical
    );
    Ok((canonical, Some(warning)))
}

fn invalid_cidr(cidr: &str, reason: &str) -> ModuleError {
    ModuleError::InvalidParameter(format!("invalid CIDR '{}': {}", cidr, reason))
}

// ---------------------------------------------------------------------------
// Reporting shape
// ---------------------------------------------------------------------------

/// A permission in the snake_case shape the module reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPermission {
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_ranges: Vec<ReportIpRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv6_ranges: Vec<ReportIpv6Range>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_id_group_pairs: Vec<ReportGroupPair>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIpRange {
    pub cidr_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIpv6Range {
    pub cidr_ipv6: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGroupPair {
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&WirePermission> for ReportPermission {
    fn from(perm: &WirePermission) -> Self {
        ReportPermission {
            ip_protocol: perm.ip_protocol.clone(),
            from_port: perm.from_port,
            to_port: perm.to_port,
            ip_ranges: perm
                .ip_ranges
                .iter()
                .map(|r| ReportIpRange {
                    cidr_ip: r.cidr_ip.clone(),
                    description: r.description.clone(),
                })
                .collect(),
            ipv6_ranges: perm
                .ipv6_ranges
                .iter()
                .map(|r| ReportIpv6Range {
                    cidr_ipv6: r.cidr_ipv6.clone(),
                    description: r.description.clone(),
                })
                .collect(),
            user_id_group_pairs: perm
                .user_id_group_pairs
                .iter()
                .map(|p| ReportGroupPair {
                    group_id: p.group_id.clone(),
                    user_id: p.user_id.clone(),
                    description: p.description.clone(),
                })
                .collect(),
        }
    }
}

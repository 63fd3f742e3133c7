//! Remote API abstraction for security group reconciliation.
//!
//! [`SecurityGroupApi`] is the narrow surface the reconciliation engine
//! drives. The real EC2-backed client lives in [`super::aws`]; tests
//! substitute an in-memory fake.

use std::collections::HashMap;

use async_trait::async_trait;

use super::key::Direction;
use super::serializer::WirePermission;
use crate::modules::ModuleResult;

/// A security group as described by the remote API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
    pub ingress: Vec<WirePermission>,
    pub egress: Vec<WirePermission>,
    pub tags: HashMap<String, String>,
}

impl GroupRecord {
    /// Classic (non-VPC) groups have no VPC id and no default egress rule
    pub fn is_vpc(&self) -> bool {
        self.vpc_id.is_some()
    }
}

/// Operations the reconciliation engine needs from the remote side.
///
/// Every mutating call covers exactly one permission batch so failures can
/// be reported with the offending payload attached.
#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Describe groups, optionally filtered by VPC and/or exact name.
    async fn describe_all_groups(
        &self,
        vpc_filter: Option<&str>,
        name_filter: Option<&str>,
    ) -> ModuleResult<Vec<GroupRecord>>;

    /// Create a group and return its record as the remote side sees it.
    async fn create_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> ModuleResult<GroupRecord>;

    /// Delete a group by id.
    async fn delete_group(&self, group_id: &str) -> ModuleResult<()>;

    /// Grant the given permissions in one direction.
    async fn authorize(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()>;

    /// Revoke the given permissions in one direction.
    async fn revoke(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()>;

    /// Rewrite the description of one existing rule in place.
    async fn update_rule_description(
        &self,
        direction: Direction,
        group_id: &str,
        permission: &WirePermission,
    ) -> ModuleResult<()>;

    /// Apply tag changes: add or overwrite `to_add`, delete `to_remove`.
    async fn set_tags(
        &self,
        group_id: &str,
        to_add: &HashMap<String, String>,
        to_remove: &[String],
    ) -> ModuleResult<()>;

    /// Whether the remote side can store per-rule descriptions.
    fn supports_rule_descriptions(&self) -> bool {
        true
    }
}

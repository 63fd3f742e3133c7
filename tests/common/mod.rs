//! Shared test utilities and fixtures for the sgsync test suite.
//!
//! This module provides:
//! - FakeEc2: an in-memory SecurityGroupApi with call recording and failure injection
//! - Fluent builders for group records and reconcile requests
//! - Wire permission helpers
//! - Assertion helpers for ReconcileOutcome and ModuleOutput
//!
//! # Usage
//!
//! Include this module in your integration tests:
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use sgsync::modules::securitygroup::engine::{PollSettings, ReconcileOutcome, ReconcileRequest};
use sgsync::modules::securitygroup::serializer::{IpRange, Ipv6Range, UserIdGroupPair};
use sgsync::modules::securitygroup::{
    Direction, GroupRecord, GroupState, RuleSpec, SecurityGroupApi, WirePermission,
};
use sgsync::modules::{ModuleError, ModuleOutput, ModuleParams, ModuleResult, ModuleStatus};

/// Account id the fake reports for every group it owns
pub const TEST_OWNER: &str = "123456789012";

// ============================================================================
// Recorded API Calls
// ============================================================================

/// One call made against the fake, with enough payload to assert on
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Describe {
        name_filter: Option<String>,
    },
    CreateGroup {
        name: String,
        vpc_id: Option<String>,
    },
    DeleteGroup {
        group_id: String,
    },
    Authorize {
        direction: Direction,
        group_id: String,
        permissions: Vec<WirePermission>,
    },
    Revoke {
        direction: Direction,
        group_id: String,
        permissions: Vec<WirePermission>,
    },
    UpdateDescription {
        direction: Direction,
        group_id: String,
        permission: WirePermission,
    },
    SetTags {
        group_id: String,
        added: Vec<String>,
        removed: Vec<String>,
    },
}

impl ApiCall {
    /// Everything except describes changes remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApiCall::Describe { .. })
    }
}

// ============================================================================
// FakeEc2
// ============================================================================

/// An in-memory security group API for testing.
///
/// The fake keeps real group state: authorizes append grants, revokes
/// remove them, tag updates apply. Every call is recorded so tests can
/// assert exactly which mutations a converge pass issued.
///
/// # Example
///
/// ```rust,ignore
/// let api = FakeEc2::new();
/// api.add_group(group("sg-1", "web").vpc("vpc-1").default_egress().build());
///
/// let outcome = engine(&api).run(&request).await.unwrap();
/// assert_eq!(api.authorize_count(Direction::Ingress), 1);
/// ```
#[derive(Debug)]
pub struct FakeEc2 {
    groups: RwLock<Vec<GroupRecord>>,
    calls: RwLock<Vec<ApiCall>>,
    fail_on: RwLock<Option<String>>,
    fail_after_n: AtomicU32,
    call_count: AtomicU32,
    /// Created VPC groups that have not grown their default egress yet,
    /// with the number of describes left before it appears
    pending_egress: RwLock<Vec<(String, u32)>>,
    egress_delay: AtomicU32,
    supports_descriptions: AtomicBool,
    next_id: AtomicU32,
}

impl FakeEc2 {
    /// Create an empty fake with no groups.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
            fail_after_n: AtomicU32::new(u32::MAX),
            call_count: AtomicU32::new(0),
            pending_egress: RwLock::new(Vec::new()),
            egress_delay: AtomicU32::new(0),
            supports_descriptions: AtomicBool::new(true),
            next_id: AtomicU32::new(0),
        }
    }

    /// Create a fake pre-seeded with the given groups.
    pub fn with_groups(groups: Vec<GroupRecord>) -> Self {
        let fake = Self::new();
        *fake.groups.write() = groups;
        fake
    }

    /// Add a group to the remote state without recording a call.
    pub fn add_group(&self, record: GroupRecord) {
        self.groups.write().push(record);
    }

    /// Snapshot of the remote state.
    pub fn groups(&self) -> Vec<GroupRecord> {
        self.groups.read().clone()
    }

    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<GroupRecord> {
        self.groups.read().iter().find(|g| g.name == name).cloned()
    }

    /// Look up a group by id.
    pub fn group_by_id(&self, id: &str) -> Option<GroupRecord> {
        self.groups.read().iter().find(|g| g.id == id).cloned()
    }

    /// Fail every call to the named operation.
    pub fn fail_on(&self, operation: impl Into<String>) {
        *self.fail_on.write() = Some(operation.into());
    }

    /// Fail every call after the first N have succeeded.
    pub fn fail_after(&self, n: u32) {
        self.fail_after_n.store(n, Ordering::SeqCst);
    }

    /// Make freshly created VPC groups grow their default egress rule
    /// only on the Nth describe after creation.
    pub fn delay_default_egress(&self, describes: u32) {
        self.egress_delay.store(describes, Ordering::SeqCst);
    }

    /// Toggle per-rule description support.
    pub fn set_supports_descriptions(&self, enabled: bool) {
        self.supports_descriptions.store(enabled, Ordering::SeqCst);
    }

    /// All recorded calls in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.read().clone()
    }

    /// Recorded calls that mutate remote state.
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls
            .read()
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn describe_count(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::Describe { .. }))
    }

    pub fn create_count(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::CreateGroup { .. }))
    }

    pub fn delete_count(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::DeleteGroup { .. }))
    }

    pub fn authorize_count(&self, direction: Direction) -> usize {
        self.count_calls(
            |c| matches!(c, ApiCall::Authorize { direction: d, .. } if *d == direction),
        )
    }

    pub fn revoke_count(&self, direction: Direction) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::Revoke { direction: d, .. } if *d == direction))
    }

    pub fn update_description_count(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::UpdateDescription { .. }))
    }

    pub fn set_tags_count(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::SetTags { .. }))
    }

    /// Clear recorded calls and failure configuration, keeping group state.
    pub fn reset_calls(&self) {
        self.calls.write().clear();
        *self.fail_on.write() = None;
        self.fail_after_n.store(u32::MAX, Ordering::SeqCst);
        self.call_count.store(0, Ordering::SeqCst);
    }

    fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.read().iter().filter(|c| predicate(c)).count()
    }

    fn check_should_fail(&self, operation: &str) -> ModuleResult<()> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        if count >= self.fail_after_n.load(Ordering::SeqCst) {
            return Err(ModuleError::ExecutionFailed(format!(
                "injected {} failure",
                operation
            )));
        }
        if self.fail_on.read().as_deref() == Some(operation) {
            return Err(ModuleError::ExecutionFailed(format!(
                "injected {} failure",
                operation
            )));
        }
        Ok(())
    }

    fn record(&self, call: ApiCall) {
        self.calls.write().push(call);
    }

    /// Groups whose default egress is still pending get one describe closer
    /// to growing it.
    fn advance_pending_egress(&self) {
        let mut pending = self.pending_egress.write();
        if pending.is_empty() {
            return;
        }
        let mut groups = self.groups.write();
        pending.retain_mut(|(id, remaining)| {
            if *remaining > 1 {
                *remaining -= 1;
                return true;
            }
            if let Some(group) = groups.iter_mut().find(|g| g.id == *id) {
                group.egress.push(default_egress());
            }
            false
        });
    }
}

impl Default for FakeEc2 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecurityGroupApi for FakeEc2 {
    async fn describe_all_groups(
        &self,
        vpc_filter: Option<&str>,
        name_filter: Option<&str>,
    ) -> ModuleResult<Vec<GroupRecord>> {
        self.check_should_fail("describe")?;
        self.record(ApiCall::Describe {
            name_filter: name_filter.map(String::from),
        });
        self.advance_pending_egress();

        Ok(self
            .groups
            .read()
            .iter()
            .filter(|g| vpc_filter.is_none() || g.vpc_id.as_deref() == vpc_filter)
            .filter(|g| name_filter.is_none() || Some(g.name.as_str()) == name_filter)
            .cloned()
            .collect())
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> ModuleResult<GroupRecord> {
        self.check_should_fail("create")?;
        self.record(ApiCall::CreateGroup {
            name: name.to_string(),
            vpc_id: vpc_id.map(String::from),
        });

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("sg-{:08x}", n);
        let delay = self.egress_delay.load(Ordering::SeqCst);

        let mut record = GroupRecord {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            vpc_id: vpc_id.map(String::from),
            owner_id: Some(TEST_OWNER.to_string()),
            ingress: Vec::new(),
            egress: Vec::new(),
            tags: HashMap::new(),
        };
        if vpc_id.is_some() {
            if delay == 0 {
                record.egress.push(default_egress());
            } else {
                self.pending_egress.write().push((id, delay));
            }
        }
        self.groups.write().push(record.clone());
        Ok(record)
    }

    async fn delete_group(&self, group_id: &str) -> ModuleResult<()> {
        self.check_should_fail("delete")?;
        self.record(ApiCall::DeleteGroup {
            group_id: group_id.to_string(),
        });

        let mut groups = self.groups.write();
        let before = groups.len();
        groups.retain(|g| g.id != group_id);
        if groups.len() == before {
            return Err(ModuleError::ExecutionFailed(format!(
                "no such group: {}",
                group_id
            )));
        }
        Ok(())
    }

    async fn authorize(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()> {
        self.check_should_fail("authorize")?;
        self.record(ApiCall::Authorize {
            direction,
            group_id: group_id.to_string(),
            permissions: permissions.to_vec(),
        });

        let mut groups = self.groups.write();
        let group = find_group_mut(&mut groups, group_id)?;
        let list = match direction {
            Direction::Ingress => &mut group.ingress,
            Direction::Egress => &mut group.egress,
        };
        list.extend(permissions.iter().cloned());
        Ok(())
    }

    async fn revoke(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()> {
        self.check_should_fail("revoke")?;
        self.record(ApiCall::Revoke {
            direction,
            group_id: group_id.to_string(),
            permissions: permissions.to_vec(),
        });

        let mut groups = self.groups.write();
        let group = find_group_mut(&mut groups, group_id)?;
        let list = match direction {
            Direction::Ingress => &mut group.ingress,
            Direction::Egress => &mut group.egress,
        };
        for permission in permissions {
            if !remove_grant(list, permission) {
                return Err(ModuleError::ExecutionFailed(format!(
                    "rule not found on {}",
                    group_id
                )));
            }
        }
        Ok(())
    }

    async fn update_rule_description(
        &self,
        direction: Direction,
        group_id: &str,
        permission: &WirePermission,
    ) -> ModuleResult<()> {
        self.check_should_fail("update_description")?;
        self.record(ApiCall::UpdateDescription {
            direction,
            group_id: group_id.to_string(),
            permission: permission.clone(),
        });

        let mut groups = self.groups.write();
        let group = find_group_mut(&mut groups, group_id)?;
        let list = match direction {
            Direction::Ingress => &mut group.ingress,
            Direction::Egress => &mut group.egress,
        };
        if !rewrite_description(list, permission) {
            return Err(ModuleError::ExecutionFailed(format!(
                "rule not found on {}",
                group_id
            )));
        }
        Ok(())
    }

    async fn set_tags(
        &self,
        group_id: &str,
        to_add: &HashMap<String, String>,
        to_remove: &[String],
    ) -> ModuleResult<()> {
        self.check_should_fail("set_tags")?;
        let mut added: Vec<String> = to_add.keys().cloned().collect();
        added.sort();
        let mut removed: Vec<String> = to_remove.to_vec();
        removed.sort();
        self.record(ApiCall::SetTags {
            group_id: group_id.to_string(),
            added,
            removed,
        });

        let mut groups = self.groups.write();
        let group = find_group_mut(&mut groups, group_id)?;
        for (key, value) in to_add {
            group.tags.insert(key.clone(), value.clone());
        }
        for key in to_remove {
            group.tags.remove(key);
        }
        Ok(())
    }

    fn supports_rule_descriptions(&self) -> bool {
        self.supports_descriptions.load(Ordering::SeqCst)
    }
}

fn find_group_mut<'a>(
    groups: &'a mut [GroupRecord],
    group_id: &str,
) -> ModuleResult<&'a mut GroupRecord> {
    groups
        .iter_mut()
        .find(|g| g.id == group_id)
        .ok_or_else(|| ModuleError::ExecutionFailed(format!("no such group: {}", group_id)))
}

fn same_header(a: &WirePermission, b: &WirePermission) -> bool {
    a.ip_protocol == b.ip_protocol && a.from_port == b.from_port && a.to_port == b.to_port
}

/// Remove the single grant carried by `single` from whichever stored
/// permission holds it. Stored permissions may aggregate several grants.
fn remove_grant(list: &mut Vec<WirePermission>, single: &WirePermission) -> bool {
    let mut removed = false;
    for stored in list.iter_mut() {
        if !same_header(stored, single) {
            continue;
        }
        if let Some(range) = single.ip_ranges.first() {
            if let Some(pos) = stored
                .ip_ranges
                .iter()
                .position(|r| r.cidr_ip == range.cidr_ip)
            {
                stored.ip_ranges.remove(pos);
                removed = true;
                break;
            }
        } else if let Some(range) = single.ipv6_ranges.first() {
            if let Some(pos) = stored
                .ipv6_ranges
                .iter()
                .position(|r| r.cidr_ipv6 == range.cidr_ipv6)
            {
                stored.ipv6_ranges.remove(pos);
                removed = true;
                break;
            }
        } else if let Some(pair) = single.user_id_group_pairs.first() {
            if let Some(pos) = stored
                .user_id_group_pairs
                .iter()
                .position(|p| p.group_id == pair.group_id)
            {
                stored.user_id_group_pairs.remove(pos);
                removed = true;
                break;
            }
        }
    }
    if removed {
        prune_empty(list);
    }
    removed
}

fn prune_empty(list: &mut Vec<WirePermission>) {
    list.retain(|p| {
        !p.ip_ranges.is_empty() || !p.ipv6_ranges.is_empty() || !p.user_id_group_pairs.is_empty()
    });
}

/// Replace the description on the stored grant matching `single`.
fn rewrite_description(list: &mut [WirePermission], single: &WirePermission) -> bool {
    for stored in list.iter_mut() {
        if !same_header(stored, single) {
            continue;
        }
        if let Some(range) = single.ip_ranges.first() {
            if let Some(existing) = stored
                .ip_ranges
                .iter_mut()
                .find(|r| r.cidr_ip == range.cidr_ip)
            {
                existing.description = range.description.clone();
                return true;
            }
        } else if let Some(range) = single.ipv6_ranges.first() {
            if let Some(existing) = stored
                .ipv6_ranges
                .iter_mut()
                .find(|r| r.cidr_ipv6 == range.cidr_ipv6)
            {
                existing.description = range.description.clone();
                return true;
            }
        } else if let Some(pair) = single.user_id_group_pairs.first() {
            if let Some(existing) = stored
                .user_id_group_pairs
                .iter_mut()
                .find(|p| p.group_id == pair.group_id)
            {
                existing.description = pair.description.clone();
                return true;
            }
        }
    }
    false
}

// ============================================================================
// Wire Permission Helpers
// ============================================================================

/// The default allow-all egress rule VPC groups carry
pub fn default_egress() -> WirePermission {
    WirePermission {
        ip_protocol: "-1".to_string(),
        ip_ranges: vec![IpRange {
            cidr_ip: "0.0.0.0/0".to_string(),
            description: None,
        }],
        ..Default::default()
    }
}

/// A single IPv4 CIDR grant
pub fn cidr_perm(
    proto: &str,
    from: i64,
    to: i64,
    cidr: &str,
    description: Option<&str>,
) -> WirePermission {
    WirePermission {
        ip_protocol: proto.to_string(),
        from_port: Some(from),
        to_port: Some(to),
        ip_ranges: vec![IpRange {
            cidr_ip: cidr.to_string(),
            description: description.map(String::from),
        }],
        ..Default::default()
    }
}

/// A single IPv6 CIDR grant
pub fn ipv6_perm(
    proto: &str,
    from: i64,
    to: i64,
    cidr: &str,
    description: Option<&str>,
) -> WirePermission {
    WirePermission {
        ip_protocol: proto.to_string(),
        from_port: Some(from),
        to_port: Some(to),
        ipv6_ranges: vec![Ipv6Range {
            cidr_ipv6: cidr.to_string(),
            description: description.map(String::from),
        }],
        ..Default::default()
    }
}

/// A single peer security group grant
pub fn group_perm(
    proto: &str,
    from: i64,
    to: i64,
    group_id: &str,
    user_id: Option<&str>,
    description: Option<&str>,
) -> WirePermission {
    WirePermission {
        ip_protocol: proto.to_string(),
        from_port: Some(from),
        to_port: Some(to),
        user_id_group_pairs: vec![UserIdGroupPair {
            group_id: group_id.to_string(),
            user_id: user_id.map(String::from),
            description: description.map(String::from),
        }],
        ..Default::default()
    }
}

// ============================================================================
// Group Record Builder
// ============================================================================

/// Start building a group record.
pub fn group(id: impl Into<String>, name: impl Into<String>) -> GroupBuilder {
    GroupBuilder::new(id, name)
}

/// Fluent builder for seeded group records
pub struct GroupBuilder {
    record: GroupRecord,
}

impl GroupBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            record: GroupRecord {
                id: id.into(),
                description: format!("{} group", name),
                name,
                vpc_id: None,
                owner_id: Some(TEST_OWNER.to_string()),
                ingress: Vec::new(),
                egress: Vec::new(),
                tags: HashMap::new(),
            },
        }
    }

    pub fn vpc(mut self, vpc_id: impl Into<String>) -> Self {
        self.record.vpc_id = Some(vpc_id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = description.into();
        self
    }

    pub fn owner(mut self, owner_id: impl Into<String>) -> Self {
        self.record.owner_id = Some(owner_id.into());
        self
    }

    pub fn ingress(mut self, permission: WirePermission) -> Self {
        self.record.ingress.push(permission);
        self
    }

    pub fn egress(mut self, permission: WirePermission) -> Self {
        self.record.egress.push(permission);
        self
    }

    /// Attach the allow-all egress rule VPC groups are born with.
    pub fn default_egress(self) -> Self {
        let egress = default_egress();
        self.egress(egress)
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.tags.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> GroupRecord {
        self.record
    }
}

// ============================================================================
// Reconcile Request Builder
// ============================================================================

/// Start building a request with `state: present`.
pub fn present(name: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new(name, GroupState::Present)
}

/// Start building a request with `state: absent`.
pub fn absent(name: impl Into<String>) -> RequestBuilder {
    RequestBuilder::new(name, GroupState::Absent)
}

/// Fluent builder for reconcile requests
pub struct RequestBuilder {
    request: ReconcileRequest,
}

impl RequestBuilder {
    pub fn new(name: impl Into<String>, state: GroupState) -> Self {
        Self {
            request: ReconcileRequest {
                name: name.into(),
                description: None,
                vpc_id: None,
                state,
                rules: None,
                rules_egress: None,
                purge_rules: true,
                purge_rules_egress: true,
                tags: None,
                purge_tags: true,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.request.description = Some(description.into());
        self
    }

    pub fn vpc(mut self, vpc_id: impl Into<String>) -> Self {
        self.request.vpc_id = Some(vpc_id.into());
        self
    }

    /// Declare ingress rules from their YAML/JSON shape.
    pub fn rules(mut self, rules: serde_json::Value) -> Self {
        self.request.rules = Some(parse_rules(rules));
        self
    }

    /// Declare egress rules from their YAML/JSON shape.
    pub fn rules_egress(mut self, rules: serde_json::Value) -> Self {
        self.request.rules_egress = Some(parse_rules(rules));
        self
    }

    pub fn no_purge_rules(mut self) -> Self {
        self.request.purge_rules = false;
        self
    }

    pub fn no_purge_rules_egress(mut self) -> Self {
        self.request.purge_rules_egress = false;
        self
    }

    pub fn no_purge_tags(mut self) -> Self {
        self.request.purge_tags = false;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request
            .tags
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Declare an empty tag set (purges everything when purge_tags is on).
    pub fn empty_tags(mut self) -> Self {
        self.request.tags = Some(HashMap::new());
        self
    }

    pub fn build(self) -> ReconcileRequest {
        self.request
    }
}

fn parse_rules(rules: serde_json::Value) -> Vec<RuleSpec> {
    serde_json::from_value(rules).expect("rule specs must deserialize")
}

/// Module parameters from their JSON shape.
pub fn module_params(value: serde_json::Value) -> ModuleParams {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => panic!("module params must be a mapping, got {}", other),
    }
}

/// Poll settings that keep creation tests fast.
pub fn fast_poll() -> PollSettings {
    PollSettings {
        attempts: 5,
        interval: Duration::from_millis(1),
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

pub fn assert_changed(outcome: &ReconcileOutcome) {
    assert!(
        outcome.changed,
        "expected the pass to report changed, got unchanged"
    );
}

pub fn assert_unchanged(outcome: &ReconcileOutcome) {
    assert!(
        !outcome.changed,
        "expected the pass to report unchanged, got changed"
    );
}

pub fn assert_no_mutations(api: &FakeEc2) {
    let mutations = api.mutations();
    assert!(
        mutations.is_empty(),
        "expected no mutating calls, got {:?}",
        mutations
    );
}

pub fn assert_module_changed(output: &ModuleOutput) {
    assert!(output.changed, "expected changed output: {}", output.msg);
    assert_eq!(output.status, ModuleStatus::Changed);
}

pub fn assert_module_ok(output: &ModuleOutput) {
    assert!(!output.changed, "expected ok output: {}", output.msg);
    assert_eq!(output.status, ModuleStatus::Ok);
}

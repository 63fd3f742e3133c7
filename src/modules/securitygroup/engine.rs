//! Declarative reconciliation of one security group.
//!
//! The engine drives a single converge pass: describe the remote state,
//! expand and resolve the declared rules, diff both sides by canonical
//! rule key, apply revokes before grants, then re-describe so the report
//! reflects what the remote side actually holds. `changed` only ever
//! accumulates; once any step mutates (or would mutate, in check mode)
//! the pass reports changed.

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::client::{GroupRecord, SecurityGroupApi};
use super::expand::expand_rules;
use super::key::{derive_key_for, Direction, RuleKey, RuleView};
use super::resolver::{GroupCatalog, GroupMeta, ResolvedTarget, TargetResolver};
use super::serializer::{to_wire, ReportPermission, WirePermission};
use super::spec::{GroupState, OneOrMany, RuleSpec};
use crate::modules::{ModuleError, ModuleResult};

/// How long to wait for a freshly created group to become describable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

/// Everything one converge pass needs to know
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub name: String,
    pub description: Option<String>,
    pub vpc_id: Option<String>,
    pub state: GroupState,
    pub rules: Option<Vec<RuleSpec>>,
    pub rules_egress: Option<Vec<RuleSpec>>,
    pub purge_rules: bool,
    pub purge_rules_egress: bool,
    pub tags: Option<HashMap<String, String>>,
    pub purge_tags: bool,
}

/// The managed group's state as reported back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    /// Unset only for a creation simulated in check mode
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    pub tags: HashMap<String, String>,
    pub ip_permissions: Vec<ReportPermission>,
    pub ip_permissions_egress: Vec<ReportPermission>,
}

impl GroupReport {
    fn from_record(record: &GroupRecord) -> Self {
        GroupReport {
            group_id: Some(record.id.clone()),
            owner_id: record.owner_id.clone(),
            group_name: record.name.clone(),
            description: Some(record.description.clone()),
            vpc_id: record.vpc_id.clone(),
            tags: record.tags.clone(),
            ip_permissions: record.ingress.iter().map(ReportPermission::from).collect(),
            ip_permissions_egress: record.egress.iter().map(ReportPermission::from).collect(),
        }
    }
}

/// Result of one converge pass
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub changed: bool,
    /// Final state; `None` when the group is absent
    pub report: Option<GroupReport>,
    /// State before the pass, for diff rendering
    pub before: Option<GroupReport>,
    pub warnings: Vec<String>,
}

/// Drives describe → diff → apply → re-describe for one group.
pub struct ReconciliationEngine<'a> {
    api: &'a dyn SecurityGroupApi,
    check_mode: bool,
    poll: PollSettings,
    changed: bool,
    warnings: Vec<String>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(api: &'a dyn SecurityGroupApi, check_mode: bool) -> Self {
        ReconciliationEngine {
            api,
            check_mode,
            poll: PollSettings::default(),
            changed: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Run one converge pass.
    pub async fn run(mut self, request: &ReconcileRequest) -> ModuleResult<ReconcileOutcome> {
        ensure_descriptions_supported(self.api, request)?;

        let records = self.api.describe_all_groups(None, None).await?;
        debug!(
            "described {} security groups looking for '{}'",
            records.len(),
            request.name
        );
        let existing = records
            .iter()
            .find(|r| r.name == request.name && vpc_matches(request.vpc_id.as_deref(), r.vpc_id.as_deref()))
            .cloned();
        let before = existing.as_ref().map(GroupReport::from_record);

        match request.state {
            GroupState::Absent => {
                let report = self.remove(existing).await?;
                Ok(self.outcome(report, before))
            }
            GroupState::Present => {
                if existing.is_none() && self.check_mode {
                    // Nothing to converge against yet; report the shape the
                    // group would take.
                    let report = self.simulate_creation(request)?;
                    return Ok(self.outcome(Some(report), before));
                }

                let group = match existing {
                    Some(group) => {
                        ensure_description_unchanged(&group, request)?;
                        group
                    }
                    None => self.create(request).await?,
                };

                let mut catalog = GroupCatalog::from_records(&records);
                catalog.insert(GroupMeta {
                    id: group.id.clone(),
                    name: group.name.clone(),
                    vpc_id: group.vpc_id.clone(),
                    owner_id: group.owner_id.clone(),
                });

                self.converge_tags(&group, request).await?;
                self.converge_rules(&group, request, &mut catalog).await?;

                let report = if self.check_mode {
                    // Mutations were skipped; the pre-pass state is still
                    // the truthful one to report.
                    Some(GroupReport::from_record(&group))
                } else {
                    Some(self.describe_final(request).await?)
                };
                Ok(self.outcome(report, before))
            }
        }
    }

    fn outcome(self, report: Option<GroupReport>, before: Option<GroupReport>) -> ReconcileOutcome {
        ReconcileOutcome {
            changed: self.changed,
            report,
            before,
            warnings: self.warnings,
        }
    }

    async fn remove(&mut self, existing: Option<GroupRecord>) -> ModuleResult<Option<GroupReport>> {
        if let Some(group) = existing {
            self.changed = true;
            if !self.check_mode {
                self.api
                    .delete_group(&group.id)
                    .await
                    .map_err(|e| remote_failure("delete group", &group.id, e))?;
            }
        }
        Ok(None)
    }

    fn simulate_creation(&mut self, request: &ReconcileRequest) -> ModuleResult<GroupReport> {
        require_description(request)?;
        // Still surface malformed rules, even though there is nothing to
        // converge them against yet.
        if let Some(rules) = &request.rules {
            expand_rules(rules)?;
        }
        if let Some(rules) = &request.rules_egress {
            expand_rules(rules)?;
        }
        self.changed = true;
        Ok(GroupReport {
            group_id: None,
            owner_id: None,
            group_name: request.name.clone(),
            description: request.description.clone(),
            vpc_id: request.vpc_id.clone(),
            tags: request.tags.clone().unwrap_or_default(),
            ip_permissions: Vec::new(),
            ip_permissions_egress: Vec::new(),
        })
    }

    async fn create(&mut self, request: &ReconcileRequest) -> ModuleResult<GroupRecord> {
        require_description(request)?;
        let description = request.description.as_deref().unwrap_or_default();
        self.api
            .create_group(&request.name, description, request.vpc_id.as_deref())
            .await
            .map_err(|e| remote_failure("create group", &request.name, e))?;
        self.changed = true;
        self.wait_until_visible(request).await
    }

    /// Newly created groups are not immediately describable; VPC groups
    /// additionally take a moment to grow their default egress rule.
    async fn wait_until_visible(&self, request: &ReconcileRequest) -> ModuleResult<GroupRecord> {
        for attempt in 0..self.poll.attempts {
            let records = self
                .api
                .describe_all_groups(None, Some(&request.name))
                .await?;
            let found = records.into_iter().find(|r| {
                r.name == request.name
                    && vpc_matches(request.vpc_id.as_deref(), r.vpc_id.as_deref())
            });
            if let Some(record) = found {
                if !record.is_vpc() || !record.egress.is_empty() {
                    debug!(
                        "group '{}' visible after {} poll(s)",
                        request.name,
                        attempt + 1
                    );
                    return Ok(record);
                }
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        Err(ModuleError::ConvergenceTimeout(format!(
            "security group '{}' was created but did not become describable",
            request.name
        )))
    }

    async fn converge_tags(
        &mut self,
        group: &GroupRecord,
        request: &ReconcileRequest,
    ) -> ModuleResult<()> {
        let desired = match &request.tags {
            Some(tags) => tags,
            None => return Ok(()),
        };

        let mut to_add: HashMap<String, String> = HashMap::new();
        for (key, value) in desired {
            if group.tags.get(key) != Some(value) {
                to_add.insert(key.clone(), value.clone());
            }
        }
        let to_remove: Vec<String> = if request.purge_tags {
            group
                .tags
                .keys()
                .filter(|k| !desired.contains_key(*k))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(());
        }
        self.changed = true;
        if !self.check_mode {
            self.api
                .set_tags(&group.id, &to_add, &to_remove)
                .await
                .map_err(|e| remote_failure("update tags", &group.id, e))?;
        }
        Ok(())
    }

    async fn converge_rules(
        &mut self,
        group: &GroupRecord,
        request: &ReconcileRequest,
        catalog: &mut GroupCatalog,
    ) -> ModuleResult<()> {
        let self_meta = GroupMeta {
            id: group.id.clone(),
            name: group.name.clone(),
            vpc_id: group.vpc_id.clone(),
            owner_id: group.owner_id.clone(),
        };

        let ingress_specs = request.rules.clone().unwrap_or_default();
        self.converge_direction(
            Direction::Ingress,
            group,
            &ingress_specs,
            request.purge_rules,
            catalog,
            self_meta.clone(),
        )
        .await?;

        let (egress_specs, purge_egress) = match &request.rules_egress {
            Some(specs) => (specs.clone(), request.purge_rules_egress),
            // Without declared egress a VPC group keeps (or regains) its
            // default allow-all rule; classic groups have no egress side
            // to manage.
            None if group.is_vpc() => (vec![default_egress_spec()], false),
            None => return Ok(()),
        };
        self.converge_direction(
            Direction::Egress,
            group,
            &egress_specs,
            purge_egress,
            catalog,
            self_meta,
        )
        .await
    }

    async fn converge_direction(
        &mut self,
        direction: Direction,
        group: &GroupRecord,
        specs: &[RuleSpec],
        purge: bool,
        catalog: &mut GroupCatalog,
        self_meta: GroupMeta,
    ) -> ModuleResult<()> {
        let remote_permissions = match direction {
            Direction::Ingress => &group.ingress,
            Direction::Egress => &group.egress,
        };
        let mut remote: IndexMap<RuleKey, WirePermission> = IndexMap::new();
        for permission in remote_permissions {
            for single in flatten_remote(permission) {
                let key = key_for_remote(direction, &single);
                remote.insert(key, single);
            }
        }

        let expanded = expand_rules(specs)?;
        let mut resolver = TargetResolver::new(self.api, catalog, self_meta, self.check_mode);
        let mut desired: IndexMap<RuleKey, WirePermission> = IndexMap::new();
        for rule in &expanded {
            let resolution = resolver.resolve(rule).await?;
            if resolution.created {
                self.changed = true;
            }
            if let Some(warning) = resolution.warning {
                if !self.warnings.contains(&warning) {
                    self.warnings.push(warning);
                }
            }
            let (group_id, cidr) = match &resolution.target {
                ResolvedTarget::Group(id) => (Some(id.as_str()), None),
                ResolvedTarget::Ipv4(cidr) | ResolvedTarget::Ipv6(cidr) => {
                    (None, Some(cidr.as_str()))
                }
            };
            let key = derive_key_for(RuleView::Desired(rule), direction, group_id, cidr);
            let wire = to_wire(rule, &resolution.target, resolution.owner_id.as_deref());
            // Duplicate keys collapse; the last declaration wins.
            desired.insert(key, wire);
        }

        let to_revoke: Vec<&WirePermission> = if purge {
            remote
                .iter()
                .filter(|(key, _)| !desired.contains_key(*key))
                .map(|(_, permission)| permission)
                .collect()
        } else {
            Vec::new()
        };
        let to_grant: Vec<&WirePermission> = desired
            .iter()
            .filter(|(key, _)| !remote.contains_key(*key))
            .map(|(_, permission)| permission)
            .collect();
        let to_redescribe: Vec<&WirePermission> = desired
            .iter()
            .filter(|(key, permission)| {
                remote.get(*key).is_some_and(|current| {
                    let wanted = grant_description(permission);
                    wanted.is_some() && wanted != grant_description(current)
                })
            })
            .map(|(_, permission)| permission)
            .collect();

        debug!(
            "{}: {} to revoke, {} to grant, {} descriptions to rewrite",
            direction,
            to_revoke.len(),
            to_grant.len(),
            to_redescribe.len()
        );

        for permission in to_revoke {
            self.changed = true;
            if !self.check_mode {
                self.api
                    .revoke(direction, &group.id, std::slice::from_ref(permission))
                    .await
                    .map_err(|e| rule_failure("revoke", direction, permission, e))?;
            }
        }
        for permission in to_grant {
            self.changed = true;
            if !self.check_mode {
                self.api
                    .authorize(direction, &group.id, std::slice::from_ref(permission))
                    .await
                    .map_err(|e| rule_failure("authorize", direction, permission, e))?;
            }
        }
        for permission in to_redescribe {
            self.changed = true;
            if !self.check_mode {
                self.api
                    .update_rule_description(direction, &group.id, permission)
                    .await
                    .map_err(|e| {
                        rule_failure("update rule description", direction, permission, e)
                    })?;
            }
        }
        Ok(())
    }

    async fn describe_final(&self, request: &ReconcileRequest) -> ModuleResult<GroupReport> {
        let records = self
            .api
            .describe_all_groups(None, Some(&request.name))
            .await?;
        let record = records
            .into_iter()
            .find(|r| {
                r.name == request.name
                    && vpc_matches(request.vpc_id.as_deref(), r.vpc_id.as_deref())
            })
            .ok_or_else(|| {
                ModuleError::ExecutionFailed(format!(
                    "security group '{}' vanished during reconciliation",
                    request.name
                ))
            })?;
        Ok(GroupReport::from_record(&record))
    }
}

/// The default egress rule VPC groups are born with
fn default_egress_spec() -> RuleSpec {
    RuleSpec {
        proto: Some("-1".to_string()),
        ports: None,
        from_port: None,
        to_port: None,
        cidr_ip: Some(OneOrMany::One("0.0.0.0/0".to_string())),
        cidr_ipv6: None,
        group_id: None,
        group_name: None,
        group_desc: None,
        rule_desc: None,
    }
}

fn vpc_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        Some(vpc) => actual == Some(vpc),
        None => true,
    }
}

fn require_description(request: &ReconcileRequest) -> ModuleResult<()> {
    match request.description.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => Ok(()),
        _ => Err(ModuleError::InvalidParameter(format!(
            "description is required to create security group '{}'",
            request.name
        ))),
    }
}

/// The remote side cannot change a group description after creation
fn ensure_description_unchanged(
    group: &GroupRecord,
    request: &ReconcileRequest,
) -> ModuleResult<()> {
    match request.description.as_deref() {
        Some(wanted) if wanted != group.description => Err(ModuleError::InvalidParameter(format!(
            "description of existing group '{}' cannot be changed (current: '{}', requested: '{}')",
            group.name, group.description, wanted
        ))),
        _ => Ok(()),
    }
}

fn ensure_descriptions_supported(
    api: &dyn SecurityGroupApi,
    request: &ReconcileRequest,
) -> ModuleResult<()> {
    if api.supports_rule_descriptions() {
        return Ok(());
    }
    let uses_descriptions = request
        .rules
        .iter()
        .chain(request.rules_egress.iter())
        .flatten()
        .any(|rule| rule.rule_desc.is_some());
    if uses_descriptions {
        return Err(ModuleError::InvalidParameter(
            "rule_desc is not supported by the connected endpoint".to_string(),
        ));
    }
    Ok(())
}

/// Split a remote permission into one-grant fragments so each grant diffs
/// independently.
fn flatten_remote(permission: &WirePermission) -> Vec<WirePermission> {
    let header = WirePermission {
        ip_protocol: permission.ip_protocol.clone(),
        from_port: permission.from_port,
        to_port: permission.to_port,
        ..Default::default()
    };

    let mut singles = Vec::new();
    for range in &permission.ip_ranges {
        let mut single = header.clone();
        single.ip_ranges.push(range.clone());
        singles.push(single);
    }
    for range in &permission.ipv6_ranges {
        let mut single = header.clone();
        single.ipv6_ranges.push(range.clone());
        singles.push(single);
    }
    for pair in &permission.user_id_group_pairs {
        let mut single = header.clone();
        single.user_id_group_pairs.push(pair.clone());
        singles.push(single);
    }
    singles
}

fn key_for_remote(direction: Direction, single: &WirePermission) -> RuleKey {
    let group_id = single
        .user_id_group_pairs
        .first()
        .map(|pair| pair.group_id.as_str());
    let cidr = single
        .ip_ranges
        .first()
        .map(|range| range.cidr_ip.as_str())
        .or_else(|| {
            single
                .ipv6_ranges
                .first()
                .map(|range| range.cidr_ipv6.as_str())
        });
    derive_key_for(RuleView::Remote(single), direction, group_id, cidr)
}

/// Description carried by a single-grant permission, whichever list holds it
fn grant_description(single: &WirePermission) -> Option<&str> {
    single
        .ip_ranges
        .first()
        .and_then(|range| range.description.as_deref())
        .or_else(|| {
            single
                .ipv6_ranges
                .first()
                .and_then(|range| range.description.as_deref())
        })
        .or_else(|| {
            single
                .user_id_group_pairs
                .first()
                .and_then(|pair| pair.description.as_deref())
        })
}

fn remote_failure(operation: &str, subject: &str, err: ModuleError) -> ModuleError {
    ModuleError::RemoteOperation {
        operation: operation.to_string(),
        context: subject.to_string(),
        message: err.to_string(),
    }
}

fn rule_failure(
    operation: &str,
    direction: Direction,
    permission: &WirePermission,
    err: ModuleError,
) -> ModuleError {
    let payload = serde_json::to_string(permission).unwrap_or_else(|_| format!("{:?}", permission));
    ModuleError::RemoteOperation {
        operation: operation.to_string(),
        context: format!("{} {}", direction, payload),
        message: err.to_string(),
    }
}

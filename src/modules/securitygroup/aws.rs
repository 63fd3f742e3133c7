//! EC2-backed implementation of [`SecurityGroupApi`].
//!
//! Thin translation layer: every trait call maps to one EC2 API family
//! (describe, authorize/revoke, rule description updates, tagging), with
//! the crate's wire types converted to and from the SDK's own permission
//! shapes at the boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::types::{self, Filter, IpPermission, SecurityGroup, Tag};
use aws_sdk_ec2::Client;

use super::client::{GroupRecord, SecurityGroupApi};
use super::key::Direction;
use super::serializer::{IpRange, Ipv6Range, UserIdGroupPair, WirePermission};
use crate::modules::{ModuleError, ModuleResult};

/// Security group operations against a live EC2 endpoint
#[derive(Debug, Clone)]
pub struct AwsSecurityGroupClient {
    client: Client,
}

impl AwsSecurityGroupClient {
    /// Connect using the ambient credential chain, optionally pinned to a
    /// region and/or shared-config profile.
    pub async fn connect(region: Option<&str>, profile: Option<&str>) -> ModuleResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_ec2::config::Region::new(region.to_string()));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        Ok(AwsSecurityGroupClient {
            client: Client::new(&config),
        })
    }
}

#[async_trait]
impl SecurityGroupApi for AwsSecurityGroupClient {
    async fn describe_all_groups(
        &self,
        vpc_filter: Option<&str>,
        name_filter: Option<&str>,
    ) -> ModuleResult<Vec<GroupRecord>> {
        let mut request = self.client.describe_security_groups();
        if let Some(vpc_id) = vpc_filter {
            request = request.filters(Filter::builder().name("vpc-id").values(vpc_id).build());
        }
        if let Some(name) = name_filter {
            request = request.filters(Filter::builder().name("group-name").values(name).build());
        }

        let mut records = Vec::new();
        let mut pages = request.into_paginator().send();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                ModuleError::ExecutionFailed(format!("Failed to describe security groups: {}", e))
            })?;
            for group in page.security_groups() {
                records.push(record_from_sdk(group));
            }
        }
        Ok(records)
    }

    async fn create_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> ModuleResult<GroupRecord> {
        let mut request = self
            .client
            .create_security_group()
            .group_name(name)
            .description(description);
        if let Some(vpc_id) = vpc_id {
            request = request.vpc_id(vpc_id);
        }

        let resp = request.send().await.map_err(|e| {
            ModuleError::ExecutionFailed(format!("Failed to create security group: {}", e))
        })?;
        let group_id = resp.group_id().unwrap_or_default().to_string();
        tracing::info!(
            "Created security group '{}' ({}) in VPC {:?}",
            name,
            group_id,
            vpc_id
        );

        Ok(GroupRecord {
            id: group_id,
            name: name.to_string(),
            description: description.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            ..Default::default()
        })
    }

    async fn delete_group(&self, group_id: &str) -> ModuleResult<()> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| {
                ModuleError::ExecutionFailed(format!("Failed to delete security group: {}", e))
            })?;
        tracing::info!("Deleted security group: {}", group_id);
        Ok(())
    }

    async fn authorize(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()> {
        let ip_permissions: Vec<IpPermission> =
            permissions.iter().map(permission_to_sdk).collect();
        match direction {
            Direction::Ingress => {
                self.client
                    .authorize_security_group_ingress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(ip_permissions))
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to authorize ingress rules: {}",
                            e
                        ))
                    })?;
            }
            Direction::Egress => {
                self.client
                    .authorize_security_group_egress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(ip_permissions))
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to authorize egress rules: {}",
                            e
                        ))
                    })?;
            }
        }
        Ok(())
    }

    async fn revoke(
        &self,
        direction: Direction,
        group_id: &str,
        permissions: &[WirePermission],
    ) -> ModuleResult<()> {
        let ip_permissions: Vec<IpPermission> =
            permissions.iter().map(permission_to_sdk).collect();
        match direction {
            Direction::Ingress => {
                self.client
                    .revoke_security_group_ingress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(ip_permissions))
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to revoke ingress rules: {}",
                            e
                        ))
                    })?;
            }
            Direction::Egress => {
                self.client
                    .revoke_security_group_egress()
                    .group_id(group_id)
                    .set_ip_permissions(Some(ip_permissions))
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to revoke egress rules: {}",
                            e
                        ))
                    })?;
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
        let ip_permission = permission_to_sdk(permission);
        match direction {
            Direction::Ingress => {
                self.client
                    .update_security_group_rule_descriptions_ingress()
                    .group_id(group_id)
                    .ip_permissions(ip_permission)
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to update ingress rule description: {}",
                            e
                        ))
                    })?;
            }
            Direction::Egress => {
                self.client
                    .update_security_group_rule_descriptions_egress()
                    .group_id(group_id)
                    .ip_permissions(ip_permission)
                    .send()
                    .await
                    .map_err(|e| {
                        ModuleError::ExecutionFailed(format!(
                            "Failed to update egress rule description: {}",
                            e
                        ))
                    })?;
            }
        }
        Ok(())
    }

    async fn set_tags(
        &self,
        group_id: &str,
        to_add: &HashMap<String, String>,
        to_remove: &[String],
    ) -> ModuleResult<()> {
        if !to_add.is_empty() {
            let tags: Vec<Tag> = to_add
                .iter()
                .map(|(key, value)| Tag::builder().key(key).value(value).build())
                .collect();
            self.client
                .create_tags()
                .resources(group_id)
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| {
                    ModuleError::ExecutionFailed(format!("Failed to create tags: {}", e))
                })?;
        }
        if !to_remove.is_empty() {
            let tags: Vec<Tag> = to_remove
                .iter()
                .map(|key| Tag::builder().key(key).build())
                .collect();
            self.client
                .delete_tags()
                .resources(group_id)
                .set_tags(Some(tags))
                .send()
                .await
                .map_err(|e| {
                    ModuleError::ExecutionFailed(format!("Failed to delete tags: {}", e))
                })?;
        }
        Ok(())
    }
}

fn record_from_sdk(group: &SecurityGroup) -> GroupRecord {
    let mut tags = HashMap::new();
    for tag in group.tags() {
        if let (Some(key), Some(value)) = (tag.key(), tag.value()) {
            tags.insert(key.to_string(), value.to_string());
        }
    }

    GroupRecord {
        id: group.group_id().unwrap_or_default().to_string(),
        name: group.group_name().unwrap_or_default().to_string(),
        description: group.description().unwrap_or_default().to_string(),
        vpc_id: group.vpc_id().map(str::to_string),
        owner_id: group.owner_id().map(str::to_string),
        ingress: group
            .ip_permissions()
            .iter()
            .map(permission_from_sdk)
            .collect(),
        egress: group
            .ip_permissions_egress()
            .iter()
            .map(permission_from_sdk)
            .collect(),
        tags,
    }
}

fn permission_from_sdk(permission: &IpPermission) -> WirePermission {
    WirePermission {
        ip_protocol: permission.ip_protocol().unwrap_or_default().to_string(),
        from_port: permission.from_port().map(i64::from),
        to_port: permission.to_port().map(i64::from),
        ip_ranges: permission
            .ip_ranges()
            .iter()
            .map(|range| IpRange {
                cidr_ip: range.cidr_ip().unwrap_or_default().to_string(),
                description: range.description().map(str::to_string),
            })
            .collect(),
        ipv6_ranges: permission
            .ipv6_ranges()
            .iter()
            .map(|range| Ipv6Range {
                cidr_ipv6: range.cidr_ipv6().unwrap_or_default().to_string(),
                description: range.description().map(str::to_string),
            })
            .collect(),
        user_id_group_pairs: permission
            .user_id_group_pairs()
            .iter()
            .map(|pair| UserIdGroupPair {
                group_id: pair.group_id().unwrap_or_default().to_string(),
                user_id: pair.user_id().map(str::to_string),
                description: pair.description().map(str::to_string),
            })
            .collect(),
    }
}

fn permission_to_sdk(permission: &WirePermission) -> IpPermission {
    let mut builder = IpPermission::builder().ip_protocol(&permission.ip_protocol);
    if let Some(port) = permission.from_port {
        builder = builder.from_port(port as i32);
    }
    if let Some(port) = permission.to_port {
        builder = builder.to_port(port as i32);
    }

    for range in &permission.ip_ranges {
        let mut ip_range = types::IpRange::builder().cidr_ip(&range.cidr_ip);
        if let Some(ref description) = range.description {
            ip_range = ip_range.description(description);
        }
        builder = builder.ip_ranges(ip_range.build());
    }
    for range in &permission.ipv6_ranges {
        let mut ipv6_range = types::Ipv6Range::builder().cidr_ipv6(&range.cidr_ipv6);
        if let Some(ref description) = range.description {
            ipv6_range = ipv6_range.description(description);
        }
        builder = builder.ipv6_ranges(ipv6_range.build());
    }
    for pair in &permission.user_id_group_pairs {
        let mut group_pair = types::UserIdGroupPair::builder().group_id(&pair.group_id);
        if let Some(ref user_id) = pair.user_id {
            group_pair = group_pair.user_id(user_id);
        }
        if let Some(ref description) = pair.description {
            group_pair = group_pair.description(description);
        }
        builder = builder.user_id_group_pairs(group_pair.build());
    }

    builder.build()
}

//! Target resolution for rule sources.
//!
//! Every expanded rule names exactly one traffic peer: an IPv4 CIDR, an
//! IPv6 CIDR, or a security group. Groups may arrive as a bare id, as an
//! `owner/sg-id/name` triple for a group in another account, or as a name
//! that has to be looked up (and possibly created) in the managed group's
//! own account.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::client::{GroupRecord, SecurityGroupApi};
use super::serializer::{validate_ipv4_cidr, validate_ipv6_cidr};
use super::spec::{ExpandedRuleSpec, RuleSource};
use crate::modules::{ModuleError, ModuleResult};

/// Matches `owner/sg-id/name` references to groups in foreign accounts.
/// Deliberately unanchored at the end: the name swallows the rest.
static FOREIGN_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)/(sg-\S+)/(\S+)").expect("Invalid foreign group regex"));

/// A parsed `group_id` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupReference {
    /// A group id used as-is
    Id(String),
    /// A group in another account, addressed as `owner/sg-id/name`
    Foreign {
        owner_id: String,
        group_id: String,
        group_name: String,
    },
}

impl GroupReference {
    pub fn parse(text: &str) -> GroupReference {
        if let Some(caps) = FOREIGN_GROUP_RE.captures(text) {
            return GroupReference::Foreign {
                owner_id: caps[1].to_string(),
                group_id: caps[2].to_string(),
                group_name: caps[3].to_string(),
            };
        }
        GroupReference::Id(text.to_string())
    }
}

/// What a rule's source resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// A peer security group id
    Group(String),
    /// An IPv4 CIDR block
    Ipv4(String),
    /// An IPv6 CIDR block
    Ipv6(String),
}

/// The identifying facts of a known group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMeta {
    pub id: String,
    pub name: String,
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
}

/// All groups the resolver knows about, addressable by id or by name.
///
/// Names are not unique across VPCs; a later group with the same name
/// shadows an earlier one, so name lookups are always followed by a VPC
/// check.
#[derive(Debug, Default)]
pub struct GroupCatalog {
    entries: HashMap<String, GroupMeta>,
}

impl GroupCatalog {
    pub fn from_records(records: &[GroupRecord]) -> Self {
        let mut catalog = GroupCatalog::default();
        for record in records {
            catalog.insert(GroupMeta {
                id: record.id.clone(),
                name: record.name.clone(),
                vpc_id: record.vpc_id.clone(),
                owner_id: record.owner_id.clone(),
            });
        }
        catalog
    }

    /// Register a group under both its id and its name
    pub fn insert(&mut self, meta: GroupMeta) {
        self.entries.insert(meta.id.clone(), meta.clone());
        self.entries.insert(meta.name.clone(), meta);
    }

    pub fn lookup(&self, key: &str) -> Option<&GroupMeta> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// The outcome of resolving one rule's source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: ResolvedTarget,
    /// True when resolution had to create (or, in check mode, pretend to
    /// create) the referenced group
    pub created: bool,
    /// Owning account of the target group, when it is not our own
    pub owner_id: Option<String>,
    /// Normalization note to surface to the caller, e.g. masked host bits
    pub warning: Option<String>,
}

impl Resolution {
    fn plain(target: ResolvedTarget) -> Self {
        Resolution {
            target,
            created: false,
            owner_id: None,
            warning: None,
        }
    }
}

/// Resolves rule sources against the group catalog, creating referenced
/// groups on demand.
pub struct TargetResolver<'a> {
    api: &'a dyn SecurityGroupApi,
    catalog: &'a mut GroupCatalog,
    self_meta: GroupMeta,
    check_mode: bool,
}

impl<'a> TargetResolver<'a> {
    pub fn new(
        api: &'a dyn SecurityGroupApi,
        catalog: &'a mut GroupCatalog,
        self_meta: GroupMeta,
        check_mode: bool,
    ) -> Self {
        TargetResolver {
            api,
            catalog,
            self_meta,
            check_mode,
        }
    }

    /// Resolve one rule's source into a concrete target.
    pub async fn resolve(&mut self, rule: &ExpandedRuleSpec) -> ModuleResult<Resolution> {
        match &rule.source {
            RuleSource::CidrIpv4(cidr) => {
                let (canonical, warning) = validate_ipv4_cidr(cidr)?;
                Ok(Resolution {
                    warning,
                    ..Resolution::plain(ResolvedTarget::Ipv4(canonical))
                })
            }
            RuleSource::CidrIpv6(cidr) => {
                let (canonical, warning) = validate_ipv6_cidr(cidr)?;
                Ok(Resolution {
                    warning,
                    ..Resolution::plain(ResolvedTarget::Ipv6(canonical))
                })
            }
            RuleSource::GroupId(reference) => self.resolve_group_id(reference),
            RuleSource::GroupName(name) => self.resolve_group_name(name, rule).await,
        }
    }

    fn resolve_group_id(&mut self, reference: &str) -> ModuleResult<Resolution> {
        match GroupReference::parse(reference) {
            GroupReference::Foreign {
                owner_id,
                group_id,
                group_name,
            } => {
                // Remember the foreign group so later rules can refer to
                // it by name.
                self.catalog.insert(GroupMeta {
                    id: group_id.clone(),
                    name: group_name,
                    vpc_id: None,
                    owner_id: Some(owner_id.clone()),
                });
                Ok(Resolution {
                    owner_id: Some(owner_id),
                    ..Resolution::plain(ResolvedTarget::Group(group_id))
                })
            }
            GroupReference::Id(id) => Ok(Resolution::plain(ResolvedTarget::Group(id))),
        }
    }

    async fn resolve_group_name(
        &mut self,
        name: &str,
        rule: &ExpandedRuleSpec,
    ) -> ModuleResult<Resolution> {
        if name == self.self_meta.name {
            return Ok(Resolution::plain(ResolvedTarget::Group(
                self.self_meta.id.clone(),
            )));
        }

        if let Some(meta) = self.catalog.lookup(name) {
            // A name hit in a different VPC is not our group; fall through
            // and create one in ours.
            let vpc_matches = match (&self.self_meta.vpc_id, &meta.vpc_id) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, _) => true,
            };
            if vpc_matches {
                return Ok(Resolution {
                    owner_id: meta.owner_id.clone(),
                    ..Resolution::plain(ResolvedTarget::Group(meta.id.clone()))
                });
            }
        }

        let description = rule
            .group_desc
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                ModuleError::UnresolvedTarget(format!(
                    "group '{}' referenced by a rule does not exist and no group_desc \
                     was provided to create it",
                    name
                ))
            })?;

        let meta = if self.check_mode {
            GroupMeta {
                id: format!("sg-pending-{}", name),
                name: name.to_string(),
                vpc_id: self.self_meta.vpc_id.clone(),
                owner_id: self.self_meta.owner_id.clone(),
            }
        } else {
            let record = self
                .api
                .create_group(name, description, self.self_meta.vpc_id.as_deref())
                .await?;
            GroupMeta {
                id: record.id,
                name: record.name,
                vpc_id: record.vpc_id,
                owner_id: record.owner_id,
            }
        };
        let target = ResolvedTarget::Group(meta.id.clone());
        self.catalog.insert(meta);
        Ok(Resolution {
            created: true,
            ..Resolution::plain(target)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::securitygroup::key::Direction;
    use crate::modules::securitygroup::serializer::WirePermission;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Minimal API stub: records create calls, hands back deterministic ids
    #[derive(Default)]
    struct StubApi {
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SecurityGroupApi for StubApi {
        async fn describe_all_groups(
            &self,
            _vpc_filter: Option<&str>,
            _name_filter: Option<&str>,
        ) -> ModuleResult<Vec<GroupRecord>> {
            Ok(Vec::new())
        }

        async fn create_group(
            &self,
            name: &str,
            _description: &str,
            vpc_id: Option<&str>,
        ) -> ModuleResult<GroupRecord> {
            let mut created = self.created.lock();
            created.push(name.to_string());
            Ok(GroupRecord {
                id: format!("sg-created-{}", created.len()),
                name: name.to_string(),
                description: "created".to_string(),
                vpc_id: vpc_id.map(str::to_string),
                owner_id: Some("111111111111".to_string()),
                ..Default::default()
            })
        }

        async fn delete_group(&self, _group_id: &str) -> ModuleResult<()> {
            Ok(())
        }

        async fn authorize(
            &self,
            _direction: Direction,
            _group_id: &str,
            _permissions: &[WirePermission],
        ) -> ModuleResult<()> {
            Ok(())
        }

        async fn revoke(
            &self,
            _direction: Direction,
            _group_id: &str,
            _permissions: &[WirePermission],
        ) -> ModuleResult<()> {
            Ok(())
        }

        async fn update_rule_description(
            &self,
            _direction: Direction,
            _group_id: &str,
            _permission: &WirePermission,
        ) -> ModuleResult<()> {
            Ok(())
        }

        async fn set_tags(
            &self,
            _group_id: &str,
            _to_add: &std::collections::HashMap<String, String>,
            _to_remove: &[String],
        ) -> ModuleResult<()> {
            Ok(())
        }
    }

    fn self_meta() -> GroupMeta {
        GroupMeta {
            id: "sg-self".to_string(),
            name: "web".to_string(),
            vpc_id: Some("vpc-1".to_string()),
            owner_id: Some("111111111111".to_string()),
        }
    }

    fn group_name_rule(name: &str, desc: Option<&str>) -> ExpandedRuleSpec {
        ExpandedRuleSpec {
            proto: "tcp".to_string(),
            from_port: Some(5432),
            to_port: Some(5432),
            source: RuleSource::GroupName(name.to_string()),
            group_desc: desc.map(str::to_string),
            rule_desc: None,
        }
    }

    #[test]
    fn test_parse_foreign_triple() {
        let parsed = GroupReference::parse("123412341234/sg-0123abcd/shared-db");
        assert_eq!(
            parsed,
            GroupReference::Foreign {
                owner_id: "123412341234".to_string(),
                group_id: "sg-0123abcd".to_string(),
                group_name: "shared-db".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_plain_id() {
        assert_eq!(
            GroupReference::parse("sg-0123abcd"),
            GroupReference::Id("sg-0123abcd".to_string())
        );
    }

    #[test]
    fn test_parse_name_swallows_trailing_slashes() {
        // The pattern is unanchored at the end, so slashes in the name
        // stay part of the name.
        let parsed = GroupReference::parse("1234/sg-abc/a/b");
        assert_eq!(
            parsed,
            GroupReference::Foreign {
                owner_id: "1234".to_string(),
                group_id: "sg-abc".to_string(),
                group_name: "a/b".to_string(),
            }
        );
    }

    #[test]
    fn test_catalog_is_dual_keyed() {
        let records = vec![GroupRecord {
            id: "sg-1".to_string(),
            name: "db".to_string(),
            vpc_id: Some("vpc-1".to_string()),
            ..Default::default()
        }];
        let catalog = GroupCatalog::from_records(&records);
        assert!(catalog.contains("sg-1"));
        assert!(catalog.contains("db"));
        assert_eq!(catalog.lookup("db").unwrap().id, "sg-1");
    }

    #[tokio::test]
    async fn test_cidr_sources_pass_through() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let rule = ExpandedRuleSpec {
            proto: "tcp".to_string(),
            from_port: Some(443),
            to_port: Some(443),
            source: RuleSource::CidrIpv4("10.0.0.0/8".to_string()),
            group_desc: None,
            rule_desc: None,
        };
        let resolution = resolver.resolve(&rule).await.unwrap();
        assert_eq!(
            resolution.target,
            ResolvedTarget::Ipv4("10.0.0.0/8".to_string())
        );
        assert!(!resolution.created);
        assert!(resolution.warning.is_none());
    }

    #[tokio::test]
    async fn test_host_bits_surface_a_warning() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let rule = ExpandedRuleSpec {
            proto: "tcp".to_string(),
            from_port: Some(443),
            to_port: Some(443),
            source: RuleSource::CidrIpv4("10.0.0.5/24".to_string()),
            group_desc: None,
            rule_desc: None,
        };
        let resolution = resolver.resolve(&rule).await.unwrap();
        assert_eq!(
            resolution.target,
            ResolvedTarget::Ipv4("10.0.0.0/24".to_string())
        );
        assert!(resolution.warning.unwrap().contains("host bits"));
    }

    #[tokio::test]
    async fn test_self_reference_by_name() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        catalog.insert(self_meta());
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let resolution = resolver.resolve(&group_name_rule("web", None)).await.unwrap();
        assert_eq!(
            resolution.target,
            ResolvedTarget::Group("sg-self".to_string())
        );
        assert!(!resolution.created);
    }

    #[tokio::test]
    async fn test_known_name_in_same_vpc_resolves() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        catalog.insert(GroupMeta {
            id: "sg-db".to_string(),
            name: "db".to_string(),
            vpc_id: Some("vpc-1".to_string()),
            owner_id: None,
        });
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let resolution = resolver.resolve(&group_name_rule("db", None)).await.unwrap();
        assert_eq!(resolution.target, ResolvedTarget::Group("sg-db".to_string()));
        assert!(api.created.lock().is_empty());
    }

    #[tokio::test]
    async fn test_name_in_other_vpc_creates_local_group() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        catalog.insert(GroupMeta {
            id: "sg-other".to_string(),
            name: "db".to_string(),
            vpc_id: Some("vpc-other".to_string()),
            owner_id: None,
        });
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let resolution = resolver
            .resolve(&group_name_rule("db", Some("db peers")))
            .await
            .unwrap();
        assert_eq!(
            resolution.target,
            ResolvedTarget::Group("sg-created-1".to_string())
        );
        assert!(resolution.created);
        assert_eq!(api.created.lock().as_slice(), ["db".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_name_without_desc_is_rejected() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let err = resolver
            .resolve(&group_name_rule("missing", None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("group_desc"));

        // A blank description is as good as none.
        let err = resolver
            .resolve(&group_name_rule("missing", Some("   ")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("group_desc"));
    }

    #[tokio::test]
    async fn test_check_mode_synthesizes_placeholder() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), true);

        let resolution = resolver
            .resolve(&group_name_rule("queue", Some("queue workers")))
            .await
            .unwrap();
        assert_eq!(
            resolution.target,
            ResolvedTarget::Group("sg-pending-queue".to_string())
        );
        assert!(resolution.created);
        assert!(api.created.lock().is_empty());
        // Placeholder is remembered: a second rule naming the same group
        // resolves without tripping the group_desc requirement.
        let again = resolver.resolve(&group_name_rule("queue", None)).await.unwrap();
        assert_eq!(
            again.target,
            ResolvedTarget::Group("sg-pending-queue".to_string())
        );
        assert!(!again.created);
    }

    #[tokio::test]
    async fn test_foreign_reference_registers_in_catalog() {
        let api = StubApi::default();
        let mut catalog = GroupCatalog::default();
        let mut resolver = TargetResolver::new(&api, &mut catalog, self_meta(), false);

        let rule = ExpandedRuleSpec {
            proto: "tcp".to_string(),
            from_port: Some(443),
            to_port: Some(443),
            source: RuleSource::GroupId("999988887777/sg-far/away-lb".to_string()),
            group_desc: None,
            rule_desc: None,
        };
        let resolution = resolver.resolve(&rule).await.unwrap();
        assert_eq!(resolution.target, ResolvedTarget::Group("sg-far".to_string()));
        assert_eq!(resolution.owner_id.as_deref(), Some("999988887777"));
        assert!(catalog.contains("sg-far"));
        assert!(catalog.contains("away-lb"));
    }
}

//! Security group convergence module.
//!
//! Declaratively manages one EC2 security group: the group itself, its
//! ingress and egress rules, and its tags. Rules are declared in a compact
//! form (port lists, CIDR lists, group names) that is expanded, resolved
//! against the account's existing groups, and diffed against the remote
//! state by canonical rule key; only the difference is applied.
//!
//! ## Parameters
//!
//! | Parameter | Required | Description |
//! |-----------|----------|-------------|
//! | `name` | Yes | Security group name |
//! | `description` | No* | Group description (*required when creating) |
//! | `vpc_id` | No | VPC to place (and look up) the group in |
//! | `state` | No | Desired state: present, absent (default: present) |
//! | `rules` | No | Ingress rules |
//! | `rules_egress` | No | Egress rules |
//! | `purge_rules` | No | Remove undeclared ingress rules (default: true) |
//! | `purge_rules_egress` | No | Remove undeclared egress rules (default: true) |
//! | `tags` | No | Tags as key-value pairs |
//! | `purge_tags` | No | Remove undeclared tags (default: true) |
//! | `region` | No | AWS region (default: from environment/config) |
//! | `profile` | No | AWS shared-config profile |
//!
//! Each rule accepts `proto` (default tcp), a `ports` list (numbers or
//! `"N-M"` ranges) or a `from_port`/`to_port` pair, and exactly one source:
//! `cidr_ip`, `cidr_ipv6`, `group_id`, or `group_name` (each also takes a
//! list). `rule_desc` attaches a description to the rule; `group_desc`
//! supplies the description used if a named peer group has to be created.
//!
//! ### Example
//!
//! ```yaml
//! - name: Converge the web tier group
//!   securitygroup:
//!     name: web
//!     description: web tier
//!     vpc_id: vpc-0123456789abcdef0
//!     rules:
//!       - proto: tcp
//!         ports: [80, 443]
//!         cidr_ip: 0.0.0.0/0
//!         rule_desc: public http(s)
//!       - proto: tcp
//!         ports: 5432
//!         group_name: db
//!         group_desc: database tier
//!     tags:
//!       Environment: production
//! ```

pub mod client;
pub mod engine;
pub mod expand;
pub mod key;
pub mod resolver;
pub mod serializer;
pub mod spec;

#[cfg(feature = "aws")]
pub mod aws;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::modules::{
    Diff, Module, ModuleContext, ModuleError, ModuleOutput, ModuleParams, ModuleResult, ParamExt,
};

pub use client::{GroupRecord, SecurityGroupApi};
pub use engine::{
    GroupReport, PollSettings, ReconcileOutcome, ReconcileRequest, ReconciliationEngine,
};
pub use key::{Direction, RuleKey};
pub use serializer::WirePermission;
pub use spec::{GroupState, RuleSpec};

/// Parsed module parameters
#[derive(Debug, Clone)]
pub struct SecurityGroupConfig {
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
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl SecurityGroupConfig {
    pub fn from_params(params: &ModuleParams) -> ModuleResult<Self> {
        let name = params.get_string_required("name")?;

        let state = if let Some(s) = params.get_string("state")? {
            GroupState::from_str(&s)?
        } else {
            GroupState::Present
        };

        Ok(SecurityGroupConfig {
            name,
            description: params.get_string("description")?,
            vpc_id: params.get_string("vpc_id")?,
            state,
            rules: parse_rules(params, "rules")?,
            rules_egress: parse_rules(params, "rules_egress")?,
            purge_rules: params.get_bool_or("purge_rules", true),
            purge_rules_egress: params.get_bool_or("purge_rules_egress", true),
            tags: params.get_map_string("tags")?,
            purge_tags: params.get_bool_or("purge_tags", true),
            region: params.get_string("region")?,
            profile: params.get_string("profile")?,
        })
    }

    pub fn into_request(self) -> ReconcileRequest {
        ReconcileRequest {
            name: self.name,
            description: self.description,
            vpc_id: self.vpc_id,
            state: self.state,
            rules: self.rules,
            rules_egress: self.rules_egress,
            purge_rules: self.purge_rules,
            purge_rules_egress: self.purge_rules_egress,
            tags: self.tags,
            purge_tags: self.purge_tags,
        }
    }
}

fn parse_rules(params: &ModuleParams, key: &str) -> ModuleResult<Option<Vec<RuleSpec>>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ModuleError::InvalidParameter(format!("{}: {}", key, e))),
    }
}

/// Module that converges a security group toward its declared state
pub struct SecurityGroupModule {
    api: Option<Arc<dyn SecurityGroupApi>>,
    poll: PollSettings,
}

impl SecurityGroupModule {
    pub fn new() -> Self {
        SecurityGroupModule {
            api: None,
            poll: PollSettings::default(),
        }
    }

    /// Use the given API instead of connecting to EC2; tests converge
    /// against in-memory fakes this way.
    pub fn with_api(api: Arc<dyn SecurityGroupApi>) -> Self {
        SecurityGroupModule {
            api: Some(api),
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    async fn execute_async(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let config = SecurityGroupConfig::from_params(params)?;
        let api = self.connect(&config).await?;

        let name = config.name.clone();
        let state = config.state;
        let request = config.into_request();

        let engine = ReconciliationEngine::new(api.as_ref(), context.check_mode)
            .with_poll(self.poll);
        let outcome = engine.run(&request).await?;

        let mut output = match (state, outcome.changed) {
            (GroupState::Present, false) => {
                ModuleOutput::ok(format!("Security group '{}' is up to date", name))
            }
            (GroupState::Present, true) => {
                ModuleOutput::changed(format!("Updated security group '{}'", name))
            }
            (GroupState::Absent, true) => {
                ModuleOutput::changed(format!("Deleted security group '{}'", name))
            }
            (GroupState::Absent, false) => {
                ModuleOutput::ok(format!("Security group '{}' does not exist", name))
            }
        };

        if let Some(report) = &outcome.report {
            output = attach_report(output, report);
        }
        output = output.with_warnings(outcome.warnings);

        if context.diff_mode {
            output = output.with_diff(Diff::new(
                render_state(outcome.before.as_ref()),
                render_state(outcome.report.as_ref()),
            ));
        }
        Ok(output)
    }

    async fn connect(
        &self,
        config: &SecurityGroupConfig,
    ) -> ModuleResult<Arc<dyn SecurityGroupApi>> {
        match &self.api {
            Some(api) => Ok(Arc::clone(api)),
            None => {
                #[cfg(feature = "aws")]
                {
                    let client = aws::AwsSecurityGroupClient::connect(
                        config.region.as_deref(),
                        config.profile.as_deref(),
                    )
                    .await?;
                    Ok(Arc::new(client))
                }
                #[cfg(not(feature = "aws"))]
                {
                    let _ = config;
                    Err(ModuleError::Unsupported(
                        "built without the 'aws' feature and no API was injected".to_string(),
                    ))
                }
            }
        }
    }
}

impl Default for SecurityGroupModule {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten the report into the output's data map, one key per field
fn attach_report(mut output: ModuleOutput, report: &GroupReport) -> ModuleOutput {
    if let Ok(Value::Object(fields)) = serde_json::to_value(report) {
        for (key, value) in fields {
            output = output.with_data(key, value);
        }
    }
    output
}

fn render_state(report: Option<&GroupReport>) -> String {
    match report {
        Some(report) => serde_yaml::to_string(report).unwrap_or_default(),
        None => "absent\n".to_string(),
    }
}

impl Module for SecurityGroupModule {
    fn name(&self) -> &'static str {
        "securitygroup"
    }

    fn description(&self) -> &'static str {
        "Converge an EC2 security group, its rules, and its tags toward a declared state"
    }

    fn required_params(&self) -> &[&'static str] {
        &["name"]
    }

    fn validate_params(&self, params: &ModuleParams) -> ModuleResult<()> {
        SecurityGroupConfig::from_params(params).map(|_| ())
    }

    fn execute(
        &self,
        params: &ModuleParams,
        context: &ModuleContext,
    ) -> ModuleResult<ModuleOutput> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ModuleError::ExecutionFailed("No tokio runtime available".to_string()))?;

        let params = params.clone();
        let context = context.clone();
        let module = self;

        std::thread::scope(|s| {
            s.spawn(|| handle.block_on(module.execute_async(&params, &context)))
                .join()
                .unwrap()
        })
    }
}

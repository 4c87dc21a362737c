use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read deployment document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse deployment document: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("service name '{0}' contains no alphanumeric characters")]
    UnidentifiableName(String),
    #[error("service '{service}' declares an empty image reference")]
    EmptyImage { service: String },
    #[error(
        "services '{first}' and '{second}' both reduce to the identifier '{identifier}'; \
         rename one of them"
    )]
    IdentifierCollision {
        first: String,
        second: String,
        identifier: String,
    },
}

/// Top-level deployment document: global defaults plus a map of services.
///
/// This is the shape of the document after external schema validation; serde
/// still rejects structurally unknown fields.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub vpc: VpcSection,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub iam_role_statements: Vec<Value>,
    #[serde(default)]
    pub iam_managed_policies: Vec<String>,
    #[serde(default)]
    pub overlays: OverlaySection,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

/// Global network placement defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VpcSection {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub assign_public_ip: bool,
}

/// Per-service network placement override. Each sub-field that is present
/// replaces the corresponding global value; absent sub-fields fall through.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VpcOverride {
    #[serde(default)]
    pub subnet_ids: Option<Vec<String>>,
    #[serde(default)]
    pub security_group_ids: Option<Vec<String>>,
    #[serde(default)]
    pub assign_public_ip: Option<bool>,
}

/// Per-service compute sizing and instance-role override.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstanceSection {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub instance_role_arn: Option<String>,
}

/// Health-check probe protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Probe {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "HTTP")]
    Http,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckSection {
    #[serde(default)]
    pub protocol: Option<Probe>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub healthy_threshold: Option<u32>,
    #[serde(default)]
    pub unhealthy_threshold: Option<u32>,
}

/// Rollout policy for continuously-running services. The `strict` flag
/// tightens the default deployment bounds to 0%/100% from 100%/200%.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RolloutSection {
    #[serde(default)]
    pub desired_count: Option<u32>,
    #[serde(default)]
    pub maximum_percent: Option<u32>,
    #[serde(default)]
    pub minimum_healthy_percent: Option<u32>,
    #[serde(default)]
    pub strict: Option<bool>,
}

/// An ordered runtime name/value pair (environment variable or secret).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeyValue {
    pub name: String,
    pub value: String,
}

/// Raw additive property overlays, one bag per emitted resource category.
/// Keys win over compiled properties when merged.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OverlaySection {
    #[serde(default)]
    pub service: Map<String, Value>,
    #[serde(default)]
    pub instance_role: Map<String, Value>,
    #[serde(default)]
    pub access_role: Map<String, Value>,
}

/// A single declared service. Only `image` is required; everything else
/// resolves against the global defaults during normalization.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub image: String,
    #[serde(default)]
    pub execution_role_arn: Option<String>,
    #[serde(default)]
    pub task_role_arn: Option<String>,
    #[serde(default)]
    pub access_role_arn: Option<String>,
    #[serde(default)]
    pub auto_deploy: Option<bool>,
    #[serde(default)]
    pub vpc: Option<VpcOverride>,
    #[serde(default)]
    pub instance: Option<InstanceSection>,
    #[serde(default)]
    pub health_check: Option<HealthCheckSection>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub runtime_variables: Vec<KeyValue>,
    #[serde(default)]
    pub runtime_secrets: Vec<KeyValue>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub iam_role_statements: Vec<Value>,
    #[serde(default)]
    pub iam_managed_policies: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub service: Option<RolloutSection>,
    #[serde(default)]
    pub overlays: Option<OverlaySection>,
}

pub fn parse_config_str(input: &str) -> Result<DeploymentConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<DeploymentConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

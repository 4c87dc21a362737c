use crate::config::{
    ConfigError, DeploymentConfig, HealthCheckSection, KeyValue, OverlaySection, Probe,
    RolloutSection, ServiceSpec,
};
use crate::identifier::identifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_CPU: &str = "1 vCPU";
pub const DEFAULT_MEMORY: &str = "2 GB";

/// Process-wide resolved defaults, immutable for the duration of one
/// compile invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalDefaults {
    pub sizing: InstanceSizing,
    pub network: NetworkPlacement,
    pub tags: BTreeMap<String, String>,
    pub iam_role_statements: Vec<Value>,
    pub iam_managed_policies: Vec<String>,
    pub overlays: OverlaySection,
}

/// Compute sizing for a service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSizing {
    pub cpu: String,
    pub memory: String,
}

/// Resolved network placement (subnets, security groups, public-IP policy).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPlacement {
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub assign_public_ip: bool,
}

/// Fully-resolved health-check policy. `path` is `Some` exactly when the
/// protocol is HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub protocol: Probe,
    pub path: Option<String>,
    pub interval: u32,
    pub timeout: u32,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

/// How a service is deployed: time-triggered invocation, or a long-running
/// service with a rollout policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeploymentMode {
    Scheduled {
        expression: String,
    },
    Rolling {
        desired_count: u32,
        maximum_percent: u32,
        minimum_healthy_percent: u32,
    },
}

/// A service after all default-inheritance has been applied.
///
/// Self-sufficient for compilation: a `ResolvedService` never refers back to
/// [`GlobalDefaults`]. Created once per compile pass and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedService {
    pub name: String,
    pub identifier: String,
    pub image: String,
    pub execution_role_arn: Option<String>,
    pub task_role_arn: Option<String>,
    pub access_role_arn: Option<String>,
    pub instance_role_arn: Option<String>,
    pub auto_deploy: bool,
    pub network: NetworkPlacement,
    pub sizing: InstanceSizing,
    pub health_check: HealthCheckPolicy,
    pub port: Option<u16>,
    pub command: Option<String>,
    pub runtime_variables: Vec<KeyValue>,
    pub runtime_secrets: Vec<KeyValue>,
    pub tags: BTreeMap<String, String>,
    pub iam_role_statements: Vec<Value>,
    pub iam_managed_policies: Vec<String>,
    pub depends_on: Vec<String>,
    pub overlays: OverlaySection,
    pub mode: DeploymentMode,
}

/// Output of normalization: resolved defaults plus one self-contained
/// record per declared service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedDeployment {
    pub defaults: GlobalDefaults,
    pub services: Vec<ResolvedService>,
}

impl DeploymentConfig {
    /// Resolve every service against the global defaults.
    ///
    /// Precedence, most specific first: per-service explicit value, then the
    /// per-service nested override, then the global default, then the
    /// hardcoded fallback. Fails if two service names reduce to the same
    /// identifier.
    pub fn normalize(&self) -> Result<NormalizedDeployment, ConfigError> {
        let defaults = GlobalDefaults {
            sizing: InstanceSizing {
                cpu: self.cpu.clone().unwrap_or_else(|| DEFAULT_CPU.to_owned()),
                memory: self
                    .memory
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MEMORY.to_owned()),
            },
            network: NetworkPlacement {
                subnet_ids: self.vpc.subnet_ids.clone(),
                security_group_ids: self.vpc.security_group_ids.clone(),
                assign_public_ip: self.vpc.assign_public_ip,
            },
            tags: self.tags.clone(),
            iam_role_statements: self.iam_role_statements.clone(),
            iam_managed_policies: self.iam_managed_policies.clone(),
            overlays: self.overlays.clone(),
        };

        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        let mut services = Vec::with_capacity(self.services.len());
        for (key, spec) in &self.services {
            let resolved = resolve_service(&defaults, key, spec)?;
            if let Some(first) = seen.get(&resolved.identifier) {
                return Err(ConfigError::IdentifierCollision {
                    first: first.clone(),
                    second: resolved.name.clone(),
                    identifier: resolved.identifier.clone(),
                });
            }
            seen.insert(resolved.identifier.clone(), resolved.name.clone());
            services.push(resolved);
        }

        Ok(NormalizedDeployment { defaults, services })
    }
}

fn resolve_service(
    defaults: &GlobalDefaults,
    key: &str,
    spec: &ServiceSpec,
) -> Result<ResolvedService, ConfigError> {
    let name = spec.name.as_deref().unwrap_or(key).trim().to_owned();
    if name.is_empty() {
        return Err(ConfigError::EmptyServiceName);
    }
    let id = identifier(&name);
    if id.is_empty() {
        return Err(ConfigError::UnidentifiableName(name));
    }

    let image = spec.image.trim().to_owned();
    if image.is_empty() {
        return Err(ConfigError::EmptyImage { service: name });
    }

    let instance = spec.instance.as_ref();

    Ok(ResolvedService {
        identifier: id,
        image,
        execution_role_arn: spec.execution_role_arn.clone(),
        task_role_arn: spec.task_role_arn.clone(),
        access_role_arn: spec.access_role_arn.clone(),
        instance_role_arn: instance.and_then(|i| i.instance_role_arn.clone()),
        auto_deploy: spec.auto_deploy.unwrap_or(true),
        network: resolve_network(&defaults.network, spec.vpc.as_ref()),
        sizing: resolve_sizing(&defaults.sizing, instance),
        health_check: resolve_health_check(spec.health_check.as_ref()),
        port: spec.port,
        command: spec.command.clone(),
        runtime_variables: spec.runtime_variables.clone(),
        runtime_secrets: spec.runtime_secrets.clone(),
        tags: merge_tags(&defaults.tags, &spec.tags),
        iam_role_statements: concat(&defaults.iam_role_statements, &spec.iam_role_statements),
        iam_managed_policies: concat(&defaults.iam_managed_policies, &spec.iam_managed_policies),
        depends_on: spec.depends_on.clone(),
        overlays: merge_overlays(&defaults.overlays, spec.overlays.as_ref()),
        mode: resolve_mode(spec.schedule.as_ref(), spec.service.as_ref()),
        name,
    })
}

/// Network placement resolves per sub-field: a sub-field present at the
/// service level replaces the global value for that sub-field only.
fn resolve_network(
    global: &NetworkPlacement,
    service: Option<&crate::config::VpcOverride>,
) -> NetworkPlacement {
    NetworkPlacement {
        subnet_ids: service
            .and_then(|v| v.subnet_ids.clone())
            .unwrap_or_else(|| global.subnet_ids.clone()),
        security_group_ids: service
            .and_then(|v| v.security_group_ids.clone())
            .unwrap_or_else(|| global.security_group_ids.clone()),
        assign_public_ip: service
            .and_then(|v| v.assign_public_ip)
            .unwrap_or(global.assign_public_ip),
    }
}

fn resolve_sizing(
    global: &InstanceSizing,
    instance: Option<&crate::config::InstanceSection>,
) -> InstanceSizing {
    InstanceSizing {
        cpu: instance
            .and_then(|i| i.cpu.clone())
            .unwrap_or_else(|| global.cpu.clone()),
        memory: instance
            .and_then(|i| i.memory.clone())
            .unwrap_or_else(|| global.memory.clone()),
    }
}

/// Health checks default to a TCP probe at 1/5s/2s/5. The probe path exists
/// only for HTTP probes, defaulting to `/`.
fn resolve_health_check(section: Option<&HealthCheckSection>) -> HealthCheckPolicy {
    let protocol = section.and_then(|h| h.protocol).unwrap_or(Probe::Tcp);
    let path = match protocol {
        Probe::Http => Some(
            section
                .and_then(|h| h.path.clone())
                .unwrap_or_else(|| "/".to_owned()),
        ),
        Probe::Tcp => None,
    };
    HealthCheckPolicy {
        protocol,
        path,
        interval: section.and_then(|h| h.interval).unwrap_or(5),
        timeout: section.and_then(|h| h.timeout).unwrap_or(2),
        healthy_threshold: section.and_then(|h| h.healthy_threshold).unwrap_or(1),
        unhealthy_threshold: section.and_then(|h| h.unhealthy_threshold).unwrap_or(5),
    }
}

fn resolve_mode(schedule: Option<&String>, rollout: Option<&RolloutSection>) -> DeploymentMode {
    if let Some(expression) = schedule {
        return DeploymentMode::Scheduled {
            expression: expression.clone(),
        };
    }
    let strict = rollout.and_then(|r| r.strict).unwrap_or(false);
    DeploymentMode::Rolling {
        desired_count: rollout.and_then(|r| r.desired_count).unwrap_or(1),
        maximum_percent: rollout
            .and_then(|r| r.maximum_percent)
            .unwrap_or(if strict { 100 } else { 200 }),
        minimum_healthy_percent: rollout
            .and_then(|r| r.minimum_healthy_percent)
            .unwrap_or(if strict { 0 } else { 100 }),
    }
}

/// Flat key/value union; service keys win over global keys of the same name.
fn merge_tags(
    global: &BTreeMap<String, String>,
    service: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = global.clone();
    for (key, value) in service {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Lists concatenate, global entries first. Never overwrites.
fn concat<T: Clone>(global: &[T], service: &[T]) -> Vec<T> {
    let mut merged = Vec::with_capacity(global.len() + service.len());
    merged.extend_from_slice(global);
    merged.extend_from_slice(service);
    merged
}

fn merge_overlays(global: &OverlaySection, service: Option<&OverlaySection>) -> OverlaySection {
    let Some(service) = service else {
        return global.clone();
    };
    OverlaySection {
        service: merge_bag(&global.service, &service.service),
        instance_role: merge_bag(&global.instance_role, &service.instance_role),
        access_role: merge_bag(&global.access_role, &service.access_role),
    }
}

fn merge_bag(global: &Map<String, Value>, service: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = global.clone();
    for (key, value) in service {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

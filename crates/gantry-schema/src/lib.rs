//! Deployment document parsing, normalization, and identifier derivation
//! for Gantry.
//!
//! This crate defines the schema layer: TOML document parsing
//! (`DeploymentConfig`), default-inheritance resolution into self-contained
//! per-service records (`ResolvedService`), and deterministic logical
//! identifier derivation (`identifier`).

pub mod config;
pub mod identifier;
pub mod normalize;

pub use config::{
    parse_config_file, parse_config_str, ConfigError, DeploymentConfig, HealthCheckSection,
    InstanceSection, KeyValue, OverlaySection, Probe, RolloutSection, ServiceSpec, VpcOverride,
    VpcSection,
};
pub use identifier::identifier;
pub use normalize::{
    DeploymentMode, GlobalDefaults, HealthCheckPolicy, InstanceSizing, NetworkPlacement,
    NormalizedDeployment, ResolvedService, DEFAULT_CPU, DEFAULT_MEMORY,
};

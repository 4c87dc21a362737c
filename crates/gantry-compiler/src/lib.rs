//! Resource-graph compilation for Gantry deployments.
//!
//! This crate maps resolved service records onto App Runner resource
//! definitions: the managed-service resource, its per-service instance
//! role, the shared image-pull access role, and the exported service URL
//! outputs. The `synthesize` pipeline ties normalization, image resolution,
//! compilation, and graph accumulation together.

pub mod service;
pub mod synthesize;
pub mod template;

pub use service::{compile_access_role, compile_service, ECR_ACCESS_ROLE_ID};
pub use synthesize::{synthesize, StackContext};
pub use template::{get_att, reference, tag_list, Export, Output, Resource, Template};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("configuration error: {0}")]
    Config(#[from] gantry_schema::ConfigError),
    #[error("image resolution failed for service '{service}': {source}")]
    Resolution {
        service: String,
        #[source]
        source: gantry_registry::RegistryError,
    },
    #[error("empty image locator for service '{0}'")]
    EmptyImageLocator(String),
    #[error("resource '{0}' is defined twice in the compiled graph")]
    ResourceCollision(String),
    #[error("output '{0}' is defined twice in the compiled graph")]
    OutputCollision(String),
    #[error("'{from}' references '{to}', which is not in the compiled graph")]
    DanglingReference { from: String, to: String },
}

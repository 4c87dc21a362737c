//! Image resolution seam for Gantry.
//!
//! The compiler never talks to a registry itself; it consumes an
//! [`ImageResolver`] that turns a declared image reference into a concrete,
//! immutable locator. Resolution may be slow and may fail; any registration
//! bookkeeping a resolver needs around a call is its own concern and must be
//! reverted before the call returns.

pub mod mock;
pub mod resolver;

pub use mock::MockResolver;
pub use resolver::{ImageLocator, ImageResolver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("registry authentication failed: {0}")]
    AuthFailed(String),
    #[error("registry transport error: {0}")]
    Transport(String),
}

use crate::RegistryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, concrete reference to a deployable container image, as
/// returned by a registry. Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageLocator(String);

impl ImageLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageLocator {
    fn from(locator: &str) -> Self {
        Self(locator.to_owned())
    }
}

impl From<String> for ImageLocator {
    fn from(locator: String) -> Self {
        Self(locator)
    }
}

/// Resolves a declared image reference to a concrete locator.
///
/// Called once per service, one service at a time: a resolver may register
/// the service as an addressable unit for the duration of the call, and two
/// concurrent registrations under the same name would race.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(
        &self,
        service_name: &str,
        image_ref: &str,
    ) -> Result<ImageLocator, RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_display_and_as_str() {
        let locator = ImageLocator::new("repo/web@sha256:abc");
        assert_eq!(locator.to_string(), "repo/web@sha256:abc");
        assert_eq!(locator.as_str(), "repo/web@sha256:abc");
    }

    #[test]
    fn locator_serde_roundtrip() {
        let locator = ImageLocator::from("repo/web@sha256:abc");
        let json = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"repo/web@sha256:abc\"");
        let back: ImageLocator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, locator);
    }

    #[test]
    fn blank_locator_is_empty() {
        assert!(ImageLocator::new("  ").is_empty());
        assert!(!ImageLocator::new("repo/web@sha256:abc").is_empty());
    }
}

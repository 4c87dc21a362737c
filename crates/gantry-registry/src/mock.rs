use crate::resolver::{ImageLocator, ImageResolver};
use crate::RegistryError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory resolver for tests.
///
/// Unpinned references get a deterministic locator: the repository part of
/// the reference pinned to a blake3-derived digest, so the same reference
/// always resolves to the same locator. Individual services can be scripted
/// to fail.
pub struct MockResolver {
    pinned: HashMap<String, String>,
    failures: HashMap<String, RegistryFailure>,
    calls: Mutex<Vec<String>>,
}

#[derive(Debug, Clone)]
enum RegistryFailure {
    NotFound(String),
    Auth(String),
    Transport(String),
}

impl Default for MockResolver {
    fn default() -> Self {
        Self {
            pinned: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an image reference to an exact locator.
    #[must_use]
    pub fn with_pinned(mut self, image_ref: impl Into<String>, locator: impl Into<String>) -> Self {
        self.pinned.insert(image_ref.into(), locator.into());
        self
    }

    /// Make resolution fail for the named service with a not-found error.
    #[must_use]
    pub fn with_not_found(mut self, service_name: impl Into<String>) -> Self {
        let name = service_name.into();
        self.failures
            .insert(name.clone(), RegistryFailure::NotFound(name));
        self
    }

    /// Make resolution fail for the named service with a transport error.
    #[must_use]
    pub fn with_transport_failure(
        mut self,
        service_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures
            .insert(service_name.into(), RegistryFailure::Transport(message.into()));
        self
    }

    /// Make resolution fail for the named service with an auth error.
    #[must_use]
    pub fn with_auth_failure(
        mut self,
        service_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures
            .insert(service_name.into(), RegistryFailure::Auth(message.into()));
        self
    }

    /// Names of the services resolved so far, in call order.
    pub fn resolved_services(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageResolver for MockResolver {
    async fn resolve(
        &self,
        service_name: &str,
        image_ref: &str,
    ) -> Result<ImageLocator, RegistryError> {
        self.calls
            .lock()
            .map_err(|e| RegistryError::Transport(format!("mutex poisoned: {e}")))?
            .push(service_name.to_owned());

        if let Some(failure) = self.failures.get(service_name) {
            return Err(match failure.clone() {
                RegistryFailure::NotFound(name) => RegistryError::ImageNotFound(name),
                RegistryFailure::Auth(message) => RegistryError::AuthFailed(message),
                RegistryFailure::Transport(message) => RegistryError::Transport(message),
            });
        }

        if let Some(locator) = self.pinned.get(image_ref) {
            return Ok(ImageLocator::new(locator.clone()));
        }

        let digest = blake3::hash(image_ref.as_bytes()).to_hex();
        let repository = image_ref.split(':').next().unwrap_or(image_ref);
        Ok(ImageLocator::new(format!("{repository}@sha256:{digest}")))
    }
}

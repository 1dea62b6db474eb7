// Scoped service resources: per-request handles to external dependencies,
// acquired before the handler runs and released on every exit path.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service '{0}'")]
    Unknown(String),

    #[error("service '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// Handle to an acquired service. Dropping the handle releases the
/// underlying resource; the pipeline relies on this to guarantee release
/// even when the handler errors or panics.
pub struct ServiceHandle {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ServiceHandle {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { name: name.into(), release: Some(Box::new(release)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing service '{}'", self.name);
            release();
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle").field("name", &self.name).finish()
    }
}

/// Broker that connects service names declared on endpoints to live
/// resources. The concrete services are external collaborators.
#[async_trait]
pub trait ServiceBroker: Send + Sync {
    async fn acquire(&self, name: &str) -> Result<ServiceHandle, ServiceError>;
}

type Connector = Arc<dyn Fn() -> Result<ServiceHandle, ServiceError> + Send + Sync>;

/// Broker over a fixed registry of connectors, populated at startup
#[derive(Default)]
pub struct StaticServiceBroker {
    connectors: HashMap<String, Connector>,
}

impl StaticServiceBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        connector: impl Fn() -> Result<ServiceHandle, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        self.connectors.insert(name.into(), Arc::new(connector));
        self
    }
}

#[async_trait]
impl ServiceBroker for StaticServiceBroker {
    async fn acquire(&self, name: &str) -> Result<ServiceHandle, ServiceError> {
        let connector = self
            .connectors
            .get(name)
            .ok_or_else(|| ServiceError::Unknown(name.to_string()))?;
        debug!("Acquiring service '{}'", name);
        connector()
    }
}

// Shared stubs for integration tests: in-memory schema store, credential
// store and a release-counting service broker.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use admin_api_rust::contract::{ContractDocument, ContractStore};
use admin_api_rust::database::{SchemaGuard, SchemaStore, StoreError};
use admin_api_rust::pipeline::{Pipeline, ValidationPolicy};
use admin_api_rust::security::{Claims, CredentialStore, SecurityGate, UserRecord};
use admin_api_rust::service::{ServiceBroker, ServiceError, ServiceHandle};

pub const TEST_SECRET: &str = "integration-secret";

pub const CONTRACT: &str = r#"
openapi: "3.0.0"
info:
  title: Test Admin API
  version: "0.0.1"
paths:
  /ping:
    get:
      responses:
        "200":
          content:
            application/json:
              schema:
                type: object
  /items:
    get:
      responses:
        "200":
          content:
            application/json:
              schema:
                type: object
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required:
                - name
              properties:
                name:
                  type: string
              additionalProperties: false
      responses:
        "200":
          content:
            application/json:
              schema:
                type: object
  /strict:
    get:
      responses:
        "200":
          content:
            application/json:
              schema:
                type: object
                required:
                  - status
                properties:
                  status:
                    type: string
"#;

/// In-memory schema store with controllable version and reachability
#[derive(Default)]
pub struct StubSchemaStore {
    pub version: AtomicU32,
    pub refreshes: AtomicU32,
    pub offline: AtomicBool,
}

impl StubSchemaStore {
    pub fn at_version(version: u32) -> Arc<Self> {
        let store = Self::default();
        store.version.store(version, Ordering::SeqCst);
        Arc::new(store)
    }
}

#[async_trait]
impl SchemaStore for StubSchemaStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::VersionUnreadable);
        }
        Ok(())
    }

    async fn current_version(&self) -> Result<u32, StoreError> {
        Ok(self.version.load(Ordering::SeqCst))
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Credential store that knows a single user
pub struct StubUsers;

#[async_trait]
impl CredentialStore for StubUsers {
    async fn load_user(&self, username: &str) -> Result<Option<UserRecord>, String> {
        if username == "admin" {
            Ok(Some(UserRecord {
                id: Uuid::new_v4(),
                username: username.to_string(),
                admin: true,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Broker that hands out one counted service and records releases
pub struct CountingBroker {
    pub acquired: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl CountingBroker {
    pub fn new() -> Self {
        Self {
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ServiceBroker for CountingBroker {
    async fn acquire(&self, name: &str) -> Result<ServiceHandle, ServiceError> {
        if name != "ldap" {
            return Err(ServiceError::Unknown(name.to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let released = self.released.clone();
        Ok(ServiceHandle::new(name, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

pub fn test_contract() -> Arc<ContractStore> {
    Arc::new(ContractDocument::from_str(CONTRACT).unwrap().compile().unwrap())
}

pub fn test_gate() -> SecurityGate {
    SecurityGate::new(TEST_SECRET, Arc::new(StubUsers))
}

/// Signed session token plus its bound CSRF token
pub fn issue_session(username: &str) -> (String, String) {
    let claims = Claims::new(username, 1);
    let csrf = claims.csrf.clone();
    let token = test_gate().issue_token(&claims).unwrap();
    (token, csrf)
}

pub async fn build_pipeline(
    policy: ValidationPolicy,
    store: Option<Arc<StubSchemaStore>>,
    services: Arc<dyn ServiceBroker>,
) -> Pipeline {
    let guard = match store {
        Some(store) => Some(Arc::new(SchemaGuard::new(store).await.unwrap())),
        None => None,
    };
    Pipeline::new(test_contract(), test_gate(), guard, services, policy)
}

/// Pipeline over a reachable store at schema version 1, no services
pub async fn default_pipeline() -> Pipeline {
    build_pipeline(
        ValidationPolicy::default(),
        Some(StubSchemaStore::at_version(1)),
        Arc::new(CountingBroker::new()),
    )
    .await
}

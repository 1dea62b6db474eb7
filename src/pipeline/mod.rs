// Request pipeline: gate -> validate-request -> schema check -> invoke ->
// validate-response, with uniform error mapping at the boundary. One linear
// execution per inbound call; concurrency across calls belongs to the host
// server.
use axum::http::Method;
use axum::response::IntoResponse;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::{ApiRequest, ApiResponse};
use crate::config::AppConfig;
use crate::contract::schema::{ValidationError, ValidationErrorKind};
use crate::contract::{ContractStore, ValidationResult};
use crate::database::SchemaGuard;
use crate::error::ApiError;
use crate::security::{AuthLevel, SecurityContext, SecurityGate};
use crate::service::{ServiceBroker, ServiceHandle};

/// Request bodies larger than this are rejected before validation
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Whether an endpoint requires a login context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireAuth {
    /// No login context is created, even for logged-in callers
    No,
    /// Authentication is attempted; failure is recorded, not terminal
    Optional,
    /// Authentication failure rejects the request
    Required,
}

/// Whether an endpoint needs the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireDb {
    No,
    Yes,
    /// Store required at or above this schema version
    MinVersion(u32),
}

/// Static per-endpoint descriptor, fixed at registration
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub require_auth: RequireAuth,
    pub auth_level: AuthLevel,
    pub require_db: RequireDb,
    pub service: Option<&'static str>,
    /// None: CSRF checked for non-GET methods (unless globally disabled)
    pub validate_csrf: Option<bool>,
}

impl EndpointConfig {
    /// No auth, no store
    pub fn public() -> Self {
        Self {
            require_auth: RequireAuth::No,
            auth_level: AuthLevel::Basic,
            require_db: RequireDb::No,
            service: None,
            validate_csrf: None,
        }
    }

    /// Mandatory authentication (the common case for admin endpoints)
    pub fn secured() -> Self {
        Self { require_auth: RequireAuth::Required, ..Self::public() }
    }

    /// Authentication attempted but not required
    pub fn optional_auth() -> Self {
        Self { require_auth: RequireAuth::Optional, ..Self::public() }
    }

    pub fn with_db(mut self) -> Self {
        self.require_db = RequireDb::Yes;
        self
    }

    pub fn with_min_schema(mut self, minimum: u32) -> Self {
        self.require_db = RequireDb::MinVersion(minimum);
        self
    }

    pub fn with_auth_level(mut self, level: AuthLevel) -> Self {
        self.auth_level = level;
        self
    }

    pub fn with_service(mut self, name: &'static str) -> Self {
        self.service = Some(name);
        self
    }

    pub fn with_csrf(mut self, enabled: bool) -> Self {
        self.validate_csrf = Some(enabled);
        self
    }
}

/// Enforcement policy, snapshotted from configuration at startup
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub validate_request: bool,
    pub validate_response: bool,
    pub disable_csrf: bool,
}

impl ValidationPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            validate_request: config.openapi.validate_request,
            validate_response: config.openapi.validate_response,
            disable_csrf: config.security.disable_csrf,
        }
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self { validate_request: true, validate_response: true, disable_csrf: false }
    }
}

/// Failure returned by a wrapped handler. Database failures map to 503 so
/// callers can tell transient infrastructure trouble from logic bugs.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("database failure: {0}")]
    Database(String),

    #[error("{0}")]
    Internal(String),
}

impl From<sqlx::Error> for HandlerError {
    fn from(err: sqlx::Error) -> Self {
        HandlerError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

pub type HandlerResult = Result<ApiResponse, HandlerError>;

/// Everything a handler gets to see: the validated request, the resolved
/// security context and, when declared, the scoped service handle
#[derive(Debug)]
pub struct RequestContext {
    pub request: Arc<ApiRequest>,
    pub security: SecurityContext,
    pub service: Option<ServiceHandle>,
}

/// The fixed pipeline executor wrapping every endpoint
pub struct Pipeline {
    contract: Arc<ContractStore>,
    gate: SecurityGate,
    guard: Option<Arc<SchemaGuard>>,
    services: Arc<dyn ServiceBroker>,
    policy: ValidationPolicy,
}

impl Pipeline {
    pub fn new(
        contract: Arc<ContractStore>,
        gate: SecurityGate,
        guard: Option<Arc<SchemaGuard>>,
        services: Arc<dyn ServiceBroker>,
        policy: ValidationPolicy,
    ) -> Self {
        Self { contract, gate, guard, services, policy }
    }

    pub fn contract(&self) -> &Arc<ContractStore> {
        &self.contract
    }

    pub fn guard(&self) -> Option<&Arc<SchemaGuard>> {
        self.guard.as_ref()
    }

    /// Run one request through the pipeline. Never returns an error: every
    /// failure is already mapped to its uniform HTTP shape.
    pub async fn handle<H, Fut>(&self, request: ApiRequest, endpoint: &EndpointConfig, handler: H) -> ApiResponse
    where
        H: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = HandlerResult> + Send,
    {
        // Authenticating
        let security = match endpoint.require_auth {
            RequireAuth::No => SecurityContext::anonymous(None),
            RequireAuth::Optional | RequireAuth::Required => {
                let check_csrf = effective_csrf(&self.policy, endpoint, &request.method);
                match self.gate.authenticate(&request, endpoint.auth_level, check_csrf).await {
                    Ok(context) => context,
                    Err(reason) if endpoint.require_auth == RequireAuth::Required => {
                        info!("Authentication rejected for {} {}: {}", request.method, request.path, reason);
                        return ApiError::AccessDenied { reason }.to_response();
                    }
                    Err(reason) => {
                        debug!("Optional authentication failed for {} {}: {}", request.method, request.path, reason);
                        SecurityContext::anonymous(Some(reason))
                    }
                }
            }
        };

        // ValidatingRequest
        let result = self.contract.request_validator().validate(&request);
        if !result.is_valid() {
            if self.policy.validate_request {
                info!(
                    "Request validation failed for {} {}: {}",
                    request.method,
                    request.path,
                    describe(&result)
                );
                return ApiError::bad_request(&result).to_response();
            }
            warn!(
                "Request validation failed (enforcement disabled) for {} {}: {}",
                request.method,
                request.path,
                describe(&result)
            );
        }

        // CheckingSchema: the store is consulted whenever the endpoint needs
        // it or a login context exists (session bookkeeping lives there)
        let needs_store =
            endpoint.require_db != RequireDb::No || endpoint.require_auth != RequireAuth::No;
        if needs_store {
            let Some(guard) = &self.guard else {
                return ApiError::DatabaseUnavailable.to_response();
            };
            if guard.ensure_available().await.is_err() {
                return ApiError::DatabaseUnavailable.to_response();
            }
            if guard.require_reload().await {
                if let Err(e) = guard.reload().await {
                    error!("Schema reload failed: {}", e);
                    return ApiError::DatabaseUnavailable.to_response();
                }
            }
            if let RequireDb::MinVersion(minimum) = endpoint.require_db {
                if guard.ensure_version(minimum).await.is_err() {
                    info!(
                        "Schema version gate rejected {} {} (minimum {})",
                        request.method, request.path, minimum
                    );
                    return ApiError::SchemaTooOld { minimum }.to_response();
                }
            }
        }

        // Invoking
        let service = match endpoint.service {
            Some(name) => match self.services.acquire(name).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Service acquisition failed for {} {}: {}", request.method, request.path, e);
                    return ApiError::Internal.to_response();
                }
            },
            None => None,
        };

        let request = Arc::new(request);
        let context = RequestContext { request: request.clone(), security, service };

        // The service handle lives inside the handler future; dropping the
        // future on any exit path, unwind included, releases it
        let outcome = AssertUnwindSafe(handler(context)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(HandlerError::Database(detail))) => {
                error!("Database failure in {} {}: {}", request.method, request.path, detail);
                return ApiError::DatabaseError.to_response();
            }
            Ok(Err(HandlerError::Internal(detail))) => {
                error!("Handler failure in {} {}: {}", request.method, request.path, detail);
                return ApiError::Internal.to_response();
            }
            Err(panic) => {
                error!(
                    "Handler panicked in {} {}: {}",
                    request.method,
                    request.path,
                    panic_message(&panic)
                );
                return ApiError::Internal.to_response();
            }
        };

        // ValidatingResponse
        let result = self.contract.response_validator().validate(&request, &response);
        if !result.is_valid() {
            if self.policy.validate_response {
                error!(
                    "Response validation failed for {} {}: {}",
                    request.method,
                    request.path,
                    describe(&result)
                );
                return ApiError::InvalidResponse.to_response();
            }
            warn!(
                "Response validation failed (enforcement disabled) for {} {}: {}",
                request.method,
                request.path,
                describe(&result)
            );
        }

        // Done: the handler's response passes through verbatim
        response
    }
}

/// CSRF is checked for non-GET methods by default; endpoints may force it
/// either way, and configuration may switch it off globally
fn effective_csrf(policy: &ValidationPolicy, endpoint: &EndpointConfig, method: &Method) -> bool {
    if policy.disable_csrf {
        return false;
    }
    endpoint.validate_csrf.unwrap_or(*method != Method::GET)
}

fn describe(result: &ValidationResult) -> String {
    result
        .errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Adapter between axum and the pipeline: buffers the body, builds the
/// framework-neutral request view, and converts the result back
pub async fn dispatch<H, Fut>(
    pipeline: Arc<Pipeline>,
    endpoint: EndpointConfig,
    handler: H,
    request: axum::extract::Request,
) -> axum::response::Response
where
    H: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = HandlerResult> + Send,
{
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let oversized = ValidationResult::invalid(vec![ValidationError::new(
                ValidationErrorKind::InvalidJson,
                "body",
            )]);
            return ApiError::bad_request(&oversized).into_response();
        }
    };

    let api_request = ApiRequest::from_parts(
        parts.method,
        parts.uri.path(),
        parts.uri.query(),
        parts.headers,
        &bytes,
    );

    pipeline.handle(api_request, &endpoint, handler).await.into_response()
}

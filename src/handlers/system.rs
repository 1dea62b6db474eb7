// Built-in admin endpoints. Business endpoints are registered the same way:
// a plain async fn taking a RequestContext, wired through the pipeline.
use serde_json::json;
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::contract::ContractStore;
use crate::database::SchemaGuard;
use crate::pipeline::{HandlerResult, RequestContext};

/// GET / - service metadata from the loaded contract
pub async fn service_info(contract: Arc<ContractStore>, _ctx: RequestContext) -> HandlerResult {
    Ok(ApiResponse::ok(json!({
        "name": contract.title(),
        "apiVersion": contract.version(),
        "serverVersion": env!("CARGO_PKG_VERSION"),
    })))
}

/// GET /api/v1/status - store health and schema version
pub async fn status(guard: Option<Arc<SchemaGuard>>, _ctx: RequestContext) -> HandlerResult {
    let (database, schema_version) = match &guard {
        Some(guard) => (guard.ensure_available().await.is_ok(), Some(guard.version().await)),
        None => (false, None),
    };

    Ok(ApiResponse::ok(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "schemaVersion": schema_version,
    })))
}

/// GET /api/v1/session - identity behind the presented credentials
pub async fn session_info(ctx: RequestContext) -> HandlerResult {
    // The pipeline guarantees an identity here; this endpoint is secured
    let identity = ctx.security.identity.as_ref();

    Ok(ApiResponse::ok(json!({
        "username": identity.map(|i| i.username.clone()),
        "session": identity.map(|i| i.session.to_string()),
    })))
}

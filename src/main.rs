use std::sync::Arc;

use admin_api_rust::app;
use admin_api_rust::config;
use admin_api_rust::contract::ContractDocument;
use admin_api_rust::database::{connect_pool, PgSchemaStore, SchemaGuard};
use admin_api_rust::pipeline::{Pipeline, ValidationPolicy};
use admin_api_rust::security::{CredentialStore, NoCredentialStore, PgCredentialStore, SecurityGate};
use admin_api_rust::service::StaticServiceBroker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting admin API in {:?} mode", config.environment);

    if !config.openapi.validate_request {
        tracing::warn!("Request validation is disabled!");
    }
    if !config.openapi.validate_response {
        tracing::warn!("Response validation is disabled!");
    }

    // An unparsable contract must abort startup
    let contract = Arc::new(
        ContractDocument::from_file(&config.openapi.document_path)?
            .merge_servers(&config.contract_servers())
            .compile()?,
    );
    tracing::info!("Loaded API contract '{}' version {}", contract.title(), contract.version());

    let (guard, users): (Option<Arc<SchemaGuard>>, Arc<dyn CredentialStore>) = match connect_pool().await {
        Ok(pool) => {
            let store = Arc::new(PgSchemaStore::new(pool.clone()));
            let guard = SchemaGuard::new(store).await?;
            (Some(Arc::new(guard)), Arc::new(PgCredentialStore::new(pool)))
        }
        Err(e) => {
            tracing::warn!("Persistent store not available, database endpoints disabled: {}", e);
            (None, Arc::new(NoCredentialStore))
        }
    };

    let gate = SecurityGate::new(config.security.jwt_secret.clone(), users);
    let services = Arc::new(StaticServiceBroker::new());
    let pipeline = Arc::new(Pipeline::new(
        contract,
        gate,
        guard,
        services,
        ValidationPolicy::from_config(config),
    ));

    let app = app::router(pipeline);

    // Allow tests or deployments to override port via env
    let port = std::env::var("ADMIN_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Admin API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

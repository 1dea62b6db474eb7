use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::contract::Server;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub openapi: OpenapiConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
}

/// Contract enforcement policy and document location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenapiConfig {
    /// Reject (true) or merely log (false) request-validation failures
    pub validate_request: bool,
    /// Reject (true) or merely log (false) response-validation failures
    pub validate_response: bool,
    /// Deployment server entries appended to the contract's `servers` list
    pub servers: Vec<String>,
    /// Path of the OpenAPI document loaded at startup
    pub document_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Globally disables CSRF validation (development convenience)
    pub disable_csrf: bool,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("OPENAPI_VALIDATE_REQUEST") {
            self.openapi.validate_request = v.parse().unwrap_or(self.openapi.validate_request);
        }
        if let Ok(v) = env::var("OPENAPI_VALIDATE_RESPONSE") {
            self.openapi.validate_response = v.parse().unwrap_or(self.openapi.validate_response);
        }
        if let Ok(v) = env::var("OPENAPI_SERVERS") {
            self.openapi.servers = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("OPENAPI_DOCUMENT") {
            self.openapi.document_path = v;
        }

        if let Ok(v) = env::var("SECURITY_DISABLE_CSRF") {
            self.security.disable_csrf = v.parse().unwrap_or(self.security.disable_csrf);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        self
    }

    /// Deployment server entries as contract `Server` values
    pub fn contract_servers(&self) -> Vec<Server> {
        self.openapi
            .servers
            .iter()
            .map(|url| Server { url: url.clone(), description: None })
            .collect()
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            openapi: OpenapiConfig {
                validate_request: true,
                validate_response: true,
                servers: Vec::new(),
                document_path: "openapi.yaml".to_string(),
            },
            security: SecurityConfig {
                disable_csrf: false,
                jwt_secret: "development-only-secret".to_string(),
                jwt_expiry_hours: 24 * 7,
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            openapi: OpenapiConfig {
                validate_request: true,
                // Response rejection is opt-in for production: a contract gap
                // should not take a working endpoint down
                validate_response: false,
                servers: Vec::new(),
                document_path: "openapi.yaml".to_string(),
            },
            security: SecurityConfig {
                disable_csrf: false,
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

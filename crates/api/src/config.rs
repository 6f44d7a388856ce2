//! Environment configuration

use anyhow::Context;

/// Server configuration loaded from the environment.
///
/// Gateway credentials are read separately by the billing crate
/// (`MERCADO_PAGO_ACCESS_TOKEN` and friends).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        // Hosting platforms inject PORT; BIND_ADDRESS wins when both are set.
        let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| format!("0.0.0.0:{port}"));

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            allowed_origins,
        })
    }
}

//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y expone `CONFIG`.
use std::env;

use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::errors::AppError;

/// Configuración global de la demo.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// URL de Postgres; sin ella la demo usa el store en memoria.
    pub database_url: Option<String>,
    /// Identidad lógica del workflow de la demo.
    pub workflow_id: Uuid,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let workflow_id = match env::var("BRANCHFLOW_WORKFLOW_ID") {
            Ok(raw) => Uuid::parse_str(&raw).map_err(|e| AppError::Config(format!("BRANCHFLOW_WORKFLOW_ID: {e}")))?,
            Err(_) => Uuid::new_v4(),
        };
        Ok(Self { database_url,
                  workflow_id })
    }
}

/// Instancia global perezosa, evaluada una sola vez.
pub static CONFIG: Lazy<Result<AppConfig, AppError>> = Lazy::new(AppConfig::from_env);

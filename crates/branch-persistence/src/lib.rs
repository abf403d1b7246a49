//! branch-persistence
//!
//! Implementación Postgres del contrato `WorkflowStore` de `branch-core`.
//!
//! Módulos:
//! - `pg`: store por identidad (posición + step log) y advisory locks.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgBackend, PgPool, PgWorkflowStore, PoolProvider};

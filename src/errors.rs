use branch_core::{DefinitionError, EngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Definición inválida: {0}")]
    Definition(#[from] DefinitionError),
    #[error("Error del motor: {0}")]
    Engine(#[from] EngineError),
    #[cfg(feature = "pg_demo")]
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] branch_persistence::PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_variant_format() {
        let err = AppError::Config("mala configuración".into());
        assert_eq!(err.to_string(), "Error de configuración: mala configuración");
    }

    #[test]
    fn engine_variant_from() {
        let err: AppError = EngineError::UnknownNode { node: "x".into() }.into();
        assert_eq!(err.to_string(), "Error del motor: node 'x' is not declared on this workflow");
    }
}

//! Errores del core.
//!
//! Hay dos momentos distintos: definición (`DefinitionError`, al construir
//! la tabla de nodos) y ejecución (`EngineError`). Durante el recorrido los
//! cuerpos devuelven `Interrupt`, que mezcla la señal de parada con fallos
//! reales.

use thiserror::Error;

/// Errores detectados al construir un `WorkflowDefinition`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DefinitionError {
    #[error("node '{node}' has no predicate/setup function registered under its name")]
    MissingPredicate { node: String },
    #[error("decision '{node}' requires both a yes and a no branch")]
    IncompleteBranches { node: String },
    #[error("workflow has no start body")]
    MissingStart,
    #[error("node '{node}' declared more than once")]
    DuplicateNode { node: String },
    #[error("invalid identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },
}

/// Errores del codec de posición.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("identifier '{0}' cannot be encoded (empty or contains a separator)")]
    InvalidIdentifier(String),
    #[error("fingerprint '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// Errores reportados por un `WorkflowStore`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Errores en tiempo de ejecución del motor.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("node '{node}' is not declared on this workflow")]
    UnknownNode { node: String },
}

/// Salida anticipada de un cuerpo de rama.
///
/// `Stop` no es un error: se captura en el tope de la unidad de recorrido
/// (construcción o invocación de un entry) y el estado acumulado se persiste
/// igualmente. `Fault` sí se propaga al llamador.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Interrupt {
    Stop,
    Fault(EngineError),
}

impl From<EngineError> for Interrupt {
    fn from(err: EngineError) -> Self {
        Interrupt::Fault(err)
    }
}

impl From<StoreError> for Interrupt {
    fn from(err: StoreError) -> Self {
        Interrupt::Fault(err.into())
    }
}

impl From<CodecError> for Interrupt {
    fn from(err: CodecError) -> Self {
        Interrupt::Fault(err.into())
    }
}

/// Resultado de evaluar un cuerpo de rama.
pub type Flow = Result<(), Interrupt>;

/// Punto de captura: absorbe `Stop` y deja pasar los fallos.
pub(crate) fn catch_stop(flow: Flow) -> Result<(), EngineError> {
    match flow {
        Ok(()) | Err(Interrupt::Stop) => Ok(()),
        Err(Interrupt::Fault(e)) => Err(e),
    }
}

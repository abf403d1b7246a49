//! branch-core: máquina de estados de workflows de decisión reanudables.
//!
//! Un workflow es un árbol de decisiones booleanas y entry points nombrados.
//! Su posición se guarda como un fingerprint compacto
//! (`entries:llamadas`) para que la misma instancia lógica pueda abrirse una
//! y otra vez (por ejemplo, una vez por evento entrante) y continuar donde
//! quedó, sin repetir efectos no idempotentes.
pub mod codec;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod state;
pub mod step;
pub mod store;

pub use engine::{Branches, Traversal, Workflow, WorkflowBuilder, WorkflowDefinition};
pub use errors::{CodecError, DefinitionError, EngineError, Flow, Interrupt, StoreError};
pub use state::WorkflowState;
pub use step::StepRecord;
pub use store::{MemoryBackend, MemoryStore, WorkflowStore};

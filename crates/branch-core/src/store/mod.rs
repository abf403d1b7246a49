//! Contrato de almacenamiento de un workflow.
//!
//! Un `WorkflowStore` es un handle ya acotado a UNA identidad lógica de
//! workflow. El core sólo necesita cinco operaciones y asume que
//! `run_exclusive` serializa las unidades de trabajo concurrentes sobre esa
//! misma identidad (lock, versión optimista con reintento, lo que sea).

pub mod memory;

pub use memory::{MemoryBackend, MemoryStore};

use crate::errors::StoreError;
use crate::step::StepRecord;

pub trait WorkflowStore {
    /// Ejecuta `work` bajo exclusión mutua respecto a otras instanciaciones
    /// de la misma identidad y devuelve su resultado. No es reentrante: el
    /// motor nunca anida llamadas.
    fn run_exclusive<T, E, F>(&self, work: F) -> Result<T, E>
        where F: FnOnce() -> Result<T, E>,
              E: From<StoreError>;

    /// Fingerprint persistido, o `None` si el workflow nunca se guardó.
    fn load_fingerprint(&self) -> Result<Option<String>, StoreError>;

    fn save_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError>;

    /// Reemplaza el step log guardado por `steps` (no es append).
    fn save_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError>;

    /// Último step log guardado (vacío si no hay).
    fn load_step_log(&self) -> Result<Vec<StepRecord>, StoreError>;
}

impl<S: WorkflowStore + ?Sized> WorkflowStore for &S {
    fn run_exclusive<T, E, F>(&self, work: F) -> Result<T, E>
        where F: FnOnce() -> Result<T, E>,
              E: From<StoreError>
    {
        (**self).run_exclusive(work)
    }

    fn load_fingerprint(&self) -> Result<Option<String>, StoreError> {
        (**self).load_fingerprint()
    }

    fn save_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError> {
        (**self).save_fingerprint(fingerprint)
    }

    fn save_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError> {
        (**self).save_step_log(steps)
    }

    fn load_step_log(&self) -> Result<Vec<StepRecord>, StoreError> {
        (**self).load_step_log()
    }
}

//! Store en memoria.
//!
//! `MemoryBackend` es el registro compartido (clonable) de todas las
//! identidades; `MemoryStore` es el handle de una identidad concreta. Dos
//! handles de la misma identidad comparten el mismo slot, así que varios
//! hilos pueden instanciar el mismo workflow y `run_exclusive` los serializa.
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use uuid::Uuid;

use super::WorkflowStore;
use crate::errors::StoreError;
use crate::step::StepRecord;

#[derive(Debug, Default, Clone)]
struct Record {
    fingerprint: Option<String>,
    steps: Vec<StepRecord>,
}

#[derive(Debug, Default)]
struct Slot {
    exclusive: Mutex<()>,
    record: Mutex<Record>,
}

// Un panic dentro de una unidad de trabajo no invalida los datos guardados
// (sólo se escriben strings completos), así que recuperamos el guard.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    slots: Arc<DashMap<Uuid, Arc<Slot>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle para `flow_id`; crea el slot si no existe.
    pub fn store(&self, flow_id: Uuid) -> MemoryStore {
        let slot = self.slots.entry(flow_id).or_default().clone();
        MemoryStore { flow_id, slot }
    }

    pub fn identities(&self) -> Vec<Uuid> {
        self.slots.iter().map(|e| *e.key()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    flow_id: Uuid,
    slot: Arc<Slot>,
}

impl MemoryStore {
    /// Store aislado con una identidad nueva (útil en tests).
    pub fn standalone() -> Self {
        MemoryBackend::new().store(Uuid::new_v4())
    }

    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    /// Borra fingerprint y step log de esta identidad.
    pub fn reset(&self) {
        *lock(&self.slot.record) = Record::default();
    }
}

impl WorkflowStore for MemoryStore {
    fn run_exclusive<T, E, F>(&self, work: F) -> Result<T, E>
        where F: FnOnce() -> Result<T, E>,
              E: From<StoreError>
    {
        let _guard = lock(&self.slot.exclusive);
        work()
    }

    fn load_fingerprint(&self) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.slot.record).fingerprint.clone())
    }

    fn save_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError> {
        lock(&self.slot.record).fingerprint = Some(fingerprint.to_string());
        Ok(())
    }

    fn save_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError> {
        lock(&self.slot.record).steps = steps.to_vec();
        Ok(())
    }

    fn load_step_log(&self) -> Result<Vec<StepRecord>, StoreError> {
        Ok(lock(&self.slot.record).steps.clone())
    }
}

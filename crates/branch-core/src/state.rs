//! Estado en memoria de una instanciación.
//!
//! Se reconstruye desde el fingerprint al abrir el workflow y se descarta al
//! soltar la instancia: el fingerprint persistido es la única verdad durable.
use std::collections::BTreeSet;

use indexmap::IndexSet;

use crate::codec;
use crate::constants::FINISHED_SENTINEL;
use crate::errors::CodecError;
use crate::step::StepRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowState {
    reached: IndexSet<String>,
    calls: BTreeSet<String>,
    steps: Vec<StepRecord>,
}

impl WorkflowState {
    /// Estado a partir de un fingerprint opcional (ausente ⇒ vacío).
    pub fn from_fingerprint(fingerprint: Option<&str>) -> Result<Self, CodecError> {
        match fingerprint {
            None => Ok(Self::default()),
            Some(fp) => {
                let (reached, calls) = codec::decode(fp)?;
                Ok(Self { reached,
                          calls,
                          steps: Vec::new() })
            }
        }
    }

    pub fn fingerprint(&self) -> Result<String, CodecError> {
        codec::encode(&self.reached, &self.calls)
    }

    /// Se deriva siempre de las llamadas ejecutadas; no hay flag almacenado.
    pub fn is_finished(&self) -> bool {
        self.calls.contains(FINISHED_SENTINEL)
    }

    /// Inserción idempotente; devuelve `true` si el entry es nuevo.
    pub fn reach(&mut self, entry: &str) -> bool {
        self.reached.insert(entry.to_string())
    }

    /// Devuelve `true` si la llamada no estaba registrada.
    pub fn record_call(&mut self, name: &str) -> bool {
        self.calls.insert(name.to_string())
    }

    pub fn has_call(&self, name: &str) -> bool {
        self.calls.contains(name)
    }

    pub fn push_step(&mut self, step: StepRecord) {
        self.steps.push(step);
    }

    pub fn replace_steps(&mut self, steps: Vec<StepRecord>) {
        self.steps = steps;
    }

    /// Une otra posición a ésta. Ambos conjuntos sólo crecen; los entry
    /// points desconocidos se añaden al final en el orden de `other`.
    pub fn merge_position(&mut self, other: &WorkflowState) {
        for entry in &other.reached {
            self.reach(entry);
        }
        for call in &other.calls {
            self.record_call(call);
        }
    }

    pub fn reached_entry_points(&self) -> &IndexSet<String> {
        &self.reached
    }

    pub fn executed_calls(&self) -> &BTreeSet<String> {
        &self.calls
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }
}

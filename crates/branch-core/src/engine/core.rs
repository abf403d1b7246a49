//! Motor: instanciación y reanudación de un workflow.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexSet;
use log::{debug, info};

use crate::engine::builder::WorkflowDefinition;
use crate::engine::traversal::Traversal;
use crate::errors::{catch_stop, EngineError};
use crate::state::WorkflowState;
use crate::step::StepRecord;
use crate::store::WorkflowStore;

/// Una instanciación de un workflow lógico.
///
/// Al abrirse decodifica la posición persistida y recorre el árbol (desde
/// `start` o re-ejecutando los entries alcanzados), todo dentro de la unidad
/// de trabajo exclusiva del store. Nada sobrevive en memoria entre
/// instanciaciones: el fingerprint es la única verdad durable.
pub struct Workflow<W, S: WorkflowStore> {
    definition: Arc<WorkflowDefinition<W>>,
    store: S,
    data: W,
    state: WorkflowState,
}

impl<W, S: WorkflowStore> Workflow<W, S> {
    /// Fase de construcción/reanudación.
    ///
    /// - Workflow terminado: no se recorre nada; el step log es el guardado.
    /// - Sin entries alcanzados: se ejecuta `start`.
    /// - En otro caso: replay de cada entry alcanzado en orden de llegada,
    ///   saltando los que ya no existen en la definición.
    ///
    /// Un `stop` dentro del recorrido se absorbe y el fingerprint se guarda
    /// igualmente.
    pub fn open(definition: Arc<WorkflowDefinition<W>>, store: S, mut data: W) -> Result<Self, EngineError> {
        let state = store.run_exclusive(|| -> Result<WorkflowState, EngineError> {
                             let stored = store.load_fingerprint()?;
                             let mut state = WorkflowState::from_fingerprint(stored.as_deref())?;
                             if state.is_finished() {
                                 debug!("workflow={} already finished, loading stored step log", definition.name());
                                 state.replace_steps(store.load_step_log()?);
                                 return Ok(state);
                             }
                             {
                                 let mut traversal = Traversal::new(&definition, &mut data, &mut state, &store);
                                 catch_stop(traversal.resume())?;
                                 traversal.persist()?;
                             }
                             Ok(state)
                         })?;
        info!("workflow={} opened reached={} calls={} finished={}",
              definition.name(),
              state.reached_entry_points().len(),
              state.executed_calls().len(),
              state.is_finished());
        Ok(Self { definition,
                  store,
                  data,
                  state })
    }

    /// Invocación externa de un entry point. Devuelve la propia instancia
    /// para encadenar más llamadas.
    ///
    /// Antes de ejecutar el cuerpo se une la posición persistida por otras
    /// instanciaciones, de modo que una instancia vieja nunca borra progreso.
    pub fn invoke(&mut self, entry: &str) -> Result<&mut Self, EngineError> {
        let definition = Arc::clone(&self.definition);
        let node = definition.entry(entry)
                             .ok_or_else(|| EngineError::UnknownNode { node: entry.to_string() })?;
        if self.state.is_finished() {
            debug!("workflow={} entry={} ignored: workflow finished", definition.name(), entry);
            return Ok(self);
        }
        let store = &self.store;
        let data = &mut self.data;
        let state = &mut self.state;
        store.run_exclusive(|| -> Result<(), EngineError> {
                 let stored = WorkflowState::from_fingerprint(store.load_fingerprint()?.as_deref())?;
                 state.merge_position(&stored);
                 if state.is_finished() {
                     state.replace_steps(store.load_step_log()?);
                     return Ok(());
                 }
                 Traversal::new(&definition, data, state, store).run_entry(node)
             })?;
        Ok(self)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn steps(&self) -> &[StepRecord] {
        self.state.steps()
    }

    pub fn reached_entry_points(&self) -> &IndexSet<String> {
        self.state.reached_entry_points()
    }

    pub fn executed_calls(&self) -> &BTreeSet<String> {
        self.state.executed_calls()
    }

    /// Fingerprint de la posición actual en memoria.
    pub fn fingerprint(&self) -> Result<String, EngineError> {
        Ok(self.state.fingerprint()?)
    }

    pub fn data(&self) -> &W {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut W {
        &mut self.data
    }

    pub fn into_data(self) -> W {
        self.data
    }

    pub fn definition(&self) -> &WorkflowDefinition<W> {
        &self.definition
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

//! Contexto de recorrido.
//!
//! Los cuerpos de rama reciben un `&mut Traversal` con las primitivas
//! disponibles: invocar decisiones y entries, el guard de llamadas no
//! idempotentes, `finish` y `stop`. Todas comparten el mismo estado de la
//! instanciación en curso.
use log::{debug, info, warn};

use crate::codec::is_valid_identifier;
use crate::constants::FINISHED_SENTINEL;
use crate::engine::builder::{EntryNode, WorkflowDefinition};
use crate::errors::{catch_stop, CodecError, EngineError, Flow, Interrupt, StoreError};
use crate::state::WorkflowState;
use crate::step::StepRecord;
use crate::store::WorkflowStore;

/// Parte object-safe del store que el recorrido necesita para persistir
/// desde dentro de un cuerpo (entries anidados y `finish`). Se invoca
/// siempre con el lock de la identidad ya tomado.
pub(crate) trait Sink {
    fn persist_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError>;
    fn persist_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError>;
}

impl<S: WorkflowStore> Sink for S {
    fn persist_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.save_fingerprint(fingerprint)
    }

    fn persist_step_log(&self, steps: &[StepRecord]) -> Result<(), StoreError> {
        self.save_step_log(steps)
    }
}

pub struct Traversal<'a, W> {
    definition: &'a WorkflowDefinition<W>,
    data: &'a mut W,
    state: &'a mut WorkflowState,
    sink: &'a dyn Sink,
}

impl<'a, W> Traversal<'a, W> {
    pub(crate) fn new(definition: &'a WorkflowDefinition<W>,
                      data: &'a mut W,
                      state: &'a mut WorkflowState,
                      sink: &'a dyn Sink)
                      -> Self {
        Self { definition,
               data,
               state,
               sink }
    }

    pub fn data(&self) -> &W {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut W {
        &mut *self.data
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Evalúa la decisión `name` y luego la rama correspondiente.
    ///
    /// Con el workflow terminado no hace nada (ni siquiera registra paso).
    pub fn decision(&mut self, name: &str) -> Flow {
        if self.state.is_finished() {
            return Ok(());
        }
        let definition = self.definition;
        let node = definition.decision(name)
                             .ok_or_else(|| EngineError::UnknownNode { node: name.to_string() })?;
        let outcome = (node.predicate)(&*self.data);
        debug!("workflow={} decision={} outcome={}", definition.name(), node.name, outcome);
        self.state.push_step(StepRecord::decision(&node.name, outcome));
        let branch = if outcome { &node.yes } else { &node.no };
        branch(self)
    }

    /// Invoca el entry `name` desde dentro de un cuerpo. Un `stop` dentro del
    /// entry termina sólo ese entry; el cuerpo que lo invocó continúa.
    pub fn entry(&mut self, name: &str) -> Flow {
        let definition = self.definition;
        let node = definition.entry(name)
                             .ok_or_else(|| EngineError::UnknownNode { node: name.to_string() })?;
        self.run_entry(node).map_err(Interrupt::Fault)
    }

    /// Nombre de llamada utilizable por el guard: codificable y distinto del
    /// centinela de fin. Se comprueba antes de tocar el estado para que un
    /// nombre inválido nunca llegue a ejecutar el efecto.
    fn check_call_name(&self, name: &str) -> Result<(), Interrupt> {
        if !is_valid_identifier(name) || name == FINISHED_SENTINEL {
            return Err(CodecError::InvalidIdentifier(name.to_string()).into());
        }
        Ok(())
    }

    /// Consulta el guard. Siempre deja un paso `idempotent_call`, aunque la
    /// respuesta sea negativa.
    pub fn already_called(&mut self, name: &str) -> Result<bool, Interrupt> {
        self.check_call_name(name)?;
        self.state.push_step(StepRecord::idempotent_call(name));
        Ok(self.state.has_call(name))
    }

    /// Marca `name` como ejecutada. No toca entries ni el step log.
    pub fn record_call(&mut self, name: &str) -> Flow {
        self.check_call_name(name)?;
        self.state.record_call(name);
        Ok(())
    }

    /// Ejecuta `action` sólo si `name` no se ejecutó antes en este workflow
    /// lógico, y la registra. Devuelve `None` si se omitió.
    pub fn call_once<R, F>(&mut self, name: &str, action: F) -> Result<Option<R>, Interrupt>
        where F: FnOnce(&mut W) -> R
    {
        if self.already_called(name)? {
            debug!("workflow={} call={} skipped (already executed)", self.definition.name(), name);
            return Ok(None);
        }
        let out = action(&mut *self.data);
        self.state.record_call(name);
        Ok(Some(out))
    }

    /// Estado terminal: registra el centinela y guarda el step log completo.
    pub fn finish(&mut self) -> Flow {
        self.state.record_call(FINISHED_SENTINEL);
        self.state.push_step(StepRecord::finished(FINISHED_SENTINEL));
        self.sink.persist_step_log(self.state.steps())?;
        info!("workflow={} finished after {} steps", self.definition.name(), self.state.steps().len());
        Ok(())
    }

    /// Corta el recorrido actual. Uso: `return t.stop();`
    pub fn stop(&self) -> Flow {
        Err(Interrupt::Stop)
    }

    pub fn steps(&self) -> &[StepRecord] {
        self.state.steps()
    }

    /// Recorrido de construcción: `start` si no hay entries alcanzados, o
    /// replay de cada entry alcanzado en orden de llegada.
    pub(crate) fn resume(&mut self) -> Flow {
        let definition = self.definition;
        if self.state.reached_entry_points().is_empty() {
            debug!("workflow={} fresh start", definition.name());
            return (definition.start)(self);
        }
        let replay: Vec<String> = self.state.reached_entry_points().iter().cloned().collect();
        for id in replay {
            match definition.entry(&id) {
                Some(node) => self.run_entry(node)?,
                None => warn!("workflow={} entry point '{}' no longer declared, skipping", definition.name(), id),
            }
        }
        Ok(())
    }

    /// Envoltorio de un entry: registro, setup, cuerpo (capturando `stop`)
    /// y persistencia inmediata del fingerprint.
    pub(crate) fn run_entry(&mut self, node: &EntryNode<W>) -> Result<(), EngineError> {
        if self.state.is_finished() {
            return Ok(());
        }
        let newly = self.state.reach(&node.name);
        debug!("workflow={} entry={} first_reach={}", self.definition.name(), node.name, newly);
        self.state.push_step(StepRecord::entry_point(&node.name));
        (node.setup)(&mut *self.data);
        catch_stop((node.body)(self))?;
        self.persist()
    }

    pub(crate) fn persist(&mut self) -> Result<(), EngineError> {
        let fingerprint = self.state.fingerprint()?;
        self.sink.persist_fingerprint(&fingerprint)?;
        debug!("workflow={} persisted fingerprint='{}'", self.definition.name(), fingerprint);
        Ok(())
    }
}

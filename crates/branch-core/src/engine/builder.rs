//! Builder de definiciones de workflow.
//!
//! La tabla de nodos se construye una vez por tipo de workflow y se comparte
//! (vía `Arc`) entre todas sus instanciaciones. Cada nodo tiene dos funciones
//! separadas: la función nombrada (predicado o setup) registrada con
//! `predicate`/`setup`, y el envoltorio de recorrido que instala
//! `decision`/`entry`. No hay renombrado: ambas viven en tablas distintas
//! indexadas por el mismo nombre.
//!
//! Ejemplo de uso (comentario):
//!
//! ```ignore
//! let definition = WorkflowBuilder::<Applicant>::new("age_gate")
//!     .predicate("is_adult", |a| a.age >= 18)
//!     .start(|t| t.decision("is_adult"))
//!     .decision("is_adult",
//!               Branches::<Applicant>::new().yes(|t| { t.record_call("grant_access") })
//!                              .no(|_| Ok(())))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::codec::is_valid_identifier;
use crate::constants::FINISHED_SENTINEL;
use crate::engine::traversal::Traversal;
use crate::errors::{DefinitionError, Flow};

/// Predicado de una decisión.
pub type Predicate<W> = Arc<dyn Fn(&W) -> bool + Send + Sync>;
/// Función de setup de un entry point.
pub type Setup<W> = Arc<dyn Fn(&mut W) + Send + Sync>;
/// Cuerpo de rama: bloque de más decisiones/entries evaluado con un contexto
/// de recorrido explícito.
pub type Body<W> = Arc<dyn for<'t> Fn(&mut Traversal<'t, W>) -> Flow + Send + Sync>;

/// Ramas de una decisión. Ambas son obligatorias; la validación ocurre en
/// `WorkflowBuilder::build`.
pub struct Branches<W> {
    yes: Option<Body<W>>,
    no: Option<Body<W>>,
}

impl<W: 'static> Branches<W> {
    pub fn new() -> Self {
        Self { yes: None, no: None }
    }

    pub fn yes<F>(mut self, body: F) -> Self
        where F: Fn(&mut Traversal<'_, W>) -> Flow + Send + Sync + 'static
    {
        let body: Body<W> = Arc::new(body);
        self.yes = Some(body);
        self
    }

    pub fn no<F>(mut self, body: F) -> Self
        where F: Fn(&mut Traversal<'_, W>) -> Flow + Send + Sync + 'static
    {
        let body: Body<W> = Arc::new(body);
        self.no = Some(body);
        self
    }
}

impl<W: 'static> Default for Branches<W> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DecisionNode<W> {
    pub(crate) name: String,
    pub(crate) predicate: Predicate<W>,
    pub(crate) yes: Body<W>,
    pub(crate) no: Body<W>,
}

pub struct EntryNode<W> {
    pub(crate) name: String,
    pub(crate) setup: Setup<W>,
    pub(crate) body: Body<W>,
}

impl<W> EntryNode<W> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Tabla de nodos inmutable de un tipo de workflow.
pub struct WorkflowDefinition<W> {
    name: String,
    pub(crate) start: Body<W>,
    decisions: HashMap<String, DecisionNode<W>>,
    entries: IndexMap<String, EntryNode<W>>,
}

impl<W> WorkflowDefinition<W> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decision(&self, name: &str) -> Option<&DecisionNode<W>> {
        self.decisions.get(name)
    }

    pub fn entry(&self, name: &str) -> Option<&EntryNode<W>> {
        self.entries.get(name)
    }

    /// Entries en orden de declaración.
    pub fn entry_names(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    pub fn decision_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decisions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl<W> std::fmt::Debug for WorkflowDefinition<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
         .field("name", &self.name)
         .field("decisions", &self.decision_names())
         .field("entries", &self.entry_names())
         .finish()
    }
}

pub struct WorkflowBuilder<W> {
    name: String,
    predicates: HashMap<String, Predicate<W>>,
    setups: HashMap<String, Setup<W>>,
    start: Option<Body<W>>,
    decisions: Vec<(String, Branches<W>)>,
    entries: Vec<(String, Body<W>)>,
}

impl<W: 'static> WorkflowBuilder<W> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               predicates: HashMap::new(),
               setups: HashMap::new(),
               start: None,
               decisions: Vec::new(),
               entries: Vec::new() }
    }

    /// Registra la función booleana que usará la decisión del mismo nombre.
    pub fn predicate<F>(mut self, name: impl Into<String>, f: F) -> Self
        where F: Fn(&W) -> bool + Send + Sync + 'static
    {
        let predicate: Predicate<W> = Arc::new(f);
        self.predicates.insert(name.into(), predicate);
        self
    }

    /// Registra la función de setup del entry point del mismo nombre.
    pub fn setup<F>(mut self, name: impl Into<String>, f: F) -> Self
        where F: Fn(&mut W) + Send + Sync + 'static
    {
        let setup: Setup<W> = Arc::new(f);
        self.setups.insert(name.into(), setup);
        self
    }

    /// Cuerpo raíz; se ejecuta cuando aún no se alcanzó ningún entry point.
    pub fn start<F>(mut self, body: F) -> Self
        where F: Fn(&mut Traversal<'_, W>) -> Flow + Send + Sync + 'static
    {
        let body: Body<W> = Arc::new(body);
        self.start = Some(body);
        self
    }

    pub fn decision(mut self, name: impl Into<String>, branches: Branches<W>) -> Self {
        self.decisions.push((name.into(), branches));
        self
    }

    pub fn entry<F>(mut self, name: impl Into<String>, body: F) -> Self
        where F: Fn(&mut Traversal<'_, W>) -> Flow + Send + Sync + 'static
    {
        let body: Body<W> = Arc::new(body);
        self.entries.push((name.into(), body));
        self
    }

    /// Valida la definición completa y congela la tabla de nodos.
    pub fn build(self) -> Result<Arc<WorkflowDefinition<W>>, DefinitionError> {
        let start = self.start.ok_or(DefinitionError::MissingStart)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut claim = |name: &str| -> Result<(), DefinitionError> {
            if !is_valid_identifier(name) || name == FINISHED_SENTINEL {
                return Err(DefinitionError::InvalidIdentifier { identifier: name.to_string() });
            }
            if !seen.insert(name.to_string()) {
                return Err(DefinitionError::DuplicateNode { node: name.to_string() });
            }
            Ok(())
        };

        let mut decisions = HashMap::with_capacity(self.decisions.len());
        for (name, branches) in self.decisions {
            claim(&name)?;
            let predicate = self.predicates
                                .get(&name)
                                .cloned()
                                .ok_or_else(|| DefinitionError::MissingPredicate { node: name.clone() })?;
            let (yes, no) = match (branches.yes, branches.no) {
                (Some(yes), Some(no)) => (yes, no),
                _ => return Err(DefinitionError::IncompleteBranches { node: name }),
            };
            decisions.insert(name.clone(),
                             DecisionNode { name,
                                            predicate,
                                            yes,
                                            no });
        }

        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (name, body) in self.entries {
            claim(&name)?;
            let setup = self.setups
                            .get(&name)
                            .cloned()
                            .ok_or_else(|| DefinitionError::MissingPredicate { node: name.clone() })?;
            entries.insert(name.clone(), EntryNode { name, setup, body });
        }

        Ok(Arc::new(WorkflowDefinition { name: self.name,
                                         start,
                                         decisions,
                                         entries }))
    }
}

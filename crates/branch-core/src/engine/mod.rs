//! Motor de workflows de decisión reanudables.
//!
//! - `builder`: tabla de nodos (decisiones, entries, start) por tipo de workflow.
//! - `traversal`: contexto que reciben los cuerpos de rama.
//! - `core`: `Workflow`, la instanciación que decodifica, recorre y persiste.

pub mod builder;
pub mod core;
pub mod traversal;

pub use builder::{Branches, WorkflowBuilder, WorkflowDefinition};
pub use self::core::Workflow;
pub use traversal::Traversal;

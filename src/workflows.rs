//! Workflows de ejemplo.
//!
//! - `age_gate`: una sola decisión; sin entries, así que cada instanciación
//!   vuelve a evaluar `start`.
//! - `document_review`: envío de documentos con revisión externa. Cada
//!   evento (revisión recibida, reenvío) llega como una invocación de entry
//!   point sobre una instancia recién abierta.
use std::sync::Arc;

use branch_core::{Branches, DefinitionError, WorkflowBuilder, WorkflowDefinition};

#[derive(Debug, Clone, Default)]
pub struct Applicant {
    pub age: u32,
    pub granted: bool,
}

pub fn age_gate() -> Result<Arc<WorkflowDefinition<Applicant>>, DefinitionError> {
    WorkflowBuilder::<Applicant>::new("age_gate").predicate("is_adult", |a: &Applicant| a.age >= 18)
                                    .start(|t| t.decision("is_adult"))
                                    .decision("is_adult",
                                              Branches::<Applicant>::new().yes(|t| {
                                                                 t.call_once("grant_access", |a| a.granted = true)?;
                                                                 Ok(())
                                                             })
                                                             .no(|_| Ok(())))
                                    .build()
}

/// Datos de una instanciación de `document_review`. Lo que llega con cada
/// evento se carga aquí antes de invocar el entry correspondiente.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub pages: u32,
    pub reviewer_approves: bool,
    pub reviews_seen: u32,
    /// Efectos "externos" realizados por esta instanciación.
    pub outbox: Vec<String>,
}

impl Submission {
    pub fn new(pages: u32) -> Self {
        Self { pages,
               ..Self::default() }
    }
}

pub fn document_review() -> Result<Arc<WorkflowDefinition<Submission>>, DefinitionError> {
    WorkflowBuilder::<Submission>::new("document_review")
        .predicate("has_pages", |s: &Submission| s.pages > 0)
        .predicate("approved", |s: &Submission| s.reviewer_approves)
        .setup("review_received", |s: &mut Submission| s.reviews_seen += 1)
        .setup("resubmitted", |_: &mut Submission| {})
        .start(|t| t.decision("has_pages"))
        .decision("has_pages",
                  Branches::<Submission>::new().yes(|t| {
                                     t.call_once("notify_reviewer", |s| s.outbox.push("reviewer notified".into()))?;
                                     t.stop()
                                 })
                                 .no(|t| {
                                     t.call_once("reject_empty", |s| s.outbox.push("empty submission rejected".into()))?;
                                     t.finish()
                                 }))
        .entry("review_received", |t| t.decision("approved"))
        .decision("approved",
                  Branches::<Submission>::new().yes(|t| {
                                     t.call_once("publish", |s| s.outbox.push("document published".into()))?;
                                     t.finish()
                                 })
                                 .no(|t| {
                                     t.call_once("request_changes", |s| s.outbox.push("changes requested".into()))?;
                                     Ok(())
                                 }))
        .entry("resubmitted", |t| {
            if t.already_called("notify_reviewer_again")? {
                return t.stop();
            }
            t.data_mut().outbox.push("reviewer notified again".into());
            t.record_call("notify_reviewer_again")
        })
        .build()
}

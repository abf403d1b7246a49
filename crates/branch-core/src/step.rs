//! Registro de pasos (`StepRecord`).
//!
//! Cada evento del recorrido deja un par `(kind, detail)`. Sirve sólo para
//! auditoría e introspección: el motor nunca toma decisiones leyendo el log.
use serde::{Deserialize, Serialize};

use crate::constants::{DECISION_NO, DECISION_YES, ENTRY_POINT_STEP, FINISHED_STEP, IDEMPOTENT_CALL_STEP};

/// Par inmutable que describe un evento del recorrido.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRecord {
    kind: String,
    detail: String,
}

impl StepRecord {
    pub fn new(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { kind: kind.into(),
               detail: detail.into() }
    }

    /// Resultado de una decisión: `{name, "YES"|"NO"}`.
    pub fn decision(name: &str, outcome: bool) -> Self {
        Self::new(name, if outcome { DECISION_YES } else { DECISION_NO })
    }

    pub fn entry_point(name: &str) -> Self {
        Self::new(ENTRY_POINT_STEP, name)
    }

    pub fn idempotent_call(name: &str) -> Self {
        Self::new(IDEMPOTENT_CALL_STEP, name)
    }

    pub fn finished(sentinel: &str) -> Self {
        Self::new(FINISHED_STEP, sentinel)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl std::fmt::Display for StepRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_records_yes_and_no() {
        assert_eq!(StepRecord::decision("is_adult", true), StepRecord::new("is_adult", "YES"));
        assert_eq!(StepRecord::decision("is_adult", false).detail(), "NO");
    }

    #[test]
    fn step_record_serializes_as_kind_detail_pair() {
        let json = serde_json::to_value(StepRecord::entry_point("review")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "Entry Point", "detail": "review"}));
    }
}

//! Constantes del motor core.
//!
//! Los nombres de aquí forman parte del formato persistido (fingerprint y
//! step log). Cambiarlos rompe la reanudación de workflows ya guardados.

/// Nombre reservado que `finish()` registra en las llamadas ejecutadas.
/// Su presencia marca el workflow como terminado para siempre.
pub const FINISHED_SENTINEL: &str = "__workflow_finished__";

/// Separador entre el grupo de entry points y el grupo de llamadas.
pub const GROUP_SEPARATOR: char = ':';

/// Separador entre identificadores dentro de un mismo grupo.
pub const ITEM_SEPARATOR: char = '/';

/// `kind` del step registrado al alcanzar un entry point.
pub const ENTRY_POINT_STEP: &str = "Entry Point";

/// `kind` del step registrado por cada consulta al guard.
pub const IDEMPOTENT_CALL_STEP: &str = "idempotent_call";

/// `kind` del step registrado por `finish()`.
pub const FINISHED_STEP: &str = "Workflow Finished";

pub const DECISION_YES: &str = "YES";
pub const DECISION_NO: &str = "NO";

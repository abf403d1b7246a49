//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    workflow_positions (flow_id) {
        flow_id -> Uuid,
        fingerprint -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    workflow_step_logs (flow_id, position) {
        flow_id -> Uuid,
        position -> Integer,
        kind -> Text,
        detail -> Text,
        recorded_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    workflow_positions,
    workflow_step_logs,
);

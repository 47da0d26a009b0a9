//! Schema Diesel, mantenido a mano. Reemplazable con `diesel print-schema`.

diesel::table! {
    step_state (experiment_id, step_id, scope) {
        experiment_id -> Uuid,
        step_id -> Text,
        scope -> Text,
        payload -> Jsonb,
        updated_at -> Timestamptz,
    }
}

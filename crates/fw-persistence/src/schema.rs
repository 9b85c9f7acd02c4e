//! Esquema Diesel de la LaunchPad (mantenido a mano, igual a la migración
//! `launchpad_init`).

diesel::table! {
    fw_id_counters (kind) {
        kind -> Text,
        value -> BigInt,
    }
}

diesel::table! {
    workflows (wf_id) {
        wf_id -> BigInt,
        name -> Text,
        metadata -> Jsonb,
        fw_ids -> Array<BigInt>,
        links -> Jsonb,
        created_on -> Timestamptz,
        updated_on -> Timestamptz,
    }
}

diesel::table! {
    fireworks (fw_id) {
        fw_id -> BigInt,
        wf_id -> BigInt,
        name -> Text,
        spec -> Jsonb,
        priority -> Integer,
        state -> Text,
        defused -> Bool,
        revision -> BigInt,
        current_launch -> Nullable<BigInt>,
        launch_ids -> Array<BigInt>,
        created_on -> Timestamptz,
        updated_on -> Timestamptz,
    }
}

diesel::table! {
    launches (launch_id) {
        launch_id -> BigInt,
        fw_id -> BigInt,
        state -> Text,
        reservation_id -> Uuid,
        worker -> Nullable<Text>,
        reserved_on -> Timestamptz,
        reservation_expires -> Timestamptz,
        started_on -> Nullable<Timestamptz>,
        last_heartbeat -> Nullable<Timestamptz>,
        finished_on -> Nullable<Timestamptz>,
        result -> Nullable<Jsonb>,
        fizzle_reason -> Nullable<Text>,
        superseded -> Bool,
        state_history -> Jsonb,
    }
}

diesel::joinable!(fireworks -> workflows (wf_id));
diesel::joinable!(launches -> fireworks (fw_id));

diesel::allow_tables_to_appear_in_same_query!(fw_id_counters, workflows, fireworks, launches,);

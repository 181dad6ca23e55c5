diesel::table! {
    pipelines (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    pipeline_stages (id) {
        id -> Uuid,
        pipeline_id -> Uuid,
        name -> Varchar,
        color -> Varchar,
        stage_order -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    contacts (id) {
        id -> Uuid,
        company_id -> Uuid,
        first_name -> Varchar,
        last_name -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deals (id) {
        id -> Uuid,
        company_id -> Uuid,
        pipeline_id -> Uuid,
        stage_id -> Uuid,
        contact_id -> Uuid,
        organisation_id -> Nullable<Uuid>,
        name -> Varchar,
        amount -> Float8,
        probability -> Int4,
        expected_close_date -> Nullable<Date>,
        notes -> Nullable<Text>,
        status -> Varchar,
        priority -> Varchar,
        position -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    contact_pipeline_stages (contact_id, pipeline_id) {
        contact_id -> Uuid,
        pipeline_id -> Uuid,
        stage_id -> Uuid,
        estimated_value -> Nullable<Float8>,
        notes -> Nullable<Text>,
        position -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    automations (id) {
        id -> Uuid,
        pipeline_id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        trigger -> Varchar,
        conditions -> Jsonb,
        actions -> Jsonb,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    datasets (id) {
        id -> Uuid,
        company_id -> Uuid,
        name -> Varchar,
        description -> Text,
        dataset_type -> Varchar,
        webhook_id -> Nullable<Varchar>,
        webhook_secret -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    data_records (id) {
        id -> Uuid,
        dataset_id -> Uuid,
        data -> Jsonb,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(pipeline_stages -> pipelines (pipeline_id));
diesel::joinable!(deals -> pipeline_stages (stage_id));
diesel::joinable!(deals -> contacts (contact_id));
diesel::joinable!(contact_pipeline_stages -> pipeline_stages (stage_id));
diesel::joinable!(automations -> pipelines (pipeline_id));
diesel::joinable!(data_records -> datasets (dataset_id));

diesel::allow_tables_to_appear_in_same_query!(
    pipelines,
    pipeline_stages,
    contacts,
    deals,
    contact_pipeline_stages,
    automations,
    datasets,
    data_records,
);

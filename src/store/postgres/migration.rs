pub fn create_crm_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS pipelines (
        id UUID PRIMARY KEY,
        company_id UUID NOT NULL,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_pipelines_company ON pipelines(company_id);

    CREATE TABLE IF NOT EXISTS pipeline_stages (
        id UUID PRIMARY KEY,
        pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
        name VARCHAR(255) NOT NULL,
        color VARCHAR(32) NOT NULL,
        stage_order INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT pipeline_stages_order_key UNIQUE (pipeline_id, stage_order)
            DEFERRABLE INITIALLY DEFERRED
    );

    CREATE TABLE IF NOT EXISTS contacts (
        id UUID PRIMARY KEY,
        company_id UUID NOT NULL,
        first_name VARCHAR(255) NOT NULL,
        last_name VARCHAR(255),
        email VARCHAR(255),
        phone VARCHAR(64),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_contacts_company ON contacts(company_id);

    CREATE TABLE IF NOT EXISTS deals (
        id UUID PRIMARY KEY,
        company_id UUID NOT NULL,
        pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
        stage_id UUID NOT NULL REFERENCES pipeline_stages(id),
        contact_id UUID NOT NULL REFERENCES contacts(id),
        organisation_id UUID,
        name VARCHAR(255) NOT NULL,
        amount DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (amount >= 0),
        probability INTEGER NOT NULL DEFAULT 0 CHECK (probability BETWEEN 0 AND 100),
        expected_close_date DATE,
        notes TEXT,
        status VARCHAR(16) NOT NULL DEFAULT 'Open',
        priority VARCHAR(16) NOT NULL DEFAULT 'Medium',
        position INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT deals_stage_position_key UNIQUE (stage_id, position)
            DEFERRABLE INITIALLY DEFERRED
    );

    CREATE INDEX IF NOT EXISTS idx_deals_company ON deals(company_id);
    CREATE INDEX IF NOT EXISTS idx_deals_pipeline ON deals(pipeline_id);
    CREATE INDEX IF NOT EXISTS idx_deals_contact ON deals(contact_id);

    CREATE TABLE IF NOT EXISTS contact_pipeline_stages (
        contact_id UUID NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
        pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
        stage_id UUID NOT NULL REFERENCES pipeline_stages(id),
        estimated_value DOUBLE PRECISION,
        notes TEXT,
        position INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (contact_id, pipeline_id),
        CONSTRAINT contact_pipeline_stages_position_key UNIQUE (stage_id, position)
            DEFERRABLE INITIALLY DEFERRED
    );

    CREATE TABLE IF NOT EXISTS automations (
        id UUID PRIMARY KEY,
        pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
        name VARCHAR(255) NOT NULL,
        description TEXT,
        trigger VARCHAR(32) NOT NULL,
        conditions JSONB NOT NULL DEFAULT '[]',
        actions JSONB NOT NULL DEFAULT '[]',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_automations_pipeline ON automations(pipeline_id);
    "#
}

pub fn create_dataset_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS datasets (
        id UUID PRIMARY KEY,
        company_id UUID NOT NULL,
        name VARCHAR(255) NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        dataset_type VARCHAR(16) NOT NULL DEFAULT 'manual',
        webhook_id VARCHAR(64) UNIQUE,
        webhook_secret VARCHAR(128),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_datasets_company ON datasets(company_id);

    CREATE TABLE IF NOT EXISTS data_records (
        id UUID PRIMARY KEY,
        dataset_id UUID NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
        data JSONB NOT NULL DEFAULT '{}',
        metadata JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_data_records_dataset ON data_records(dataset_id, created_at);
    "#
}

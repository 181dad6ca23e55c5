use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{
    AutomationChanges, AutomationRow, ContactChanges, ContactRow, DealChanges, DealRow,
    PipelineRow, PlacementRow, StageRow,
};
use super::PgStore;
use crate::core::shared::schema::{
    automations, contact_pipeline_stages, contacts, deals, pipeline_stages, pipelines,
};
use crate::crm::ordering::{self, Placement, PositionChange};
use crate::crm::types::{
    Automation, Contact, ContactPlacement, Deal, DealFilter, Pipeline, Stage,
    UpdateAutomationRequest, UpdateContactRequest, UpdateDealRequest, UpdatePipelineRequest,
    UpdatePlacementRequest, UpdateStageRequest,
};
use crate::store::{
    CrmStore, MoveCommand, MoveOutcome, MoveTarget, NewAutomation, NewContact, NewDeal,
    NewPipeline, NewPlacement, NewStage, StoreError, StoreResult, CONTACT_ALREADY_PLACED,
    CONTACT_HAS_DEALS, SOURCE_STAGE_MISMATCH, STAGE_NOT_EMPTY,
};

fn not_found(what: &str) -> StoreError {
    StoreError::NotFound(what.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Database(e.to_string()))
}

fn load_stages(conn: &mut PgConnection, pipeline_id: Uuid) -> StoreResult<Vec<Stage>> {
    let rows: Vec<StageRow> = pipeline_stages::table
        .filter(pipeline_stages::pipeline_id.eq(pipeline_id))
        .order(pipeline_stages::stage_order.asc())
        .select(StageRow::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(Stage::from).collect())
}

fn load_pipeline(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Pipeline>> {
    let row: Option<PipelineRow> = pipelines::table
        .find(id)
        .select(PipelineRow::as_select())
        .first(conn)
        .optional()?;
    match row {
        Some(row) => {
            let stages = load_stages(conn, row.id)?;
            Ok(Some(row.into_pipeline(stages)))
        }
        None => Ok(None),
    }
}

/// Takes row locks on the given stages in id order so that concurrent movers
/// touching the same lanes queue up instead of deadlocking.
fn lock_stages(conn: &mut PgConnection, ids: &[Uuid]) -> StoreResult<()> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    let locked: Vec<Uuid> = pipeline_stages::table
        .filter(pipeline_stages::id.eq_any(&ids))
        .order(pipeline_stages::id.asc())
        .select(pipeline_stages::id)
        .for_update()
        .load(conn)?;
    if locked.len() != ids.len() {
        return Err(not_found("Stage"));
    }
    Ok(())
}

fn deal_lane(conn: &mut PgConnection, stage_id: Uuid) -> StoreResult<Vec<Placement>> {
    let rows: Vec<DealRow> = deals::table
        .filter(deals::stage_id.eq(stage_id))
        .order((deals::position.asc(), deals::created_at.asc()))
        .select(DealRow::as_select())
        .load(conn)?;
    Ok(rows.iter().map(DealRow::placement).collect())
}

fn contact_lane(conn: &mut PgConnection, stage_id: Uuid) -> StoreResult<Vec<Placement>> {
    let rows: Vec<PlacementRow> = contact_pipeline_stages::table
        .filter(contact_pipeline_stages::stage_id.eq(stage_id))
        .order((
            contact_pipeline_stages::position.asc(),
            contact_pipeline_stages::created_at.asc(),
        ))
        .select(PlacementRow::as_select())
        .load(conn)?;
    Ok(rows.iter().map(PlacementRow::placement).collect())
}

fn apply_deal_changes(conn: &mut PgConnection, changes: &[PositionChange]) -> StoreResult<()> {
    for change in changes {
        diesel::update(deals::table.find(change.id))
            .set((
                deals::stage_id.eq(change.stage_id),
                deals::position.eq(change.position),
            ))
            .execute(conn)?;
    }
    Ok(())
}

fn apply_contact_changes(
    conn: &mut PgConnection,
    pipeline_id: Uuid,
    changes: &[PositionChange],
) -> StoreResult<()> {
    for change in changes {
        diesel::update(contact_pipeline_stages::table.find((change.id, pipeline_id)))
            .set((
                contact_pipeline_stages::stage_id.eq(change.stage_id),
                contact_pipeline_stages::position.eq(change.position),
            ))
            .execute(conn)?;
    }
    Ok(())
}

fn touch_deal(conn: &mut PgConnection, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
    diesel::update(deals::table.find(id))
        .set(deals::updated_at.eq(now))
        .execute(conn)?;
    Ok(())
}

#[async_trait]
impl CrmStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        self.run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_pipelines(&self, company_id: Uuid) -> StoreResult<Vec<Pipeline>> {
        self.run(move |conn| {
            let rows: Vec<PipelineRow> = pipelines::table
                .filter(pipelines::company_id.eq(company_id))
                .order(pipelines::created_at.asc())
                .select(PipelineRow::as_select())
                .load(conn)?;

            let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
            let stage_rows: Vec<StageRow> = pipeline_stages::table
                .filter(pipeline_stages::pipeline_id.eq_any(&ids))
                .order(pipeline_stages::stage_order.asc())
                .select(StageRow::as_select())
                .load(conn)?;

            let mut by_pipeline: HashMap<Uuid, Vec<Stage>> = HashMap::new();
            for stage in stage_rows {
                by_pipeline
                    .entry(stage.pipeline_id)
                    .or_default()
                    .push(Stage::from(stage));
            }

            Ok(rows
                .into_iter()
                .map(|row| {
                    let stages = by_pipeline.remove(&row.id).unwrap_or_default();
                    row.into_pipeline(stages)
                })
                .collect())
        })
        .await
    }

    async fn get_pipeline(&self, id: Uuid) -> StoreResult<Option<Pipeline>> {
        self.run(move |conn| load_pipeline(conn, id)).await
    }

    async fn insert_pipeline(&self, new: NewPipeline) -> StoreResult<Pipeline> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                let now = Utc::now();
                let row = PipelineRow {
                    id: Uuid::new_v4(),
                    company_id: new.company_id,
                    name: new.name,
                    description: new.description,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(pipelines::table)
                    .values(&row)
                    .execute(conn)?;

                let stage_rows: Vec<StageRow> = new
                    .stages
                    .into_iter()
                    .enumerate()
                    .map(|(order, stage)| StageRow {
                        id: Uuid::new_v4(),
                        pipeline_id: row.id,
                        name: stage.name,
                        color: stage.color,
                        stage_order: order as i32,
                        created_at: now,
                    })
                    .collect();
                if !stage_rows.is_empty() {
                    diesel::insert_into(pipeline_stages::table)
                        .values(&stage_rows)
                        .execute(conn)?;
                }

                let stages = stage_rows.into_iter().map(Stage::from).collect();
                Ok(row.into_pipeline(stages))
            })
        })
        .await
    }

    async fn update_pipeline(&self, id: Uuid, patch: UpdatePipelineRequest) -> StoreResult<Pipeline> {
        self.run(move |conn| {
            let now = Utc::now();
            let updated = diesel::update(pipelines::table.find(id))
                .set((
                    patch.name.map(|n| pipelines::name.eq(n)),
                    patch.description.map(|d| pipelines::description.eq(Some(d))),
                    pipelines::updated_at.eq(now),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(not_found("Pipeline"));
            }
            load_pipeline(conn, id)?.ok_or_else(|| not_found("Pipeline"))
        })
        .await
    }

    async fn delete_pipeline(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                diesel::delete(automations::table.filter(automations::pipeline_id.eq(id)))
                    .execute(conn)?;
                diesel::delete(
                    contact_pipeline_stages::table
                        .filter(contact_pipeline_stages::pipeline_id.eq(id)),
                )
                .execute(conn)?;
                diesel::delete(deals::table.filter(deals::pipeline_id.eq(id))).execute(conn)?;
                diesel::delete(pipeline_stages::table.filter(pipeline_stages::pipeline_id.eq(id)))
                    .execute(conn)?;
                let deleted = diesel::delete(pipelines::table.find(id)).execute(conn)?;
                if deleted == 0 {
                    return Err(not_found("Pipeline"));
                }
                Ok(())
            })
        })
        .await
    }

    async fn get_stage(&self, id: Uuid) -> StoreResult<Option<Stage>> {
        self.run(move |conn| {
            let row: Option<StageRow> = pipeline_stages::table
                .find(id)
                .select(StageRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(Stage::from))
        })
        .await
    }

    async fn insert_stage(&self, pipeline_id: Uuid, new: NewStage) -> StoreResult<Stage> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                pipelines::table
                    .find(pipeline_id)
                    .select(pipelines::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .optional()?
                    .ok_or_else(|| not_found("Pipeline"))?;

                let max_order: Option<i32> = pipeline_stages::table
                    .filter(pipeline_stages::pipeline_id.eq(pipeline_id))
                    .select(diesel::dsl::max(pipeline_stages::stage_order))
                    .first(conn)?;

                let row = StageRow {
                    id: Uuid::new_v4(),
                    pipeline_id,
                    name: new.name,
                    color: new.color,
                    stage_order: max_order.map_or(0, |m| m + 1),
                    created_at: Utc::now(),
                };
                diesel::insert_into(pipeline_stages::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(Stage::from(row))
            })
        })
        .await
    }

    async fn update_stage(&self, id: Uuid, patch: UpdateStageRequest) -> StoreResult<Stage> {
        self.run(move |conn| {
            if patch.name.is_some() || patch.color.is_some() {
                diesel::update(pipeline_stages::table.find(id))
                    .set((
                        patch.name.map(|n| pipeline_stages::name.eq(n)),
                        patch.color.map(|c| pipeline_stages::color.eq(c)),
                    ))
                    .execute(conn)?;
            }
            let row: StageRow = pipeline_stages::table
                .find(id)
                .select(StageRow::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| not_found("Stage"))?;
            Ok(Stage::from(row))
        })
        .await
    }

    async fn delete_stage(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                lock_stages(conn, &[id])?;

                let deal_count: i64 = deals::table
                    .filter(deals::stage_id.eq(id))
                    .count()
                    .get_result(conn)?;
                let contact_count: i64 = contact_pipeline_stages::table
                    .filter(contact_pipeline_stages::stage_id.eq(id))
                    .count()
                    .get_result(conn)?;
                if deal_count + contact_count > 0 {
                    return Err(StoreError::Conflict(STAGE_NOT_EMPTY.to_string()));
                }

                diesel::delete(pipeline_stages::table.find(id)).execute(conn)?;
                Ok(())
            })
        })
        .await
    }

    async fn reorder_stages(&self, pipeline_id: Uuid, orders: Vec<(Uuid, i32)>) -> StoreResult<Vec<Stage>> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                for (id, order) in &orders {
                    let updated = diesel::update(
                        pipeline_stages::table
                            .filter(pipeline_stages::id.eq(id))
                            .filter(pipeline_stages::pipeline_id.eq(pipeline_id)),
                    )
                    .set(pipeline_stages::stage_order.eq(order))
                    .execute(conn)?;
                    if updated == 0 {
                        return Err(not_found("Stage"));
                    }
                }
                load_stages(conn, pipeline_id)
            })
        })
        .await
    }

    async fn list_contacts(&self, company_id: Uuid) -> StoreResult<Vec<Contact>> {
        self.run(move |conn| {
            let rows: Vec<ContactRow> = contacts::table
                .filter(contacts::company_id.eq(company_id))
                .order(contacts::created_at.desc())
                .select(ContactRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(Contact::from).collect())
        })
        .await
    }

    async fn get_contact(&self, id: Uuid) -> StoreResult<Option<Contact>> {
        self.run(move |conn| {
            let row: Option<ContactRow> = contacts::table
                .find(id)
                .select(ContactRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(Contact::from))
        })
        .await
    }

    async fn insert_contact(&self, new: NewContact) -> StoreResult<Contact> {
        self.run(move |conn| {
            let now = Utc::now();
            let row = ContactRow {
                id: Uuid::new_v4(),
                company_id: new.company_id,
                first_name: new.first_name,
                last_name: new.last_name,
                email: new.email,
                phone: new.phone,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(contacts::table)
                .values(&row)
                .execute(conn)?;
            Ok(Contact::from(row))
        })
        .await
    }

    async fn update_contact(&self, id: Uuid, patch: UpdateContactRequest) -> StoreResult<Contact> {
        self.run(move |conn| {
            let changes = ContactChanges {
                first_name: patch.first_name,
                last_name: patch.last_name,
                email: patch.email,
                phone: patch.phone,
                updated_at: Some(Utc::now()),
            };
            let row: ContactRow = diesel::update(contacts::table.find(id))
                .set(&changes)
                .returning(ContactRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| not_found("Contact"))?;
            Ok(Contact::from(row))
        })
        .await
    }

    async fn delete_contact(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                let referenced: i64 = deals::table
                    .filter(deals::contact_id.eq(id))
                    .count()
                    .get_result(conn)?;
                if referenced > 0 {
                    return Err(StoreError::Conflict(CONTACT_HAS_DEALS.to_string()));
                }

                let placements = contact_pipeline_stages::table
                    .filter(contact_pipeline_stages::contact_id.eq(id))
                    .select(PlacementRow::as_select())
                    .load(conn)?;
                let stage_ids: Vec<Uuid> = placements.iter().map(|p| p.stage_id).collect();
                lock_stages(conn, &stage_ids)?;

                diesel::delete(
                    contact_pipeline_stages::table
                        .filter(contact_pipeline_stages::contact_id.eq(id)),
                )
                .execute(conn)?;
                for placement in &placements {
                    let changes = ordering::plan_compaction(&contact_lane(conn, placement.stage_id)?);
                    apply_contact_changes(conn, placement.pipeline_id, &changes)?;
                }

                let deleted = diesel::delete(contacts::table.find(id)).execute(conn)?;
                if deleted == 0 {
                    return Err(not_found("Contact"));
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_deals(&self, company_id: Uuid, filter: DealFilter) -> StoreResult<Vec<Deal>> {
        self.run(move |conn| {
            let mut query = deals::table
                .filter(deals::company_id.eq(company_id))
                .select(DealRow::as_select())
                .into_boxed();
            if let Some(pipeline_id) = filter.pipeline_id {
                query = query.filter(deals::pipeline_id.eq(pipeline_id));
            }
            if let Some(stage_id) = filter.stage_id {
                query = query.filter(deals::stage_id.eq(stage_id));
            }
            let rows: Vec<DealRow> = query
                .order((
                    deals::stage_id.asc(),
                    deals::position.asc(),
                    deals::created_at.asc(),
                ))
                .load(conn)?;
            rows.into_iter().map(Deal::try_from).collect()
        })
        .await
    }

    async fn get_deal(&self, id: Uuid) -> StoreResult<Option<Deal>> {
        self.run(move |conn| {
            let row: Option<DealRow> = deals::table
                .find(id)
                .select(DealRow::as_select())
                .first(conn)
                .optional()?;
            row.map(Deal::try_from).transpose()
        })
        .await
    }

    async fn insert_deal(&self, new: NewDeal) -> StoreResult<Deal> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                lock_stages(conn, &[new.stage_id])?;
                let position = ordering::next_position(&deal_lane(conn, new.stage_id)?);

                let now = Utc::now();
                let row = DealRow {
                    id: Uuid::new_v4(),
                    company_id: new.company_id,
                    pipeline_id: new.pipeline_id,
                    stage_id: new.stage_id,
                    contact_id: new.contact_id,
                    organisation_id: new.organisation_id,
                    name: new.name,
                    amount: new.amount,
                    probability: new.probability,
                    expected_close_date: new.expected_close_date,
                    notes: new.notes,
                    status: new.status.as_str().to_string(),
                    priority: new.priority.as_str().to_string(),
                    position,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(deals::table).values(&row).execute(conn)?;
                Deal::try_from(row)
            })
        })
        .await
    }

    async fn update_deal(&self, id: Uuid, patch: UpdateDealRequest) -> StoreResult<Deal> {
        self.run(move |conn| {
            let changes = DealChanges {
                name: patch.name,
                amount: patch.amount,
                probability: patch.probability,
                expected_close_date: patch.expected_close_date,
                notes: patch.notes,
                status: patch.status.map(|s| s.as_str().to_string()),
                priority: patch.priority.map(|p| p.as_str().to_string()),
                organisation_id: patch.organisation_id,
                updated_at: Some(Utc::now()),
            };
            let row: DealRow = diesel::update(deals::table.find(id))
                .set(&changes)
                .returning(DealRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| not_found("Deal"))?;
            Deal::try_from(row)
        })
        .await
    }

    async fn delete_deal(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                let stage_id: Uuid = deals::table
                    .find(id)
                    .select(deals::stage_id)
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| not_found("Deal"))?;
                lock_stages(conn, &[stage_id])?;

                diesel::delete(deals::table.find(id)).execute(conn)?;
                let changes = ordering::plan_compaction(&deal_lane(conn, stage_id)?);
                apply_deal_changes(conn, &changes)
            })
        })
        .await
    }

    async fn list_placements(&self, pipeline_id: Uuid) -> StoreResult<Vec<ContactPlacement>> {
        self.run(move |conn| {
            let rows: Vec<PlacementRow> = contact_pipeline_stages::table
                .filter(contact_pipeline_stages::pipeline_id.eq(pipeline_id))
                .order((
                    contact_pipeline_stages::stage_id.asc(),
                    contact_pipeline_stages::position.asc(),
                    contact_pipeline_stages::created_at.asc(),
                ))
                .select(PlacementRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(ContactPlacement::from).collect())
        })
        .await
    }

    async fn get_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<Option<ContactPlacement>> {
        self.run(move |conn| {
            let row: Option<PlacementRow> = contact_pipeline_stages::table
                .find((contact_id, pipeline_id))
                .select(PlacementRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(ContactPlacement::from))
        })
        .await
    }

    async fn insert_placement(&self, new: NewPlacement) -> StoreResult<ContactPlacement> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                lock_stages(conn, &[new.stage_id])?;

                let existing: i64 = contact_pipeline_stages::table
                    .filter(contact_pipeline_stages::contact_id.eq(new.contact_id))
                    .filter(contact_pipeline_stages::pipeline_id.eq(new.pipeline_id))
                    .count()
                    .get_result(conn)?;
                if existing > 0 {
                    return Err(StoreError::Conflict(CONTACT_ALREADY_PLACED.to_string()));
                }

                let now = Utc::now();
                let row = PlacementRow {
                    contact_id: new.contact_id,
                    pipeline_id: new.pipeline_id,
                    stage_id: new.stage_id,
                    estimated_value: new.estimated_value,
                    notes: new.notes,
                    position: ordering::next_position(&contact_lane(conn, new.stage_id)?),
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(contact_pipeline_stages::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(|e| match StoreError::from(e) {
                        StoreError::Conflict(_) => {
                            StoreError::Conflict(CONTACT_ALREADY_PLACED.to_string())
                        }
                        other => other,
                    })?;
                Ok(ContactPlacement::from(row))
            })
        })
        .await
    }

    async fn update_placement(
        &self,
        contact_id: Uuid,
        pipeline_id: Uuid,
        patch: UpdatePlacementRequest,
    ) -> StoreResult<ContactPlacement> {
        self.run(move |conn| {
            let row: PlacementRow = diesel::update(contact_pipeline_stages::table.find((contact_id, pipeline_id)))
                .set((
                    patch
                        .estimated_value
                        .map(|v| contact_pipeline_stages::estimated_value.eq(Some(v))),
                    patch
                        .notes
                        .map(|n| contact_pipeline_stages::notes.eq(Some(n))),
                    contact_pipeline_stages::updated_at.eq(Utc::now()),
                ))
                .returning(PlacementRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| not_found("Contact placement"))?;
            Ok(ContactPlacement::from(row))
        })
        .await
    }

    async fn delete_placement(&self, contact_id: Uuid, pipeline_id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                let stage_id: Uuid = contact_pipeline_stages::table
                    .find((contact_id, pipeline_id))
                    .select(contact_pipeline_stages::stage_id)
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| not_found("Contact placement"))?;
                lock_stages(conn, &[stage_id])?;

                diesel::delete(contact_pipeline_stages::table.find((contact_id, pipeline_id)))
                    .execute(conn)?;
                let changes = ordering::plan_compaction(&contact_lane(conn, stage_id)?);
                apply_contact_changes(conn, pipeline_id, &changes)
            })
        })
        .await
    }

    async fn move_item(&self, command: MoveCommand) -> StoreResult<MoveOutcome> {
        self.run(move |conn| {
            conn.transaction(|conn| {
                lock_stages(
                    conn,
                    &[command.source_stage_id, command.destination_stage_id],
                )?;
                let now = Utc::now();

                let plan = match command.target {
                    MoveTarget::Deal(id) => {
                        let current: Uuid = deals::table
                            .find(id)
                            .select(deals::stage_id)
                            .first(conn)
                            .optional()?
                            .ok_or_else(|| not_found("Deal"))?;
                        if current != command.source_stage_id {
                            return Err(StoreError::Conflict(SOURCE_STAGE_MISMATCH.to_string()));
                        }

                        let source = deal_lane(conn, command.source_stage_id)?;
                        let destination = deal_lane(conn, command.destination_stage_id)?;
                        let plan = ordering::plan_move(
                            &source,
                            &destination,
                            id,
                            command.destination_stage_id,
                            command.destination_index,
                            command.source_index,
                        )?;
                        apply_deal_changes(conn, &plan.changes)?;
                        touch_deal(conn, id, now)?;
                        plan
                    }
                    MoveTarget::Contact {
                        contact_id,
                        pipeline_id,
                    } => {
                        let current: Uuid = contact_pipeline_stages::table
                            .find((contact_id, pipeline_id))
                            .select(contact_pipeline_stages::stage_id)
                            .first(conn)
                            .optional()?
                            .ok_or_else(|| not_found("Contact placement"))?;
                        if current != command.source_stage_id {
                            return Err(StoreError::Conflict(SOURCE_STAGE_MISMATCH.to_string()));
                        }

                        let source = contact_lane(conn, command.source_stage_id)?;
                        let destination = contact_lane(conn, command.destination_stage_id)?;
                        let plan = ordering::plan_move(
                            &source,
                            &destination,
                            contact_id,
                            command.destination_stage_id,
                            command.destination_index,
                            command.source_index,
                        )?;
                        apply_contact_changes(conn, pipeline_id, &plan.changes)?;
                        diesel::update(
                            contact_pipeline_stages::table.find((contact_id, pipeline_id)),
                        )
                        .set(contact_pipeline_stages::updated_at.eq(now))
                        .execute(conn)?;
                        plan
                    }
                };

                Ok(MoveOutcome {
                    stage_id: command.destination_stage_id,
                    position: plan.index as i32,
                })
            })
        })
        .await
    }

    async fn list_automations(&self, pipeline_id: Uuid) -> StoreResult<Vec<Automation>> {
        self.run(move |conn| {
            let rows: Vec<AutomationRow> = automations::table
                .filter(automations::pipeline_id.eq(pipeline_id))
                .order(automations::created_at.desc())
                .select(AutomationRow::as_select())
                .load(conn)?;
            rows.into_iter().map(Automation::try_from).collect()
        })
        .await
    }

    async fn get_automation(&self, id: Uuid) -> StoreResult<Option<Automation>> {
        self.run(move |conn| {
            let row: Option<AutomationRow> = automations::table
                .find(id)
                .select(AutomationRow::as_select())
                .first(conn)
                .optional()?;
            row.map(Automation::try_from).transpose()
        })
        .await
    }

    async fn insert_automation(&self, new: NewAutomation) -> StoreResult<Automation> {
        self.run(move |conn| {
            let now = Utc::now();
            let row = AutomationRow {
                id: Uuid::new_v4(),
                pipeline_id: new.pipeline_id,
                name: new.name,
                description: new.description,
                trigger: new.trigger.as_str().to_string(),
                conditions: to_json(&new.conditions)?,
                actions: to_json(&new.actions)?,
                is_active: new.is_active,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(automations::table)
                .values(&row)
                .execute(conn)?;
            Automation::try_from(row)
        })
        .await
    }

    async fn update_automation(&self, id: Uuid, patch: UpdateAutomationRequest) -> StoreResult<Automation> {
        self.run(move |conn| {
            let changes = AutomationChanges {
                name: patch.name,
                description: patch.description,
                trigger: patch.trigger.map(|t| t.as_str().to_string()),
                conditions: patch.conditions.as_ref().map(to_json).transpose()?,
                actions: patch.actions.as_ref().map(to_json).transpose()?,
                is_active: patch.is_active,
                updated_at: Some(Utc::now()),
            };
            let row: AutomationRow = diesel::update(automations::table.find(id))
                .set(&changes)
                .returning(AutomationRow::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| not_found("Automation"))?;
            Automation::try_from(row)
        })
        .await
    }

    async fn delete_automation(&self, id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let deleted = diesel::delete(automations::table.find(id)).execute(conn)?;
            if deleted == 0 {
                return Err(not_found("Automation"));
            }
            Ok(())
        })
        .await
    }
}

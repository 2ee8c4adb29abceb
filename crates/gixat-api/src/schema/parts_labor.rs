use async_graphql::{Context, Object, Result, ResultExt};
use chrono::{DateTime, Utc};
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{
    JobItemPart, JobItemPartUpdate, LaborEntry, LaborEntryUpdate, LaborSummary, NewJobItemPart,
    NewLaborEntry,
};
use uuid::Uuid;

#[derive(Default)]
pub struct PartsLaborQuery;

#[Object]
impl PartsLaborQuery {
    async fn parts_by_job_item(&self, ctx: &Context<'_>, job_item_id: Uuid) -> Result<Vec<JobItemPart>> {
        store(ctx)?
            .parts_for_job_item(tenant(ctx)?, job_item_id)
            .await
            .extend()
    }

    /// Ordered by start time
    async fn labor_entries_by_job_item(
        &self,
        ctx: &Context<'_>,
        job_item_id: Uuid,
    ) -> Result<Vec<LaborEntry>> {
        store(ctx)?
            .labor_entries_by_job_item(tenant(ctx)?, job_item_id)
            .await
            .extend()
    }

    /// Most recent first
    async fn labor_entries_by_technician(
        &self,
        ctx: &Context<'_>,
        technician_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<LaborEntry>> {
        store(ctx)?
            .labor_entries_by_technician(tenant(ctx)?, technician_id, start_date, end_date)
            .await
            .extend()
    }

    async fn labor_entry_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<LaborEntry>> {
        store(ctx)?
            .get_labor_entry(tenant(ctx)?, id)
            .await
            .extend()
    }

    /// Entries still clocked in
    async fn active_labor_entries(&self, ctx: &Context<'_>) -> Result<Vec<LaborEntry>> {
        store(ctx)?
            .active_labor_entries(tenant(ctx)?)
            .await
            .extend()
    }

    async fn labor_summary_by_job_card(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
    ) -> Result<LaborSummary> {
        store(ctx)?
            .labor_summary_by_job_card(tenant(ctx)?, job_card_id)
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct PartsLaborMutation;

#[Object]
impl PartsLaborMutation {
    /// Actual parts are taken out of stock
    async fn add_part_to_job_item(
        &self,
        ctx: &Context<'_>,
        input: NewJobItemPart,
    ) -> Result<JobItemPart> {
        store(ctx)?
            .add_part_to_job_item(tenant(ctx)?, input)
            .await
            .extend()
    }

    async fn update_job_item_part(
        &self,
        ctx: &Context<'_>,
        input: JobItemPartUpdate,
    ) -> Result<JobItemPart> {
        store(ctx)?
            .update_job_item_part(tenant(ctx)?, input)
            .await
            .extend()
    }

    async fn remove_part_from_job_item(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        store(ctx)?
            .remove_part_from_job_item(tenant(ctx)?, id)
            .await
            .extend()
    }

    async fn add_labor_entry(&self, ctx: &Context<'_>, input: NewLaborEntry) -> Result<LaborEntry> {
        store(ctx)?
            .add_labor_entry(tenant(ctx)?, input)
            .await
            .extend()
    }

    async fn update_labor_entry(
        &self,
        ctx: &Context<'_>,
        input: LaborEntryUpdate,
    ) -> Result<LaborEntry> {
        store(ctx)?
            .update_labor_entry(tenant(ctx)?, input)
            .await
            .extend()
    }

    /// `end_time` defaults to now
    async fn clock_out_labor_entry(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<LaborEntry> {
        store(ctx)?
            .clock_out_labor_entry(tenant(ctx)?, id, end_time.unwrap_or_else(Utc::now))
            .await
            .extend()
    }

    async fn delete_labor_entry(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        store(ctx)?
            .delete_labor_entry(tenant(ctx)?, id)
            .await
            .extend()
    }
}

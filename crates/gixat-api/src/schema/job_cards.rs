use async_graphql::{Context, Object, Result, ResultExt};
use chrono::Utc;
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{
    JobCard, JobCardFilter, JobCardStatus, JobItem, JobItemStatus, JobItemStatusUpdate,
    NewJobItem, Page,
};
use gixat_core::Error;
use rust_decimal::Decimal;
use uuid::Uuid;

fn non_negative(name: &str, value: Decimal) -> Result<Decimal> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::InvalidRequest(format!("{} cannot be negative", name))).extend();
    }
    Ok(value)
}

#[derive(Default)]
pub struct JobCardQuery;

#[Object]
impl JobCardQuery {
    /// Newest first
    async fn job_cards(
        &self,
        ctx: &Context<'_>,
        status: Option<JobCardStatus>,
        customer_id: Option<Uuid>,
        car_id: Option<Uuid>,
        skip: Option<i64>,
        take: Option<i64>,
    ) -> Result<Vec<JobCard>> {
        let filter = JobCardFilter {
            status,
            customer_id,
            car_id,
        };
        store(ctx)?
            .list_job_cards(tenant(ctx)?, filter, Page::new(skip, take))
            .await
            .extend()
    }

    async fn job_card_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<JobCard>> {
        store(ctx)?.get_job_card(tenant(ctx)?, id).await.extend()
    }
}

#[derive(Default)]
pub struct JobCardMutation;

#[Object]
impl JobCardMutation {
    /// Only sessions in `ReportGenerated` can be turned into a job card
    async fn create_job_card_from_session(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
    ) -> Result<JobCard> {
        store(ctx)?
            .create_job_card_from_session(tenant(ctx)?, session_id)
            .await
            .extend()
    }

    async fn add_job_item(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
        description: String,
        estimated_labor_cost: Decimal,
        estimated_parts_cost: Decimal,
        assigned_technician_id: Option<Uuid>,
    ) -> Result<JobItem> {
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(Error::InvalidRequest(
                "Job item description is required".to_string(),
            ))
            .extend();
        }
        let item = NewJobItem {
            description,
            estimated_labor_cost: non_negative("Estimated labor cost", estimated_labor_cost)?,
            estimated_parts_cost: non_negative("Estimated parts cost", estimated_parts_cost)?,
            assigned_technician_id,
        };
        store(ctx)?
            .add_job_item(tenant(ctx)?, job_card_id, item)
            .await
            .extend()
    }

    async fn update_job_item_status(
        &self,
        ctx: &Context<'_>,
        item_id: Uuid,
        status: JobItemStatus,
        actual_labor_cost: Decimal,
        actual_parts_cost: Decimal,
        technician_notes: Option<String>,
    ) -> Result<JobItem> {
        let update = JobItemStatusUpdate {
            status,
            actual_labor_cost: non_negative("Actual labor cost", actual_labor_cost)?,
            actual_parts_cost: non_negative("Actual parts cost", actual_parts_cost)?,
            technician_notes,
        };
        store(ctx)?
            .update_job_item_status(tenant(ctx)?, item_id, update)
            .await
            .extend()
    }

    async fn update_job_card_status(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard> {
        store(ctx)?
            .update_job_card_status(tenant(ctx)?, job_card_id, status)
            .await
            .extend()
    }

    async fn assign_technician_to_job_card(
        &self,
        ctx: &Context<'_>,
        job_card_id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobCard> {
        store(ctx)?
            .assign_technician_to_job_card(tenant(ctx)?, job_card_id, technician_id)
            .await
            .extend()
    }

    async fn assign_technician_to_job_item(
        &self,
        ctx: &Context<'_>,
        item_id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobItem> {
        store(ctx)?
            .assign_technician_to_job_item(tenant(ctx)?, item_id, technician_id)
            .await
            .extend()
    }

    /// Approves the card and every item on it
    async fn approve_job_card(&self, ctx: &Context<'_>, job_card_id: Uuid) -> Result<JobCard> {
        store(ctx)?
            .approve_job_card(tenant(ctx)?, job_card_id, Utc::now())
            .await
            .extend()
    }

    async fn approve_job_item(&self, ctx: &Context<'_>, item_id: Uuid) -> Result<JobItem> {
        store(ctx)?
            .approve_job_item(tenant(ctx)?, item_id, Utc::now())
            .await
            .extend()
    }
}

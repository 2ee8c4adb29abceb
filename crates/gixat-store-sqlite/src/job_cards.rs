use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::models::{
    JobCard, JobCardFilter, JobCardStatus, JobItem, JobItemStatus, JobItemStatusUpdate,
    NewJobItem, Page, SessionStatus,
};
use gixat_core::pricing;
use gixat_core::store::JobCardStore;
use gixat_core::workflow::{self, JOB_CARD_CREATED_NOTE};
use gixat_core::{Error, OrganizationId, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteExecutor, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::sessions::{change_status, fetch_session};
use crate::store::{
    SqliteGarageStore, db_err, decimal, flag, opt_text, opt_timestamp, opt_uuid, org_text,
    parsed, text, timestamp, uuid,
};
use crate::users::fetch_tenant_user;

const SELECT_JOB_CARD: &str = r#"
    SELECT id, organization_id, session_id, car_id, customer_id, assigned_technician_id,
           status, internal_notes, total_estimated_cost, total_actual_cost,
           total_estimated_labor, total_actual_labor, total_estimated_parts,
           total_actual_parts, is_approved_by_customer, approved_at, created_at, updated_at
    FROM job_cards
"#;

/// Items joined to their card so every lookup can filter on the card's tenant
const SELECT_JOB_ITEM: &str = r#"
    SELECT i.id, i.job_card_id, i.assigned_technician_id, i.description, i.status,
           i.estimated_labor_cost, i.estimated_parts_cost, i.actual_labor_cost,
           i.actual_parts_cost, i.is_approved_by_customer, i.approved_at,
           i.technician_notes, i.created_at, i.updated_at
    FROM job_items i
    JOIN job_cards c ON c.id = i.job_card_id
"#;

fn job_card_from_row(row: &SqliteRow) -> Result<JobCard> {
    Ok(JobCard {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        session_id: opt_uuid(row, "session_id")?,
        car_id: uuid(row, "car_id")?,
        customer_id: uuid(row, "customer_id")?,
        assigned_technician_id: opt_uuid(row, "assigned_technician_id")?,
        status: parsed(row, "status")?,
        internal_notes: opt_text(row, "internal_notes")?,
        total_estimated_cost: decimal(row, "total_estimated_cost")?,
        total_actual_cost: decimal(row, "total_actual_cost")?,
        total_estimated_labor: decimal(row, "total_estimated_labor")?,
        total_actual_labor: decimal(row, "total_actual_labor")?,
        total_estimated_parts: decimal(row, "total_estimated_parts")?,
        total_actual_parts: decimal(row, "total_actual_parts")?,
        is_approved_by_customer: flag(row, "is_approved_by_customer")?,
        approved_at: opt_timestamp(row, "approved_at")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn job_item_from_row(row: &SqliteRow) -> Result<JobItem> {
    let estimated_labor_cost = decimal(row, "estimated_labor_cost")?;
    let estimated_parts_cost = decimal(row, "estimated_parts_cost")?;
    let actual_labor_cost = decimal(row, "actual_labor_cost")?;
    let actual_parts_cost = decimal(row, "actual_parts_cost")?;
    Ok(JobItem {
        id: uuid(row, "id")?,
        job_card_id: uuid(row, "job_card_id")?,
        assigned_technician_id: opt_uuid(row, "assigned_technician_id")?,
        description: text(row, "description")?,
        status: parsed(row, "status")?,
        estimated_labor_cost,
        estimated_parts_cost,
        estimated_cost: estimated_labor_cost + estimated_parts_cost,
        actual_labor_cost,
        actual_parts_cost,
        actual_cost: actual_labor_cost + actual_parts_cost,
        is_approved_by_customer: flag(row, "is_approved_by_customer")?,
        approved_at: opt_timestamp(row, "approved_at")?,
        technician_notes: opt_text(row, "technician_notes")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

pub(crate) async fn fetch_job_card<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<JobCard>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_JOB_CARD
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(job_card_from_row).transpose()
}

async fn require_job_card<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<JobCard> {
    fetch_job_card(ex, org, id)
        .await?
        .ok_or_else(|| Error::not_found("Job card", id))
}

pub(crate) async fn fetch_job_item<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<JobItem>> {
    let row = sqlx::query(&format!(
        "{} WHERE i.id = ? AND c.organization_id = ?",
        SELECT_JOB_ITEM
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(job_item_from_row).transpose()
}

pub(crate) async fn require_job_item<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<JobItem> {
    fetch_job_item(ex, org, id)
        .await?
        .ok_or_else(|| Error::not_found("Job item", id))
}

async fn items_of_card<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    job_card_id: Uuid,
) -> Result<Vec<JobItem>> {
    let rows = sqlx::query(&format!(
        "{} WHERE i.job_card_id = ? AND c.organization_id = ? ORDER BY i.created_at, i.rowid",
        SELECT_JOB_ITEM
    ))
    .bind(job_card_id.to_string())
    .bind(org_text(org))
    .fetch_all(ex)
    .await
    .map_err(db_err)?;
    rows.iter().map(job_item_from_row).collect()
}

/// `NotFound` unless the technician is a user of `org`
pub(crate) async fn require_technician<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    technician_id: Uuid,
) -> Result<()> {
    match fetch_tenant_user(ex, org, technician_id).await? {
        Some(_) => Ok(()),
        None => Err(Error::NotFound(format!(
            "Technician with ID '{}' not found.",
            technician_id
        ))),
    }
}

/// Roll the card totals up from its items
async fn recalculate_totals(
    tx: &mut Transaction<'_, Sqlite>,
    org: OrganizationId,
    job_card_id: Uuid,
) -> Result<()> {
    let items = items_of_card(&mut **tx, org, job_card_id).await?;
    let totals = pricing::card_totals(&items);
    sqlx::query(
        r#"
        UPDATE job_cards SET
            total_estimated_cost = ?, total_actual_cost = ?,
            total_estimated_labor = ?, total_actual_labor = ?,
            total_estimated_parts = ?, total_actual_parts = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(totals.estimated_cost.to_string())
    .bind(totals.actual_cost.to_string())
    .bind(totals.estimated_labor.to_string())
    .bind(totals.actual_labor.to_string())
    .bind(totals.estimated_parts.to_string())
    .bind(totals.actual_parts.to_string())
    .bind(Utc::now())
    .bind(job_card_id.to_string())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn insert_item(
    tx: &mut Transaction<'_, Sqlite>,
    job_card_id: Uuid,
    item: &NewJobItem,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO job_items (
            id, job_card_id, assigned_technician_id, description, status,
            estimated_labor_cost, estimated_parts_cost, actual_labor_cost,
            actual_parts_cost, is_approved_by_customer, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, '0', '0', 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(job_card_id.to_string())
    .bind(item.assigned_technician_id.map(|t| t.to_string()))
    .bind(item.description.trim())
    .bind(JobItemStatus::Pending.as_str())
    .bind(item.estimated_labor_cost.to_string())
    .bind(item.estimated_parts_cost.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(id)
}

#[async_trait]
impl JobCardStore for SqliteGarageStore {
    async fn create_job_card_from_session(
        &self,
        org: OrganizationId,
        session_id: Uuid,
    ) -> Result<JobCard> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let session = fetch_session(&mut *tx, org, session_id)
            .await?
            .ok_or_else(|| Error::not_found("Session", session_id))?;
        workflow::ensure_job_card_source(session.status)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO job_cards (
                id, organization_id, session_id, car_id, customer_id, status,
                internal_notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(session.id.to_string())
        .bind(session.car_id.to_string())
        .bind(session.customer_id.to_string())
        .bind(JobCardStatus::Pending.as_str())
        .bind(workflow::job_card_notes(&session))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let descriptions = workflow::extract_job_items(&session);
        for description in &descriptions {
            let item = NewJobItem {
                description: description.clone(),
                estimated_labor_cost: Decimal::ZERO,
                estimated_parts_cost: Decimal::ZERO,
                assigned_technician_id: None,
            };
            insert_item(&mut tx, id, &item, now).await?;
        }

        change_status(
            &mut tx,
            session.id,
            session.status,
            SessionStatus::JobCardCreated,
            Some(JOB_CARD_CREATED_NOTE),
        )
        .await?;

        let card = require_job_card(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;

        info!(
            "Created job card {} from session {} with {} items",
            id,
            session.id,
            descriptions.len()
        );
        Ok(card)
    }

    async fn get_job_card(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobCard>> {
        fetch_job_card(&self.pool, org, id).await
    }

    async fn list_job_cards(
        &self,
        org: OrganizationId,
        filter: JobCardFilter,
        page: Page,
    ) -> Result<Vec<JobCard>> {
        let status = filter.status.map(|s| s.as_str());
        let customer = filter.customer_id.map(|c| c.to_string());
        let car = filter.car_id.map(|c| c.to_string());

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE organization_id = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR customer_id = ?)
              AND (? IS NULL OR car_id = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?"#,
            SELECT_JOB_CARD
        ))
        .bind(org_text(org))
        .bind(status)
        .bind(status)
        .bind(&customer)
        .bind(&customer)
        .bind(&car)
        .bind(&car)
        .bind(page.take)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(job_card_from_row).collect()
    }

    async fn job_cards_for_session(
        &self,
        org: OrganizationId,
        session_id: Uuid,
    ) -> Result<Vec<JobCard>> {
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? AND session_id = ? ORDER BY created_at DESC",
            SELECT_JOB_CARD
        ))
        .bind(org_text(org))
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(job_card_from_row).collect()
    }

    async fn job_items(&self, org: OrganizationId, job_card_id: Uuid) -> Result<Vec<JobItem>> {
        items_of_card(&self.pool, org, job_card_id).await
    }

    async fn get_job_item(&self, org: OrganizationId, id: Uuid) -> Result<Option<JobItem>> {
        fetch_job_item(&self.pool, org, id).await
    }

    async fn add_job_item(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
        item: NewJobItem,
    ) -> Result<JobItem> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_job_card(&mut *tx, org, job_card_id).await?;
        if let Some(technician_id) = item.assigned_technician_id {
            require_technician(&mut *tx, org, technician_id).await?;
        }

        let id = insert_item(&mut tx, job_card_id, &item, Utc::now()).await?;
        recalculate_totals(&mut tx, org, job_card_id).await?;
        let created = require_job_item(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    async fn update_job_item_status(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        update: JobItemStatusUpdate,
    ) -> Result<JobItem> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let item = require_job_item(&mut *tx, org, item_id).await?;
        workflow::validate_item_status_change(&item, &update)?;

        sqlx::query(
            r#"
            UPDATE job_items SET
                status = ?, actual_labor_cost = ?, actual_parts_cost = ?,
                technician_notes = COALESCE(?, technician_notes), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.actual_labor_cost.to_string())
        .bind(update.actual_parts_cost.to_string())
        .bind(update.technician_notes)
        .bind(Utc::now())
        .bind(item_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        recalculate_totals(&mut tx, org, item.job_card_id).await?;
        let updated = require_job_item(&mut *tx, org, item_id).await?;
        tx.commit().await.map_err(db_err)?;
        info!("Job item {} moved to {}", item_id, updated.status);
        Ok(updated)
    }

    async fn update_job_card_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: JobCardStatus,
    ) -> Result<JobCard> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_job_card(&mut *tx, org, id).await?;
        let open_items = items_of_card(&mut *tx, org, id)
            .await?
            .iter()
            .filter(|item| item.status.is_open())
            .count();
        workflow::ensure_job_card_status_change(status, open_items)?;

        sqlx::query("UPDATE job_cards SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let card = require_job_card(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(card)
    }

    async fn assign_technician_to_job_card(
        &self,
        org: OrganizationId,
        id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobCard> {
        require_job_card(&self.pool, org, id).await?;
        require_technician(&self.pool, org, technician_id).await?;

        sqlx::query("UPDATE job_cards SET assigned_technician_id = ?, updated_at = ? WHERE id = ?")
            .bind(technician_id.to_string())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        require_job_card(&self.pool, org, id).await
    }

    async fn assign_technician_to_job_item(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        technician_id: Uuid,
    ) -> Result<JobItem> {
        require_job_item(&self.pool, org, item_id).await?;
        require_technician(&self.pool, org, technician_id).await?;

        sqlx::query("UPDATE job_items SET assigned_technician_id = ?, updated_at = ? WHERE id = ?")
            .bind(technician_id.to_string())
            .bind(Utc::now())
            .bind(item_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        require_job_item(&self.pool, org, item_id).await
    }

    async fn approve_job_card(
        &self,
        org: OrganizationId,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JobCard> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_job_card(&mut *tx, org, id).await?;

        sqlx::query(
            "UPDATE job_cards SET is_approved_by_customer = 1, approved_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "UPDATE job_items SET is_approved_by_customer = 1, approved_at = ?, updated_at = ?
             WHERE job_card_id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let card = require_job_card(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        info!("Job card {} approved by customer", id);
        Ok(card)
    }

    async fn approve_job_item(
        &self,
        org: OrganizationId,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<JobItem> {
        require_job_item(&self.pool, org, item_id).await?;
        sqlx::query(
            "UPDATE job_items SET is_approved_by_customer = 1, approved_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(item_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_job_item(&self.pool, org, item_id).await
    }
}

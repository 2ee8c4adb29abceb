use async_trait::async_trait;
use chrono::Utc;
use gixat_core::models::{
    GarageSession, InspectionUpdate, IntakeUpdate, Page, SessionFilter, SessionLog, SessionStatus,
    TestDriveUpdate,
};
use gixat_core::store::GarageSessionStore;
use gixat_core::workflow::{self, INITIAL_REPORT_NOTE};
use gixat_core::{Error, OrganizationId, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteExecutor, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::customers::{fetch_car, fetch_customer};
use crate::store::{SqliteGarageStore, db_err, opt_text, org_text, parsed, timestamp, uuid};

const SELECT_SESSION: &str = r#"
    SELECT id, organization_id, car_id, customer_id, status, mileage, customer_requests,
           intake_notes, intake_requests, inspection_notes, inspection_requests,
           test_drive_notes, test_drive_requests, initial_report, created_at, updated_at
    FROM garage_sessions
"#;

fn session_from_row(row: &SqliteRow) -> Result<GarageSession> {
    Ok(GarageSession {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        car_id: uuid(row, "car_id")?,
        customer_id: uuid(row, "customer_id")?,
        status: parsed(row, "status")?,
        mileage: row.try_get::<Option<i32>, _>("mileage").map_err(db_err)?,
        customer_requests: opt_text(row, "customer_requests")?,
        intake_notes: opt_text(row, "intake_notes")?,
        intake_requests: opt_text(row, "intake_requests")?,
        inspection_notes: opt_text(row, "inspection_notes")?,
        inspection_requests: opt_text(row, "inspection_requests")?,
        test_drive_notes: opt_text(row, "test_drive_notes")?,
        test_drive_requests: opt_text(row, "test_drive_requests")?,
        initial_report: opt_text(row, "initial_report")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn log_from_row(row: &SqliteRow) -> Result<SessionLog> {
    Ok(SessionLog {
        id: uuid(row, "id")?,
        session_id: uuid(row, "session_id")?,
        from_status: parsed(row, "from_status")?,
        to_status: parsed(row, "to_status")?,
        notes: opt_text(row, "notes")?,
        changed_at: timestamp(row, "changed_at")?,
    })
}

pub(crate) async fn fetch_session<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<GarageSession>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_SESSION
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(session_from_row).transpose()
}

async fn require_session<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<GarageSession> {
    fetch_session(ex, org, id)
        .await?
        .ok_or_else(|| Error::not_found("Session", id))
}

/// Fail with `ActiveSessionExists` when the car has a session in progress
pub(crate) async fn ensure_no_active_session(
    tx: &mut Transaction<'_, Sqlite>,
    org: OrganizationId,
    car_id: Uuid,
) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, status FROM garage_sessions WHERE organization_id = ? AND car_id = ?",
    )
    .bind(org_text(org))
    .bind(car_id.to_string())
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    for row in &rows {
        let status: SessionStatus = parsed(row, "status")?;
        if status.is_active() {
            return Err(workflow::active_session_exists(uuid(row, "id")?, status));
        }
    }
    Ok(())
}

/// Insert a session at `Intake`. Callers check ownership and the active
/// session rule first.
pub(crate) async fn insert_session(
    tx: &mut Transaction<'_, Sqlite>,
    org: OrganizationId,
    car_id: Uuid,
    customer_id: Uuid,
    customer_requests: Option<String>,
) -> Result<GarageSession> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO garage_sessions (
            id, organization_id, car_id, customer_id, status, customer_requests,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(org_text(org))
    .bind(car_id.to_string())
    .bind(customer_id.to_string())
    .bind(SessionStatus::Intake.as_str())
    .bind(&customer_requests)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok(GarageSession {
        id,
        organization_id: *org.as_uuid(),
        car_id,
        customer_id,
        status: SessionStatus::Intake,
        mileage: None,
        customer_requests,
        intake_notes: None,
        intake_requests: None,
        inspection_notes: None,
        inspection_requests: None,
        test_drive_notes: None,
        test_drive_requests: None,
        initial_report: None,
        created_at: now,
        updated_at: now,
    })
}

/// Move a session to `to` and append the matching log row
pub(crate) async fn change_status(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: Uuid,
    from: SessionStatus,
    to: SessionStatus,
    notes: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query("UPDATE garage_sessions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(to.as_str())
        .bind(now)
        .bind(session_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

    sqlx::query(
        r#"
        INSERT INTO session_logs (id, session_id, from_status, to_status, notes, changed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(session_id.to_string())
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(notes)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    info!("Session {} moved from {} to {}", session_id, from, to);
    Ok(())
}

impl SqliteGarageStore {
    async fn sessions_where(
        &self,
        org: OrganizationId,
        column: &str,
        value: Uuid,
    ) -> Result<Vec<GarageSession>> {
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? AND {} = ? ORDER BY created_at DESC",
            SELECT_SESSION, column
        ))
        .bind(org_text(org))
        .bind(value.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(session_from_row).collect()
    }
}

#[async_trait]
impl GarageSessionStore for SqliteGarageStore {
    async fn create_session(
        &self,
        org: OrganizationId,
        car_id: Uuid,
        customer_id: Uuid,
    ) -> Result<GarageSession> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let car = fetch_car(&mut *tx, org, car_id).await?;
        let customer = fetch_customer(&mut *tx, org, customer_id).await?;
        if car.is_none() || customer.is_none() {
            return Err(Error::NotFound(
                "Car or Customer not found in your organization".to_string(),
            ));
        }

        ensure_no_active_session(&mut tx, org, car_id).await?;
        let session = insert_session(&mut tx, org, car_id, customer_id, None).await?;
        tx.commit().await.map_err(db_err)?;

        info!("Created session {} for car {}", session.id, car_id);
        Ok(session)
    }

    async fn get_session(&self, org: OrganizationId, id: Uuid) -> Result<Option<GarageSession>> {
        fetch_session(&self.pool, org, id).await
    }

    async fn list_sessions(
        &self,
        org: OrganizationId,
        filter: SessionFilter,
        page: Page,
    ) -> Result<Vec<GarageSession>> {
        let status = filter.status.map(|s| s.as_str());
        let car = filter.car_id.map(|c| c.to_string());
        let customer = filter.customer_id.map(|c| c.to_string());

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE organization_id = ?
              AND (? IS NULL OR status = ?)
              AND (? IS NULL OR car_id = ?)
              AND (? IS NULL OR customer_id = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?"#,
            SELECT_SESSION
        ))
        .bind(org_text(org))
        .bind(status)
        .bind(status)
        .bind(&car)
        .bind(&car)
        .bind(&customer)
        .bind(&customer)
        .bind(page.take)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(session_from_row).collect()
    }

    async fn update_session_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: SessionStatus,
        notes: Option<String>,
    ) -> Result<GarageSession> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let session = require_session(&mut *tx, org, id).await?;
        change_status(&mut tx, id, session.status, status, notes.as_deref()).await?;
        let updated = require_session(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn update_intake(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: IntakeUpdate,
    ) -> Result<GarageSession> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let session = require_session(&mut *tx, org, id).await?;

        sqlx::query(
            r#"
            UPDATE garage_sessions SET
                mileage = COALESCE(?, mileage),
                intake_notes = COALESCE(?, intake_notes),
                intake_requests = COALESCE(?, intake_requests),
                customer_requests = COALESCE(?, customer_requests),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.mileage)
        .bind(update.intake_notes)
        .bind(update.intake_requests)
        .bind(update.customer_requests)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(next) = workflow::after_intake(session.status) {
            change_status(&mut tx, id, session.status, next.to, Some(next.note)).await?;
        }

        let updated = require_session(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn update_customer_requests(
        &self,
        org: OrganizationId,
        id: Uuid,
        requests: String,
    ) -> Result<GarageSession> {
        let result = sqlx::query(
            "UPDATE garage_sessions SET customer_requests = ?, updated_at = ?
             WHERE id = ? AND organization_id = ?",
        )
        .bind(requests)
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Session", id));
        }
        require_session(&self.pool, org, id).await
    }

    async fn update_inspection(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: InspectionUpdate,
    ) -> Result<GarageSession> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let session = require_session(&mut *tx, org, id).await?;

        sqlx::query(
            r#"
            UPDATE garage_sessions SET
                inspection_notes = COALESCE(?, inspection_notes),
                inspection_requests = COALESCE(?, inspection_requests),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.inspection_notes)
        .bind(update.inspection_requests)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(next) = workflow::after_inspection(session.status) {
            change_status(&mut tx, id, session.status, next.to, Some(next.note)).await?;
        }

        let updated = require_session(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn update_test_drive(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: TestDriveUpdate,
    ) -> Result<GarageSession> {
        let result = sqlx::query(
            r#"
            UPDATE garage_sessions SET
                test_drive_notes = COALESCE(?, test_drive_notes),
                test_drive_requests = COALESCE(?, test_drive_requests),
                updated_at = ?
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(update.test_drive_notes)
        .bind(update.test_drive_requests)
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Session", id));
        }
        require_session(&self.pool, org, id).await
    }

    async fn generate_initial_report(
        &self,
        org: OrganizationId,
        id: Uuid,
        report: String,
    ) -> Result<GarageSession> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let session = require_session(&mut *tx, org, id).await?;

        sqlx::query("UPDATE garage_sessions SET initial_report = ? WHERE id = ?")
            .bind(report)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        change_status(
            &mut tx,
            id,
            session.status,
            SessionStatus::ReportGenerated,
            Some(INITIAL_REPORT_NOTE),
        )
        .await?;

        let updated = require_session(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(updated)
    }

    async fn session_logs(&self, org: OrganizationId, session_id: Uuid) -> Result<Vec<SessionLog>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.session_id, l.from_status, l.to_status, l.notes, l.changed_at
            FROM session_logs l
            JOIN garage_sessions s ON s.id = l.session_id
            WHERE l.session_id = ? AND s.organization_id = ?
            ORDER BY l.changed_at, l.rowid
            "#,
        )
        .bind(session_id.to_string())
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(log_from_row).collect()
    }

    async fn sessions_for_customer(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<Vec<GarageSession>> {
        self.sessions_where(org, "customer_id", customer_id).await
    }

    async fn sessions_for_car(
        &self,
        org: OrganizationId,
        car_id: Uuid,
    ) -> Result<Vec<GarageSession>> {
        self.sessions_where(org, "car_id", car_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, store, tenant};

    async fn session_count(store: &SqliteGarageStore) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM garage_sessions")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_walks_through_workflow() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "10-1").await;

        let session = store.create_session(org, car.id, customer.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Intake);

        let session = store
            .update_intake(
                org,
                session.id,
                IntakeUpdate {
                    mileage: Some(120_000),
                    customer_requests: Some("- Oil change".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Inspection);
        assert_eq!(session.mileage, Some(120_000));

        let session = store
            .update_inspection(
                org,
                session.id,
                InspectionUpdate {
                    inspection_notes: Some("Worn pads".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::TestDrive);

        let session = store
            .update_test_drive(org, session.id, TestDriveUpdate::default())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::TestDrive);

        let session = store
            .generate_initial_report(org, session.id, "All good".into())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::ReportGenerated);

        let logs = store.session_logs(org, session.id).await.unwrap();
        let notes: Vec<_> = logs.iter().filter_map(|l| l.notes.as_deref()).collect();
        assert_eq!(
            notes,
            [
                workflow::INTAKE_COMPLETED_NOTE,
                workflow::INSPECTION_COMPLETED_NOTE,
                INITIAL_REPORT_NOTE
            ]
        );
    }

    #[tokio::test]
    async fn test_second_active_session_is_rejected() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "10-1").await;
        let first = store.create_session(org, car.id, customer.id).await.unwrap();

        let err = store
            .create_session(org, car.id, customer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BusinessRule { code: "ActiveSessionExists", .. }));
        assert!(err.to_string().contains(&first.id.to_string()));
        assert_eq!(session_count(&store).await, 1);

        store
            .update_session_status(org, first.id, SessionStatus::Cancelled, None)
            .await
            .unwrap();
        store.create_session(org, car.id, customer.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_are_tenant_scoped() {
        let store = store().await;
        let (org_a, _) = tenant(&store, "a").await;
        let (org_b, _) = tenant(&store, "b").await;
        let (customer, car) = customer_with_car(&store, org_a, "10-1").await;

        let err = store
            .create_session(org_b, car.id, customer.id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Car or Customer not found in your organization");

        let session = store.create_session(org_a, car.id, customer.id).await.unwrap();
        assert!(store.get_session(org_b, session.id).await.unwrap().is_none());
        assert!(
            store
                .update_customer_requests(org_b, session.id, "x".into())
                .await
                .is_err()
        );
        assert!(store.session_logs(org_b, session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_filters_by_status() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "10-1").await;
        let session = store.create_session(org, car.id, customer.id).await.unwrap();

        let intake = store
            .list_sessions(
                org,
                SessionFilter {
                    status: Some(SessionStatus::Intake),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(intake.len(), 1);
        assert_eq!(intake[0].id, session.id);

        let completed = store
            .list_sessions(
                org,
                SessionFilter {
                    status: Some(SessionStatus::Completed),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert!(completed.is_empty());
        assert_eq!(store.sessions_for_car(org, car.id).await.unwrap().len(), 1);
    }
}

use async_graphql::{Context, Object, Result, ResultExt};
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{
    GarageSession, InspectionUpdate, IntakeUpdate, Page, SessionFilter, SessionLog, SessionStatus,
    TestDriveUpdate,
};
use uuid::Uuid;

#[derive(Default)]
pub struct SessionQuery;

#[Object]
impl SessionQuery {
    /// Newest first
    async fn sessions(
        &self,
        ctx: &Context<'_>,
        status: Option<SessionStatus>,
        car_id: Option<Uuid>,
        customer_id: Option<Uuid>,
        skip: Option<i64>,
        take: Option<i64>,
    ) -> Result<Vec<GarageSession>> {
        let filter = SessionFilter {
            status,
            car_id,
            customer_id,
        };
        store(ctx)?
            .list_sessions(tenant(ctx)?, filter, Page::new(skip, take))
            .await
            .extend()
    }

    async fn session_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<GarageSession>> {
        store(ctx)?.get_session(tenant(ctx)?, id).await.extend()
    }

    /// Oldest first
    async fn session_logs(&self, ctx: &Context<'_>, session_id: Uuid) -> Result<Vec<SessionLog>> {
        store(ctx)?
            .session_logs(tenant(ctx)?, session_id)
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct SessionMutation;

#[Object]
impl SessionMutation {
    async fn create_session(
        &self,
        ctx: &Context<'_>,
        car_id: Uuid,
        customer_id: Uuid,
    ) -> Result<GarageSession> {
        store(ctx)?
            .create_session(tenant(ctx)?, car_id, customer_id)
            .await
            .extend()
    }

    async fn update_session_status(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        new_status: SessionStatus,
        notes: Option<String>,
    ) -> Result<GarageSession> {
        store(ctx)?
            .update_session_status(tenant(ctx)?, session_id, new_status, notes)
            .await
            .extend()
    }

    /// Moves an `Intake` session on to `Inspection`
    async fn update_intake(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        mileage: Option<i32>,
        intake_notes: Option<String>,
        intake_requests: Option<String>,
        customer_requests: Option<String>,
    ) -> Result<GarageSession> {
        let update = IntakeUpdate {
            mileage,
            intake_notes,
            intake_requests,
            customer_requests,
        };
        store(ctx)?
            .update_intake(tenant(ctx)?, session_id, update)
            .await
            .extend()
    }

    async fn update_customer_requests(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        requests: String,
    ) -> Result<GarageSession> {
        store(ctx)?
            .update_customer_requests(tenant(ctx)?, session_id, requests)
            .await
            .extend()
    }

    /// Moves an `Inspection` session on to `TestDrive`
    async fn update_inspection(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        inspection_notes: Option<String>,
        inspection_requests: Option<String>,
    ) -> Result<GarageSession> {
        let update = InspectionUpdate {
            inspection_notes,
            inspection_requests,
        };
        store(ctx)?
            .update_inspection(tenant(ctx)?, session_id, update)
            .await
            .extend()
    }

    async fn update_test_drive(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        test_drive_notes: Option<String>,
        test_drive_requests: Option<String>,
    ) -> Result<GarageSession> {
        let update = TestDriveUpdate {
            test_drive_notes,
            test_drive_requests,
        };
        store(ctx)?
            .update_test_drive(tenant(ctx)?, session_id, update)
            .await
            .extend()
    }

    async fn generate_initial_report(
        &self,
        ctx: &Context<'_>,
        session_id: Uuid,
        report: String,
    ) -> Result<GarageSession> {
        store(ctx)?
            .generate_initial_report(tenant(ctx)?, session_id, report)
            .await
            .extend()
    }
}

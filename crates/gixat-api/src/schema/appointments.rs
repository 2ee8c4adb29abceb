use async_graphql::{Context, Object, Result, ResultExt, SimpleObject};
use chrono::{DateTime, NaiveDate, Utc};
use gixat_core::graphql::{request_context, store, tenant};
use gixat_core::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, NewAppointment, Page,
};
use gixat_core::scheduling::{available_slots, day_bounds, validate_duration};
use gixat_core::Error;
use tracing::info;
use uuid::Uuid;

use super::{MANAGERS, require_roles};

/// Booking outcome; rule violations are reported in `error`
#[derive(SimpleObject, Default)]
pub struct AppointmentPayload {
    pub appointment: Option<Appointment>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct AppointmentQuery;

#[Object]
impl AppointmentQuery {
    /// Ordered by start time
    async fn appointments(
        &self,
        ctx: &Context<'_>,
        status: Option<AppointmentStatus>,
        skip: Option<i64>,
        take: Option<i64>,
    ) -> Result<Vec<Appointment>> {
        store(ctx)?
            .list_appointments(tenant(ctx)?, status, Page::new(skip, take))
            .await
            .extend()
    }

    async fn appointment_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Appointment>> {
        store(ctx)?
            .get_appointment(tenant(ctx)?, id)
            .await
            .extend()
    }

    async fn appointments_by_date_range(
        &self,
        ctx: &Context<'_>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        store(ctx)?
            .appointments_by_date_range(tenant(ctx)?, start_date, end_date)
            .await
            .extend()
    }

    /// Free start times on `date` within business hours
    async fn available_slots(
        &self,
        ctx: &Context<'_>,
        date: NaiveDate,
        #[graphql(default = 60)] duration_minutes: i32,
        technician_id: Option<Uuid>,
    ) -> Result<Vec<DateTime<Utc>>> {
        validate_duration(duration_minutes).extend()?;
        let (start, end) = day_bounds(date);
        let busy = store(ctx)?
            .busy_intervals(tenant(ctx)?, start, end, technician_id)
            .await
            .extend()?;
        Ok(available_slots(date, i64::from(duration_minutes), &busy))
    }

    async fn customer_upcoming_appointments(
        &self,
        ctx: &Context<'_>,
        customer_id: Uuid,
    ) -> Result<Vec<Appointment>> {
        store(ctx)?
            .customer_upcoming_appointments(tenant(ctx)?, customer_id, Utc::now())
            .await
            .extend()
    }

    async fn technician_appointments(
        &self,
        ctx: &Context<'_>,
        technician_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let (start, end) = day_bounds(date);
        store(ctx)?
            .technician_appointments(tenant(ctx)?, technician_id, start, end)
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct AppointmentMutation;

#[Object]
impl AppointmentMutation {
    async fn create_appointment(
        &self,
        ctx: &Context<'_>,
        input: NewAppointment,
    ) -> Result<AppointmentPayload> {
        let org = tenant(ctx)?;
        let created_by = request_context(ctx)?.user_id;
        match store(ctx)?
            .create_appointment(org, input, created_by, Utc::now())
            .await
        {
            Ok(appointment) => {
                info!(
                    "📅 Booked appointment {} at {}",
                    appointment.id, appointment.scheduled_start_time
                );
                Ok(AppointmentPayload {
                    appointment: Some(appointment),
                    error: None,
                })
            }
            Err(e @ Error::BusinessRule { .. }) => Ok(AppointmentPayload {
                appointment: None,
                error: Some(e.to_string()),
            }),
            Err(e) => Err(e).extend(),
        }
    }

    /// Rescheduling re-checks the slot
    async fn update_appointment(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: AppointmentUpdate,
    ) -> Result<Appointment> {
        store(ctx)?
            .update_appointment(tenant(ctx)?, id, input)
            .await
            .extend()
    }

    async fn update_appointment_status(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        status: AppointmentStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Appointment> {
        store(ctx)?
            .update_appointment_status(tenant(ctx)?, id, status, cancellation_reason, Utc::now())
            .await
            .extend()
    }

    async fn convert_appointment_to_session(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
    ) -> Result<Appointment> {
        store(ctx)?
            .convert_appointment_to_session(tenant(ctx)?, id)
            .await
            .extend()
    }

    async fn delete_appointment(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        require_roles(ctx, MANAGERS)?;
        store(ctx)?
            .delete_appointment(tenant(ctx)?, id)
            .await
            .extend()
    }
}

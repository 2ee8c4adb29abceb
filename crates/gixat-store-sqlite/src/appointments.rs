use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, BusyInterval, NewAppointment, Page,
};
use gixat_core::scheduling;
use gixat_core::store::AppointmentStore;
use gixat_core::{Error, OrganizationId, Result};
use sqlx::SqliteExecutor;
use sqlx::sqlite::SqliteRow;
use tracing::info;
use uuid::Uuid;

use crate::customers::{fetch_car, fetch_customer};
use crate::job_cards::require_technician;
use crate::sessions::{ensure_no_active_session, insert_session};
use crate::store::{
    SqliteGarageStore, db_err, flag, int, opt_text, opt_timestamp, opt_uuid, org_text, parsed,
    timestamp, uuid,
};

const SELECT_APPOINTMENT: &str = r#"
    SELECT id, organization_id, customer_id, car_id, session_id, scheduled_start_time,
           scheduled_end_time, assigned_technician_id, appointment_type, status,
           service_requested, customer_notes, internal_notes, estimated_duration_minutes,
           contact_phone, contact_email, reminder_sent, reminder_sent_at, cancelled_at,
           cancellation_reason, created_by_id, created_at, updated_at
    FROM appointments
"#;

fn appointment_from_row(row: &SqliteRow) -> Result<Appointment> {
    Ok(Appointment {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        customer_id: uuid(row, "customer_id")?,
        car_id: uuid(row, "car_id")?,
        session_id: opt_uuid(row, "session_id")?,
        scheduled_start_time: timestamp(row, "scheduled_start_time")?,
        scheduled_end_time: timestamp(row, "scheduled_end_time")?,
        assigned_technician_id: opt_uuid(row, "assigned_technician_id")?,
        appointment_type: parsed(row, "appointment_type")?,
        status: parsed(row, "status")?,
        service_requested: opt_text(row, "service_requested")?,
        customer_notes: opt_text(row, "customer_notes")?,
        internal_notes: opt_text(row, "internal_notes")?,
        estimated_duration_minutes: int(row, "estimated_duration_minutes")? as i32,
        contact_phone: opt_text(row, "contact_phone")?,
        contact_email: opt_text(row, "contact_email")?,
        reminder_sent: flag(row, "reminder_sent")?,
        reminder_sent_at: opt_timestamp(row, "reminder_sent_at")?,
        cancelled_at: opt_timestamp(row, "cancelled_at")?,
        cancellation_reason: opt_text(row, "cancellation_reason")?,
        created_by_id: opt_uuid(row, "created_by_id")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

async fn fetch_appointment<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<Appointment>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_APPOINTMENT
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(appointment_from_row).transpose()
}

async fn require_appointment<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Appointment> {
    fetch_appointment(ex, org, id)
        .await?
        .ok_or_else(|| Error::not_found("Appointment", id))
}

/// Column predicates for appointment lookups; `None` leaves a column open
#[derive(Debug, Default, Clone, Copy)]
struct AppointmentFilter {
    status: Option<AppointmentStatus>,
    customer_id: Option<Uuid>,
    technician_id: Option<Uuid>,
    starts_from: Option<DateTime<Utc>>,
    starts_before: Option<DateTime<Utc>>,
    blocking_only: bool,
}

/// Quoted status values that never hold a slot, for `NOT IN` lists
fn released_statuses() -> String {
    AppointmentStatus::ALL
        .iter()
        .filter(|s| !s.blocks_slot())
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appointments of `org` matching `filter`, earliest start first.
///
/// Timestamps are RFC 3339 UTC text, so range predicates and ordering work
/// on the stored column. A `None` page returns every match.
async fn query_appointments<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    filter: AppointmentFilter,
    page: Option<Page>,
) -> Result<Vec<Appointment>> {
    let status = filter.status.map(|s| s.as_str());
    let customer = filter.customer_id.map(|c| c.to_string());
    let technician = filter.technician_id.map(|t| t.to_string());
    let (take, skip) = page.map_or((-1, 0), |p| (p.take, p.skip));

    let rows = sqlx::query(&format!(
        r#"{}
        WHERE organization_id = ?
          AND (? IS NULL OR status = ?)
          AND (? IS NULL OR customer_id = ?)
          AND (? IS NULL OR assigned_technician_id = ?)
          AND (? IS NULL OR scheduled_start_time >= ?)
          AND (? IS NULL OR scheduled_start_time < ?)
          AND (? = 0 OR status NOT IN ({}))
        ORDER BY scheduled_start_time, rowid
        LIMIT ? OFFSET ?"#,
        SELECT_APPOINTMENT,
        released_statuses()
    ))
    .bind(org_text(org))
    .bind(status)
    .bind(status)
    .bind(&customer)
    .bind(&customer)
    .bind(&technician)
    .bind(&technician)
    .bind(filter.starts_from)
    .bind(filter.starts_from)
    .bind(filter.starts_before)
    .bind(filter.starts_before)
    .bind(filter.blocking_only)
    .bind(take)
    .bind(skip)
    .fetch_all(ex)
    .await
    .map_err(db_err)?;
    rows.iter().map(appointment_from_row).collect()
}

/// Who a new or moved booking must not collide with
#[derive(Debug, Clone, Copy)]
struct Clash {
    technician_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    exclude: Option<Uuid>,
}

/// Whether a blocking appointment matching `clash` overlaps `[start, end)`
async fn overlaps_existing<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    clash: Clash,
) -> Result<bool> {
    let technician = clash.technician_id.map(|t| t.to_string());
    let customer = clash.customer_id.map(|c| c.to_string());
    let exclude = clash.exclude.map(|id| id.to_string());

    let found: i64 = sqlx::query_scalar(&format!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM appointments
            WHERE organization_id = ?
              AND status NOT IN ({})
              AND scheduled_start_time < ? AND scheduled_end_time > ?
              AND (? IS NULL OR assigned_technician_id = ?)
              AND (? IS NULL OR customer_id = ?)
              AND (? IS NULL OR id <> ?)
        )
        "#,
        released_statuses()
    ))
    .bind(org_text(org))
    .bind(end)
    .bind(start)
    .bind(&technician)
    .bind(&technician)
    .bind(&customer)
    .bind(&customer)
    .bind(&exclude)
    .bind(&exclude)
    .fetch_one(ex)
    .await
    .map_err(db_err)?;
    Ok(found != 0)
}

fn interval(appointment: &Appointment) -> BusyInterval {
    BusyInterval {
        start: appointment.scheduled_start_time,
        end: appointment.scheduled_end_time,
    }
}

#[async_trait]
impl AppointmentStore for SqliteGarageStore {
    async fn create_appointment(
        &self,
        org: OrganizationId,
        input: NewAppointment,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        scheduling::validate_duration(input.estimated_duration_minutes)?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let customer = fetch_customer(&mut *tx, org, input.customer_id)
            .await?
            .ok_or_else(|| Error::rule("CustomerNotFound", "Customer not found"))?;
        fetch_car(&mut *tx, org, input.car_id)
            .await?
            .filter(|car| car.customer_id == customer.id)
            .ok_or_else(|| {
                Error::rule(
                    "CarNotFound",
                    "Car not found or does not belong to customer",
                )
            })?;

        let (start, end) = (input.scheduled_start_time, input.scheduled_end_time);
        scheduling::validate_window(start, end, Some(now))?;
        if let Some(technician_id) = input.assigned_technician_id {
            require_technician(&mut *tx, org, technician_id).await?;
        }

        let slot = Clash {
            technician_id: input.assigned_technician_id,
            customer_id: None,
            exclude: None,
        };
        if overlaps_existing(&mut *tx, org, start, end, slot).await? {
            return Err(Error::rule("SlotUnavailable", "Time slot is not available"));
        }
        let customer_slot = Clash {
            technician_id: None,
            customer_id: Some(customer.id),
            exclude: None,
        };
        if overlaps_existing(&mut *tx, org, start, end, customer_slot).await? {
            return Err(Error::rule(
                "CustomerDoubleBooked",
                "Customer already has an appointment during this time",
            ));
        }

        let id = Uuid::new_v4();
        let contact_phone = input
            .contact_phone
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| customer.phone_number.clone());
        let contact_email = input
            .contact_email
            .filter(|e| !e.trim().is_empty())
            .or_else(|| customer.email.clone());

        sqlx::query(
            r#"
            INSERT INTO appointments (
                id, organization_id, customer_id, car_id, scheduled_start_time,
                scheduled_end_time, assigned_technician_id, appointment_type, status,
                service_requested, customer_notes, internal_notes, estimated_duration_minutes,
                contact_phone, contact_email, reminder_sent, created_by_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(customer.id.to_string())
        .bind(input.car_id.to_string())
        .bind(start)
        .bind(end)
        .bind(input.assigned_technician_id.map(|v| v.to_string()))
        .bind(input.appointment_type.as_str())
        .bind(AppointmentStatus::Scheduled.as_str())
        .bind(&input.service_requested)
        .bind(&input.customer_notes)
        .bind(&input.internal_notes)
        .bind(input.estimated_duration_minutes)
        .bind(contact_phone)
        .bind(contact_email)
        .bind(created_by.map(|v| v.to_string()))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let appointment = require_appointment(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        info!(
            "Appointment {} booked for customer {} at {}",
            id, customer.id, start
        );
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current = require_appointment(&mut *tx, org, id).await?;

        let start = update
            .scheduled_start_time
            .unwrap_or(current.scheduled_start_time);
        let end = update.scheduled_end_time.unwrap_or(current.scheduled_end_time);
        let technician_id = update
            .assigned_technician_id
            .or(current.assigned_technician_id);

        if let Some(technician_id) = update.assigned_technician_id {
            require_technician(&mut *tx, org, technician_id).await?;
        }
        if update.reschedules() || update.assigned_technician_id.is_some() {
            scheduling::validate_window(start, end, None)?;
            let slot = Clash {
                technician_id,
                customer_id: None,
                exclude: Some(id),
            };
            if overlaps_existing(&mut *tx, org, start, end, slot).await? {
                return Err(Error::rule("SlotUnavailable", "Time slot is not available"));
            }
        }

        sqlx::query(
            r#"
            UPDATE appointments SET
                scheduled_start_time = ?, scheduled_end_time = ?, assigned_technician_id = ?,
                service_requested = COALESCE(?, service_requested),
                customer_notes = COALESCE(?, customer_notes),
                internal_notes = COALESCE(?, internal_notes),
                contact_phone = COALESCE(?, contact_phone),
                contact_email = COALESCE(?, contact_email),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(technician_id.map(|v| v.to_string()))
        .bind(update.service_requested)
        .bind(update.customer_notes)
        .bind(update.internal_notes)
        .bind(update.contact_phone)
        .bind(update.contact_email)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let appointment = require_appointment(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(appointment)
    }

    async fn update_appointment_status(
        &self,
        org: OrganizationId,
        id: Uuid,
        status: AppointmentStatus,
        cancellation_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Appointment> {
        let current = require_appointment(&self.pool, org, id).await?;
        let (cancelled_at, reason) = if status == AppointmentStatus::Cancelled {
            (Some(now), cancellation_reason)
        } else {
            (current.cancelled_at, current.cancellation_reason)
        };

        sqlx::query(
            r#"
            UPDATE appointments
            SET status = ?, cancelled_at = ?, cancellation_reason = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(cancelled_at)
        .bind(reason)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Appointment {} is now {}", id, status);
        require_appointment(&self.pool, org, id).await
    }

    async fn convert_appointment_to_session(
        &self,
        org: OrganizationId,
        id: Uuid,
    ) -> Result<Appointment> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let appointment = require_appointment(&mut *tx, org, id).await?;
        if appointment.session_id.is_some() {
            return Err(Error::rule(
                "AlreadyConverted",
                "Appointment already converted to session",
            ));
        }

        ensure_no_active_session(&mut tx, org, appointment.car_id).await?;
        let session = insert_session(
            &mut tx,
            org,
            appointment.car_id,
            appointment.customer_id,
            appointment.service_requested.clone(),
        )
        .await?;

        sqlx::query(
            "UPDATE appointments SET session_id = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(session.id.to_string())
        .bind(AppointmentStatus::InProgress.as_str())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let converted = require_appointment(&mut *tx, org, id).await?;
        tx.commit().await.map_err(db_err)?;
        info!("Appointment {} converted to session {}", id, session.id);
        Ok(converted)
    }

    async fn delete_appointment(&self, org: OrganizationId, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = ? AND organization_id = ?")
            .bind(id.to_string())
            .bind(org_text(org))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_appointment(&self, org: OrganizationId, id: Uuid) -> Result<Option<Appointment>> {
        fetch_appointment(&self.pool, org, id).await
    }

    async fn list_appointments(
        &self,
        org: OrganizationId,
        status: Option<AppointmentStatus>,
        page: Page,
    ) -> Result<Vec<Appointment>> {
        let filter = AppointmentFilter {
            status,
            ..Default::default()
        };
        query_appointments(&self.pool, org, filter, Some(page)).await
    }

    async fn appointments_by_date_range(
        &self,
        org: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let filter = AppointmentFilter {
            starts_from: Some(start),
            starts_before: Some(end),
            ..Default::default()
        };
        query_appointments(&self.pool, org, filter, None).await
    }

    async fn busy_intervals(
        &self,
        org: OrganizationId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        technician_id: Option<Uuid>,
    ) -> Result<Vec<BusyInterval>> {
        let filter = AppointmentFilter {
            technician_id,
            starts_from: Some(start),
            starts_before: Some(end),
            blocking_only: true,
            ..Default::default()
        };
        Ok(query_appointments(&self.pool, org, filter, None)
            .await?
            .iter()
            .map(interval)
            .collect())
    }

    async fn customer_upcoming_appointments(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let filter = AppointmentFilter {
            customer_id: Some(customer_id),
            starts_from: Some(now),
            ..Default::default()
        };
        query_appointments(&self.pool, org, filter, None).await
    }

    async fn customer_appointments(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<Vec<Appointment>> {
        let filter = AppointmentFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        };
        query_appointments(&self.pool, org, filter, None).await
    }

    async fn technician_appointments(
        &self,
        org: OrganizationId,
        technician_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        let filter = AppointmentFilter {
            technician_id: Some(technician_id),
            starts_from: Some(start),
            starts_before: Some(end),
            ..Default::default()
        };
        query_appointments(&self.pool, org, filter, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, member, store, tenant};
    use chrono::{Duration, NaiveDate, TimeZone};
    use gixat_core::models::{AppointmentType, SessionStatus};
    use gixat_core::store::GarageSessionStore;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 6, hour, minute, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 12, 0, 0).unwrap()
    }

    fn booking(customer_id: Uuid, car_id: Uuid, start: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            customer_id,
            car_id,
            scheduled_start_time: start,
            scheduled_end_time: start + Duration::hours(1),
            appointment_type: AppointmentType::OilChange,
            service_requested: Some("Oil change".into()),
            customer_notes: None,
            internal_notes: None,
            assigned_technician_id: None,
            contact_phone: None,
            contact_email: None,
            estimated_duration_minutes: 60,
        }
    }

    #[tokio::test]
    async fn test_booking_checks_run_in_order() {
        let store = store().await;
        let (org, admin) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "30-3").await;
        let (other, other_car) = customer_with_car(&store, org, "30-4").await;

        let err = store
            .create_appointment(org, booking(Uuid::new_v4(), car.id, at(9, 0)), None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Customer not found");

        let err = store
            .create_appointment(org, booking(customer.id, other_car.id, at(9, 0)), None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Car not found or does not belong to customer");

        let mut backwards = booking(customer.id, car.id, at(9, 0));
        backwards.scheduled_end_time = at(8, 0);
        let err = store
            .create_appointment(org, backwards, None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Start time must be before end time");

        let err = store
            .create_appointment(
                org,
                booking(customer.id, car.id, now() - Duration::hours(2)),
                None,
                now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot schedule appointment in the past");

        let booked = store
            .create_appointment(org, booking(customer.id, car.id, at(9, 0)), Some(admin.id), now())
            .await
            .unwrap();
        assert_eq!(booked.status, AppointmentStatus::Scheduled);
        assert_eq!(booked.contact_phone.as_deref(), Some("07930-3"));
        assert_eq!(booked.created_by_id, Some(admin.id));

        let err = store
            .create_appointment(org, booking(other.id, other_car.id, at(9, 30)), None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Time slot is not available");

        // Touching intervals are fine
        store
            .create_appointment(org, booking(other.id, other_car.id, at(10, 0)), None, now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_technician_slots_and_cancellation() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let tech = member(&store, org, "tech@a.test").await;
        let (customer, car) = customer_with_car(&store, org, "30-3").await;
        let (other, other_car) = customer_with_car(&store, org, "30-4").await;

        let mut with_tech = booking(customer.id, car.id, at(9, 0));
        with_tech.assigned_technician_id = Some(tech.id);
        let first = store
            .create_appointment(org, with_tech, None, now())
            .await
            .unwrap();

        let mut same_tech = booking(other.id, other_car.id, at(9, 0));
        same_tech.assigned_technician_id = Some(tech.id);
        let err = store
            .create_appointment(org, same_tech.clone(), None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Time slot is not available");

        let date = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        let (day_start, day_end) = scheduling::day_bounds(date);
        let busy = store
            .busy_intervals(org, day_start, day_end, Some(tech.id))
            .await
            .unwrap();
        let slots = scheduling::available_slots(date, 60, &busy);
        assert!(!slots.contains(&at(9, 0)));
        assert!(!slots.contains(&at(8, 30)));
        assert!(slots.contains(&at(10, 0)));

        let cancelled = store
            .update_appointment_status(
                org,
                first.id,
                AppointmentStatus::Cancelled,
                Some("Customer travelling".into()),
                now(),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.cancelled_at, Some(now()));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Customer travelling"));

        store
            .create_appointment(org, same_tech, None, now())
            .await
            .unwrap();
        assert_eq!(
            store
                .technician_appointments(org, tech.id, day_start, day_end)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_reschedule_excludes_itself() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "30-3").await;
        let booked = store
            .create_appointment(org, booking(customer.id, car.id, at(9, 0)), None, now())
            .await
            .unwrap();

        let moved = store
            .update_appointment(
                org,
                booked.id,
                AppointmentUpdate {
                    scheduled_start_time: Some(at(9, 30)),
                    scheduled_end_time: Some(at(10, 30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.scheduled_start_time, at(9, 30));
        assert_eq!(moved.service_requested.as_deref(), Some("Oil change"));
    }

    #[tokio::test]
    async fn test_convert_to_session() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "30-3").await;
        let booked = store
            .create_appointment(org, booking(customer.id, car.id, at(9, 0)), None, now())
            .await
            .unwrap();

        let converted = store
            .convert_appointment_to_session(org, booked.id)
            .await
            .unwrap();
        assert_eq!(converted.status, AppointmentStatus::InProgress);
        let session = store
            .get_session(org, converted.session_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Intake);
        assert_eq!(session.customer_requests.as_deref(), Some("Oil change"));

        let err = store
            .convert_appointment_to_session(org, booked.id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Appointment already converted to session");

        // The car is busy, so a second appointment cannot open a session
        let second = store
            .create_appointment(org, booking(customer.id, car.id, at(14, 0)), None, now())
            .await
            .unwrap();
        let err = store
            .convert_appointment_to_session(org, second.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BusinessRule { code: "ActiveSessionExists", .. }));
    }

    #[tokio::test]
    async fn test_filters_and_paging_happen_in_query() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (other_org, _) = tenant(&store, "b").await;
        let tech = member(&store, org, "tech@a.test").await;
        let (customer, car) = customer_with_car(&store, org, "30-3").await;
        let (other, other_car) = customer_with_car(&store, org, "30-4").await;
        let (outsider, outsider_car) = customer_with_car(&store, other_org, "30-5").await;

        let mut ids = Vec::new();
        for hour in [9, 11, 13] {
            let booked = store
                .create_appointment(org, booking(customer.id, car.id, at(hour, 0)), None, now())
                .await
                .unwrap();
            ids.push(booked.id);
        }
        store
            .create_appointment(
                other_org,
                booking(outsider.id, outsider_car.id, at(9, 0)),
                None,
                now(),
            )
            .await
            .unwrap();
        store
            .update_appointment_status(org, ids[1], AppointmentStatus::Cancelled, None, now())
            .await
            .unwrap();

        let first_two = store
            .list_appointments(org, None, Page { skip: 0, take: 2 })
            .await
            .unwrap();
        assert_eq!(
            first_two.iter().map(|a| a.id).collect::<Vec<_>>(),
            vec![ids[0], ids[1]]
        );
        let second_scheduled = store
            .list_appointments(org, Some(AppointmentStatus::Scheduled), Page { skip: 1, take: 1 })
            .await
            .unwrap();
        assert_eq!(second_scheduled.len(), 1);
        assert_eq!(second_scheduled[0].id, ids[2]);

        let window = store
            .appointments_by_date_range(org, at(10, 0), at(14, 0))
            .await
            .unwrap();
        assert_eq!(window.iter().map(|a| a.id).collect::<Vec<_>>(), vec![ids[1], ids[2]]);

        let busy = store
            .busy_intervals(org, at(0, 0), at(23, 0), None)
            .await
            .unwrap();
        assert_eq!(busy.len(), 2);

        // The cancelled slot is free again; an overlap with 09:00 is not
        store
            .create_appointment(org, booking(other.id, other_car.id, at(11, 0)), None, now())
            .await
            .unwrap();
        let err = store
            .create_appointment(org, booking(other.id, other_car.id, at(8, 30)), None, now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Time slot is not available");

        // A technician booking skips the shop-wide slot but not the customer
        let mut with_tech = booking(customer.id, car.id, at(13, 30));
        with_tech.assigned_technician_id = Some(tech.id);
        let err = store
            .create_appointment(org, with_tech, None, now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BusinessRule { code: "CustomerDoubleBooked", .. }));

        assert_eq!(
            store
                .customer_upcoming_appointments(org, customer.id, at(10, 0))
                .await
                .unwrap()
                .len(),
            2
        );
    }
}

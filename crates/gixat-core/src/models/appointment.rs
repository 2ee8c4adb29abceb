use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum AppointmentStatus {
        Scheduled,
        Confirmed,
        CheckedIn,
        InProgress,
        Completed,
        NoShow,
        Cancelled,
    }
}

impl AppointmentStatus {
    /// Whether an appointment in this status occupies its time slot
    pub fn blocks_slot(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow | AppointmentStatus::Completed
        )
    }
}

text_enum! {
    pub enum AppointmentType {
        GeneralService,
        OilChange,
        Inspection,
        Diagnostic,
        Repair,
        TireService,
        BrakeService,
        EngineService,
        TransmissionService,
        Other,
    }
}

pub const MIN_APPOINTMENT_MINUTES: i32 = 15;
pub const MAX_APPOINTMENT_MINUTES: i32 = 480;
pub const DEFAULT_APPOINTMENT_MINUTES: i32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct Appointment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub car_id: Uuid,
    /// Set once the appointment has been converted into a session
    pub session_id: Option<Uuid>,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    pub assigned_technician_id: Option<Uuid>,
    #[cfg_attr(feature = "graphql", graphql(name = "type"))]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub service_requested: Option<String>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub estimated_duration_minutes: i32,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub reminder_sent: bool,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateAppointmentInput"))]
pub struct NewAppointment {
    pub customer_id: Uuid,
    pub car_id: Uuid,
    pub scheduled_start_time: DateTime<Utc>,
    pub scheduled_end_time: DateTime<Utc>,
    #[cfg_attr(feature = "graphql", graphql(name = "type"))]
    pub appointment_type: AppointmentType,
    pub service_requested: Option<String>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    #[cfg_attr(
        feature = "graphql",
        graphql(default = 60, validator(minimum = 15, maximum = 480))
    )]
    pub estimated_duration_minutes: i32,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateAppointmentInput"))]
pub struct AppointmentUpdate {
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub service_requested: Option<String>,
    pub customer_notes: Option<String>,
    pub internal_notes: Option<String>,
    pub assigned_technician_id: Option<Uuid>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

impl AppointmentUpdate {
    pub fn reschedules(&self) -> bool {
        self.scheduled_start_time.is_some() || self.scheduled_end_time.is_some()
    }
}

/// A half-open `[start, end)` interval occupied by an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blocking_statuses() {
        assert!(AppointmentStatus::Scheduled.blocks_slot());
        assert!(AppointmentStatus::CheckedIn.blocks_slot());
        assert!(!AppointmentStatus::NoShow.blocks_slot());
        assert!(!AppointmentStatus::Completed.blocks_slot());
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let at = |h| Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap();
        let busy = BusyInterval { start: at(9), end: at(10) };
        assert!(!busy.overlaps(at(10), at(11)));
        assert!(!busy.overlaps(at(8), at(9)));
        assert!(busy.overlaps(at(8), at(11)));
    }
}

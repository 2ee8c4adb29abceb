use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Workflow position of a garage session, in visit order
    pub enum SessionStatus {
        Intake,
        Inspection,
        TestDrive,
        ReportGenerated,
        JobCardCreated,
        Completed,
        Cancelled,
    }
}

impl SessionStatus {
    /// An active session blocks new sessions for the same car
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

text_enum! {
    /// Workflow stage a media file was captured in
    pub enum SessionStage {
        Intake,
        Inspection,
        TestDrive,
        General,
    }
}

impl SessionStage {
    /// Upper-case path segment used in object keys
    pub fn key_segment(&self) -> &'static str {
        match self {
            SessionStage::Intake => "INTAKE",
            SessionStage::Inspection => "INSPECTION",
            SessionStage::TestDrive => "TESTDRIVE",
            SessionStage::General => "GENERAL",
        }
    }
}

/// A vehicle's visit to the garage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct GarageSession {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub car_id: Uuid,
    pub customer_id: Uuid,
    pub status: SessionStatus,
    pub mileage: Option<i32>,
    pub customer_requests: Option<String>,
    pub intake_notes: Option<String>,
    pub intake_requests: Option<String>,
    pub inspection_notes: Option<String>,
    pub inspection_requests: Option<String>,
    pub test_drive_notes: Option<String>,
    pub test_drive_requests: Option<String>,
    pub initial_report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One status change of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct SessionLog {
    pub id: Uuid,
    pub session_id: Uuid,
    pub from_status: SessionStatus,
    pub to_status: SessionStatus,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub car_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct IntakeUpdate {
    pub mileage: Option<i32>,
    pub intake_notes: Option<String>,
    pub intake_requests: Option<String>,
    pub customer_requests: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InspectionUpdate {
    pub inspection_notes: Option<String>,
    pub inspection_requests: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TestDriveUpdate {
    pub test_drive_notes: Option<String>,
    pub test_drive_requests: Option<String>,
}

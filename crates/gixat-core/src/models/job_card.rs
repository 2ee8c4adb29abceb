use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum JobCardStatus {
        Pending,
        InProgress,
        Completed,
        Cancelled,
    }
}

text_enum! {
    pub enum JobItemStatus {
        Pending,
        InProgress,
        Completed,
        Cancelled,
    }
}

impl JobItemStatus {
    /// Work on the item has not finished
    pub fn is_open(&self) -> bool {
        matches!(self, JobItemStatus::Pending | JobItemStatus::InProgress)
    }
}

/// A work order, usually derived from a session.
///
/// Totals are kept on the card and recalculated whenever an item's
/// estimates or actual costs change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct JobCard {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub session_id: Option<Uuid>,
    pub car_id: Uuid,
    pub customer_id: Uuid,
    pub assigned_technician_id: Option<Uuid>,
    pub status: JobCardStatus,
    pub internal_notes: Option<String>,
    pub total_estimated_cost: Decimal,
    pub total_actual_cost: Decimal,
    pub total_estimated_labor: Decimal,
    pub total_actual_labor: Decimal,
    pub total_estimated_parts: Decimal,
    pub total_actual_parts: Decimal,
    pub is_approved_by_customer: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A billable line on a job card.
///
/// `estimated_cost` and `actual_cost` are always the sum of their labor
/// and parts components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct JobItem {
    pub id: Uuid,
    pub job_card_id: Uuid,
    pub assigned_technician_id: Option<Uuid>,
    pub description: String,
    pub status: JobItemStatus,
    pub estimated_labor_cost: Decimal,
    pub estimated_parts_cost: Decimal,
    pub estimated_cost: Decimal,
    pub actual_labor_cost: Decimal,
    pub actual_parts_cost: Decimal,
    pub actual_cost: Decimal,
    pub is_approved_by_customer: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub technician_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct JobCardFilter {
    pub status: Option<JobCardStatus>,
    pub customer_id: Option<Uuid>,
    pub car_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewJobItem {
    pub description: String,
    pub estimated_labor_cost: Decimal,
    pub estimated_parts_cost: Decimal,
    pub assigned_technician_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct JobItemStatusUpdate {
    pub status: JobItemStatus,
    pub actual_labor_cost: Decimal,
    pub actual_parts_cost: Decimal,
    pub technician_notes: Option<String>,
}

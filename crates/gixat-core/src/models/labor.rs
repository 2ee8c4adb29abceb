use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A part used on, or estimated for, a job item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct JobItemPart {
    pub id: Uuid,
    pub job_item_id: Uuid,
    pub inventory_item_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    /// `quantity * unit_price`
    pub total_price: Decimal,
    /// `total_price - discount`
    pub final_price: Decimal,
    /// Actual parts are deducted from stock, estimates are not
    pub is_actual: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "AddPartToJobItemInput"))]
pub struct NewJobItemPart {
    pub job_item_id: Uuid,
    pub inventory_item_id: Uuid,
    pub quantity: Decimal,
    /// Defaults to the inventory selling price
    pub unit_price: Option<Decimal>,
    #[cfg_attr(feature = "graphql", graphql(default))]
    pub discount: Decimal,
    pub is_actual: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateJobItemPartInput"))]
pub struct JobItemPartUpdate {
    pub id: Uuid,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub is_actual: Option<bool>,
    pub notes: Option<String>,
}

/// Time a technician spent, or is expected to spend, on a job item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct LaborEntry {
    pub id: Uuid,
    pub job_item_id: Uuid,
    pub technician_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// None while the technician is still clocked in
    pub end_time: Option<DateTime<Utc>>,
    pub hours_worked: Decimal,
    pub hourly_rate: Decimal,
    /// `hours_worked * hourly_rate`
    pub total_cost: Decimal,
    pub labor_type: Option<String>,
    pub description: Option<String>,
    pub is_actual: bool,
    pub is_billable: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "AddLaborEntryInput"))]
pub struct NewLaborEntry {
    pub job_item_id: Uuid,
    pub technician_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub hours_worked: Option<Decimal>,
    pub hourly_rate: Decimal,
    pub labor_type: Option<String>,
    pub description: Option<String>,
    pub is_actual: bool,
    #[cfg_attr(feature = "graphql", graphql(default = true))]
    pub is_billable: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateLaborEntryInput"))]
pub struct LaborEntryUpdate {
    pub id: Uuid,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub hours_worked: Option<Decimal>,
    pub hourly_rate: Option<Decimal>,
    pub labor_type: Option<String>,
    pub description: Option<String>,
    pub is_actual: Option<bool>,
    pub is_billable: Option<bool>,
    pub notes: Option<String>,
}

/// Labor rolled up over every item of a job card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct LaborSummary {
    pub total_estimated_hours: Decimal,
    pub total_actual_hours: Decimal,
    pub total_estimated_cost: Decimal,
    pub total_actual_cost: Decimal,
    pub entry_count: i64,
}

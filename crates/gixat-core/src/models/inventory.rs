use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked part, material or consumable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct InventoryItem {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// SKU, unique per organization
    pub part_number: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: String,
    pub quantity_in_stock: Decimal,
    pub minimum_stock_level: Decimal,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub supplier: Option<String>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn is_low_stock(&self) -> bool {
        self.quantity_in_stock <= self.minimum_stock_level
    }
}

pub const DEFAULT_UNIT_OF_MEASURE: &str = "piece";

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateInventoryItemInput"))]
pub struct NewInventoryItem {
    pub part_number: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: Option<String>,
    pub quantity_in_stock: Decimal,
    pub minimum_stock_level: Decimal,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub supplier: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateInventoryItemInput"))]
pub struct InventoryItemUpdate {
    pub id: Uuid,
    pub part_number: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit_of_measure: Option<String>,
    pub minimum_stock_level: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub supplier: Option<String>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

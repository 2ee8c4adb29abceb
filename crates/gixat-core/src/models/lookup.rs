use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global reference data (car makes, models, colors, countries).
///
/// Items form a tree through `parent_id`: a `CarModel` points at its
/// `CarMake`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct LookupItem {
    pub id: Uuid,
    pub category: String,
    pub value: String,
    pub parent_id: Option<Uuid>,
    pub metadata: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateLookupItemInput"))]
pub struct NewLookupItem {
    pub category: String,
    pub value: String,
    pub parent_id: Option<Uuid>,
    pub metadata: Option<String>,
    #[cfg_attr(feature = "graphql", graphql(default))]
    pub sort_order: i32,
}

pub mod categories {
    pub const CAR_MAKE: &str = "CarMake";
    pub const CAR_MODEL: &str = "CarModel";
    pub const CAR_COLOR: &str = "CarColor";
    pub const COUNTRY: &str = "Country";
}

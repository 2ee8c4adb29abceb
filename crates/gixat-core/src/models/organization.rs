use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Postal address shared by organizations and customers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct Address {
    pub country: String,
    pub city: String,
    pub street: String,
    /// Dialing prefix without the plus sign, e.g. `962`
    pub phone_country_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub address: Option<Address>,
    pub logo_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateOrganizationInput"))]
pub struct NewOrganization {
    pub name: String,
    pub country: String,
    pub city: String,
    pub street: String,
    pub phone_country_code: String,
    /// Object key of an already uploaded logo
    pub logo_key: Option<String>,
    pub logo_alt: Option<String>,
}

impl NewOrganization {
    pub fn address(&self) -> Address {
        Address {
            country: self.country.clone(),
            city: self.city.clone(),
            street: self.street.clone(),
            phone_country_code: self.phone_country_code.clone(),
        }
    }
}

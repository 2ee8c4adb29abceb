use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Address;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Option<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateCustomerInput"))]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub phone_country_code: Option<String>,
}

impl NewCustomer {
    /// An address is recorded only when a country is given
    pub fn address(&self) -> Option<Address> {
        let country = self.country.as_ref().filter(|c| !c.trim().is_empty())?;
        Some(Address {
            country: country.clone(),
            city: self.city.clone().unwrap_or_default(),
            street: self.street.clone().unwrap_or_default(),
            phone_country_code: self.phone_country_code.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateCustomerInput"))]
pub struct CustomerUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub phone_country_code: Option<String>,
}

impl CustomerUpdate {
    /// Apply the present address fields on top of `current`
    pub fn merge_address(&self, current: Option<Address>) -> Option<Address> {
        let touches = self.country.is_some()
            || self.city.is_some()
            || self.street.is_some()
            || self.phone_country_code.is_some();
        if !touches {
            return current;
        }
        let mut address = current.unwrap_or_default();
        if let Some(v) = &self.country {
            address.country = v.clone();
        }
        if let Some(v) = &self.city {
            address.city = v.clone();
        }
        if let Some(v) = &self.street {
            address.street = v.clone();
        }
        if let Some(v) = &self.phone_country_code {
            address.phone_country_code = v.clone();
        }
        Some(address)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct Car {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub license_plate: String,
    pub vin: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "CreateCarInput"))]
pub struct NewCar {
    pub customer_id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub license_plate: String,
    pub vin: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateCarInput"))]
pub struct CarUpdate {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub license_plate: Option<String>,
    pub vin: Option<String>,
    pub color: Option<String>,
}

/// Per-customer counters derived from sessions, job cards and cars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct CustomerActivity {
    pub last_session_date: Option<DateTime<Utc>>,
    pub total_visits: i64,
    pub total_spent: Decimal,
    pub active_job_cards: i64,
    pub total_cars: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct CustomerStatistics {
    pub total_customers: i64,
    pub customers_this_month: i64,
    pub active_customers: i64,
    pub total_revenue: Decimal,
}

/// One line of the customer CSV export
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerExportRow {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub city: Option<String>,
    pub car_count: i64,
    pub created_at: DateTime<Utc>,
}

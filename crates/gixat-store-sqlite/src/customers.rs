use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use gixat_core::models::{
    Car, CarUpdate, Customer, CustomerActivity, CustomerExportRow, CustomerStatistics,
    CustomerUpdate, JobCardStatus, NewCar, NewCustomer, Page,
};
use gixat_core::store::CustomerStore;
use gixat_core::{Error, OrganizationId, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::organizations::address_columns;
use crate::store::{
    SqliteGarageStore, db_err, decimal, int, like_pattern, opt_text, org_text, parsed, text,
    timestamp, uuid, write_err,
};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, organization_id, first_name, last_name, email, phone_number,
           address_country, address_city, address_street, address_phone_country_code,
           created_at, updated_at
    FROM customers
"#;

const SELECT_CAR: &str = r#"
    SELECT id, organization_id, customer_id, make, model, year, license_plate,
           vin, color, created_at, updated_at
    FROM cars
"#;

fn customer_from_row(row: &SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        first_name: text(row, "first_name")?,
        last_name: text(row, "last_name")?,
        email: opt_text(row, "email")?,
        phone_number: text(row, "phone_number")?,
        address: address_columns(row)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn car_from_row(row: &SqliteRow) -> Result<Car> {
    Ok(Car {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        customer_id: uuid(row, "customer_id")?,
        make: text(row, "make")?,
        model: text(row, "model")?,
        year: row.try_get::<i32, _>("year").map_err(db_err)?,
        license_plate: text(row, "license_plate")?,
        vin: opt_text(row, "vin")?,
        color: opt_text(row, "color")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

/// Empty optional strings are stored as NULL so the partial unique
/// indexes on email and VIN ignore them
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) async fn fetch_customer<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<Customer>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_CUSTOMER
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(customer_from_row).transpose()
}

pub(crate) async fn fetch_car<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<Car>> {
    let row = sqlx::query(&format!("{} WHERE id = ? AND organization_id = ?", SELECT_CAR))
        .bind(id.to_string())
        .bind(org_text(org))
        .fetch_optional(ex)
        .await
        .map_err(db_err)?;
    row.as_ref().map(car_from_row).transpose()
}

/// Status and actual cost of job cards, optionally for one customer
async fn job_card_costs(
    store: &SqliteGarageStore,
    org: OrganizationId,
    customer_id: Option<Uuid>,
) -> Result<Vec<(JobCardStatus, Decimal)>> {
    let rows = sqlx::query(
        r#"
        SELECT status, total_actual_cost FROM job_cards
        WHERE organization_id = ? AND (? IS NULL OR customer_id = ?)
        "#,
    )
    .bind(org_text(org))
    .bind(customer_id.map(|c| c.to_string()))
    .bind(customer_id.map(|c| c.to_string()))
    .fetch_all(&store.pool)
    .await
    .map_err(db_err)?;

    rows.iter()
        .map(|row| Ok((parsed(row, "status")?, decimal(row, "total_actual_cost")?)))
        .collect()
}

fn completed_revenue(cards: &[(JobCardStatus, Decimal)]) -> Decimal {
    cards
        .iter()
        .filter(|(status, _)| *status == JobCardStatus::Completed)
        .map(|(_, cost)| *cost)
        .sum()
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[async_trait]
impl CustomerStore for SqliteGarageStore {
    async fn create_customer(&self, org: OrganizationId, input: NewCustomer) -> Result<Customer> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let address = input.address();
        let email = non_empty(input.email.clone());

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, organization_id, first_name, last_name, email, phone_number,
                address_country, address_city, address_street, address_phone_country_code,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(&email)
        .bind(input.phone_number.trim())
        .bind(address.as_ref().map(|a| a.country.clone()))
        .bind(address.as_ref().map(|a| a.city.clone()))
        .bind(address.as_ref().map(|a| a.street.clone()))
        .bind(address.as_ref().map(|a| a.phone_country_code.clone()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "A customer with this phone number or email"))?;

        info!("Created customer {} in organization {}", id, org);

        Ok(Customer {
            id,
            organization_id: *org.as_uuid(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email,
            phone_number: input.phone_number.trim().to_string(),
            address,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_customer(
        &self,
        org: OrganizationId,
        id: Uuid,
        update: CustomerUpdate,
    ) -> Result<Customer> {
        let current = fetch_customer(&self.pool, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Customer", id))?;
        let address = update.merge_address(current.address.clone());
        let email = match update.email {
            Some(email) => non_empty(Some(email)),
            None => current.email,
        };

        sqlx::query(
            r#"
            UPDATE customers SET
                first_name = ?, last_name = ?, email = ?, phone_number = ?,
                address_country = ?, address_city = ?, address_street = ?,
                address_phone_country_code = ?, updated_at = ?
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(update.first_name.unwrap_or(current.first_name))
        .bind(update.last_name.unwrap_or(current.last_name))
        .bind(email)
        .bind(update.phone_number.unwrap_or(current.phone_number))
        .bind(address.as_ref().map(|a| a.country.clone()))
        .bind(address.as_ref().map(|a| a.city.clone()))
        .bind(address.as_ref().map(|a| a.street.clone()))
        .bind(address.as_ref().map(|a| a.phone_country_code.clone()))
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "A customer with this phone number or email"))?;

        fetch_customer(&self.pool, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Customer", id))
    }

    async fn get_customer(&self, org: OrganizationId, id: Uuid) -> Result<Option<Customer>> {
        fetch_customer(&self.pool, org, id).await
    }

    async fn list_customers(
        &self,
        org: OrganizationId,
        search: Option<&str>,
        page: Page,
    ) -> Result<Vec<Customer>> {
        let term = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE organization_id = ?
              AND (? IS NULL
                   OR LOWER(first_name) LIKE ? ESCAPE '\'
                   OR LOWER(last_name) LIKE ? ESCAPE '\'
                   OR LOWER(COALESCE(email, '')) LIKE ? ESCAPE '\'
                   OR LOWER(phone_number) LIKE ? ESCAPE '\')
            ORDER BY last_name, first_name
            LIMIT ? OFFSET ?"#,
            SELECT_CUSTOMER
        ))
        .bind(org_text(org))
        .bind(&term)
        .bind(&term)
        .bind(&term)
        .bind(&term)
        .bind(&term)
        .bind(page.take)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn create_car(&self, org: OrganizationId, input: NewCar) -> Result<Car> {
        if fetch_customer(&self.pool, org, input.customer_id)
            .await?
            .is_none()
        {
            return Err(Error::not_found("Customer", input.customer_id));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let vin = non_empty(input.vin);
        let color = non_empty(input.color);

        sqlx::query(
            r#"
            INSERT INTO cars (
                id, organization_id, customer_id, make, model, year, license_plate,
                vin, color, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(input.customer_id.to_string())
        .bind(input.make.trim())
        .bind(input.model.trim())
        .bind(input.year)
        .bind(input.license_plate.trim())
        .bind(&vin)
        .bind(&color)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "A car with this license plate or VIN"))?;

        info!("Created car {} for customer {}", id, input.customer_id);

        Ok(Car {
            id,
            organization_id: *org.as_uuid(),
            customer_id: input.customer_id,
            make: input.make.trim().to_string(),
            model: input.model.trim().to_string(),
            year: input.year,
            license_plate: input.license_plate.trim().to_string(),
            vin,
            color,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_car(&self, org: OrganizationId, id: Uuid, update: CarUpdate) -> Result<Car> {
        let current = fetch_car(&self.pool, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Car", id))?;

        sqlx::query(
            r#"
            UPDATE cars SET
                make = ?, model = ?, year = ?, license_plate = ?, vin = ?, color = ?,
                updated_at = ?
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(update.make.unwrap_or(current.make))
        .bind(update.model.unwrap_or(current.model))
        .bind(update.year.unwrap_or(current.year))
        .bind(update.license_plate.unwrap_or(current.license_plate))
        .bind(match update.vin {
            Some(vin) => non_empty(Some(vin)),
            None => current.vin,
        })
        .bind(update.color.or(current.color))
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "A car with this license plate or VIN"))?;

        fetch_car(&self.pool, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Car", id))
    }

    async fn get_car(&self, org: OrganizationId, id: Uuid) -> Result<Option<Car>> {
        fetch_car(&self.pool, org, id).await
    }

    async fn list_cars(&self, org: OrganizationId, customer_id: Option<Uuid>) -> Result<Vec<Car>> {
        let customer = customer_id.map(|c| c.to_string());
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? AND (? IS NULL OR customer_id = ?) ORDER BY make, model",
            SELECT_CAR
        ))
        .bind(org_text(org))
        .bind(&customer)
        .bind(&customer)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(car_from_row).collect()
    }

    async fn customer_activity(
        &self,
        org: OrganizationId,
        customer_id: Uuid,
    ) -> Result<CustomerActivity> {
        let sessions = sqlx::query(
            "SELECT created_at FROM garage_sessions WHERE organization_id = ? AND customer_id = ?",
        )
        .bind(org_text(org))
        .bind(customer_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let session_dates = sessions
            .iter()
            .map(|row| timestamp(row, "created_at"))
            .collect::<Result<Vec<_>>>()?;

        let total_cars: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cars WHERE organization_id = ? AND customer_id = ?",
        )
        .bind(org_text(org))
        .bind(customer_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let cards = job_card_costs(self, org, Some(customer_id)).await?;
        let active_job_cards = cards
            .iter()
            .filter(|(status, _)| {
                matches!(status, JobCardStatus::Pending | JobCardStatus::InProgress)
            })
            .count() as i64;

        Ok(CustomerActivity {
            last_session_date: session_dates.iter().max().copied(),
            total_visits: session_dates.len() as i64,
            total_spent: completed_revenue(&cards),
            active_job_cards,
            total_cars,
        })
    }

    async fn customer_statistics(
        &self,
        org: OrganizationId,
        now: DateTime<Utc>,
    ) -> Result<CustomerStatistics> {
        let rows = sqlx::query("SELECT created_at FROM customers WHERE organization_id = ?")
            .bind(org_text(org))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let created = rows
            .iter()
            .map(|row| timestamp(row, "created_at"))
            .collect::<Result<Vec<_>>>()?;
        let since_month = month_start(now);

        let recent_cutoff = now - Duration::days(90);
        let sessions = sqlx::query(
            "SELECT customer_id, created_at FROM garage_sessions WHERE organization_id = ?",
        )
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let mut active = HashSet::new();
        for row in &sessions {
            if timestamp(row, "created_at")? >= recent_cutoff {
                active.insert(uuid(row, "customer_id")?);
            }
        }

        let cards = job_card_costs(self, org, None).await?;

        Ok(CustomerStatistics {
            total_customers: created.len() as i64,
            customers_this_month: created.iter().filter(|c| **c >= since_month).count() as i64,
            active_customers: active.len() as i64,
            total_revenue: completed_revenue(&cards),
        })
    }

    async fn customer_export_rows(&self, org: OrganizationId) -> Result<Vec<CustomerExportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT c.first_name, c.last_name, c.email, c.phone_number, c.address_city,
                   c.created_at,
                   (SELECT COUNT(*) FROM cars WHERE cars.customer_id = c.id) AS car_count
            FROM customers c
            WHERE c.organization_id = ?
            ORDER BY c.first_name, c.last_name
            "#,
        )
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(CustomerExportRow {
                    first_name: text(row, "first_name")?,
                    last_name: text(row, "last_name")?,
                    email: opt_text(row, "email")?,
                    phone_number: text(row, "phone_number")?,
                    city: opt_text(row, "address_city")?,
                    car_count: int(row, "car_count")?,
                    created_at: timestamp(row, "created_at")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, new_customer, store, tenant};

    #[tokio::test]
    async fn test_duplicate_phone_is_rejected_per_organization() {
        let store = store().await;
        let (org_a, _) = tenant(&store, "a").await;
        let (org_b, _) = tenant(&store, "b").await;

        store
            .create_customer(org_a, new_customer("0791111111"))
            .await
            .unwrap();
        let err = store
            .create_customer(org_a, new_customer("0791111111"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BusinessRule { code: "DuplicateValue", .. }));

        // Same phone in another tenant is fine
        store
            .create_customer(org_b, new_customer("0791111111"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_blank_emails_do_not_collide() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let mut first = new_customer("0791");
        first.email = Some("  ".into());
        let mut second = new_customer("0792");
        second.email = Some(String::new());

        assert!(store.create_customer(org, first).await.unwrap().email.is_none());
        store.create_customer(org, second).await.unwrap();
    }

    #[tokio::test]
    async fn test_search_and_ordering() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        for (first, last, phone) in [("Omar", "Zaid", "1"), ("Sara", "Abbas", "2"), ("Ali", "Abbas", "3")] {
            let mut input = new_customer(phone);
            input.first_name = first.into();
            input.last_name = last.into();
            store.create_customer(org, input).await.unwrap();
        }

        let all = store.list_customers(org, None, Page::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|c| c.full_name()).collect();
        assert_eq!(names, ["Ali Abbas", "Sara Abbas", "Omar Zaid"]);

        let found = store
            .list_customers(org, Some("ABB"), Page::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let paged = store
            .list_customers(org, None, Page::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(paged[0].first_name, "Sara");
    }

    #[tokio::test]
    async fn test_car_requires_customer_in_tenant() {
        let store = store().await;
        let (org_a, _) = tenant(&store, "a").await;
        let (org_b, _) = tenant(&store, "b").await;
        let (customer, _) = customer_with_car(&store, org_a, "10-1234").await;

        let err = store
            .create_car(
                org_b,
                NewCar {
                    customer_id: customer.id,
                    make: "Kia".into(),
                    model: "Rio".into(),
                    year: 2020,
                    license_plate: "20-5555".into(),
                    vin: None,
                    color: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Customer with ID '{}' not found", customer.id)
        );
    }

    #[tokio::test]
    async fn test_update_car_keeps_unspecified_fields() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (_, car) = customer_with_car(&store, org, "10-1234").await;

        let updated = store
            .update_car(
                org,
                car.id,
                CarUpdate {
                    color: Some("Red".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.color.as_deref(), Some("Red"));
        assert_eq!(updated.license_plate, "10-1234");
        assert_eq!(updated.year, 2019);
    }

    #[tokio::test]
    async fn test_statistics_and_export() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        customer_with_car(&store, org, "10-1").await;
        store
            .create_customer(org, new_customer("0799"))
            .await
            .unwrap();

        let stats = store.customer_statistics(org, Utc::now()).await.unwrap();
        assert_eq!(stats.total_customers, 2);
        assert_eq!(stats.customers_this_month, 2);
        assert_eq!(stats.active_customers, 0);
        assert_eq!(stats.total_revenue, Decimal::ZERO);

        let rows = store.customer_export_rows(org).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().map(|r| r.car_count).sum::<i64>(), 1);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 13, 5, 0).unwrap();
        assert_eq!(
            month_start(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}

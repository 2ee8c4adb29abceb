use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::models::{
    JobItemPart, JobItemPartUpdate, LaborEntry, LaborEntryUpdate, LaborSummary, NewJobItemPart,
    NewLaborEntry,
};
use gixat_core::pricing::{self, PartState};
use gixat_core::store::PartsLaborStore;
use gixat_core::{Error, OrganizationId, Result};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, SqliteExecutor, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::inventory::{fetch_inventory_item, inventory_not_found, set_stock};
use crate::job_cards::{fetch_job_card, require_job_item, require_technician};
use crate::store::{
    SqliteGarageStore, db_err, decimal, flag, opt_text, opt_timestamp, org_text, timestamp, uuid,
};

const SELECT_PART: &str = r#"
    SELECT p.id, p.job_item_id, p.inventory_item_id, p.quantity, p.unit_price, p.discount,
           p.is_actual, p.notes, p.created_at
    FROM job_item_parts p
    JOIN job_items i ON i.id = p.job_item_id
    JOIN job_cards c ON c.id = i.job_card_id
"#;

const SELECT_LABOR: &str = r#"
    SELECT l.id, l.job_item_id, l.technician_id, l.start_time, l.end_time, l.hours_worked,
           l.hourly_rate, l.labor_type, l.description, l.is_actual, l.is_billable, l.notes,
           l.created_at
    FROM labor_entries l
    JOIN job_items i ON i.id = l.job_item_id
    JOIN job_cards c ON c.id = i.job_card_id
"#;

fn part_from_row(row: &SqliteRow) -> Result<JobItemPart> {
    let quantity = decimal(row, "quantity")?;
    let unit_price = decimal(row, "unit_price")?;
    let discount = decimal(row, "discount")?;
    let (total_price, final_price) = pricing::part_prices(quantity, unit_price, discount);
    Ok(JobItemPart {
        id: uuid(row, "id")?,
        job_item_id: uuid(row, "job_item_id")?,
        inventory_item_id: uuid(row, "inventory_item_id")?,
        quantity,
        unit_price,
        discount,
        total_price,
        final_price,
        is_actual: flag(row, "is_actual")?,
        notes: opt_text(row, "notes")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn labor_from_row(row: &SqliteRow) -> Result<LaborEntry> {
    let hours_worked = decimal(row, "hours_worked")?;
    let hourly_rate = decimal(row, "hourly_rate")?;
    Ok(LaborEntry {
        id: uuid(row, "id")?,
        job_item_id: uuid(row, "job_item_id")?,
        technician_id: uuid(row, "technician_id")?,
        start_time: timestamp(row, "start_time")?,
        end_time: opt_timestamp(row, "end_time")?,
        hours_worked,
        hourly_rate,
        total_cost: pricing::labor_cost(hours_worked, hourly_rate),
        labor_type: opt_text(row, "labor_type")?,
        description: opt_text(row, "description")?,
        is_actual: flag(row, "is_actual")?,
        is_billable: flag(row, "is_billable")?,
        notes: opt_text(row, "notes")?,
        created_at: timestamp(row, "created_at")?,
    })
}

async fn fetch_part<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<JobItemPart>> {
    let row = sqlx::query(&format!(
        "{} WHERE p.id = ? AND c.organization_id = ?",
        SELECT_PART
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(part_from_row).transpose()
}

async fn fetch_labor<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<LaborEntry>> {
    let row = sqlx::query(&format!(
        "{} WHERE l.id = ? AND c.organization_id = ?",
        SELECT_LABOR
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(labor_from_row).transpose()
}

/// Quantity must be positive; price and discount may not be negative
fn check_part_amounts(quantity: Decimal, unit_price: Option<Decimal>, discount: Decimal) -> Result<()> {
    if quantity <= Decimal::ZERO {
        return Err(Error::InvalidRequest(
            "Quantity must be greater than zero".to_string(),
        ));
    }
    if unit_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(Error::InvalidRequest(
            "Unit price cannot be negative".to_string(),
        ));
    }
    if discount < Decimal::ZERO {
        return Err(Error::InvalidRequest(
            "Discount cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn check_labor_window(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<()> {
    if let Some(end) = end
        && end < start
    {
        return Err(Error::InvalidRequest(
            "End time must be after start time".to_string(),
        ));
    }
    Ok(())
}

fn labor_not_found(id: Uuid) -> Error {
    Error::not_found("Labor entry", id)
}

/// Apply the stock effect of a part line moving from `before` to `after`
async fn move_stock(
    tx: &mut Transaction<'_, Sqlite>,
    org: OrganizationId,
    inventory_item_id: Uuid,
    before: Option<PartState>,
    after: Option<PartState>,
) -> Result<()> {
    let delta = pricing::part_stock_delta(before, after);
    if delta.is_zero() {
        return Ok(());
    }

    let item = fetch_inventory_item(&mut **tx, org, inventory_item_id)
        .await?
        .ok_or_else(|| inventory_not_found(inventory_item_id))?;
    if delta > Decimal::ZERO {
        pricing::ensure_stock(&item.name, item.quantity_in_stock, delta)?;
    }
    let remaining = item.quantity_in_stock - delta;
    set_stock(&mut **tx, inventory_item_id, remaining).await?;

    info!(
        "Stock of {} changed by {} to {}",
        item.part_number,
        (-delta).normalize(),
        remaining.normalize()
    );
    Ok(())
}

impl SqliteGarageStore {
    async fn labor_where(
        &self,
        org: OrganizationId,
        clause: &str,
        binds: &[Option<String>],
    ) -> Result<Vec<LaborEntry>> {
        let sql = format!("{} WHERE c.organization_id = ? AND {}", SELECT_LABOR, clause);
        let mut query = sqlx::query(&sql).bind(org_text(org));
        for value in binds {
            query = query.bind(value.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(labor_from_row).collect()
    }
}

#[async_trait]
impl PartsLaborStore for SqliteGarageStore {
    async fn add_part_to_job_item(
        &self,
        org: OrganizationId,
        input: NewJobItemPart,
    ) -> Result<JobItemPart> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        require_job_item(&mut *tx, org, input.job_item_id).await?;
        let inventory = fetch_inventory_item(&mut *tx, org, input.inventory_item_id)
            .await?
            .ok_or_else(|| inventory_not_found(input.inventory_item_id))?;

        check_part_amounts(input.quantity, input.unit_price, input.discount)?;

        move_stock(
            &mut tx,
            org,
            inventory.id,
            None,
            Some((input.is_actual, input.quantity)),
        )
        .await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let unit_price = input.unit_price.unwrap_or(inventory.selling_price);
        sqlx::query(
            r#"
            INSERT INTO job_item_parts (
                id, job_item_id, inventory_item_id, quantity, unit_price, discount,
                is_actual, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.job_item_id.to_string())
        .bind(inventory.id.to_string())
        .bind(input.quantity.to_string())
        .bind(unit_price.to_string())
        .bind(input.discount.to_string())
        .bind(input.is_actual)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let part = fetch_part(&mut *tx, org, id)
            .await?
            .ok_or_else(|| Error::not_found("Part", id))?;
        tx.commit().await.map_err(db_err)?;
        info!("Added part {} to job item {}", inventory.part_number, input.job_item_id);
        Ok(part)
    }

    async fn update_job_item_part(
        &self,
        org: OrganizationId,
        update: JobItemPartUpdate,
    ) -> Result<JobItemPart> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current = fetch_part(&mut *tx, org, update.id)
            .await?
            .ok_or_else(|| Error::not_found("Part", update.id))?;

        let quantity = update.quantity.unwrap_or(current.quantity);
        let unit_price = update.unit_price.unwrap_or(current.unit_price);
        let discount = update.discount.unwrap_or(current.discount);
        check_part_amounts(quantity, Some(unit_price), discount)?;
        let is_actual = update.is_actual.unwrap_or(current.is_actual);
        move_stock(
            &mut tx,
            org,
            current.inventory_item_id,
            Some((current.is_actual, current.quantity)),
            Some((is_actual, quantity)),
        )
        .await?;

        sqlx::query(
            r#"
            UPDATE job_item_parts SET
                quantity = ?, unit_price = ?, discount = ?, is_actual = ?,
                notes = COALESCE(?, notes), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(quantity.to_string())
        .bind(unit_price.to_string())
        .bind(discount.to_string())
        .bind(is_actual)
        .bind(update.notes)
        .bind(Utc::now())
        .bind(update.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let part = fetch_part(&mut *tx, org, update.id)
            .await?
            .ok_or_else(|| Error::not_found("Part", update.id))?;
        tx.commit().await.map_err(db_err)?;
        Ok(part)
    }

    async fn remove_part_from_job_item(&self, org: OrganizationId, id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let Some(part) = fetch_part(&mut *tx, org, id).await? else {
            return Ok(false);
        };

        move_stock(
            &mut tx,
            org,
            part.inventory_item_id,
            Some((part.is_actual, part.quantity)),
            None,
        )
        .await?;
        sqlx::query("DELETE FROM job_item_parts WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn parts_for_job_item(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<JobItemPart>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.job_item_id = ? AND c.organization_id = ? ORDER BY p.created_at, p.rowid",
            SELECT_PART
        ))
        .bind(job_item_id.to_string())
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(part_from_row).collect()
    }

    async fn add_labor_entry(
        &self,
        org: OrganizationId,
        input: NewLaborEntry,
    ) -> Result<LaborEntry> {
        require_job_item(&self.pool, org, input.job_item_id).await?;
        require_technician(&self.pool, org, input.technician_id).await?;
        check_labor_window(input.start_time, input.end_time)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let hours = input
            .hours_worked
            .unwrap_or_else(|| pricing::hours_between(input.start_time, input.end_time));

        sqlx::query(
            r#"
            INSERT INTO labor_entries (
                id, job_item_id, technician_id, start_time, end_time, hours_worked,
                hourly_rate, labor_type, description, is_actual, is_billable, notes,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.job_item_id.to_string())
        .bind(input.technician_id.to_string())
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(hours.to_string())
        .bind(input.hourly_rate.to_string())
        .bind(&input.labor_type)
        .bind(&input.description)
        .bind(input.is_actual)
        .bind(input.is_billable)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!(
            "Technician {} logged {} hours on job item {}",
            input.technician_id,
            hours.normalize(),
            input.job_item_id
        );
        fetch_labor(&self.pool, org, id)
            .await?
            .ok_or_else(|| labor_not_found(id))
    }

    async fn update_labor_entry(
        &self,
        org: OrganizationId,
        update: LaborEntryUpdate,
    ) -> Result<LaborEntry> {
        let current = fetch_labor(&self.pool, org, update.id)
            .await?
            .ok_or_else(|| labor_not_found(update.id))?;

        let start_time = update.start_time.unwrap_or(current.start_time);
        let end_time = update.end_time.or(current.end_time);
        check_labor_window(start_time, end_time)?;
        if update.hours_worked.is_some_and(|h| h < Decimal::ZERO) {
            return Err(Error::InvalidRequest(
                "Hours worked cannot be negative".to_string(),
            ));
        }
        let times_changed = update.start_time.is_some() || update.end_time.is_some();
        let hours = match update.hours_worked {
            Some(hours) => hours,
            None if times_changed => pricing::hours_between(start_time, end_time),
            None => current.hours_worked,
        };

        sqlx::query(
            r#"
            UPDATE labor_entries SET
                start_time = ?, end_time = ?, hours_worked = ?, hourly_rate = ?,
                labor_type = ?, description = ?, is_actual = ?, is_billable = ?, notes = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(start_time)
        .bind(end_time)
        .bind(hours.to_string())
        .bind(update.hourly_rate.unwrap_or(current.hourly_rate).to_string())
        .bind(update.labor_type.or(current.labor_type))
        .bind(update.description.or(current.description))
        .bind(update.is_actual.unwrap_or(current.is_actual))
        .bind(update.is_billable.unwrap_or(current.is_billable))
        .bind(update.notes.or(current.notes))
        .bind(Utc::now())
        .bind(update.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        fetch_labor(&self.pool, org, update.id)
            .await?
            .ok_or_else(|| labor_not_found(update.id))
    }

    async fn clock_out_labor_entry(
        &self,
        org: OrganizationId,
        id: Uuid,
        end_time: DateTime<Utc>,
    ) -> Result<LaborEntry> {
        let entry = fetch_labor(&self.pool, org, id)
            .await?
            .ok_or_else(|| labor_not_found(id))?;
        if entry.end_time.is_some() {
            return Err(Error::rule(
                "AlreadyClockedOut",
                "Labor entry is already clocked out.",
            ));
        }

        check_labor_window(entry.start_time, Some(end_time))?;
        let hours = pricing::hours_between(entry.start_time, Some(end_time));
        sqlx::query(
            "UPDATE labor_entries SET end_time = ?, hours_worked = ?, updated_at = ? WHERE id = ?",
        )
        .bind(end_time)
        .bind(hours.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Technician {} clocked out of entry {}", entry.technician_id, id);
        fetch_labor(&self.pool, org, id)
            .await?
            .ok_or_else(|| labor_not_found(id))
    }

    async fn delete_labor_entry(&self, org: OrganizationId, id: Uuid) -> Result<bool> {
        if fetch_labor(&self.pool, org, id).await?.is_none() {
            return Ok(false);
        }
        let result = sqlx::query("DELETE FROM labor_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_labor_entry(&self, org: OrganizationId, id: Uuid) -> Result<Option<LaborEntry>> {
        fetch_labor(&self.pool, org, id).await
    }

    async fn labor_entries_by_job_item(
        &self,
        org: OrganizationId,
        job_item_id: Uuid,
    ) -> Result<Vec<LaborEntry>> {
        self.labor_where(
            org,
            "l.job_item_id = ? ORDER BY l.start_time",
            &[Some(job_item_id.to_string())],
        )
        .await
    }

    async fn labor_entries_by_technician(
        &self,
        org: OrganizationId,
        technician_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LaborEntry>> {
        let entries = self
            .labor_where(
                org,
                "l.technician_id = ? ORDER BY l.start_time DESC",
                &[Some(technician_id.to_string())],
            )
            .await?;
        Ok(entries
            .into_iter()
            .filter(|e| start.is_none_or(|s| e.start_time >= s))
            .filter(|e| end.is_none_or(|end| e.start_time <= end))
            .collect())
    }

    async fn active_labor_entries(&self, org: OrganizationId) -> Result<Vec<LaborEntry>> {
        self.labor_where(org, "l.end_time IS NULL ORDER BY l.start_time", &[])
            .await
    }

    async fn labor_summary_by_job_card(
        &self,
        org: OrganizationId,
        job_card_id: Uuid,
    ) -> Result<LaborSummary> {
        if fetch_job_card(&self.pool, org, job_card_id).await?.is_none() {
            return Err(Error::not_found("Job card", job_card_id));
        }
        let entries = self
            .labor_where(
                org,
                "i.job_card_id = ? ORDER BY l.start_time",
                &[Some(job_card_id.to_string())],
            )
            .await?;
        Ok(pricing::labor_summary(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer_with_car, member, store, tenant};
    use chrono::Duration;
    use gixat_core::models::{
        GarageSession, InventoryItem, IntakeUpdate, JobItem, NewInventoryItem,
    };
    use gixat_core::store::{GarageSessionStore, InventoryStore, JobCardStore};

    fn dec(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    struct Fixture {
        store: SqliteGarageStore,
        org: OrganizationId,
        item: JobItem,
        stock: InventoryItem,
    }

    async fn fixture() -> Fixture {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let (customer, car) = customer_with_car(&store, org, "10-1").await;
        let session: GarageSession = store.create_session(org, car.id, customer.id).await.unwrap();
        store
            .update_intake(
                org,
                session.id,
                IntakeUpdate {
                    customer_requests: Some("Replace brake pads".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .generate_initial_report(org, session.id, "ok".into())
            .await
            .unwrap();
        let card = store
            .create_job_card_from_session(org, session.id)
            .await
            .unwrap();
        let item = store.job_items(org, card.id).await.unwrap().remove(0);
        let stock = store
            .create_inventory_item(
                org,
                NewInventoryItem {
                    part_number: "BP-1".into(),
                    name: "Brake pad".into(),
                    description: None,
                    category: None,
                    unit_of_measure: None,
                    quantity_in_stock: dec("5"),
                    minimum_stock_level: dec("1"),
                    cost_price: dec("10"),
                    selling_price: dec("20"),
                    supplier: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        Fixture {
            store,
            org,
            item,
            stock,
        }
    }

    impl Fixture {
        async fn stock_level(&self) -> Decimal {
            self.store
                .get_inventory_item(self.org, self.stock.id)
                .await
                .unwrap()
                .unwrap()
                .quantity_in_stock
        }

        fn part(&self, quantity: &str, is_actual: bool) -> NewJobItemPart {
            NewJobItemPart {
                job_item_id: self.item.id,
                inventory_item_id: self.stock.id,
                quantity: dec(quantity),
                unit_price: None,
                discount: dec("5"),
                is_actual,
                notes: None,
            }
        }
    }

    fn part_update(id: Uuid, quantity: Option<&str>, is_actual: Option<bool>) -> JobItemPartUpdate {
        JobItemPartUpdate {
            id,
            quantity: quantity.map(dec),
            unit_price: None,
            discount: None,
            is_actual,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_actual_parts_move_stock() {
        let f = fixture().await;

        let part = f
            .store
            .add_part_to_job_item(f.org, f.part("2", true))
            .await
            .unwrap();
        assert_eq!(part.unit_price, dec("20"));
        assert_eq!(part.total_price, dec("40"));
        assert_eq!(part.final_price, dec("35"));
        assert_eq!(f.stock_level().await, dec("3"));

        // actual -> actual applies the difference
        f.store
            .update_job_item_part(f.org, part_update(part.id, Some("3"), None))
            .await
            .unwrap();
        assert_eq!(f.stock_level().await, dec("2"));

        // actual -> estimate restores the old quantity
        f.store
            .update_job_item_part(f.org, part_update(part.id, None, Some(false)))
            .await
            .unwrap();
        assert_eq!(f.stock_level().await, dec("5"));

        // estimate -> actual deducts the new quantity
        f.store
            .update_job_item_part(f.org, part_update(part.id, Some("4"), Some(true)))
            .await
            .unwrap();
        assert_eq!(f.stock_level().await, dec("1"));

        assert!(f.store.remove_part_from_job_item(f.org, part.id).await.unwrap());
        assert_eq!(f.stock_level().await, dec("5"));
    }

    #[tokio::test]
    async fn test_part_update_rejects_invalid_amounts() {
        let f = fixture().await;
        let part = f
            .store
            .add_part_to_job_item(f.org, f.part("2", true))
            .await
            .unwrap();
        assert_eq!(f.stock_level().await, dec("3"));

        for quantity in ["-5", "0"] {
            let err = f
                .store
                .update_job_item_part(f.org, part_update(part.id, Some(quantity), None))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }

        let mut negative_price = part_update(part.id, None, None);
        negative_price.unit_price = Some(dec("-1"));
        assert!(f.store.update_job_item_part(f.org, negative_price).await.is_err());

        let mut negative_discount = part_update(part.id, None, None);
        negative_discount.discount = Some(dec("-3"));
        assert!(f.store.update_job_item_part(f.org, negative_discount).await.is_err());

        // Nothing was restored to stock and the line is unchanged
        assert_eq!(f.stock_level().await, dec("3"));
        let parts = f.store.parts_for_job_item(f.org, f.item.id).await.unwrap();
        assert_eq!(parts[0].quantity, dec("2"));
        assert_eq!(parts[0].discount, dec("5"));

        let mut add = f.part("1", true);
        add.discount = dec("-1");
        assert!(f.store.add_part_to_job_item(f.org, add).await.is_err());
        assert_eq!(f.stock_level().await, dec("3"));
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_nothing_behind() {
        let f = fixture().await;
        let err = f
            .store
            .add_part_to_job_item(f.org, f.part("6", true))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for 'Brake pad'. Available: 5, Required: 6"
        );
        assert!(f.store.parts_for_job_item(f.org, f.item.id).await.unwrap().is_empty());

        // Estimates never touch stock
        f.store
            .add_part_to_job_item(f.org, f.part("6", false))
            .await
            .unwrap();
        assert_eq!(f.stock_level().await, dec("5"));
    }

    #[tokio::test]
    async fn test_labor_entry_lifecycle() {
        let f = fixture().await;
        let tech = member(&f.store, f.org, "tech@a.test").await;
        let start = Utc::now() - Duration::minutes(150);

        let entry = f
            .store
            .add_labor_entry(
                f.org,
                NewLaborEntry {
                    job_item_id: f.item.id,
                    technician_id: tech.id,
                    start_time: start,
                    end_time: None,
                    hours_worked: None,
                    hourly_rate: dec("30"),
                    labor_type: None,
                    description: None,
                    is_actual: true,
                    is_billable: true,
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(entry.hours_worked, Decimal::ZERO);
        assert_eq!(f.store.active_labor_entries(f.org).await.unwrap().len(), 1);

        let closed = f
            .store
            .clock_out_labor_entry(f.org, entry.id, start + Duration::minutes(90))
            .await
            .unwrap();
        assert_eq!(closed.hours_worked, dec("1.5"));
        assert_eq!(closed.total_cost, dec("45"));
        assert!(f.store.active_labor_entries(f.org).await.unwrap().is_empty());

        let err = f
            .store
            .clock_out_labor_entry(f.org, entry.id, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Labor entry is already clocked out.");

        let card_id = f.item.job_card_id;
        let summary = f.store.labor_summary_by_job_card(f.org, card_id).await.unwrap();
        assert_eq!(summary.entry_count, 1);
        assert_eq!(summary.total_actual_hours, dec("1.5"));
        assert_eq!(summary.total_actual_cost, dec("45"));

        let by_tech = f
            .store
            .labor_entries_by_technician(f.org, tech.id, Some(Utc::now()), None)
            .await
            .unwrap();
        assert!(by_tech.is_empty());
    }

    #[tokio::test]
    async fn test_labor_end_before_start_is_rejected() {
        let f = fixture().await;
        let tech = member(&f.store, f.org, "tech@a.test").await;
        let start = Utc::now() - Duration::hours(1);
        let entry = f
            .store
            .add_labor_entry(
                f.org,
                NewLaborEntry {
                    job_item_id: f.item.id,
                    technician_id: tech.id,
                    start_time: start,
                    end_time: None,
                    hours_worked: None,
                    hourly_rate: dec("40"),
                    labor_type: None,
                    description: None,
                    is_actual: true,
                    is_billable: true,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let err = f
            .store
            .clock_out_labor_entry(f.org, entry.id, start - Duration::hours(3))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = f
            .store
            .update_labor_entry(
                f.org,
                LaborEntryUpdate {
                    id: entry.id,
                    start_time: None,
                    end_time: Some(start - Duration::minutes(30)),
                    hours_worked: None,
                    hourly_rate: None,
                    labor_type: None,
                    description: None,
                    is_actual: None,
                    is_billable: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let stored = f.store.get_labor_entry(f.org, entry.id).await.unwrap().unwrap();
        assert!(stored.end_time.is_none());
        assert_eq!(stored.hours_worked, Decimal::ZERO);
        let summary = f
            .store
            .labor_summary_by_job_card(f.org, f.item.job_card_id)
            .await
            .unwrap();
        assert!(summary.total_actual_cost >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_labor_requires_tenant_technician() {
        let f = fixture().await;
        let (other_org, _) = tenant(&f.store, "b").await;
        let outsider = member(&f.store, other_org, "tech@b.test").await;

        let err = f
            .store
            .add_labor_entry(
                f.org,
                NewLaborEntry {
                    job_item_id: f.item.id,
                    technician_id: outsider.id,
                    start_time: Utc::now(),
                    end_time: None,
                    hours_worked: Some(dec("2")),
                    hourly_rate: dec("30"),
                    labor_type: None,
                    description: None,
                    is_actual: false,
                    is_billable: true,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Technician with ID '{}' not found.", outsider.id)
        );
    }
}

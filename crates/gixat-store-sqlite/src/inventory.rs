use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::models::{
    DEFAULT_UNIT_OF_MEASURE, InventoryItem, InventoryItemUpdate, NewInventoryItem,
};
use gixat_core::pricing;
use gixat_core::store::InventoryStore;
use gixat_core::{Error, OrganizationId, Result};
use rust_decimal::Decimal;
use sqlx::SqliteExecutor;
use sqlx::sqlite::SqliteRow;
use tracing::info;
use uuid::Uuid;

use crate::store::{
    SqliteGarageStore, db_err, decimal, flag, like_pattern, opt_text, org_text, text, timestamp,
    uuid,
};

const SELECT_INVENTORY_ITEM: &str = r#"
    SELECT id, organization_id, part_number, name, description, category, unit_of_measure,
           quantity_in_stock, minimum_stock_level, cost_price, selling_price, supplier,
           is_active, notes, created_at, updated_at
    FROM inventory_items
"#;

fn inventory_item_from_row(row: &SqliteRow) -> Result<InventoryItem> {
    Ok(InventoryItem {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        part_number: text(row, "part_number")?,
        name: text(row, "name")?,
        description: opt_text(row, "description")?,
        category: opt_text(row, "category")?,
        unit_of_measure: text(row, "unit_of_measure")?,
        quantity_in_stock: decimal(row, "quantity_in_stock")?,
        minimum_stock_level: decimal(row, "minimum_stock_level")?,
        cost_price: decimal(row, "cost_price")?,
        selling_price: decimal(row, "selling_price")?,
        supplier: opt_text(row, "supplier")?,
        is_active: flag(row, "is_active")?,
        notes: opt_text(row, "notes")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn duplicate_part_number(part_number: &str) -> Error {
    Error::rule(
        "DuplicateValue",
        format!(
            "Inventory item with part number '{}' already exists.",
            part_number
        ),
    )
}

fn map_write(e: sqlx::Error, part_number: &str) -> Error {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => duplicate_part_number(part_number),
        _ => db_err(e),
    }
}

pub(crate) async fn fetch_inventory_item<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    id: Uuid,
) -> Result<Option<InventoryItem>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_INVENTORY_ITEM
    ))
    .bind(id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(inventory_item_from_row).transpose()
}

pub(crate) fn inventory_not_found(id: Uuid) -> Error {
    Error::NotFound(format!("Inventory item with ID '{}' not found.", id))
}

/// Overwrite the stock level of an item
pub(crate) async fn set_stock<'e>(
    ex: impl SqliteExecutor<'e>,
    id: Uuid,
    quantity: Decimal,
) -> Result<()> {
    sqlx::query("UPDATE inventory_items SET quantity_in_stock = ?, updated_at = ? WHERE id = ?")
        .bind(quantity.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(ex)
        .await
        .map_err(db_err)?;
    Ok(())
}

fn adjustment_note(
    existing: Option<String>,
    adjustment: Decimal,
    reason: &str,
    at: DateTime<Utc>,
) -> String {
    let line = format!(
        "[{}] Stock adjusted by {}: {}",
        at.format("%Y-%m-%d %H:%M"),
        adjustment.normalize(),
        reason
    );
    match existing.filter(|n| !n.is_empty()) {
        Some(notes) => format!("{}\n{}", notes, line),
        None => line,
    }
}

impl SqliteGarageStore {
    async fn active_items(&self, org: OrganizationId) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? AND is_active = 1 ORDER BY name",
            SELECT_INVENTORY_ITEM
        ))
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(inventory_item_from_row).collect()
    }
}

#[async_trait]
impl InventoryStore for SqliteGarageStore {
    async fn create_inventory_item(
        &self,
        org: OrganizationId,
        input: NewInventoryItem,
    ) -> Result<InventoryItem> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let part_number = input.part_number.trim().to_string();
        let unit_of_measure = input
            .unit_of_measure
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UNIT_OF_MEASURE.to_string());

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, organization_id, part_number, name, description, category,
                unit_of_measure, quantity_in_stock, minimum_stock_level, cost_price,
                selling_price, supplier, is_active, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(&part_number)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.category)
        .bind(&unit_of_measure)
        .bind(input.quantity_in_stock.to_string())
        .bind(input.minimum_stock_level.to_string())
        .bind(input.cost_price.to_string())
        .bind(input.selling_price.to_string())
        .bind(&input.supplier)
        .bind(&input.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write(e, &part_number))?;

        info!("Created inventory item {} ({})", part_number, id);

        fetch_inventory_item(&self.pool, org, id)
            .await?
            .ok_or_else(|| inventory_not_found(id))
    }

    async fn update_inventory_item(
        &self,
        org: OrganizationId,
        update: InventoryItemUpdate,
    ) -> Result<InventoryItem> {
        let current = fetch_inventory_item(&self.pool, org, update.id)
            .await?
            .ok_or_else(|| inventory_not_found(update.id))?;
        let part_number = update
            .part_number
            .map(|p| p.trim().to_string())
            .unwrap_or(current.part_number);

        sqlx::query(
            r#"
            UPDATE inventory_items SET
                part_number = ?, name = ?, description = ?, category = ?, unit_of_measure = ?,
                minimum_stock_level = ?, cost_price = ?, selling_price = ?, supplier = ?,
                is_active = ?, notes = ?, updated_at = ?
            WHERE id = ? AND organization_id = ?
            "#,
        )
        .bind(&part_number)
        .bind(update.name.unwrap_or(current.name))
        .bind(update.description.or(current.description))
        .bind(update.category.or(current.category))
        .bind(update.unit_of_measure.unwrap_or(current.unit_of_measure))
        .bind(
            update
                .minimum_stock_level
                .unwrap_or(current.minimum_stock_level)
                .to_string(),
        )
        .bind(update.cost_price.unwrap_or(current.cost_price).to_string())
        .bind(update.selling_price.unwrap_or(current.selling_price).to_string())
        .bind(update.supplier.or(current.supplier))
        .bind(update.is_active.unwrap_or(current.is_active))
        .bind(update.notes.or(current.notes))
        .bind(Utc::now())
        .bind(update.id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write(e, &part_number))?;

        fetch_inventory_item(&self.pool, org, update.id)
            .await?
            .ok_or_else(|| inventory_not_found(update.id))
    }

    async fn adjust_inventory_quantity(
        &self,
        org: OrganizationId,
        id: Uuid,
        adjustment: Decimal,
        reason: Option<String>,
    ) -> Result<InventoryItem> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let item = fetch_inventory_item(&mut *tx, org, id)
            .await?
            .ok_or_else(|| inventory_not_found(id))?;
        let quantity = pricing::adjusted_quantity(item.quantity_in_stock, adjustment)?;

        let now = Utc::now();
        let notes = match reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => Some(adjustment_note(item.notes, adjustment, reason, now)),
            None => item.notes,
        };

        sqlx::query(
            "UPDATE inventory_items SET quantity_in_stock = ?, notes = ?, updated_at = ? WHERE id = ?",
        )
        .bind(quantity.to_string())
        .bind(notes)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let updated = fetch_inventory_item(&mut *tx, org, id)
            .await?
            .ok_or_else(|| inventory_not_found(id))?;
        tx.commit().await.map_err(db_err)?;

        info!(
            "Adjusted stock of {} by {} to {}",
            updated.part_number,
            adjustment.normalize(),
            updated.quantity_in_stock.normalize()
        );
        Ok(updated)
    }

    async fn delete_inventory_item(&self, org: OrganizationId, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE inventory_items SET is_active = 0, updated_at = ? WHERE id = ? AND organization_id = ?",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(org_text(org))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_inventory_item(
        &self,
        org: OrganizationId,
        id: Uuid,
    ) -> Result<Option<InventoryItem>> {
        fetch_inventory_item(&self.pool, org, id).await
    }

    async fn list_inventory_items(&self, org: OrganizationId) -> Result<Vec<InventoryItem>> {
        self.active_items(org).await
    }

    async fn low_stock_items(&self, org: OrganizationId) -> Result<Vec<InventoryItem>> {
        // Quantities are decimal TEXT, so compare after decoding
        let mut items: Vec<_> = self
            .active_items(org)
            .await?
            .into_iter()
            .filter(InventoryItem::is_low_stock)
            .collect();
        items.sort_by(|a, b| a.quantity_in_stock.cmp(&b.quantity_in_stock));
        Ok(items)
    }

    async fn search_inventory(
        &self,
        org: OrganizationId,
        term: &str,
    ) -> Result<Vec<InventoryItem>> {
        let pattern = like_pattern(term.trim());
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE organization_id = ? AND is_active = 1
              AND (LOWER(name) LIKE ? ESCAPE '\'
                   OR LOWER(part_number) LIKE ? ESCAPE '\'
                   OR LOWER(COALESCE(category, '')) LIKE ? ESCAPE '\')
            ORDER BY name"#,
            SELECT_INVENTORY_ITEM
        ))
        .bind(org_text(org))
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(inventory_item_from_row).collect()
    }

    async fn inventory_by_category(
        &self,
        org: OrganizationId,
        category: &str,
    ) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? AND is_active = 1 AND category = ? COLLATE NOCASE ORDER BY name",
            SELECT_INVENTORY_ITEM
        ))
        .bind(org_text(org))
        .bind(category.trim())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(inventory_item_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{store, tenant};

    fn dec(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    fn new_item(part_number: &str, name: &str, stock: &str) -> NewInventoryItem {
        NewInventoryItem {
            part_number: part_number.into(),
            name: name.into(),
            description: None,
            category: Some("Brakes".into()),
            unit_of_measure: None,
            quantity_in_stock: dec(stock),
            minimum_stock_level: dec("2"),
            cost_price: dec("10"),
            selling_price: dec("15.50"),
            supplier: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_part_number() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let item = store
            .create_inventory_item(org, new_item("BP-1", "Brake pad", "5"))
            .await
            .unwrap();
        assert_eq!(item.unit_of_measure, DEFAULT_UNIT_OF_MEASURE);

        let err = store
            .create_inventory_item(org, new_item("BP-1", "Other", "1"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Inventory item with part number 'BP-1' already exists."
        );

        let other = store
            .create_inventory_item(org, new_item("BP-2", "Rotor", "1"))
            .await
            .unwrap();
        let err = store
            .update_inventory_item(
                org,
                InventoryItemUpdate {
                    id: other.id,
                    part_number: Some("BP-1".into()),
                    name: None,
                    description: None,
                    category: None,
                    unit_of_measure: None,
                    minimum_stock_level: None,
                    cost_price: None,
                    selling_price: None,
                    supplier: None,
                    is_active: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BusinessRule { code: "DuplicateValue", .. }));
    }

    #[tokio::test]
    async fn test_adjust_quantity() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let item = store
            .create_inventory_item(org, new_item("BP-1", "Brake pad", "5"))
            .await
            .unwrap();

        let adjusted = store
            .adjust_inventory_quantity(org, item.id, dec("-3"), Some("Damaged".into()))
            .await
            .unwrap();
        assert_eq!(adjusted.quantity_in_stock, dec("2"));
        assert!(adjusted.notes.unwrap().ends_with("Stock adjusted by -3: Damaged"));

        let err = store
            .adjust_inventory_quantity(org, item.id, dec("-2.5"), None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot adjust inventory. Resulting quantity would be negative (-0.5)."
        );
    }

    #[tokio::test]
    async fn test_queries_skip_inactive_items() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let pad = store
            .create_inventory_item(org, new_item("BP-1", "Brake pad", "1"))
            .await
            .unwrap();
        store
            .create_inventory_item(org, new_item("BP-2", "Brake disc", "0"))
            .await
            .unwrap();
        let mut filter = new_item("OF-1", "Oil filter", "40");
        filter.category = Some("Filters".into());
        store.create_inventory_item(org, filter).await.unwrap();

        let low: Vec<_> = store
            .low_stock_items(org)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.part_number)
            .collect();
        assert_eq!(low, ["BP-2", "BP-1"]);

        assert!(store.delete_inventory_item(org, pad.id).await.unwrap());
        let found = store.search_inventory(org, "brake").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].part_number, "BP-2");
        assert_eq!(store.inventory_by_category(org, "brakes").await.unwrap().len(), 1);
        assert_eq!(store.list_inventory_items(org).await.unwrap().len(), 2);
    }

    #[test]
    fn test_adjustment_note_appends() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let note = adjustment_note(Some("Old".into()), dec("4"), "Restock", at);
        assert_eq!(note, "Old\n[2024-05-01 09:30] Stock adjusted by 4: Restock");
    }
}

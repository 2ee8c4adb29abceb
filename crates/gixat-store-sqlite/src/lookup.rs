use async_trait::async_trait;
use gixat_core::models::{LookupItem, NewLookupItem, categories};
use gixat_core::store::LookupStore;
use gixat_core::{Error, Result};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::store::{SqliteGarageStore, db_err, flag, int, opt_text, opt_uuid, text, uuid};

const SELECT_LOOKUP: &str = r#"
    SELECT id, category, value, parent_id, metadata, sort_order, is_active
    FROM lookup_items
"#;

const CAR_MAKES: &[&str] = &[
    "Toyota",
    "BMW",
    "Mercedes-Benz",
    "Honda",
    "Ford",
    "Hyundai",
    "Kia",
    "Nissan",
    "Volkswagen",
    "Audi",
];

const CAR_MODELS: &[(&str, &[&str])] = &[
    ("Toyota", &["Camry", "Corolla", "RAV4", "Hilux", "Land Cruiser"]),
    ("BMW", &["X5", "3 Series", "5 Series", "X3", "7 Series"]),
];

const CAR_COLORS: &[(&str, &str)] = &[
    ("White", "#FFFFFF"),
    ("Black", "#000000"),
    ("Silver", "#C0C0C0"),
    ("Grey", "#808080"),
    ("Red", "#FF0000"),
    ("Blue", "#0000FF"),
];

/// Country, dialing code, national number length
const COUNTRIES: &[(&str, &str, u8)] = &[
    ("Jordan", "+962", 9),
    ("UAE", "+971", 9),
    ("KSA", "+966", 9),
    ("Qatar", "+974", 8),
    ("Bahrain", "+973", 8),
    ("Kuwait", "+965", 8),
    ("Lebanon", "+961", 8),
    ("Palestine", "+970", 9),
    ("Egypt", "+20", 10),
];

fn lookup_from_row(row: &SqliteRow) -> Result<LookupItem> {
    Ok(LookupItem {
        id: uuid(row, "id")?,
        category: text(row, "category")?,
        value: text(row, "value")?,
        parent_id: opt_uuid(row, "parent_id")?,
        metadata: opt_text(row, "metadata")?,
        sort_order: int(row, "sort_order")? as i32,
        is_active: flag(row, "is_active")?,
    })
}

async fn insert_lookup(
    tx: &mut Transaction<'_, Sqlite>,
    item: &NewLookupItem,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO lookup_items (id, category, value, parent_id, metadata, sort_order, is_active)
        VALUES (?, ?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(id.to_string())
    .bind(&item.category)
    .bind(&item.value)
    .bind(item.parent_id.map(|v| v.to_string()))
    .bind(&item.metadata)
    .bind(item.sort_order)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(id)
}

async fn category_seeded(tx: &mut Transaction<'_, Sqlite>, category: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lookup_items WHERE category = ?")
        .bind(category)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(count > 0)
}

fn entry(category: &str, value: &str, sort_order: usize) -> NewLookupItem {
    NewLookupItem {
        category: category.to_string(),
        value: value.to_string(),
        parent_id: None,
        metadata: None,
        sort_order: sort_order as i32 + 1,
    }
}

#[async_trait]
impl LookupStore for SqliteGarageStore {
    async fn lookup_items(
        &self,
        category: Option<&str>,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<LookupItem>> {
        let parent = parent_id.map(|v| v.to_string());
        let rows = sqlx::query(&format!(
            r#"{}
            WHERE is_active = 1
              AND (? IS NULL OR category = ?)
              AND (? IS NULL OR parent_id = ?)
            ORDER BY category, sort_order, value"#,
            SELECT_LOOKUP
        ))
        .bind(category)
        .bind(category)
        .bind(&parent)
        .bind(&parent)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(lookup_from_row).collect()
    }

    async fn create_lookup_item(&self, input: NewLookupItem) -> Result<LookupItem> {
        if input.category.trim().is_empty() || input.value.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "Lookup category and value are required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if let Some(parent_id) = input.parent_id {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT id FROM lookup_items WHERE id = ?")
                    .bind(parent_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
            if exists.is_none() {
                return Err(Error::not_found("Lookup item", parent_id));
            }
        }
        let id = insert_lookup(&mut tx, &input).await?;
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_LOOKUP))
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let item = lookup_from_row(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(item)
    }

    async fn seed_lookups(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut inserted = 0;

        if !category_seeded(&mut tx, categories::CAR_MAKE).await? {
            for (i, make) in CAR_MAKES.iter().enumerate() {
                let make_id = insert_lookup(&mut tx, &entry(categories::CAR_MAKE, make, i)).await?;
                inserted += 1;

                let models = CAR_MODELS
                    .iter()
                    .find(|(m, _)| m == make)
                    .map(|(_, models)| *models)
                    .unwrap_or_default();
                for (j, model) in models.iter().enumerate() {
                    let mut item = entry(categories::CAR_MODEL, model, j);
                    item.parent_id = Some(make_id);
                    insert_lookup(&mut tx, &item).await?;
                    inserted += 1;
                }
            }
        }

        if !category_seeded(&mut tx, categories::CAR_COLOR).await? {
            for (i, (color, hex)) in CAR_COLORS.iter().enumerate() {
                let mut item = entry(categories::CAR_COLOR, color, i);
                item.metadata = Some(json!({ "hex": hex }).to_string());
                insert_lookup(&mut tx, &item).await?;
                inserted += 1;
            }
        }

        if !category_seeded(&mut tx, categories::COUNTRY).await? {
            for (i, (country, code, length)) in COUNTRIES.iter().enumerate() {
                let mut item = entry(categories::COUNTRY, country, i);
                item.metadata =
                    Some(json!({ "phoneCode": code, "phoneLength": length }).to_string());
                insert_lookup(&mut tx, &item).await?;
                inserted += 1;
            }
        }

        tx.commit().await.map_err(db_err)?;
        if inserted > 0 {
            info!("Seeded {} lookup items", inserted);
        }
        Ok(inserted)
    }
}

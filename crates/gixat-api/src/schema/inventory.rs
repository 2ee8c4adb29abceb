use async_graphql::{Context, Object, Result, ResultExt};
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{InventoryItem, InventoryItemUpdate, NewInventoryItem};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Default)]
pub struct InventoryQuery;

#[Object]
impl InventoryQuery {
    /// Active items ordered by name
    async fn inventory_items(&self, ctx: &Context<'_>) -> Result<Vec<InventoryItem>> {
        store(ctx)?
            .list_inventory_items(tenant(ctx)?)
            .await
            .extend()
    }

    async fn inventory_item_by_id(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
    ) -> Result<Option<InventoryItem>> {
        store(ctx)?
            .get_inventory_item(tenant(ctx)?, id)
            .await
            .extend()
    }

    /// Items at or below their minimum level, lowest stock first
    async fn low_stock_items(&self, ctx: &Context<'_>) -> Result<Vec<InventoryItem>> {
        store(ctx)?.low_stock_items(tenant(ctx)?).await.extend()
    }

    async fn search_inventory(&self, ctx: &Context<'_>, term: String) -> Result<Vec<InventoryItem>> {
        store(ctx)?
            .search_inventory(tenant(ctx)?, term.trim())
            .await
            .extend()
    }

    async fn inventory_by_category(
        &self,
        ctx: &Context<'_>,
        category: String,
    ) -> Result<Vec<InventoryItem>> {
        store(ctx)?
            .inventory_by_category(tenant(ctx)?, &category)
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct InventoryMutation;

#[Object]
impl InventoryMutation {
    async fn create_inventory_item(
        &self,
        ctx: &Context<'_>,
        input: NewInventoryItem,
    ) -> Result<InventoryItem> {
        store(ctx)?
            .create_inventory_item(tenant(ctx)?, input)
            .await
            .extend()
    }

    async fn update_inventory_item(
        &self,
        ctx: &Context<'_>,
        input: InventoryItemUpdate,
    ) -> Result<InventoryItem> {
        store(ctx)?
            .update_inventory_item(tenant(ctx)?, input)
            .await
            .extend()
    }

    /// `adjustment` may be negative; the stock level never is
    async fn adjust_inventory_quantity(
        &self,
        ctx: &Context<'_>,
        inventory_item_id: Uuid,
        adjustment: Decimal,
        reason: Option<String>,
    ) -> Result<InventoryItem> {
        store(ctx)?
            .adjust_inventory_quantity(tenant(ctx)?, inventory_item_id, adjustment, reason)
            .await
            .extend()
    }

    /// Deactivates the item; history that references it is kept
    async fn delete_inventory_item(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        store(ctx)?
            .delete_inventory_item(tenant(ctx)?, id)
            .await
            .extend()
    }
}

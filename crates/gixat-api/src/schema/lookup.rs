use async_graphql::{Context, Object, Result, ResultExt};
use gixat_core::graphql::store;
use gixat_core::models::{LookupItem, NewLookupItem, UserRole};

use super::require_roles;

const LOOKUP_EDITORS: &[UserRole] = &[UserRole::SuperAdmin, UserRole::SystemAdmin, UserRole::OrgAdmin];

#[derive(Default)]
pub struct LookupQuery;

#[Object]
impl LookupQuery {
    /// Active items ordered by category, sort order, then value
    async fn lookup_items(
        &self,
        ctx: &Context<'_>,
        category: Option<String>,
        parent_id: Option<uuid::Uuid>,
    ) -> Result<Vec<LookupItem>> {
        store(ctx)?
            .lookup_items(category.as_deref(), parent_id)
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct LookupMutation;

#[Object]
impl LookupMutation {
    async fn create_lookup_item(
        &self,
        ctx: &Context<'_>,
        input: NewLookupItem,
    ) -> Result<LookupItem> {
        require_roles(ctx, LOOKUP_EDITORS)?;
        store(ctx)?.create_lookup_item(input).await.extend()
    }
}

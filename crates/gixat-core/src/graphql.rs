//! GraphQL relation resolvers
//!
//! The models derive their scalar fields. The fields here follow a relation
//! through the store found in the schema data. Tenant-owned parents scope
//! their children by their own `organization_id`; parents without one use
//! the caller's organization.

use async_graphql::{ComplexObject, Context, ErrorExtensions, Result, ResultExt};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::models::*;
use crate::object_store::DOWNLOAD_URL_EXPIRY;
use crate::{Error, GarageStore, ObjectStore, OrganizationId, RequestContext};

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        let message = if self.is_client_facing() {
            self.to_string()
        } else {
            error!("Unhandled error while resolving request: {}", self);
            "An internal error occurred".to_string()
        };
        async_graphql::Error::new(message).extend_with(|_, e| {
            e.set("code", self.code());
            if let Error::BusinessRule { code, .. } = self {
                e.set("rule", *code);
            }
        })
    }
}

pub fn store<'a>(ctx: &'a Context<'_>) -> Result<&'a Arc<dyn GarageStore>> {
    ctx.data::<Arc<dyn GarageStore>>()
}

pub fn objects<'a>(ctx: &'a Context<'_>) -> Result<&'a Arc<dyn ObjectStore>> {
    ctx.data::<Arc<dyn ObjectStore>>()
}

pub fn request_context<'a>(ctx: &'a Context<'_>) -> Result<&'a RequestContext> {
    ctx.data::<RequestContext>()
}

/// The caller's organization
pub fn tenant(ctx: &Context<'_>) -> Result<OrganizationId> {
    request_context(ctx)?.require_tenant().extend()
}

fn org(id: Uuid) -> OrganizationId {
    OrganizationId::from_uuid(id)
}

/// Relations of a job item are listed in full
fn all() -> Page {
    Page::new(None, Some(Page::MAX_TAKE))
}

async fn tenant_user(ctx: &Context<'_>, org: OrganizationId, id: Option<Uuid>) -> Result<Option<User>> {
    match id {
        Some(id) => store(ctx)?.get_tenant_user(org, id).await.extend(),
        None => Ok(None),
    }
}

async fn media_by_id(ctx: &Context<'_>, id: Uuid) -> Result<Option<Media>> {
    store(ctx)?.get_media(id).await.extend()
}

#[ComplexObject]
impl Organization {
    async fn logo(&self, ctx: &Context<'_>) -> Result<Option<Media>> {
        match self.logo_id {
            Some(id) => media_by_id(ctx, id).await,
            None => Ok(None),
        }
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<User>> {
        store(ctx)?
            .list_organization_users(org(self.id))
            .await
            .extend()
    }
}

#[ComplexObject]
impl User {
    async fn roles(&self) -> Vec<UserRole> {
        vec![self.role]
    }

    async fn avatar_url(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        match &self.avatar_key {
            Some(key) => Ok(Some(
                objects(ctx)?
                    .presign_get(key, DOWNLOAD_URL_EXPIRY)
                    .await
                    .extend()?,
            )),
            None => Ok(None),
        }
    }

    async fn organization(&self, ctx: &Context<'_>) -> Result<Option<Organization>> {
        match self.organization_id {
            Some(id) => store(ctx)?.get_organization(id).await.extend(),
            None => Ok(None),
        }
    }
}

#[ComplexObject]
impl UserInvite {
    async fn organization(&self, ctx: &Context<'_>) -> Result<Option<Organization>> {
        store(ctx)?
            .get_organization(self.organization_id)
            .await
            .extend()
    }

    async fn invited_by(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, org(self.organization_id), Some(self.invited_by_id)).await
    }
}

#[ComplexObject]
impl Customer {
    async fn cars(&self, ctx: &Context<'_>) -> Result<Vec<Car>> {
        store(ctx)?
            .list_cars(org(self.organization_id), Some(self.id))
            .await
            .extend()
    }

    /// Newest first
    async fn sessions(&self, ctx: &Context<'_>) -> Result<Vec<GarageSession>> {
        store(ctx)?
            .sessions_for_customer(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn job_cards(&self, ctx: &Context<'_>) -> Result<Vec<JobCard>> {
        let filter = JobCardFilter {
            customer_id: Some(self.id),
            ..Default::default()
        };
        store(ctx)?
            .list_job_cards(org(self.organization_id), filter, all())
            .await
            .extend()
    }

    async fn appointments(&self, ctx: &Context<'_>) -> Result<Vec<Appointment>> {
        store(ctx)?
            .customer_appointments(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn activity(&self, ctx: &Context<'_>) -> Result<CustomerActivity> {
        store(ctx)?
            .customer_activity(org(self.organization_id), self.id)
            .await
            .extend()
    }
}

#[ComplexObject]
impl Car {
    async fn customer(&self, ctx: &Context<'_>) -> Result<Option<Customer>> {
        store(ctx)?
            .get_customer(org(self.organization_id), self.customer_id)
            .await
            .extend()
    }

    async fn sessions(&self, ctx: &Context<'_>) -> Result<Vec<GarageSession>> {
        store(ctx)?
            .sessions_for_car(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn job_cards(&self, ctx: &Context<'_>) -> Result<Vec<JobCard>> {
        let filter = JobCardFilter {
            car_id: Some(self.id),
            ..Default::default()
        };
        store(ctx)?
            .list_job_cards(org(self.organization_id), filter, all())
            .await
            .extend()
    }
}

#[ComplexObject]
impl GarageSession {
    async fn car(&self, ctx: &Context<'_>) -> Result<Option<Car>> {
        store(ctx)?
            .get_car(org(self.organization_id), self.car_id)
            .await
            .extend()
    }

    async fn customer(&self, ctx: &Context<'_>) -> Result<Option<Customer>> {
        store(ctx)?
            .get_customer(org(self.organization_id), self.customer_id)
            .await
            .extend()
    }

    async fn media(&self, ctx: &Context<'_>) -> Result<Vec<SessionMedia>> {
        store(ctx)?
            .session_media(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn logs(&self, ctx: &Context<'_>) -> Result<Vec<SessionLog>> {
        store(ctx)?
            .session_logs(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn job_cards(&self, ctx: &Context<'_>) -> Result<Vec<JobCard>> {
        store(ctx)?
            .job_cards_for_session(org(self.organization_id), self.id)
            .await
            .extend()
    }
}

#[ComplexObject]
impl JobCard {
    async fn items(&self, ctx: &Context<'_>) -> Result<Vec<JobItem>> {
        store(ctx)?
            .job_items(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn car(&self, ctx: &Context<'_>) -> Result<Option<Car>> {
        store(ctx)?
            .get_car(org(self.organization_id), self.car_id)
            .await
            .extend()
    }

    async fn customer(&self, ctx: &Context<'_>) -> Result<Option<Customer>> {
        store(ctx)?
            .get_customer(org(self.organization_id), self.customer_id)
            .await
            .extend()
    }

    async fn session(&self, ctx: &Context<'_>) -> Result<Option<GarageSession>> {
        match self.session_id {
            Some(id) => store(ctx)?
                .get_session(org(self.organization_id), id)
                .await
                .extend(),
            None => Ok(None),
        }
    }

    async fn media(&self, ctx: &Context<'_>) -> Result<Vec<JobCardMedia>> {
        store(ctx)?
            .job_card_media(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn comments(&self, ctx: &Context<'_>) -> Result<Vec<JobCardComment>> {
        store(ctx)?
            .job_card_comments(org(self.organization_id), self.id)
            .await
            .extend()
    }

    async fn assigned_technician(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, org(self.organization_id), self.assigned_technician_id).await
    }
}

#[ComplexObject]
impl JobItem {
    async fn parts(&self, ctx: &Context<'_>) -> Result<Vec<JobItemPart>> {
        store(ctx)?
            .parts_for_job_item(tenant(ctx)?, self.id)
            .await
            .extend()
    }

    async fn labor_entries(&self, ctx: &Context<'_>) -> Result<Vec<LaborEntry>> {
        store(ctx)?
            .labor_entries_by_job_item(tenant(ctx)?, self.id)
            .await
            .extend()
    }

    async fn media(&self, ctx: &Context<'_>) -> Result<Vec<JobItemMedia>> {
        store(ctx)?
            .job_item_media(tenant(ctx)?, self.id)
            .await
            .extend()
    }

    async fn assigned_technician(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, tenant(ctx)?, self.assigned_technician_id).await
    }
}

#[ComplexObject]
impl JobItemPart {
    async fn inventory_item(&self, ctx: &Context<'_>) -> Result<Option<InventoryItem>> {
        store(ctx)?
            .get_inventory_item(tenant(ctx)?, self.inventory_item_id)
            .await
            .extend()
    }
}

#[ComplexObject]
impl LaborEntry {
    async fn technician(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, tenant(ctx)?, Some(self.technician_id)).await
    }
}

#[ComplexObject]
impl JobCardComment {
    async fn author(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, tenant(ctx)?, Some(self.author_id)).await
    }

    async fn replies(&self, ctx: &Context<'_>) -> Result<Vec<JobCardComment>> {
        store(ctx)?
            .comment_replies(tenant(ctx)?, self.id)
            .await
            .extend()
    }

    async fn mentions(&self, ctx: &Context<'_>) -> Result<Vec<JobCardCommentMention>> {
        store(ctx)?
            .comment_mentions(tenant(ctx)?, self.id)
            .await
            .extend()
    }
}

#[ComplexObject]
impl JobCardCommentMention {
    async fn comment(&self, ctx: &Context<'_>) -> Result<Option<JobCardComment>> {
        store(ctx)?
            .get_comment(tenant(ctx)?, self.comment_id)
            .await
            .extend()
    }

    async fn mentioned_user(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, tenant(ctx)?, Some(self.mentioned_user_id)).await
    }
}

#[ComplexObject]
impl Appointment {
    async fn customer(&self, ctx: &Context<'_>) -> Result<Option<Customer>> {
        store(ctx)?
            .get_customer(org(self.organization_id), self.customer_id)
            .await
            .extend()
    }

    async fn car(&self, ctx: &Context<'_>) -> Result<Option<Car>> {
        store(ctx)?
            .get_car(org(self.organization_id), self.car_id)
            .await
            .extend()
    }

    async fn session(&self, ctx: &Context<'_>) -> Result<Option<GarageSession>> {
        match self.session_id {
            Some(id) => store(ctx)?
                .get_session(org(self.organization_id), id)
                .await
                .extend(),
            None => Ok(None),
        }
    }

    async fn assigned_technician(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, org(self.organization_id), self.assigned_technician_id).await
    }

    async fn created_by(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        tenant_user(ctx, org(self.organization_id), self.created_by_id).await
    }
}

#[ComplexObject]
impl Media {
    /// Presigned download URL, valid for 24 hours
    async fn url(&self, ctx: &Context<'_>) -> Result<String> {
        objects(ctx)?
            .presign_get(&self.key, DOWNLOAD_URL_EXPIRY)
            .await
            .extend()
    }
}

#[ComplexObject]
impl SessionMedia {
    async fn media(&self, ctx: &Context<'_>) -> Result<Option<Media>> {
        media_by_id(ctx, self.media_id).await
    }
}

#[ComplexObject]
impl JobCardMedia {
    async fn media(&self, ctx: &Context<'_>) -> Result<Option<Media>> {
        media_by_id(ctx, self.media_id).await
    }
}

#[ComplexObject]
impl JobItemMedia {
    async fn media(&self, ctx: &Context<'_>) -> Result<Option<Media>> {
        media_by_id(ctx, self.media_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rule_extensions() {
        let err = Error::rule("InsufficientStock", "Insufficient stock").extend();
        assert_eq!(err.message, "Insufficient stock");
        let ext = err.extensions.unwrap();
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("BUSINESS_RULE_VIOLATION")));
        assert_eq!(ext.get("rule"), Some(&async_graphql::Value::from("InsufficientStock")));
    }

    #[test]
    fn test_internal_errors_are_masked() {
        let err = Error::Database("no such table: customers".into()).extend();
        assert_eq!(err.message, "An internal error occurred");
        let ext = err.extensions.unwrap();
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("INTERNAL_ERROR")));
    }
}

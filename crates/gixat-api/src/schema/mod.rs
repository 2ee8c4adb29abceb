//! GraphQL schema
//!
//! One query object and one mutation object per domain, merged into the
//! roots. Resolvers read their dependencies from the schema data and the
//! caller from the per-request [`RequestContext`].

mod account;
mod appointments;
mod comments;
mod customers;
mod health;
mod inventory;
mod invites;
mod job_cards;
mod lookup;
mod media;
mod organizations;
mod parts_labor;
mod sessions;

use async_graphql::{Context, EmptySubscription, MergedObject, Result, ResultExt, Schema};
use gixat_core::graphql::request_context;
use gixat_core::models::UserRole;
use gixat_core::{Error, GarageStore, ObjectStore};
use gixat_media::UploadPipeline;
use gixat_observability::Metrics;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::TokenService;

pub use account::{AuthPayload, AvatarUploadResult, UserProfile};
pub use appointments::AppointmentPayload;
pub use health::{ServiceHealth, SystemHealth};
pub use invites::{InvitePayload, generate_invite_code};
pub use media::{BulkSessionUploadResult, PresignedUploadUrl};

#[derive(MergedObject, Default)]
pub struct QueryRoot(
    account::AccountQuery,
    organizations::OrganizationQuery,
    invites::InviteQuery,
    customers::CustomerQuery,
    sessions::SessionQuery,
    job_cards::JobCardQuery,
    inventory::InventoryQuery,
    parts_labor::PartsLaborQuery,
    comments::CommentQuery,
    appointments::AppointmentQuery,
    lookup::LookupQuery,
    health::HealthQuery,
);

#[derive(MergedObject, Default)]
pub struct MutationRoot(
    account::AccountMutation,
    organizations::OrganizationMutation,
    invites::InviteMutation,
    customers::CustomerMutation,
    sessions::SessionMutation,
    job_cards::JobCardMutation,
    inventory::InventoryMutation,
    parts_labor::PartsLaborMutation,
    comments::CommentMutation,
    appointments::AppointmentMutation,
    lookup::LookupMutation,
    media::MediaMutation,
);

pub type GixatSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Values resolvers need besides the store
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL invite links point at
    pub frontend_url: String,
    /// Add `Secure` to the token cookie
    pub secure_cookies: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:4200".to_string(),
            secure_cookies: false,
        }
    }
}

/// Everything the schema is built from
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn GarageStore>,
    pub pipeline: UploadPipeline,
    pub tokens: TokenService,
    pub metrics: Arc<Metrics>,
    pub settings: ApiSettings,
}

impl Services {
    pub fn objects(&self) -> Arc<dyn ObjectStore> {
        self.pipeline.store().clone()
    }
}

pub fn build_schema(services: &Services) -> GixatSchema {
    Schema::build(
        QueryRoot::default(),
        MutationRoot::default(),
        EmptySubscription,
    )
    .data(services.store.clone())
    .data(services.objects())
    .data(services.pipeline.clone())
    .data(services.tokens.clone())
    .data(services.metrics.clone())
    .data(services.settings.clone())
    .finish()
}

pub(crate) fn pipeline<'a>(ctx: &'a Context<'_>) -> Result<&'a UploadPipeline> {
    ctx.data::<UploadPipeline>()
}

pub(crate) fn tokens<'a>(ctx: &'a Context<'_>) -> Result<&'a TokenService> {
    ctx.data::<TokenService>()
}

pub(crate) fn metrics<'a>(ctx: &'a Context<'_>) -> Result<&'a Arc<Metrics>> {
    ctx.data::<Arc<Metrics>>()
}

pub(crate) fn settings<'a>(ctx: &'a Context<'_>) -> Result<&'a ApiSettings> {
    ctx.data::<ApiSettings>()
}

pub(crate) fn current_user(ctx: &Context<'_>) -> Result<Uuid> {
    request_context(ctx)?.require_user().extend()
}

pub(crate) fn require_roles(ctx: &Context<'_>, roles: &[UserRole]) -> Result<()> {
    request_context(ctx)?.require_any_role(roles).extend()
}

/// Turn a scoped lookup miss into `ENTITY_NOT_FOUND`
pub(crate) fn found<T>(value: Option<T>, entity: &str, id: Uuid) -> Result<T> {
    value.ok_or_else(|| Error::not_found(entity, id)).extend()
}

pub(crate) const ADMINS: &[UserRole] = &[UserRole::SuperAdmin, UserRole::SystemAdmin];

pub(crate) const MANAGERS: &[UserRole] = &[UserRole::OrgAdmin, UserRole::OrgManager];

use async_graphql::{Context, Object, Result, ResultExt};
use gixat_core::graphql::{request_context, store};
use gixat_core::models::{NewOrganization, Organization, UserRole};
use gixat_core::Error;
use tracing::info;
use uuid::Uuid;

use super::{ADMINS, current_user};

#[derive(Default)]
pub struct OrganizationQuery;

#[Object]
impl OrganizationQuery {
    /// Every organization; platform administrators only
    async fn organizations(&self, ctx: &Context<'_>) -> Result<Vec<Organization>> {
        request_context(ctx)?.require_any_role(ADMINS).extend()?;
        store(ctx)?.list_organizations().await.extend()
    }

    async fn my_organization(&self, ctx: &Context<'_>) -> Result<Option<Organization>> {
        let caller = request_context(ctx)?;
        caller.require_user().extend()?;
        match caller.organization_id {
            Some(org) => store(ctx)?.get_organization(*org.as_uuid()).await.extend(),
            None => Ok(None),
        }
    }

    /// Administrators may read any organization, everyone else only their own
    async fn organization_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Organization>> {
        let caller = request_context(ctx)?;
        caller.require_user().extend()?;
        let own = caller.organization_id.is_some_and(|org| *org.as_uuid() == id);
        if !own && !caller.is_system_admin() {
            return Ok(None);
        }
        store(ctx)?.get_organization(id).await.extend()
    }
}

#[derive(Default)]
pub struct OrganizationMutation;

#[Object]
impl OrganizationMutation {
    /// A caller without an organization becomes the new one's OrgAdmin
    async fn create_organization(
        &self,
        ctx: &Context<'_>,
        input: NewOrganization,
    ) -> Result<Organization> {
        let user_id = current_user(ctx)?;
        if input.name.trim().is_empty() {
            return Err(Error::InvalidRequest("Organization name is required".to_string()))
                .extend();
        }
        let store = store(ctx)?;
        let user = store.get_user(user_id).await.extend()?;
        let admin = user
            .filter(|u| u.organization_id.is_none())
            .map(|u| u.id);

        let organization = store.create_organization(input, admin).await.extend()?;
        info!(
            "🏢 Created organization {} ({}){}",
            organization.name,
            organization.id,
            if admin.is_some() { " with creator as admin" } else { "" }
        );
        Ok(organization)
    }

    /// Platform administrators, or an OrgAdmin of the target organization for
    /// users without one
    async fn assign_user_to_organization(
        &self,
        ctx: &Context<'_>,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<bool> {
        let caller = request_context(ctx)?;
        caller.require_user().extend()?;
        let org_admin = caller.has_role(UserRole::OrgAdmin)
            && caller
                .organization_id
                .is_some_and(|org| *org.as_uuid() == organization_id);
        if !caller.is_system_admin() && !org_admin {
            return Err(Error::Forbidden(
                "Not authorized to assign users to this organization".to_string(),
            ))
            .extend();
        }

        let store = store(ctx)?;
        if store.get_organization(organization_id).await.extend()?.is_none() {
            return Err(Error::NotFound("Organization not found".to_string())).extend();
        }
        // An OrgAdmin only claims unaffiliated users or members already theirs
        if !caller.is_system_admin()
            && let Some(user) = store.get_user(user_id).await.extend()?
            && user
                .organization_id
                .is_some_and(|current| current != organization_id)
        {
            return Err(Error::Forbidden(
                "Not authorized to move users from another organization".to_string(),
            ))
            .extend();
        }
        store
            .assign_user_to_organization(user_id, organization_id, None)
            .await
            .extend()
    }

    async fn update_my_organization(&self, ctx: &Context<'_>, name: String) -> Result<Organization> {
        let caller = request_context(ctx)?;
        caller.require_user().extend()?;
        let Some(org) = caller.organization_id else {
            return Err(Error::Forbidden("Not authorized".to_string())).extend();
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("Organization name is required".to_string()))
                .extend();
        }
        store(ctx)?.rename_organization(org, name).await.extend()
    }
}

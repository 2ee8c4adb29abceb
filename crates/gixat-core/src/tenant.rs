//! Tenant types and request context for multi-tenancy support

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::UserRole;
use crate::{Error, Result};

/// Unique identifier for an organization (the tenant boundary).
///
/// Every tenant-owned store method takes one of these, so a query can never
/// be issued without an organization scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(Uuid);

impl OrganizationId {
    /// Create a new random organization ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an organization ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse an organization ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s)
            .map_err(|e| Error::InvalidTenant(format!("Invalid organization ID format: {}", e)))?;
        Ok(Self(uuid))
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrganizationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl From<OrganizationId> for Uuid {
    fn from(id: OrganizationId) -> Self {
        id.0
    }
}

/// The authenticated caller of a request.
///
/// Built by the API layer from a verified token. An anonymous request has no
/// user, no organization and no roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Authenticated user (None = anonymous)
    pub user_id: Option<Uuid>,

    /// Organization the caller acts within (None = no tenant yet)
    pub organization_id: Option<OrganizationId>,

    /// Roles granted to the caller
    pub roles: Vec<UserRole>,
}

impl RequestContext {
    /// Context for an anonymous request
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for an authenticated user
    pub fn for_user(
        user_id: Uuid,
        organization_id: Option<OrganizationId>,
        roles: Vec<UserRole>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            organization_id,
            roles,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Get the user ID, returning an error for anonymous callers
    pub fn require_user(&self) -> Result<Uuid> {
        self.user_id
            .ok_or_else(|| Error::Unauthenticated("User not authenticated".to_string()))
    }

    /// Get the organization ID, returning an error when the caller has no tenant
    pub fn require_tenant(&self) -> Result<OrganizationId> {
        self.require_user()?;
        self.organization_id
            .ok_or_else(|| Error::TenantRequired("Organization context required".to_string()))
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the caller is a platform-level administrator
    pub fn is_system_admin(&self) -> bool {
        self.has_role(UserRole::SuperAdmin) || self.has_role(UserRole::SystemAdmin)
    }

    /// Require at least one of `roles`
    pub fn require_any_role(&self, roles: &[UserRole]) -> Result<()> {
        self.require_user()?;
        if roles.iter().any(|r| self.has_role(*r)) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "This operation requires one of the roles: {}",
                roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

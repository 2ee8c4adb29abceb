use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Role granted to a user. A user holds exactly one.
    pub enum UserRole {
        SuperAdmin,
        SystemAdmin,
        OrgAdmin,
        OrgManager,
        OrgUser,
        Customer,
    }
}

text_enum! {
    pub enum UserType {
        /// Platform staff, not bound to a garage
        System,
        /// Member of a garage organization
        Organizational,
    }
}

/// An account that can sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub user_type: UserType,
    #[cfg_attr(feature = "graphql", graphql(skip))]
    pub role: UserRole,
    pub organization_id: Option<Uuid>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    #[cfg_attr(feature = "graphql", graphql(skip))]
    pub avatar_key: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    #[cfg_attr(feature = "graphql", graphql(skip))]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub user_type: UserType,
    pub role: UserRole,
    pub organization_id: Option<Uuid>,
}

/// Partial profile update. Present values are stored trimmed.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "graphql", derive(async_graphql::InputObject))]
#[cfg_attr(feature = "graphql", graphql(name = "UpdateProfileInput"))]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
}

impl ProfileUpdate {
    pub fn trimmed(self) -> Self {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
        Self {
            full_name: trim(self.full_name),
            bio: trim(self.bio),
            phone_number: trim(self.phone_number),
        }
    }
}

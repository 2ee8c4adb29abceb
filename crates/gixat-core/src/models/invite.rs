use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserRole;

text_enum! {
    pub enum InviteStatus {
        Pending,
        Accepted,
        Expired,
        Canceled,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct UserInvite {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub invite_code: String,
    pub expiry_date: DateTime<Utc>,
    pub status: InviteStatus,
    pub invited_by_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl UserInvite {
    /// Whether the invite can still be redeemed at `now`
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status == InviteStatus::Pending && self.expiry_date > now
    }
}

#[derive(Debug, Clone)]
pub struct NewInvite {
    pub email: String,
    pub role: UserRole,
    pub invite_code: String,
    pub expiry_date: DateTime<Utc>,
    pub invited_by_id: Uuid,
}

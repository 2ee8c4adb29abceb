use async_graphql::{Context, Object, Result, ResultExt, SimpleObject};
use chrono::{Duration, Utc};
use gixat_core::graphql::{store, tenant};
use gixat_core::models::{NewInvite, UserInvite, UserRole};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use super::{ADMINS, MANAGERS, current_user, require_roles, settings};

const INVITE_CODE_LENGTH: usize = 12;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random code of upper-case letters and digits
pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LENGTH)
        .map(|_| INVITE_CODE_ALPHABET[rng.random_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(SimpleObject, Default)]
pub struct InvitePayload {
    pub invite: Option<UserInvite>,
    pub invite_link: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct InviteQuery;

#[Object]
impl InviteQuery {
    /// Newest first
    async fn invites(&self, ctx: &Context<'_>) -> Result<Vec<UserInvite>> {
        store(ctx)?.list_invites(tenant(ctx)?).await.extend()
    }

    /// Open to anonymous callers so the registration page can show the
    /// invite. Only redeemable invites are returned.
    async fn invite_by_code(&self, ctx: &Context<'_>, code: String) -> Result<Option<UserInvite>> {
        store(ctx)?
            .find_pending_invite(code.trim(), Utc::now())
            .await
            .extend()
    }
}

#[derive(Default)]
pub struct InviteMutation;

#[Object]
impl InviteMutation {
    async fn invite_user(
        &self,
        ctx: &Context<'_>,
        email: String,
        role: UserRole,
    ) -> Result<InvitePayload> {
        require_roles(ctx, MANAGERS)?;
        let org = tenant(ctx)?;
        let invited_by_id = current_user(ctx)?;

        let email = email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Ok(InvitePayload {
                error: Some("A valid email address is required".to_string()),
                ..Default::default()
            });
        }
        if ADMINS.contains(&role) {
            return Ok(InvitePayload {
                error: Some(format!("Cannot invite users with role '{}'", role)),
                ..Default::default()
            });
        }

        let invite = store(ctx)?
            .create_invite(
                org,
                NewInvite {
                    email,
                    role,
                    invite_code: generate_invite_code(),
                    expiry_date: Utc::now() + Duration::hours(24),
                    invited_by_id,
                },
            )
            .await
            .extend()?;
        let invite_link = format!(
            "{}/register?code={}",
            settings(ctx)?.frontend_url.trim_end_matches('/'),
            invite.invite_code
        );
        info!("✉️  Invited {} to organization {}", invite.email, org);

        Ok(InvitePayload {
            invite: Some(invite),
            invite_link: Some(invite_link),
            error: None,
        })
    }

    async fn cancel_invite(&self, ctx: &Context<'_>, invite_id: Uuid) -> Result<bool> {
        require_roles(ctx, MANAGERS)?;
        store(ctx)?
            .cancel_invite(tenant(ctx)?, invite_id)
            .await
            .extend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_code_shape() {
        let code = generate_invite_code();
        assert_eq!(code.len(), 12);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_ne!(generate_invite_code(), code);
    }
}

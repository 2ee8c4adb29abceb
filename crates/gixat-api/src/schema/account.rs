//! Registration, login, tokens and the caller's own profile

use async_graphql::{Context, InputObject, Object, Result, ResultExt, SimpleObject, Upload};
use chrono::{DateTime, Utc};
use gixat_core::graphql::{objects, request_context, store};
use gixat_core::models::{NewUser, Organization, ProfileUpdate, User, UserRole, UserType};
use gixat_core::object_store::{DOWNLOAD_URL_EXPIRY, UPLOAD_URL_EXPIRY};
use gixat_core::Error;
use gixat_media::keys::avatar_key;
use gixat_media::validation::validate_avatar;
use tracing::{info, warn};
use uuid::Uuid;

use super::media::{read_upload, record_upload};
use super::{ADMINS, current_user, found, pipeline, require_roles, settings, tokens};
use crate::auth::{hash_password, password_violations, verify_password};
use crate::cookies::{append_cookie, auth_cookie, cleared_cookie};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_INVITE: &str = "Invalid or expired invite code";
/// Roles a new account may only receive through an invite or a promotion
const INVITE_ONLY_ROLES: &[UserRole] = &[
    UserRole::SuperAdmin,
    UserRole::SystemAdmin,
    UserRole::OrgAdmin,
];

#[derive(InputObject)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[graphql(default_with = "UserType::Organizational")]
    pub user_type: UserType,
    #[graphql(default_with = "UserRole::OrgUser")]
    pub role: UserRole,
    pub invite_code: Option<String>,
}

#[derive(InputObject)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Result of register, login and refresh. Expected failures are reported
/// in `error` rather than as GraphQL errors.
#[derive(SimpleObject, Default)]
pub struct AuthPayload {
    pub token: Option<String>,
    pub user: Option<User>,
    pub error: Option<String>,
}

impl AuthPayload {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(SimpleObject)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<UserRole>,
    pub organization: Option<Organization>,
}

#[derive(SimpleObject)]
pub struct AvatarUploadResult {
    pub avatar_url: Option<String>,
    pub message: String,
}

async fn profile(ctx: &Context<'_>, user: User) -> Result<UserProfile> {
    let avatar_url = match &user.avatar_key {
        Some(key) => Some(
            objects(ctx)?
                .presign_get(key, DOWNLOAD_URL_EXPIRY)
                .await
                .extend()?,
        ),
        None => None,
    };
    let organization = match user.organization_id {
        Some(id) => store(ctx)?.get_organization(id).await.extend()?,
        None => None,
    };
    Ok(UserProfile {
        id: user.id,
        full_name: user.full_name,
        email: user.email,
        phone_number: user.phone_number,
        avatar_url,
        bio: user.bio,
        user_type: user.user_type,
        created_at: user.created_at,
        roles: vec![user.role],
        organization,
    })
}

async fn load_user(ctx: &Context<'_>, id: Uuid) -> Result<User> {
    let user = store(ctx)?.get_user(id).await.extend()?;
    found(user, "User", id)
}

/// Issue a token for `user` and attach it as a cookie
fn signed_in(ctx: &Context<'_>, user: User) -> Result<AuthPayload> {
    let tokens = tokens(ctx)?;
    let token = tokens.issue(&user).map_err(Error::from).extend()?;
    append_cookie(
        ctx,
        auth_cookie(&token, tokens.lifetime(), settings(ctx)?.secure_cookies),
    );
    Ok(AuthPayload {
        token: Some(token),
        user: Some(user),
        error: None,
    })
}

#[derive(Default)]
pub struct AccountQuery;

#[Object]
impl AccountQuery {
    /// The signed-in user, or null for anonymous callers
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        match request_context(ctx)?.user_id {
            Some(id) => store(ctx)?.get_user(id).await.extend(),
            None => Ok(None),
        }
    }

    async fn my_profile(&self, ctx: &Context<'_>) -> Result<UserProfile> {
        let user = load_user(ctx, current_user(ctx)?).await?;
        profile(ctx, user).await
    }

    async fn user_profile_by_id(&self, ctx: &Context<'_>, id: Uuid) -> Result<UserProfile> {
        require_roles(ctx, ADMINS)?;
        let user = load_user(ctx, id).await?;
        profile(ctx, user).await
    }
}

#[derive(Default)]
pub struct AccountMutation;

#[Object]
impl AccountMutation {
    async fn register(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<AuthPayload> {
        let email = input.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Ok(AuthPayload::failed(format!("Email '{}' is invalid.", email)));
        }
        let violations = password_violations(&input.password);
        if !violations.is_empty() {
            return Ok(AuthPayload::failed(violations.join(", ")));
        }

        let invite = match input.invite_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                match store(ctx)?
                    .find_pending_invite(code, Utc::now())
                    .await
                    .extend()?
                {
                    Some(invite) => Some(invite),
                    None => return Ok(AuthPayload::failed(INVALID_INVITE)),
                }
            }
            _ => None,
        };

        if invite.is_none() && INVITE_ONLY_ROLES.contains(&input.role) {
            return Ok(AuthPayload::failed(format!(
                "Role '{}' cannot be self-assigned.",
                input.role
            )));
        }
        let password_hash = hash_password(&input.password)
            .map_err(Error::from)
            .extend()?;
        let new_user = NewUser {
            email,
            full_name: input.full_name.trim().to_string(),
            password_hash,
            // An invite decides the organization and role
            user_type: if invite.is_some() {
                UserType::Organizational
            } else {
                input.user_type
            },
            role: invite.as_ref().map_or(input.role, |i| i.role),
            organization_id: invite.as_ref().map(|i| i.organization_id),
        };

        let user = match store(ctx)?
            .register_user(new_user, invite.as_ref().map(|i| i.id))
            .await
        {
            Ok(user) => user,
            Err(e) if e.is_client_facing() => return Ok(AuthPayload::failed(e.to_string())),
            Err(e) => return Err(e).extend(),
        };
        info!("👤 Registered {} ({})", user.email, user.role);
        signed_in(ctx, user)
    }

    async fn login(&self, ctx: &Context<'_>, input: LoginInput) -> Result<AuthPayload> {
        let user = store(ctx)?
            .find_user_by_email(input.email.trim())
            .await
            .extend()?;
        match user {
            Some(user) if user.is_active && verify_password(&input.password, &user.password_hash) => {
                signed_in(ctx, user)
            }
            _ => Ok(AuthPayload::failed(INVALID_CREDENTIALS)),
        }
    }

    /// Re-issue the token so organization and role changes take effect
    async fn refresh_token(&self, ctx: &Context<'_>) -> Result<AuthPayload> {
        let user = load_user(ctx, current_user(ctx)?).await?;
        if !user.is_active {
            return Ok(AuthPayload::failed(INVALID_CREDENTIALS));
        }
        signed_in(ctx, user)
    }

    async fn logout(&self, ctx: &Context<'_>) -> Result<bool> {
        append_cookie(ctx, cleared_cookie(settings(ctx)?.secure_cookies));
        Ok(true)
    }

    async fn update_my_profile(&self, ctx: &Context<'_>, input: ProfileUpdate) -> Result<UserProfile> {
        let user = store(ctx)?
            .update_profile(current_user(ctx)?, input.trimmed())
            .await
            .extend()?;
        profile(ctx, user).await
    }

    async fn upload_my_avatar(&self, ctx: &Context<'_>, file: Upload) -> Result<AvatarUploadResult> {
        let user_id = current_user(ctx)?;
        let file = read_upload(ctx, &file).await?;
        let content_type = file.content_type.clone().unwrap_or_default();
        validate_avatar(&content_type, file.bytes.len())
            .map_err(Error::from)
            .extend()?;

        let key = avatar_key(user_id, &file.file_name, Utc::now());
        let stored = pipeline(ctx)?.upload(file, key).await;
        record_upload(ctx, "avatar", &stored);
        let stored = stored.extend()?;

        let previous = store(ctx)?
            .set_avatar(user_id, Some(stored.key.clone()))
            .await
            .extend()?;
        if let Some(old) = previous.filter(|old| *old != stored.key)
            && let Err(e) = objects(ctx)?.delete(&old).await
        {
            warn!("Failed to delete previous avatar {}: {}", old, e);
        }

        let avatar_url = objects(ctx)?
            .presign_get(&stored.key, DOWNLOAD_URL_EXPIRY)
            .await
            .extend()?;
        Ok(AvatarUploadResult {
            avatar_url: Some(avatar_url),
            message: "Avatar uploaded successfully".to_string(),
        })
    }

    async fn delete_my_avatar(&self, ctx: &Context<'_>) -> Result<bool> {
        let previous = store(ctx)?
            .set_avatar(current_user(ctx)?, None)
            .await
            .extend()?;
        match previous {
            Some(key) => {
                if let Err(e) = objects(ctx)?.delete(&key).await {
                    warn!("Failed to delete avatar {}: {}", key, e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Presigned PUT URL for an avatar, valid for 15 minutes
    async fn generate_avatar_upload_url(
        &self,
        ctx: &Context<'_>,
        file_name: String,
        content_type: String,
    ) -> Result<String> {
        let user_id = current_user(ctx)?;
        validate_avatar(&content_type, 1)
            .map_err(Error::from)
            .extend()?;
        let key = avatar_key(user_id, &file_name, Utc::now());
        objects(ctx)?
            .presign_put(&key, &content_type, UPLOAD_URL_EXPIRY)
            .await
            .extend()
    }
}

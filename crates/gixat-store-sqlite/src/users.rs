use async_trait::async_trait;
use chrono::Utc;
use gixat_core::models::{InviteStatus, NewUser, ProfileUpdate, User, UserRole};
use gixat_core::store::UserStore;
use gixat_core::{Error, OrganizationId, Result};
use sqlx::SqliteExecutor;
use sqlx::sqlite::SqliteRow;
use tracing::info;
use uuid::Uuid;

use crate::store::{
    SqliteGarageStore, db_err, flag, opt_text, opt_uuid, org_text, parsed, text, timestamp, uuid,
};

const SELECT_USER: &str = r#"
    SELECT id, email, full_name, user_type, role, organization_id, phone_number,
           bio, avatar_key, is_active, password_hash, created_at
    FROM users
"#;

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: uuid(row, "id")?,
        email: text(row, "email")?,
        full_name: text(row, "full_name")?,
        user_type: parsed(row, "user_type")?,
        role: parsed(row, "role")?,
        organization_id: opt_uuid(row, "organization_id")?,
        phone_number: opt_text(row, "phone_number")?,
        bio: opt_text(row, "bio")?,
        avatar_key: opt_text(row, "avatar_key")?,
        is_active: flag(row, "is_active")?,
        password_hash: text(row, "password_hash")?,
        created_at: timestamp(row, "created_at")?,
    })
}

/// A user of `org`, usable inside a transaction
pub(crate) async fn fetch_tenant_user<'e>(
    ex: impl SqliteExecutor<'e>,
    org: OrganizationId,
    user_id: Uuid,
) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "{} WHERE id = ? AND organization_id = ?",
        SELECT_USER
    ))
    .bind(user_id.to_string())
    .bind(org_text(org))
    .fetch_optional(ex)
    .await
    .map_err(db_err)?;
    row.as_ref().map(user_from_row).transpose()
}

pub(crate) async fn tenant_users<'e>(ex: impl SqliteExecutor<'e>, org: OrganizationId) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "{} WHERE organization_id = ? ORDER BY full_name",
        SELECT_USER
    ))
    .bind(org_text(org))
    .fetch_all(ex)
    .await
    .map_err(db_err)?;
    rows.iter().map(user_from_row).collect()
}

async fn insert_user<'e>(ex: impl SqliteExecutor<'e>, user: &NewUser) -> Result<User> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let email = user.email.trim().to_string();

    sqlx::query(
        r#"
        INSERT INTO users (
            id, email, full_name, user_type, role, organization_id,
            is_active, password_hash, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&email)
    .bind(&user.full_name)
    .bind(user.user_type.as_str())
    .bind(user.role.as_str())
    .bind(user.organization_id.map(|o| o.to_string()))
    .bind(&user.password_hash)
    .bind(now)
    .execute(ex)
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => Error::rule(
            "DuplicateEmail",
            format!("Email '{}' is already taken.", email),
        ),
        _ => db_err(e),
    })?;

    Ok(User {
        id,
        email,
        full_name: user.full_name.clone(),
        user_type: user.user_type,
        role: user.role,
        organization_id: user.organization_id,
        phone_number: None,
        bio: None,
        avatar_key: None,
        is_active: true,
        password_hash: user.password_hash.clone(),
        created_at: now,
    })
}

#[async_trait]
impl UserStore for SqliteGarageStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let created = insert_user(&self.pool, &user).await?;
        info!("Created user {}", created.id);
        Ok(created)
    }

    async fn register_user(&self, user: NewUser, invite_id: Option<Uuid>) -> Result<User> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let created = insert_user(&mut *tx, &user).await?;

        if let Some(invite_id) = invite_id {
            let result = sqlx::query("UPDATE user_invites SET status = ? WHERE id = ? AND status = ?")
                .bind(InviteStatus::Accepted.as_str())
                .bind(invite_id.to_string())
                .bind(InviteStatus::Pending.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            if result.rows_affected() == 0 {
                return Err(Error::InvalidRequest(
                    "Invalid or expired invite code".to_string(),
                ));
            }
        }

        tx.commit().await.map_err(db_err)?;
        info!("Registered user {}", created.id);
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        // The column is declared COLLATE NOCASE
        let row = sqlx::query(&format!("{} WHERE email = ?", SELECT_USER))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn assign_user_to_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role: Option<UserRole>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET organization_id = ?, role = COALESCE(?, role) WHERE id = ?",
        )
        .bind(organization_id.to_string())
        .bind(role.map(|r| r.as_str()))
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<User> {
        let update = update.trimmed();
        let result = sqlx::query(
            r#"
            UPDATE users SET
                full_name = COALESCE(?, full_name),
                bio = COALESCE(?, bio),
                phone_number = COALESCE(?, phone_number)
            WHERE id = ?
            "#,
        )
        .bind(update.full_name)
        .bind(update.bio)
        .bind(update.phone_number)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("User", user_id));
        }
        self.get_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User", user_id))
    }

    async fn set_avatar(&self, user_id: Uuid, key: Option<String>) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT avatar_key FROM users WHERE id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let Some(previous) = previous else {
            return Err(Error::not_found("User", user_id));
        };

        sqlx::query("UPDATE users SET avatar_key = ? WHERE id = ?")
            .bind(key)
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(previous)
    }

    async fn list_organization_users(&self, org: OrganizationId) -> Result<Vec<User>> {
        tenant_users(&self.pool, org).await
    }

    async fn get_tenant_user(&self, org: OrganizationId, user_id: Uuid) -> Result<Option<User>> {
        fetch_tenant_user(&self.pool, org, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_user, store, tenant};
    use gixat_core::models::UserType;

    #[tokio::test]
    async fn test_duplicate_email_is_rejected_case_insensitively() {
        let store = store().await;
        store.create_user(new_user("dana@garage.test")).await.unwrap();
        let err = store
            .create_user(new_user("DANA@garage.test"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email 'DANA@garage.test' is already taken.");
        assert_eq!(err.code(), "BUSINESS_RULE_VIOLATION");

        let found = store.find_user_by_email("Dana@Garage.test").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_tenant_user_is_scoped() {
        let store = store().await;
        let (org_a, admin_a) = tenant(&store, "a").await;
        let (org_b, _) = tenant(&store, "b").await;

        assert!(store.get_tenant_user(org_a, admin_a.id).await.unwrap().is_some());
        assert!(store.get_tenant_user(org_b, admin_a.id).await.unwrap().is_none());
        assert_eq!(store.list_organization_users(org_a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_and_avatar_updates() {
        let store = store().await;
        let user = store.create_user(new_user("lee@garage.test")).await.unwrap();
        assert_eq!(user.user_type, UserType::Organizational);

        let updated = store
            .update_profile(
                user.id,
                ProfileUpdate {
                    bio: Some("  Brakes specialist ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Brakes specialist"));
        assert_eq!(updated.full_name, user.full_name);

        let previous = store
            .set_avatar(user.id, Some("avatars/a.png".into()))
            .await
            .unwrap();
        assert_eq!(previous, None);
        let previous = store.set_avatar(user.id, None).await.unwrap();
        assert_eq!(previous.as_deref(), Some("avatars/a.png"));
    }

    #[tokio::test]
    async fn test_assign_missing_user_returns_false() {
        let store = store().await;
        let (org, _) = tenant(&store, "a").await;
        let assigned = store
            .assign_user_to_organization(Uuid::new_v4(), *org.as_uuid(), None)
            .await
            .unwrap();
        assert!(!assigned);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gixat_core::models::{InviteStatus, NewInvite, UserInvite};
use gixat_core::store::InviteStore;
use gixat_core::{OrganizationId, Result};
use sqlx::sqlite::SqliteRow;
use tracing::info;
use uuid::Uuid;

use crate::store::{SqliteGarageStore, db_err, org_text, parsed, text, timestamp, uuid, write_err};

const SELECT_INVITE: &str = r#"
    SELECT id, organization_id, email, role, invite_code, expiry_date, status,
           invited_by_id, created_at
    FROM user_invites
"#;

fn invite_from_row(row: &SqliteRow) -> Result<UserInvite> {
    Ok(UserInvite {
        id: uuid(row, "id")?,
        organization_id: uuid(row, "organization_id")?,
        email: text(row, "email")?,
        role: parsed(row, "role")?,
        invite_code: text(row, "invite_code")?,
        expiry_date: timestamp(row, "expiry_date")?,
        status: parsed(row, "status")?,
        invited_by_id: uuid(row, "invited_by_id")?,
        created_at: timestamp(row, "created_at")?,
    })
}

#[async_trait]
impl InviteStore for SqliteGarageStore {
    async fn create_invite(&self, org: OrganizationId, invite: NewInvite) -> Result<UserInvite> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let email = invite.email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO user_invites (
                id, organization_id, email, role, invite_code, expiry_date,
                status, invited_by_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(org_text(org))
        .bind(&email)
        .bind(invite.role.as_str())
        .bind(&invite.invite_code)
        .bind(invite.expiry_date)
        .bind(InviteStatus::Pending.as_str())
        .bind(invite.invited_by_id.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "Invite code"))?;

        info!("Created invite {} for organization {}", id, org);

        Ok(UserInvite {
            id,
            organization_id: *org.as_uuid(),
            email,
            role: invite.role,
            invite_code: invite.invite_code,
            expiry_date: invite.expiry_date,
            status: InviteStatus::Pending,
            invited_by_id: invite.invited_by_id,
            created_at: now,
        })
    }

    async fn cancel_invite(&self, org: OrganizationId, invite_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE user_invites SET status = ? WHERE id = ? AND organization_id = ?")
                .bind(InviteStatus::Canceled.as_str())
                .bind(invite_id.to_string())
                .bind(org_text(org))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_invites(&self, org: OrganizationId) -> Result<Vec<UserInvite>> {
        let rows = sqlx::query(&format!(
            "{} WHERE organization_id = ? ORDER BY created_at DESC",
            SELECT_INVITE
        ))
        .bind(org_text(org))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(invite_from_row).collect()
    }

    async fn find_pending_invite(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserInvite>> {
        let row = sqlx::query(&format!(
            "{} WHERE invite_code = ? AND status = ?",
            SELECT_INVITE
        ))
        .bind(code.trim())
        .bind(InviteStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        // Expiry is compared on decoded values, not on the stored text
        Ok(row
            .as_ref()
            .map(invite_from_row)
            .transpose()?
            .filter(|invite| invite.is_redeemable(now)))
    }
}

use async_trait::async_trait;
use chrono::Utc;
use gixat_core::models::{Address, MediaType, NewOrganization, Organization, UserRole, UserType};
use gixat_core::store::OrganizationStore;
use gixat_core::{Error, OrganizationId, Result};
use sqlx::sqlite::SqliteRow;
use tracing::info;
use uuid::Uuid;

use crate::store::{SqliteGarageStore, db_err, flag, opt_text, opt_uuid, text, timestamp, uuid};

const SELECT_ORGANIZATION: &str = r#"
    SELECT id, name, address_country, address_city, address_street,
           address_phone_country_code, logo_id, created_at, is_active
    FROM organizations
"#;

/// Decode the `address_*` columns shared by organizations and customers
pub(crate) fn address_columns(row: &SqliteRow) -> Result<Option<Address>> {
    let Some(country) = opt_text(row, "address_country")? else {
        return Ok(None);
    };
    Ok(Some(Address {
        country,
        city: opt_text(row, "address_city")?.unwrap_or_default(),
        street: opt_text(row, "address_street")?.unwrap_or_default(),
        phone_country_code: opt_text(row, "address_phone_country_code")?.unwrap_or_default(),
    }))
}

fn organization_from_row(row: &SqliteRow) -> Result<Organization> {
    Ok(Organization {
        id: uuid(row, "id")?,
        name: text(row, "name")?,
        address: address_columns(row)?,
        logo_id: opt_uuid(row, "logo_id")?,
        created_at: timestamp(row, "created_at")?,
        is_active: flag(row, "is_active")?,
    })
}

#[async_trait]
impl OrganizationStore for SqliteGarageStore {
    async fn create_organization(
        &self,
        input: NewOrganization,
        admin: Option<Uuid>,
    ) -> Result<Organization> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let address = input.address();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let logo_id = match input.logo_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                let media_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO media (id, organization_id, key, alt, media_type, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(media_id.to_string())
                .bind(id.to_string())
                .bind(key)
                .bind(&input.logo_alt)
                .bind(MediaType::Image.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                Some(media_id)
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO organizations (
                id, name, address_country, address_city, address_street,
                address_phone_country_code, logo_id, created_at, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(id.to_string())
        .bind(input.name.trim())
        .bind(&address.country)
        .bind(&address.city)
        .bind(&address.street)
        .bind(&address.phone_country_code)
        .bind(logo_id.map(|m| m.to_string()))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(user_id) = admin {
            sqlx::query(
                "UPDATE users SET organization_id = ?, role = ?, user_type = ? WHERE id = ?",
            )
            .bind(id.to_string())
            .bind(UserRole::OrgAdmin.as_str())
            .bind(UserType::Organizational.as_str())
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        info!("Created organization {} ({})", input.name.trim(), id);

        Ok(Organization {
            id,
            name: input.name.trim().to_string(),
            address: Some(address),
            logo_id,
            created_at: now,
            is_active: true,
        })
    }

    async fn get_organization(&self, id: Uuid) -> Result<Option<Organization>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ORGANIZATION))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(organization_from_row).transpose()
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_ORGANIZATION))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(organization_from_row).collect()
    }

    async fn rename_organization(&self, org: OrganizationId, name: &str) -> Result<Organization> {
        let result = sqlx::query("UPDATE organizations SET name = ? WHERE id = ?")
            .bind(name.trim())
            .bind(org.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Organization not found".to_string()));
        }
        self.get_organization(*org.as_uuid())
            .await?
            .ok_or_else(|| Error::NotFound("Organization not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_user, store};
    use gixat_core::store::UserStore;

    fn input(name: &str) -> NewOrganization {
        NewOrganization {
            name: name.into(),
            country: "Jordan".into(),
            city: "Amman".into(),
            street: "Mecca St".into(),
            phone_country_code: "962".into(),
            logo_key: Some("logos/acme.png".into()),
            logo_alt: Some("Acme logo".into()),
        }
    }

    #[tokio::test]
    async fn test_create_organization_assigns_admin() {
        let store = store().await;
        let user = store.create_user(new_user("owner@acme.test")).await.unwrap();

        let org = store
            .create_organization(input("  Acme Motors "), Some(user.id))
            .await
            .unwrap();
        assert_eq!(org.name, "Acme Motors");
        assert!(org.logo_id.is_some());

        let user = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.organization_id, Some(org.id));
        assert_eq!(user.role, UserRole::OrgAdmin);

        let fetched = store.get_organization(org.id).await.unwrap().unwrap();
        assert_eq!(fetched.address.unwrap().city, "Amman");
    }

    #[tokio::test]
    async fn test_rename_missing_organization() {
        let store = store().await;
        let err = store
            .rename_organization(OrganizationId::new(), "Nope")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Organization not found");
    }
}

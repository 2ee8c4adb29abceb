//! Token issuing and verification, password hashing
//!
//! Tokens are HS256 JWTs. The claim names match what existing clients
//! already read: `nameid` mirrors `sub`, the tenant is carried in
//! `OrganizationId`.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use gixat_core::models::{User, UserRole};
use gixat_core::{OrganizationId, RequestContext};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to hash password: {0}")]
    Hashing(String),
}

impl From<AuthError> for gixat_core::Error {
    fn from(err: AuthError) -> Self {
        gixat_core::Error::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub jti: String,
    pub nameid: String,
    #[serde(
        rename = "OrganizationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
}

impl Claims {
    /// The caller described by these claims. Unknown role names are
    /// dropped.
    pub fn to_context(&self) -> Option<RequestContext> {
        let user_id = Uuid::parse_str(&self.sub).ok()?;
        let organization_id = self
            .organization_id
            .as_deref()
            .and_then(|id| OrganizationId::from_string(id).ok());
        let roles = self
            .roles
            .iter()
            .filter_map(|r| r.parse::<UserRole>().ok())
            .collect();
        Some(RequestContext::for_user(user_id, organization_id, roles))
    }
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub key: String,
    pub issuer: String,
    pub audience: String,
    pub expire_days: i64,
}

/// Signs and verifies access tokens
#[derive(Clone)]
pub struct TokenService {
    settings: JwtSettings,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    pub fn new(settings: JwtSettings) -> Self {
        let encoding = EncodingKey::from_secret(settings.key.as_bytes());
        let decoding = DecodingKey::from_secret(settings.key.as_bytes());
        Self {
            settings,
            encoding,
            decoding,
        }
    }

    /// Lifetime of an issued token, also used as the cookie max-age
    pub fn lifetime(&self) -> Duration {
        Duration::days(self.settings.expire_days)
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            jti: Uuid::new_v4().to_string(),
            nameid: user.id.to_string(),
            organization_id: user.organization_id.map(|id| id.to_string()),
            roles: vec![user.role.as_str().to_string()],
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            exp: (Utc::now() + self.lifetime()).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verified claims, or `None` for a bad signature, issuer, audience or
    /// an expired token
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.settings.issuer]);
        validation.set_audience(&[&self.settings.audience]);
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected access token: {}", e);
                None
            }
        }
    }

    /// Request context for a token; anonymous when it does not verify
    pub fn context_for(&self, token: Option<&str>) -> RequestContext {
        token
            .and_then(|t| self.verify(t))
            .and_then(|claims| claims.to_context())
            .unwrap_or_else(RequestContext::anonymous)
    }
}

/// Every rule `password` breaks, in a fixed order
pub fn password_violations(password: &str) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push("Passwords must be at least 6 characters.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Passwords must have at least one digit ('0'-'9').");
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        violations.push("Passwords must have at least one lowercase ('a'-'z').");
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        violations.push("Passwords must have at least one uppercase ('A'-'Z').");
    }
    if password.chars().all(|c| c.is_alphanumeric()) {
        violations.push("Passwords must have at least one non alphanumeric character.");
    }
    violations
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Constant-time check against a stored PHC string. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gixat_core::models::UserType;

    fn service() -> TokenService {
        TokenService::new(JwtSettings {
            key: "a-test-signing-key-that-is-long-enough".to_string(),
            issuer: "gixat".to_string(),
            audience: "gixat-app".to_string(),
            expire_days: 7,
        })
    }

    fn user(organization_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "dana@garage.test".to_string(),
            full_name: "Dana".to_string(),
            user_type: UserType::Organizational,
            role: UserRole::OrgManager,
            organization_id,
            phone_number: None,
            bio: None,
            avatar_key: None,
            is_active: true,
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = service();
        let org = Uuid::new_v4();
        let user = user(Some(org));
        let token = service.issue(&user).unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.nameid, claims.sub);
        assert_eq!(claims.organization_id, Some(org.to_string()));
        assert_eq!(claims.roles, vec!["OrgManager".to_string()]);

        let ctx = service.context_for(Some(&token));
        assert_eq!(ctx.user_id, Some(user.id));
        assert_eq!(ctx.organization_id, Some(OrganizationId::from_uuid(org)));
        assert!(ctx.has_role(UserRole::OrgManager));
    }

    #[test]
    fn test_token_without_organization_omits_claim() {
        let service = service();
        let token = service.issue(&user(None)).unwrap();
        let claims = service.verify(&token).unwrap();
        assert!(claims.organization_id.is_none());
        assert!(service.context_for(Some(&token)).organization_id.is_none());
    }

    #[test]
    fn test_rejects_foreign_and_garbage_tokens() {
        let token = service().issue(&user(None)).unwrap();
        let other = TokenService::new(JwtSettings {
            key: "a-completely-different-signing-key-value".to_string(),
            issuer: "gixat".to_string(),
            audience: "gixat-app".to_string(),
            expire_days: 7,
        });
        assert!(other.verify(&token).is_none());
        assert!(!service().context_for(Some("not.a.jwt")).is_authenticated());
        assert!(!service().context_for(None).is_authenticated());
    }

    #[test]
    fn test_password_policy() {
        assert!(password_violations("Str0ng!pw").is_empty());
        assert_eq!(password_violations("abc").len(), 4);
        assert_eq!(
            password_violations("abcdef1!"),
            vec!["Passwords must have at least one uppercase ('A'-'Z')."]
        );
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("Str0ng!pw").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Str0ng!pw", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("Str0ng!pw", "not-a-phc-string"));
    }
}

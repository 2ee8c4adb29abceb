//! Error types for Gixat Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// A domain rule rejected the operation. `code` is a stable identifier
    /// such as `ActiveSessionExists` or `InsufficientStock`.
    #[error("{message}")]
    BusinessRule { code: &'static str, message: String },

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // Multi-tenancy errors
    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("{0}")]
    TenantRequired(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backend errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Virus scan error: {0}")]
    Scan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// `"{entity} with ID '{id}' not found"`
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} with ID '{}' not found", entity, id))
    }

    pub fn rule(code: &'static str, message: impl Into<String>) -> Self {
        Error::BusinessRule {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable code exposed to API clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "ENTITY_NOT_FOUND",
            Error::BusinessRule { .. } => "BUSINESS_RULE_VIOLATION",
            Error::InvalidRequest(_) => "VALIDATION_ERROR",
            Error::Storage(_) | Error::Scan(_) => "EXTERNAL_SERVICE_ERROR",
            Error::Forbidden(_) | Error::InvalidTenant(_) | Error::TenantRequired(_) => "FORBIDDEN",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Whether the message is safe to show to the caller as-is
    pub fn is_client_facing(&self) -> bool {
        !matches!(self.code(), "INTERNAL_ERROR")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

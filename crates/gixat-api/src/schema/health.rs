use async_graphql::{Context, Object, Result, SimpleObject};
use chrono::{DateTime, Utc};
use gixat_core::graphql::{objects, store};
use std::time::Instant;

use super::current_user;

#[derive(SimpleObject, Debug, Clone)]
pub struct ServiceHealth {
    pub service: String,
    pub is_healthy: bool,
    pub message: String,
    pub response_time_ms: i64,
}

impl ServiceHealth {
    fn from_check(service: &str, started: Instant, result: gixat_core::Result<()>) -> Self {
        let response_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        match result {
            Ok(()) => Self {
                service: service.to_string(),
                is_healthy: true,
                message: format!("{} is reachable", service),
                response_time_ms,
            },
            Err(e) => Self {
                service: service.to_string(),
                is_healthy: false,
                message: e.to_string(),
                response_time_ms,
            },
        }
    }
}

#[derive(SimpleObject, Debug, Clone)]
pub struct SystemHealth {
    pub is_healthy: bool,
    pub version: String,
    pub database: ServiceHealth,
    pub storage: ServiceHealth,
    pub checked_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct HealthQuery;

#[Object]
impl HealthQuery {
    /// Probe the database and the object store
    async fn system_health(&self, ctx: &Context<'_>) -> Result<SystemHealth> {
        current_user(ctx)?;

        let started = Instant::now();
        let database = ServiceHealth::from_check("Database", started, store(ctx)?.ping().await);

        let started = Instant::now();
        let storage = ServiceHealth::from_check(
            "Storage",
            started,
            objects(ctx)?.health_check().await,
        );

        Ok(SystemHealth {
            is_healthy: database.is_healthy && storage.is_healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            storage,
            checked_at: Utc::now(),
        })
    }
}

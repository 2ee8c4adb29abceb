//! Shared state of the HTTP handlers

use async_trait::async_trait;
use gixat_core::{GarageStore, ObjectStore};
use gixat_observability::{ComponentStatus, Metrics, ReadinessChecker};
use std::sync::Arc;

use crate::auth::TokenService;
use crate::schema::{GixatSchema, Services, build_schema};

#[derive(Clone)]
pub struct AppState {
    pub schema: GixatSchema,
    pub tokens: TokenService,
    pub store: Arc<dyn GarageStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(services: &Services) -> Self {
        Self {
            schema: build_schema(services),
            tokens: services.tokens.clone(),
            store: services.store.clone(),
            objects: services.objects(),
            metrics: services.metrics.clone(),
        }
    }
}

/// `/readyz` probe of the database and the object store
pub struct BackendReadiness {
    store: Arc<dyn GarageStore>,
    objects: Arc<dyn ObjectStore>,
}

impl BackendReadiness {
    pub fn new(store: Arc<dyn GarageStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }
}

fn component(name: &str, result: gixat_core::Result<()>) -> ComponentStatus {
    ComponentStatus {
        name: name.to_string(),
        healthy: result.is_ok(),
        message: result.err().map(|e| e.to_string()),
    }
}

#[async_trait]
impl ReadinessChecker for BackendReadiness {
    async fn check(&self) -> Vec<ComponentStatus> {
        let (db, storage) = tokio::join!(self.store.ping(), self.objects.health_check());
        vec![component("database", db), component("storage", storage)]
    }
}

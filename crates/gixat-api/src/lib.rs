//! GraphQL API and HTTP surface for Gixat
//!
//! - [`schema`]: query and mutation roots over the garage store
//! - [`auth`]: JWT issuing and verification, password hashing
//! - [`router`]: the axum application with middleware and health routes

pub mod auth;
pub mod context;
pub mod cookies;
pub mod media_routes;
pub mod middleware;
pub mod router;
pub mod schema;
pub mod state;

pub use auth::{JwtSettings, TokenService};
pub use router::router;
pub use schema::{ApiSettings, GixatSchema, Services, build_schema};
pub use state::{AppState, BackendReadiness};

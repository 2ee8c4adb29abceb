//! Gixat Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout Gixat:
//! - Domain models for organizations, customers, sessions, job cards and more
//! - Tenant and request context types
//! - Store trait abstractions implemented by the storage crates
//! - Object storage trait used by the media pipeline
//! - Pure workflow rules (session transitions, job card extraction, pricing)
//! - Core error types

#[macro_use]
mod macros;

pub mod error;
pub mod export;
pub mod models;
pub mod object_store;
pub mod pricing;
pub mod scheduling;
pub mod store;
pub mod tenant;
pub mod workflow;

#[cfg(feature = "graphql")]
pub mod graphql;

pub use error::{Error, Result};
pub use object_store::ObjectStore;
pub use store::GarageStore;
pub use tenant::{OrganizationId, RequestContext};

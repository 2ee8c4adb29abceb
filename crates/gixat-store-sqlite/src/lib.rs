//! SQLite persistence for Gixat
//!
//! [`SqliteGarageStore`] implements every store trait from `gixat-core` on a
//! single sqlx pool. Each tenant-owned query is filtered by organization.

mod appointments;
mod comments;
mod customers;
mod inventory;
mod invites;
mod job_cards;
mod lookup;
mod media;
pub mod migrations;
mod organizations;
mod parts_labor;
mod sessions;
mod store;
mod users;

#[cfg(test)]
mod test_support;

pub use migrations::{MIGRATIONS, Migration, current_version, run_migrations};
pub use store::SqliteGarageStore;

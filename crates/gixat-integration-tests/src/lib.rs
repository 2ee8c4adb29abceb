//! Cross-crate tests for Gixat
//!
//! The tests under `tests/` run the GraphQL schema against an in-memory
//! SQLite store and an in-memory object store, exercising the same wiring
//! the server binary uses.

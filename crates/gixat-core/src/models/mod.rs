//! Domain models
//!
//! Models derive GraphQL object and input types when the `graphql` feature
//! is enabled. Relation fields (a customer's cars, a session's logs) are
//! resolved through the store in [`crate::graphql`].

mod appointment;
mod comment;
mod customer;
mod inventory;
mod invite;
mod job_card;
mod labor;
mod lookup;
mod media;
mod organization;
mod session;
mod user;

pub use appointment::*;
pub use comment::*;
pub use customer::*;
pub use inventory::*;
pub use invite::*;
pub use job_card::*;
pub use labor::*;
pub use lookup::*;
pub use media::*;
pub use organization::*;
pub use session::*;
pub use user::*;

/// Offset pagination for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub take: i64,
}

impl Page {
    pub const DEFAULT_TAKE: i64 = 50;
    pub const MAX_TAKE: i64 = 100;

    /// Clamp caller-supplied values into a valid window
    pub fn new(skip: Option<i64>, take: Option<i64>) -> Self {
        Self {
            skip: skip.unwrap_or(0).max(0),
            take: take
                .unwrap_or(Self::DEFAULT_TAKE)
                .clamp(1, Self::MAX_TAKE),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        assert_eq!(Page::default(), Page { skip: 0, take: 50 });
        assert_eq!(Page::new(Some(-5), Some(500)), Page { skip: 0, take: 100 });
        assert_eq!(Page::new(Some(10), Some(0)), Page { skip: 10, take: 1 });
    }
}

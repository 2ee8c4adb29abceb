use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionStage;

text_enum! {
    pub enum MediaType {
        Image,
        Video,
    }
}

text_enum! {
    /// Phase of work a job card or job item file documents
    pub enum JobCardMediaType {
        BeforeWork,
        DuringWork,
        AfterWork,
        Documentation,
    }
}

/// A stored file. Only the object key is persisted; URLs are presigned
/// when the row is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct Media {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub key: String,
    pub alt: Option<String>,
    #[cfg_attr(feature = "graphql", graphql(name = "type"))]
    pub media_type: MediaType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub key: String,
    pub alt: Option<String>,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct SessionMedia {
    pub id: Uuid,
    pub session_id: Uuid,
    pub media_id: Uuid,
    pub stage: SessionStage,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct JobCardMedia {
    pub job_card_id: Uuid,
    pub media_id: Uuid,
    #[cfg_attr(feature = "graphql", graphql(name = "type"))]
    pub media_type: JobCardMediaType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
#[cfg_attr(feature = "graphql", graphql(complex))]
pub struct JobItemMedia {
    pub job_item_id: Uuid,
    pub media_id: Uuid,
    #[cfg_attr(feature = "graphql", graphql(name = "type"))]
    pub media_type: JobCardMediaType,
    pub created_at: DateTime<Utc>,
}

/// Entity a `/api/media/{kind}/{id}/...` path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOwner {
    Avatar(Uuid),
    OrganizationLogo(Uuid),
    Session(Uuid),
    JobCard(Uuid),
}

impl MediaOwner {
    /// Parse the `{kind}` and `{id}` path segments
    pub fn parse(kind: &str, id: &str) -> Option<Self> {
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "avatars" => Some(MediaOwner::Avatar(id)),
            "logos" => Some(MediaOwner::OrganizationLogo(id)),
            "sessions" => Some(MediaOwner::Session(id)),
            "jobcards" => Some(MediaOwner::JobCard(id)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_owner_parse() {
        let id = Uuid::new_v4();
        assert_eq!(
            MediaOwner::parse("sessions", &id.to_string()),
            Some(MediaOwner::Session(id))
        );
        assert_eq!(MediaOwner::parse("invoices", &id.to_string()), None);
        assert_eq!(MediaOwner::parse("avatars", "nope"), None);
    }
}

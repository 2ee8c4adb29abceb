//! Object key layout
//!
//! ```text
//! organizations/{org}/sessions/{session}/{STAGE}/{yyyy}/{MM}/{uuid}_{file}
//! organizations/{org}/jobcards/{card}/{TYPE}/{yyyy}/{MM}/{uuid}_{file}
//! organizations/{org}/jobcards/{card}/items/{item}/{TYPE}/{yyyy}/{MM}/{uuid}_{file}
//! avatars/{user}/{uuid}-{file}
//! ```

use chrono::{DateTime, Utc};
use gixat_core::OrganizationId;
use gixat_core::models::{JobCardMediaType, SessionStage};
use uuid::Uuid;

use crate::validation::sanitize_file_name;

fn dated_leaf(file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}",
        now.format("%Y/%m"),
        Uuid::new_v4(),
        sanitize_file_name(file_name, now)
    )
}

/// Every key of a session starts with this prefix
pub fn session_prefix(org: OrganizationId, session_id: Uuid) -> String {
    format!("organizations/{}/sessions/{}/", org, session_id)
}

pub fn session_key(
    org: OrganizationId,
    session_id: Uuid,
    stage: SessionStage,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "{}{}/{}",
        session_prefix(org, session_id),
        stage.key_segment(),
        dated_leaf(file_name, now)
    )
}

fn job_card_segment(media_type: JobCardMediaType) -> String {
    media_type.as_str().to_ascii_uppercase()
}

pub fn job_card_key(
    org: OrganizationId,
    job_card_id: Uuid,
    media_type: JobCardMediaType,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "organizations/{}/jobcards/{}/{}/{}",
        org,
        job_card_id,
        job_card_segment(media_type),
        dated_leaf(file_name, now)
    )
}

pub fn job_item_key(
    org: OrganizationId,
    job_card_id: Uuid,
    job_item_id: Uuid,
    media_type: JobCardMediaType,
    file_name: &str,
    now: DateTime<Utc>,
) -> String {
    format!(
        "organizations/{}/jobcards/{}/items/{}/{}/{}",
        org,
        job_card_id,
        job_item_id,
        job_card_segment(media_type),
        dated_leaf(file_name, now)
    )
}

pub fn avatar_key(user_id: Uuid, file_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "avatars/{}/{}-{}",
        user_id,
        Uuid::new_v4(),
        sanitize_file_name(file_name, now)
    )
}

/// File name portion of a key, without the uuid prefix added on upload
pub fn file_name_of(key: &str) -> &str {
    let leaf = key.rsplit('/').next().unwrap_or(key);
    // uuid (36 chars) plus the separator
    match leaf.get(36..37) {
        Some("_") | Some("-") if Uuid::parse_str(&leaf[..36]).is_ok() => &leaf[37..],
        _ => leaf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_key_layout() {
        let org = OrganizationId::new();
        let session = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 4, 9, 8, 0, 0).unwrap();
        let key = session_key(org, session, SessionStage::TestDrive, "dash cam.mp4", now);

        assert!(key.starts_with(&session_prefix(org, session)));
        let rest = &key[session_prefix(org, session).len()..];
        assert!(rest.starts_with("TESTDRIVE/2026/04/"));
        assert!(rest.ends_with("_dash_cam_20260409080000.mp4"));
        assert_eq!(file_name_of(&key), "dash_cam_20260409080000.mp4");
    }

    #[test]
    fn test_job_card_and_item_keys() {
        let org = OrganizationId::new();
        let card = Uuid::new_v4();
        let item = Uuid::new_v4();
        let now = Utc::now();

        let key = job_card_key(org, card, JobCardMediaType::BeforeWork, "a.jpg", now);
        assert!(key.starts_with(&format!("organizations/{}/jobcards/{}/BEFOREWORK/", org, card)));

        let key = job_item_key(org, card, item, JobCardMediaType::AfterWork, "b.png", now);
        assert!(key.starts_with(&format!(
            "organizations/{}/jobcards/{}/items/{}/AFTERWORK/",
            org, card, item
        )));
    }

    #[test]
    fn test_avatar_key() {
        let user = Uuid::new_v4();
        let key = avatar_key(user, "me.png", Utc::now());
        assert!(key.starts_with(&format!("avatars/{}/", user)));
        assert!(file_name_of(&key).starts_with("me_"));
    }
}

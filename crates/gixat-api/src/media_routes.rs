//! `GET /api/media/{kind}/{id}/{*file}`
//!
//! Redirects to a short-lived presigned URL for the object behind the path.
//! Avatars are public; every other kind is only served to members of the
//! organization owning the entity.
//!
//! `{file}` may span several segments, so dated session and job card keys
//! are reachable:
//!
//! ```text
//! avatars/{user}/{file}              -> avatars/{user}/{file}
//! logos/{org}/{file}                 -> logos/{org}/{file}
//! sessions/{session}/{STAGE}/.../{f} -> organizations/{org}/sessions/{session}/{STAGE}/.../{f}
//! jobcards/{card}/{TYPE}/.../{f}     -> organizations/{org}/jobcards/{card}/{TYPE}/.../{f}
//! ```

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use gixat_core::models::MediaOwner;
use gixat_core::object_store::REDIRECT_URL_EXPIRY;
use tracing::{error, warn};
use uuid::Uuid;

use crate::context::request_context;
use crate::state::AppState;

/// Relative tail with no empty, `.` or `..` segment and no backslash
fn valid_tail(file: &str) -> bool {
    !file.is_empty()
        && !file.contains('\\')
        && file
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Object key for `file` under `owner`. `owner_org` is required for kinds
/// stored below their organization.
fn object_key(owner: MediaOwner, owner_org: Option<Uuid>, file: &str) -> Option<String> {
    match owner {
        MediaOwner::Avatar(user) => Some(format!("avatars/{}/{}", user, file)),
        MediaOwner::OrganizationLogo(org) => Some(format!("logos/{}/{}", org, file)),
        MediaOwner::Session(session) => {
            owner_org.map(|org| format!("organizations/{}/sessions/{}/{}", org, session, file))
        }
        MediaOwner::JobCard(card) => {
            owner_org.map(|org| format!("organizations/{}/jobcards/{}/{}", org, card, file))
        }
    }
}

pub async fn media_redirect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, id, file)): Path<(String, String, String)>,
) -> Response {
    let Some(owner) = MediaOwner::parse(&kind, &id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !valid_tail(&file) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut owner_org = None;
    if !matches!(owner, MediaOwner::Avatar(_)) {
        let ctx = request_context(&state.tokens, &headers);
        if !ctx.is_authenticated() {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let Some(caller_org) = ctx.organization_id else {
            return StatusCode::FORBIDDEN.into_response();
        };
        match state.store.media_owner_organization(owner).await {
            Ok(Some(org)) if org == *caller_org.as_uuid() => owner_org = Some(org),
            Ok(Some(_)) => {
                warn!("Media {}/{} requested from another organization", kind, id);
                return StatusCode::FORBIDDEN.into_response();
            }
            Ok(None) => return StatusCode::NOT_FOUND.into_response(),
            Err(e) => {
                error!("Failed to resolve media owner {}/{}: {}", kind, id, e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let Some(key) = object_key(owner, owner_org, &file) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let url = match state.objects.presign_get(&key, REDIRECT_URL_EXPIRY).await {
        Ok(url) => url,
        Err(e) => {
            error!("Failed to presign {}: {}", key, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    match HeaderValue::from_str(&url) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

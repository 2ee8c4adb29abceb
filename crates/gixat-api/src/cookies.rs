//! `access_token` cookie handling for GraphQL responses

use async_graphql::Context;
use chrono::Duration;

use crate::context::ACCESS_TOKEN_COOKIE;

/// `Set-Cookie` value carrying a freshly issued token
pub fn auth_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        ACCESS_TOKEN_COOKIE,
        token,
        max_age.num_seconds().max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that expires the token cookie immediately
pub fn cleared_cookie(secure: bool) -> String {
    auth_cookie("", Duration::zero(), secure)
}

/// Queue a `Set-Cookie` header on the GraphQL response
pub fn append_cookie(ctx: &Context<'_>, cookie: String) {
    ctx.append_http_header("set-cookie", cookie);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_cookie_attributes() {
        let cookie = auth_cookie("abc", Duration::days(7), false);
        assert_eq!(
            cookie,
            "access_token=abc; HttpOnly; SameSite=Lax; Path=/; Max-Age=604800"
        );
        assert!(auth_cookie("abc", Duration::days(1), true).ends_with("; Secure"));
    }

    #[test]
    fn test_cleared_cookie_expires_now() {
        assert_eq!(
            cleared_cookie(false),
            "access_token=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
        );
    }
}

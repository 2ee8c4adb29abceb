//! Request context extraction
//!
//! The bearer header wins over the cookie. A missing, expired or forged
//! token yields an anonymous context; resolvers that need a user reject it
//! themselves.

use axum::http::{HeaderMap, header};
use gixat_core::RequestContext;

use crate::auth::TokenService;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}

pub fn access_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

pub fn request_context(tokens: &TokenService, headers: &HeaderMap) -> RequestContext {
    tokens.context_for(access_token(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_token() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&map), Some("abc.def.ghi"));

        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwdw==")]);
        assert_eq!(bearer_token(&map), None);

        let map = headers(&[(header::AUTHORIZATION, "Bearer ")]);
        assert_eq!(bearer_token(&map), None);
    }

    #[test]
    fn test_cookie_token() {
        let map = headers(&[(header::COOKIE, "theme=dark; access_token=tok123; lang=en")]);
        assert_eq!(cookie_token(&map), Some("tok123"));

        let map = headers(&[
            (header::COOKIE, "theme=dark"),
            (header::COOKIE, "access_token=second"),
        ]);
        assert_eq!(cookie_token(&map), Some("second"));

        let map = headers(&[(header::COOKIE, "access_token=")]);
        assert_eq!(cookie_token(&map), None);
    }

    #[test]
    fn test_header_takes_precedence_over_cookie() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "access_token=from-cookie"),
        ]);
        assert_eq!(access_token(&map), Some("from-header"));

        let map = headers(&[(header::COOKIE, "access_token=from-cookie")]);
        assert_eq!(access_token(&map), Some("from-cookie"));
    }
}

//! AWS Signature Version 4 query-string presigning
//!
//! Only the `host` header is signed and the payload is declared
//! `UNSIGNED-PAYLOAD`, so the resulting URL can be handed to a browser or
//! used directly by the server-side client.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Longest validity S3 accepts for a presigned URL
pub const MAX_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// One request to presign
#[derive(Debug, Clone)]
pub struct PresignRequest<'a> {
    pub method: &'a str,
    pub scheme: &'a str,
    /// Host header value, including a non-default port
    pub host: &'a str,
    /// Unencoded absolute path, e.g. `/bucket/key`
    pub path: &'a str,
    pub region: &'a str,
    pub expires: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Percent-encode per the SigV4 rules. `/` is kept when `encode_slash` is
/// false, which is what object paths need.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date);
    let k_region = hmac(&k_date, region);
    let k_service = hmac(&k_region, SERVICE);
    hmac(&k_service, "aws4_request")
}

/// Build a presigned URL for `request`
pub fn presign_url(credentials: &Credentials, request: &PresignRequest<'_>) -> String {
    let amz_date = request.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.timestamp.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, request.region, SERVICE);
    let expires = request.expires.min(MAX_EXPIRY).as_secs().max(1);

    let mut params = [
        ("X-Amz-Algorithm", ALGORITHM.to_string()),
        (
            "X-Amz-Credential",
            format!("{}/{}", credentials.access_key_id, scope),
        ),
        ("X-Amz-Date", amz_date.clone()),
        ("X-Amz-Expires", expires.to_string()),
        ("X-Amz-SignedHeaders", "host".to_string()),
    ];
    params.sort_by(|a, b| a.0.cmp(b.0));
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

    let path = uri_encode(request.path, false);
    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
        request.method, path, query, request.host, UNSIGNED_PAYLOAD
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let signature = hex::encode(hmac(
        &signing_key(&credentials.secret_access_key, &date, request.region),
        &string_to_sign,
    ));

    format!(
        "{}://{}{}?{}&X-Amz-Signature={}",
        request.scheme, request.host, path, query, signature
    )
}

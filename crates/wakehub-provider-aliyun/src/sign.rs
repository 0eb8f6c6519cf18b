//! Alibaba Cloud RPC signature, version 1.0 (HMAC-SHA1)
//!
//! 1. Percent-encode every key and value (RFC 3986)
//! 2. Sort the encoded `key=value` strings and join them with `&`
//! 3. `StringToSign = METHOD & encode("/") & encode(canonical)`
//! 4. `Signature = base64(HMAC-SHA1(secret + "&", StringToSign))`
//! 5. Append `Signature=<encoded>` as the last parameter

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding (`A-Z a-z 0-9 - _ . ~` kept, upper-case hex)
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted, encoded `key=value&...` string
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    pairs.join("&")
}

/// String the signature is computed over
pub fn string_to_sign(method: &str, canonical: &str) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(canonical)
    )
}

/// Base64 HMAC-SHA1 of `string_to_sign` keyed with `secret&`
pub fn signature(secret: &str, string_to_sign: &str) -> String {
    let key = format!("{secret}&");
    // HMAC accepts keys of any length
    let mut mac = match HmacSha1::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA1 accepts any key length"),
    };
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Full signed query string for a GET request
pub fn signed_query(method: &str, params: &[(String, String)], secret: &str) -> String {
    let canonical = canonical_query(params);
    let sig = signature(secret, &string_to_sign(method, &canonical));
    format!("{}&Signature={}", canonical, percent_encode(&sig))
}

//! Firmware metadata lookup
//!
//! The metadata endpoint answers
//!
//! ```json
//! {"code": 0, "msg": "ok", "data": {"url": "...", "version": "1.4.0",
//!   "versionCode": 14, "tag": "stable", "size": 1048576, "releasedAt": "..."}}
//! ```
//!
//! `code` 0 is success and 40004 means no package is published. `url` and
//! `version` are required on success; a missing `versionCode` is `-1`.

use serde_json::Value;
use std::time::Duration;

use super::OtaError;
use crate::traits::{FirmwarePackageInfo, HttpClient};

/// Response code for a published package
pub const CODE_SUCCESS: i64 = 0;

/// Response code for "no package published"
pub const CODE_NO_PACKAGE: i64 = 40004;

/// Timeout of the metadata request
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// `true` when `remote` should replace `installed`
///
/// Unknown (negative) versions on either side count as newer.
pub fn is_newer_than_installed(installed: i32, remote: i32) -> bool {
    if installed < 0 || remote < 0 {
        return true;
    }
    remote > installed
}

fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Classify a metadata response body
pub fn parse_metadata(body: &str) -> Result<FirmwarePackageInfo, OtaError> {
    let root: Value = serde_json::from_str(body)
        .map_err(|e| OtaError::LookupParseFailed(e.to_string()))?;

    let code = root
        .get("code")
        .and_then(as_code)
        .ok_or_else(|| OtaError::LookupParseFailed("missing or invalid \"code\"".to_string()))?;

    if code == CODE_NO_PACKAGE {
        return Err(OtaError::NoUpdate);
    }
    if code != CODE_SUCCESS {
        let message = root
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(OtaError::LookupRejected { code, message });
    }

    let data = root.get("data").cloned().unwrap_or(Value::Null);

    let url = string_field(&data, "url");
    if url.is_empty() {
        return Err(OtaError::UrlMissing);
    }
    let version = string_field(&data, "version");
    if version.is_empty() {
        return Err(OtaError::VersionInvalid);
    }

    let version_code = data
        .get("versionCode")
        .and_then(as_code)
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or(-1);
    let size = data.get("size").and_then(Value::as_u64).unwrap_or(0);

    Ok(FirmwarePackageInfo {
        url,
        version,
        version_code,
        tag: string_field(&data, "tag"),
        size,
        released_at: string_field(&data, "releasedAt"),
    })
}

/// Query the metadata endpoint
pub async fn lookup(http: &dyn HttpClient, url: &str) -> Result<FirmwarePackageInfo, OtaError> {
    let response = http
        .get(url, LOOKUP_TIMEOUT)
        .await
        .map_err(|e| OtaError::LookupHttpFailed(e.to_string()))?;

    if response.status != 200 {
        return Err(OtaError::LookupHttpStatus(response.status));
    }

    parse_metadata(&response.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison_fails_open_on_unknown() {
        assert!(is_newer_than_installed(-1, 6));
        assert!(!is_newer_than_installed(6, 6));
        assert!(!is_newer_than_installed(6, 5));
        assert!(is_newer_than_installed(6, -1));
        assert!(is_newer_than_installed(6, 7));
    }

    #[test]
    fn parses_full_success_payload() {
        let body = r#"{"code":0,"msg":"ok","data":{"url":"https://fw.example.com/a.bin",
            "version":"1.4.0","versionCode":14,"tag":"stable","size":1048576,
            "releasedAt":"2026-01-02 10:00:00"}}"#;
        let pkg = parse_metadata(body).unwrap();
        assert_eq!(pkg.url, "https://fw.example.com/a.bin");
        assert_eq!(pkg.version, "1.4.0");
        assert_eq!(pkg.version_code, 14);
        assert_eq!(pkg.tag, "stable");
        assert_eq!(pkg.size, 1_048_576);
        assert_eq!(pkg.released_at, "2026-01-02 10:00:00");
    }

    #[test]
    fn missing_version_code_is_unknown_not_fatal() {
        let body = r#"{"code":0,"data":{"url":"https://fw.example.com/a.bin","version":"1.0"}}"#;
        assert_eq!(parse_metadata(body).unwrap().version_code, -1);
    }

    #[test]
    fn classifies_failures() {
        let code = |body: &str| parse_metadata(body).unwrap_err().code();

        assert_eq!(code("not json"), "ota_lookup_parse_failed");
        assert_eq!(code(r#"{"msg":"no code"}"#), "ota_lookup_parse_failed");
        assert_eq!(code(r#"{"code":40004,"msg":"none"}"#), "ota_no_update");
        assert_eq!(code(r#"{"code":500,"msg":"boom"}"#), "ota_lookup_rejected");
        assert_eq!(code(r#"{"code":0,"data":{"version":"1.0"}}"#), "ota_url_missing");
        assert_eq!(code(r#"{"code":0,"data":{"url":"http://x/a.bin"}}"#), "ota_version_invalid");
    }
}

//! Detection of HTTP 429 responses.
//!
//! Rate limiting is surfaced to the caller as [`ProviderError::RateLimited`]
//! with the server's Retry-After hint. Nothing here retries; a retry is always
//! an explicit user action.

use std::time::Duration;

use crate::provider::ProviderError;

/// Check if an HTTP response is a 429 and extract Retry-After if present.
///
/// Returns `Err(ProviderError::RateLimited { .. })` if 429, `Ok(())` otherwise.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), ProviderError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(ProviderError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    // Try parsing as integer seconds first
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date (e.g. "Wed, 21 Oct 2015 07:28:00 GMT"): not worth a date
    // parser for a hint, report a conservative wait instead
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, retry_after: Option<&str>) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);
        if let Some(value) = retry_after {
            builder = builder.header("retry-after", value);
        }
        reqwest::Response::from(builder.body("").unwrap())
    }

    #[test]
    fn ok_status_passes() {
        assert!(check_rate_limit_response(&response(200, None)).is_ok());
        assert!(check_rate_limit_response(&response(500, Some("3"))).is_ok());
    }

    #[test]
    fn too_many_requests_with_seconds() {
        let err = check_rate_limit_response(&response(429, Some("12"))).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(12)
        ));
    }

    #[test]
    fn too_many_requests_without_header() {
        let err = check_rate_limit_response(&response(429, None)).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn retry_after_formats() {
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }
}

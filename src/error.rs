use thiserror::Error;

/// Type alias for Result with GuardError
pub type Result<T> = std::result::Result<T, GuardError>;

/// Error taxonomy for credential handling, fetching and moderation
#[derive(Error, Debug)]
pub enum GuardError {
    /// Missing or invalid client credentials / configuration values
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Expired or revoked refresh token, consent timeout, rejected authorization
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Resource not found (deleted comment, no active broadcast, ended chat)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403), includes quota exhaustion and disabled chats
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success API response
    #[error("YouTube API error: {0}")]
    ApiError(String),

    /// Response was missing fields we depend on
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GuardError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuardError::RateLimitExceeded { .. }
                | GuardError::ServerError { .. }
                | GuardError::NetworkError(_)
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Whether a live session must halt when a tick hits this error.
    ///
    /// Transient failures leave the session running in a degraded state.
    pub fn is_session_terminal(&self) -> bool {
        self.is_permanent()
    }

    /// Check if the error requires the user to authorize again
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, GuardError::AuthError(_))
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Returns the number of seconds to wait. If the header is missing or invalid,
/// returns a default of 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|date| date.duration_since(std::time::SystemTime::now()).ok())
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn status_to_error<B>(response: &hyper::Response<B>) -> GuardError {
    let status = response.status();
    let status_code = status.as_u16();
    let message = format!(
        "HTTP {}: {}",
        status_code,
        status.canonical_reason().unwrap_or("Unknown")
    );

    match status_code {
        401 => GuardError::AuthError(message),
        403 => GuardError::Forbidden(message),
        404 => GuardError::NotFound(message),
        400 => GuardError::BadRequest(message),
        429 => GuardError::RateLimitExceeded {
            retry_after: parse_retry_after_header(response),
        },
        500..=599 => GuardError::ServerError {
            status: status_code,
            message,
        },
        _ => GuardError::ApiError(message),
    }
}

impl From<google_youtube3::Error> for GuardError {
    fn from(error: google_youtube3::Error) -> Self {
        match error {
            google_youtube3::Error::Failure(ref response) => status_to_error(response),
            google_youtube3::Error::BadRequest(ref err) => GuardError::BadRequest(format!("{}", err)),
            google_youtube3::Error::HttpError(ref err) => {
                GuardError::NetworkError(format!("Connection error: {}", err))
            }
            google_youtube3::Error::Io(err) => GuardError::NetworkError(err.to_string()),
            _ => GuardError::ApiError(error.to_string()),
        }
    }
}

impl From<reqwest::Error> for GuardError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            return GuardError::NetworkError(error.to_string());
        }
        if error.is_decode() {
            return GuardError::InvalidResponse(error.to_string());
        }
        match error.status() {
            Some(status) if status.is_server_error() => GuardError::ServerError {
                status: status.as_u16(),
                message: error.to_string(),
            },
            _ => GuardError::NetworkError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let rate_limit = GuardError::RateLimitExceeded { retry_after: 5 };
        assert!(rate_limit.is_transient());
        assert!(!rate_limit.is_permanent());

        let server_error = GuardError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let network_error = GuardError::NetworkError("Connection timeout".to_string());
        assert!(network_error.is_transient());
        assert!(!network_error.is_session_terminal());
    }

    #[test]
    fn test_permanent_errors() {
        let not_found = GuardError::NotFound("liveChatEnded".to_string());
        assert!(not_found.is_permanent());
        assert!(not_found.is_session_terminal());

        let auth = GuardError::AuthError("invalid_grant".to_string());
        assert!(auth.is_session_terminal());
        assert!(auth.requires_reauthorization());

        let config = GuardError::ConfigError("missing client id".to_string());
        assert!(config.is_permanent());
        assert!(!config.requires_reauthorization());
    }

    #[test]
    fn test_error_display() {
        let error = GuardError::RateLimitExceeded { retry_after: 10 };
        let display = format!("{}", error);
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let auth_error = GuardError::AuthError("Invalid token".to_string());
        assert!(auth_error.to_string().contains("Authentication failed"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (401, "auth"),
            (403, "forbidden"),
            (404, "not_found"),
            (400, "bad_request"),
            (503, "server"),
            (418, "api"),
        ];

        for (code, expected) in cases {
            let response = hyper::Response::builder().status(code).body(()).unwrap();
            let mapped = status_to_error(&response);
            let kind = match mapped {
                GuardError::AuthError(_) => "auth",
                GuardError::Forbidden(_) => "forbidden",
                GuardError::NotFound(_) => "not_found",
                GuardError::BadRequest(_) => "bad_request",
                GuardError::ServerError { .. } => "server",
                GuardError::ApiError(_) => "api",
                _ => "other",
            };
            assert_eq!(kind, expected, "status {}", code);
        }
    }

    #[test]
    fn test_rate_limit_uses_retry_after() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("120"),
        );

        match status_to_error(&response) {
            GuardError::RateLimitExceeded { retry_after } => assert_eq!(retry_after, 120),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_retry_after_header_missing() {
        let response = hyper::Response::builder().status(429).body(()).unwrap();
        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_invalid() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("invalid"),
        );
        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();

        let future_time = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(future_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        let retry_after = parse_retry_after_header(&response);
        assert!(
            (58..=61).contains(&retry_after),
            "Expected ~60, got {}",
            retry_after
        );
    }

    #[test]
    fn test_parse_retry_after_header_past_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();

        let past_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(past_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }
}

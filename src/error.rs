#[cfg(feature = "server")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Crate-wide error type.
///
/// Variants map onto the error taxonomy of the Integration Service Envelope
/// and the gateway's HTTP surface: transient conditions the envelope already
/// handles locally (rate limiting, circuit breaker) still need a typed
/// representation for the cases that bubble all the way to an HTTP response.
#[derive(Debug, Clone)]
pub enum ProxyError {
    BadRequest(String),
    /// The upstream service answered with a non-2xx status. 5xx counts as a
    /// circuit breaker failure and is retried; 4xx is surfaced as 400 and
    /// neither trips the breaker nor retries.
    Upstream { status: u16, body: String },
    /// The call never reached the upstream service at all (connection
    /// refused, timeout, DNS failure). Always a breaker failure, always
    /// retryable.
    Transport(String),
    Internal(String),
    Serialization(String),
    /// The outbound rate limiter refused to admit the call before its timeout
    /// elapsed. Carries a retry-after hint in seconds when the upstream
    /// supplied one.
    RateLimited(Option<u64>),
    /// The circuit breaker for this service is open; the call failed fast
    /// without touching the network.
    CircuitOpen,
    /// The adapter's response could not be translated into a Record; not
    /// retried, logged by the caller.
    Malformed(String),
}

impl ProxyError {
    /// Whether this error should count as a circuit breaker failure and be
    /// eligible for retry. Client-fault errors (`BadRequest`, `Upstream` 4xx,
    /// `Malformed`) return immediately instead.
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            ProxyError::Transport(_) => true,
            ProxyError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(feature = "server")]
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ProxyError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ProxyError::Upstream { status, body } if status < 500 => {
                (StatusCode::BAD_REQUEST, format!("Upstream error ({}): {}", status, body))
            }
            ProxyError::Upstream { status, body } => {
                (StatusCode::BAD_GATEWAY, format!("Upstream error ({}): {}", status, body))
            }
            ProxyError::Transport(msg) => (StatusCode::BAD_GATEWAY, format!("Transport error: {}", msg)),
            ProxyError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {}", msg)),
            ProxyError::Serialization(msg) => (StatusCode::INTERNAL_SERVER_ERROR, format!("Serialization error: {}", msg)),
            ProxyError::RateLimited(retry_after) => {
                let msg = match retry_after {
                    Some(secs) => format!("Rate limited; retry after {}s", secs),
                    None => "Rate limited".to_string(),
                };
                (StatusCode::TOO_MANY_REQUESTS, msg)
            }
            ProxyError::CircuitOpen => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service temporarily unavailable".to_string(),
            ),
            ProxyError::Malformed(msg) => (StatusCode::BAD_GATEWAY, format!("Malformed upstream response: {}", msg)),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": "proxy_error",
                "code": null
            }
        }));

        (status, body).into_response()
    }
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ProxyError::Upstream { status, body } => write!(f, "Upstream Error ({}): {}", status, body),
            ProxyError::Transport(msg) => write!(f, "Transport Error: {}", msg),
            ProxyError::Internal(msg) => write!(f, "Internal Error: {}", msg),
            ProxyError::Serialization(msg) => write!(f, "Serialization Error: {}", msg),
            ProxyError::RateLimited(retry_after) => write!(f, "Rate Limited (retry_after={:?})", retry_after),
            ProxyError::CircuitOpen => write!(f, "Circuit Open"),
            ProxyError::Malformed(msg) => write!(f, "Malformed Response: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Transport("Request timeout - backend service did not respond in time".to_string())
        } else if err.is_connect() {
            ProxyError::Transport("Connection failed - unable to reach backend service".to_string())
        } else if err.is_request() {
            ProxyError::BadRequest(format!("Invalid request: {}", err))
        } else if err.status().is_some() {
            let status = err.status().unwrap();
            if status.as_u16() == 429 {
                ProxyError::RateLimited(None)
            } else {
                ProxyError::Upstream { status: status.as_u16(), body: err.to_string() }
            }
        } else {
            ProxyError::Transport(format!("HTTP client error: {}", err))
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(feature = "server")]
impl From<axum::http::Error> for ProxyError {
    fn from(err: axum::http::Error) -> Self {
        ProxyError::Internal(format!("HTTP protocol error: {}", err))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ProxyError::BadRequest("Resource not found".to_string()),
            std::io::ErrorKind::PermissionDenied => ProxyError::BadRequest("Permission denied".to_string()),
            std::io::ErrorKind::TimedOut => ProxyError::Transport("I/O operation timed out".to_string()),
            _ => ProxyError::Internal(format!("I/O error: {}", err)),
        }
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        ProxyError::BadRequest(format!("Invalid URL: {}", err))
    }
}

impl From<uuid::Error> for ProxyError {
    fn from(err: uuid::Error) -> Self {
        ProxyError::Internal(format!("UUID error: {}", err))
    }
}

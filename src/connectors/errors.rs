/// Errors that can occur during external service communication
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    HttpError(String),
    /// Service unreachable or timeout
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Invalid response format from external service
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Well-formed response whose own status field is not "ok"
    #[error("Upstream status {status}: {message}")]
    UpstreamStatus { status: String, message: String },
    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Rate limited or exceeded quota
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Internal error in connector
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::RateLimited(_))
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::ServiceUnavailable(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            Self::ServiceUnavailable(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ConnectorError::RateLimited("429".into()).is_transient());
        assert!(ConnectorError::ServiceUnavailable("503".into()).is_transient());
        assert!(!ConnectorError::NotFound("404".into()).is_transient());
        assert!(!ConnectorError::UpstreamStatus {
            status: "error".into(),
            message: "Unknown station".into()
        }
        .is_transient());
    }
}

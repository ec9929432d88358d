use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to one of the external data sources (chain explorers,
/// Revolut, the price oracle).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {secs} seconds")]
    Timeout { url: String, secs: u64 },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed payload: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request { source, .. } => !source.is_decode(),
            SourceError::Timeout { .. } => true,
            SourceError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            SourceError::Api(_) | SourceError::Parse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let status = |code: u16| SourceError::Status {
            url: "http://api".to_string(),
            status: StatusCode::from_u16(code).unwrap(),
        };

        assert!(status(429).is_transient());
        assert!(status(502).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
    }

    #[test]
    fn test_payload_errors_are_not_retried() {
        assert!(!SourceError::Parse("missing legs".to_string()).is_transient());
        assert!(!SourceError::Api("NOTOK".to_string()).is_transient());
        assert!(
            SourceError::Timeout {
                url: "http://api".to_string(),
                secs: 30
            }
            .is_transient()
        );
    }
}

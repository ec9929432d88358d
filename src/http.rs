use crate::error::SourceError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-over-HTTP client bound to a single API base URL.
///
/// Each listener owns its own instance so that no request ever depends on
/// state set up by another source.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    max_retries: usize,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        let http = Client::builder()
            .user_agent(concat!("ico-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| request_error(base_url, source))?;

        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 4,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = self.url(path);
        self.execute(&url, || self.http.get(&url).query(query)).await
    }

    pub async fn get_json_authorized<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        bearer_token: &str,
    ) -> Result<T, SourceError> {
        let url = self.url(path);
        self.execute(&url, || {
            self.http
                .get(&url)
                .query(query)
                .bearer_auth(bearer_token)
        })
        .await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, SourceError> {
        let url = self.url(path);
        self.execute(&url, || {
            self.http
                .post(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(form)
        })
        .await
    }

    async fn execute<T, F>(&self, url: &str, build: F) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        RetryIf::spawn(
            self.get_retry_strategy(),
            || Self::attempt(build(), url),
            |e: &SourceError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{}, retrying", e);
                }
                retry
            },
        )
        .await
    }

    async fn attempt<T: DeserializeOwned>(
        request: RequestBuilder,
        url: &str,
    ) -> Result<T, SourceError> {
        debug!("Requesting {}", url);

        let response = match timeout(REQUEST_TIMEOUT, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(request_error(url, source)),
            Err(_) => {
                return Err(SourceError::Timeout {
                    url: url.to_string(),
                    secs: REQUEST_TIMEOUT.as_secs(),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = match timeout(REQUEST_TIMEOUT, response.bytes()).await {
            Ok(Ok(body)) => body,
            Ok(Err(source)) => return Err(request_error(url, source)),
            Err(_) => {
                return Err(SourceError::Timeout {
                    url: url.to_string(),
                    secs: REQUEST_TIMEOUT.as_secs(),
                });
            }
        };

        serde_json::from_slice(&body)
            .map_err(|e| SourceError::Parse(format!("unexpected response from {url}: {e}")))
    }
}

/// The full request URL carries query parameters such as API keys; only the
/// path-level `url` is kept.
fn request_error(url: &str, source: reqwest::Error) -> SourceError {
    SourceError::Request {
        url: url.to_string(),
        source: source.without_url(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_joined_without_double_slash() {
        let client = ApiClient::new("https://api.tzkt.io/").unwrap();
        assert_eq!(
            client.url("/v1/blocks/count"),
            "https://api.tzkt.io/v1/blocks/count"
        );
    }

    #[test]
    fn test_retry_strategy_is_bounded() {
        let client = ApiClient::new("https://blockchain.info").unwrap();
        let delays: Vec<Duration> = client.get_retry_strategy().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_request_error_does_not_expose_query() {
        // nothing listens on port 1
        let client = ApiClient::new("http://127.0.0.1:1").unwrap();
        let url = client.url("/api");
        let request = client
            .http
            .get(&url)
            .query(&[("module", "account"), ("apikey", "SECRET_KEY_123")]);

        let err = ApiClient::attempt::<serde_json::Value>(request, &url)
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Request { .. }));
        let message = err.to_string();
        assert!(message.contains("http://127.0.0.1:1/api"));
        assert!(!message.contains("SECRET_KEY_123"), "{message}");
    }
}

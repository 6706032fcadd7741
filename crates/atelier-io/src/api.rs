//! HTTP client for the storefront API.

use atelier_pipeline::data_url;

use crate::config::Config;
use crate::source::{FetchError, ImageFetcher};
use crate::staging::{StagingBackend, StagingError, StagingRequest, interpret_response};

/// Talks to the staging endpoint and fetches remote images.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    stage_endpoint: String,
}

impl ApiClient {
    /// Build a client from `config` (timeout, resolved API base).
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            stage_endpoint: config.stage_endpoint(),
        })
    }

    /// Where staging requests go.
    #[must_use]
    pub fn stage_endpoint(&self) -> &str {
        &self.stage_endpoint
    }
}

impl StagingBackend for ApiClient {
    async fn stage(&self, request: StagingRequest) -> Result<String, StagingError> {
        tracing::debug!(
            endpoint = %self.stage_endpoint,
            scene = %request.scene,
            image_bytes = request.image_data.len(),
            "sending staging request"
        );
        let response = self
            .http
            .post(&self.stage_endpoint)
            .json(&request)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        let result = interpret_response(status, &body);
        match &result {
            Ok(url) => tracing::info!(status, data_url_len = url.len(), "staging endpoint answered"),
            Err(err) => tracing::warn!(status, %err, "staging endpoint refused"),
        }
        result
    }
}

impl ImageFetcher for ApiClient {
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url.starts_with("data:") {
            return Ok(data_url::decode(url)?.bytes);
        }
        tracing::debug!(%url, "fetching image");
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_owned(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_comes_from_config() {
        let config = Config {
            api_base: "https://shop.example/api".into(),
            ..Config::default()
        };
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(client.stage_endpoint(), "https://shop.example/api/ai/stage");
    }

    #[tokio::test]
    async fn data_urls_are_decoded_locally() {
        let client = ApiClient::new(&Config::default()).unwrap();
        let url = data_url::encode("image/png", b"abc");
        assert_eq!(client.fetch_image(&url).await.unwrap(), b"abc");
    }
}

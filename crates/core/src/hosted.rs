//! Shared plumbing for the hosted inference API (Together-compatible).
//!
//! The embedding and completion clients both post JSON to
//! `{base_url}/<endpoint>` with bearer authentication.

use reqwest::{Client, Response};
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

#[derive(Clone)]
pub struct HostedApi {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl HostedApi {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&format!("{}/", base_url.trim().trim_end_matches('/')))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    pub(crate) async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> reqwest::Result<Response> {
        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }
}

impl fmt::Debug for HostedApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Status line plus body, for error reporting on non-2xx responses.
pub(crate) async fn failure_details(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_the_version_segment() -> Result<(), Box<dyn std::error::Error>> {
        let api = HostedApi::new(Client::new(), "https://api.together.xyz/v1", "secret")?;
        assert_eq!(
            api.endpoint("completions")?.as_str(),
            "https://api.together.xyz/v1/completions"
        );

        let trailing = HostedApi::new(Client::new(), "http://127.0.0.1:9000/v1/", "secret")?;
        assert_eq!(
            trailing.endpoint("/embeddings")?.as_str(),
            "http://127.0.0.1:9000/v1/embeddings"
        );
        Ok(())
    }

    #[test]
    fn debug_output_hides_the_key() -> Result<(), Box<dyn std::error::Error>> {
        let api = HostedApi::new(Client::new(), DEFAULT_BASE_URL, "super-secret")?;
        let rendered = format!("{api:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("redacted"));
        Ok(())
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HostedApi::new(Client::new(), "not a url", "key").is_err());
    }
}

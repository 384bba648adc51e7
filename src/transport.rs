//! HTTP access for manifests and segments.
//!
//! [`HttpTransport`] is the seam between the download core and the network:
//! the resolver only needs `get_text`, the segment fetcher only `download_to`.
//! [`ReqwestTransport`] is the production implementation.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Abstraction over HTTP fetching, enabling testability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url` and return the body as text.
    ///
    /// Non-2xx responses fail with [`Error::HttpStatus`].
    async fn get_text(&self, url: &str) -> Result<String>;

    /// GET `url` and stream the body into `dest`, returning the bytes written.
    ///
    /// The whole request, including the body transfer, must finish within
    /// `timeout` or the call fails with [`Error::Timeout`]. `dest` is created
    /// or truncated.
    async fn download_to(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64>;
}

/// Production [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    manifest_timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport sending `user_agent` and bounding manifest requests by
    /// `manifest_timeout`.
    pub fn new(user_agent: &str, manifest_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            manifest_timeout,
        })
    }

    /// Build a transport from the download settings
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.timeout)
    }

    async fn stream_body(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.manifest_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    async fn download_to(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
        match tokio::time::timeout(timeout, self.stream_body(url, dest)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .mount(&server)
            .await;

        let body = transport()
            .get_text(&format!("{}/index.m3u8", server.uri()))
            .await
            .unwrap();

        assert_eq!(body, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn get_text_rejects_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = transport()
            .get_text(&format!("{}/missing.m3u8", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HttpStatus { status: 404, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn download_to_streams_body_and_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/seg0.ts"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("segment_000000.ts");

        let written = transport()
            .download_to(
                &format!("{}/seg0.ts", server.uri()),
                &dest,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn download_to_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = transport()
            .download_to(
                &format!("{}/slow.ts", server.uri()),
                &dir.path().join("slow.ts"),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { timeout_ms: 50, .. }), "got {err:?}");
    }
}

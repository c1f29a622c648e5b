//! Resource retrieval for remote backgrounds.
//!
//! The fetcher only depends on [`ResourceLoader`]; hosts can plug in their own
//! implementation with `Session::open_with_loader`. [`UrlLoader`] is the
//! default: `file://` URLs are read from disk and, with the `http` feature,
//! `http`/`https` URLs are fetched with a single GET.

#[cfg(feature = "http")]
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use url::Url;

use crate::error::FetchError;
use crate::{Result, SessionConfig};

/// "Fetch bytes at URL" capability supplied by the host
pub trait ResourceLoader: Send + Sync + 'static {
    /// Retrieve the bytes behind `url`. One attempt, no retries.
    fn load(&self, url: &Url) -> BoxFuture<'static, std::result::Result<Vec<u8>, FetchError>>;
}

/// Default loader for `file`, `http` and `https` URLs
#[derive(Clone)]
pub struct UrlLoader {
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl UrlLoader {
    #[cfg(feature = "http")]
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                crate::Error::Initialization(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    #[cfg(not(feature = "http"))]
    pub fn new(_config: &SessionConfig) -> Result<Self> {
        Ok(Self {})
    }
}

impl ResourceLoader for UrlLoader {
    fn load(&self, url: &Url) -> BoxFuture<'static, std::result::Result<Vec<u8>, FetchError>> {
        let url = url.clone();
        let scheme = url.scheme().to_string();
        match scheme.as_str() {
            "file" => {
                let fut = async move {
                    let path = url
                        .to_file_path()
                        .map_err(|_| FetchError::Io(format!("Not a local file path: {}", url)))?;
                    tokio::fs::read(&path)
                        .await
                        .map_err(|e| FetchError::Io(format!("{}: {}", path.display(), e)))
                };
                fut.boxed()
            }

            #[cfg(feature = "http")]
            "http" | "https" => {
                let client = self.client.clone();
                let fut = async move {
                    let res = client
                        .get(url)
                        .send()
                        .await
                        .map_err(|e| FetchError::Network(format!("HTTP GET failed: {}", e)))?;
                    let status = res.status();
                    if !status.is_success() {
                        return Err(FetchError::Status(status.as_u16()));
                    }
                    let body = res.bytes().await.map_err(|e| {
                        FetchError::Network(format!("Failed to read response body: {}", e))
                    })?;
                    Ok(body.to_vec())
                };
                fut.boxed()
            }

            other => futures::future::ready(Err(FetchError::UnsupportedScheme(other.to_string()))).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.bin");
        std::fs::write(&path, b"bytes on disk").unwrap();

        let loader = UrlLoader::new(&SessionConfig::default()).unwrap();
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(loader.load(&url).await.unwrap(), b"bytes on disk".to_vec());
    }

    #[tokio::test]
    async fn missing_files_and_unknown_schemes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let loader = UrlLoader::new(&SessionConfig::default()).unwrap();

        let missing = Url::from_file_path(dir.path().join("nope.png")).unwrap();
        assert!(matches!(loader.load(&missing).await, Err(FetchError::Io(_))));

        let ftp = Url::parse("ftp://example.com/bg.png").unwrap();
        assert_eq!(
            loader.load(&ftp).await,
            Err(FetchError::UnsupportedScheme("ftp".to_string()))
        );
    }
}

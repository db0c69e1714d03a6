//! Retrieval of assets on a cache miss

use crate::error::{CacheError, Result};
use crate::types::{FetchOptions, FetchedAsset};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};

/// Source of assets that are not in the cache
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedAsset>;
}

/// Fetches assets over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedAsset> {
        debug!(url = %url, "Fetching asset");

        let mut request = self.client.get(url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Failed to fetch asset");
            return Err(CacheError::Retrieval(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        // Missing or non-ASCII content types are stored as empty
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let payload = response.bytes().await?.to_vec();

        debug!(
            size = payload.len(),
            content_type = %content_type,
            "Fetched asset"
        );

        Ok(FetchedAsset {
            content_type,
            content_length: payload.len() as u64,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one canned HTTP response, returning the base URL
    async fn serve_once(response: &'static str) -> String {
        serve_once_recording(response).await.0
    }

    /// Like [`serve_once`], also handing back the raw request head
    async fn serve_once_recording(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        (format!("http://{}", addr), rx)
    }

    fn local_fetcher() -> HttpFetcher {
        HttpFetcher::with_client(Client::builder().no_proxy().build().unwrap())
    }

    #[tokio::test]
    async fn test_fetch_reads_content_type_and_body() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nabcd",
        )
        .await;

        let asset = local_fetcher()
            .fetch(&format!("{}/a.png", base), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(asset.content_type, "image/png");
        assert_eq!(asset.content_length, 4);
        assert_eq!(asset.payload, b"abcd");
    }

    #[tokio::test]
    async fn test_fetch_lowercases_content_type() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: Image/PNG\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi",
        )
        .await;

        let asset = local_fetcher()
            .fetch(&base, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(asset.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_fetch_missing_content_type_is_empty() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi",
        )
        .await;

        let asset = local_fetcher()
            .fetch(&base, &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(asset.content_type, "");
    }

    #[tokio::test]
    async fn test_fetch_forwards_headers() {
        let (base, request) = serve_once_recording(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        )
        .await;
        let options = FetchOptions {
            headers: vec![("X-Asset-Token".to_string(), "abc123".to_string())],
            timeout: Some(Duration::from_secs(5)),
        };

        let asset = local_fetcher().fetch(&base, &options).await.unwrap();
        assert_eq!(asset.payload, b"ok");

        let request = request.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("x-asset-token: abc123\r\n"));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_retrieval_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let options = FetchOptions {
            headers: Vec::new(),
            timeout: Some(Duration::from_millis(100)),
        };

        let err = local_fetcher()
            .fetch(&format!("http://{}", addr), &options)
            .await
            .unwrap_err();

        assert!(err.is_retrieval());
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let base = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let err = local_fetcher()
            .fetch(&base, &FetchOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_retrieval());
        assert!(err.to_string().contains("404"));
    }
}

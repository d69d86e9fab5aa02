use crate::config::ScraperConfig;
use crate::error::ExtractError;
use anyhow::{Context, Result};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, UPGRADE_INSECURE_REQUESTS,
};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Request headers a desktop browser would send for a page load.
/// Accept-Encoding is left to reqwest so it can decompress.
fn browser_headers(accept_language: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    );
    h.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    if let Ok(lang) = HeaderValue::from_str(accept_language) {
        h.insert(ACCEPT_LANGUAGE, lang);
    }
    h
}

pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: u32,
    retry_base_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(browser_headers(&config.accept_language))
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        })
    }

    /// Fetch a URL as text, retrying transport errors, 429 and 5xx with backoff.
    pub async fn get_text(&self, url: &str) -> Result<String, ExtractError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.retry_base_ms / 2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries as usize);

        RetryIf::start(
            strategy,
            || self.get_once(url),
            |e: &ExtractError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{}; retrying", e);
                }
                retry
            },
        )
        .await
    }

    async fn get_once(&self, url: &str) -> Result<String, ExtractError> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractError::unreachable(url, e, true))?;

        let status = resp.status();
        if !status.is_success() {
            let transient = status.as_u16() == 429 || status.is_server_error();
            return Err(ExtractError::unreachable(url, format!("HTTP {}", status), transient));
        }

        resp.text()
            .await
            .map_err(|e| ExtractError::unreachable(url, format!("body read failed: {}", e), true))
    }
}

/// Local HTTP/1.1 server answering every request with one canned status.
#[cfg(test)]
pub(crate) mod test_server {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub(crate) async fn serve(status: u16, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        (format!("http://{}/quote", addr), hits)
    }

    /// An address nothing listens on.
    pub(crate) async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/quote", addr)
    }
}

//! The HTTP seam: one trait for issuing a GET, implemented over reqwest
//! with transport-aware proxies. The failover engine depends only on the
//! trait, so tests inject fakes and never open sockets.

use crate::config::HttpConfig;
use crate::error::RequestError;
use crate::provider::Provider;
use async_trait::async_trait;
use burrow_transport::TransportType;
use std::time::Duration;

/// A raw HTTP response: status plus decoded body. Non-2xx statuses are data
/// here, not errors; classification happens in the failover engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body decoded as text.
    pub body: String,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one GET against one provider.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `path` under the provider's base URL. Returns `Ok` for any HTTP
    /// response regardless of status, `Err` only when no response was
    /// obtained at all.
    async fn fetch(&self, provider: &Provider, path: &str) -> Result<FetchResponse, RequestError>;
}

/// Join a base URL and a path with exactly one slash between them.
fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// [`HttpFetch`] over reqwest. A client is built per call so each request
/// carries the proxy its provider's transport requires and its connections
/// are released as soon as the call finishes.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    socks5_proxy: String,
    i2p_proxy: String,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// Capture proxy endpoints and the per-attempt timeout.
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            socks5_proxy: config.socks5_proxy.clone(),
            i2p_proxy: config.i2p_proxy.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    fn client_for(&self, transport: TransportType) -> Result<reqwest::Client, RequestError> {
        let builder = reqwest::Client::builder().timeout(self.timeout);
        let builder = match transport {
            TransportType::Clear => builder,
            TransportType::Tor => builder.proxy(
                reqwest::Proxy::all(&self.socks5_proxy)
                    .map_err(|err| RequestError::Fetch(format!("socks proxy: {err}")))?,
            ),
            TransportType::I2p => builder.proxy(
                reqwest::Proxy::all(&self.i2p_proxy)
                    .map_err(|err| RequestError::Fetch(format!("i2p proxy: {err}")))?,
            ),
        };
        builder
            .build()
            .map_err(|err| RequestError::Fetch(format!("client: {err}")))
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, provider: &Provider, path: &str) -> Result<FetchResponse, RequestError> {
        let url = join_url(provider.base_url(), path);
        let client = self.client_for(provider.transport_type())?;
        let response = client.get(&url).send().await.map_err(|err| {
            if err.is_timeout() {
                RequestError::Timeout(url.clone())
            } else {
                RequestError::Fetch(format!("{url}: {err}"))
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RequestError::Fetch(format!("{url}: reading body: {err}")))?;
        Ok(FetchResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        assert_eq!(join_url("https://x.example", "api/time"), "https://x.example/api/time");
        assert_eq!(join_url("https://x.example/", "/api/time"), "https://x.example/api/time");
        assert_eq!(join_url("https://x.example/base", ""), "https://x.example/base/");
    }

    #[test]
    fn test_success_range() {
        assert!(FetchResponse { status: 200, body: String::new() }.is_success());
        assert!(FetchResponse { status: 204, body: String::new() }.is_success());
        assert!(!FetchResponse { status: 301, body: String::new() }.is_success());
        assert!(!FetchResponse { status: 503, body: String::new() }.is_success());
    }

    #[test]
    fn test_clients_build_for_every_transport() {
        let fetcher = ReqwestFetcher::new(&HttpConfig::default());
        assert!(fetcher.client_for(TransportType::Clear).is_ok());
        assert!(fetcher.client_for(TransportType::Tor).is_ok());
        assert!(fetcher.client_for(TransportType::I2p).is_ok());
    }

    #[test]
    fn test_bad_proxy_endpoint_is_reported() {
        let fetcher = ReqwestFetcher::new(&HttpConfig {
            socks5_proxy: "\u{0}".to_string(),
            ..HttpConfig::default()
        });
        assert!(matches!(
            fetcher.client_for(TransportType::Tor),
            Err(RequestError::Fetch(_))
        ));
    }
}

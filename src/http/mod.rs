//! HTTP engine: one shared, pooled, DNS-cached client with transparent
//! gzip/deflate decoding, plus the chunked ranged file downloader.

mod dns;
mod download;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::common::{Error, Result};
pub use dns::DnsCache;
use dns::CachingResolver;

/// Idle keep-alive connections retained per host.
const POOL_MAX_IDLE_PER_HOST: usize = 4;
/// Idle connections older than this are discarded at acquisition.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request deadline covering connect, write and read.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub body: String,
    pub headers: HeaderMap,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP session factory. Cloning is cheap and clones share the
/// connection pool and DNS cache.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    dns: Arc<DnsCache>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let dns = DnsCache::new();
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .gzip(true)
            .deflate(true)
            .cookie_store(true)
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .dns_resolver(Arc::new(CachingResolver(dns.clone())))
            .build()
            .map_err(|e| Error::RequestFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, dns })
    }

    /// The underlying engine, for subsystems that stream bodies themselves.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn dns(&self) -> &Arc<DnsCache> {
        &self.dns
    }

    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        let request = self.client.get(parse_url(url)?).headers(header_map(headers));
        self.run(url, request).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let request = self
            .client
            .post(parse_url(url)?)
            .headers(header_map(headers))
            .json(body);
        self.run(url, request).await
    }

    async fn run(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                // A dead endpoint may mean a stale resolution; force the next
                // attempt through a fresh resolve.
                if let Some(host) = host_of(url) {
                    self.dns.invalidate(&host);
                }
                return Err(Error::RequestFailed(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| Error::RequestFailed(e.to_string()))?;

        Ok(Response {
            status,
            body,
            headers,
        })
    }
}

fn parse_url(url: &str) -> Result<url::Url> {
    url::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn header_map(headers: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!("skipping malformed header {name}"),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_urls() {
        assert!(matches!(parse_url("not a url"), Err(Error::InvalidUrl(_))));
        assert!(parse_url("https://www.youtube.com/watch?v=abc").is_ok());
    }

    #[test]
    fn header_map_skips_malformed() {
        let map = header_map(&[("X-Ok", "yes"), ("Bad Header\n", "x")]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("X-Ok").unwrap(), "yes");
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("https://rr3---sn-4g5e6nz7.googlevideo.com/videoplayback?x=1").as_deref(),
            Some("rr3---sn-4g5e6nz7.googlevideo.com")
        );
        assert_eq!(host_of("::"), None);
    }
}

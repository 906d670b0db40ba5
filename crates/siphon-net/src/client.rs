use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client, Method, Response};
use tracing::debug;
use url::Url;

use crate::{NetError, NetOptions, NetResult};

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers (plus `host`) before relaying in either
/// direction.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let lower = name.as_str().to_ascii_lowercase();
        if lower == "host" || HOP_BY_HOP.contains(&lower.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// HTTP client for the upstream hub.
///
/// Holds two reqwest clients: `forward` never follows redirects so a
/// `Location` header reaches the original caller intact, while `download`
/// follows them, for out-of-band blob fetches.
#[derive(Clone, Debug)]
pub struct HubClient {
    base_url: Url,
    forward: Client,
    download: Client,
}

impl HubClient {
    /// # Errors
    ///
    /// Returns [`NetError::Http`] if a reqwest client cannot be built.
    pub fn new(base_url: Url, options: &NetOptions) -> NetResult<Self> {
        let forward = Client::builder()
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(options.connect_timeout)
            .tcp_keepalive(options.tcp_keepalive)
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(|e| NetError::http(format!("failed to build forward client: {e}")))?;

        let download = Client::builder()
            .use_rustls_tls()
            .connect_timeout(options.connect_timeout)
            .tcp_keepalive(options.tcp_keepalive)
            .pool_idle_timeout(options.pool_idle_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(|e| NetError::http(format!("failed to build download client: {e}")))?;

        Ok(Self {
            base_url,
            forward,
            download,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Relay a request to the upstream hub unchanged.
    ///
    /// `path_and_query` is the inbound request's path plus query string.
    /// Redirect responses are returned as-is; no overall timeout is applied
    /// so large streamed bodies are not cut off mid-transfer.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
    ) -> NetResult<Response> {
        let url = self
            .base_url
            .join(path_and_query)
            .map_err(|e| NetError::InvalidUrl(format!("{path_and_query}: {e}")))?;
        debug!(%method, %url, "forwarding to upstream");

        let resp = self
            .forward
            .request(method, url)
            .headers(strip_hop_by_hop(headers))
            .send()
            .await?;
        Ok(resp)
    }

    /// Fetch `url` following redirects, for background blob captures.
    ///
    /// Fails on non-2xx so a capture never persists an error body.
    pub async fn download(&self, url: Url) -> NetResult<Response> {
        debug!(%url, "downloading");
        let resp = self.download.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NetError::http_status(status.as_u16(), url.to_string()));
        }
        Ok(resp)
    }
}

/// Boxed stream of upstream body chunks.
pub type ByteStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Adapt a reqwest response body into a [`ByteStream`].
pub fn byte_stream(resp: Response) -> ByteStream {
    Box::pin(resp.bytes_stream().map_err(NetError::from))
}

/// Parse a header value as a string, ignoring non-UTF-8 values.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    headers.get(&name)?.to_str().ok()
}

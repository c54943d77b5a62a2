use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;

/// Response bodies are captured up to this many bytes; anything beyond is
/// dropped so a hostile origin cannot balloon memory.
pub const MAX_CAPTURE_SIZE: usize = 256 * 1024;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0";

#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: reqwest::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("connection failed: {url}: {message}")]
    Connect { url: String, message: String },

    #[error("invalid request: {url}: {message}")]
    BadRequest { url: String, message: String },

    #[error("request abandoned after cancellation grace period: {url}")]
    Abandoned { url: String },

    #[error("transport failure: {url}: {message}")]
    Other { url: String, message: String },
}

impl TransportError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if err.is_builder() || err.is_request() {
            TransportError::BadRequest {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            TransportError::Other {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Everything the classifier needs from one exchange. Headers are stored
/// lowercased; the body is raw bytes capped at [`MAX_CAPTURE_SIZE`].
#[derive(Clone, Debug)]
pub struct ResponseSummary {
    pub status: u16,
    pub body: Vec<u8>,
    pub body_size: usize,
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub redirect_chain: Vec<String>,
    pub elapsed_ms: u64,
    pub retry_count: u32,
}

impl ResponseSummary {
    /// Synthetic summary for a request that failed all retries. Status 0
    /// never leaves the classifier: it is dropped as a transport failure.
    pub fn failed(url: &str, retry_count: u32) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            body_size: 0,
            headers: HashMap::new(),
            final_url: url.to_string(),
            redirect_chain: Vec::new(),
            elapsed_ms: 0,
            retry_count,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Redirect target: the Location header when redirects are not
    /// followed, otherwise the final hop of the chain.
    pub fn redirect_target(&self) -> Option<&str> {
        self.header("location")
            .or_else(|| self.redirect_chain.last().map(|s| s.as_str()))
    }
}

/// Abstract boundary to pluggable HTTP clients. Implementations must be
/// safe for concurrent calls; the scanner shares one executor across all
/// workers.
pub trait RequestExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>>;
}

#[derive(Clone, Debug)]
pub struct HttpExecutorConfig {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub timeout: Duration,
    /// Client certificate and key, both PEM.
    pub client_cert: Option<std::path::PathBuf>,
    pub client_key: Option<std::path::PathBuf>,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            proxy: None,
            follow_redirects: false,
            timeout: Duration::from_secs(10),
            client_cert: None,
            client_key: None,
        }
    }
}

/// Plain HTTP client over a shared reqwest connection pool.
pub struct HttpExecutor {
    client: reqwest::Client,
    follow_redirects: bool,
}

impl HttpExecutor {
    pub fn new(config: &HttpExecutorConfig) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let agent = config
            .user_agent
            .as_deref()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(DEFAULT_USER_AGENT);
        let agent_value = reqwest::header::HeaderValue::from_str(agent).map_err(|e| {
            TransportError::BadRequest {
                url: String::new(),
                message: format!("invalid user agent: {e}"),
            }
        })?;
        headers.insert(reqwest::header::USER_AGENT, agent_value);

        let redirect_policy = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(redirect_policy)
            .timeout(config.timeout)
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| TransportError::BadRequest {
                url: String::new(),
                message: format!("invalid proxy: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }

        if let (Some(cert_path), Some(key_path)) =
            (config.client_cert.as_deref(), config.client_key.as_deref())
        {
            let cert = std::fs::read(cert_path).map_err(|e| TransportError::BadRequest {
                url: String::new(),
                message: format!("cannot read client cert '{}': {e}", cert_path.display()),
            })?;
            let key = std::fs::read(key_path).map_err(|e| TransportError::BadRequest {
                url: String::new(),
                message: format!("cannot read client key '{}': {e}", key_path.display()),
            })?;
            let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key).map_err(|e| {
                TransportError::BadRequest {
                    url: String::new(),
                    message: format!("invalid client identity: {e}"),
                }
            })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|e| TransportError::Other {
            url: String::new(),
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            follow_redirects: config.follow_redirects,
        })
    }

    async fn run(&self, spec: &RequestSpec) -> Result<ResponseSummary, TransportError> {
        let mut builder = self
            .client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout);
        for (name, value) in spec.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = spec.body.as_ref() {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let mut resp = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&spec.url, e))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let mut headers = HashMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(v) = v.to_str() {
                headers.insert(k.as_str().to_lowercase(), v.to_string());
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| TransportError::from_reqwest(&spec.url, e))?
        {
            let remaining = MAX_CAPTURE_SIZE.saturating_sub(body.len());
            if remaining == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;

        // Prefer the advertised length so truncated captures still filter
        // on the origin's real size.
        let body_size = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(body.len());

        let redirect_chain = if self.follow_redirects && final_url != spec.url {
            vec![final_url.clone()]
        } else {
            Vec::new()
        };

        Ok(ResponseSummary {
            status,
            body,
            body_size,
            headers,
            final_url,
            redirect_chain,
            elapsed_ms,
            retry_count: 0,
        })
    }
}

impl RequestExecutor for HttpExecutor {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
        Box::pin(self.run(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_summary_is_status_zero() {
        let summary = ResponseSummary::failed("http://example.com/x", 3);
        assert_eq!(summary.status, 0);
        assert_eq!(summary.retry_count, 3);
        assert!(summary.body.is_empty());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut summary = ResponseSummary::failed("http://example.com/", 0);
        summary
            .headers
            .insert("server".to_string(), "nginx".to_string());
        assert_eq!(summary.header("Server"), Some("nginx"));
        assert_eq!(summary.header("SERVER"), Some("nginx"));
        assert_eq!(summary.header("x-missing"), None);
    }

    #[test]
    fn redirect_target_prefers_location_header() {
        let mut summary = ResponseSummary::failed("http://example.com/", 0);
        summary
            .headers
            .insert("location".to_string(), "/login".to_string());
        summary.redirect_chain = vec!["http://example.com/other".to_string()];
        assert_eq!(summary.redirect_target(), Some("/login"));
    }
}

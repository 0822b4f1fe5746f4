use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, HOST};
use reqwest::{redirect, Client, Method};
use tracing::{debug, warn};

use super::probe::{Probe, ProbeResponse};
use super::{raw, Transport};
use crate::errors::CachesnakeError;
use crate::models::authority_of;
use crate::pipeline::Statistics;

/// Production transport. Normalized probes go through reqwest, the rest through the raw writer.
pub struct HttpTransport {
    client: Client,
    tls: tokio_native_tls::TlsConnector,
    timeout: Duration,
    user_agent: String,
    stats: Option<Arc<Statistics>>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, CachesnakeError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .http1_only()
            .http1_title_case_headers()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CachesnakeError::Config(format!("Failed to build HTTP client: {e}")))?;

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| CachesnakeError::Config(format!("Failed to build TLS connector: {e}")))?;

        Ok(Self {
            client,
            tls: tokio_native_tls::TlsConnector::from(tls),
            timeout,
            user_agent: user_agent.to_string(),
            stats: None,
        })
    }

    /// Count failed probes into `stats`.
    pub fn with_statistics(mut self, stats: Arc<Statistics>) -> Self {
        self.stats = Some(stats);
        self
    }

    async fn send_normalized(&self, probe: &Probe) -> Result<ProbeResponse, CachesnakeError> {
        let method = Method::from_bytes(probe.method.as_bytes())
            .map_err(|_| CachesnakeError::Protocol(format!("invalid method {:?}", probe.method)))?;

        let mut headers = HeaderMap::with_capacity(probe.headers.len() + 2);
        for (name, value) in &probe.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CachesnakeError::Protocol(format!("invalid header name {name:?}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| CachesnakeError::Protocol(format!("invalid header value {value:?}")))?;
            headers.append(name, value);
        }
        if let Some(cookie) = probe.cookie_header() {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| CachesnakeError::Protocol("invalid cookie value".into()))?;
            headers.append(COOKIE, value);
        }
        if !probe.special_headers && !headers.contains_key(HOST) {
            if let Some(Ok(value)) = authority_of(&probe.url).map(|host| HeaderValue::from_str(&host)) {
                headers.insert(HOST, value);
            }
        }

        let resp = self
            .client
            .request(method, &probe.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| classify_reqwest(&probe.url, e))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| classify_reqwest(&probe.url, e))?
            .to_vec();

        Ok(ProbeResponse { status, headers, body })
    }
}

fn classify_reqwest(url: &str, e: reqwest::Error) -> CachesnakeError {
    if e.is_timeout() {
        CachesnakeError::Timeout(format!("{url}: {e}"))
    } else {
        CachesnakeError::Network(format!("{url}: {e}"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, probe: &Probe) -> Result<ProbeResponse, CachesnakeError> {
        let result = if probe.normalize_headers {
            self.send_normalized(probe).await
        } else {
            raw::send(&self.tls, probe, &self.user_agent, self.timeout).await
        };

        if let Err(e) = &result {
            let class = e.classify();
            if let Some(stats) = &self.stats {
                if class.transient {
                    stats.record_transport_error();
                } else {
                    stats.record_probe_rejected();
                }
            }
            if class.transient {
                debug!(url = %probe.url, error_type = class.error_type, error = %e, "Probe failed");
            } else {
                warn!(url = %probe.url, error_type = class.error_type, error = %e, "Probe rejected");
            }
        }
        result
    }
}

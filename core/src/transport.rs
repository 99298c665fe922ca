//! Network execution of `HttpRequest` values.
//!
//! # Design
//! `Transport` is the single seam between request building and the network.
//! The production implementation wraps a `ureq::Agent`; tests substitute a
//! scripted in-memory transport. HTTP error statuses are returned as data so
//! that status interpretation stays in `EntityClient`.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Sends one request and returns the raw response.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Connection settings for `UreqTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Trust every certificate and skip hostname verification. Only for
    /// environments running with self-signed certificates.
    pub accept_invalid_certs: bool,
    /// Upper bound for a whole request, connect to last body byte.
    #[serde(with = "optional_secs")]
    pub timeout: Option<Duration>,
    /// Largest response body accepted, in bytes. Unlimited when unset.
    pub max_body_bytes: Option<u64>,
}

impl TransportConfig {
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }
}

/// Blocking transport backed by ureq.
///
/// The agent is built on first use and then reused, so connections are
/// pooled across calls made through the same transport.
#[derive(Default)]
pub struct UreqTransport {
    config: TransportConfig,
    agent: OnceLock<ureq::Agent>,
}

impl UreqTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            agent: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn agent(&self) -> &ureq::Agent {
        self.agent.get_or_init(|| build_agent(&self.config))
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("config", &self.config)
            .field("connected", &self.agent.get().is_some())
            .finish()
    }
}

fn build_agent(config: &TransportConfig) -> ureq::Agent {
    let mut builder = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(config.timeout);

    if config.accept_invalid_certs {
        warn!("certificate verification disabled, all server certificates will be trusted");
        builder = builder.tls_config(
            ureq::tls::TlsConfig::builder()
                .disable_verification(true)
                .build(),
        );
    }

    builder.build().new_agent()
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(
            method = %request.method,
            url = %request.url,
            headers = ?request.redacted_headers(),
            "sending request"
        );

        let agent = self.agent();
        let wrap = |source: ureq::Error| TransportError {
            url: request.url.clone(),
            source,
        };

        let result = match request.method {
            HttpMethod::Get | HttpMethod::Delete => {
                let mut builder = if request.method == HttpMethod::Get {
                    agent.get(request.url.as_str())
                } else {
                    agent.delete(request.url.as_str())
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = agent.post(request.url.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match &request.body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(wrap)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .body_mut()
            .with_config()
            .limit(self.config.max_body_bytes.unwrap_or(u64::MAX))
            .read_to_vec()
            .map_err(wrap)?;

        debug!(status, url = %request.url, bytes = body.len(), "received response");

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: TransportConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TransportConfig::default());
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn config_reads_timeout_in_seconds() {
        let config: TransportConfig =
            serde_json::from_str(r#"{"accept_invalid_certs":true,"timeout":2.5}"#).unwrap();
        assert!(config.accept_invalid_certs);
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.max_body_bytes, None);
    }

    #[test]
    fn config_reads_body_limit() {
        let config: TransportConfig = serde_json::from_str(r#"{"max_body_bytes":1024}"#).unwrap();
        assert_eq!(config, TransportConfig::default().max_body_bytes(1024));
    }

    #[test]
    fn certificates_are_verified_by_default() {
        let transport = UreqTransport::new(TransportConfig::default());
        assert!(!transport.agent().config().tls_config().disable_verification());
    }

    #[test]
    fn accepting_invalid_certificates_disables_verification() {
        let transport = UreqTransport::new(TransportConfig::default().accept_invalid_certs(true));
        assert!(transport.agent().config().tls_config().disable_verification());
    }

    #[test]
    fn agent_is_built_once() {
        let transport = UreqTransport::new(TransportConfig::default().timeout(Duration::from_secs(1)));
        let first = transport.agent() as *const ureq::Agent;
        let second = transport.agent() as *const ureq::Agent;
        assert_eq!(first, second);
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let transport = UreqTransport::new(TransportConfig::default().timeout(Duration::from_secs(2)));
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "http://127.0.0.1:1/unreachable".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = transport.send(&request).unwrap_err();
        assert_eq!(err.url, "http://127.0.0.1:1/unreachable");
    }
}

//! Service location, credentials and per-call options.
//!
//! # Design
//! Everything that shapes a request is an explicit value. `ServiceConfig`
//! and `Credentials` are fixed when an `EntityClient` is built;
//! `CallOptions` is passed to each operation, so two callers sharing one
//! client never observe each other's flags.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::transport::TransportConfig;

pub const DEFAULT_ENTITY_NAMESPACE: &str = "org.openbravo.service.json.jsonrest";
pub const DEFAULT_COUNT_NAMESPACE: &str = "ws/com.kinnarastudio.openbravo.kecakadapter.RecordCount";

/// Where the remote service lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_entity_namespace")]
    pub entity_namespace: String,
    #[serde(default = "default_count_namespace")]
    pub count_namespace: String,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_entity_namespace() -> String {
    DEFAULT_ENTITY_NAMESPACE.to_string()
}

fn default_count_namespace() -> String {
    DEFAULT_COUNT_NAMESPACE.to_string()
}

impl ServiceConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            entity_namespace: default_entity_namespace(),
            count_namespace: default_count_namespace(),
            transport: TransportConfig::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.entity_namespace = namespace.trim_matches('/').to_string();
        self
    }

    pub fn with_count_namespace(mut self, namespace: &str) -> Self {
        self.count_namespace = namespace.trim_matches('/').to_string();
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

/// Username and password sent as HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// `Basic base64(username:password)`.
    pub fn basic_auth_header(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Flags for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Log posted rows and response payloads at info level.
    pub debug: bool,
    /// Ask the service to include inactive records (`_noActiveFilter=true`).
    pub no_active_filter: bool,
    /// Stop a batch write at the first failing row.
    pub short_circuit: bool,
}

impl CallOptions {
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn no_active_filter(mut self, no_active_filter: bool) -> Self {
        self.no_active_filter = no_active_filter;
        self
    }

    pub fn short_circuit(mut self, short_circuit: bool) -> Self {
        self.short_circuit = short_circuit;
        self
    }
}

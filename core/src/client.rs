//! Request builder and response parser for the entity REST service.
//!
//! # Design
//! `EntityClient` holds the service location and the prepared
//! `Authorization` header and carries no mutable state between calls. Each
//! operation is split into a `build_*` method that produces an `HttpRequest`
//! and a `parse_*` method that consumes the matching `HttpResponse`.
//! `EntityService` performs the round-trip in between; the split keeps URL
//! construction and envelope interpretation testable without a network.

use serde_json::{json, Map, Value};

use crate::config::{CallOptions, Credentials, ServiceConfig};
use crate::envelope::read_envelope;
use crate::error::{Error, ProtocolError};
use crate::filter::Filter;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::QueryOptions;
use crate::types::{to_string_record, Record, StringRecord};

/// Synchronous, stateless client for one remote service.
#[derive(Clone)]
pub struct EntityClient {
    base_url: String,
    entity_namespace: String,
    count_namespace: String,
    auth_header: String,
}

impl std::fmt::Debug for EntityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityClient")
            .field("base_url", &self.base_url)
            .field("entity_namespace", &self.entity_namespace)
            .field("count_namespace", &self.count_namespace)
            .finish_non_exhaustive()
    }
}

/// Appends query parameters, `?` for the first and `&` after that.
struct UrlBuilder {
    url: String,
    has_query: bool,
}

impl UrlBuilder {
    fn new(url: String) -> Self {
        let has_query = url.contains('?');
        Self { url, has_query }
    }

    fn param(&mut self, name: &str, value: &str) -> &mut Self {
        self.url.push(if self.has_query { '&' } else { '?' });
        self.url.push_str(name);
        self.url.push('=');
        self.url.push_str(value);
        self.has_query = true;
        self
    }

    fn finish(self) -> String {
        self.url
    }
}

/// Form-style encoding: reserved characters percent-encoded, spaces as `+`.
pub fn form_encode(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

impl EntityClient {
    pub fn new(config: &ServiceConfig, credentials: &Credentials) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            entity_namespace: config.entity_namespace.trim_matches('/').to_string(),
            count_namespace: config.count_namespace.trim_matches('/').to_string(),
            auth_header: credentials.basic_auth_header(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/{entityNamespace}/{entity}`
    pub fn entity_url(&self, entity: &str) -> String {
        format!("{}/{}/{entity}", self.base_url, self.entity_namespace)
    }

    /// `{base}/{entityNamespace}/{entity}/{key}`
    pub fn record_url(&self, entity: &str, key: &str) -> String {
        format!("{}/{}", self.entity_url(entity), urlencoding::encode(key))
    }

    /// `{base}/{countNamespace}/{entity}`
    pub fn count_url(&self, entity: &str) -> String {
        format!("{}/{}/{entity}", self.base_url, self.count_namespace)
    }

    fn headers(&self, with_body: bool) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Authorization".to_string(), self.auth_header.clone()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if with_body {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: self.headers(false),
            body: None,
        }
    }

    pub fn build_get(&self, entity: &str, key: &str, call: &CallOptions) -> HttpRequest {
        let mut url = UrlBuilder::new(self.record_url(entity, key));
        if call.no_active_filter {
            url.param("_noActiveFilter", "true");
        }
        self.request(HttpMethod::Get, url.finish())
    }

    pub fn build_list(
        &self,
        entity: &str,
        filter: &Filter,
        options: &QueryOptions,
        call: &CallOptions,
    ) -> HttpRequest {
        let mut url = UrlBuilder::new(self.entity_url(entity));
        if !options.fields.is_empty() {
            url.param("_selectedProperties", &options.fields.join(","));
        }
        if call.no_active_filter {
            url.param("_noActiveFilter", "true");
        }
        if let Some(start) = options.start_row {
            url.param("_startRow", &start.to_string());
        }
        if let Some(end) = options.end_row {
            url.param("_endRow", &end.to_string());
        }
        if let Some(condition) = filter.to_where() {
            url.param("_where", &form_encode(&condition));
        }
        if let Some(sort) = options.sort.as_ref().filter(|s| !s.key.is_empty()) {
            url.param("_orderBy", &form_encode(&sort.to_order_by()));
        }
        self.request(HttpMethod::Get, url.finish())
    }

    pub fn build_count(&self, entity: &str, filter: &Filter, call: &CallOptions) -> HttpRequest {
        let mut url = UrlBuilder::new(self.count_url(entity));
        if call.no_active_filter {
            url.param("_noActiveFilter", "true");
        }
        if let Some(condition) = filter.to_where() {
            url.param("_where", &form_encode(&condition));
        }
        self.request(HttpMethod::Get, url.finish())
    }

    pub fn build_delete(&self, entity: &str, key: &str, call: &CallOptions) -> HttpRequest {
        let mut url = UrlBuilder::new(self.record_url(entity, key));
        if call.no_active_filter {
            url.param("_noActiveFilter", "true");
        }
        self.request(HttpMethod::Delete, url.finish())
    }

    /// One row of a batch write, sent as `{"data": row}`.
    pub fn build_post(&self, entity: &str, row: &Record) -> Result<HttpRequest, Error> {
        let body = serde_json::to_string(&json!({ "data": row }))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.entity_url(entity),
            headers: self.headers(true),
            body: Some(body),
        })
    }

    pub fn parse_get(&self, url: &str, response: &HttpResponse) -> Result<StringRecord, Error> {
        let envelope = read_envelope(response, url)?;
        envelope.ensure_ok()?;
        Ok(to_string_record(envelope.data_object(url)?))
    }

    pub fn parse_list(&self, url: &str, response: &HttpResponse) -> Result<Vec<Record>, Error> {
        let envelope = read_envelope(response, url)?;
        envelope.ensure_ok()?;
        envelope.data_rows(url)
    }

    /// The count endpoint may omit `status`; when present it must be 0.
    pub fn parse_count(&self, url: &str, response: &HttpResponse) -> Result<u64, Error> {
        let envelope = read_envelope(response, url)?;
        if envelope.status.is_some() {
            envelope.ensure_ok()?;
        }
        let count = envelope.count.ok_or_else(|| ProtocolError::MalformedBody {
            url: url.to_string(),
            reason: "count is missing".to_string(),
        })?;
        u64::try_from(count).map_err(|_| {
            Error::Protocol(ProtocolError::MalformedBody {
                url: url.to_string(),
                reason: format!("count [{count}] is negative"),
            })
        })
    }

    pub fn parse_delete(&self, url: &str, response: &HttpResponse) -> Result<StringRecord, Error> {
        self.parse_get(url, response)
    }

    /// The accepted row: first element of `data`. An empty `data` array
    /// yields an empty record.
    pub fn parse_post(&self, url: &str, response: &HttpResponse) -> Result<Record, Error> {
        let envelope = read_envelope(response, url)?;
        if let Some(err) = envelope.row_error() {
            return Err(err.into());
        }
        match &envelope.data {
            Some(Value::Object(map)) => Ok(map.clone()),
            _ => Ok(envelope
                .data_rows(url)?
                .into_iter()
                .next()
                .unwrap_or_else(Map::new)),
        }
    }
}

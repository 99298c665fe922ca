//! Operations that perform the round-trip: build, send, parse.
//!
//! `EntityService` owns an `EntityClient` and a `Transport` and holds no
//! per-call state, so one instance can serve concurrent callers when the
//! transport is `Sync`.

use tracing::{info, warn};

use crate::batch::BatchOutcome;
use crate::client::EntityClient;
use crate::config::{CallOptions, Credentials, ServiceConfig};
use crate::error::Error;
use crate::filter::Filter;
use crate::http::{HttpRequest, HttpResponse};
use crate::mapping::EntityShape;
use crate::query::QueryOptions;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Record, StringRecord};

#[derive(Debug)]
pub struct EntityService<T = UreqTransport> {
    client: EntityClient,
    transport: T,
}

impl EntityService<UreqTransport> {
    /// A service talking to `config.base_url` over ureq.
    pub fn connect(config: &ServiceConfig, credentials: &Credentials) -> Self {
        Self {
            client: EntityClient::new(config, credentials),
            transport: UreqTransport::new(config.transport.clone()),
        }
    }
}

impl<T: Transport> EntityService<T> {
    pub fn with_transport(client: EntityClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &EntityClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn round_trip(&self, request: &HttpRequest, call: &CallOptions) -> Result<HttpResponse, Error> {
        let response = self.transport.send(request)?;
        if call.debug {
            info!(
                method = %request.method,
                url = %request.url,
                status = response.status,
                payload = %response.body_text(),
                "response payload"
            );
        }
        Ok(response)
    }

    /// One record by primary key, every value as text.
    pub fn get(&self, entity: &str, key: &str, call: &CallOptions) -> Result<StringRecord, Error> {
        info!(base_url = self.client.base_url(), entity, key, "get");
        let request = self.client.build_get(entity, key, call);
        let response = self.round_trip(&request, call)?;
        let record = self.client.parse_get(&request.url, &response)?;
        if call.debug {
            if let Some(identifier) = record.get("_identifier") {
                info!(entity, identifier = %identifier, "get identifier");
            }
        }
        Ok(record)
    }

    /// One record by primary key with its original value types, looked up
    /// through the list endpoint.
    pub fn find_by_key(
        &self,
        entity: &str,
        key: &str,
        call: &CallOptions,
    ) -> Result<Option<Record>, Error> {
        let filter = Filter::equals([("id", key)]);
        let rows = self.list(entity, &filter, &QueryOptions::default(), call)?;
        Ok(rows.into_iter().next())
    }

    pub fn list(
        &self,
        entity: &str,
        filter: &Filter,
        options: &QueryOptions,
        call: &CallOptions,
    ) -> Result<Vec<Record>, Error> {
        info!(base_url = self.client.base_url(), entity, "list");
        let request = self.client.build_list(entity, filter, options, call);
        if call.debug {
            info!(url = %request.url, "list url");
        }
        let response = self.round_trip(&request, call)?;
        self.client.parse_list(&request.url, &response)
    }

    pub fn count(&self, entity: &str, filter: &Filter, call: &CallOptions) -> Result<u64, Error> {
        info!(base_url = self.client.base_url(), entity, "count");
        let request = self.client.build_count(entity, filter, call);
        let response = self.round_trip(&request, call)?;
        self.client.parse_count(&request.url, &response)
    }

    /// Deletes by primary key and returns the deleted record as text.
    pub fn delete(&self, entity: &str, key: &str, call: &CallOptions) -> Result<StringRecord, Error> {
        info!(base_url = self.client.base_url(), entity, key, "delete");
        let request = self.client.build_delete(entity, key, call);
        let response = self.round_trip(&request, call)?;
        self.client.parse_delete(&request.url, &response)
    }

    /// Creates or updates each row with its own POST, in input order.
    ///
    /// With `call.short_circuit` the first failed row stops the batch and
    /// later rows are not sent; otherwise every row is attempted.
    pub fn post(&self, entity: &str, rows: &[Record], call: &CallOptions) -> BatchOutcome {
        info!(
            base_url = self.client.base_url(),
            entity,
            rows = rows.len(),
            short_circuit = call.short_circuit,
            "post"
        );

        let mut outcome = BatchOutcome {
            requested: rows.len(),
            rows: Vec::with_capacity(rows.len()),
            aborted_at: None,
        };

        for (index, row) in rows.iter().enumerate() {
            if call.debug {
                info!(entity, index, row = ?row, "post row");
            }

            let result = self.post_row(entity, row, call);
            match &result {
                Ok(record) if call.debug => info!(entity, index, record = ?record, "data result posted"),
                Ok(_) => {}
                Err(err) => warn!(entity, index, error = %err, "row rejected"),
            }

            let failed = result.is_err();
            outcome.rows.push(result);
            if failed && call.short_circuit {
                outcome.aborted_at = Some(index);
                break;
            }
        }

        outcome
    }

    fn post_row(&self, entity: &str, row: &Record, call: &CallOptions) -> Result<Record, Error> {
        let request = self.client.build_post(entity, row)?;
        let response = self.round_trip(&request, call)?;
        self.client.parse_post(&request.url, &response)
    }

    /// `post` collapsed to one record per input row. Failed rows are empty
    /// records unless the batch was short-circuited, in which case the
    /// failing row's error is returned.
    pub fn save(&self, entity: &str, rows: &[Record], call: &CallOptions) -> Result<Vec<Record>, Error> {
        self.post(entity, rows, call).into_records()
    }

    /// Lists a declared shape: the entity and selected properties come from
    /// its mapping, and each record is deserialized after renaming.
    pub fn list_as<S: EntityShape>(
        &self,
        filter: &Filter,
        options: &QueryOptions,
        call: &CallOptions,
    ) -> Result<Vec<S>, Error> {
        let mapping = S::mapping();
        let mut options = options.clone();
        if options.fields.is_empty() {
            options.fields = mapping.selected_properties();
        }
        let records = self.list(mapping.entity_name(), filter, &options, call)?;
        records
            .iter()
            .map(|record| mapping.to_shape(record))
            .collect()
    }

    pub fn get_as<S: EntityShape>(&self, key: &str, call: &CallOptions) -> Result<Option<S>, Error> {
        let filter = Filter::equals([("id", key)]);
        let rows = self.list_as::<S>(&filter, &QueryOptions::default(), call)?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::error::{ProtocolError, ServiceError, TransportError};
    use crate::http::HttpMethod;
    use crate::mapping::EntityMapping;

    /// Replays canned responses and records every request it was given.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<HttpResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<HttpRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left"))
        }
    }

    fn service(responses: Vec<HttpResponse>) -> EntityService<ScriptedTransport> {
        let client = EntityClient::new(
            &ServiceConfig::new("http://erp.local/openbravo"),
            &Credentials::new("Openbravo", "openbravo"),
        );
        EntityService::with_transport(client, ScriptedTransport::new(responses))
    }

    fn accepted(id: &str) -> HttpResponse {
        HttpResponse::json(
            200,
            json!({"response": {"status": 0, "data": [{"id": id}]}}).to_string(),
        )
    }

    fn rejected() -> HttpResponse {
        HttpResponse::json(
            200,
            r#"{"response":{"status":-4,"errors":{"name":"required"}}}"#,
        )
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({"name": format!("row {i}")}).as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn tolerant_batch_keeps_length_and_order() {
        let svc = service(vec![accepted("a"), rejected(), accepted("c"), rejected()]);
        let outcome = svc.post("Product", &rows(4), &CallOptions::default());

        assert_eq!(outcome.rows.len(), 4);
        assert!(!outcome.is_aborted());
        assert_eq!(svc.transport().sent().len(), 4);

        let records = outcome.into_records().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["id"], json!("a"));
        assert!(records[1].is_empty());
        assert_eq!(records[2]["id"], json!("c"));
        assert!(records[3].is_empty());
    }

    #[test]
    fn short_circuit_stops_at_first_failure() {
        let svc = service(vec![accepted("a"), accepted("b"), rejected(), accepted("d")]);
        let call = CallOptions::default().short_circuit(true);
        let outcome = svc.post("Product", &rows(4), &call);

        assert_eq!(outcome.aborted_at, Some(2));
        assert_eq!(outcome.accepted().count(), 2);
        let sent = svc.transport().sent();
        assert_eq!(sent.len(), 3, "no request after the failing row");

        let err = outcome.into_records().unwrap_err();
        assert_eq!(err.field_errors().unwrap()["name"], "required");
    }

    #[test]
    fn short_circuit_without_failures_returns_everything() {
        let svc = service(vec![accepted("a"), accepted("b")]);
        let call = CallOptions::default().short_circuit(true);
        let records = svc.save("Product", &rows(2), &call).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn protocol_failure_is_a_row_error_in_batches() {
        let svc = service(vec![HttpResponse::json(500, ""), accepted("b")]);
        let outcome = svc.post("Product", &rows(2), &CallOptions::default());
        assert!(matches!(
            outcome.rows[0],
            Err(Error::Protocol(ProtocolError::Status { status: 500, .. }))
        ));
        assert!(outcome.rows[1].is_ok());
    }

    #[test]
    fn post_sends_one_request_per_row_with_data_body() {
        let svc = service(vec![accepted("a")]);
        svc.post("Product", &rows(1), &CallOptions::default());
        let sent = svc.transport().sent();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "http://erp.local/openbravo/org.openbravo.service.json.jsonrest/Product");
        let body: serde_json::Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"data": {"name": "row 0"}}));
    }

    #[test]
    fn every_family_rejects_non_2xx() {
        for status in [404, 500] {
            let call = CallOptions::default();
            let svc = service(vec![HttpResponse::json(status, ""); 4]);
            assert!(matches!(svc.get("P", "1", &call), Err(Error::Protocol(ProtocolError::Status { .. }))));
            assert!(matches!(
                svc.list("P", &Filter::None, &QueryOptions::new(), &call),
                Err(Error::Protocol(ProtocolError::Status { .. }))
            ));
            assert!(matches!(svc.count("P", &Filter::None, &call), Err(Error::Protocol(ProtocolError::Status { .. }))));
            assert!(matches!(svc.delete("P", "1", &call), Err(Error::Protocol(ProtocolError::Status { .. }))));
        }
    }

    #[test]
    fn created_status_is_success() {
        let svc = service(vec![HttpResponse::json(
            201,
            r#"{"response":{"status":0,"data":{"id":"1","name":"Bolt"}}}"#,
        )]);
        let record = svc.delete("Product", "1", &CallOptions::default()).unwrap();
        assert_eq!(record["name"], "Bolt");
    }

    #[test]
    fn single_operations_report_service_status() {
        let svc = service(vec![HttpResponse::json(200, r#"{"response":{"status":-1}}"#)]);
        let err = svc.get("Product", "1", &CallOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Service(ServiceError::Status { status: -1, .. })));
    }

    #[test]
    fn find_by_key_filters_on_id() {
        let svc = service(vec![HttpResponse::json(
            200,
            r#"{"response":{"status":0,"data":[{"id":"X1","qty":3}]}}"#,
        )]);
        let record = svc.find_by_key("Product", "X1", &CallOptions::default()).unwrap().unwrap();
        assert_eq!(record["qty"], json!(3));
        assert!(svc.transport().sent()[0].url.ends_with("?_where=%28id%3D%27X1%27%29"));
    }

    #[derive(Debug, Deserialize)]
    struct Uom {
        id: String,
        symbol: String,
    }

    impl EntityShape for Uom {
        fn mapping() -> EntityMapping {
            EntityMapping::new("Uom")
                .entity("UOM")
                .field("id")
                .field_as("symbol", "eDICode")
        }
    }

    #[test]
    fn list_as_uses_declared_mapping() {
        let svc = service(vec![HttpResponse::json(
            200,
            r#"{"response":{"status":0,"data":[{"id":"100","eDICode":"EA"}]}}"#,
        )]);
        let uoms: Vec<Uom> = svc
            .list_as(&Filter::None, &QueryOptions::new(), &CallOptions::default())
            .unwrap();
        assert_eq!(uoms.len(), 1);
        assert_eq!(uoms[0].id, "100");
        assert_eq!(uoms[0].symbol, "EA");
        assert!(svc.transport().sent()[0]
            .url
            .ends_with("/UOM?_selectedProperties=id,eDICode"));
    }

    #[test]
    fn get_as_returns_none_when_empty() {
        let svc = service(vec![HttpResponse::json(200, r#"{"response":{"status":0,"data":[]}}"#)]);
        let uom: Option<Uom> = svc.get_as("nope", &CallOptions::default()).unwrap();
        assert!(uom.is_none());
    }
}

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const ENTITY_NAMESPACE: &str = "org.openbravo.service.json.jsonrest";
pub const COUNT_NAMESPACE: &str = "ws/com.kinnarastudio.openbravo.kecakadapter.RecordCount";

pub type Record = Map<String, Value>;
pub type Db = Arc<RwLock<HashMap<String, Vec<Record>>>>;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    auth_header: String,
}

/// Query parameters understood by the list and count endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(rename = "_selectedProperties")]
    pub selected_properties: Option<String>,
    #[serde(rename = "_noActiveFilter")]
    pub no_active_filter: Option<bool>,
    #[serde(rename = "_startRow")]
    pub start_row: Option<usize>,
    #[serde(rename = "_endRow")]
    pub end_row: Option<usize>,
    #[serde(rename = "_where")]
    pub where_clause: Option<String>,
    #[serde(rename = "_orderBy")]
    pub order_by: Option<String>,
}

#[derive(Deserialize)]
pub struct PostBody {
    pub data: Record,
}

pub fn app() -> Router {
    app_with_credentials("Openbravo", "openbravo")
}

pub fn app_with_credentials(username: &str, password: &str) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(HashMap::new())),
        auth_header: format!("Basic {}", BASE64.encode(format!("{username}:{password}"))),
    };
    router(state)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            &format!("/{ENTITY_NAMESPACE}/{{entity}}"),
            get(list_records).post(post_record),
        )
        .route(
            &format!("/{ENTITY_NAMESPACE}/{{entity}}/{{id}}"),
            get(get_record).delete(delete_record),
        )
        .route(&format!("/{COUNT_NAMESPACE}/{{entity}}"), get(count_records))
        .fallback(login_page)
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_credentials(
    listener: TcpListener,
    username: &str,
    password: &str,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_credentials(username, password)).await
}

fn ok_data(data: Value) -> Response {
    Json(json!({"response": {"status": 0, "data": data}})).into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"response": {"status": -1, "error": {"message": message}}})),
    )
        .into_response()
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let given = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if given == Some(state.auth_header.as_str()) {
        Ok(())
    } else {
        tracing::warn!("rejected request with bad credentials");
        Err(failure(StatusCode::UNAUTHORIZED, "Invalid user name or password"))
    }
}

fn is_active(record: &Record) -> bool {
    record.get("active") != Some(&Value::Bool(false))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parses `(a='1') AND (b='2')` into field/value pairs.
pub fn parse_where(clause: &str) -> Option<Vec<(String, String)>> {
    clause
        .split(" AND ")
        .map(|part| {
            let part = part.trim().trim_start_matches('(').trim_end_matches(')');
            let (field, value) = part.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .unwrap_or(value);
            Some((field.trim().to_string(), value.replace("''", "'")))
        })
        .collect()
}

fn project(record: &Record, fields: &[&str]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }
    record
        .iter()
        .filter(|(k, _)| {
            fields
                .iter()
                .any(|f| k.as_str() == *f || k.starts_with(&format!("{f}$")))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn select(rows: &[Record], params: &ListParams) -> Result<Vec<Record>, String> {
    let conditions = match params.where_clause.as_deref().filter(|w| !w.is_empty()) {
        Some(clause) => {
            parse_where(clause).ok_or_else(|| format!("unsupported where clause: {clause}"))?
        }
        None => Vec::new(),
    };
    let include_inactive = params.no_active_filter.unwrap_or(false);

    let mut matched: Vec<Record> = rows
        .iter()
        .filter(|r| include_inactive || is_active(r))
        .filter(|r| {
            conditions
                .iter()
                .all(|(field, value)| r.get(field).map(text).as_deref() == Some(value.as_str()))
        })
        .cloned()
        .collect();

    if let Some(order) = params.order_by.as_deref().filter(|o| !o.is_empty()) {
        let (key, descending) = match order.strip_suffix(" desc") {
            Some(key) => (key, true),
            None => (order, false),
        };
        let key = key.replace('.', "$");
        matched.sort_by_key(|r| r.get(&key).map(text).unwrap_or_default());
        if descending {
            matched.reverse();
        }
    }

    Ok(matched)
}

async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let db = state.db.read().await;
    let rows = db.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
    let matched = match select(rows, &params) {
        Ok(matched) => matched,
        Err(message) => return failure(StatusCode::OK, &message),
    };

    let start = params.start_row.unwrap_or(0).min(matched.len());
    let end = params.end_row.unwrap_or(matched.len()).clamp(start, matched.len());
    let fields: Vec<&str> = params
        .selected_properties
        .as_deref()
        .map(|s| s.split(',').filter(|f| !f.is_empty()).collect())
        .unwrap_or_default();

    let data: Vec<Value> = matched[start..end]
        .iter()
        .map(|r| Value::Object(project(r, &fields)))
        .collect();
    ok_data(Value::Array(data))
}

async fn count_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let db = state.db.read().await;
    let rows = db.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
    match select(rows, &params) {
        Ok(matched) => Json(json!({"response": {"status": 0, "count": matched.len()}})).into_response(),
        Err(message) => failure(StatusCode::OK, &message),
    }
}

async fn get_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let db = state.db.read().await;
    let found = db
        .get(&entity)
        .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(&Value::String(id.clone()))));
    match found {
        Some(record) => ok_data(Value::Object(record.clone())),
        None => failure(StatusCode::NOT_FOUND, &format!("{entity} with id {id} not found")),
    }
}

async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut db = state.db.write().await;
    let rows = db.entry(entity.clone()).or_default();
    match rows.iter().position(|r| r.get("id") == Some(&Value::String(id.clone()))) {
        Some(index) => ok_data(Value::Object(rows.remove(index))),
        None => failure(StatusCode::NOT_FOUND, &format!("{entity} with id {id} not found")),
    }
}

/// Creates a record, or updates it when `data.id` names an existing one.
///
/// A row without a `name` fails validation (status -4); a row carrying
/// `_fail` is refused with its text as the error message (status -1).
async fn post_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Json(body): Json<PostBody>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let mut data = body.data;

    if let Some(reason) = data.get("_fail") {
        return failure(StatusCode::OK, &text(reason));
    }

    let mut db = state.db.write().await;
    let rows = db.entry(entity).or_default();

    let existing = data
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| rows.iter().position(|r| r.get("id").and_then(Value::as_str) == Some(id)));

    if let Some(index) = existing {
        let record = &mut rows[index];
        for (k, v) in data {
            record.insert(k, v);
        }
        if let Some(name) = record.get("name").cloned() {
            record.insert("_identifier".to_string(), name);
        }
        return ok_data(json!([record.clone()]));
    }

    let has_name = data.get("name").is_some_and(|n| !text(n).is_empty());
    if !has_name {
        return Json(json!({
            "response": {"status": -4, "errors": {"name": "Value required"}}
        }))
        .into_response();
    }

    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    data.insert("id".to_string(), Value::String(id));
    data.entry("active").or_insert(Value::Bool(true));
    if let Some(name) = data.get("name").cloned() {
        data.insert("_identifier".to_string(), name);
    }
    rows.push(data.clone());
    ok_data(json!([data]))
}

/// Unknown paths answer like a web front-end would: a login page in HTML.
async fn login_page() -> Html<&'static str> {
    Html("<html><body><form action=\"/secureApp/LoginHandler.html\"></form></body></html>")
}

#![allow(dead_code)]

//! In-process mock of the Frappe REST endpoints used by the gateway.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const API_KEY: &str = "key";
pub const API_SECRET: &str = "secret";

#[derive(Default)]
pub struct MockState {
    pub docs: HashMap<(String, String), Map<String, Value>>,
    pub updates: Vec<(String, String, Map<String, Value>)>,
    pub console_calls: Vec<Value>,
    pub list_queries: Vec<HashMap<String, String>>,
    pub console_reply: Value,
}

impl MockState {
    pub fn with_doc(mut self, doctype: &str, docname: &str, fields: Value) -> Self {
        let mut doc = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        doc.insert("name".into(), Value::String(docname.into()));
        self.docs.insert((doctype.into(), docname.into()), doc);
        self
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockSite {
    pub url: String,
    pub state: Shared,
}

impl MockSite {
    pub fn field(&self, doctype: &str, docname: &str, field: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .docs
            .get(&(doctype.to_string(), docname.to_string()))
            .and_then(|doc| doc.get(field).cloned())
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().updates.len()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("token {}:{}", API_KEY, API_SECRET);
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn forbidden() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "exc_type": "PermissionError" })),
    )
}

async fn get_doc(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((doctype, docname)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return forbidden();
    }
    let state = state.lock().unwrap();
    match state.docs.get(&(doctype, docname)) {
        Some(doc) => (StatusCode::OK, Json(json!({ "data": doc }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "exc_type": "DoesNotExistError" })),
        ),
    }
}

async fn put_doc(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((doctype, docname)): Path<(String, String)>,
    Json(body): Json<Map<String, Value>>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return forbidden();
    }
    let mut state = state.lock().unwrap();
    let key = (doctype.clone(), docname.clone());
    let Some(doc) = state.docs.get_mut(&key) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "exc_type": "DoesNotExistError" })),
        );
    };
    for (field, value) in &body {
        doc.insert(field.clone(), value.clone());
    }
    let updated = doc.clone();
    state.updates.push((doctype, docname, body));
    (StatusCode::OK, Json(json!({ "data": updated })))
}

async fn list_docs(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(doctype): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return forbidden();
    }
    let fields: Vec<String> = params
        .get("fields")
        .and_then(|f| serde_json::from_str(f).ok())
        .unwrap_or_default();

    let mut state = state.lock().unwrap();
    state.list_queries.push(params);

    let mut keys: Vec<_> = state.docs.keys().filter(|(dt, _)| *dt == doctype).cloned().collect();
    keys.sort();
    let data: Vec<Value> = keys
        .iter()
        .map(|key| {
            let doc = &state.docs[key];
            let projected: Map<String, Value> = fields
                .iter()
                .map(|f| (f.clone(), doc.get(f).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(projected)
        })
        .collect();
    (StatusCode::OK, Json(json!({ "data": data })))
}

async fn run_method(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(method): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return forbidden();
    }
    if method != "frappe.desk.doctype.system_console.system_console.execute_code" {
        return (StatusCode::NOT_FOUND, Json(json!({})));
    }
    let doc: Value = body
        .get("doc")
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or(Value::Null);
    let mut state = state.lock().unwrap();
    state.console_calls.push(doc);
    (StatusCode::OK, Json(state.console_reply.clone()))
}

/// Serve `state` on a free local port.
pub async fn spawn_site(state: MockState) -> MockSite {
    let shared = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/api/resource/{doctype}", get(list_docs))
        .route("/api/resource/{doctype}/{docname}", get(get_doc).put(put_doc))
        .route("/api/method/{method}", post(run_method))
        .with_state(Arc::clone(&shared));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSite {
        url: format!("http://{}", addr),
        state: shared,
    }
}

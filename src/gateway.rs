//! Remote document gateway.
//!
//! [`DocumentGateway`] is the seam between the sync pipeline and the Frappe
//! site. [`FrappeClient`] implements it over the REST API:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`fetch_field`](DocumentGateway::fetch_field) | `GET /api/resource/{doctype}/{docname}` |
//! | [`update_field`](DocumentGateway::update_field) | `PUT /api/resource/{doctype}/{docname}` |
//! | [`list_documents`](DocumentGateway::list_documents) | `GET /api/resource/{doctype}?filters=..&fields=..` |
//! | [`execute_remote_code`](DocumentGateway::execute_remote_code) | `POST /api/method/...system_console.execute_code` |
//!
//! Every call returns a [`GatewayResult`]; nothing is retried.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::SiteConfig;
use crate::error::{GatewayError, GatewayResult};

const EXECUTE_CODE_METHOD: &str =
    "frappe.desk.doctype.system_console.system_console.execute_code";

/// A document as returned by the list endpoint.
pub type RemoteDocument = Map<String, Value>;

/// Code submitted to the System Console. `kind` is the `type` header argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleRequest {
    pub kind: String,
    pub commit: bool,
    pub source: String,
}

#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Current value of `docfield`; `None` when the field is empty or absent.
    async fn fetch_field(
        &self,
        doctype: &str,
        docname: &str,
        docfield: &str,
    ) -> GatewayResult<Option<String>>;

    /// Overwrite `docfield` with `value`; returns the updated document.
    async fn update_field(
        &self,
        doctype: &str,
        docname: &str,
        docfield: &str,
        value: &str,
    ) -> GatewayResult<Value>;

    async fn list_documents(
        &self,
        doctype: &str,
        filters: &Value,
        fields: &[String],
    ) -> GatewayResult<Vec<RemoteDocument>>;

    /// Run code in the System Console; returns its output lines.
    async fn execute_remote_code(&self, request: &ConsoleRequest) -> GatewayResult<Vec<String>>;
}

/// [`DocumentGateway`] over the Frappe REST API.
pub struct FrappeClient {
    http: reqwest::Client,
    base: Url,
    authorization: String,
}

impl FrappeClient {
    pub fn new(site: &SiteConfig) -> GatewayResult<Self> {
        let mut base = Url::parse(&site.url).map_err(|e| GatewayError::Url(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(GatewayError::Url(format!("'{}' cannot be a base URL", site.url)));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(site.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base,
            authorization: format!("token {}:{}", site.api_key, site.api_secret),
        })
    }

    fn url(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| GatewayError::Url(self.base.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "request");
        self.http
            .request(method, url)
            .header("Authorization", &self.authorization)
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> GatewayResult<Value> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// `data` member of a resource response.
fn take_data(mut body: Value) -> GatewayResult<Value> {
    match body.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(GatewayError::Decode("response has no 'data' member".into())),
    }
}

fn field_as_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Output lines of a System Console response.
///
/// `_debug_messages` (a JSON-encoded array) wins over `message.output`.
pub fn console_output(body: &Value) -> GatewayResult<Vec<String>> {
    if let Some(Value::String(encoded)) = body.get("_debug_messages") {
        let lines: Vec<Value> = serde_json::from_str(encoded)
            .map_err(|e| GatewayError::Decode(format!("_debug_messages: {}", e)))?;
        return Ok(lines
            .into_iter()
            .map(|line| match line {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect());
    }

    match body.pointer("/message/output") {
        Some(Value::String(output)) if !output.is_empty() => {
            Ok(output.lines().map(str::to_string).collect())
        }
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(Value::String(_)) => Ok(Vec::new()),
        Some(other) => Ok(vec![other.to_string()]),
    }
}

#[async_trait]
impl DocumentGateway for FrappeClient {
    async fn fetch_field(
        &self,
        doctype: &str,
        docname: &str,
        docfield: &str,
    ) -> GatewayResult<Option<String>> {
        let url = self.url(&["api", "resource", doctype, docname])?;
        let data = take_data(self.send(self.request(Method::GET, url)).await?)?;
        Ok(field_as_text(data.get(docfield)))
    }

    async fn update_field(
        &self,
        doctype: &str,
        docname: &str,
        docfield: &str,
        value: &str,
    ) -> GatewayResult<Value> {
        let url = self.url(&["api", "resource", doctype, docname])?;
        let mut body = Map::new();
        body.insert(docfield.to_string(), Value::String(value.to_string()));
        let builder = self.request(Method::PUT, url).json(&body);
        take_data(self.send(builder).await?)
    }

    async fn list_documents(
        &self,
        doctype: &str,
        filters: &Value,
        fields: &[String],
    ) -> GatewayResult<Vec<RemoteDocument>> {
        let url = self.url(&["api", "resource", doctype])?;
        let fields = serde_json::to_string(fields).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let builder = self.request(Method::GET, url).query(&[
            ("filters", filters.to_string()),
            ("fields", fields),
            ("limit_page_length", "0".to_string()),
        ]);

        match take_data(self.send(builder).await?)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(doc) => Ok(doc),
                    other => Err(GatewayError::Decode(format!(
                        "expected document object, got {}",
                        other
                    ))),
                })
                .collect(),
            other => Err(GatewayError::Decode(format!(
                "expected document list, got {}",
                other
            ))),
        }
    }

    async fn execute_remote_code(&self, request: &ConsoleRequest) -> GatewayResult<Vec<String>> {
        let url = self.url(&["api", "method", EXECUTE_CODE_METHOD])?;
        let doc = json!({
            "type": request.kind,
            "commit": if request.commit { 1 } else { 0 },
            "doctype": "System Console",
            "console": request.source,
        });
        let builder = self
            .request(Method::POST, url)
            .json(&json!({ "doc": doc.to_string() }));
        console_output(&self.send(builder).await?)
    }
}

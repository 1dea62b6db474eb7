// Framework-neutral request/response views used by the validators and the
// pipeline. The axum adapter in `pipeline::dispatch` converts to/from these.
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

/// JSON body of an inbound request, parsed once at the pipeline edge
#[derive(Debug, Clone)]
pub enum JsonBody {
    /// No body (or an empty one)
    Empty,
    /// Parsed JSON document
    Json(Value),
    /// Body present but not valid JSON
    Malformed,
}

impl JsonBody {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return JsonBody::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => JsonBody::Json(value),
            Err(_) => JsonBody::Malformed,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            JsonBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Inbound request as seen by the pipeline and the contract validators
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: JsonBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: JsonBody::Empty,
        }
    }

    /// Build from raw HTTP parts (axum adapter path)
    pub fn from_parts(method: Method, path: &str, query: Option<&str>, headers: HeaderMap, body: &[u8]) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: query.map(parse_query).unwrap_or_default(),
            headers,
            body: JsonBody::from_bytes(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, key: &'static str, value: &str) -> Self {
        if let Ok(v) = value.parse() {
            self.headers.insert(key, v);
        }
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = JsonBody::Json(body);
        self
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a single cookie from the Cookie header, if present
    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        let cookies = self.header_value("cookie")?;
        cookies.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
    }
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (part.to_string(), String::new()),
        })
        .collect()
}

/// Outbound response produced by handlers and returned by the pipeline.
/// The body is passed through verbatim; key order is preserved as built.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: StatusCode::OK, body }
    }

    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

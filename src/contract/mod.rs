// OpenAPI contract loading and indexing. The document is parsed once at
// startup, deployment servers are merged in, and the compiled store is shared
// read-only for the lifetime of the process.
pub mod request;
pub mod response;
pub mod schema;

pub use request::RequestValidator;
pub use response::ResponseValidator;
pub use schema::{ValidationError, ValidationErrorKind, ValidationResult};

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use schema::{Schema, SchemaIndex};

/// Errors raised while loading or compiling the contract document.
/// All of these are fatal: the process must not start without a contract.
#[derive(Debug, Error)]
pub enum ContractLoadError {
    #[error("failed to read contract document: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed contract document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid path template '{0}'")]
    InvalidPathTemplate(String),

    #[error("invalid status pattern '{0}'")]
    InvalidStatusPattern(String),
}

/// Server entry from the document's `servers` list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    version: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponents {
    #[serde(default)]
    schemas: SchemaIndex,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    schema: Option<Schema>,
}

#[derive(Debug, Deserialize)]
struct RawRequestBody {
    #[serde(default)]
    required: bool,
    #[serde(default)]
    content: BTreeMap<String, RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    content: BTreeMap<String, RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawOperation {
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default, rename = "requestBody")]
    request_body: Option<RawRequestBody>,
    #[serde(default)]
    responses: BTreeMap<String, RawResponse>,
}

#[derive(Debug, Deserialize)]
struct RawPathItem {
    #[serde(default)]
    parameters: Vec<Parameter>,
    get: Option<RawOperation>,
    put: Option<RawOperation>,
    post: Option<RawOperation>,
    delete: Option<RawOperation>,
    patch: Option<RawOperation>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    info: RawInfo,
    #[serde(default)]
    servers: Vec<Server>,
    #[serde(default)]
    paths: BTreeMap<String, RawPathItem>,
    #[serde(default)]
    components: RawComponents,
}

/// Where a parameter is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamIn {
    Query,
    Path,
    Header,
}

impl ParamIn {
    fn as_str(&self) -> &'static str {
        match self {
            ParamIn::Query => "query",
            ParamIn::Path => "path",
            ParamIn::Header => "header",
        }
    }
}

/// OpenAPI parameter object (inline; `$ref` parameters are not used by the
/// admin contract)
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamIn,
    #[serde(default)]
    pub required: bool,
    pub schema: Option<Schema>,
}

impl Parameter {
    /// Dotted location string for error descriptors, e.g. `query.limit`
    pub fn descriptor_location(&self) -> String {
        format!("{}.{}", self.location.as_str(), self.name)
    }
}

/// One segment of a path template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Compiled `/domains/{domainID}/users` style template. `{name}` segments
/// match exactly one path segment.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    fn parse(raw: &str) -> Result<Self, ContractLoadError> {
        if !raw.starts_with('/') {
            return Err(ContractLoadError::InvalidPathTemplate(raw.to_string()));
        }
        let mut segments = Vec::new();
        for part in raw.split('/').skip(1).filter(|p| !p.is_empty()) {
            if let Some(name) = part.strip_prefix('{') {
                let name = name
                    .strip_suffix('}')
                    .ok_or_else(|| ContractLoadError::InvalidPathTemplate(raw.to_string()))?;
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(ContractLoadError::InvalidPathTemplate(raw.to_string()));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(ContractLoadError::InvalidPathTemplate(raw.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Ok(Self { raw: raw.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a concrete request path, returning captured parameter values
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = path.split('/').skip(1).filter(|p| !p.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(expected) if expected == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => captures.push((name.clone(), part.to_string())),
            }
        }
        Some(captures)
    }
}

/// Response status matcher: exact code, `2XX` class pattern, or `default`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMatcher {
    Exact(u16),
    Class(u16),
    Default,
}

impl StatusMatcher {
    fn parse(pattern: &str) -> Result<Self, ContractLoadError> {
        if pattern == "default" {
            return Ok(StatusMatcher::Default);
        }
        if let Some(class) = pattern.strip_suffix("XX") {
            if let Ok(digit) = class.parse::<u16>() {
                if (1..=5).contains(&digit) {
                    return Ok(StatusMatcher::Class(digit));
                }
            }
            return Err(ContractLoadError::InvalidStatusPattern(pattern.to_string()));
        }
        pattern
            .parse::<u16>()
            .map(StatusMatcher::Exact)
            .map_err(|_| ContractLoadError::InvalidStatusPattern(pattern.to_string()))
    }

    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusMatcher::Exact(code) => *code == status,
            StatusMatcher::Class(class) => status / 100 == *class,
            StatusMatcher::Default => true,
        }
    }

    /// Specificity rank for picking the best matcher (exact > class > default)
    fn rank(&self) -> u8 {
        match self {
            StatusMatcher::Exact(_) => 2,
            StatusMatcher::Class(_) => 1,
            StatusMatcher::Default => 0,
        }
    }
}

/// Declared request body for an operation
#[derive(Debug, Clone)]
pub struct RequestBodySpec {
    pub required: bool,
    pub schema: Option<Schema>,
}

/// Compiled operation: one path template + method pair from the document
#[derive(Debug, Clone)]
pub struct Operation {
    pub path: PathTemplate,
    pub method: Method,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBodySpec>,
    pub responses: Vec<(StatusMatcher, Option<Schema>)>,
}

impl Operation {
    /// Best-matching response schema for a status code, if the status is
    /// documented at all
    pub fn response_schema(&self, status: u16) -> Option<&Option<Schema>> {
        self.responses
            .iter()
            .filter(|(matcher, _)| matcher.matches(status))
            .max_by_key(|(matcher, _)| matcher.rank())
            .map(|(_, schema)| schema)
    }
}

/// Parsed but not yet compiled contract document. Deployment servers are
/// merged at this stage, mirroring how the servers list is extended from
/// configuration before the spec is handed to the validators.
#[derive(Debug)]
pub struct ContractDocument {
    raw: RawDocument,
}

impl ContractDocument {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContractLoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str(&text)
    }

    /// Parse from YAML or JSON text (YAML is a superset of JSON)
    pub fn from_str(text: &str) -> Result<Self, ContractLoadError> {
        let raw = serde_yaml::from_str(text)?;
        Ok(Self { raw })
    }

    /// Append deployment-specific server entries before compilation
    pub fn merge_servers(mut self, extra: &[Server]) -> Self {
        self.raw.servers.extend(extra.iter().cloned());
        self
    }

    /// Compile into the immutable, process-wide store
    pub fn compile(self) -> Result<ContractStore, ContractLoadError> {
        let mut operations = Vec::new();
        for (raw_path, item) in &self.raw.paths {
            let template = PathTemplate::parse(raw_path)?;
            let methods = [
                (Method::GET, &item.get),
                (Method::PUT, &item.put),
                (Method::POST, &item.post),
                (Method::DELETE, &item.delete),
                (Method::PATCH, &item.patch),
            ];
            for (method, raw_op) in methods {
                let Some(raw_op) = raw_op else { continue };

                // Path-level parameters apply to every operation beneath them
                let mut parameters = item.parameters.clone();
                parameters.extend(raw_op.parameters.iter().cloned());

                let request_body = raw_op.request_body.as_ref().map(|body| RequestBodySpec {
                    required: body.required,
                    schema: body.content.get("application/json").and_then(|m| m.schema.clone()),
                });

                let mut responses = Vec::new();
                for (pattern, raw_response) in &raw_op.responses {
                    let matcher = StatusMatcher::parse(pattern)?;
                    let schema = raw_response.content.get("application/json").and_then(|m| m.schema.clone());
                    responses.push((matcher, schema));
                }

                operations.push(Operation {
                    path: template.clone(),
                    method,
                    parameters,
                    request_body,
                    responses,
                });
            }
        }

        Ok(ContractStore {
            title: self.raw.info.title,
            version: self.raw.info.version,
            servers: self.raw.servers,
            schemas: self.raw.components.schemas,
            operations,
        })
    }
}

/// Immutable, compiled OpenAPI contract. Loaded exactly once at startup and
/// shared by reference; never mutated afterwards.
#[derive(Debug)]
pub struct ContractStore {
    title: String,
    version: String,
    servers: Vec<Server>,
    schemas: SchemaIndex,
    operations: Vec<Operation>,
}

impl ContractStore {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Semantic version string from `info.version`
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn schemas(&self) -> &SchemaIndex {
        &self.schemas
    }

    /// Locate the operation for a concrete method + path, together with the
    /// captured path parameter values
    pub fn find_operation(&self, method: &Method, path: &str) -> Option<(&Operation, Vec<(String, String)>)> {
        self.operations
            .iter()
            .filter(|op| op.method == *method)
            .find_map(|op| op.path.match_path(path).map(|captures| (op, captures)))
    }

    pub fn request_validator(&self) -> RequestValidator<'_> {
        RequestValidator::new(self)
    }

    pub fn response_validator(&self) -> ResponseValidator<'_> {
        ResponseValidator::new(self)
    }
}

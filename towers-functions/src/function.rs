//! Function definition and invocation types

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use towers_common::types::{BodyProperty, Principal, Rights};
use towers_common::Error;

/// A file received with an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Multipart field the file arrived under (`file` or `files`)
    pub field: String,
    /// Original file name sent by the client
    pub file_name: String,
    /// Declared content type
    pub content_type: Option<String>,
    /// File contents
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Invocation request for a function
#[derive(Debug, Clone)]
pub struct FunctionRequest {
    /// Name of the function being invoked
    pub function: String,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Request headers, names lower-cased
    pub headers: HashMap<String, String>,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Normalized body: JSON, form fields, or the query for GET
    pub body: serde_json::Value,
    /// Uploaded files
    pub files: Vec<UploadedFile>,
}

impl FunctionRequest {
    /// Create an empty request for `function`
    pub fn new(function: impl Into<String>, method: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            path: format!("/{function}"),
            function,
            method: method.into(),
            headers: HashMap::new(),
            query: HashMap::new(),
            body: serde_json::Value::Object(serde_json::Map::new()),
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Token from `Authorization: Bearer <token>`
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Payload of a [`FunctionResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Serialized as JSON, labeled `application/json` unless the handler
    /// set its own content type
    Json(serde_json::Value),
    /// Sent unchanged under the handler's content type
    Bytes(Vec<u8>),
}

/// Invocation response produced by a function handler
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// `None` for an empty body
    pub body: Option<ResponseBody>,
}

impl FunctionResponse {
    /// Create a success response
    pub fn ok(body: serde_json::Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Some(ResponseBody::Json(body)),
        }
    }

    /// Raw response body with its content type
    pub fn bytes(status: u16, content_type: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Some(ResponseBody::Bytes(data.into())),
        }
        .with_header("content-type", content_type)
    }

    /// Plain UTF-8 text
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self::bytes(status, "text/plain; charset=utf-8", text.into())
    }

    /// Response with a status and no body
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// JSON body, if the response carries one
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            Some(ResponseBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    /// Create an error response
    pub fn error(status: u16, message: &str) -> Self {
        Self::with_status(status, serde_json::json!({ "error": message }))
    }

    /// Response reporting a dispatch-stage error
    pub fn from_error(error: &Error) -> Self {
        Self::with_status(error.status_code(), error.to_body())
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// Capability implemented by every registered function.
///
/// The handler owns the full response. An `Err` is a fault: the dispatcher
/// logs it and answers 500 without exposing the message.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(
        &self,
        request: FunctionRequest,
        principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse>;
}

/// Adapter turning an async closure into a [`FunctionHandler`]
pub struct HandlerFn<F>(F);

/// Wrap `f` as a function handler
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(FunctionRequest, Option<Principal>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<FunctionResponse>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> FunctionHandler for HandlerFn<F>
where
    F: Fn(FunctionRequest, Option<Principal>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<FunctionResponse>> + Send + 'static,
{
    async fn call(
        &self,
        request: FunctionRequest,
        principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse> {
        (self.0)(request, principal).await
    }
}

/// Registered metadata and handler for one function
#[derive(Clone)]
pub struct FunctionDescriptor {
    handler: Arc<dyn FunctionHandler>,
    requires_auth: bool,
    max_files: Option<u32>,
    required_rights: Option<Rights>,
    body_schema: Option<BodyProperty>,
    response_schema: Option<HashMap<String, BodyProperty>>,
    description: Option<String>,
    tags: Vec<String>,
}

impl FunctionDescriptor {
    /// Create a descriptor requiring authentication
    pub fn new(handler: impl FunctionHandler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            requires_auth: true,
            max_files: None,
            required_rights: None,
            body_schema: None,
            response_schema: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Create a descriptor callable without authentication
    pub fn public(handler: impl FunctionHandler + 'static) -> Self {
        Self::new(handler).with_auth(false)
    }

    #[must_use]
    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    #[must_use]
    pub fn with_max_files(mut self, max_files: u32) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Require `permissions` on `scope`. Repeated calls accumulate.
    #[must_use]
    pub fn with_right<I, S>(mut self, scope: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_rights
            .get_or_insert_with(Rights::new)
            .entry(scope.to_string())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_rights(mut self, rights: Rights) -> Self {
        self.required_rights = Some(rights);
        self
    }

    #[must_use]
    pub fn with_body_schema(mut self, schema: BodyProperty) -> Self {
        self.body_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_response_schema(mut self, status: &str, schema: BodyProperty) -> Self {
        self.response_schema
            .get_or_insert_with(HashMap::new)
            .insert(status.to_string(), schema);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn handler(&self) -> &Arc<dyn FunctionHandler> {
        &self.handler
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn max_files(&self) -> Option<u32> {
        self.max_files
    }

    /// Whether uploads arrive as a `files` array rather than a single `file`
    pub fn accepts_multiple_files(&self) -> bool {
        self.max_files.is_some_and(|max| max > 1)
    }

    pub fn required_rights(&self) -> Option<&Rights> {
        self.required_rights.as_ref()
    }

    pub fn body_schema(&self) -> Option<&BodyProperty> {
        self.body_schema.as_ref()
    }

    pub fn response_schema(&self) -> Option<&HashMap<String, BodyProperty>> {
        self.response_schema.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("requires_auth", &self.requires_auth)
            .field("max_files", &self.max_files)
            .field("required_rights", &self.required_rights)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

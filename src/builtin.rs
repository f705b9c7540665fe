//! Built-in functions served by the `towers` binary

use async_trait::async_trait;
use serde_json::json;

use towers_common::error::Result;
use towers_common::types::{BodyProperty, BodyType, Principal};
use towers_functions::{
    DispatcherBuilder, FunctionDescriptor, FunctionHandler, FunctionRequest, FunctionResponse,
    UploadedFile,
};

/// Files accepted by `upload`
pub const MAX_UPLOAD_FILES: u32 = 5;

/// Register `ping`, `echo`, `whoami`, `upload` and `admin-echo`
///
/// # Errors
/// Fails if any of the names is already registered.
pub fn register(builder: &mut DispatcherBuilder) -> Result<()> {
    builder
        .register(
            "ping",
            FunctionDescriptor::public(Ping)
                .with_description("Liveness check")
                .with_tags(["health"]),
        )?
        .register(
            "echo",
            FunctionDescriptor::public(Echo)
                .with_description("Returns the normalized request")
                .with_tags(["debug"]),
        )?
        .register(
            "whoami",
            FunctionDescriptor::new(WhoAmI)
                .with_description("Returns the authenticated principal")
                .with_response_schema(
                    "200",
                    BodyProperty::object([
                        ("principal", BodyProperty::new(BodyType::String)),
                        ("claims", BodyProperty::new(BodyType::Object)),
                    ]),
                ),
        )?
        .register(
            "upload",
            FunctionDescriptor::new(Upload)
                .with_max_files(MAX_UPLOAD_FILES)
                .with_description("Accepts files and reports their sizes"),
        )?
        .register(
            "admin-echo",
            FunctionDescriptor::new(Echo)
                .with_right("admin", ["write"])
                .with_description("Echo restricted to admin writers"),
        )?;
    Ok(())
}

struct Ping;

#[async_trait]
impl FunctionHandler for Ping {
    async fn call(
        &self,
        _request: FunctionRequest,
        _principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse> {
        Ok(FunctionResponse::ok(json!({ "message": "pong" })))
    }
}

struct Echo;

#[async_trait]
impl FunctionHandler for Echo {
    async fn call(
        &self,
        request: FunctionRequest,
        principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse> {
        Ok(FunctionResponse::ok(json!({
            "function": request.function,
            "method": request.method,
            "body": request.body,
            "query": request.query,
            "files": request.files.iter().map(file_summary).collect::<Vec<_>>(),
            "principal": principal.map(|p| p.id),
        })))
    }
}

struct WhoAmI;

#[async_trait]
impl FunctionHandler for WhoAmI {
    async fn call(
        &self,
        _request: FunctionRequest,
        principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse> {
        let principal = principal.ok_or_else(|| anyhow::anyhow!("whoami invoked without a principal"))?;
        Ok(FunctionResponse::ok(json!({
            "principal": principal.id,
            "claims": principal.claims,
        })))
    }
}

struct Upload;

#[async_trait]
impl FunctionHandler for Upload {
    async fn call(
        &self,
        request: FunctionRequest,
        _principal: Option<Principal>,
    ) -> anyhow::Result<FunctionResponse> {
        if request.files.is_empty() {
            return Ok(FunctionResponse::error(400, "No files uploaded"));
        }
        let total: usize = request.files.iter().map(UploadedFile::size).sum();
        Ok(FunctionResponse::ok(json!({
            "count": request.files.len(),
            "totalBytes": total,
            "files": request.files.iter().map(file_summary).collect::<Vec<_>>(),
        })))
    }
}

fn file_summary(file: &UploadedFile) -> serde_json::Value {
    json!({
        "field": file.field,
        "name": file.file_name,
        "contentType": file.content_type,
        "size": file.size(),
    })
}

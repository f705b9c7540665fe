//! Function routes: normalize the HTTP request, dispatch, write the response

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use tracing::warn;

use towers_common::config::HttpConfig;
use towers_common::error::{Error, Result};
use towers_functions::{Dispatcher, FunctionRequest, FunctionResponse, ResponseBody, UploadedFile};

use crate::form;
use crate::upload::{self, BodyLimits, FilePolicy};

/// Route layout and request limits
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Normalized mount path, `""` for the root
    pub endpoint: String,
    pub manifest_path: Option<String>,
    pub limits: BodyLimits,
}

impl RouteConfig {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            endpoint: config.mount_path(),
            manifest_path: config.manifest_path.clone(),
            limits: BodyLimits {
                body: config.body_limit,
                file: config.upload_limit,
            },
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Register the function routes for `dispatcher`
pub fn configure(
    dispatcher: Arc<Dispatcher>,
    config: RouteConfig,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::from(dispatcher))
            .app_data(web::Data::new(config.limits));

        if let Some(path) = &config.manifest_path {
            cfg.route(path, web::get().to(manifest));
        }

        cfg.service(
            web::scope(&config.endpoint).service(
                web::resource("/{function}")
                    .route(web::post().to(invoke_post))
                    .route(web::get().to(invoke_get))
                    .route(web::method(Method::OPTIONS).to(preflight))
                    .default_service(web::to(not_found)),
            ),
        )
        .default_service(web::to(not_found));
    }
}

async fn invoke_get(
    req: HttpRequest,
    function: web::Path<String>,
    dispatcher: web::Data<Dispatcher>,
) -> HttpResponse {
    let mut request = function_request(&req, function.into_inner());
    request.body = query_body(req.query_string());
    respond(dispatcher.dispatch(request).await)
}

async fn invoke_post(
    req: HttpRequest,
    function: web::Path<String>,
    payload: web::Payload,
    dispatcher: web::Data<Dispatcher>,
    limits: web::Data<BodyLimits>,
) -> HttpResponse {
    let mut request = function_request(&req, function.into_inner());

    // Unknown functions get their 404 without reading the body
    let Ok(descriptor) = dispatcher.registry().get(&request.function) else {
        return respond(dispatcher.dispatch(request).await);
    };
    let policy = FilePolicy::for_max_files(descriptor.max_files());

    match read_post_body(&req, payload, policy, *limits.get_ref()).await {
        Ok((body, files)) => {
            request.body = body;
            request.files = files;
        }
        Err(e) => {
            warn!(function = %request.function, error = %e, "Rejected request body");
            return respond(FunctionResponse::from_error(&e));
        }
    }

    respond(dispatcher.dispatch(request).await)
}

async fn manifest(dispatcher: web::Data<Dispatcher>) -> HttpResponse {
    HttpResponse::Ok().json(dispatcher.manifest())
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().finish()
}

fn function_request(req: &HttpRequest, function: String) -> FunctionRequest {
    let mut request = FunctionRequest::new(function, req.method().as_str());
    request.path = req.path().to_string();
    request.headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    request.query = parse_pairs(req.query_string())
        .unwrap_or_default()
        .into_iter()
        .collect::<HashMap<_, _>>();
    request
}

async fn read_post_body(
    req: &HttpRequest,
    payload: web::Payload,
    policy: FilePolicy,
    limits: BodyLimits,
) -> Result<(serde_json::Value, Vec<UploadedFile>)> {
    let content_type = req.content_type().to_ascii_lowercase();

    if content_type == "multipart/form-data" {
        let body = upload::read_multipart(req.headers(), payload, policy, limits).await?;
        return Ok((serde_json::Value::Object(body.fields), body.files));
    }

    let bytes = upload::read_payload(payload, limits.body).await?;
    let body = if content_type == "application/json" || content_type.ends_with("+json") {
        if bytes.is_empty() {
            empty_object()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| Error::InvalidBody(e.to_string()))?
        }
    } else if content_type == "application/x-www-form-urlencoded" {
        let text = std::str::from_utf8(&bytes).map_err(|e| Error::InvalidBody(e.to_string()))?;
        form::pairs_to_object(parse_pairs(text)?)
    } else {
        empty_object()
    };

    Ok((body, Vec::new()))
}

/// Query string as an invocation body; a malformed query gives an empty body
fn query_body(query: &str) -> serde_json::Value {
    parse_pairs(query).map_or_else(|_| empty_object(), form::pairs_to_object)
}

fn parse_pairs(encoded: &str) -> Result<Vec<(String, String)>> {
    web::Query::<Vec<(String, String)>>::from_query(encoded)
        .map(web::Query::into_inner)
        .map_err(|e| Error::InvalidBody(e.to_string()))
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn respond(response: FunctionResponse) -> HttpResponse {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &response.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    match response.body {
        Some(ResponseBody::Json(body)) => builder.json(body),
        Some(ResponseBody::Bytes(data)) => builder.body(data),
        None => builder.finish(),
    }
}

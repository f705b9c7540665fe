//! CORS headers attached to every response

use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;

pub const ALLOWED_HEADERS: &str = "Authorization, X-API-KEY, Origin, X-Requested-With, Content-Type, Accept, Access-Control-Allow-Request-Method";
pub const ALLOWED_METHODS: &str = "GET, POST";

/// Middleware adding the CORS headers for `allow_origin`
pub fn headers(allow_origin: &str) -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.to_string()))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS))
        .add((header::ALLOW, ALLOWED_METHODS))
}

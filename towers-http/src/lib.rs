//! Towers HTTP Transport
//!
//! Serves a [`Dispatcher`](towers_functions::Dispatcher) over actix-web:
//! - `GET|POST <endpoint>/{function}` routed to dispatch
//! - JSON, form and multipart bodies normalized into the invocation body
//! - CORS headers on every response
//! - Plain HTTP plus optional HTTPS (rustls) listeners

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cors;
pub mod form;
pub mod routes;
pub mod server;
pub mod tls;
pub mod upload;

pub use actix_web::dev::ServerHandle;
pub use routes::RouteConfig;
pub use server::{FunctionsServer, StartCallback};

//! Towers: named server functions over HTTP
//!
//! Register functions on a [`DispatcherBuilder`](functions::DispatcherBuilder),
//! hand it to [`TowersServer`] and every function is reachable at
//! `<endpoint>/<name>` behind the authentication and rights hooks.
//!
//! # Features
//!
//! - **Registry** - one-time registration of named functions with metadata
//! - **Hooks** - pluggable authentication and authorization, injected per server
//! - **Dispatch** - lookup, authentication, rights check and invocation with a fixed status contract
//! - **Transport** - JSON, form and multipart bodies, CORS headers, HTTP and HTTPS listeners
//! - **Built-in auth** - API keys and HS256 bearer tokens from configuration

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use towers_auth as auth;
pub use towers_common as common;
pub use towers_functions as functions;
pub use towers_http as http;

pub mod builtin;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

use towers_auth::{ApiKeyAuthenticator, JwtAuthenticator, RightsAuthorizer};
use towers_common::config::{AuthConfig, TowersConfig};
use towers_common::error::{Error, Result};
use towers_functions::{Dispatcher, DispatcherBuilder};
use towers_http::{FunctionsServer, ServerHandle};

/// Main towers server
pub struct TowersServer {
    config: TowersConfig,
    dispatcher: Arc<Dispatcher>,
    /// Listeners started by `run`, stopped by `shutdown`
    handles: Arc<Mutex<Vec<ServerHandle>>>,
}

impl TowersServer {
    /// Create a server from configuration and the registered functions
    ///
    /// Hooks configured under `auth` are installed unless the builder already
    /// carries its own.
    ///
    /// # Errors
    /// Returns an error if the auth configuration is contradictory or the
    /// strict hook check fails.
    pub fn new(config: TowersConfig, mut builder: DispatcherBuilder) -> Result<Self> {
        info!("Initializing towers");

        install_configured_hooks(&config.auth, &mut builder)?;
        builder.strict_hooks(config.server.strict_hooks);
        let dispatcher = Arc::new(builder.build()?);

        info!("Registered functions: {}", dispatcher.list().join(", "));

        Ok(Self {
            config,
            dispatcher,
            handles: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    #[must_use]
    pub fn config(&self) -> &TowersConfig {
        &self.config
    }

    /// HTTP transport for this server, for attaching start callbacks
    #[must_use]
    pub fn http(&self) -> FunctionsServer {
        FunctionsServer::new(self.config.clone(), self.dispatcher.clone())
    }

    /// Whether `run` has listeners up
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    /// Serve until the listeners stop
    ///
    /// # Errors
    /// Returns an error if a listener cannot be bound.
    pub async fn run(&self) -> Result<()> {
        info!("Starting towers");
        let http_handles = self.handles.clone();
        let https_handles = self.handles.clone();

        let result = self
            .http()
            .on_http_start(move |handle| http_handles.lock().push(handle.clone()))
            .on_https_start(move |handle| https_handles.lock().push(handle.clone()))
            .run()
            .await;

        self.handles.lock().clear();
        result
    }

    /// Stop every listener started by `run`, letting in-flight requests finish
    ///
    /// # Errors
    /// Returns an error if shutdown fails.
    pub async fn shutdown(&self) -> Result<()> {
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            info!("Towers is not running");
            return Ok(());
        }

        info!("Shutting down towers ({} listeners)", handles.len());
        for handle in handles {
            handle.stop(true).await;
        }
        Ok(())
    }
}

fn install_configured_hooks(auth: &AuthConfig, builder: &mut DispatcherBuilder) -> Result<()> {
    if auth.jwt.is_some() && !auth.api_keys.is_empty() {
        return Err(Error::ConfigError(
            "configure either auth.jwt or auth.api_keys, not both".into(),
        ));
    }
    if builder.has_authenticator() {
        if auth.jwt.is_some() || !auth.api_keys.is_empty() {
            info!("Authentication hook already installed, ignoring auth configuration");
        }
        return Ok(());
    }

    if let Some(jwt) = &auth.jwt {
        info!("Using bearer token authentication");
        builder.set_authenticator(JwtAuthenticator::from_config(jwt));
    } else if !auth.api_keys.is_empty() {
        info!("Using API key authentication ({} keys)", auth.api_keys.len());
        builder.set_authenticator(ApiKeyAuthenticator::from_config(&auth.api_keys));
    } else {
        return Ok(());
    }

    if !builder.has_authorizer() {
        builder.set_authorizer(RightsAuthorizer);
    }
    Ok(())
}

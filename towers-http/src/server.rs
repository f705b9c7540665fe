//! HTTP/HTTPS server for towers functions

use std::sync::Arc;

use actix_web::dev::{Server, ServerHandle};
use actix_web::{middleware, App, HttpServer};
use tracing::{error, info};

use towers_common::config::TowersConfig;
use towers_common::error::Result;
use towers_functions::Dispatcher;

use crate::cors;
use crate::routes::{self, RouteConfig};
use crate::tls;

/// Called once a listener is bound, with the handle that can stop it
pub type StartCallback = Box<dyn FnOnce(&ServerHandle) + Send>;

/// Functions HTTP server
pub struct FunctionsServer {
    config: TowersConfig,
    dispatcher: Arc<Dispatcher>,
    on_http_start: Option<StartCallback>,
    on_https_start: Option<StartCallback>,
}

impl FunctionsServer {
    /// Create a new functions server
    pub fn new(config: TowersConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            on_http_start: None,
            on_https_start: None,
        }
    }

    /// Run `callback` once the HTTP listener is bound
    #[must_use]
    pub fn on_http_start(mut self, callback: impl FnOnce(&ServerHandle) + Send + 'static) -> Self {
        self.on_http_start = Some(Box::new(callback));
        self
    }

    /// Run `callback` once the HTTPS listener is bound
    #[must_use]
    pub fn on_https_start(mut self, callback: impl FnOnce(&ServerHandle) + Send + 'static) -> Self {
        self.on_https_start = Some(Box::new(callback));
        self
    }

    /// Get the functions endpoint URL
    pub fn endpoint_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.config.server.host,
            self.config.server.port,
            self.config.server.mount_path()
        )
    }

    /// Serve until every listener stops
    ///
    /// HTTPS is served next to HTTP when configured. A TLS setup or HTTPS
    /// bind failure is logged and the server carries on with HTTP only.
    ///
    /// # Errors
    /// Returns an error if a listener cannot be bound or fails while serving.
    pub async fn run(self) -> Result<()> {
        let server = &self.config.server;
        let dispatcher = self.dispatcher.clone();
        let route_config = RouteConfig::from_config(server);
        let allow_origin = server.allow_origin.clone();

        let factory = move || {
            App::new()
                .wrap(cors::headers(&allow_origin))
                .wrap(middleware::Logger::default())
                .configure(routes::configure(dispatcher.clone(), route_config.clone()))
        };

        let http = HttpServer::new(factory.clone())
            .workers(server.workers)
            .bind((server.host.as_str(), server.port))?
            .run();
        info!(
            "Functions available at {} ({} registered)",
            self.endpoint_url(),
            self.dispatcher.registry().len()
        );
        info!("SERVER_PID={}", std::process::id());
        if let Some(callback) = self.on_http_start {
            callback(&http.handle());
        }

        let https = match &self.config.tls {
            Some(tls_config) => match tls::load_server_config(tls_config) {
                Ok(rustls_config) => match HttpServer::new(factory)
                    .workers(server.workers)
                    .bind_rustls_0_23((server.host.as_str(), tls_config.port), rustls_config)
                {
                    Ok(bound) => {
                        let https: Server = bound.run();
                        info!("HTTPS listening on {}:{}", server.host, tls_config.port);
                        if let Some(callback) = self.on_https_start {
                            callback(&https.handle());
                        }
                        Some(https)
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            port = tls_config.port,
                            "Could not bind HTTPS, serving HTTP only"
                        );
                        None
                    }
                },
                Err(e) => {
                    error!(error = %e, "Could not start HTTPS, serving HTTP only");
                    None
                }
            },
            None => None,
        };

        match https {
            Some(https) => {
                futures::future::try_join(http, https).await?;
            }
            None => http.await?,
        }

        info!("Functions server stopped");
        Ok(())
    }
}

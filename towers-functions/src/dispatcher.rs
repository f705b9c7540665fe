//! Per-invocation dispatch pipeline
//!
//! Every invocation runs the same sequence: resolve the descriptor,
//! authenticate when the function requires it, check rights when it declares
//! some, then hand the request to the function's handler. Each stage that
//! fails ends the invocation with its own status:
//!
//! | Stage | Failure | Status |
//! |---|---|---|
//! | resolve | unknown name | 404 |
//! | authenticate | no principal | 401 |
//! | authorize | denial reason | 403 |
//! | invoke | handler error or panic | 500 |

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use towers_common::error::{Error, Result};
use towers_common::types::Principal;

use crate::function::{FunctionDescriptor, FunctionRequest, FunctionResponse};
use crate::hooks::{AllowAllAuthorizer, AnonymousAuthenticator, Authenticator, Authorizer};
use crate::manifest::{self, FunctionInfo};
use crate::registry::FunctionRegistry;

/// Denial reason used when an authorizer denies with an empty string
const DEFAULT_DENIAL: &str = "Forbidden";

/// Routes invocations to registered functions through the hooks.
///
/// Built once by [`DispatcherBuilder`] and then shared read-only, usually
/// as `Arc<Dispatcher>`.
pub struct Dispatcher {
    registry: FunctionRegistry,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Names of all registered functions
    pub fn list(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Metadata of all registered functions
    pub fn manifest(&self) -> Vec<FunctionInfo> {
        manifest::build(&self.registry)
    }

    /// Run one invocation and always produce a response.
    ///
    /// Stage failures become their JSON error responses; faults are logged
    /// and reported as 500.
    pub async fn dispatch(&self, request: FunctionRequest) -> FunctionResponse {
        let span = info_span!(
            "invoke",
            function = %request.function,
            invocation = %Uuid::new_v4(),
        );

        async move {
            let start = Instant::now();
            let response = match self.try_dispatch(request).await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_internal() {
                        error!(error = %e, "Invocation failed");
                    }
                    FunctionResponse::from_error(&e)
                }
            };
            debug!(
                status = response.status,
                elapsed = ?start.elapsed(),
                "Invocation finished"
            );
            response
        }
        .instrument(span)
        .await
    }

    /// Run one invocation, returning the failing stage as an error.
    ///
    /// # Errors
    /// `FunctionNotFound`, `Unauthorized`, `Forbidden` for the gated stages,
    /// `HandlerFault` when a hook or the handler fails.
    pub async fn try_dispatch(&self, request: FunctionRequest) -> Result<FunctionResponse> {
        let descriptor = self.registry.get(&request.function).map_err(|e| {
            debug!("Rejected invocation of unknown function");
            e
        })?;

        let principal = if descriptor.requires_auth() {
            Some(self.admit(descriptor, &request).await?)
        } else {
            None
        };

        invoke(descriptor, request, principal).await
    }

    /// Authenticate, then check rights when the descriptor declares any
    async fn admit(
        &self,
        descriptor: &FunctionDescriptor,
        request: &FunctionRequest,
    ) -> Result<Principal> {
        let principal = self
            .authenticator
            .authenticate(request)
            .await
            .map_err(|e| hook_fault("authentication", &e))?
            .ok_or(Error::Unauthorized)?;

        if let Some(rights) = descriptor.required_rights() {
            let denial = self
                .authorizer
                .check_rights(&principal, rights, request)
                .await
                .map_err(|e| hook_fault("authorization", &e))?;

            if let Some(reason) = denial {
                let reason = if reason.is_empty() {
                    DEFAULT_DENIAL.to_string()
                } else {
                    reason
                };
                warn!(
                    principal = %principal.id,
                    reason = %reason,
                    "Principal does not have rights for function"
                );
                return Err(Error::Forbidden(reason));
            }
        }

        Ok(principal)
    }
}

async fn invoke(
    descriptor: &FunctionDescriptor,
    request: FunctionRequest,
    principal: Option<Principal>,
) -> Result<FunctionResponse> {
    let call = descriptor.handler().call(request, principal);
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(Error::HandlerFault(format!("{e:#}"))),
        Err(panic) => Err(Error::HandlerFault(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn hook_fault(hook: &str, e: &anyhow::Error) -> Error {
    Error::HandlerFault(format!("{hook} hook failed: {e:#}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Startup-phase builder: functions are registered and hooks installed here,
/// before the dispatcher starts serving.
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: FunctionRegistry,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    strict_hooks: bool,
}

impl DispatcherBuilder {
    /// Register a function
    ///
    /// # Errors
    /// See [`FunctionRegistry::register`].
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: FunctionDescriptor,
    ) -> Result<&mut Self> {
        self.registry.register(name, descriptor)?;
        Ok(self)
    }

    /// Install the authenticator, replacing any previous one
    pub fn set_authenticator(&mut self, authenticator: impl Authenticator + 'static) -> &mut Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Install the authorizer, replacing any previous one
    pub fn set_authorizer(&mut self, authorizer: impl Authorizer + 'static) -> &mut Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    /// Fail `build` instead of falling back to the default hooks
    pub fn strict_hooks(&mut self, strict: bool) -> &mut Self {
        self.strict_hooks = strict;
        self
    }

    pub fn has_authenticator(&self) -> bool {
        self.authenticator.is_some()
    }

    pub fn has_authorizer(&self) -> bool {
        self.authorizer.is_some()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Freeze the registry and hooks into a dispatcher
    ///
    /// # Errors
    /// `MissingHook` in strict mode when a registered function needs a hook
    /// that was never installed.
    pub fn build(self) -> Result<Dispatcher> {
        let needs_authentication = self
            .registry
            .iter()
            .any(|(_, descriptor)| descriptor.requires_auth());
        let needs_authorization = self.registry.iter().any(|(_, descriptor)| {
            descriptor.requires_auth() && descriptor.required_rights().is_some()
        });

        let authenticator: Arc<dyn Authenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None => {
                check_default("authentication", needs_authentication, self.strict_hooks)?;
                Arc::new(AnonymousAuthenticator)
            }
        };
        let authorizer: Arc<dyn Authorizer> = match self.authorizer {
            Some(authorizer) => authorizer,
            None => {
                check_default("authorization", needs_authorization, self.strict_hooks)?;
                Arc::new(AllowAllAuthorizer)
            }
        };

        Ok(Dispatcher {
            registry: self.registry,
            authenticator,
            authorizer,
        })
    }
}

fn check_default(hook: &'static str, needed: bool, strict: bool) -> Result<()> {
    if !needed {
        return Ok(());
    }
    if strict {
        return Err(Error::MissingHook(hook));
    }
    warn!(
        hook,
        "No {} hook installed, registered functions will use the insecure default", hook
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use towers_common::types::Rights;

    use crate::function::handler_fn;

    struct AlwaysPrincipal {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Authenticator for AlwaysPrincipal {
        async fn authenticate(&self, _request: &FunctionRequest) -> anyhow::Result<Option<Principal>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Principal::new(format!("user-{n}"))))
        }
    }

    struct Deny(&'static str);

    #[async_trait]
    impl Authorizer for Deny {
        async fn check_rights(
            &self,
            _principal: &Principal,
            _rights: &Rights,
            _request: &FunctionRequest,
        ) -> anyhow::Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Authenticator for Broken {
        async fn authenticate(&self, _request: &FunctionRequest) -> anyhow::Result<Option<Principal>> {
            anyhow::bail!("identity provider unreachable")
        }
    }

    fn echo_principal() -> FunctionDescriptor {
        FunctionDescriptor::new(handler_fn(|req, principal: Option<Principal>| async move {
            Ok(FunctionResponse::ok(serde_json::json!({
                "function": req.function,
                "principal": principal.map(|p| p.id),
            })))
        }))
    }

    fn always_principal() -> (AlwaysPrincipal, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            AlwaysPrincipal {
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_unknown_function_is_404() {
        let dispatcher = Dispatcher::builder().build().unwrap();
        let response = dispatcher.dispatch(FunctionRequest::new("ghost", "POST")).await;

        assert_eq!(response.status, 404);
        assert_eq!(
            response.json(),
            Some(&serde_json::json!({"error": "Function not found: ghost"}))
        );
    }

    #[tokio::test]
    async fn test_default_authenticator_yields_401() {
        let mut builder = Dispatcher::builder();
        builder.register("secure", echo_principal()).unwrap();
        let dispatcher = builder.build().unwrap();

        let request = FunctionRequest::new("secure", "POST")
            .with_header("Authorization", "Bearer anything")
            .with_body(serde_json::json!({"user": "admin"}));
        let response = dispatcher.dispatch(request).await;

        assert_eq!(response.status, 401);
        assert_eq!(response.json(), Some(&serde_json::json!({"error": "Unauthorized"})));
    }

    #[tokio::test]
    async fn test_denied_rights_yield_403_with_reason() {
        let (authenticator, _) = always_principal();
        let mut builder = Dispatcher::builder();
        builder
            .register("admin", echo_principal().with_right("admin", ["write"]))
            .unwrap();
        builder
            .set_authenticator(authenticator)
            .set_authorizer(Deny("insufficient"));
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("admin", "POST")).await;
        assert_eq!(response.status, 403);
        assert_eq!(response.json(), Some(&serde_json::json!({"error": "insufficient"})));
    }

    #[tokio::test]
    async fn test_empty_denial_still_denies() {
        let (authenticator, _) = always_principal();
        let mut builder = Dispatcher::builder();
        builder
            .register("admin", echo_principal().with_right("admin", ["write"]))
            .unwrap();
        builder.set_authenticator(authenticator).set_authorizer(Deny(""));
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("admin", "GET")).await;
        assert_eq!(response.status, 403);
        assert_eq!(response.json(), Some(&serde_json::json!({"error": "Forbidden"})));
    }

    #[tokio::test]
    async fn test_rights_skipped_without_declared_rights() {
        let (authenticator, _) = always_principal();
        let mut builder = Dispatcher::builder();
        builder.register("me", echo_principal()).unwrap();
        builder
            .set_authenticator(authenticator)
            .set_authorizer(Deny("never consulted"));
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("me", "GET")).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.json(),
            Some(&serde_json::json!({"function": "me", "principal": "user-0"}))
        );
    }

    #[tokio::test]
    async fn test_public_function_skips_hooks_and_passes_response_through() {
        let (authenticator, calls) = always_principal();
        let mut builder = Dispatcher::builder();
        builder
            .register(
                "teapot",
                FunctionDescriptor::public(handler_fn(|_req, principal: Option<Principal>| async move {
                    assert!(principal.is_none());
                    Ok(FunctionResponse::with_status(418, serde_json::json!(["short", "stout"]))
                        .with_header("x-brew", "earl-grey"))
                }))
                .with_right("admin", ["write"]),
            )
            .unwrap();
        builder
            .set_authenticator(authenticator)
            .set_authorizer(Deny("never consulted"));
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("teapot", "GET")).await;
        assert_eq!(response.status, 418);
        assert_eq!(response.json(), Some(&serde_json::json!(["short", "stout"])));
        assert_eq!(response.headers["x-brew"], "earl-grey");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_function_without_any_hooks() {
        let mut builder = Dispatcher::builder();
        builder
            .register(
                "ping",
                FunctionDescriptor::public(handler_fn(|_req, _p| async {
                    Ok(FunctionResponse::ok(serde_json::json!({"pong": true})))
                })),
            )
            .unwrap();
        builder.strict_hooks(true);
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("ping", "GET")).await;
        assert_eq!(response, FunctionResponse::ok(serde_json::json!({"pong": true})));
    }

    #[tokio::test]
    async fn test_handler_error_is_500_without_details() {
        let mut builder = Dispatcher::builder();
        builder
            .register(
                "fail",
                FunctionDescriptor::public(handler_fn(|_req, _p| async {
                    Err(anyhow::anyhow!("connection string postgres://secret"))
                })),
            )
            .unwrap();
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("fail", "POST")).await;
        assert_eq!(response.status, 500);
        assert_eq!(
            response.json(),
            Some(&serde_json::json!({"error": "Internal server error"}))
        );

        let err = dispatcher
            .try_dispatch(FunctionRequest::new("fail", "POST"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("postgres://secret"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_500() {
        let mut builder = Dispatcher::builder();
        builder
            .register(
                "explode",
                FunctionDescriptor::public(handler_fn(|_req, _p| async {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(FunctionResponse::empty(204))
                })),
            )
            .unwrap();
        let dispatcher = builder.build().unwrap();

        let err = dispatcher
            .try_dispatch(FunctionRequest::new("explode", "POST"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandlerFault(ref m) if m.contains("kaboom")));
    }

    #[tokio::test]
    async fn test_authenticator_fault_is_500() {
        let mut builder = Dispatcher::builder();
        builder.register("secure", echo_principal()).unwrap();
        builder.set_authenticator(Broken);
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(FunctionRequest::new("secure", "POST")).await;
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_strict_hooks_require_authenticator() {
        let mut builder = Dispatcher::builder();
        builder.register("secure", echo_principal()).unwrap();
        builder.strict_hooks(true);

        assert!(matches!(
            builder.build(),
            Err(Error::MissingHook("authentication"))
        ));
    }

    #[test]
    fn test_strict_hooks_require_authorizer_for_rights() {
        let (authenticator, _) = always_principal();
        let mut builder = Dispatcher::builder();
        builder
            .register("admin", echo_principal().with_right("admin", ["write"]))
            .unwrap();
        builder.set_authenticator(authenticator).strict_hooks(true);

        assert!(matches!(
            builder.build(),
            Err(Error::MissingHook("authorization"))
        ));
    }

    #[test]
    fn test_list_after_registrations() {
        let mut builder = Dispatcher::builder();
        for i in 0..5 {
            builder.register(format!("fn-{i}"), echo_principal()).unwrap();
        }
        assert!(builder.register("fn-0", echo_principal()).is_err());
        let dispatcher = builder.build().unwrap();

        let first = dispatcher.list();
        assert_eq!(first.len(), 5);
        assert_eq!(first, dispatcher.list());
    }

    #[tokio::test]
    async fn test_different_functions_do_not_block_each_other() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut builder = Dispatcher::builder();
        for name in ["left", "right"] {
            let barrier = barrier.clone();
            builder
                .register(
                    name,
                    FunctionDescriptor::public(handler_fn(move |req, _p| {
                        let barrier = barrier.clone();
                        async move {
                            barrier.wait().await;
                            Ok(FunctionResponse::ok(serde_json::json!(req.function)))
                        }
                    })),
                )
                .unwrap();
        }
        let dispatcher = Arc::new(builder.build().unwrap());

        let (left, right) = tokio::time::timeout(
            Duration::from_secs(5),
            futures::future::join(
                dispatcher.dispatch(FunctionRequest::new("left", "GET")),
                dispatcher.dispatch(FunctionRequest::new("right", "GET")),
            ),
        )
        .await
        .expect("invocations blocked each other");

        assert_eq!(left.json(), Some(&serde_json::json!("left")));
        assert_eq!(right.json(), Some(&serde_json::json!("right")));
    }

    #[tokio::test]
    async fn test_same_function_runs_full_pipeline_per_invocation() {
        let (authenticator, calls) = always_principal();
        let mut builder = Dispatcher::builder();
        builder.register("me", echo_principal()).unwrap();
        builder.set_authenticator(authenticator);
        let dispatcher = Arc::new(builder.build().unwrap());

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(FunctionRequest::new("me", "GET")).await })
            })
            .collect();

        let mut principals = Vec::new();
        for task in tasks {
            let response = task.await.unwrap();
            assert_eq!(response.status, 200);
            principals.push(response.json().unwrap()["principal"].clone());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(principals[0], principals[1]);
    }
}

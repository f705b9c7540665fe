//! Authentication and authorization hooks

use async_trait::async_trait;
use tracing::warn;

use towers_common::types::{Principal, Rights};

use crate::function::FunctionRequest;

/// Resolves the principal behind a request.
///
/// `Ok(None)` means "not authenticated" and is not an error. `Err` is kept
/// for internal faults (the dispatcher answers 500).
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &FunctionRequest) -> anyhow::Result<Option<Principal>>;
}

/// Checks a principal against the rights a function requires.
///
/// `Ok(None)` allows the call; `Ok(Some(reason))` denies it and the reason
/// is returned to the caller verbatim.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn check_rights(
        &self,
        principal: &Principal,
        rights: &Rights,
        request: &FunctionRequest,
    ) -> anyhow::Result<Option<String>>;
}

/// Used when no authenticator is installed: never resolves a principal
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, request: &FunctionRequest) -> anyhow::Result<Option<Principal>> {
        warn!(
            function = %request.function,
            "Using default authenticator, every caller is anonymous. Install a custom authenticator"
        );
        Ok(None)
    }
}

/// Used when no authorizer is installed: allows everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn check_rights(
        &self,
        _principal: &Principal,
        _rights: &Rights,
        request: &FunctionRequest,
    ) -> anyhow::Result<Option<String>> {
        warn!(
            function = %request.function,
            "Using default rights check, all rights are granted. Install a custom authorizer"
        );
        Ok(None)
    }
}

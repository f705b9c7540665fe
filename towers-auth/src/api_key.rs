//! Static API key authentication

use std::collections::HashMap;

use async_trait::async_trait;

use towers_common::config::ApiKeyConfig;
use towers_common::types::Principal;
use towers_functions::{Authenticator, FunctionRequest};

use crate::RIGHTS_CLAIM;

/// Resolves principals from a fixed table of API keys.
///
/// The key is read from `X-API-KEY`, or from `Authorization: ApiKey <key>`.
#[derive(Debug, Default)]
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, Principal>,
}

impl ApiKeyAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured keys; granted rights become the `rights` claim
    pub fn from_config(keys: &HashMap<String, ApiKeyConfig>) -> Self {
        let keys = keys
            .iter()
            .map(|(key, entry)| {
                let principal = Principal::new(&entry.principal)
                    .with_claims(serde_json::json!({ RIGHTS_CLAIM: entry.rights }));
                (key.clone(), principal)
            })
            .collect();
        Self { keys }
    }

    /// Grant `principal` to callers presenting `key`
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>, principal: Principal) -> Self {
        self.keys.insert(key.into(), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn presented_key(request: &FunctionRequest) -> Option<&str> {
    request.header("x-api-key").or_else(|| {
        request
            .header("authorization")
            .and_then(|value| value.strip_prefix("ApiKey "))
    })
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &FunctionRequest) -> anyhow::Result<Option<Principal>> {
        Ok(presented_key(request)
            .map(str::trim)
            .and_then(|key| self.keys.get(key))
            .cloned())
    }
}

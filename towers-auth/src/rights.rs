//! Rights checks against the principal's granted rights

use async_trait::async_trait;

use towers_common::types::{Principal, Rights};
use towers_functions::{Authorizer, FunctionRequest};

use crate::RIGHTS_CLAIM;

/// Wildcard granting every permission of a scope, or every scope
const WILDCARD: &str = "*";

/// Grants a call when the principal's `rights` claim covers every required
/// (scope, permission) pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct RightsAuthorizer;

impl RightsAuthorizer {
    /// First required permission the principal lacks, as a denial reason
    pub fn missing(principal: &Principal, required: &Rights) -> Option<String> {
        let granted = principal.claim(RIGHTS_CLAIM);

        for (scope, permissions) in required {
            for permission in permissions {
                if !is_granted(granted, scope, permission) {
                    return Some(format!("Missing permission '{permission}' on '{scope}'"));
                }
            }
        }
        None
    }
}

fn is_granted(granted: Option<&serde_json::Value>, scope: &str, permission: &str) -> bool {
    let Some(granted) = granted.and_then(serde_json::Value::as_object) else {
        return false;
    };

    [scope, WILDCARD]
        .iter()
        .filter_map(|key| granted.get(*key))
        .filter_map(serde_json::Value::as_array)
        .flatten()
        .filter_map(serde_json::Value::as_str)
        .any(|have| have == WILDCARD || have == permission)
}

#[async_trait]
impl Authorizer for RightsAuthorizer {
    async fn check_rights(
        &self,
        principal: &Principal,
        rights: &Rights,
        _request: &FunctionRequest,
    ) -> anyhow::Result<Option<String>> {
        Ok(Self::missing(principal, rights))
    }
}

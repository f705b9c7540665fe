//! HS256 bearer token authentication

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use towers_common::config::JwtConfig;
use towers_common::types::Principal;
use towers_functions::{Authenticator, FunctionRequest};

/// Resolves principals from `Authorization: Bearer <jwt>`.
///
/// The principal id is the `sub` claim and the decoded token becomes its
/// claims. Invalid, expired or subject-less tokens mean "not authenticated".
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, issuer: Option<&str>, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(&config.secret, config.issuer.as_deref(), &config.audience)
    }

    fn validate(&self, token: &str) -> Option<Principal> {
        let claims = match decode::<serde_json::Value>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Rejected bearer token");
                return None;
            }
        };

        let subject = claims.get("sub")?.as_str()?.to_string();
        Some(Principal::new(subject).with_claims(claims))
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, request: &FunctionRequest) -> anyhow::Result<Option<Principal>> {
        Ok(request.bearer_token().and_then(|token| self.validate(token)))
    }
}

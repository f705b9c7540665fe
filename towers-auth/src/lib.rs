//! Towers Authentication
//!
//! Ready-made hooks for the function dispatcher:
//! - Static API keys (`X-API-KEY` header)
//! - HS256 bearer tokens
//! - Rights checks against the principal's `rights` claim

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api_key;
pub mod jwt;
pub mod rights;

pub use api_key::ApiKeyAuthenticator;
pub use jwt::JwtAuthenticator;
pub use rights::RightsAuthorizer;

/// Claim holding granted rights, scope to permission list
pub const RIGHTS_CLAIM: &str = "rights";

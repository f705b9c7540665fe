//! Shared types for towers

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Required rights: scope name to the set of permissions needed on it
pub type Rights = BTreeMap<String, BTreeSet<String>>;

/// Authenticated identity resolved for one request.
///
/// Only `id` is read by the dispatcher (for the denial warning). `claims`
/// is free-form and belongs to the hooks and handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub claims: serde_json::Value,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claims: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_claims(mut self, claims: serde_json::Value) -> Self {
        self.claims = claims;
        self
    }

    /// Look up a single claim
    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.get(key)
    }
}

/// JSON schema type of a body property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    Object,
    String,
    Number,
    Boolean,
    Array,
    File,
}

/// Descriptive schema of a request or response body.
///
/// Used for documentation only, never validated by dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyProperty {
    #[serde(rename = "type")]
    pub kind: BodyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<BodyProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, BodyProperty>>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BodyProperty {
    pub fn new(kind: BodyType) -> Self {
        Self {
            kind,
            items: None,
            properties: None,
            enumeration: None,
            required: None,
            default: None,
            additional_properties: None,
            example: None,
            format: None,
            description: None,
        }
    }

    /// Object schema with the given properties
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, BodyProperty)>,
        K: Into<String>,
    {
        let mut property = Self::new(BodyType::Object);
        property.properties = Some(
            properties
                .into_iter()
                .map(|(name, prop)| (name.into(), prop))
                .collect(),
        );
        property
    }

    /// Array schema of `items`
    pub fn array(items: BodyProperty) -> Self {
        let mut property = Self::new(BodyType::Array);
        property.items = Some(Box::new(items));
        property
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_required<I, S>(mut self, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = Some(required.into_iter().map(Into::into).collect());
        self
    }
}

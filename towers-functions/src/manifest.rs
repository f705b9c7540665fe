//! Serializable description of registered functions

use std::collections::HashMap;

use serde::Serialize;

use towers_common::types::{BodyProperty, Rights};

use crate::function::FunctionDescriptor;
use crate::registry::FunctionRegistry;

/// Public metadata of one function
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    pub name: String,
    pub auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rights: Option<Rights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_schema: Option<BodyProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<HashMap<String, BodyProperty>>,
}

impl FunctionInfo {
    pub fn new(name: &str, descriptor: &FunctionDescriptor) -> Self {
        Self {
            name: name.to_string(),
            auth: descriptor.requires_auth(),
            max_files: descriptor.max_files(),
            rights: descriptor.required_rights().cloned(),
            description: descriptor.description().map(str::to_string),
            tags: descriptor.tags().to_vec(),
            body_schema: descriptor.body_schema().cloned(),
            response_schema: descriptor.response_schema().cloned(),
        }
    }
}

/// Metadata of every function in `registry`, sorted by name
pub fn build(registry: &FunctionRegistry) -> Vec<FunctionInfo> {
    let mut manifest: Vec<FunctionInfo> = registry
        .iter()
        .map(|(name, descriptor)| FunctionInfo::new(name, descriptor))
        .collect();
    manifest.sort_by(|a, b| a.name.cmp(&b.name));
    manifest
}

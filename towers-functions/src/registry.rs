//! Function registry

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use towers_common::error::{Error, Result};

use crate::function::FunctionDescriptor;

/// Registered functions by name.
///
/// Registration needs `&mut self`, so once the registry is shared behind an
/// `Arc` it can only be read.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<FunctionDescriptor>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under `name`
    ///
    /// # Errors
    /// `DuplicateFunction` if the name is taken (the existing entry is kept),
    /// `InvalidDescriptor` if the name cannot appear in a route or
    /// `max_files` is zero.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: FunctionDescriptor,
    ) -> Result<()> {
        let name = name.into();
        validate(&name, &descriptor)?;

        match self.functions.entry(name) {
            Entry::Occupied(entry) => Err(Error::DuplicateFunction(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    /// Get a registered function
    ///
    /// # Errors
    /// `FunctionNotFound` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<&Arc<FunctionDescriptor>> {
        self.functions
            .get(name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))
    }

    /// Names of all registered functions, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<FunctionDescriptor>)> {
        self.functions
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }
}

fn validate(name: &str, descriptor: &FunctionDescriptor) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidDescriptor("function name is empty".into()));
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidDescriptor(format!(
            "function name '{name}' must be a single path segment"
        )));
    }
    if descriptor.max_files() == Some(0) {
        return Err(Error::InvalidDescriptor(format!(
            "max_files of '{name}' must be positive"
        )));
    }
    Ok(())
}

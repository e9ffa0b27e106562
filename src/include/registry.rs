//! In-memory include resolvers

use std::collections::HashMap;

use super::{normalize_relative, IncludeResolver, Resolved, SandboxError};

/// Includes served from a fixed name to content map
#[derive(Debug, Clone, Default)]
pub struct MemoryIncludes {
    files: HashMap<String, String>,
}

impl MemoryIncludes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, path: &str, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Register `content` under `path`; the path is normalised like a lookup
    pub fn insert(&mut self, path: &str, content: impl Into<String>) {
        let key = normalize_relative(path).unwrap_or_else(|_| path.to_string());
        self.files.insert(key, content.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IncludeResolver for MemoryIncludes {
    fn resolve(&self, path: &str) -> Result<Resolved, SandboxError> {
        let key = normalize_relative(path)?;
        match self.files.get(&key) {
            Some(content) => Ok(Resolved {
                key,
                content: content.clone(),
            }),
            None => Err(SandboxError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

/// Resolver for engines without a sandbox root: every include is refused
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&self, path: &str) -> Result<Resolved, SandboxError> {
        Err(SandboxError::Disabled {
            path: path.to_string(),
        })
    }
}

//! Include resolution
//!
//! An [`IncludeResolver`] turns the relative path written in an
//! `[% include "..." %]` directive into template source. The filesystem
//! resolver is confined to a sandbox root; the in-memory resolvers serve
//! embedded templates and engines configured without a root.
//!
//! Error messages only ever repeat the path as the template author wrote it.

mod registry;
mod sandbox;

use std::path::{Component, Path};

use thiserror::Error;

pub use registry::{MemoryIncludes, NoIncludes};
pub use sandbox::FsSandbox;

/// Content of a resolved include
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Stable identity of the included file, used for cycle detection
    pub key: String,
    pub content: String,
}

/// Source of included template content
pub trait IncludeResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<Resolved, SandboxError>;
}

/// Include resolution failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("include path must be a non-empty relative path: {path}")]
    InvalidPath { path: String },

    #[error("include path escapes the sandbox: {path}")]
    Escape { path: String },

    #[error("include not found: {path}")]
    NotFound { path: String },

    #[error("include is not a regular file: {path}")]
    NotAFile { path: String },

    #[error("include exceeds the {limit} byte limit: {path}")]
    TooLarge { path: String, limit: u64 },

    #[error("include read timed out: {path}")]
    Timeout { path: String },

    #[error("include is not valid UTF-8: {path}")]
    NotUtf8 { path: String },

    #[error("include could not be read: {path}")]
    Unreadable { path: String },

    #[error("includes are disabled: {path}")]
    Disabled { path: String },
}

/// Lexically normalise an include path into `/`-separated components.
///
/// Rejects empty paths, NUL bytes, absolute or prefixed paths, and any
/// `..` that would climb above the starting directory.
pub fn normalize_relative(path: &str) -> Result<String, SandboxError> {
    let invalid = || SandboxError::InvalidPath {
        path: path.to_string(),
    };
    if path.trim().is_empty() || path.contains('\0') {
        return Err(invalid());
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(SandboxError::Escape {
                        path: path.to_string(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(invalid()),
        }
    }

    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

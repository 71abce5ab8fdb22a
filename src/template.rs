//! Template retrieval.
//!
//! Templates are addressed by URI. Only the `file://` scheme is supported.

use std::path::PathBuf;
use tracing::debug;

use crate::config::FILE_SCHEME;
use crate::error::{Result, TemplateError};

/// Fetches template bodies by URI.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateReader: Send + Sync {
    /// Returns the template body at `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unsupported or the body cannot be read.
    fn resolve(&self, uri: &str) -> Result<String>;
}

/// Reads templates from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTemplateReader;

impl FileTemplateReader {
    /// Creates a new file template reader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TemplateReader for FileTemplateReader {
    fn resolve(&self, uri: &str) -> Result<String> {
        let path = uri
            .strip_prefix(FILE_SCHEME)
            .map(PathBuf::from)
            .ok_or_else(|| TemplateError::UnsupportedScheme {
                uri: uri.to_string(),
            })?;

        debug!("Reading template: {}", path.display());

        let body = std::fs::read_to_string(&path).map_err(|e| TemplateError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;

        if body.trim().is_empty() {
            return Err(TemplateError::Empty { path }.into());
        }

        Ok(body)
    }
}

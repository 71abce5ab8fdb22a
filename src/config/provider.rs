//! Configuration provider.
//!
//! The provider is the read-only view the resolver works against: it looks up
//! contexts and stacks by name, applies per-context overrides and normalises
//! template locations to `file://` URIs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

use super::spec::{ProjectConfig, StackConfig};

/// Template URI scheme understood by the template reader.
pub const FILE_SCHEME: &str = "file://";

/// A context with its region inheritance applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    /// Context name.
    pub name: String,
    /// Project name.
    pub project: String,
    /// Target account, if declared.
    pub account: Option<String>,
    /// Target region.
    pub region: String,
    /// Project-wide tags.
    pub global_tags: BTreeMap<String, String>,
    /// Context-level tags.
    pub tags: BTreeMap<String, String>,
}

/// Source of raw per-context, per-stack settings.
pub trait ConfigProvider: Send + Sync {
    /// Loads the context-level configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is undefined or has no region.
    fn load_context(&self, context: &str) -> Result<ResolvedContext>;

    /// Returns a stack's settings with the context override applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the context or stack is undefined.
    fn get_stack(&self, context: &str, name: &str) -> Result<StackConfig>;

    /// Lists the stacks available in a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is undefined.
    fn list_stacks(&self, context: &str) -> Result<Vec<String>>;

    /// Lists every context name.
    fn list_contexts(&self) -> Vec<String>;
}

/// Provider backed by a parsed YAML configuration.
#[derive(Debug, Clone)]
pub struct YamlConfigProvider {
    /// Parsed configuration.
    config: ProjectConfig,
    /// Directory relative template paths are resolved against.
    base_dir: PathBuf,
}

impl YamlConfigProvider {
    /// Creates a provider over a parsed configuration.
    #[must_use]
    pub fn new(config: ProjectConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
        }
    }

    /// Returns the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn ensure_context(&self, context: &str) -> Result<()> {
        if self.config.contexts.contains_key(context) {
            Ok(())
        } else {
            Err(ConfigError::ContextNotFound {
                name: context.to_string(),
            }
            .into())
        }
    }

    /// Turns a template location into a `file://` URI.
    fn template_uri(&self, location: &str) -> String {
        if location.contains("://") {
            return location.to_string();
        }

        let path = Path::new(location);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        format!("{FILE_SCHEME}{}", absolute.display())
    }
}

impl ConfigProvider for YamlConfigProvider {
    fn load_context(&self, context: &str) -> Result<ResolvedContext> {
        let ctx = self
            .config
            .contexts
            .get(context)
            .ok_or_else(|| ConfigError::ContextNotFound {
                name: context.to_string(),
            })?;

        let region = self
            .config
            .region_for(ctx)
            .ok_or_else(|| ConfigError::MissingRegion {
                context: context.to_string(),
            })?;

        Ok(ResolvedContext {
            name: context.to_string(),
            project: self.config.project.clone(),
            account: ctx.account.clone(),
            region: region.to_string(),
            global_tags: self.config.tags.clone(),
            tags: ctx.tags.clone(),
        })
    }

    fn get_stack(&self, context: &str, name: &str) -> Result<StackConfig> {
        self.ensure_context(context)?;

        let stack = self
            .config
            .stacks
            .get(name)
            .ok_or_else(|| ConfigError::StackNotFound {
                name: name.to_string(),
            })?;

        let mut merged = stack.with_override(context);
        if merged.template.trim().is_empty() {
            return Err(ConfigError::MissingTemplate {
                stack: name.to_string(),
            }
            .into());
        }
        merged.template = self.template_uri(&merged.template);

        Ok(merged)
    }

    fn list_stacks(&self, context: &str) -> Result<Vec<String>> {
        self.ensure_context(context)?;
        Ok(self.config.stacks.keys().cloned().collect())
    }

    fn list_contexts(&self) -> Vec<String> {
        self.config.contexts.keys().cloned().collect()
    }
}

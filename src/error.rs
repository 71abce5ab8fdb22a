//! Error types for the stackctl deployment system.
//!
//! This module provides the error hierarchy for every phase of a run:
//! configuration, resolution, template retrieval, the remote provisioning
//! service, change sets, stack operations and confirmation prompts.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the stackctl deployment system.
#[derive(Debug, Error)]
pub enum StackctlError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Parameter, output and dependency resolution errors.
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Template retrieval errors.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Remote provisioning service errors.
    #[error("Provisioning service error: {0}")]
    Provider(#[from] ProviderError),

    /// Change set errors.
    #[error("Change set error: {0}")]
    ChangeSet(#[from] ChangeSetError),

    /// Stack operation failures reported by event monitoring.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// Confirmation prompt errors.
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// The requested context is not defined.
    #[error("Context '{name}' not found")]
    ContextNotFound {
        /// Name of the missing context.
        name: String,
    },

    /// The requested stack is not defined.
    #[error("Stack '{name}' not found")]
    StackNotFound {
        /// Name of the missing stack.
        name: String,
    },

    /// Neither the context nor the project declares a region.
    #[error("No region configured for context '{context}' and no global region set")]
    MissingRegion {
        /// Context without a region.
        context: String,
    },

    /// A stack has no template location.
    #[error("Stack '{stack}' has no template")]
    MissingTemplate {
        /// Stack without a template.
        stack: String,
    },

    /// A parameter has no usable value.
    #[error("Parameter '{parameter}'{} has no value", stack.as_ref().map(|s| format!(" of stack '{s}'")).unwrap_or_default())]
    MissingParameterValue {
        /// Stack declaring the parameter, when known.
        stack: Option<String>,
        /// Name of the parameter.
        parameter: String,
    },

}

/// Resolution errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolver kind is not supported.
    #[error("Unsupported resolver type '{kind}'")]
    UnsupportedResolver {
        /// The unknown kind.
        kind: String,
    },

    /// A resolver is missing a required configuration field.
    #[error("Resolver '{kind}' requires field '{field}'")]
    MissingResolverField {
        /// Resolver kind.
        kind: String,
        /// Missing field name.
        field: String,
    },

    /// A cross-stack reference targets a stack that does not exist remotely.
    #[error("Stack '{stack}' does not exist")]
    StackNotFound {
        /// Name of the referenced stack.
        stack: String,
    },

    /// A cross-stack reference names an output the target stack lacks.
    #[error("Stack '{stack}' has no output named '{key}'")]
    MissingOutput {
        /// Name of the referenced stack.
        stack: String,
        /// Missing output key.
        key: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Circular dependency detected among stacks: {}", stacks.join(", "))]
    CircularDependency {
        /// Stacks that could not be ordered.
        stacks: Vec<String>,
    },

    /// A parameter failed to resolve.
    #[error("Failed to resolve parameter '{name}': {source}")]
    Parameter {
        /// Name of the parameter.
        name: String,
        /// Underlying failure.
        source: Box<StackctlError>,
    },
}

/// Template retrieval errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The URI scheme is not supported.
    #[error("Unsupported template URI '{uri}': only file:// is supported")]
    UnsupportedScheme {
        /// The rejected URI.
        uri: String,
    },

    /// The template could not be read.
    #[error("Failed to read template {path}: {message}")]
    Read {
        /// Path of the template file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The template file is empty.
    #[error("Template {path} is empty")]
    Empty {
        /// Path of the template file.
        path: PathBuf,
    },
}

/// Remote provisioning service errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A remote call failed.
    #[error("{operation} failed for '{target}': {message}")]
    Request {
        /// Operation that failed.
        operation: String,
        /// Stack or change set the call targeted.
        target: String,
        /// Error message from the service.
        message: String,
        /// Whether the failure is throttling or transport related.
        retryable: bool,
    },

    /// The stack is in the middle of another operation.
    #[error("Stack '{stack}' is busy ({status})")]
    StackBusy {
        /// Name of the stack.
        stack: String,
        /// Current status.
        status: String,
    },
}

/// Change set errors.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// The change set could not be created.
    ///
    /// `change_set` is set when the service accepted the request but could not
    /// compute the change set; that change set still exists and must be deleted.
    #[error("Failed to create change set for stack '{stack}': {reason}")]
    CreationFailed {
        /// Name of the stack.
        stack: String,
        /// Identifier of the failed change set, if one was created.
        change_set: Option<String>,
        /// Reason reported by the service.
        reason: String,
    },

    /// The change set could not be deleted.
    #[error("Failed to delete change set '{change_set}' of stack '{stack}': {message}")]
    CleanupFailed {
        /// Name of the stack.
        stack: String,
        /// Change set identifier.
        change_set: String,
        /// Description of the failure.
        message: String,
    },
}

/// Stack operation failures.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The stack reached a failed terminal status.
    #[error("Stack '{stack}' failed with status {status}: {reason}")]
    Failed {
        /// Name of the stack.
        stack: String,
        /// Terminal status.
        status: String,
        /// Status reason, if any.
        reason: String,
    },

    /// The stack did not reach a terminal status in time.
    #[error("Timed out after {secs}s waiting for stack '{stack}'")]
    Timeout {
        /// Name of the stack.
        stack: String,
        /// Elapsed seconds.
        secs: u64,
    },
}

/// Confirmation prompt errors.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Reading the answer failed.
    #[error("Failed to read confirmation: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },

    /// Confirmation is required but stdin is not a terminal.
    #[error("Confirmation required but stdin is not interactive (use --yes)")]
    NotInteractive,
}

/// Result type alias for stackctl operations.
pub type Result<T> = std::result::Result<T, StackctlError>;

impl StackctlError {
    /// Returns true if retrying the whole command may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Request { retryable: true, .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl ProviderError {
    /// Creates a request error for an operation against a target.
    #[must_use]
    pub fn request(
        operation: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Request {
            operation: operation.into(),
            target: target.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

impl ResolveError {
    /// Wraps a failure with the name of the parameter being resolved.
    #[must_use]
    pub fn parameter(name: impl Into<String>, source: StackctlError) -> Self {
        Self::Parameter {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_output_names_stack_and_key() {
        let err = StackctlError::from(ResolveError::MissingOutput {
            stack: String::from("security"),
            key: String::from("WebSGId"),
        });
        let message = err.to_string();
        assert!(message.contains("security"));
        assert!(message.contains("WebSGId"));
    }

    #[test]
    fn test_parameter_frame_wraps_once() {
        let inner = StackctlError::from(ResolveError::MissingOutput {
            stack: String::from("vpc"),
            key: String::from("VpcId"),
        });
        let err = ResolveError::parameter("VpcId", inner);
        assert_eq!(
            err.to_string(),
            "Failed to resolve parameter 'VpcId': Resolution error: Stack 'vpc' has no output named 'VpcId'"
        );
    }

    #[test]
    fn test_missing_parameter_names_stack() {
        let err = ConfigError::MissingParameterValue {
            stack: Some(String::from("vpc")),
            parameter: String::from("CidrBlock"),
        };
        assert_eq!(err.to_string(), "Parameter 'CidrBlock' of stack 'vpc' has no value");

        let err = ConfigError::MissingParameterValue {
            stack: None,
            parameter: String::from("CidrBlock"),
        };
        assert_eq!(err.to_string(), "Parameter 'CidrBlock' has no value");
    }

    #[test]
    fn test_retryable() {
        let throttled = StackctlError::from(ProviderError::Request {
            operation: String::from("DescribeStacks"),
            target: String::from("vpc"),
            message: String::from("Rate exceeded"),
            retryable: true,
        });
        assert!(throttled.is_retryable());

        let missing = StackctlError::from(ConfigError::StackNotFound {
            name: String::from("vpc"),
        });
        assert!(!missing.is_retryable());
    }
}

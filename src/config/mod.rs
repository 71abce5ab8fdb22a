//! Configuration module for the stackctl deployment system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stackctl.yaml`
//! - Validation of configuration values
//! - The provider view used by the resolver (context lookup, overrides)

mod spec;
mod parser;
mod validator;
mod provider;

pub use spec::{
    ContextConfig, ListItem, ParameterValue, ProjectConfig, ResolverSpec, StackConfig,
    StackOverride, RESOLVER_LITERAL, RESOLVER_STACK_OUTPUT,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use provider::{ConfigProvider, FILE_SCHEME, ResolvedContext, YamlConfigProvider};

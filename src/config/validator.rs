//! Configuration validation for project specs.
//!
//! This module validates a parsed configuration before anything is resolved
//! or sent to the provisioning service, so that typos surface with the name
//! of the offending entity.

use crate::error::{ConfigError, Result, StackctlError};
use crate::resolve::DependencyGraph;
use std::collections::BTreeSet;
use tracing::debug;

use super::spec::{
    ListItem, ParameterValue, ProjectConfig, ResolverSpec, StackConfig, RESOLVER_LITERAL,
    RESOLVER_STACK_OUTPUT,
};

/// Validator for project configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Known capability names.
    known_capabilities: BTreeSet<String>,
}

/// Capabilities accepted by the provisioning service.
const KNOWN_CAPABILITIES: &[&str] = &[
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator with the default capability list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_capabilities: KNOWN_CAPABILITIES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Validates a project configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &ProjectConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(StackctlError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &ProjectConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(config, &mut result);
        Self::validate_contexts(config, &mut result);
        self.validate_stacks(config, &mut result);
        Self::validate_dependencies(config, &mut result);

        result
    }

    /// Validates project-level settings.
    fn validate_project(config: &ProjectConfig, result: &mut ValidationResult) {
        if config.project.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project"),
                message: String::from("Project name cannot be empty"),
            });
        }
    }

    /// Validates contexts and their region inheritance.
    fn validate_contexts(config: &ProjectConfig, result: &mut ValidationResult) {
        if config.contexts.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("contexts"),
                message: String::from("At least one context must be defined"),
            });
            return;
        }

        for (name, context) in &config.contexts {
            if config.region_for(context).is_none() {
                result.errors.push(ValidationError {
                    field: format!("contexts.{name}.region"),
                    message: format!(
                        "Context '{name}' has no region and no global region is set"
                    ),
                });
            }
        }
    }

    /// Validates all stack configurations.
    fn validate_stacks(&self, config: &ProjectConfig, result: &mut ValidationResult) {
        if config.stacks.is_empty() {
            result.warnings.push(String::from("No stacks defined in configuration"));
            return;
        }

        for (name, stack) in &config.stacks {
            let prefix = format!("stacks.{name}");

            if !is_valid_stack_name(name) {
                result.errors.push(ValidationError {
                    field: prefix.clone(),
                    message: format!(
                        "Stack name '{name}' is invalid. Must start with a letter and contain only letters, digits and hyphens."
                    ),
                });
            }

            if stack.template.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.template"),
                    message: format!("Stack '{name}' has no template"),
                });
            }

            self.validate_capabilities(&stack.capabilities, &prefix, result);
            Self::validate_parameters(stack, &prefix, result);

            for (context, over) in &stack.contexts {
                if !config.contexts.contains_key(context) {
                    result.warnings.push(format!(
                        "Stack '{name}' overrides undefined context '{context}'"
                    ));
                }
                if let Some(capabilities) = &over.capabilities {
                    self.validate_capabilities(
                        capabilities,
                        &format!("{prefix}.contexts.{context}"),
                        result,
                    );
                }
            }
        }
    }

    /// Warns about capability names the service will reject.
    fn validate_capabilities(
        &self,
        capabilities: &[String],
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        for capability in capabilities {
            if !self.known_capabilities.contains(capability) {
                result.warnings.push(format!(
                    "{prefix}.capabilities: unknown capability '{capability}'"
                ));
            }
        }
    }

    /// Validates resolver declarations in base and override parameters.
    fn validate_parameters(stack: &StackConfig, prefix: &str, result: &mut ValidationResult) {
        let base = stack.parameters.iter().map(|(k, v)| (format!("{prefix}.parameters.{k}"), v));
        let overrides = stack.contexts.iter().flat_map(|(context, over)| {
            over.parameters
                .iter()
                .map(move |(k, v)| (format!("{prefix}.contexts.{context}.parameters.{k}"), v))
        });

        for (field, value) in base.chain(overrides) {
            match value {
                ParameterValue::Literal(_) => {}
                ParameterValue::Resolver(spec) => Self::validate_resolver(spec, &field, result),
                ParameterValue::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let ListItem::Resolver(spec) = item {
                            Self::validate_resolver(spec, &format!("{field}[{i}]"), result);
                        }
                    }
                }
            }
        }
    }

    /// Validates a single resolver declaration.
    fn validate_resolver(spec: &ResolverSpec, field: &str, result: &mut ValidationResult) {
        let required: &[&str] = match spec.kind.as_str() {
            RESOLVER_STACK_OUTPUT => &["stack_name", "output_key"],
            RESOLVER_LITERAL => &["value"],
            other => {
                result.errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("Unsupported resolver type '{other}'"),
                });
                return;
            }
        };

        for name in required {
            if spec.field(name).is_none() {
                result.errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("Resolver '{}' requires field '{name}'", spec.kind),
                });
            }
        }
    }

    /// Warns about dependencies that cannot be ordered.
    ///
    /// Undefined dependencies are treated as deployed independently. Cycles
    /// are checked per context with overrides applied, and only fail a run
    /// that requests the stacks involved.
    fn validate_dependencies(config: &ProjectConfig, result: &mut ValidationResult) {
        for (name, stack) in &config.stacks {
            let declared: BTreeSet<&String> = stack
                .depends_on
                .iter()
                .chain(
                    stack
                        .contexts
                        .values()
                        .filter_map(|over| over.depends_on.as_ref())
                        .flatten(),
                )
                .filter(|dependency| !config.stacks.contains_key(*dependency))
                .collect();

            for dependency in declared {
                result.warnings.push(format!(
                    "Stack '{name}' depends on undefined stack '{dependency}'"
                ));
            }
        }

        for context in config.contexts.keys() {
            let mut graph = DependencyGraph::new();
            for (name, stack) in &config.stacks {
                graph.add_stack(name, stack.with_override(context).depends_on);
            }

            if let Err(err) = graph.deployment_order() {
                result.warnings.push(format!("Context '{context}': {err}"));
            }
        }
    }
}

/// Checks whether a stack name is usable as a remote stack name.
fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };

    if !first.is_ascii_alphabetic() {
        return false;
    }

    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> ProjectConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_stack_name() {
        assert!(is_valid_stack_name("vpc"));
        assert!(is_valid_stack_name("App-Stack-2"));
        assert!(!is_valid_stack_name(""));
        assert!(!is_valid_stack_name("2vpc"));
        assert!(!is_valid_stack_name("my_stack"));
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
stacks:
  vpc:
    template: templates/vpc.yaml
  app:
    template: templates/app.yaml
    depends_on: [vpc]
    parameters:
      VpcId: { type: stack-output, stack_name: vpc, output_key: VpcId }
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_missing_region() {
        let config = parse(
            r"
project: demo
contexts:
  dev: {}
stacks:
  vpc: { template: vpc.yaml }
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "contexts.dev.region");
    }

    #[test]
    fn test_external_dependency_is_a_warning() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
stacks:
  app: { template: app.yaml, depends_on: [shared-network] }
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(
            result.warnings,
            vec![String::from("Stack 'app' depends on undefined stack 'shared-network'")]
        );
    }

    #[test]
    fn test_cycle_does_not_block_other_stacks() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
stacks:
  vpc: { template: vpc.yaml }
  loop-a: { template: a.yaml, depends_on: [loop-b] }
  loop-b: { template: b.yaml, depends_on: [loop-a] }
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].starts_with("Context 'dev': Circular dependency"));
        assert!(result.warnings[0].contains("loop-a, loop-b"));
    }

    #[test]
    fn test_cycle_checked_with_context_overrides() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
  prod: {}
stacks:
  a: { template: a.yaml, depends_on: [b] }
  b:
    template: b.yaml
    depends_on: [a]
    contexts:
      prod: { depends_on: [] }
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].starts_with("Context 'dev':"));
    }

    #[test]
    fn test_bad_resolvers() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
stacks:
  app:
    template: app.yaml
    parameters:
      A: { type: ssm-parameter, name: /x }
      B: { type: stack-output, stack_name: vpc }
      C: [x, { type: stack-output, output_key: Id }]
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 3);
        assert!(result.errors[0].message.contains("Unsupported resolver type 'ssm-parameter'"));
        assert!(result.errors[1].message.contains("output_key"));
        assert_eq!(result.errors[2].field, "stacks.app.parameters.C[1]");
    }

    #[test]
    fn test_warnings() {
        let config = parse(
            r"
project: demo
region: us-east-1
contexts:
  dev: {}
stacks:
  app:
    template: app.yaml
    capabilities: [CAPABILITY_EVERYTHING]
    contexts:
      staging: { tags: { Tier: x } }
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert_eq!(result.warning_count(), 2);
    }
}

// ============================================================================
// Lints
// ============================================================================

#![deny(unsafe_code)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![deny(overflowing_literals, arithmetic_overflow)]
#![warn(dead_code, unused_imports, unused_variables)]

// Clippy: pedantic baseline, no panicking shortcuts outside tests
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)]
#![warn(clippy::panic, clippy::todo, clippy::unimplemented)]
#![warn(clippy::print_stdout)]
#![warn(clippy::redundant_clone, clippy::shadow_unrelated)]
#![warn(clippy::too_many_arguments, clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # stackctl
//!
//! Declarative, dependency-ordered deployment of multi-stack `CloudFormation` projects.
//!
//! ## Overview
//!
//! A project is described once in `stackctl.yaml` and deployed to any number
//! of contexts (environments):
//!
//! - Stacks declare templates, parameters, tags, capabilities and dependencies
//! - Parameters can read outputs of other deployed stacks
//! - Stacks are deployed in dependency order and deleted in reverse
//! - Updates go through change sets that are previewed and confirmed first
//!
//! ## Architecture
//!
//! 1. **Configuration**: parsed from YAML, overrides applied per context
//! 2. **Resolution**: templates read, parameters resolved, tags layered
//! 3. **Planning**: diffs and change sets against the deployed stacks
//! 4. **Execution**: one stack at a time, stopping at the first failure
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and lookup
//! - [`template`]: Template retrieval
//! - [`resolve`]: Parameter, stack and dependency resolution
//! - [`provider`]: Provisioning service client
//! - [`planner`]: Diffs, change sets, deployment and deletion
//! - [`runner`]: Multi-stack runs
//! - [`prompt`]: Confirmation and cancellation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project: my-app
//! region: us-east-1
//!
//! contexts:
//!   dev:
//!     region: us-west-2
//!   prod:
//!     account: "210987654321"
//!
//! stacks:
//!   vpc:
//!     template: templates/vpc.yaml
//!     parameters:
//!       CidrBlock: 10.0.0.0/16
//!   app:
//!     template: templates/app.yaml
//!     depends_on: [vpc]
//!     parameters:
//!       VpcId: { type: stack-output, stack_name: vpc, output_key: VpcId }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod resolve;
pub mod runner;
pub mod template;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigProvider, ConfigValidator, ProjectConfig, YamlConfigProvider};
pub use error::{Result, StackctlError};
pub use planner::{
    DeleteOutcome, DeletionOrchestrator, DeployOutcome, DeploymentOrchestrator, DiffEngine,
    DiffResult,
};
pub use prompt::{CancellationToken, ConfirmationPrompter};
pub use provider::{AwsProvisioningClient, ProvisioningClient};
pub use resolve::{DependencyGraph, ParameterResolver, ResolvedStack, StackResolver};
pub use runner::{RunReport, StackRunner};
pub use template::{FileTemplateReader, TemplateReader};

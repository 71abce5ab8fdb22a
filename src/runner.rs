//! Multi-stack runs.
//!
//! A run applies one operation to a single stack or to every stack of a
//! context, one stack at a time in dependency order (reverse order for
//! deletion). The first failure stops the run and the stacks already
//! processed are left as they are.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::planner::{
    DeleteOutcome, DeletionOrchestrator, DeployOutcome, DeploymentOrchestrator, DiffEngine,
    DiffOptions, DiffResult, Reporter,
};
use crate::prompt::{CancellationToken, ConfirmationPrompter};
use crate::provider::{ProvisioningClient, StackDescription};
use crate::resolve::StackResolver;

/// Progress of a run.
#[derive(Debug, Serialize)]
pub struct RunReport<T> {
    /// Stacks processed so far, in processing order.
    pub completed: Vec<(String, T)>,
    /// The stack that stopped the run and why.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<(String, String)>,
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: None,
        }
    }
}

impl<T> RunReport<T> {
    /// Returns true if no stack failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed.is_none()
    }

    fn record(&mut self, stack: &str, result: Result<T>) -> bool {
        match result {
            Ok(outcome) => {
                self.completed.push((stack.to_string(), outcome));
                true
            }
            Err(e) => {
                error!("Stack {stack} failed: {e}");
                self.failed = Some((stack.to_string(), e.to_string()));
                false
            }
        }
    }
}

/// Result of validating one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedStack {
    /// Target region.
    pub region: String,
    /// Template location.
    pub template: String,
    /// Number of resolved parameters.
    pub parameter_count: usize,
}

impl std::fmt::Display for ValidatedStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "valid ({} parameters, {})",
            self.parameter_count, self.region
        )
    }
}

/// Runs stack operations over a context.
#[derive(Clone)]
pub struct StackRunner {
    resolver: StackResolver,
    client: Arc<dyn ProvisioningClient>,
    deployer: DeploymentOrchestrator,
    deleter: DeletionOrchestrator,
    diff: DiffEngine,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StackRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackRunner")
            .field("resolver", &self.resolver)
            .field("deployer", &self.deployer)
            .field("deleter", &self.deleter)
            .finish_non_exhaustive()
    }
}

impl StackRunner {
    /// Creates a runner and the orchestrators it drives.
    #[must_use]
    pub fn new(
        resolver: StackResolver,
        client: Arc<dyn ProvisioningClient>,
        prompter: Arc<dyn ConfirmationPrompter>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            deployer: DeploymentOrchestrator::new(
                Arc::clone(&client),
                Arc::clone(&prompter),
                Arc::clone(&reporter),
                cancel.clone(),
                timeout,
            ),
            deleter: DeletionOrchestrator::new(
                Arc::clone(&client),
                prompter,
                reporter,
                cancel.clone(),
                timeout,
            ),
            diff: DiffEngine::new(Arc::clone(&client)),
            resolver,
            client,
            cancel,
        }
    }

    /// Returns the stack resolver.
    #[must_use]
    pub const fn resolver(&self) -> &StackResolver {
        &self.resolver
    }

    /// Deploys one stack or every stack of a context in dependency order.
    ///
    /// Each stack is resolved right before it is deployed so its parameters
    /// can read outputs of stacks deployed earlier in the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the stacks cannot be ordered. Per-stack failures
    /// are recorded in the report.
    pub async fn deploy(&self, context: &str, stack: Option<&str>) -> Result<RunReport<DeployOutcome>> {
        let order = self.resolver.dependency_order(context, &self.selection(context, stack)?)?;
        info!("Deploying {} stack(s) to {context}: {}", order.len(), order.join(", "));

        let mut report = RunReport::default();
        for name in &order {
            if self.interrupted() {
                break;
            }
            let result = self.deploy_one(context, name).await;
            let cancelled = matches!(result, Ok(DeployOutcome::Cancelled));
            if !report.record(name, result) || cancelled {
                break;
            }
        }
        Ok(report)
    }

    async fn deploy_one(&self, context: &str, name: &str) -> Result<DeployOutcome> {
        let resolved = self.resolver.resolve_stack(context, name).await?;
        self.deployer.deploy(&resolved).await
    }

    /// Deletes one stack or every stack of a context in reverse dependency order.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is undefined or the stacks cannot be
    /// ordered. Per-stack failures are recorded in the report.
    pub async fn delete(&self, context: &str, stack: Option<&str>) -> Result<RunReport<DeleteOutcome>> {
        let region = self.resolver.config().load_context(context)?.region;
        let order = self.resolver.deletion_order(context, &self.selection(context, stack)?)?;
        info!("Deleting {} stack(s) from {context}: {}", order.len(), order.join(", "));

        let mut report = RunReport::default();
        for name in &order {
            if self.interrupted() {
                break;
            }
            let result = self.deleter.delete(&region, name).await;
            let cancelled = matches!(result, Ok(DeleteOutcome::Cancelled));
            if !report.record(name, result) || cancelled {
                break;
            }
        }
        Ok(report)
    }

    /// Diffs one stack or every stack of a context.
    ///
    /// # Errors
    ///
    /// Returns an error if the stacks cannot be ordered. Per-stack failures
    /// are recorded in the report.
    pub async fn diff(
        &self,
        context: &str,
        stack: Option<&str>,
        options: DiffOptions,
    ) -> Result<RunReport<DiffResult>> {
        let order = self.resolver.dependency_order(context, &self.selection(context, stack)?)?;

        let mut report = RunReport::default();
        for name in &order {
            if self.interrupted() {
                break;
            }
            let result = self.diff_one(context, name, options).await;
            if !report.record(name, result) {
                break;
            }
        }
        Ok(report)
    }

    async fn diff_one(&self, context: &str, name: &str, options: DiffOptions) -> Result<DiffResult> {
        let resolved = self.resolver.resolve_stack(context, name).await?;
        self.diff.diff(&resolved, options).await
    }

    /// Resolves stacks and validates their templates remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the stacks cannot be ordered. Per-stack failures
    /// are recorded in the report.
    pub async fn validate(&self, context: &str, stack: Option<&str>) -> Result<RunReport<ValidatedStack>> {
        let order = self.resolver.dependency_order(context, &self.selection(context, stack)?)?;

        let mut report = RunReport::default();
        for name in &order {
            let result = self.validate_one(context, name).await;
            if !report.record(name, result) {
                break;
            }
        }
        Ok(report)
    }

    async fn validate_one(&self, context: &str, name: &str) -> Result<ValidatedStack> {
        let resolved = self.resolver.resolve_stack(context, name).await?;
        self.client
            .validate_template(&resolved.region, &resolved.template_body)
            .await?;
        Ok(ValidatedStack {
            region: resolved.region,
            template: resolved.template_uri,
            parameter_count: resolved.parameters.len(),
        })
    }

    /// Describes one stack or every stack of a context. Absent stacks map to `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the context is undefined, the stacks cannot be
    /// ordered, or the service cannot be queried.
    pub async fn describe(
        &self,
        context: &str,
        stack: Option<&str>,
    ) -> Result<Vec<(String, Option<StackDescription>)>> {
        let region = self.resolver.config().load_context(context)?.region;
        let order = self.resolver.dependency_order(context, &self.selection(context, stack)?)?;

        let mut described = Vec::with_capacity(order.len());
        for name in order {
            let description = self.client.describe_stack(&region, &name).await?;
            described.push((name, description));
        }
        Ok(described)
    }

    fn selection(&self, context: &str, stack: Option<&str>) -> Result<Vec<String>> {
        match stack {
            Some(name) => Ok(vec![name.to_string()]),
            None => self.resolver.config().list_stacks(context),
        }
    }

    fn interrupted(&self) -> bool {
        if self.cancel.is_cancelled() {
            warn!(
                "Run interrupted: {}",
                self.cancel.reason().unwrap_or("cancelled")
            );
            return true;
        }
        false
    }
}

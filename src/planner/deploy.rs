//! Deployment orchestrator.
//!
//! Decides between creating a stack and updating it through a change set,
//! asks for confirmation, executes and waits for the stack to settle.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DeployError, ProviderError, Result};
use crate::prompt::{CancellationToken, ConfirmationPrompter};
use crate::provider::{ProvisioningClient, StackDescription, StackStatus};
use crate::resolve::ResolvedStack;

use super::changeset::ScopedChangeSet;
use super::diff::{DiffEngine, DiffOptions, DiffScope};
use super::monitor::StackMonitor;
use super::report::{CreatePreview, Reporter};

/// Statuses a stack cannot be updated from.
const UNRECOVERABLE_STATUSES: &[&str] = &["ROLLBACK_COMPLETE", "ROLLBACK_FAILED", "CREATE_FAILED"];

/// How a deployment ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// A new stack was created.
    Created {
        /// Terminal status.
        status: StackStatus,
    },
    /// An existing stack was updated.
    Updated {
        /// Terminal status.
        status: StackStatus,
        /// Set if the change set could not be deleted afterwards.
        #[serde(skip_serializing_if = "Option::is_none")]
        cleanup_warning: Option<String>,
    },
    /// The stack already matches its configuration.
    NoChanges,
    /// The operator declined or the run was interrupted.
    Cancelled,
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { status } => write!(f, "created ({status})"),
            Self::Updated {
                status,
                cleanup_warning: None,
            } => write!(f, "updated ({status})"),
            Self::Updated {
                status,
                cleanup_warning: Some(warning),
            } => write!(f, "updated ({status}), {warning}"),
            Self::NoChanges => f.write_str("no changes"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Asks for confirmation unless the run was interrupted before or during the prompt.
pub(super) fn confirm(
    prompter: &dyn ConfirmationPrompter,
    cancel: &CancellationToken,
    message: &str,
) -> Result<bool> {
    if cancel.is_cancelled() {
        return Ok(false);
    }
    let approved = prompter.confirm(message)?;
    Ok(approved && !cancel.is_cancelled())
}

/// Rejects stacks that are mid-operation.
pub(super) fn ensure_idle(stack: &StackDescription) -> Result<()> {
    if stack.status.is_in_progress() {
        return Err(ProviderError::StackBusy {
            stack: stack.name.clone(),
            status: stack.status.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Creates or updates one stack at a time.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    client: Arc<dyn ProvisioningClient>,
    diff: DiffEngine,
    prompter: Arc<dyn ConfirmationPrompter>,
    reporter: Arc<dyn Reporter>,
    monitor: StackMonitor,
    cancel: CancellationToken,
}

impl fmt::Debug for DeploymentOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentOrchestrator")
            .field("monitor", &self.monitor)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl DeploymentOrchestrator {
    /// Creates an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn ProvisioningClient>,
        prompter: Arc<dyn ConfirmationPrompter>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            diff: DiffEngine::new(Arc::clone(&client)),
            monitor: StackMonitor::new(Arc::clone(&client), Arc::clone(&reporter), timeout),
            client,
            prompter,
            reporter,
            cancel,
        }
    }

    /// Deploys a resolved stack.
    ///
    /// Declining the confirmation is not an error. On the update path the
    /// change set is deleted whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the service rejects a call, the prompt fails, or
    /// the stack fails or times out.
    pub async fn deploy(&self, stack: &ResolvedStack) -> Result<DeployOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(DeployOutcome::Cancelled);
        }

        match self.client.describe_stack(&stack.region, &stack.name).await? {
            None => self.create(stack).await,
            Some(current) => {
                ensure_idle(&current)?;
                if UNRECOVERABLE_STATUSES.contains(&current.status.as_str()) {
                    return Err(DeployError::Failed {
                        stack: stack.name.clone(),
                        status: current.status.to_string(),
                        reason: String::from("stack must be deleted before it can be redeployed"),
                    }
                    .into());
                }
                self.update(stack).await
            }
        }
    }

    async fn create(&self, stack: &ResolvedStack) -> Result<DeployOutcome> {
        info!("Stack {} does not exist, creating it", stack.name);

        self.client
            .validate_template(&stack.region, &stack.template_body)
            .await?;

        self.reporter.create_preview(&CreatePreview {
            stack: stack.name.clone(),
            region: stack.region.clone(),
            template: stack.template_uri.clone(),
            parameter_count: stack.parameters.len(),
            tag_count: stack.tags.len(),
            capabilities: stack.capabilities.clone(),
        });

        let message = format!("Create stack '{}' in {}?", stack.name, stack.region);
        if !confirm(self.prompter.as_ref(), &self.cancel, &message)? {
            info!("Creation of {} cancelled", stack.name);
            return Ok(DeployOutcome::Cancelled);
        }

        self.client
            .create_stack(&stack.region, &stack.stack_input())
            .await?;
        let status = self.monitor.wait(&stack.region, &stack.name).await?;

        info!("Stack {} created", stack.name);
        Ok(DeployOutcome::Created { status })
    }

    async fn update(&self, stack: &ResolvedStack) -> Result<DeployOutcome> {
        let options = DiffOptions {
            scope: DiffScope::Full,
            keep_change_set: true,
        };
        let mut diff = self.diff.diff(stack, options).await?;

        let Some(change_set) = diff.take_change_set() else {
            info!("Stack {} is up to date", stack.name);
            return Ok(DeployOutcome::NoChanges);
        };
        self.reporter.diff(&diff);

        let message = format!("Update stack '{}' in {}?", stack.name, stack.region);
        let approved = match confirm(self.prompter.as_ref(), &self.cancel, &message) {
            Ok(approved) => approved,
            Err(e) => {
                release_quietly(change_set).await;
                return Err(e);
            }
        };

        if !approved {
            info!("Update of {} cancelled", stack.name);
            change_set.release().await?;
            return Ok(DeployOutcome::Cancelled);
        }

        let executed = self.execute(stack, &change_set).await;
        let cleanup = change_set.release().await;

        match (executed, cleanup) {
            (Ok(status), Ok(())) => {
                info!("Stack {} updated", stack.name);
                Ok(DeployOutcome::Updated {
                    status,
                    cleanup_warning: None,
                })
            }
            (Ok(status), Err(e)) => {
                warn!("{e}");
                Ok(DeployOutcome::Updated {
                    status,
                    cleanup_warning: Some(e.to_string()),
                })
            }
            (Err(e), cleanup) => {
                if let Err(cleanup) = cleanup {
                    warn!("{cleanup}");
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, stack: &ResolvedStack, change_set: &ScopedChangeSet) -> Result<StackStatus> {
        debug!("Executing change set {} on {}", change_set.info().name, stack.name);
        self.client
            .execute_change_set(&stack.region, &stack.name, change_set.id())
            .await?;
        self.monitor.wait(&stack.region, &stack.name).await
    }
}

async fn release_quietly(change_set: ScopedChangeSet) {
    if let Err(e) = change_set.release().await {
        warn!("{e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChangeSetError, PromptError, StackctlError};
    use crate::planner::report::testing::RecordingReporter;
    use crate::prompt::{AutoApprove, MockConfirmationPrompter};
    use crate::provider::fake::{FakeProvisioningClient, deployed, modify};
    use crate::planner::monitor::DEFAULT_TIMEOUT;

    fn resolved() -> ResolvedStack {
        ResolvedStack {
            name: String::from("vpc"),
            context: String::from("dev"),
            region: String::from("us-east-1"),
            template_uri: String::from("file:///work/vpc.yaml"),
            template_body: String::from("Resources: {}"),
            parameters: [(String::from("CidrBlock"), String::from("10.0.0.0/16"))].into(),
            tags: [(String::from("Project"), String::from("demo"))].into(),
            capabilities: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    fn changed() -> FakeProvisioningClient {
        FakeProvisioningClient::new()
            .with_stack(deployed("vpc", &[]), "Resources: {}")
            .with_change_set_changes(vec![modify("Vpc")])
    }

    fn answering(answer: bool) -> Arc<MockConfirmationPrompter> {
        let mut prompter = MockConfirmationPrompter::new();
        prompter.expect_confirm().times(1).returning(move |_| Ok(answer));
        Arc::new(prompter)
    }

    fn orchestrator(
        client: &Arc<FakeProvisioningClient>,
        prompter: Arc<dyn ConfirmationPrompter>,
        reporter: &Arc<RecordingReporter>,
    ) -> DeploymentOrchestrator {
        DeploymentOrchestrator::new(
            client.clone(),
            prompter,
            reporter.clone(),
            CancellationToken::new(),
            DEFAULT_TIMEOUT,
        )
    }

    #[tokio::test]
    async fn test_create_path() {
        let client = Arc::new(FakeProvisioningClient::new());
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, answering(true), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeployOutcome::Created {
                status: "CREATE_COMPLETE".into()
            }
        );
        assert_eq!(
            client.calls(),
            vec![
                "describe_stack vpc",
                "validate_template template",
                "create_stack vpc",
                "wait_for_stack vpc",
            ]
        );
        assert_eq!(reporter.lines(), vec!["create vpc", "event vpc CREATE_COMPLETE"]);
    }

    #[tokio::test]
    async fn test_create_declined() {
        let client = Arc::new(FakeProvisioningClient::new());
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, answering(false), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        assert_eq!(outcome, DeployOutcome::Cancelled);
        assert!(client.calls_to("create_stack").is_empty());
    }

    #[tokio::test]
    async fn test_update_path_cleans_up() {
        let client = Arc::new(changed());
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, answering(true), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeployOutcome::Updated {
                status: "UPDATE_COMPLETE".into(),
                cleanup_warning: None
            }
        );
        assert_eq!(
            client.calls_to("execute_change_set"),
            vec!["execute_change_set vpc/cs-1"]
        );
        assert_eq!(
            client.calls_to("delete_change_set"),
            vec!["delete_change_set vpc/cs-1"]
        );
        assert_eq!(reporter.lines()[0], "diff vpc changes=true");
    }

    #[tokio::test]
    async fn test_no_changes() {
        let mut current = deployed("vpc", &[]);
        current.parameters = resolved().parameters;
        current.tags = resolved().tags;
        let client = Arc::new(FakeProvisioningClient::new().with_stack(current, "Resources: {}"));
        let reporter = Arc::new(RecordingReporter::default());

        let mut prompter = MockConfirmationPrompter::new();
        prompter.expect_confirm().never();

        let outcome = orchestrator(&client, Arc::new(prompter), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        assert_eq!(outcome, DeployOutcome::NoChanges);
        assert!(client.calls_to("execute_change_set").is_empty());
        assert_eq!(client.calls_to("delete_change_set").len(), 1);
    }

    #[tokio::test]
    async fn test_declined_update_deletes_change_set() {
        let client = Arc::new(changed());
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, answering(false), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        assert_eq!(outcome, DeployOutcome::Cancelled);
        assert!(client.calls_to("execute_change_set").is_empty());
        assert_eq!(
            client.calls_to("delete_change_set"),
            vec!["delete_change_set vpc/cs-1"]
        );
    }

    #[tokio::test]
    async fn test_prompt_error_deletes_change_set() {
        let client = Arc::new(changed());
        let reporter = Arc::new(RecordingReporter::default());
        let mut prompter = MockConfirmationPrompter::new();
        prompter
            .expect_confirm()
            .returning(|_| Err(PromptError::NotInteractive.into()));

        let err = orchestrator(&client, Arc::new(prompter), &reporter)
            .deploy(&resolved())
            .await
            .unwrap_err();

        assert!(matches!(err, StackctlError::Prompt(PromptError::NotInteractive)));
        assert_eq!(client.calls_to("delete_change_set").len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_success() {
        let client = Arc::new(changed().failing("delete_change_set", "vpc/cs-1"));
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, Arc::new(AutoApprove), &reporter)
            .deploy(&resolved())
            .await
            .unwrap();

        let DeployOutcome::Updated {
            cleanup_warning: Some(warning),
            ..
        } = outcome
        else {
            panic!("expected an update with a cleanup warning, got {outcome:?}");
        };
        assert!(warning.contains("cs-"));
    }

    #[tokio::test]
    async fn test_declined_update_surfaces_cleanup_failure() {
        let client = Arc::new(changed().failing("delete_change_set", "vpc/cs-1"));
        let reporter = Arc::new(RecordingReporter::default());

        let err = orchestrator(&client, answering(false), &reporter)
            .deploy(&resolved())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackctlError::ChangeSet(ChangeSetError::CleanupFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_update_still_deletes_change_set() {
        let client = Arc::new(changed().settling_at("vpc", "UPDATE_ROLLBACK_COMPLETE"));
        let reporter = Arc::new(RecordingReporter::default());

        let err = orchestrator(&client, Arc::new(AutoApprove), &reporter)
            .deploy(&resolved())
            .await
            .unwrap_err();

        assert!(matches!(err, StackctlError::Deploy(DeployError::Failed { .. })));
        assert_eq!(client.calls_to("delete_change_set").len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let client = Arc::new(changed().with_wait_delay(Duration::from_millis(500)));
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = DeploymentOrchestrator::new(
            client.clone(),
            Arc::new(AutoApprove),
            reporter,
            CancellationToken::new(),
            Duration::from_millis(20),
        );

        let err = orchestrator.deploy(&resolved()).await.unwrap_err();
        assert!(matches!(err, StackctlError::Deploy(DeployError::Timeout { .. })));
        assert_eq!(client.calls_to("delete_change_set").len(), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_stack_rejected() {
        let mut current = deployed("vpc", &[]);
        current.status = "ROLLBACK_COMPLETE".into();
        let client = Arc::new(FakeProvisioningClient::new().with_stack(current, "{}"));
        let reporter = Arc::new(RecordingReporter::default());

        let err = orchestrator(&client, Arc::new(AutoApprove), &reporter)
            .deploy(&resolved())
            .await
            .unwrap_err();
        assert!(matches!(err, StackctlError::Deploy(DeployError::Failed { .. })));
        assert!(client.calls_to("create_change_set").is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(changed());
        let cancel = CancellationToken::new();
        cancel.cancel("interrupted");
        let orchestrator = DeploymentOrchestrator::new(
            client.clone(),
            Arc::new(AutoApprove),
            Arc::new(RecordingReporter::default()),
            cancel,
            DEFAULT_TIMEOUT,
        );

        let outcome = orchestrator.deploy(&resolved()).await.unwrap();
        assert_eq!(outcome, DeployOutcome::Cancelled);
        assert!(client.calls().is_empty());
    }
}

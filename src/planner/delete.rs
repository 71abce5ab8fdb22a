//! Deletion orchestrator.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::prompt::{CancellationToken, ConfirmationPrompter};
use crate::provider::ProvisioningClient;

use super::deploy::{confirm, ensure_idle};
use super::monitor::StackMonitor;
use super::report::Reporter;

/// How a deletion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The stack was deleted.
    Deleted,
    /// The stack did not exist.
    Skipped,
    /// The operator declined or the run was interrupted.
    Cancelled,
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deleted => "deleted",
            Self::Skipped => "skipped (does not exist)",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Deletes one stack at a time after confirmation.
#[derive(Clone)]
pub struct DeletionOrchestrator {
    client: Arc<dyn ProvisioningClient>,
    prompter: Arc<dyn ConfirmationPrompter>,
    reporter: Arc<dyn Reporter>,
    monitor: StackMonitor,
    cancel: CancellationToken,
}

impl fmt::Debug for DeletionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletionOrchestrator")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl DeletionOrchestrator {
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
            monitor: StackMonitor::new(Arc::clone(&client), Arc::clone(&reporter), timeout),
            client,
            prompter,
            reporter,
            cancel,
        }
    }

    /// Deletes `stack` in `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is busy, the prompt fails, the service
    /// rejects the call, or the deletion fails or times out.
    pub async fn delete(&self, region: &str, stack: &str) -> Result<DeleteOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(DeleteOutcome::Cancelled);
        }

        let Some(current) = self.client.describe_stack(region, stack).await? else {
            warn!("Stack {stack} does not exist, skipping");
            return Ok(DeleteOutcome::Skipped);
        };
        ensure_idle(&current)?;

        self.reporter.delete_preview(&current);

        let message = format!("Delete stack '{stack}' in {region}?");
        if !confirm(self.prompter.as_ref(), &self.cancel, &message)? {
            info!("Deletion of {stack} cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        self.client.delete_stack(region, stack).await?;
        self.monitor.wait(region, stack).await?;

        info!("Stack {stack} deleted");
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeployError, ProviderError, StackctlError};
    use crate::planner::monitor::DEFAULT_TIMEOUT;
    use crate::planner::report::testing::RecordingReporter;
    use crate::prompt::{AutoApprove, MockConfirmationPrompter};
    use crate::provider::fake::{FakeProvisioningClient, deployed};

    fn orchestrator(
        client: &Arc<FakeProvisioningClient>,
        prompter: Arc<dyn ConfirmationPrompter>,
        reporter: Arc<RecordingReporter>,
    ) -> DeletionOrchestrator {
        DeletionOrchestrator::new(
            client.clone(),
            prompter,
            reporter,
            CancellationToken::new(),
            DEFAULT_TIMEOUT,
        )
    }

    #[tokio::test]
    async fn test_delete() {
        let client = Arc::new(FakeProvisioningClient::new().with_stack(deployed("vpc", &[]), "{}"));
        let reporter = Arc::new(RecordingReporter::default());

        let outcome = orchestrator(&client, Arc::new(AutoApprove), reporter.clone())
            .delete("us-east-1", "vpc")
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(client.stack("vpc").is_none());
        assert_eq!(
            reporter.lines(),
            vec!["delete vpc", "event vpc DELETE_COMPLETE"]
        );
    }

    #[tokio::test]
    async fn test_missing_stack_skipped() {
        let client = Arc::new(FakeProvisioningClient::new());
        let mut prompter = MockConfirmationPrompter::new();
        prompter.expect_confirm().never();

        let outcome = orchestrator(&client, Arc::new(prompter), Arc::default())
            .delete("us-east-1", "vpc")
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Skipped);
        assert_eq!(client.calls(), vec!["describe_stack vpc"]);
    }

    #[tokio::test]
    async fn test_declined() {
        let client = Arc::new(FakeProvisioningClient::new().with_stack(deployed("vpc", &[]), "{}"));
        let mut prompter = MockConfirmationPrompter::new();
        prompter.expect_confirm().returning(|_| Ok(false));

        let outcome = orchestrator(&client, Arc::new(prompter), Arc::default())
            .delete("us-east-1", "vpc")
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert!(client.calls_to("delete_stack").is_empty());
        assert!(client.stack("vpc").is_some());
    }

    #[tokio::test]
    async fn test_delete_failed() {
        let client = Arc::new(
            FakeProvisioningClient::new()
                .with_stack(deployed("vpc", &[]), "{}")
                .settling_at("vpc", "DELETE_FAILED"),
        );

        let err = orchestrator(&client, Arc::new(AutoApprove), Arc::default())
            .delete("us-east-1", "vpc")
            .await
            .unwrap_err();
        assert!(matches!(err, StackctlError::Deploy(DeployError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_busy_stack() {
        let mut current = deployed("vpc", &[]);
        current.status = "UPDATE_IN_PROGRESS".into();
        let client = Arc::new(FakeProvisioningClient::new().with_stack(current, "{}"));

        let err = orchestrator(&client, Arc::new(AutoApprove), Arc::default())
            .delete("us-east-1", "vpc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StackctlError::Provider(ProviderError::StackBusy { .. })
        ));
    }
}

//! Waiting on stack operations.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DeployError, Result};
use crate::provider::{ProvisioningClient, StackEvent, StackStatus};

use super::report::Reporter;

/// Default time allowed for a stack operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Streams events of a running stack operation until it settles.
#[derive(Clone)]
pub struct StackMonitor {
    client: Arc<dyn ProvisioningClient>,
    reporter: Arc<dyn Reporter>,
    timeout: Duration,
}

impl std::fmt::Debug for StackMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackMonitor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StackMonitor {
    /// Creates a monitor.
    #[must_use]
    pub fn new(
        client: Arc<dyn ProvisioningClient>,
        reporter: Arc<dyn Reporter>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            reporter,
            timeout,
        }
    }

    /// Waits for `stack` to settle and returns its terminal status.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Timeout` if the stack is still running after the
    /// timeout, `DeployError::Failed` if it settled in a failed status, or the
    /// provider error if waiting failed.
    pub async fn wait(&self, region: &str, stack: &str) -> Result<StackStatus> {
        info!("Waiting for stack {stack}");

        let mut first_failure: Option<String> = None;
        let reporter = Arc::clone(&self.reporter);
        let mut on_event = |event: &StackEvent| {
            if first_failure.is_none() && event.status.ends_with("_FAILED") {
                first_failure = Some(
                    event
                        .status_reason
                        .clone()
                        .unwrap_or_else(|| format!("{} {}", event.logical_id, event.status)),
                );
            }
            reporter.stack_event(stack, event);
        };

        let waited = tokio::time::timeout(
            self.timeout,
            self.client.wait_for_stack(region, stack, &mut on_event),
        )
        .await;

        let Ok(status) = waited else {
            return Err(DeployError::Timeout {
                stack: stack.to_string(),
                secs: self.timeout.as_secs(),
            }
            .into());
        };
        let status = status?;

        debug!("Stack {stack} settled at {status}");
        if status.is_failure() {
            return Err(DeployError::Failed {
                stack: stack.to_string(),
                status: status.to_string(),
                reason: first_failure.unwrap_or_else(|| String::from("no reason reported")),
            }
            .into());
        }

        Ok(status)
    }
}

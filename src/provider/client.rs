//! Provisioning client capability.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ChangeSetInfo, StackDescription, StackEvent, StackInput, StackStatus};

/// Operations against the remote provisioning service, each scoped by region.
///
/// Implementations wrap every failure once, naming the operation and the
/// stack it targeted. Nothing here retries.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Describes a stack, returning `None` if it does not exist.
    async fn describe_stack(&self, region: &str, stack: &str) -> Result<Option<StackDescription>>;

    /// Returns the template body a stack was last deployed with.
    async fn get_template(&self, region: &str, stack: &str) -> Result<String>;

    /// Asks the service to check a template body.
    async fn validate_template(&self, region: &str, template_body: &str) -> Result<()>;

    /// Starts creating a stack and returns its identifier.
    async fn create_stack(&self, region: &str, input: &StackInput) -> Result<String>;

    /// Creates an update change set and waits until it is ready.
    ///
    /// A change set without changes is returned with `has_changes == false`
    /// rather than as an error. A change set the service accepted but could
    /// not compute is reported as `ChangeSetError::CreationFailed` carrying
    /// its id; it still exists and the caller deletes it.
    async fn create_change_set(&self, region: &str, input: &StackInput) -> Result<ChangeSetInfo>;

    /// Starts executing a change set.
    async fn execute_change_set(&self, region: &str, stack: &str, change_set: &str) -> Result<()>;

    /// Deletes a change set. A change set that is already gone is not an error.
    async fn delete_change_set(&self, region: &str, stack: &str, change_set: &str) -> Result<()>;

    /// Starts deleting a stack.
    async fn delete_stack(&self, region: &str, stack: &str) -> Result<()>;

    /// Waits until the stack reaches a terminal status.
    ///
    /// `on_event` is called for each new event, oldest first.
    async fn wait_for_stack(
        &self,
        region: &str,
        stack: &str,
        on_event: &mut (dyn for<'e> FnMut(&'e StackEvent) + Send),
    ) -> Result<StackStatus>;
}

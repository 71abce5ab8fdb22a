//! Scoped change set ownership.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ChangeSetError, Result};
use crate::provider::{ChangeSetInfo, ProvisioningClient};

/// A change set that exists on the service and must be deleted.
///
/// Call [`ScopedChangeSet::release`] on every exit path. A value dropped
/// without being released schedules a deletion on the current runtime and
/// logs a warning.
#[must_use = "change sets must be released"]
pub struct ScopedChangeSet {
    client: Arc<dyn ProvisioningClient>,
    region: String,
    stack: String,
    info: ChangeSetInfo,
    released: bool,
}

impl std::fmt::Debug for ScopedChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedChangeSet")
            .field("region", &self.region)
            .field("stack", &self.stack)
            .field("info", &self.info)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ScopedChangeSet {
    /// Takes ownership of a change set created for `stack`.
    pub(crate) fn new(
        client: Arc<dyn ProvisioningClient>,
        region: impl Into<String>,
        stack: impl Into<String>,
        info: ChangeSetInfo,
    ) -> Self {
        Self {
            client,
            region: region.into(),
            stack: stack.into(),
            info,
            released: false,
        }
    }

    /// Returns the change set details.
    #[must_use]
    pub const fn info(&self) -> &ChangeSetInfo {
        &self.info
    }

    /// Returns the change set identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Deletes the change set.
    ///
    /// # Errors
    ///
    /// Returns `ChangeSetError::CleanupFailed` if the service refused.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        debug!("Releasing change set {} of stack {}", self.info.name, self.stack);

        self.client
            .delete_change_set(&self.region, &self.stack, &self.info.id)
            .await
            .map_err(|e| {
                ChangeSetError::CleanupFailed {
                    stack: self.stack.clone(),
                    change_set: self.info.name.clone(),
                    message: e.to_string(),
                }
                .into()
            })
    }
}

impl Drop for ScopedChangeSet {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        warn!(
            "Change set {} of stack {} was not released, deleting it",
            self.info.name, self.stack
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let region = self.region.clone();
        let stack = self.stack.clone();
        let id = self.info.id.clone();
        handle.spawn(async move {
            if let Err(e) = client.delete_change_set(&region, &stack, &id).await {
                warn!("Failed to delete change set {id} of stack {stack}: {e}");
            }
        });
    }
}

//! Diff engine for comparing resolved stacks with deployed stacks.
//!
//! Templates are compared textually and, for existing stacks, through a
//! change set that lists resource-level impact. Parameters and tags are
//! compared key by key.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ChangeSetError, ProviderError, Result, StackctlError};
use crate::provider::{ChangeSetInfo, ProvisioningClient, StackDescription};
use crate::resolve::ResolvedStack;

use super::changeset::ScopedChangeSet;

/// Value the service returns for parameters declared with `NoEcho`.
const MASKED_VALUE: &str = "****";

/// What a diff compares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffScope {
    /// Template, parameters and tags.
    #[default]
    Full,
    /// Template and resource changes only.
    TemplateOnly,
    /// Parameters only.
    ParametersOnly,
    /// Tags only.
    TagsOnly,
}

impl DiffScope {
    const fn template(self) -> bool {
        matches!(self, Self::Full | Self::TemplateOnly)
    }

    const fn parameters(self) -> bool {
        matches!(self, Self::Full | Self::ParametersOnly)
    }

    const fn tags(self) -> bool {
        matches!(self, Self::Full | Self::TagsOnly)
    }
}

/// Options for a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// What to compare.
    pub scope: DiffScope,
    /// Keep the change set so the caller can execute it.
    pub keep_change_set: bool,
}

/// How a key differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Only in the proposed values.
    Added,
    /// Only in the current values.
    Removed,
    /// In both with different values.
    Modified,
}

/// A single key-level difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    /// Parameter or tag key.
    pub key: String,
    /// Kind of difference.
    pub kind: ChangeKind,
    /// Current value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    /// Proposed value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed: Option<String>,
}

/// Textual template comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDiff {
    /// Fingerprint of the deployed template, if any.
    pub current_hash: Option<String>,
    /// Fingerprint of the proposed template.
    pub proposed_hash: String,
    /// Lines only in the proposed template.
    pub lines_added: usize,
    /// Lines only in the deployed template.
    pub lines_removed: usize,
}

impl TemplateDiff {
    /// Compares two template bodies.
    #[must_use]
    pub fn compute(current: Option<&str>, proposed: &str) -> Self {
        let mut counts: BTreeMap<&str, isize> = BTreeMap::new();
        for line in proposed.lines().map(str::trim_end) {
            *counts.entry(line).or_default() += 1;
        }
        for line in current.unwrap_or_default().lines().map(str::trim_end) {
            *counts.entry(line).or_default() -= 1;
        }

        let lines_added = counts.values().filter(|c| **c > 0).map(|c| c.unsigned_abs()).sum();
        let lines_removed = counts.values().filter(|c| **c < 0).map(|c| c.unsigned_abs()).sum();

        Self {
            current_hash: current.map(fingerprint),
            proposed_hash: fingerprint(proposed),
            lines_added,
            lines_removed,
        }
    }

    /// Returns true if the templates are identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current_hash.as_deref() == Some(self.proposed_hash.as_str())
    }
}

/// Result of diffing one stack.
#[derive(Debug, Serialize)]
pub struct DiffResult {
    /// Stack name.
    pub stack: String,
    /// Context name.
    pub context: String,
    /// Whether the stack is deployed.
    pub stack_exists: bool,
    /// Template comparison, if in scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateDiff>,
    /// Parameter differences, if in scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ValueChange>>,
    /// Tag differences, if in scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<ValueChange>>,
    /// Change set computed by the service, if one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_set: Option<ChangeSetInfo>,
    /// Change set kept for execution.
    #[serde(skip)]
    retained: Option<ScopedChangeSet>,
}

impl DiffResult {
    /// Returns true if deploying would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.stack_exists
            || self.template.as_ref().is_some_and(|t| !t.is_empty())
            || self.parameters.as_ref().is_some_and(|p| !p.is_empty())
            || self.tags.as_ref().is_some_and(|t| !t.is_empty())
            || self.change_set.as_ref().is_some_and(|c| c.has_changes)
    }

    /// Takes the retained change set out of the result.
    pub fn take_change_set(&mut self) -> Option<ScopedChangeSet> {
        self.retained.take()
    }
}

/// Engine for computing stack diffs.
#[derive(Clone)]
pub struct DiffEngine {
    client: Arc<dyn ProvisioningClient>,
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine").finish_non_exhaustive()
    }
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub fn new(client: Arc<dyn ProvisioningClient>) -> Self {
        Self { client }
    }

    /// Compares a resolved stack with what is deployed.
    ///
    /// A change set is only created for deployed stacks when the template is
    /// in scope. It is deleted before returning unless
    /// `options.keep_change_set` is set and it contains changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be queried or the change set
    /// cannot be created.
    pub async fn diff(&self, stack: &ResolvedStack, options: DiffOptions) -> Result<DiffResult> {
        let current = self.client.describe_stack(&stack.region, &stack.name).await?;
        let scope = options.scope;

        let Some(current) = current else {
            debug!("Stack {} does not exist, everything is new", stack.name);
            return Ok(DiffResult {
                stack: stack.name.clone(),
                context: stack.context.clone(),
                stack_exists: false,
                template: scope
                    .template()
                    .then(|| TemplateDiff::compute(None, &stack.template_body)),
                parameters: scope
                    .parameters()
                    .then(|| compare_values(&BTreeMap::new(), &stack.parameters)),
                tags: scope.tags().then(|| compare_values(&BTreeMap::new(), &stack.tags)),
                change_set: None,
                retained: None,
            });
        };

        let mut result = DiffResult {
            stack: stack.name.clone(),
            context: stack.context.clone(),
            stack_exists: true,
            template: None,
            parameters: scope
                .parameters()
                .then(|| compare_values(&current.parameters, &stack.parameters)),
            tags: scope.tags().then(|| compare_values(&current.tags, &stack.tags)),
            change_set: None,
            retained: None,
        };

        if scope.template() {
            let deployed = self.client.get_template(&stack.region, &stack.name).await?;
            result.template = Some(TemplateDiff::compute(Some(&deployed), &stack.template_body));
            self.attach_change_set(stack, &current, options, &mut result).await?;
        }

        debug!(
            "Diff for {}: changes={}",
            stack.name,
            result.has_changes()
        );
        Ok(result)
    }

    async fn attach_change_set(
        &self,
        stack: &ResolvedStack,
        current: &StackDescription,
        options: DiffOptions,
        result: &mut DiffResult,
    ) -> Result<()> {
        if current.status.is_in_progress() {
            return Err(ProviderError::StackBusy {
                stack: stack.name.clone(),
                status: current.status.to_string(),
            }
            .into());
        }

        let info = match self
            .client
            .create_change_set(&stack.region, &stack.stack_input())
            .await
        {
            Ok(info) => info,
            Err(err) => {
                self.discard_failed(stack, &err).await;
                return Err(err);
            }
        };
        let has_changes = info.has_changes;
        result.change_set = Some(info.clone());

        let scoped = ScopedChangeSet::new(
            Arc::clone(&self.client),
            stack.region.clone(),
            stack.name.clone(),
            info,
        );

        if options.keep_change_set && has_changes {
            result.retained = Some(scoped);
        } else if let Err(e) = scoped.release().await {
            warn!("{e}");
        }
        Ok(())
    }

    /// Deletes a change set the service created but could not compute.
    async fn discard_failed(&self, stack: &ResolvedStack, err: &StackctlError) {
        let StackctlError::ChangeSet(ChangeSetError::CreationFailed {
            change_set: Some(id),
            ..
        }) = err
        else {
            return;
        };

        debug!("Deleting failed change set {id} of stack {}", stack.name);
        if let Err(e) = self
            .client
            .delete_change_set(&stack.region, &stack.name, id)
            .await
        {
            warn!("Failed to delete failed change set {id} of stack {}: {e}", stack.name);
        }
    }
}

/// Compares current and proposed key-value maps.
///
/// A masked current value is never reported as modified since the real
/// value cannot be read back.
fn compare_values(
    current: &BTreeMap<String, String>,
    proposed: &BTreeMap<String, String>,
) -> Vec<ValueChange> {
    let mut changes = Vec::new();

    for (key, value) in proposed {
        match current.get(key) {
            None => changes.push(ValueChange {
                key: key.clone(),
                kind: ChangeKind::Added,
                current: None,
                proposed: Some(value.clone()),
            }),
            Some(existing) if existing != value && existing != MASKED_VALUE => {
                changes.push(ValueChange {
                    key: key.clone(),
                    kind: ChangeKind::Modified,
                    current: Some(existing.clone()),
                    proposed: Some(value.clone()),
                });
            }
            Some(_) => {}
        }
    }

    for (key, value) in current {
        if !proposed.contains_key(key) {
            changes.push(ValueChange {
                key: key.clone(),
                kind: ChangeKind::Removed,
                current: Some(value.clone()),
                proposed: None,
            });
        }
    }

    changes
}

/// Returns the hex SHA-256 of a template body.
fn fingerprint(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

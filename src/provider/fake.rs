//! In-memory provisioning client for tests.
//!
//! Every call is recorded as `"<operation> <target>"` so tests can assert on
//! ordering and cleanup.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ChangeSetError, ProviderError, Result};

use super::client::ProvisioningClient;
use super::types::{
    ChangeAction, ChangeSetInfo, Replacement, ResourceChange, StackDescription, StackEvent,
    StackInput, StackStatus,
};

#[derive(Debug, Default)]
struct FakeState {
    stacks: BTreeMap<String, StackDescription>,
    templates: BTreeMap<String, String>,
    pending: BTreeMap<String, StackInput>,
    change_set_changes: Option<Vec<ResourceChange>>,
    created_outputs: BTreeMap<String, BTreeMap<String, String>>,
    final_status: BTreeMap<String, String>,
    failures: BTreeSet<String>,
    change_set_rejection: Option<String>,
    wait_delay: Option<Duration>,
    next_id: u32,
    calls: Vec<String>,
}

/// Fake provisioning service backed by a map of stacks.
#[derive(Debug, Default)]
pub struct FakeProvisioningClient {
    state: Mutex<FakeState>,
}

impl FakeProvisioningClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deployed stack with its template body.
    pub fn with_stack(self, description: StackDescription, template: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.templates.insert(description.name.clone(), template.to_string());
            state.stacks.insert(description.name.clone(), description);
        }
        self
    }

    /// Sets the resource changes reported by the next change sets.
    pub fn with_change_set_changes(self, changes: Vec<ResourceChange>) -> Self {
        self.state.lock().unwrap().change_set_changes = Some(changes);
        self
    }

    /// Sets the outputs a stack gets once created.
    pub fn with_created_outputs(self, stack: &str, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().created_outputs.insert(
            stack.to_string(),
            outputs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self
    }

    /// Makes `operation` fail for `target`.
    pub fn failing(self, operation: &str, target: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(format!("{operation} {target}"));
        self
    }

    /// Makes every change set fail to compute with `reason`.
    ///
    /// The failed change set stays pending until deleted, like on the service.
    pub fn rejecting_change_sets(self, reason: &str) -> Self {
        self.state.lock().unwrap().change_set_rejection = Some(reason.to_string());
        self
    }

    /// Returns the change sets created and not yet deleted.
    pub fn pending_change_sets(&self) -> Vec<String> {
        self.state.lock().unwrap().pending.keys().cloned().collect()
    }

    /// Makes the next wait on `stack` settle at `status`.
    pub fn settling_at(self, stack: &str, status: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .final_status
            .insert(stack.to_string(), status.to_string());
        self
    }

    /// Makes every wait sleep before settling.
    pub fn with_wait_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().wait_delay = Some(delay);
        self
    }

    /// Returns the recorded calls.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Returns the recorded calls for one operation.
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .collect()
    }

    /// Returns a stack as currently stored.
    pub fn stack(&self, name: &str) -> Option<StackDescription> {
        self.state.lock().unwrap().stacks.get(name).cloned()
    }

    fn record(&self, operation: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let call = format!("{operation} {target}");
        state.calls.push(call.clone());
        if state.failures.contains(&call) {
            return Err(ProviderError::request(operation, target, "injected failure").into());
        }
        Ok(())
    }
}

/// Builds a deployed stack description with outputs.
pub fn deployed(name: &str, outputs: &[(&str, &str)]) -> StackDescription {
    let mut description = StackDescription::new(name, "CREATE_COMPLETE");
    description.outputs = outputs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    description
}

/// A single in-place modification.
pub fn modify(logical_id: &str) -> ResourceChange {
    ResourceChange {
        action: ChangeAction::Modify,
        resource_type: String::from("AWS::EC2::VPC"),
        logical_id: logical_id.to_string(),
        replacement: Replacement::Never,
    }
}

#[async_trait]
impl ProvisioningClient for FakeProvisioningClient {
    async fn describe_stack(&self, _region: &str, stack: &str) -> Result<Option<StackDescription>> {
        self.record("describe_stack", stack)?;
        Ok(self.stack(stack))
    }

    async fn get_template(&self, _region: &str, stack: &str) -> Result<String> {
        self.record("get_template", stack)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .templates
            .get(stack)
            .cloned()
            .unwrap_or_default())
    }

    async fn validate_template(&self, _region: &str, _template_body: &str) -> Result<()> {
        self.record("validate_template", "template")
    }

    async fn create_stack(&self, _region: &str, input: &StackInput) -> Result<String> {
        self.record("create_stack", &input.name)?;
        let mut state = self.state.lock().unwrap();
        let mut description = StackDescription::new(&input.name, "CREATE_IN_PROGRESS");
        description.parameters.clone_from(&input.parameters);
        description.tags.clone_from(&input.tags);
        if let Some(outputs) = state.created_outputs.get(&input.name) {
            description.outputs.clone_from(outputs);
        }
        state.templates.insert(input.name.clone(), input.template_body.clone());
        state.stacks.insert(input.name.clone(), description);
        Ok(input.name.clone())
    }

    async fn create_change_set(&self, _region: &str, input: &StackInput) -> Result<ChangeSetInfo> {
        self.record("create_change_set", &input.name)?;
        let mut state = self.state.lock().unwrap();
        if !state.stacks.contains_key(&input.name) {
            return Err(ChangeSetError::CreationFailed {
                stack: input.name.clone(),
                change_set: None,
                reason: String::from("stack does not exist"),
            }
            .into());
        }

        state.next_id += 1;
        let id = format!("cs-{}", state.next_id);
        let changes = state.change_set_changes.clone().unwrap_or_default();
        state.pending.insert(id.clone(), input.clone());

        if let Some(reason) = state.change_set_rejection.clone() {
            return Err(ChangeSetError::CreationFailed {
                stack: input.name.clone(),
                change_set: Some(id),
                reason,
            }
            .into());
        }

        Ok(ChangeSetInfo {
            name: format!("stackctl-{}-{id}", input.name),
            has_changes: !changes.is_empty(),
            changes,
            id,
        })
    }

    async fn execute_change_set(&self, _region: &str, stack: &str, change_set: &str) -> Result<()> {
        self.record("execute_change_set", &format!("{stack}/{change_set}"))?;
        let mut state = self.state.lock().unwrap();
        let input = state.pending.get(change_set).cloned();
        if let (Some(input), Some(description)) = (input, state.stacks.get_mut(stack)) {
            description.status = StackStatus::new("UPDATE_IN_PROGRESS");
            description.parameters = input.parameters;
            description.tags = input.tags;
        }
        Ok(())
    }

    async fn delete_change_set(&self, _region: &str, stack: &str, change_set: &str) -> Result<()> {
        self.record("delete_change_set", &format!("{stack}/{change_set}"))?;
        self.state.lock().unwrap().pending.remove(change_set);
        Ok(())
    }

    async fn delete_stack(&self, _region: &str, stack: &str) -> Result<()> {
        self.record("delete_stack", stack)?;
        if let Some(description) = self.state.lock().unwrap().stacks.get_mut(stack) {
            description.status = StackStatus::new("DELETE_IN_PROGRESS");
        }
        Ok(())
    }

    async fn wait_for_stack(
        &self,
        _region: &str,
        stack: &str,
        on_event: &mut (dyn for<'e> FnMut(&'e StackEvent) + Send),
    ) -> Result<StackStatus> {
        self.record("wait_for_stack", stack)?;

        let delay = self.state.lock().unwrap().wait_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let status = {
            let mut state = self.state.lock().unwrap();
            let current = state
                .stacks
                .get(stack)
                .map_or(StackStatus::DELETE_COMPLETE, |d| d.status.as_str())
                .to_string();
            let settled = state.final_status.remove(stack).unwrap_or_else(|| {
                current
                    .strip_suffix("_IN_PROGRESS")
                    .map_or_else(|| current.clone(), |op| format!("{op}_COMPLETE"))
            });

            if settled == StackStatus::DELETE_COMPLETE {
                state.stacks.remove(stack);
            } else if let Some(description) = state.stacks.get_mut(stack) {
                description.status = StackStatus::new(settled.clone());
            }
            StackStatus::new(settled)
        };

        on_event(&StackEvent {
            timestamp: Utc::now(),
            resource_type: String::from("AWS::CloudFormation::Stack"),
            logical_id: stack.to_string(),
            status: status.to_string(),
            status_reason: None,
        });

        Ok(status)
    }
}

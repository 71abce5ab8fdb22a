//! AWS CloudFormation implementation of the provisioning client.

use async_trait::async_trait;
use aws_sdk_cloudformation as cfn;
use aws_sdk_cloudformation::error::{ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::{ChangeSetError, ProviderError, Result, StackctlError};

use super::cache::RegionalCache;
use super::client::ProvisioningClient;
use super::types::{
    ChangeAction, ChangeSetInfo, Replacement, ResourceChange, StackDescription, StackEvent,
    StackInput, StackStatus,
};

/// Default delay between event polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay between change set readiness polls.
const CHANGE_SET_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Events this much older than the start of a wait are still reported.
const EVENT_CLOCK_SKEW_SECS: i64 = 10;

/// Status reasons the service uses for a change set with nothing to do.
const NO_CHANGES_REASONS: &[&str] = &[
    "didn't contain changes",
    "No updates are to be performed",
];

/// Parameter names containing one of these are never logged in clear.
const SENSITIVE_KEYS: &[&str] = &["password", "secret", "token"];

/// Provisioning client backed by the CloudFormation API.
#[derive(Debug)]
pub struct AwsProvisioningClient {
    /// SDK clients by region.
    clients: RegionalCache<cfn::Client>,
    /// Delay between event polls.
    poll_interval: Duration,
}

impl Default for AwsProvisioningClient {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl AwsProvisioningClient {
    /// Creates a client that polls stack events at `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            clients: RegionalCache::new(),
            poll_interval,
        }
    }

    /// Returns the SDK client for a region, loading credentials on first use.
    async fn client(&self, region: &str) -> cfn::Client {
        self.clients
            .get_or_init(region, || async {
                let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(region.to_string()))
                    .load()
                    .await;
                cfn::Client::new(&config)
            })
            .await
    }

    /// Polls a change set until the service has finished computing it.
    ///
    /// Every failure past this point carries the change set id: the service
    /// keeps the change set and the caller has to delete it.
    async fn await_change_set(
        client: &cfn::Client,
        stack: &str,
        id: &str,
        name: &str,
    ) -> Result<ChangeSetInfo> {
        let failed = |reason: String| -> StackctlError {
            ChangeSetError::CreationFailed {
                stack: stack.to_string(),
                change_set: Some(id.to_string()),
                reason,
            }
            .into()
        };

        loop {
            let response = client
                .describe_change_set()
                .stack_name(stack)
                .change_set_name(id)
                .send()
                .await
                .map_err(|e| failed(sdk_error("DescribeChangeSet", stack, &e).to_string()))?;

            let status = opt::<cfn::types::ChangeSetStatus>(response.status())
                .map(|s| s.as_str().to_string())
                .unwrap_or_default();
            trace!("Change set {name} status: {status}");

            match status.as_str() {
                "CREATE_COMPLETE" => {
                    let mut changes: Vec<ResourceChange> =
                        response.changes().iter().filter_map(convert_change).collect();
                    let mut next_token = response.next_token().map(str::to_string);

                    while let Some(token) = next_token {
                        let page = client
                            .describe_change_set()
                            .stack_name(stack)
                            .change_set_name(id)
                            .next_token(token)
                            .send()
                            .await
                            .map_err(|e| {
                                failed(sdk_error("DescribeChangeSet", stack, &e).to_string())
                            })?;
                        changes.extend(page.changes().iter().filter_map(convert_change));
                        next_token = page.next_token().map(str::to_string);
                    }

                    return Ok(ChangeSetInfo {
                        id: id.to_string(),
                        name: name.to_string(),
                        has_changes: !changes.is_empty(),
                        changes,
                    });
                }
                "FAILED" => {
                    let reason = response.status_reason().unwrap_or_default();
                    if NO_CHANGES_REASONS.iter().any(|r| reason.contains(r)) {
                        debug!("Change set {name} contains no changes");
                        return Ok(ChangeSetInfo {
                            id: id.to_string(),
                            name: name.to_string(),
                            changes: Vec::new(),
                            has_changes: false,
                        });
                    }
                    return Err(failed(reason.to_string()));
                }
                _ => tokio::time::sleep(CHANGE_SET_POLL_INTERVAL).await,
            }
        }
    }

    /// Fetches events newer than `since`, oldest first.
    async fn new_events(
        client: &cfn::Client,
        stack: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StackEvent>> {
        let response = client
            .describe_stack_events()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeStackEvents", stack, &e))?;

        let mut events: Vec<StackEvent> = response
            .stack_events()
            .iter()
            .map(|event| StackEvent {
                timestamp: to_chrono(event.timestamp()).unwrap_or_else(Utc::now),
                resource_type: text(event.resource_type()),
                logical_id: text(event.logical_resource_id()),
                status: opt::<cfn::types::ResourceStatus>(event.resource_status())
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                status_reason: event.resource_status_reason().map(str::to_string),
            })
            .filter(|event| event.timestamp > since)
            .collect();

        // The service returns newest first.
        events.reverse();
        Ok(events)
    }
}

#[async_trait]
impl ProvisioningClient for AwsProvisioningClient {
    async fn describe_stack(&self, region: &str, stack: &str) -> Result<Option<StackDescription>> {
        debug!("Describing stack {stack} in {region}");
        let client = self.client(region).await;

        let response = match client.describe_stacks().stack_name(stack).send().await {
            Ok(response) => response,
            Err(e) if is_missing_stack(&e) => {
                debug!("Stack {stack} does not exist");
                return Ok(None);
            }
            Err(e) => return Err(sdk_error("DescribeStacks", stack, &e).into()),
        };

        let Some(found) = response.stacks().first() else {
            return Ok(None);
        };

        let status = opt::<cfn::types::StackStatus>(found.stack_status())
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();

        Ok(Some(StackDescription {
            name: text(found.stack_name()),
            id: text(found.stack_id()),
            status: StackStatus::new(status),
            status_reason: found.stack_status_reason().map(str::to_string),
            description: found.description().map(str::to_string),
            parameters: found
                .parameters()
                .iter()
                .filter_map(|p| {
                    Some((
                        p.parameter_key()?.to_string(),
                        p.parameter_value().unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            tags: found
                .tags()
                .iter()
                .map(|t| (text(t.key()), text(t.value())))
                .collect(),
            outputs: found
                .outputs()
                .iter()
                .filter_map(|o| {
                    Some((
                        o.output_key()?.to_string(),
                        o.output_value().unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            created_at: to_chrono(found.creation_time()),
            updated_at: to_chrono(found.last_updated_time()),
        }))
    }

    async fn get_template(&self, region: &str, stack: &str) -> Result<String> {
        let client = self.client(region).await;
        let response = client
            .get_template()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| sdk_error("GetTemplate", stack, &e))?;

        Ok(response.template_body().unwrap_or_default().to_string())
    }

    async fn validate_template(&self, region: &str, template_body: &str) -> Result<()> {
        debug!("Validating template ({} bytes)", template_body.len());
        let client = self.client(region).await;
        client
            .validate_template()
            .template_body(template_body)
            .send()
            .await
            .map_err(|e| sdk_error("ValidateTemplate", "template", &e))?;
        Ok(())
    }

    async fn create_stack(&self, region: &str, input: &StackInput) -> Result<String> {
        info!("Creating stack {} in {region}", input.name);
        log_parameters(&input.parameters);
        let client = self.client(region).await;

        let response = client
            .create_stack()
            .stack_name(&input.name)
            .template_body(&input.template_body)
            .set_parameters(Some(sdk_parameters(&input.parameters)))
            .set_tags(Some(sdk_tags(&input.tags)))
            .set_capabilities(Some(sdk_capabilities(&input.capabilities)))
            .send()
            .await
            .map_err(|e| sdk_error("CreateStack", &input.name, &e))?;

        Ok(response.stack_id().unwrap_or(&input.name).to_string())
    }

    async fn create_change_set(&self, region: &str, input: &StackInput) -> Result<ChangeSetInfo> {
        let name = change_set_name(&input.name);
        info!("Creating change set {name} for stack {}", input.name);
        log_parameters(&input.parameters);
        let client = self.client(region).await;

        let response = client
            .create_change_set()
            .stack_name(&input.name)
            .change_set_name(&name)
            .change_set_type(cfn::types::ChangeSetType::Update)
            .template_body(&input.template_body)
            .set_parameters(Some(sdk_parameters(&input.parameters)))
            .set_tags(Some(sdk_tags(&input.tags)))
            .set_capabilities(Some(sdk_capabilities(&input.capabilities)))
            .send()
            .await
            .map_err(|e| sdk_error("CreateChangeSet", &input.name, &e))?;

        let id = response.id().unwrap_or(&name).to_string();
        Self::await_change_set(&client, &input.name, &id, &name).await
    }

    async fn execute_change_set(&self, region: &str, stack: &str, change_set: &str) -> Result<()> {
        info!("Executing change set {change_set} on stack {stack}");
        let client = self.client(region).await;
        client
            .execute_change_set()
            .stack_name(stack)
            .change_set_name(change_set)
            .send()
            .await
            .map_err(|e| sdk_error("ExecuteChangeSet", stack, &e))?;
        Ok(())
    }

    async fn delete_change_set(&self, region: &str, stack: &str, change_set: &str) -> Result<()> {
        debug!("Deleting change set {change_set} of stack {stack}");
        let client = self.client(region).await;
        match client
            .delete_change_set()
            .stack_name(stack)
            .change_set_name(change_set)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.code().is_some_and(|c| c.starts_with("ChangeSetNotFound")) => {
                debug!("Change set {change_set} already gone");
                Ok(())
            }
            Err(e) => Err(sdk_error("DeleteChangeSet", stack, &e).into()),
        }
    }

    async fn delete_stack(&self, region: &str, stack: &str) -> Result<()> {
        info!("Deleting stack {stack} in {region}");
        let client = self.client(region).await;
        client
            .delete_stack()
            .stack_name(stack)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteStack", stack, &e))?;
        Ok(())
    }

    async fn wait_for_stack(
        &self,
        region: &str,
        stack: &str,
        on_event: &mut (dyn for<'e> FnMut(&'e StackEvent) + Send),
    ) -> Result<StackStatus> {
        let client = self.client(region).await;
        let mut last_seen = Utc::now() - chrono::Duration::seconds(EVENT_CLOCK_SKEW_SECS);

        loop {
            match Self::new_events(&client, stack, last_seen).await {
                Ok(events) => {
                    for event in &events {
                        on_event(event);
                        last_seen = last_seen.max(event.timestamp);
                    }
                }
                Err(e) => warn!("Failed to fetch events for {stack}: {e}"),
            }

            let Some(description) = self.describe_stack(region, stack).await? else {
                return Ok(StackStatus::new(StackStatus::DELETE_COMPLETE));
            };

            if description.status.is_terminal() {
                debug!("Stack {stack} settled at {}", description.status);
                return Ok(description.status);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Wraps an SDK failure with the operation and target it concerned.
fn sdk_error<E, R>(operation: &str, target: &str, err: &SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let retryable = matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_))
        || err.code().is_some_and(|c| c.starts_with("Throttling"));

    ProviderError::Request {
        operation: operation.to_string(),
        target: target.to_string(),
        message: err.message().map_or_else(|| err.to_string(), str::to_string),
        retryable,
    }
}

/// Returns true for the validation error DescribeStacks raises for unknown stacks.
fn is_missing_stack<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.code() == Some("ValidationError")
        && err.message().is_some_and(|m| m.contains("does not exist"))
}

fn to_chrono<'a>(time: impl Into<Option<&'a cfn::primitives::DateTime>>) -> Option<DateTime<Utc>> {
    let time = time.into()?;
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Reads an SDK field whether or not the model marks it optional.
fn opt<'a, T>(value: impl Into<Option<&'a T>>) -> Option<&'a T> {
    value.into()
}

/// Reads an SDK string field whether or not the model marks it optional.
fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

fn convert_change(change: &cfn::types::Change) -> Option<ResourceChange> {
    let resource = change.resource_change()?;
    Some(ResourceChange {
        action: resource
            .action()
            .map_or(ChangeAction::Dynamic, |a| ChangeAction::from(a.as_str())),
        resource_type: resource.resource_type().unwrap_or_default().to_string(),
        logical_id: resource.logical_resource_id().unwrap_or_default().to_string(),
        replacement: resource
            .replacement()
            .map_or(Replacement::Never, |r| Replacement::from(r.as_str())),
    })
}

fn sdk_parameters(parameters: &BTreeMap<String, String>) -> Vec<cfn::types::Parameter> {
    parameters
        .iter()
        .map(|(key, value)| {
            cfn::types::Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn sdk_tags(tags: &BTreeMap<String, String>) -> Vec<cfn::types::Tag> {
    tags.iter()
        .map(|(key, value)| cfn::types::Tag::builder().key(key).value(value).build())
        .collect()
}

fn sdk_capabilities(capabilities: &[String]) -> Vec<cfn::types::Capability> {
    capabilities
        .iter()
        .map(|c| cfn::types::Capability::from(c.as_str()))
        .collect()
}

/// Builds a unique change set name for a stack.
fn change_set_name(stack: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("stackctl-{stack}-{}", &suffix[..8])
}

fn log_parameters(parameters: &BTreeMap<String, String>) {
    for (key, value) in parameters {
        debug!("  {key} = {}", redact(key, value));
    }
}

/// Hides values of parameters whose name suggests a credential.
pub(crate) fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    let lowered = key.to_lowercase();
    if SENSITIVE_KEYS.iter().any(|k| lowered.contains(k)) {
        "[REDACTED]"
    } else {
        value
    }
}

//! Provisioning service types and data structures.
//!
//! These are the provider-neutral shapes the planner works with. The AWS
//! implementation converts SDK types into them at the client boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current state of a deployed stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    /// Stack name.
    pub name: String,
    /// Stack identifier assigned by the service.
    pub id: String,
    /// Current status.
    pub status: StackStatus,
    /// Reason for the current status, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// Template description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Deployed parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Deployed tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Stack outputs.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StackDescription {
    /// Creates a description with the given name and status and nothing else.
    #[must_use]
    pub fn new(name: impl Into<String>, status: impl Into<StackStatus>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            status: status.into(),
            status_reason: None,
            description: None,
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            outputs: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A stack status as reported by the service, e.g. `UPDATE_COMPLETE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackStatus(String);

/// Terminal statuses that mean the last operation succeeded.
const SUCCESS_STATUSES: &[&str] = &[
    "CREATE_COMPLETE",
    "UPDATE_COMPLETE",
    "DELETE_COMPLETE",
    "IMPORT_COMPLETE",
];

impl StackStatus {
    /// Status reported for a stack that no longer exists.
    pub const DELETE_COMPLETE: &'static str = "DELETE_COMPLETE";

    /// Creates a status from its service name.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Returns the raw status name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true while an operation is running on the stack.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.0.ends_with("_IN_PROGRESS")
    }

    /// Returns true once the stack has settled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// Returns true if the stack settled in a failed or rolled-back state.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.is_terminal() && !SUCCESS_STATUSES.contains(&self.0.as_str())
    }
}

impl From<&str> for StackStatus {
    fn from(status: &str) -> Self {
        Self::new(status)
    }
}

impl From<String> for StackStatus {
    fn from(status: String) -> Self {
        Self(status)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single stack event streamed while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Resource type, e.g. `AWS::EC2::VPC`.
    pub resource_type: String,
    /// Logical resource identifier.
    pub logical_id: String,
    /// Resource status.
    pub status: String,
    /// Status reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

/// A prepared change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetInfo {
    /// Change set identifier.
    pub id: String,
    /// Change set name.
    pub name: String,
    /// Proposed resource changes.
    pub changes: Vec<ResourceChange>,
    /// False when the service found nothing to change.
    pub has_changes: bool,
}

/// A proposed change to a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// What happens to the resource.
    pub action: ChangeAction,
    /// Resource type.
    pub resource_type: String,
    /// Logical resource identifier.
    pub logical_id: String,
    /// Whether the resource is replaced.
    pub replacement: Replacement,
}

/// Action a change set takes on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Resource is created.
    Add,
    /// Resource is updated.
    Modify,
    /// Resource is deleted.
    Remove,
    /// Resource is imported.
    Import,
    /// Resource changes depend on runtime evaluation.
    Dynamic,
    /// An action this tool does not know.
    Other(String),
}

impl From<&str> for ChangeAction {
    fn from(action: &str) -> Self {
        match action {
            "Add" => Self::Add,
            "Modify" => Self::Modify,
            "Remove" => Self::Remove,
            "Import" => Self::Import,
            "Dynamic" => Self::Dynamic,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("Add"),
            Self::Modify => f.write_str("Modify"),
            Self::Remove => f.write_str("Remove"),
            Self::Import => f.write_str("Import"),
            Self::Dynamic => f.write_str("Dynamic"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// Whether a modified resource must be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Replacement {
    /// Updated in place.
    #[default]
    Never,
    /// Replaced depending on property values only known at execution.
    Conditional,
    /// Always replaced.
    Always,
}

impl From<&str> for Replacement {
    fn from(replacement: &str) -> Self {
        match replacement {
            "True" => Self::Always,
            "Conditional" => Self::Conditional,
            _ => Self::Never,
        }
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("No"),
            Self::Conditional => f.write_str("Conditional"),
            Self::Always => f.write_str("Yes"),
        }
    }
}

/// Everything the service needs to create or update a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInput {
    /// Stack name.
    pub name: String,
    /// Template body.
    pub template_body: String,
    /// Parameter values.
    pub parameters: BTreeMap<String, String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
    /// Capabilities to acknowledge.
    pub capabilities: Vec<String>,
}

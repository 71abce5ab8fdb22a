//! Planning and execution of stack operations.
//!
//! This module compares resolved stacks with what is deployed and drives
//! the create, update and delete lifecycles of single stacks.

mod changeset;
mod delete;
mod deploy;
mod diff;
mod monitor;
mod report;

pub use changeset::ScopedChangeSet;
pub use delete::{DeleteOutcome, DeletionOrchestrator};
pub use deploy::{DeployOutcome, DeploymentOrchestrator};
pub use diff::{ChangeKind, DiffEngine, DiffOptions, DiffResult, DiffScope, TemplateDiff, ValueChange};
pub use monitor::{DEFAULT_TIMEOUT, StackMonitor};
pub use report::{CreatePreview, Reporter};

#[cfg(test)]
pub(crate) use report::testing;

//! Remote provisioning service integration.
//!
//! This module provides the client capability the resolver and planner work
//! against, the provider-neutral types it exchanges, the per-region client
//! cache and the CloudFormation implementation.

mod aws;
mod cache;
mod client;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub(crate) use aws::redact;
pub use aws::{AwsProvisioningClient, DEFAULT_POLL_INTERVAL};
pub use cache::RegionalCache;
pub use client::ProvisioningClient;
pub use types::{
    ChangeAction, ChangeSetInfo, Replacement, ResourceChange, StackDescription, StackEvent,
    StackInput, StackStatus,
};

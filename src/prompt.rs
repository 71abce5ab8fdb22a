//! Confirmation prompts and cooperative cancellation.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::error::{PromptError, Result};

/// Asks the operator to approve a mutating action.
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmationPrompter: Send + Sync {
    /// Returns true if the action was approved.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer could be obtained.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Prompts on stderr and reads the answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompter;

impl StdinPrompter {
    /// Creates a new stdin prompter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ConfirmationPrompter for StdinPrompter {
    fn confirm(&self, message: &str) -> Result<bool> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Err(PromptError::NotInteractive.into());
        }

        eprint!("{message} [y/N]: ");
        std::io::stderr()
            .flush()
            .map_err(|e| PromptError::Io { message: e.to_string() })?;

        let mut input = String::new();
        stdin
            .lock()
            .read_line(&mut input)
            .map_err(|e| PromptError::Io { message: e.to_string() })?;

        Ok(is_yes(&input))
    }
}

/// Approves everything without asking (`--yes`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl ConfirmationPrompter for AutoApprove {
    fn confirm(&self, message: &str) -> Result<bool> {
        debug!("Auto-approved: {message}");
        Ok(true)
    }
}

fn is_yes(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// A token for cooperative cancellation.
///
/// Clones share state. Cancellation is idempotent and the first reason is kept.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    reason: OnceLock<String>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            warn!("Cancellation requested: {reason}");
            let _ = self.inner.reason.set(reason);
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.inner.reason.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_auto_approve() {
        assert!(AutoApprove.confirm("Create stack 'vpc'?").unwrap());
    }

    #[test]
    fn test_token_first_reason_wins() {
        let token = CancellationToken::new();
        let shared = token.clone();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());

        shared.cancel("interrupted");
        shared.cancel("again");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("interrupted"));
    }
}

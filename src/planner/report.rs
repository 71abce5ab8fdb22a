//! Progress reporting from the orchestrators.

use serde::Serialize;

use crate::provider::{StackDescription, StackEvent};

use super::diff::DiffResult;

/// What a stack creation is about to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePreview {
    /// Stack name.
    pub stack: String,
    /// Target region.
    pub region: String,
    /// Template location.
    pub template: String,
    /// Number of parameters.
    pub parameter_count: usize,
    /// Number of tags.
    pub tag_count: usize,
    /// Capabilities acknowledged.
    pub capabilities: Vec<String>,
}

/// Receives previews and events as a stack operation progresses.
pub trait Reporter: Send + Sync {
    /// A new stack is about to be created.
    fn create_preview(&self, preview: &CreatePreview);

    /// An existing stack differs from its resolved configuration.
    fn diff(&self, diff: &DiffResult);

    /// A stack is about to be deleted.
    fn delete_preview(&self, stack: &StackDescription);

    /// An event arrived while waiting on a stack.
    fn stack_event(&self, stack: &str, event: &StackEvent);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Reporter that keeps a line per callback.
    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        lines: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        fn push(&self, line: String) {
            self.lines.lock().unwrap().push(line);
        }
    }

    impl Reporter for RecordingReporter {
        fn create_preview(&self, preview: &CreatePreview) {
            self.push(format!("create {}", preview.stack));
        }

        fn diff(&self, diff: &DiffResult) {
            self.push(format!("diff {} changes={}", diff.stack, diff.has_changes()));
        }

        fn delete_preview(&self, stack: &StackDescription) {
            self.push(format!("delete {}", stack.name));
        }

        fn stack_event(&self, stack: &str, event: &StackEvent) {
            self.push(format!("event {stack} {}", event.status));
        }
    }
}

//! Output formatting for CLI commands.
//!
//! Results are rendered as strings for stdout. Progress (previews and stack
//! events) goes to stderr through the [`Reporter`] implementation so that
//! stdout stays machine-readable with `--output json`.

use colored::Colorize;
use serde::Serialize;
use std::fmt::{self, Write};
use tabled::{Table, Tabled};

use crate::config::{ProjectConfig, ValidationResult};
use crate::planner::{ChangeKind, CreatePreview, DiffResult, Reporter, ValueChange};
use crate::provider::{ChangeAction, Replacement, StackDescription, StackEvent};
use crate::runner::RunReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource change row for table display.
#[derive(Tabled)]
struct ResourceChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Logical ID")]
    logical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Replacement")]
    replacement: String,
}

/// Parameter or tag change row for table display.
#[derive(Tabled)]
struct ValueChangeRow {
    #[tabled(rename = "")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Proposed")]
    proposed: String,
}

/// Stack row for describe output.
#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "Stack")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last change")]
    updated: String,
    #[tabled(rename = "Outputs")]
    outputs: String,
}

/// Run result row.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Stack")]
    stack: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a deploy, delete or validate run.
    #[must_use]
    pub fn format_report<T: Serialize + fmt::Display>(&self, title: &str, report: &RunReport<T>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\n{}\n", title.bold());

                let mut rows: Vec<ResultRow> = report
                    .completed
                    .iter()
                    .map(|(stack, outcome)| ResultRow {
                        stack: stack.clone(),
                        result: outcome.to_string(),
                    })
                    .collect();
                if let Some((stack, message)) = &report.failed {
                    rows.push(ResultRow {
                        stack: stack.clone(),
                        result: format!("failed: {}", Self::truncate(message, 80)),
                    });
                }

                if rows.is_empty() {
                    output.push_str("   Nothing to do.\n");
                } else {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                output.push_str(&Self::summary(report.completed.len(), report.failed.as_ref()));
                output
            }
        }
    }

    /// Formats the result of a diff run.
    #[must_use]
    pub fn format_diff_report(&self, report: &RunReport<DiffResult>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for (_, diff) in &report.completed {
                    output.push_str(&Self::format_diff_text(diff));
                }
                output.push_str(&Self::summary(report.completed.len(), report.failed.as_ref()));
                output
            }
        }
    }

    /// Formats a single diff.
    #[must_use]
    pub fn format_diff(&self, diff: &DiffResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(diff).unwrap_or_default(),
            OutputFormat::Text => Self::format_diff_text(diff),
        }
    }

    fn format_diff_text(diff: &DiffResult) -> String {
        let mut output = format!("\nStack {} ({})\n", diff.stack.bold(), diff.context);

        if !diff.has_changes() {
            let _ = writeln!(output, "{} No changes.", "✓".green());
            return output;
        }
        if !diff.stack_exists {
            let _ = writeln!(output, "   {} stack will be created", "+".green());
        }

        if let Some(template) = diff.template.as_ref().filter(|t| !t.is_empty()) {
            let _ = writeln!(
                output,
                "   Template: {} lines, {} lines",
                format!("+{}", template.lines_added).green(),
                format!("-{}", template.lines_removed).red()
            );
        }

        if let Some(change_set) = diff.change_set.as_ref().filter(|c| !c.changes.is_empty()) {
            let rows: Vec<ResourceChangeRow> = change_set
                .changes
                .iter()
                .map(|c| ResourceChangeRow {
                    action: Self::format_action(&c.action),
                    logical_id: c.logical_id.clone(),
                    resource_type: c.resource_type.clone(),
                    replacement: Self::format_replacement(c.replacement),
                })
                .collect();
            output.push_str("   Resources:\n");
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        for (label, changes) in [("Parameters", &diff.parameters), ("Tags", &diff.tags)] {
            if let Some(changes) = changes.as_ref().filter(|c| !c.is_empty()) {
                let _ = writeln!(output, "   {label}:");
                output.push_str(&Table::new(changes.iter().map(Self::value_row)).to_string());
                output.push('\n');
            }
        }

        output
    }

    /// Formats the deployed state of stacks.
    #[must_use]
    pub fn format_describe(&self, stacks: &[(String, Option<StackDescription>)]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<DescribeJson<'_>> = stacks
                    .iter()
                    .map(|(name, description)| DescribeJson {
                        name,
                        exists: description.is_some(),
                        stack: description.as_ref(),
                    })
                    .collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<StackRow> = stacks
                    .iter()
                    .map(|(name, description)| match description {
                        None => StackRow {
                            name: name.clone(),
                            status: "not deployed".dimmed().to_string(),
                            updated: String::new(),
                            outputs: String::new(),
                        },
                        Some(d) => StackRow {
                            name: name.clone(),
                            status: Self::format_status(d.status.as_str()),
                            updated: d
                                .updated_at
                                .or(d.created_at)
                                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                                .unwrap_or_default(),
                            outputs: d
                                .outputs
                                .iter()
                                .map(|(k, v)| format!("{k}={}", Self::truncate(v, 40)))
                                .collect::<Vec<_>>()
                                .join("\n"),
                        },
                    })
                    .collect();

                if rows.is_empty() {
                    return String::from("No stacks defined.\n");
                }
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats the contexts and stacks of a project.
    #[must_use]
    pub fn format_list(&self, config: &ProjectConfig) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "project": config.project,
                    "contexts": config.context_names(),
                    "stacks": config.stack_names(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("\nProject: {}\n\nContexts:\n", config.project.bold());
                for (name, context) in &config.contexts {
                    let region = config.region_for(context).unwrap_or("-");
                    let _ = writeln!(output, "   {name} ({region})");
                }
                output.push_str("\nStacks:\n");
                for (name, stack) in &config.stacks {
                    if stack.depends_on.is_empty() {
                        let _ = writeln!(output, "   {name}");
                    } else {
                        let _ = writeln!(output, "   {name} -> {}", stack.depends_on.join(", "));
                    }
                }
                output
            }
        }
    }

    /// Formats configuration validation findings.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                for error in &result.errors {
                    let _ = writeln!(output, "{} {error}", "✗".red());
                }
                for warning in &result.warnings {
                    let _ = writeln!(output, "{} {warning}", "⚠".yellow());
                }
                if result.is_valid() {
                    let _ = writeln!(
                        output,
                        "{} Configuration is valid ({} warning(s))",
                        "✓".green(),
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    fn summary(completed: usize, failed: Option<&(String, String)>) -> String {
        match failed {
            None => format!("\n{} {completed} stack(s) processed\n", "✓".green()),
            Some((stack, message)) => format!(
                "\n{} Stopped at {stack} after {completed} stack(s): {message}\n",
                "✗".red()
            ),
        }
    }

    fn value_row(change: &ValueChange) -> ValueChangeRow {
        let kind = match change.kind {
            ChangeKind::Added => "+".green().to_string(),
            ChangeKind::Removed => "-".red().to_string(),
            ChangeKind::Modified => "~".yellow().to_string(),
        };
        ValueChangeRow {
            kind,
            key: change.key.clone(),
            current: change.current.as_deref().map(|v| Self::truncate(v, 40)).unwrap_or_default(),
            proposed: change.proposed.as_deref().map(|v| Self::truncate(v, 40)).unwrap_or_default(),
        }
    }

    /// Formats a change action with color.
    fn format_action(action: &ChangeAction) -> String {
        match action {
            ChangeAction::Add => "+add".green().to_string(),
            ChangeAction::Modify => "~modify".yellow().to_string(),
            ChangeAction::Remove => "-remove".red().to_string(),
            other => other.to_string().dimmed().to_string(),
        }
    }

    fn format_replacement(replacement: Replacement) -> String {
        match replacement {
            Replacement::Never => replacement.to_string(),
            Replacement::Conditional => replacement.to_string().yellow().to_string(),
            Replacement::Always => replacement.to_string().red().bold().to_string(),
        }
    }

    /// Formats a stack or resource status with color.
    fn format_status(status: &str) -> String {
        if status.ends_with("_FAILED") || status.contains("ROLLBACK") {
            status.red().to_string()
        } else if status.ends_with("_IN_PROGRESS") {
            status.yellow().to_string()
        } else {
            status.green().to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    fn progress(&self, text: String, json: &impl Serialize) {
        match self.format {
            OutputFormat::Json => eprintln!("{}", serde_json::to_string(json).unwrap_or_default()),
            OutputFormat::Text => eprintln!("{text}"),
        }
    }
}

impl Reporter for OutputFormatter {
    fn create_preview(&self, preview: &CreatePreview) {
        let mut text = format!(
            "\n{} Stack {} will be created in {}\n   Template: {}\n   Parameters: {}\n   Tags: {}",
            "+".green(),
            preview.stack.bold(),
            preview.region,
            preview.template,
            preview.parameter_count,
            preview.tag_count
        );
        if !preview.capabilities.is_empty() {
            let _ = write!(text, "\n   Capabilities: {}", preview.capabilities.join(", "));
        }
        self.progress(text, preview);
    }

    fn diff(&self, diff: &DiffResult) {
        self.progress(Self::format_diff_text(diff), diff);
    }

    fn delete_preview(&self, stack: &StackDescription) {
        let mut text = format!(
            "\n{} Stack {} ({}) will be deleted",
            "-".red(),
            stack.name.bold(),
            stack.status
        );
        if let Some(description) = &stack.description {
            let _ = write!(text, "\n   {description}");
        }
        self.progress(text, stack);
    }

    fn stack_event(&self, stack: &str, event: &StackEvent) {
        let mut text = format!(
            "   {} {stack} {} {} {}",
            event.timestamp.format("%H:%M:%S"),
            Self::format_status(&event.status),
            event.logical_id,
            event.resource_type.dimmed()
        );
        if let Some(reason) = &event.status_reason {
            let _ = write!(text, " ({reason})");
        }
        self.progress(text, event);
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct DescribeJson<'a> {
    name: &'a str,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a StackDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::DeployOutcome;
    use crate::provider::fake::deployed;

    fn report() -> RunReport<DeployOutcome> {
        RunReport {
            completed: vec![(String::from("vpc"), DeployOutcome::NoChanges)],
            failed: Some((String::from("database"), String::from("boom"))),
        }
    }

    #[test]
    fn test_text_report() {
        colored::control::set_override(false);
        let output = OutputFormatter::new(OutputFormat::Text).format_report("Deploy", &report());
        assert!(output.contains("no changes"));
        assert!(output.contains("failed: boom"));
        assert!(output.contains("Stopped at database after 1 stack(s)"));
    }

    #[test]
    fn test_json_report() {
        let output = OutputFormatter::new(OutputFormat::Json).format_report("Deploy", &report());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["completed"][0][0], "vpc");
        assert_eq!(value["completed"][0][1]["outcome"], "no_changes");
        assert_eq!(value["failed"][0], "database");
    }

    #[test]
    fn test_describe_missing_stack() {
        colored::control::set_override(false);
        let stacks = vec![
            (String::from("vpc"), Some(deployed("vpc", &[("VpcId", "vpc-123")]))),
            (String::from("app"), None),
        ];
        let output = OutputFormatter::new(OutputFormat::Text).format_describe(&stacks);
        assert!(output.contains("VpcId=vpc-123"));
        assert!(output.contains("not deployed"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a-very-long-value", 8), "a-ver...");
    }
}

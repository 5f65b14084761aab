//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use harvest_core::RunStatus;

use super::json::{CheckpointsOutput, EndpointOutput, NamesOutput, RunOutput, StatusOutput};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats the result of a run.
    pub fn format_run(&self, run: &RunOutput) -> String {
        if run.skipped {
            return format!(
                "{} {} (last extraction {})",
                self.bold(&run.endpoint),
                self.dim("skipped: data is complete and fresh"),
                format_time(run.last_extraction)
            );
        }

        let mut lines = vec![format!(
            "{} {}",
            self.bold(&run.endpoint),
            self.completeness(run.is_complete)
        )];
        lines.push(format!(
            "  {} records, {} pages, {} failed",
            run.total_records, run.total_pages, run.failed_pages
        ));
        let strategy = if run.used_fallback { "paginated" } else { "bulk" };
        let mut detail = format!("  strategy: {strategy}, {:.1}s", run.duration_seconds);
        if let Some(page) = run.resumed_from_page {
            detail.push_str(&format!(", resumed at page {page}"));
        }
        lines.push(self.dim(&detail));
        for note in &run.completeness_notes {
            lines.push(format!("  {}", self.color(YELLOW, note)));
        }
        lines.join("\n")
    }

    /// Formats one registry entry in detail.
    pub fn format_endpoint(&self, endpoint: &EndpointOutput) -> String {
        let mut lines = vec![format!(
            "{} {}",
            self.bold(&endpoint.name),
            self.completeness(endpoint.is_complete)
        )];
        lines.push(format!("  category:        {}", endpoint.category));
        lines.push(format!("  file:            {}", endpoint.filename));
        lines.push(format!("  records:         {}", endpoint.total_records));
        lines.push(format!(
            "  last run:        {}{}",
            format_time(endpoint.last_extraction),
            endpoint
                .last_status
                .map(|s| format!(" ({})", self.status(s)))
                .unwrap_or_default()
        ));
        lines.push(format!(
            "  last success:    {}",
            format_time(endpoint.last_successful_extraction)
        ));
        lines.push(format!("  runs in history: {}", endpoint.runs));
        if let Some(error) = &endpoint.last_error {
            lines.push(format!("  {}", self.color(RED, error)));
        }
        for note in &endpoint.completeness_notes {
            lines.push(format!("  {}", self.color(YELLOW, note)));
        }
        lines.join("\n")
    }

    /// Formats the registry overview.
    pub fn format_status(&self, status: &StatusOutput) -> String {
        let summary = &status.summary;
        let mut lines = vec![
            self.bold("Extraction registry"),
            self.dim(&format!("  {}", status.registry)),
            format!(
                "  {} endpoints, {} complete, {} incomplete, {} records",
                summary.total_endpoints,
                summary.complete_endpoints,
                summary.incomplete_endpoints,
                summary.total_records
            ),
        ];
        if !status.endpoints.is_empty() {
            lines.push(String::new());
        }
        for endpoint in &status.endpoints {
            lines.push(format!(
                "  {:<24} {:>10} records  {}  {}",
                endpoint.name,
                endpoint.total_records,
                self.completeness(endpoint.is_complete),
                self.dim(&format_time(endpoint.last_extraction))
            ));
        }
        lines.join("\n")
    }

    /// Formats a titled name list.
    pub fn format_names(&self, names: &NamesOutput) -> String {
        if names.names.is_empty() {
            return format!("{}: {}", self.bold(&names.title), self.dim("none"));
        }
        let mut lines = vec![format!("{} ({})", self.bold(&names.title), names.names.len())];
        lines.extend(names.names.iter().map(|name| format!("  {name}")));
        lines.join("\n")
    }

    /// Formats the checkpoint listing.
    pub fn format_checkpoints(&self, output: &CheckpointsOutput) -> String {
        if output.checkpoints.is_empty() {
            return format!("{}: {}", self.bold("Checkpoints"), self.dim("none"));
        }
        let mut lines = vec![
            format!("{} ({})", self.bold("Checkpoints"), output.checkpoints.len()),
            self.dim(&format!("  {}", output.dir)),
        ];
        for checkpoint in &output.checkpoints {
            lines.push(format!(
                "  {:<32} page {:>6}  {:>10} records  {}",
                checkpoint.extraction_id,
                checkpoint.last_page,
                checkpoint.total_records,
                self.dim(&format_time(Some(checkpoint.timestamp)))
            ));
        }
        lines.join("\n")
    }

    fn completeness(&self, complete: bool) -> String {
        if complete {
            self.color(GREEN, "complete")
        } else {
            self.color(YELLOW, "incomplete")
        }
    }

    fn status(&self, status: RunStatus) -> String {
        match status {
            RunStatus::Success => self.color(GREEN, "success"),
            RunStatus::Error => self.color(RED, "error"),
        }
    }

    fn color(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.color(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.color(DIM, text)
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "never".to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

use console::style;

use crate::types::ReportStatus;

/// Styled terminal output for human-readable command results
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Aligned `label: value` line
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<14} {}", style(format!("{}:", label)).dim(), value);
    }

    /// One line per report outcome, styled by status
    pub fn status(&self, status: ReportStatus, message: &str) {
        match status {
            ReportStatus::Success => self.success(message),
            ReportStatus::Skipped => self.warning(message),
            ReportStatus::Failed => self.error(message),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

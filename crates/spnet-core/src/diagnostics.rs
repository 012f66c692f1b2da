//! Non-fatal findings about a network.
//!
//! Construction and solving fail fast with a [`SpnetError`](crate::SpnetError).
//! Everything that is suspicious but not fatal, such as voltage levels without
//! a nominal voltage or a tap far from 1, is collected here instead so that a
//! caller can report all of it at once.
//!
//! # Example
//!
//! ```
//! use spnet_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning_with_entity("limits", "Voltage levels without nominal voltage", "Bus 'b1'");
//! diag.add_spnet_error(
//!     "topology",
//!     &spnet_core::SpnetError::NoVoltageSource("There is no voltage source".into()),
//! );
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! assert_eq!(diag.issues[0].severity, Severity::Warning);
//! ```

use std::fmt;

use serde::Serialize;

use crate::error::SpnetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The network can be solved but something looks wrong
    Warning,
    /// The network cannot be solved as is
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    pub severity: Severity,
    /// Grouping key: "topology", "limits", "transformer", "line", "network"
    pub category: String,
    pub message: String,
    /// Stable error code when the issue comes from an error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Element the issue is about, e.g. "Bus 'b1'"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            code: None,
            entity: None,
        }
    }

    /// Error issue carrying the code and message of `err`.
    pub fn from_error(category: impl Into<String>, err: &SpnetError) -> Self {
        let mut issue = Self::new(Severity::Error, category, err.to_string());
        issue.code = Some(err.code().as_str().to_string());
        issue
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;
        if let Some(code) = &self.code {
            write!(f, " [{}]", code)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    // =========================================================================
    // Warnings
    // =========================================================================

    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.add(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Records `err` with its stable code.
    pub fn add_spnet_error(&mut self, category: &str, err: &SpnetError) {
        self.add(DiagnosticIssue::from_error(category, err));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues_by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn summary(&self) -> String {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match (self.warning_count(), self.error_count()) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, plural(w)),
            (0, e) => format!("{} error{}", e, plural(e)),
            (w, e) => format!("{} warning{}, {} error{}", w, plural(w), e, plural(e)),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_counts() {
        let mut diag = Diagnostics::new();
        diag.add_warning_with_entity("limits", "test warning", "Bus 'b1'");
        diag.add_spnet_error("topology", &SpnetError::NoVoltageSource("test error".into()));
        diag.add_warning_with_entity("line", "no ampacity", "Line 'l1'");

        assert_eq!(diag.warning_count(), 2);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
        assert_eq!(diag.issues_by_category("limits").count(), 1);
    }

    #[test]
    fn test_error_issue_carries_code() {
        let err = SpnetError::NoVoltageSource("no source".into());
        let mut diag = Diagnostics::new();
        diag.add_spnet_error("topology", &err);

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"code\":\"NO_VOLTAGE_SOURCE\""));
        assert!(json.contains("\"severity\":\"error\""));
        assert!(!json.contains("\"entity\""));
    }

    #[test]
    fn test_diagnostic_issue_display() {
        let issue = DiagnosticIssue::new(Severity::Warning, "limits", "Voltage levels without nominal voltage")
            .with_entity("Bus 'b1'");

        let display = issue.to_string();
        assert_eq!(
            display,
            "[warning:limits] Voltage levels without nominal voltage (Bus 'b1')"
        );
    }

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = Diagnostics::new();
        assert_eq!(diag.summary(), "No issues");

        diag.add_warning_with_entity("limits", "warning", "Bus 'b1'");
        assert_eq!(diag.summary(), "1 warning");

        diag.add_warning_with_entity("line", "another warning", "Line 'l1'");
        diag.add_spnet_error("topology", &SpnetError::NoVoltageSource("error".into()));
        assert_eq!(diag.summary(), "2 warnings, 1 error");
        assert!(diag.to_string().starts_with("Diagnostics: 2 warnings, 1 error\n"));
    }
}

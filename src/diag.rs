//! Diagnostic reporting.
//!
//! A severity, a location, and a pluggable sink that collects
//! [`Diagnostic`] values instead of writing only to stderr, and emits a
//! parallel `tracing` event per diagnostic for structured consumption.

use crate::loc::Loc;
use std::env;
use std::io::IsTerminal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub loc: Loc,
}

/// Accumulates diagnostics raised during elaboration. The elaborator's
/// "return nothing if any error was reported" rule is implemented by
/// checking [`Diagnostics::has_errors`] rather than a global counter.
#[derive(Default)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
    error_count: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, loc: Loc, message: impl Into<String>) {
        self.push(Severity::Error, loc, message);
    }

    pub fn warn(&mut self, loc: Loc, message: impl Into<String>) {
        self.push(Severity::Warning, loc, message);
    }

    pub fn note(&mut self, loc: Loc, message: impl Into<String>) {
        self.push(Severity::Note, loc, message);
    }

    fn push(&mut self, severity: Severity, loc: Loc, message: impl Into<String>) {
        let message = message.into();
        if severity == Severity::Error {
            self.error_count += 1;
        }
        match severity {
            Severity::Error => tracing::error!(file = %loc.file, line = loc.first_line, column = loc.first_column, "{message}"),
            Severity::Warning => tracing::warn!(file = %loc.file, line = loc.first_line, column = loc.first_column, "{message}"),
            Severity::Note => tracing::info!(file = %loc.file, line = loc.first_line, column = loc.first_column, "{message}"),
        }
        self.records.push(Diagnostic {
            severity,
            message,
            loc,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Render every accumulated diagnostic to a single string the way the
    /// default stderr sink would have printed them one at a time, honoring
    /// `NVC_NO_COLOR`.
    pub fn render(&self) -> String {
        let color = color_enabled();
        let mut out = String::new();
        for diag in &self.records {
            render_one(&mut out, diag, color);
        }
        out
    }
}

fn color_enabled() -> bool {
    if env::var_os("NVC_NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

fn render_one(out: &mut String, diag: &Diagnostic, color: bool) {
    let (label, code) = match diag.severity {
        Severity::Error => ("Error", "31"),
        Severity::Warning => ("Warning", "33"),
        Severity::Note => ("Note", "0"),
    };
    if color {
        out.push_str(&format!("\u{1b}[{code}m** {label}: \u{1b}[0m{}\n", diag.message));
    } else {
        out.push_str(&format!("** {label}: {}\n", diag.message));
    }
    out.push_str(&diag.loc.to_string());
}

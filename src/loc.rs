//! Source locations attached to tree nodes and diagnostics.

use std::fmt;
use std::sync::Arc;

/// A span in a source file, plus (optionally) the text of its first line so
/// diagnostics can render a caret underline without re-opening the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loc {
    pub file: Arc<str>,
    pub first_line: u32,
    pub first_column: u16,
    pub last_line: u32,
    pub last_column: u16,
    pub line_text: Option<Arc<str>>,
}

impl Loc {
    /// Sentinel for "no location is available", e.g. for synthetic
    /// nodes minted during elaboration that have no direct source
    /// counterpart.
    pub fn invalid() -> Self {
        Loc {
            file: Arc::from(""),
            first_line: 0,
            first_column: 0,
            last_line: 0,
            last_column: 0,
            line_text: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.first_line != 0
    }

    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u16) -> Self {
        Loc {
            file: file.into(),
            first_line: line,
            first_column: column,
            last_line: line,
            last_column: column,
            line_text: None,
        }
    }

    pub fn with_line_text(mut self, text: impl Into<Arc<str>>) -> Self {
        self.line_text = Some(text.into());
        self
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }
        writeln!(f, "\tFile {}, Line {}", self.file, self.first_line)?;
        let Some(line) = &self.line_text else {
            return Ok(());
        };
        let truncated: String = line.chars().take(79).collect();
        let many_lines = self.first_line != self.last_line || truncated.chars().count() >= 79;
        let last_col = if many_lines {
            truncated.chars().count() as u16 + 3
        } else {
            self.last_column
        };
        writeln!(f, "    {}{}", truncated, if many_lines { " ..." } else { "" })?;
        for _ in 0..self.first_column + 4 {
            f.write_str(" ")?;
        }
        let carets = last_col.saturating_sub(self.first_column) + 1;
        for _ in 0..carets {
            f.write_str("^")?;
        }
        writeln!(f)
    }
}

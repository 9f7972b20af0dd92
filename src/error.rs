//! Error types for script parsing, lookup and mutation

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single offending source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadLine {
    /// 1-based line number
    pub number: usize,
    /// Line text with its terminator removed
    pub text: String,
}

impl BadLine {
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

impl fmt::Display for BadLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {:2}]: {:?}", self.number, self.text)
    }
}

/// Errors raised by [`Script`](crate::Script) and the [`Decoder`](crate::Decoder)
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The requested section does not exist (and is not `DEFAULT`)
    #[error("No section: {section:?}")]
    NoSection { section: String },

    /// `add_section` on an existing name or on the reserved defaults name
    #[error("Section {section:?} already exists or is reserved")]
    DuplicateSection { section: String },

    /// The option is absent from the overrides, the section and the defaults
    #[error("No option {option:?} in section: {section:?}")]
    NoOption { section: String, option: String },

    /// A write that would put key/value options into a content section,
    /// or a content block into a structured one
    #[error("Option {option:?} does not fit the kind of section {section:?}")]
    SectionKindMismatch { section: String, option: String },

    /// One or more unparsable lines, collected over the whole source
    #[error("File contains parsing errors: {source_name}{}", format_lines(.lines))]
    Parse {
        source_name: String,
        lines: Vec<BadLine>,
    },

    /// Content found before the first section header
    #[error("File contains no section headers.\nfile: {source_name}, line: {}\n{:?}", .line.number, .line.text)]
    MissingSectionHeader { source_name: String, line: BadLine },

    /// A source opened fine but could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_lines(lines: &[BadLine]) -> String {
    lines.iter().map(|line| format!("\n\t{line}")).collect()
}

impl ScriptError {
    /// Bad lines carried by a parse failure, in source order
    pub fn bad_lines(&self) -> &[BadLine] {
        match self {
            ScriptError::Parse { lines, .. } => lines,
            ScriptError::MissingSectionHeader { line, .. } => std::slice::from_ref(line),
            _ => &[],
        }
    }

    /// Whether this error came out of parsing source text
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ScriptError::Parse { .. } | ScriptError::MissingSectionHeader { .. }
        )
    }
}

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

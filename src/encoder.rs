//! Script encoder

use std::io::Write;
use std::path::Path;

use crate::error::{ScriptError, ScriptResult};
use crate::script::{OptionValue, Script, SectionKind, ValueMode, DEFAULT_SECTION};

/// Encodes a script back into setup script text
pub struct Encoder {
    // Currently stateless, but reserved for future options
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a script to a string.
    ///
    /// Defaults come first under `[DEFAULT]`, followed by a blank line, then
    /// every section in insertion order. Content blocks are written as stored.
    pub fn encode(&self, script: &Script) -> String {
        let mut output = String::new();
        let mode = script.value_mode();

        if !script.defaults().is_empty() {
            output.push_str(&format!("[{DEFAULT_SECTION}]\n"));
            for (key, value) in script.defaults() {
                if let Some(text) = written_value(value, mode) {
                    output.push_str(&format!("{key} = {}\n", indent_continuations(text)));
                }
            }
            output.push('\n');
        }

        let mut sections = script.section_list().peekable();
        while let Some(section) = sections.next() {
            output.push_str(&format!("[{}]\n", section.name()));

            for (key, value) in section.entries() {
                match value {
                    OptionValue::Content(block) if section.kind() == SectionKind::Content => {
                        output.push_str(block);
                        // keep the next header on its own line
                        if !block.is_empty() && !block.ends_with('\n') && sections.peek().is_some() {
                            output.push('\n');
                        }
                    }
                    _ => {
                        if let Some(text) = written_value(value, mode) {
                            output.push_str(&format!("{key}={}\n", indent_continuations(text)));
                        }
                    }
                }
            }
        }

        output
    }

    /// Encode a script directly to a writer
    pub fn encode_to_writer<W: Write>(&self, script: &Script, mut writer: W) -> std::io::Result<()> {
        writer.write_all(self.encode(script).as_bytes())
    }

    /// Encode a script to a file
    pub fn encode_to_file(&self, script: &Script, path: &Path) -> ScriptResult<()> {
        std::fs::write(path, self.encode(script)).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Text written for a value; valueless options only appear when values are required
fn written_value(value: &OptionValue, mode: ValueMode) -> Option<&str> {
    match value {
        OptionValue::Text(text) | OptionValue::Content(text) => Some(text),
        OptionValue::Valueless => match mode {
            ValueMode::Required => Some(""),
            ValueMode::Optional => None,
        },
    }
}

fn indent_continuations(value: &str) -> String {
    value.replace('\n', "\n\t")
}

impl Script {
    /// Write the script to a writer
    pub fn write_to<W: Write>(&self, writer: W) -> std::io::Result<()> {
        Encoder::new().encode_to_writer(self, writer)
    }

    /// Write the script to a file, replacing it
    pub fn write_file(&self, path: impl AsRef<Path>) -> ScriptResult<()> {
        Encoder::new().encode_to_file(self, path.as_ref())
    }
}

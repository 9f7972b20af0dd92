//! Script decoder
//!
//! A single pass over the source lines. The section a line belongs to decides
//! the grammar: `Setup` and `[DEFAULT]` are read as `key=value` options with
//! continuation lines, every other section keeps its body verbatim.

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::error::{BadLine, ScriptError, ScriptResult};
use crate::script::{
    OptionValue, Script, ScriptConfig, Section, SectionKind, ValueMode, CONTENT_BLOCK,
    DEFAULT_SECTION,
};

/// UTF-16 LE byte order mark
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
/// UTF-8 byte order mark, as written by most Windows editors
const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decodes setup script text
#[derive(Debug, Clone)]
pub struct Decoder {
    value_mode: ValueMode,
    skip_rem_comments: bool,
}

/// Sections and defaults read from one source
#[derive(Debug)]
pub(crate) struct Parsed {
    pub(crate) defaults: IndexMap<String, OptionValue>,
    pub(crate) sections: IndexMap<String, Section>,
}

impl Decoder {
    /// Create a decoder that requires option values and skips REM lines
    pub fn new() -> Self {
        Self {
            value_mode: ValueMode::Required,
            skip_rem_comments: true,
        }
    }

    /// Decoder settings taken from a script configuration
    pub fn from_config(config: &ScriptConfig) -> Self {
        Self {
            value_mode: config.value_mode,
            skip_rem_comments: config.skip_rem_comments,
        }
    }

    /// Set whether option lines may omit a value
    pub fn with_value_mode(mut self, mode: ValueMode) -> Self {
        self.value_mode = mode;
        self
    }

    /// Set whether `REM` lines are comments in the `Setup` section
    pub fn with_rem_comments(mut self, skip: bool) -> Self {
        self.skip_rem_comments = skip;
        self
    }

    /// Decode script text into a fresh [`Script`]
    pub fn decode(&self, source_name: &str, input: &str) -> ScriptResult<Script> {
        let mut script = Script::with_config(ScriptConfig {
            value_mode: self.value_mode,
            skip_rem_comments: self.skip_rem_comments,
            ..ScriptConfig::default()
        });
        script.read_str(source_name, input)?;
        Ok(script)
    }

    /// Run the line state machine over `input`
    pub(crate) fn parse(&self, source_name: &str, input: &str) -> ScriptResult<Parsed> {
        let mut state = ParseState::new(self, source_name);

        for (index, line) in input.split_inclusive('\n').enumerate() {
            state.feed(index + 1, line)?;
        }

        state.finish()
    }

    fn is_comment(&self, line: &str) -> bool {
        if line.trim().is_empty() || line.starts_with(['#', ';']) {
            return true;
        }

        self.skip_rem_comments
            && line.starts_with(['r', 'R'])
            && line
                .split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case("rem"))
    }

    /// Parse `name = value` / `name: value`, or a bare `name` when values are optional
    fn parse_option<'l>(&self, line: &'l str) -> Option<(&'l str, Option<&'l str>)> {
        let first = line.chars().next()?;
        if first == '=' || first == ':' || first.is_whitespace() {
            return None;
        }

        match line.find(['=', ':']) {
            Some(sep) => {
                let name = line[..sep].trim_end();
                let value = strip_inline_comment(&line[sep + 1..]).trim();
                let value = if value == "\"\"" { "" } else { value };
                Some((name, Some(value)))
            }
            None => match self.value_mode {
                ValueMode::Required => None,
                ValueMode::Optional => Some((line.trim_end(), None)),
            },
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode raw file bytes into text.
///
/// A UTF-16 LE byte order mark selects UTF-16 decoding and a UTF-8 mark is
/// dropped; anything else is read as (lossy) UTF-8.
pub fn decode_source(data: &[u8]) -> String {
    if let Some(wide) = data.strip_prefix(BOM_UTF16_LE) {
        let units = wide
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]));

        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    } else {
        let data = data.strip_prefix(BOM_UTF8).unwrap_or(data);
        String::from_utf8_lossy(data).into_owned()
    }
}

/// `;` starts a trailing comment only when whitespace precedes it.
/// Only the first `;` after the separator is considered.
fn strip_inline_comment(value: &str) -> &str {
    match value.find(';') {
        Some(pos) if value[..pos].ends_with(char::is_whitespace) => &value[..pos],
        _ => value,
    }
}

/// Name inside a `[name]` header; text after the closing bracket is ignored
fn section_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Option value while its continuation lines are still being read
#[derive(Debug)]
enum Pending {
    Lines(Vec<String>),
    Valueless,
}

/// Body of a section under construction
#[derive(Debug)]
enum Body {
    Options(IndexMap<String, Pending>),
    Content(Option<String>),
}

impl Body {
    fn for_name(name: &str) -> Self {
        match SectionKind::for_name(name) {
            SectionKind::Structured => Body::Options(IndexMap::new()),
            SectionKind::Content => Body::Content(None),
        }
    }
}

/// Where lines currently go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    NoSection,
    Defaults,
    Section(usize),
}

/// What a single line turned out to be
#[derive(Debug, PartialEq, Eq)]
enum Line<'l> {
    Header(&'l str),
    Skip,
    Continuation(&'l str),
    Content,
    Assignment(&'l str, Option<&'l str>),
    MissingHeader,
    Bad,
}

struct ParseState<'d> {
    decoder: &'d Decoder,
    source_name: &'d str,
    defaults: IndexMap<String, Pending>,
    sections: IndexMap<String, Body>,
    cursor: Cursor,
    /// Option that continuation lines extend
    option: Option<String>,
    bad_lines: Vec<BadLine>,
}

impl<'d> ParseState<'d> {
    fn new(decoder: &'d Decoder, source_name: &'d str) -> Self {
        Self {
            decoder,
            source_name,
            defaults: IndexMap::new(),
            sections: IndexMap::new(),
            cursor: Cursor::NoSection,
            option: None,
            bad_lines: Vec::new(),
        }
    }

    fn in_content(&self) -> bool {
        match self.cursor {
            Cursor::Section(index) => {
                matches!(self.sections.get_index(index), Some((_, Body::Content(_))))
            }
            Cursor::NoSection | Cursor::Defaults => false,
        }
    }

    fn classify<'l>(&self, raw: &'l str) -> Line<'l> {
        if let Some(name) = section_header(raw) {
            return Line::Header(name);
        }

        if self.in_content() {
            return Line::Content;
        }
        if self.decoder.is_comment(raw) {
            return Line::Skip;
        }
        if self.cursor == Cursor::NoSection {
            return Line::MissingHeader;
        }
        if raw.starts_with(char::is_whitespace) && self.option.is_some() {
            return Line::Continuation(raw.trim());
        }

        match self.decoder.parse_option(strip_terminator(raw)) {
            Some((name, value)) => Line::Assignment(name, value),
            None => Line::Bad,
        }
    }

    fn feed(&mut self, number: usize, raw: &str) -> ScriptResult<()> {
        let line = self.classify(raw);
        trace!(line = number, kind = ?line, "classified");

        match line {
            Line::Header(name) => self.open_section(name),
            Line::Skip => {}
            Line::Content => self.push_content(raw),
            Line::Continuation(value) => self.continue_option(number, raw, value),
            Line::Assignment(name, value) => self.set_option(name, value),
            Line::MissingHeader => {
                return Err(ScriptError::MissingSectionHeader {
                    source_name: self.source_name.to_string(),
                    line: BadLine::new(number, strip_terminator(raw)),
                });
            }
            Line::Bad => self.record_bad_line(number, raw),
        }

        Ok(())
    }

    fn open_section(&mut self, name: &str) {
        self.option = None;

        if let Some(index) = self.sections.get_index_of(name) {
            debug!(section = name, "resuming section");
            self.cursor = Cursor::Section(index);
        } else if name == DEFAULT_SECTION {
            self.cursor = Cursor::Defaults;
        } else {
            debug!(section = name, kind = ?SectionKind::for_name(name), "opening section");
            let (index, _) = self.sections.insert_full(name.to_string(), Body::for_name(name));
            self.cursor = Cursor::Section(index);
        }
    }

    fn current_options(&mut self) -> Option<&mut IndexMap<String, Pending>> {
        match self.cursor {
            Cursor::Defaults => Some(&mut self.defaults),
            Cursor::Section(index) => match self.sections.get_index_mut(index) {
                Some((_, Body::Options(options))) => Some(options),
                _ => None,
            },
            Cursor::NoSection => None,
        }
    }

    fn push_content(&mut self, raw: &str) {
        if let Cursor::Section(index) = self.cursor {
            if let Some((_, Body::Content(content))) = self.sections.get_index_mut(index) {
                content.get_or_insert_with(String::new).push_str(raw);
            }
        }
    }

    fn set_option(&mut self, name: &str, value: Option<&str>) {
        let pending = match value {
            Some(value) => Pending::Lines(vec![value.to_string()]),
            None => Pending::Valueless,
        };

        if let Some(options) = self.current_options() {
            options.insert(name.to_string(), pending);
        }
        self.option = Some(name.to_string());
    }

    fn continue_option(&mut self, number: usize, raw: &str, value: &str) {
        if value.is_empty() {
            return;
        }

        let Some(name) = self.option.clone() else {
            return self.record_bad_line(number, raw);
        };

        let extended = match self.current_options().and_then(|options| options.get_mut(&name)) {
            Some(Pending::Lines(lines)) => {
                lines.push(value.to_string());
                true
            }
            // nothing to extend
            Some(Pending::Valueless) | None => false,
        };

        if !extended {
            self.record_bad_line(number, raw);
        }
    }

    fn record_bad_line(&mut self, number: usize, raw: &str) {
        let text = strip_terminator(raw);
        warn!(source = self.source_name, line = number, text, "unparsable line");
        self.bad_lines.push(BadLine::new(number, text));
    }

    fn finish(self) -> ScriptResult<Parsed> {
        if !self.bad_lines.is_empty() {
            return Err(ScriptError::Parse {
                source_name: self.source_name.to_string(),
                lines: self.bad_lines,
            });
        }

        let sections = self
            .sections
            .into_iter()
            .map(|(name, body)| {
                let options = match body {
                    Body::Options(options) => join_pending(options),
                    Body::Content(Some(text)) => {
                        std::iter::once((CONTENT_BLOCK.to_string(), OptionValue::Content(text)))
                            .collect()
                    }
                    Body::Content(None) => IndexMap::new(),
                };
                (name.clone(), Section::from_parts(name, options))
            })
            .collect();

        Ok(Parsed {
            defaults: join_pending(self.defaults),
            sections,
        })
    }
}

/// Join multi-line values collected while reading
fn join_pending(options: IndexMap<String, Pending>) -> IndexMap<String, OptionValue> {
    options
        .into_iter()
        .map(|(name, pending)| {
            let value = match pending {
                Pending::Lines(lines) => OptionValue::Text(lines.join("\n")),
                Pending::Valueless => OptionValue::Valueless,
            };
            (name, value)
        })
        .collect()
}

//! Script data structures, lookup and mutation

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::decoder::{decode_source, Decoder};
use crate::error::{ScriptError, ScriptResult};

// Reserved names
pub const DEFAULT_SECTION: &str = "DEFAULT";
pub const SETUP_SECTION: &str = "Setup";
pub const CONTENT_BLOCK: &str = "__Content__";

/// Caller-supplied override values for [`Script::get_with`]
pub type Vars = IndexMap<String, OptionValue>;

/// Whether option lines must carry a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueMode {
    /// `name` alone is not an option line and is reported as a bad line
    #[default]
    Required,
    /// `name` alone is stored as [`OptionValue::Valueless`]
    Optional,
}

/// Configuration a [`Script`] is built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    /// Option grammar used for the `Setup` section and the defaults
    pub value_mode: ValueMode,
    /// Whether `REM ...` lines are treated as comments outside content sections
    pub skip_rem_comments: bool,
    /// Initial defaults overlay
    pub defaults: IndexMap<String, String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            value_mode: ValueMode::Required,
            skip_rem_comments: true,
            defaults: IndexMap::new(),
        }
    }
}

/// How a section's body is read and written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `key=value` options with continuation lines (`Setup` only)
    Structured,
    /// Verbatim body kept under [`CONTENT_BLOCK`]
    Content,
}

impl SectionKind {
    /// Kind of a section created with the given name
    pub fn for_name(name: &str) -> Self {
        if name == SETUP_SECTION {
            SectionKind::Structured
        } else {
            SectionKind::Content
        }
    }
}

/// Value stored for an option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Option value, continuation lines joined with `\n`
    Text(String),
    /// Option present without a value
    Valueless,
    /// Verbatim body of a content section
    Content(String),
}

impl OptionValue {
    /// Text of the value, `None` for [`OptionValue::Valueless`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(text) | OptionValue::Content(text) => Some(text),
            OptionValue::Valueless => None,
        }
    }

    pub fn is_valueless(&self) -> bool {
        matches!(self, OptionValue::Valueless)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// A named section of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    kind: SectionKind,
    options: IndexMap<String, OptionValue>,
}

impl Section {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = SectionKind::for_name(&name);
        Self {
            name,
            kind,
            options: IndexMap::new(),
        }
    }

    /// Section assembled by the decoder; kind follows from the name
    pub(crate) fn from_parts(name: String, options: IndexMap<String, OptionValue>) -> Self {
        let kind = SectionKind::for_name(&name);
        Self { name, kind, options }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Verbatim body of a content section
    pub fn content(&self) -> Option<&str> {
        match self.options.get(CONTENT_BLOCK) {
            Some(OptionValue::Content(text)) => Some(text),
            _ => None,
        }
    }

    /// Value of an option stored in this section, ignoring the defaults
    pub fn get(&self, option: &str) -> Option<&OptionValue> {
        self.options.get(option)
    }

    /// Options in insertion order, without the content block
    pub fn options(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.options
            .iter()
            .filter(|(key, _)| key.as_str() != CONTENT_BLOCK)
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Every stored entry, content block included
    pub(crate) fn entries(&self) -> &IndexMap<String, OptionValue> {
        &self.options
    }

    /// Store a value, keeping the structured/content split intact
    pub(crate) fn insert(&mut self, option: &str, value: OptionValue) -> ScriptResult<()> {
        check_fit(self.kind, &self.name, option, &value)?;
        self.options.insert(option.to_string(), value);
        Ok(())
    }

    pub(crate) fn remove(&mut self, option: &str) -> bool {
        self.options.shift_remove(option).is_some()
    }
}

fn check_fit(kind: SectionKind, section: &str, option: &str, value: &OptionValue) -> ScriptResult<()> {
    let fits = match kind {
        SectionKind::Structured => {
            option != CONTENT_BLOCK && !matches!(value, OptionValue::Content(_))
        }
        SectionKind::Content => {
            option == CONTENT_BLOCK && matches!(value, OptionValue::Content(_))
        }
    };

    if fits {
        Ok(())
    } else {
        Err(ScriptError::SectionKindMismatch {
            section: section.to_string(),
            option: option.to_string(),
        })
    }
}

/// A parsed setup script: the defaults overlay plus ordered sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    config: ScriptConfig,
    /// Values seen by every section lacking its own
    defaults: IndexMap<String, OptionValue>,
    sections: IndexMap<String, Section>,
}

impl Default for Script {
    fn default() -> Self {
        Self::with_config(ScriptConfig::default())
    }
}

impl Script {
    /// Create an empty script with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty script seeded with defaults
    pub fn with_defaults<K, V>(defaults: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_config(ScriptConfig {
            defaults: defaults
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            ..ScriptConfig::default()
        })
    }

    /// Create an empty script from an explicit configuration
    pub fn with_config(config: ScriptConfig) -> Self {
        let defaults = config
            .defaults
            .iter()
            .map(|(key, value)| (key.clone(), OptionValue::Text(value.clone())))
            .collect();

        Self {
            config,
            defaults,
            sections: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn value_mode(&self) -> ValueMode {
        self.config.value_mode
    }

    /// Decoder matching this script's configuration
    pub fn decoder(&self) -> Decoder {
        Decoder::from_config(&self.config)
    }

    /// Read and parse a list of files.
    ///
    /// Paths that cannot be opened are skipped, so a list of candidate
    /// locations can be passed. Every successful load replaces the sections
    /// read so far; the defaults overlay carries over. A parse failure stops
    /// the whole call and leaves the script as the previous file left it.
    ///
    /// Returns the paths that were loaded, in order.
    pub fn read<I, P>(&mut self, paths: I) -> ScriptResult<Vec<PathBuf>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut read_ok = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let mut file = match fs::File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping script that cannot be opened");
                    continue;
                }
            };

            if file.metadata().map(|meta| meta.is_dir()).unwrap_or(false) {
                debug!(path = %path.display(), "skipping directory");
                continue;
            }

            let mut data = Vec::new();
            file.read_to_end(&mut data).map_err(|source| ScriptError::Io {
                path: path.to_path_buf(),
                source,
            })?;

            self.read_bytes(&path.display().to_string(), &data)?;
            read_ok.push(path.to_path_buf());
        }

        Ok(read_ok)
    }

    /// Parse raw file bytes, detecting a UTF-16 LE or UTF-8 byte order mark
    pub fn read_bytes(&mut self, source_name: &str, data: &[u8]) -> ScriptResult<()> {
        let text = decode_source(data);
        self.read_str(source_name, &text)
    }

    /// Parse script text, replacing the current sections on success
    pub fn read_str(&mut self, source_name: &str, text: &str) -> ScriptResult<()> {
        let parsed = self.decoder().parse(source_name, text)?;

        debug!(
            source = source_name,
            sections = parsed.sections.len(),
            defaults = parsed.defaults.len(),
            "loaded script"
        );

        self.sections = parsed.sections;
        self.defaults.extend(parsed.defaults);
        Ok(())
    }

    /// The defaults overlay
    pub fn defaults(&self) -> &IndexMap<String, OptionValue> {
        &self.defaults
    }

    /// Section names in file order, without `DEFAULT`
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Whether the named section exists; `DEFAULT` is not acknowledged
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Create a new, empty section.
    ///
    /// Fails on an existing name and on any casing of `DEFAULT`.
    pub fn add_section(&mut self, name: &str) -> ScriptResult<()> {
        if name.eq_ignore_ascii_case(DEFAULT_SECTION) || self.sections.contains_key(name) {
            return Err(ScriptError::DuplicateSection {
                section: name.to_string(),
            });
        }

        self.sections.insert(name.to_string(), Section::new(name));
        Ok(())
    }

    /// Remove a section, returning whether it existed
    pub fn remove_section(&mut self, name: &str) -> bool {
        self.sections.shift_remove(name).is_some()
    }

    /// Option names visible from a section: its own first, then defaults
    pub fn options(&self, section: &str) -> ScriptResult<Vec<&str>> {
        let mut names: IndexSet<&str> = IndexSet::new();

        if let Some(own) = self.own_options(section)? {
            names.extend(own.keys().map(String::as_str));
        }
        names.extend(self.defaults.keys().map(String::as_str));
        names.shift_remove(CONTENT_BLOCK);

        Ok(names.into_iter().collect())
    }

    /// `(name, value)` pairs of a section merged over the defaults
    pub fn items(&self, section: &str) -> ScriptResult<Vec<(&str, &OptionValue)>> {
        let mut merged: IndexMap<&str, &OptionValue> = self
            .defaults
            .iter()
            .map(|(key, value)| (key.as_str(), value))
            .collect();

        if let Some(own) = self.own_options(section)? {
            merged.extend(own.iter().map(|(key, value)| (key.as_str(), value)));
        }
        merged.shift_remove(CONTENT_BLOCK);

        Ok(merged.into_iter().collect())
    }

    /// Whether an option is visible from a section, defaults included
    pub fn has_option(&self, section: &str, option: &str) -> bool {
        if is_defaults_target(section) {
            return self.defaults.contains_key(option);
        }

        match self.sections.get(section) {
            Some(own) => own.options.contains_key(option) || self.defaults.contains_key(option),
            None => false,
        }
    }

    /// Look up an option through the section and then the defaults
    pub fn get(&self, section: &str, option: &str) -> ScriptResult<&OptionValue> {
        self.get_with(section, option, None)
    }

    /// Look up an option, trying `vars`, then the section, then the defaults
    pub fn get_with<'a>(
        &'a self,
        section: &str,
        option: &str,
        vars: Option<&'a Vars>,
    ) -> ScriptResult<&'a OptionValue> {
        let own = self.own_options(section)?;
        let tiers = [vars, own, Some(&self.defaults)];

        tiers
            .into_iter()
            .flatten()
            .find_map(|tier| tier.get(option))
            .ok_or_else(|| ScriptError::NoOption {
                section: section.to_string(),
                option: option.to_string(),
            })
    }

    /// Text of an option, `None` when it is valueless
    pub fn get_str(&self, section: &str, option: &str) -> ScriptResult<Option<&str>> {
        self.get(section, option).map(OptionValue::as_str)
    }

    /// Set an option.
    ///
    /// An empty section name or `DEFAULT` writes into the defaults. On a
    /// content section only [`CONTENT_BLOCK`] can be set.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) -> ScriptResult<()> {
        let value = value.into();

        if is_defaults_target(section) {
            return self.set_default(option, OptionValue::Text(value));
        }

        let target = self.section_mut(section)?;
        let value = match target.kind {
            SectionKind::Structured => OptionValue::Text(value),
            SectionKind::Content => OptionValue::Content(value),
        };
        target.insert(option, value)
    }

    /// Set an option without a value
    pub fn set_valueless(&mut self, section: &str, option: &str) -> ScriptResult<()> {
        if is_defaults_target(section) {
            return self.set_default(option, OptionValue::Valueless);
        }

        self.section_mut(section)?.insert(option, OptionValue::Valueless)
    }

    /// Remove an option, returning whether it existed
    pub fn remove_option(&mut self, section: &str, option: &str) -> ScriptResult<bool> {
        if is_defaults_target(section) {
            return Ok(self.defaults.shift_remove(option).is_some());
        }

        Ok(self.section_mut(section)?.remove(option))
    }

    fn set_default(&mut self, option: &str, value: OptionValue) -> ScriptResult<()> {
        check_fit(SectionKind::Structured, DEFAULT_SECTION, option, &value)?;
        self.defaults.insert(option.to_string(), value);
        Ok(())
    }

    /// Options stored directly in a section; `None` for the defaults
    /// pseudo-section when it is not also a real section
    fn own_options(&self, section: &str) -> ScriptResult<Option<&IndexMap<String, OptionValue>>> {
        match self.sections.get(section) {
            Some(own) => Ok(Some(&own.options)),
            None if section == DEFAULT_SECTION => Ok(None),
            None => Err(ScriptError::NoSection {
                section: section.to_string(),
            }),
        }
    }

    fn section_mut(&mut self, section: &str) -> ScriptResult<&mut Section> {
        self.sections
            .get_mut(section)
            .ok_or_else(|| ScriptError::NoSection {
                section: section.to_string(),
            })
    }

    pub(crate) fn section_list(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }
}

fn is_defaults_target(section: &str) -> bool {
    section.is_empty() || section == DEFAULT_SECTION
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "\
; Script generated by hand
[Setup]
AppName=My Program
AppVersion=1.5

[Files]
Source: \"MyProg.exe\"; DestDir: \"{app}\"
";

    fn loaded() -> Script {
        let mut script = Script::with_defaults([("Compression", "lzma"), ("AppVersion", "0.0")]);
        script.read_str("<test>", SCRIPT).unwrap();
        script
    }

    #[test]
    fn test_sections_in_file_order() {
        let script = loaded();
        assert_eq!(script.sections().collect::<Vec<_>>(), vec!["Setup", "Files"]);
        assert!(script.has_section("Setup"));
        assert!(!script.has_section("DEFAULT"));
    }

    #[test]
    fn test_section_kinds() {
        let script = loaded();
        assert_eq!(script.section("Setup").unwrap().kind(), SectionKind::Structured);
        assert_eq!(script.section("Files").unwrap().kind(), SectionKind::Content);
        assert_eq!(
            script.section("Files").unwrap().content(),
            Some("Source: \"MyProg.exe\"; DestDir: \"{app}\"\n")
        );
    }

    #[test]
    fn test_get_section_value_shadows_default() {
        let mut script = loaded();
        assert_eq!(script.get_str("Setup", "AppVersion").unwrap(), Some("1.5"));
        assert_eq!(script.get_str("Setup", "Compression").unwrap(), Some("lzma"));

        assert!(script.remove_option("Setup", "AppVersion").unwrap());
        assert_eq!(script.get_str("Setup", "AppVersion").unwrap(), Some("0.0"));
    }

    #[test]
    fn test_get_with_overrides_first() {
        let script = loaded();
        let mut vars = Vars::new();
        vars.insert("AppName".to_string(), "Override".into());

        let value = script.get_with("Setup", "AppName", Some(&vars)).unwrap();
        assert_eq!(value, &OptionValue::Text("Override".to_string()));

        let value = script.get_with("Setup", "AppVersion", Some(&vars)).unwrap();
        assert_eq!(value.as_str(), Some("1.5"));
    }

    #[test]
    fn test_get_missing_section_and_option() {
        let script = loaded();
        assert!(matches!(
            script.get("Nope", "AppName"),
            Err(ScriptError::NoSection { .. })
        ));
        assert!(matches!(
            script.get("Setup", "Nope"),
            Err(ScriptError::NoOption { .. })
        ));
    }

    #[test]
    fn test_get_default_pseudo_section() {
        let script = loaded();
        assert_eq!(script.get_str("DEFAULT", "Compression").unwrap(), Some("lzma"));
        assert!(matches!(
            script.get("DEFAULT", "AppName"),
            Err(ScriptError::NoOption { .. })
        ));
    }

    #[test]
    fn test_content_block_lookup() {
        let script = loaded();
        let value = script.get("Files", CONTENT_BLOCK).unwrap();
        assert!(matches!(value, OptionValue::Content(_)));
    }

    #[test]
    fn test_options_union_without_content_block() {
        let script = loaded();
        assert_eq!(
            script.options("Setup").unwrap(),
            vec!["AppName", "AppVersion", "Compression"]
        );
        assert_eq!(script.options("Files").unwrap(), vec!["Compression", "AppVersion"]);
        assert!(matches!(script.options("Nope"), Err(ScriptError::NoSection { .. })));
    }

    #[test]
    fn test_items_merge_defaults() {
        let script = loaded();
        let items = script.items("Setup").unwrap();
        let items: Vec<(&str, Option<&str>)> = items
            .into_iter()
            .map(|(key, value)| (key, value.as_str()))
            .collect();

        assert_eq!(
            items,
            vec![
                ("Compression", Some("lzma")),
                ("AppVersion", Some("1.5")),
                ("AppName", Some("My Program")),
            ]
        );
        assert_eq!(script.items("DEFAULT").unwrap().len(), 2);
    }

    #[test]
    fn test_has_option_is_defaults_aware() {
        let script = loaded();
        assert!(script.has_option("Setup", "AppName"));
        assert!(script.has_option("Setup", "Compression"));
        assert!(script.has_option("", "Compression"));
        assert!(!script.has_option("DEFAULT", "AppName"));
        assert!(!script.has_option("Nope", "Compression"));
    }

    #[test]
    fn test_add_section_rejects_reserved_names() {
        let mut script = Script::new();
        for name in ["Default", "DEFAULT", "default"] {
            assert!(matches!(
                script.add_section(name),
                Err(ScriptError::DuplicateSection { .. })
            ));
        }
    }

    #[test]
    fn test_add_section_rejects_duplicates() {
        let mut script = loaded();
        assert!(matches!(
            script.add_section("Files"),
            Err(ScriptError::DuplicateSection { .. })
        ));
        script.add_section("Icons").unwrap();
        assert_eq!(script.sections().last(), Some("Icons"));
        assert_eq!(script.section("Icons").unwrap().kind(), SectionKind::Content);
    }

    #[test]
    fn test_remove_section() {
        let mut script = loaded();
        assert!(script.remove_section("Files"));
        assert!(!script.remove_section("Files"));
        assert!(matches!(
            script.remove_option("Files", CONTENT_BLOCK),
            Err(ScriptError::NoSection { .. })
        ));
    }

    #[test]
    fn test_set_requires_existing_section() {
        let mut script = Script::new();
        assert!(matches!(
            script.set("Setup", "AppName", "x"),
            Err(ScriptError::NoSection { .. })
        ));

        script.add_section("Setup").unwrap();
        script.set("Setup", "AppName", "x").unwrap();
        assert_eq!(script.get_str("Setup", "AppName").unwrap(), Some("x"));
    }

    #[test]
    fn test_set_into_defaults() {
        let mut script = Script::new();
        script.set("", "OutputDir", "out").unwrap();
        script.set("DEFAULT", "Compression", "zip").unwrap();
        assert_eq!(script.defaults().len(), 2);
        assert!(script.remove_option("DEFAULT", "OutputDir").unwrap());
        assert!(!script.remove_option("", "OutputDir").unwrap());
    }

    #[test]
    fn test_set_respects_section_kind() {
        let mut script = loaded();

        assert!(matches!(
            script.set("Files", "Source", "x"),
            Err(ScriptError::SectionKindMismatch { .. })
        ));
        assert!(matches!(
            script.set("Setup", CONTENT_BLOCK, "x"),
            Err(ScriptError::SectionKindMismatch { .. })
        ));
        assert!(matches!(
            script.set_valueless("Files", CONTENT_BLOCK),
            Err(ScriptError::SectionKindMismatch { .. })
        ));

        script.set("Files", CONTENT_BLOCK, "Source: \"b.dll\"\n").unwrap();
        assert_eq!(script.section("Files").unwrap().content(), Some("Source: \"b.dll\"\n"));
    }

    #[test]
    fn test_set_valueless() {
        let mut script = loaded();
        script.set_valueless("Setup", "DisableWelcomePage").unwrap();
        assert_eq!(script.get_str("Setup", "DisableWelcomePage").unwrap(), None);
        assert!(script.get("Setup", "DisableWelcomePage").unwrap().is_valueless());
    }

    #[test]
    fn test_failed_load_keeps_previous_state() {
        let mut script = loaded();
        let result = script.read_str("<bad>", "[Setup]\nbroken line\n");
        assert!(matches!(result, Err(ScriptError::Parse { .. })));
        assert_eq!(script.sections().collect::<Vec<_>>(), vec!["Setup", "Files"]);
    }

    #[test]
    fn test_reload_replaces_sections_keeps_defaults() {
        let mut script = loaded();
        script
            .read_str("<second>", "[DEFAULT]\nOutputDir=build\n[Code]\nbegin end.\n")
            .unwrap();

        assert_eq!(script.sections().collect::<Vec<_>>(), vec!["Code"]);
        assert_eq!(script.get_str("DEFAULT", "Compression").unwrap(), Some("lzma"));
        assert_eq!(script.get_str("Code", "OutputDir").unwrap(), Some("build"));
    }

    #[test]
    fn test_read_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.iss");
        let b = dir.path().join("b.iss");
        let c = dir.path().join("c.iss");
        fs::write(&a, "[Setup]\nAppName=A\n").unwrap();
        fs::write(&c, "[Setup]\nAppName=C\n").unwrap();

        let mut script = Script::new();
        let read_ok = script.read([&a, &b, &c]).unwrap();

        assert_eq!(read_ok, vec![a, c]);
        assert_eq!(script.get_str("Setup", "AppName").unwrap(), Some("C"));
    }

    #[test]
    fn test_read_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Script::new();
        let read_ok = script.read([dir.path()]).unwrap();
        assert!(read_ok.is_empty());
    }

    #[test]
    fn test_read_stops_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.iss");
        let bad = dir.path().join("bad.iss");
        fs::write(&good, "[Setup]\nAppName=Good\n").unwrap();
        fs::write(&bad, "AppName=Bad\n").unwrap();

        let mut script = Script::new();
        let err = script.read([&good, &bad]).unwrap_err();

        assert!(matches!(err, ScriptError::MissingSectionHeader { .. }));
        assert_eq!(script.get_str("Setup", "AppName").unwrap(), Some("Good"));
    }

    #[test]
    fn test_read_bytes_with_utf16_bom() {
        let text = "[Setup]\nAppName=Wide\n";
        let mut data = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }

        let mut script = Script::new();
        script.read_bytes("wide.iss", &data).unwrap();
        assert_eq!(script.get_str("Setup", "AppName").unwrap(), Some("Wide"));
    }
}

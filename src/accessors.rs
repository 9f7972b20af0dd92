//! Shortcuts for the well-known Inno Setup sections

use std::fmt;

use crate::error::ScriptResult;
use crate::script::{OptionValue, Script, CONTENT_BLOCK, SETUP_SECTION};

/// Sections whose body is kept verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentSection {
    Dirs,
    Files,
    Languages,
    Registry,
    Tasks,
    Run,
    UninstallRun,
    InstallDelete,
    Icons,
    Code,
}

impl ContentSection {
    pub const ALL: [ContentSection; 10] = [
        ContentSection::Dirs,
        ContentSection::Files,
        ContentSection::Languages,
        ContentSection::Registry,
        ContentSection::Tasks,
        ContentSection::Run,
        ContentSection::UninstallRun,
        ContentSection::InstallDelete,
        ContentSection::Icons,
        ContentSection::Code,
    ];

    /// Header name of the section
    pub fn name(self) -> &'static str {
        match self {
            ContentSection::Dirs => "Dirs",
            ContentSection::Files => "Files",
            ContentSection::Languages => "Languages",
            ContentSection::Registry => "Registry",
            ContentSection::Tasks => "Tasks",
            ContentSection::Run => "Run",
            ContentSection::UninstallRun => "UninstallRun",
            ContentSection::InstallDelete => "InstallDelete",
            ContentSection::Icons => "Icons",
            ContentSection::Code => "Code",
        }
    }

    /// Look a section up by its header name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.name() == name)
    }
}

impl fmt::Display for ContentSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Script {
    /// Value of an option in `[Setup]`
    pub fn setup_option(&self, key: &str) -> ScriptResult<&OptionValue> {
        self.get(SETUP_SECTION, key)
    }

    pub fn set_setup_option(&mut self, key: &str, value: impl Into<String>) -> ScriptResult<()> {
        self.set(SETUP_SECTION, key, value)
    }

    /// Verbatim body of a content section
    pub fn content(&self, section: ContentSection) -> ScriptResult<&OptionValue> {
        self.get(section.name(), CONTENT_BLOCK)
    }

    /// Replace the body of a content section; the section must exist
    pub fn set_content(&mut self, section: ContentSection, value: impl Into<String>) -> ScriptResult<()> {
        self.set(section.name(), CONTENT_BLOCK, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;

    #[test]
    fn test_setup_option_roundtrip() {
        let mut script = Script::new();
        script.read_str("<test>", "[Setup]\nAppName=x\n").unwrap();

        assert_eq!(script.setup_option("AppName").unwrap().as_str(), Some("x"));
        script.set_setup_option("AppName", "y").unwrap();
        assert_eq!(script.setup_option("AppName").unwrap().as_str(), Some("y"));
    }

    #[test]
    fn test_content_accessors() {
        let mut script = Script::new();
        script
            .read_str("<test>", "[Files]\nSource: \"a.exe\"\n[Code]\nbegin end.\n")
            .unwrap();

        assert_eq!(
            script.content(ContentSection::Files).unwrap().as_str(),
            Some("Source: \"a.exe\"\n")
        );

        script.set_content(ContentSection::Code, "begin\nend.\n").unwrap();
        assert_eq!(
            script.content(ContentSection::Code).unwrap().as_str(),
            Some("begin\nend.\n")
        );
    }

    #[test]
    fn test_content_missing_section() {
        let mut script = Script::new();
        assert!(matches!(
            script.content(ContentSection::Run),
            Err(ScriptError::NoSection { .. })
        ));
        assert!(matches!(
            script.set_content(ContentSection::Run, "x"),
            Err(ScriptError::NoSection { .. })
        ));
    }

    #[test]
    fn test_content_section_names() {
        assert_eq!(ContentSection::from_name("UninstallRun"), Some(ContentSection::UninstallRun));
        assert_eq!(ContentSection::from_name("Setup"), None);
        assert_eq!(ContentSection::InstallDelete.to_string(), "InstallDelete");
    }
}

//! # iss-script
//!
//! Reader and writer for Inno Setup scripts (`.iss`).
//!
//! A script is a list of sections, each led by a `[Name]` header:
//!
//! ```text
//! [Setup]
//! AppName=My Program
//! AppVersion=1.5
//! LicenseText=first line
//!     second line
//!
//! [Files]
//! Source: "MyProg.exe"; DestDir: "{app}"
//!
//! [Code]
//! procedure InitializeWizard;
//! begin
//! end;
//! ```
//!
//! ## Two grammars
//!
//! - **`[Setup]`** holds `name=value` (or `name: value`) options. Indented
//!   lines continue the previous option and are joined with `\n`. Lines
//!   starting with `#`, `;` or the word `REM` are comments, and ` ;` starts a
//!   trailing comment.
//! - **Every other section** is kept verbatim: the whole body, comments and
//!   blank lines included, is stored under [`CONTENT_BLOCK`] and written back
//!   unchanged.
//!
//! A `[DEFAULT]` section feeds the defaults overlay, which every section falls
//! back to on lookup.
//!
//! ## Errors
//!
//! Content before the first header fails immediately
//! ([`ScriptError::MissingSectionHeader`]). Any other unparsable line is
//! collected, and one [`ScriptError::Parse`] listing all of them is returned
//! once the whole source has been read.
//!
//! ```
//! use iss_script::Script;
//!
//! let mut script = Script::new();
//! script.read_str("setup.iss", "[Setup]\nAppName=My Program\n")?;
//! assert_eq!(script.get_str("Setup", "AppName")?, Some("My Program"));
//! # Ok::<(), iss_script::ScriptError>(())
//! ```

pub mod accessors;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod script;

pub use accessors::ContentSection;
pub use decoder::{decode_source, Decoder};
pub use encoder::Encoder;
pub use error::{BadLine, ScriptError, ScriptResult};
pub use script::{
    OptionValue, Script, ScriptConfig, Section, SectionKind, ValueMode, Vars, CONTENT_BLOCK,
    DEFAULT_SECTION, SETUP_SECTION,
};

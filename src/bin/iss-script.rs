//! iss-script CLI
//!
//! Inspect, edit, reformat and check Inno Setup scripts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use iss_script::{
    OptionValue, Script, ScriptConfig, ScriptError, SectionKind, ValueMode, Vars,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "iss-script")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Inno Setup script tool")]
struct Cli {
    /// Accept options without a value in [Setup]
    #[arg(long, global = true)]
    allow_valueless: bool,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the sections of a script
    Sections {
        /// Script to read
        file: PathBuf,
    },

    /// Print the value of an option
    Get {
        file: PathBuf,
        section: String,
        option: String,

        /// Override variable, tried before the section and the defaults
        #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
        defines: Vec<(String, String)>,
    },

    /// Print the options of a section merged with the defaults
    Items {
        file: PathBuf,
        section: String,
    },

    /// Set an option and write the script back out
    Set {
        file: PathBuf,
        section: String,
        option: String,
        value: String,

        /// Output script (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Parse a script and write it back out
    Fmt {
        file: PathBuf,

        /// Output script (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Check scripts for parse errors, walking directories for *.iss
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ScriptConfig {
        value_mode: if cli.allow_valueless {
            ValueMode::Optional
        } else {
            ValueMode::Required
        },
        ..ScriptConfig::default()
    };

    match cli.command {
        Commands::Sections { file } => {
            let script = load(&file, &config)?;
            for name in script.sections() {
                let kind = match script.section(name).map(|section| section.kind()) {
                    Some(SectionKind::Structured) => "options",
                    _ => "content",
                };
                println!("{name}\t{kind}");
            }
        }
        Commands::Get { file, section, option, defines } => {
            let script = load(&file, &config)?;
            let vars: Vars = defines
                .into_iter()
                .map(|(key, value)| (key, OptionValue::Text(value)))
                .collect();
            let value = script.get_with(&section, &option, Some(&vars))?;
            print_value(value);
        }
        Commands::Items { file, section } => {
            let script = load(&file, &config)?;
            for (name, value) in script.items(&section)? {
                match value.as_str() {
                    Some(text) => println!("{name}={}", text.replace('\n', "\n\t")),
                    None => println!("{name}"),
                }
            }
        }
        Commands::Set { file, section, option, value, output } => {
            let mut script = load(&file, &config)?;
            script.set(&section, &option, value)?;
            emit(&script, output.as_deref())?;
        }
        Commands::Fmt { file, output } => {
            let script = load(&file, &config)?;
            emit(&script, output.as_deref())?;
        }
        Commands::Check { inputs } => {
            return check_scripts(&inputs, &config);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "iss_script=error",
        1 => "iss_script=info",
        2 => "iss_script=debug",
        _ => "iss_script=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_define(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {input:?}"))
}

/// Load one script; unlike `Script::read`, a missing file is an error here
fn load(path: &Path, config: &ScriptConfig) -> Result<Script> {
    let mut script = Script::with_config(config.clone());
    let loaded = script
        .read([path])
        .with_context(|| format!("Failed to parse: {}", path.display()))?;

    if loaded.is_empty() {
        anyhow::bail!("Failed to read file: {}", path.display());
    }

    Ok(script)
}

fn print_value(value: &OptionValue) {
    match value {
        OptionValue::Content(block) => print!("{block}"),
        OptionValue::Text(text) => println!("{text}"),
        OptionValue::Valueless => {}
    }
}

fn emit(script: &Script, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            script
                .write_file(path)
                .with_context(|| format!("Failed to write: {}", path.display()))?;
            info!(path = %path.display(), "wrote script");
        }
        None => script.write_to(std::io::stdout().lock())?,
    }
    Ok(())
}

fn check_scripts(inputs: &[PathBuf], config: &ScriptConfig) -> Result<ExitCode> {
    let mut failed = 0usize;
    let mut checked = 0usize;

    for path in collect_scripts(inputs) {
        checked += 1;
        let mut script = Script::with_config(config.clone());

        match script.read([&path]) {
            Ok(loaded) if loaded.is_empty() => {
                failed += 1;
                eprintln!("{}: cannot be opened", path.display());
            }
            Ok(_) => debug!(path = %path.display(), "ok"),
            Err(err) if err.is_parse_error() => {
                failed += 1;
                report(&path, &err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(checked, failed, "check finished");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(path: &Path, err: &ScriptError) {
    for line in err.bad_lines() {
        eprintln!("{}:{}: {:?}", path.display(), line.number, line.text);
    }
    if let ScriptError::MissingSectionHeader { .. } = err {
        eprintln!("{}: content before the first section header", path.display());
    }
}

fn collect_scripts(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut scripts = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let entries = walkdir::WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("iss"))
                });
            scripts.extend(entries.map(|e| e.into_path()));
        } else {
            scripts.push(input.clone());
        }
    }

    scripts
}

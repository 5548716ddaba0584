//! pmforge CLI - OpenAPI documents to executable Postman collections

mod runner;
mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pmforge_core::plan::validate_settings;
use pmforge_core::{Collection, Settings, ValidationStatus};
use pmforge_engine::Converter;

use runner::{CollectionRunner, NewmanRunner, RunSummary};
use storage::{CollectionStore, FileStore};

#[derive(Parser)]
#[command(name = "pmforge")]
#[command(about = "Convert OpenAPI documents into executable Postman collections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    format: OutputFormat,

    /// Strict mode (ambiguities become errors). Use `--strict false` to disable.
    #[arg(long, global = true, action = ArgAction::Set)]
    strict: Option<bool>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a document into a collection
    Convert {
        #[command(flatten)]
        source: SourceArgs,

        /// Collection file to write (default: settings `output`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the collection to ~/.pmforge/collections
        #[arg(long)]
        save: bool,

        /// Execute the collection with newman after writing it
        #[arg(long)]
        run: bool,
    },

    /// Show what a conversion would produce without generating data
    Plan {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print a stored collection
    Show {
        /// Collection id or unique prefix
        id: String,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the collection format
    Schema,
}

#[derive(Args)]
struct SourceArgs {
    /// Settings file (default: .pmforge.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OpenAPI document: path or http(s) URL
    #[arg(short, long)]
    input: Option<String>,

    /// Test configuration file (yaml, json or toml)
    #[arg(short, long)]
    test_config: Option<PathBuf>,

    /// Value of the {{baseUrl}} collection variable
    #[arg(long)]
    host: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("PMFORGE_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Settings file, then command line overrides.
fn load_settings(source: &SourceArgs, cli: &Cli) -> Result<Settings> {
    let mut settings = match &source.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load_default().context("loading .pmforge.toml")?,
    };

    if let Some(input) = &source.input {
        settings.spec.clone_from(input);
    }
    if let Some(test_config) = &source.test_config {
        settings.test_config = Some(test_config.clone());
    }
    if let Some(host) = &source.host {
        settings.host = Some(host.clone());
    }
    if let Some(strict) = cli.strict {
        settings.strict = strict;
    }
    settings.verbose |= cli.verbose;
    Ok(settings)
}

fn write_collection(collection: &Collection, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(collection)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

fn print_run(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Terminal => {
            let icon = if summary.passed() { "PASS" } else { "FAIL" };
            println!(
                "\n{icon}: {} requests, {} assertions, {} failures",
                summary.requests,
                summary.assertions,
                summary.failures.len()
            );
            for f in &summary.failures {
                match &f.test {
                    Some(test) => println!("  {} [{}]: {}", f.item, test, f.message),
                    None => println!("  {}: {}", f.item, f.message),
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Silent => {}
    }
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Convert {
            source,
            output,
            save,
            run,
        } => {
            let settings = load_settings(source, &cli)?;
            let output = output.clone().unwrap_or_else(|| settings.output.clone());

            let mut converter = Converter::from_settings(&settings)
                .with_context(|| format!("loading {}", settings.spec))?;
            let collection = converter.convert()?;
            write_collection(&collection, &output)?;

            let stored = if *save {
                let store = FileStore::default_location()?;
                Some(store.save(&collection)?)
            } else {
                None
            };

            match cli.format {
                OutputFormat::Terminal => {
                    println!(
                        "Wrote {} ({} requests, {} variables) to {}",
                        collection.info.name,
                        collection.item.len(),
                        collection.variable.len(),
                        output.display()
                    );
                    if let Some(id) = &stored {
                        println!("Saved: {id}");
                    }
                }
                OutputFormat::Json => {
                    let summary = serde_json::json!({
                        "name": collection.info.name,
                        "output": output.display().to_string(),
                        "requests": collection.item.len(),
                        "variables": collection.variable.len(),
                        "id": stored,
                    });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                OutputFormat::Silent => {}
            }

            if !*run {
                return Ok(0);
            }

            let runner = NewmanRunner::new().with_verbose(cli.verbose);
            if !runner.is_available() {
                bail!("newman is not installed (npm install -g newman)");
            }
            let summary = runner.run(&output, settings.host.as_deref())?;
            print_run(&summary, cli.format)?;
            Ok(if summary.passed() { 0 } else { 1 })
        }

        Commands::Plan { source } => {
            let settings = load_settings(source, &cli)?;
            let checks = validate_settings(&settings);
            let blocked = checks.iter().any(|v| v.status == ValidationStatus::Error);

            let plan = if blocked {
                None
            } else {
                let mut converter = Converter::from_settings(&settings)
                    .with_context(|| format!("loading {}", settings.spec))?;
                let mut plan = converter.plan()?;
                let mut validations = checks.clone();
                validations.append(&mut plan.validations);
                plan.validations = validations;
                Some(plan)
            };

            match (&plan, cli.format) {
                (_, OutputFormat::Silent) => {}
                (Some(plan), OutputFormat::Terminal) => println!("{}", plan.to_terminal()),
                (Some(plan), OutputFormat::Json) => {
                    println!("{}", serde_json::to_string_pretty(plan)?);
                }
                (None, OutputFormat::Terminal) => {
                    println!("Validation:");
                    for v in &checks {
                        println!("  [{}] {}", v.status, v.message);
                    }
                }
                (None, OutputFormat::Json) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({ "validations": checks }))?
                    );
                }
            }

            let failed = plan.as_ref().is_none_or(|p| p.has_errors());
            Ok(i32::from(failed))
        }

        Commands::Show { id } => {
            let store = FileStore::default_location()?;
            let collection = store.load(id)?;
            match cli.format {
                OutputFormat::Terminal => {
                    println!("{}", collection.info.name);
                    for item in &collection.item {
                        println!("  {} {}", item.request.method, item.name);
                    }
                    for v in &collection.variable {
                        println!("  {{{{{}}}}} = {}", v.key, v.value);
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&collection)?),
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Init => {
            let config_path = ".pmforge.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Settings::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - spec: path or URL of your OpenAPI document");
            println!("  - test_config: per-route variables, expectations and scripts");
            println!("  - host: value of {{{{baseUrl}}}}");
            println!("  - synthesis: how missing parameter values are generated");
            Ok(0)
        }

        Commands::Schema => {
            let schema = pmforge_core::collection::generate_schema();
            println!("{schema}");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn strict_is_unset_unless_given() {
        let cli = Cli::try_parse_from(["pmforge", "plan"]).unwrap();
        assert_eq!(cli.strict, None);

        let cli = Cli::try_parse_from(["pmforge", "plan", "--strict", "false"]).unwrap();
        assert_eq!(cli.strict, Some(false));
    }

    #[test]
    fn flags_override_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("pmforge.toml");
        std::fs::write(
            &config,
            "spec = \"api.yaml\"\nhost = \"http://a\"\nstrict = true\n",
        )
        .unwrap();
        let config_arg = config.display().to_string();

        let cli = Cli::try_parse_from([
            "pmforge",
            "convert",
            "-c",
            config_arg.as_str(),
            "-i",
            "other.json",
            "--host",
            "http://b",
            "--strict",
            "false",
            "-v",
        ])
        .unwrap();
        let Commands::Convert { source, .. } = &cli.command else {
            panic!("expected convert");
        };
        let settings = load_settings(source, &cli).unwrap();
        assert_eq!(settings.spec, "other.json");
        assert_eq!(settings.host.as_deref(), Some("http://b"));
        assert!(!settings.strict);
        assert!(settings.verbose);
    }

    #[test]
    fn collection_is_written_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            spec: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../pmforge-engine/tests/fixtures/petstore.yaml")
                .display()
                .to_string(),
            ..Settings::default()
        };
        let collection = Converter::from_settings(&settings)
            .unwrap()
            .convert()
            .unwrap();
        let path = dir.path().join("out").join("collection.json");
        write_collection(&collection, &path).unwrap();

        let back: Collection =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.item.len(), collection.item.len());
    }
}

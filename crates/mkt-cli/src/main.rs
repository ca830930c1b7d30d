//! `mkt` command-line tool
//!
//! - `normalize`: repair a stored document the way reads do
//! - `merge`: apply a partial update with keyed-array semantics
//! - `simulate`: seeded version-chain race simulation

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mkt_core::EntityKind;
use mkt_document::{Document, Normalizer};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod simulator;

use config::CliConfig;
use simulator::{run_simulator, SimulatorConfig};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MKT_LOG";

#[derive(Debug, Parser)]
#[command(name = "mkt", version, about = "Marketing entity engine tools")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Repair a stored document and print its canonical form
    Normalize {
        /// Entity kind; read from the document's `kind` when omitted
        #[arg(long)]
        kind: Option<EntityKind>,
        /// JSON file, stdin when omitted
        input: Option<PathBuf>,
    },
    /// Merge a partial update into a document
    Merge {
        /// Entity kind whose keyed arrays apply
        #[arg(long)]
        kind: EntityKind,
        /// Existing document (JSON)
        base: PathBuf,
        /// Partial update (JSON)
        patch: PathBuf,
    },
    /// Run the seeded version-chain simulator
    Simulate {
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 200)]
        rounds: u64,
        #[arg(long, default_value_t = 3)]
        chains: usize,
        #[arg(long, default_value_t = 4)]
        writers: usize,
        /// Probability of a fork that dies before retiring the old version
        #[arg(long, default_value_t = 0.1)]
        crash_rate: f64,
        #[arg(long)]
        stop_on_violation: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    init_tracing(&config, cli.log_json);

    match cli.command {
        Command::Normalize { kind, input } => {
            let raw = read_json(input.as_deref())?;
            let document = Document::try_from_value(raw).context("document must be a JSON object")?;
            let kind = match kind {
                Some(kind) => kind,
                None => EntityKind::of(&document)?,
            };
            let normalized = Normalizer::new(config.engine.normalizer.clone())
                .normalize(document.into_map(), kind.schema())?;
            info!(kind = %kind, pass = ?normalized.pass, "normalized document");
            print_json(&normalized.document.into_value())?;
        }
        Command::Merge { kind, base, patch } => {
            let base = read_json(Some(&base))?;
            let patch = read_json(Some(&patch))?;
            let merged = mkt_merge::merge_json(&base, patch, &kind.keyed_arrays())?;
            print_json(&merged)?;
        }
        Command::Simulate {
            seed,
            rounds,
            chains,
            writers,
            crash_rate,
            stop_on_violation,
        } => {
            if !(0.0..=1.0).contains(&crash_rate) {
                bail!("--crash-rate must be between 0 and 1");
            }
            let sim = SimulatorConfig {
                seed,
                rounds,
                chains,
                max_writers: writers,
                crash_rate,
                stop_on_first_violation: stop_on_violation,
            };
            info!(seed, rounds, "running simulator");
            let report = run_simulator(sim, config.engine.clone()).await?;
            println!("{}", report.generate_text());
            if !report.passed() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn init_tracing(config: &CliConfig, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(config.log_level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);

    if json || config.log_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn read_json(path: Option<&Path>) -> Result<Value> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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
    fn parses_kind_names() {
        let cli = Cli::try_parse_from(["mkt", "merge", "--kind", "masterPlan", "a.json", "b.json"]).unwrap();
        match cli.command {
            Command::Merge { kind, .. } => assert_eq!(kind, EntityKind::MasterPlan),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["mkt", "merge", "--kind", "poster", "a.json", "b.json"]).is_err());
    }

    #[test]
    fn reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, r#"{"id": "c1"}"#).unwrap();
        assert_eq!(read_json(Some(&path)).unwrap(), serde_json::json!({"id": "c1"}));

        std::fs::write(&path, "not json").unwrap();
        assert!(read_json(Some(&path)).is_err());
    }
}

//! `statemig` command-line interface

use anyhow::{anyhow, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use statemig_core::{
    list_documents, pending_documents, MigrateError, MigrationDocument, Migrator, MigratorConfig,
    RunReport, StatusFilter, LOG_ENV,
};
use statemig_history::FileLedger;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plan,
    Apply,
}

fn cli() -> Command {
    let path = Arg::new("path")
        .value_parser(value_parser!(PathBuf))
        .help("Migration document; defaults to every unapplied document in migration_dir");

    Command::new("statemig")
        .version(statemig_core::VERSION)
        .about("Plan-gated rewrites of infrastructure-as-code state")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default .statemig.toml, or STATEMIG_CONFIG)"),
        )
        .subcommand(
            Command::new("plan")
                .about("Replay a document and check it against live infrastructure")
                .arg(path.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print plan reports as JSON"),
                ),
        )
        .subcommand(
            Command::new("apply")
                .about("Replay, check and commit a document")
                .arg(path),
        )
        .subcommand(
            Command::new("list")
                .about("List documents in migration_dir with their history status")
                .arg(
                    Arg::new("status")
                        .long("status")
                        .default_value("all")
                        .value_parser(["all", "applied", "unapplied"])
                        .help("Only show documents with this status"),
                ),
        )
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let matches = cli().get_matches();

    let code = match run(&matches).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(matches: &ArgMatches) -> anyhow::Result<bool> {
    let config_path = matches.get_one::<PathBuf>("config");
    let config = MigratorConfig::discover(config_path.map(PathBuf::as_path))
        .await
        .context("loading configuration")?;

    match matches.subcommand() {
        Some(("plan", args)) => {
            let json = args.get_flag("json");
            run_documents(&config, args.get_one::<PathBuf>("path"), Mode::Plan, json).await
        }
        Some(("apply", args)) => {
            run_documents(&config, args.get_one::<PathBuf>("path"), Mode::Apply, false).await
        }
        Some(("list", args)) => {
            let filter: StatusFilter = args
                .get_one::<String>("status")
                .map_or(Ok(StatusFilter::All), |s| s.parse())
                .map_err(|e: String| anyhow!(e))?;
            list(&config, filter).await
        }
        _ => Err(anyhow!("no subcommand given")),
    }
}

async fn run_documents(
    config: &MigratorConfig,
    path: Option<&PathBuf>,
    mode: Mode,
    json: bool,
) -> anyhow::Result<bool> {
    let documents = match path {
        Some(path) => vec![MigrationDocument::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?],
        None => {
            let ledger = FileLedger::new(&config.history.path);
            let pending = pending_documents(&config.migration_dir, &ledger)
                .await
                .with_context(|| format!("reading {}", config.migration_dir.display()))?;
            if pending.is_empty() {
                println!("no unapplied documents in {}", config.migration_dir.display());
            }
            pending
        }
    };

    tracing::debug!(documents = documents.len(), ?mode, "documents selected");
    for document in &documents {
        let migrator = Migrator::from_config(config, document.deployment());
        let report = match mode {
            Mode::Plan => match migrator.plan(document).await {
                Ok(report) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    }
                    RunReport::from(&report)
                }
                Err(e) => failure(&e),
            },
            Mode::Apply => match migrator.apply(document).await {
                Ok(outcome) => RunReport::from(&outcome),
                Err(e) => failure(&e),
            },
        };
        println!("{}: {report}", document.name());
        if !report.success {
            return Ok(false);
        }
    }
    Ok(true)
}

fn failure(err: &MigrateError) -> RunReport {
    if let MigrateError::DriftDetected { plan, .. } = err {
        for (address, kind) in plan.divergent() {
            eprintln!("  {:<8} {address}", kind.to_string());
        }
    }
    if err.is_retryable() {
        eprintln!("  the run may succeed if retried");
    }
    RunReport::from(err)
}

async fn list(config: &MigratorConfig, filter: StatusFilter) -> anyhow::Result<bool> {
    let ledger = FileLedger::new(&config.history.path);
    let entries = list_documents(&config.migration_dir, &ledger)
        .await
        .with_context(|| format!("reading {}", config.migration_dir.display()))?;
    for entry in entries.iter().filter(|e| filter.matches(e.status)) {
        println!("{entry}");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn config_is_global() {
        let matches = cli()
            .try_get_matches_from(["statemig", "apply", "m/001.toml", "--config", "ci.toml"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("ci.toml"))
        );
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "apply");
        assert_eq!(
            args.get_one::<PathBuf>("path"),
            Some(&PathBuf::from("m/001.toml"))
        );
    }

    #[test]
    fn list_rejects_unknown_status() {
        assert!(cli()
            .try_get_matches_from(["statemig", "list", "--status", "done"])
            .is_err());
        let matches = cli().try_get_matches_from(["statemig", "list"]).unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<String>("status").map(String::as_str), Some("all"));
    }
}

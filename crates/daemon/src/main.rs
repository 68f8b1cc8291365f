//! RelayCraft node binary
//!
//! Offline maintenance of a servicer node's keys and evidence stores.
//! The relay service itself is embedded by the validator through
//! [`relaycraft_daemon::NodeService`].

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relaycraft_daemon::{cache_config, load_registry, migrate_evidence, stored_receipts};
use relaycraft_logging::init_logging;
use relaycraft_settings::{default_settings_path, Settings};

#[derive(Parser)]
#[command(name = "relaycraft-node", version, about = "RelayCraft servicer node")]
struct Cli {
    /// Settings file (default ~/.relaycraft/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the settings file and generate missing servicer keys
    Init,
    /// Print the servicer addresses
    Addresses,
    /// Upgrade evidence databases written in the legacy encoding
    MigrateEvidence,
    /// Print recorded evidence as JSON receipts
    Receipts,
}

fn print_addresses(settings: &Settings) -> anyhow::Result<()> {
    let registry = load_registry(&settings.node)?;
    for address in registry.addresses() {
        println!("{}", address);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(default_settings_path);
    let settings = Settings::load_from(&path)
        .with_context(|| format!("loading settings from {:?}", path))?;
    init_logging(&settings.logging.filter);

    match cli.command {
        Command::Init => {
            settings.save_to(&path)?;
            print_addresses(&settings)?;
        }
        Command::Addresses => print_addresses(&settings)?,
        Command::MigrateEvidence => {
            let registry = load_registry(&settings.node)?;
            let config = cache_config(&settings.node);
            let reports = migrate_evidence(&registry, &config).context("migrating evidence")?;
            if reports.is_empty() {
                tracing::info!("No evidence databases found in {:?}", config.data_dir);
            }
            for (db, report) in reports {
                println!(
                    "{}: schema {} -> {}, {} upgraded, {} already current",
                    db, report.from_version, report.to_version, report.upgraded, report.already_current
                );
            }
        }
        Command::Receipts => {
            let registry = load_registry(&settings.node)?;
            registry
                .init_all_caches(&cache_config(&settings.node))
                .context("opening evidence stores (run migrate-evidence first if they are legacy)")?;
            let receipts = stored_receipts(&registry)?;
            println!("{}", serde_json::to_string_pretty(&receipts)?);
        }
    }

    Ok(())
}

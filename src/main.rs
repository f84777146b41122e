//! quantity-reconcile CLI: merge quantity and unit ontologies into one catalog.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::Result;

use quantity_reconcile::catalog::CatalogBuilder;
use quantity_reconcile::config::ReconcileConfig;
use quantity_reconcile::dimension;
use quantity_reconcile::feed::{self, FeedSpec};

#[derive(Parser)]
#[command(
    name = "quantity-reconcile",
    version,
    about = "Reconcile quantity kinds and units from several ontologies"
)]
struct Cli {
    /// TOML configuration with source profiles and label settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full reconciliation and emit the catalog as JSON.
    Run {
        /// Feed file as `<source>:<quantities|units>:<path>`. Repeatable.
        #[arg(long = "feed", required = true)]
        feeds: Vec<FeedSpec>,

        /// Write the catalog here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the canonical key of a dimension vector encoding.
    Key {
        /// QUDT (`A0E0L1I0M0H0T-2D0`) or flat (`1,0,-2,0,0,0,0`) encoding.
        encoding: String,
    },

    /// Print the effective configuration, including built-in profiles.
    Profiles,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { feeds, out } => {
            let feeds = feed::load_feeds(&feeds)?;
            let catalog = CatalogBuilder::new(config).build(&feeds)?;

            match out {
                Some(path) => {
                    catalog.write_json(&path)?;
                    eprintln!("Catalog written to {}", path.display());
                }
                None => println!("{}", catalog.to_json()?),
            }
            eprintln!("{}", catalog.stats());
        }

        Commands::Key { encoding } => {
            let key = dimension::dimension_key(&encoding)?;
            println!("{key}");
        }

        Commands::Profiles => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReconcileConfig> {
    match path {
        Some(path) => Ok(ReconcileConfig::load(path)?),
        None => Ok(ReconcileConfig::default()),
    }
}

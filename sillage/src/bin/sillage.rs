//! Command-line front end for the search core.
//!
//! Usage:
//!     sillage seed
//!     sillage search "eros flame" --limit 5
//!     sillage autocomplete sau
//!     sillage index
//!
//! Logging honours RUST_LOG (default: sillage=info).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sillage::models::demo_records;
use sillage::{FragranceSearch, SearchConfig, SearchOptions, SqliteCatalog};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the catalog SQLite database
    #[arg(long, default_value = "sillage.sqlite", global = true)]
    db: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the demo catalog into the database
    Seed,
    /// Ranked search
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long)]
        offset: Option<usize>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Name/brand completions
    Autocomplete {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Push the catalog to the configured remote engine
    Index,
}

fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sillage=info"))
                .add_directive("tantivy=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SearchConfig> {
    match path {
        Some(path) => SearchConfig::load(path).with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(SearchConfig::from_env()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let catalog = SqliteCatalog::open(&args.db).with_context(|| format!("Failed to open {}", args.db.display()))?;

    if let Command::Seed = args.command {
        let records = demo_records();
        let written = catalog.upsert_many(&records).context("Failed to seed catalog")?;
        println!("Seeded {} fragrances into {}", written, args.db.display());
        return Ok(());
    }

    let service = FragranceSearch::from_config(config, Arc::new(catalog))?;
    service.initialize().await.context("Failed to load catalog snapshot")?;

    match args.command {
        Command::Seed => {}
        Command::Search {
            query,
            limit,
            offset,
            json,
        } => {
            let options = SearchOptions {
                limit,
                offset,
                include_metadata: json,
                ..SearchOptions::default()
            };
            let response = service.search(&query, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                for (rank, result) in response.results.iter().enumerate() {
                    println!(
                        "{:>3}. {:<40} {:<24} {:.3}  {:?}",
                        rank + 1,
                        result.name,
                        result.brand,
                        result.score,
                        result.match_type
                    );
                }
                println!("{} of {} results in {} ms ({:?})", response.results.len(), response.total, response.duration, response.source);
                if let Some(suggestions) = response.suggestions {
                    println!("Did you mean: {}", suggestions.join(", "));
                }
            }
        }
        Command::Autocomplete { query, limit } => {
            for label in service.autocomplete(&query, limit).await? {
                println!("{label}");
            }
        }
        Command::Index => {
            if !service.has_remote() {
                anyhow::bail!("No remote engine configured (set remote.url or SILLAGE_MEILISEARCH_URL)");
            }
            let sent = service.index_fragrances(None).await?;
            println!("Indexed {sent} fragrances");
        }
    }

    service.shutdown().await;
    Ok(())
}

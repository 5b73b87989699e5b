//! binchicken command line
//!
//! Introspects a SQLite or DuckDB database and turns natural-language
//! questions into SQL with an OpenAI-compatible model. Results are printed
//! as JSON on stdout.

use std::path::PathBuf;

use anyhow::{bail, Context};
use binchicken_duck::DuckSource;
use binchicken_query::{OpenAiModel, QueryGenerationService};
use binchicken_schema::SchemaSource;
use binchicken_sqlite::SqliteSource;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

mod config;
mod logging;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "binchicken", version, about = "Explore a database and ask it questions in plain language")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, conflicts_with = "duckdb")]
    sqlite: Option<PathBuf>,

    /// DuckDB database file
    #[arg(long, global = true)]
    duckdb: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tables
    Tables,
    /// Describe tables and their columns
    Schema,
    /// Table sizes in megabytes
    Sizes,
    /// Exact row count per table
    Rows,
    /// Size and row count per table
    Metrics,
    /// Generate SQL for a natural-language request
    Ask {
        prompt: String,

        /// Run the generated statement and print its result
        #[arg(long)]
        execute: bool,

        /// Execute even if the statement may modify data
        #[arg(long, requires = "execute")]
        allow_unsafe: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env(),
    };
    config.apply_logging_env();
    logging::init();

    let source = open_source(&cli)?;
    info!(backend = source.backend(), "connected");

    match cli.command {
        Command::Tables => print_json(&source.list_tables()?),
        Command::Schema => print_json(&source.describe_tables()?),
        Command::Sizes => print_json(&source.table_sizes()?),
        Command::Rows => print_json(&source.row_counts()?),
        Command::Metrics => print_json(&source.table_metrics()?),
        Command::Ask {
            prompt,
            execute,
            allow_unsafe,
        } => {
            let api_key = Config::get_openai_api_key()?;
            let model = OpenAiModel::from_api_key(
                api_key,
                config.model.base_url.as_deref(),
                config.model.name.as_str(),
            )
            .with_temperature(config.model.temperature);
            info!(model = model.model(), "using language model");

            let mut generation = config.generation_config();
            if allow_unsafe {
                generation.safe_mode = false;
            }

            let service = QueryGenerationService::with_config(model, generation);
            let result = service.generate(&*source, &prompt, execute).await?;
            print_json(&result)
        }
    }
}

fn open_source(cli: &Cli) -> anyhow::Result<Box<dyn SchemaSource>> {
    match (&cli.sqlite, &cli.duckdb) {
        (Some(path), None) => Ok(Box::new(SqliteSource::open(path)?)),
        (None, Some(path)) => Ok(Box::new(DuckSource::open(path)?)),
        _ => bail!("specify a database with --sqlite <FILE> or --duckdb <FILE>"),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

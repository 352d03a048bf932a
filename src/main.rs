use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

mod alerts;
mod config;
mod db;
mod error;
mod job;
mod logging;
mod metrics;
mod models;
mod report;
mod server;

use config::{DatabaseConfig, ServerConfig};
use db::PgStore;
use metrics::UniformJitter;

#[derive(Parser)]
#[command(name = "team-metrics-aggregator")]
#[command(about = "Aggregates member telemetry into daily team cognitive metrics", long_about = None)]
struct Cli {
    #[command(flatten)]
    database: DatabaseConfig,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo organisation with a week of telemetry
    Seed,
    /// Import raw metric samples from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run the aggregation job once and print the summary
    Aggregate,
    /// Serve the HTTP trigger endpoint
    Serve {
        #[command(flatten)]
        config: ServerConfig,
    },
    /// Write a markdown report of stored team metrics
    Report {
        /// Metric date, defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.json);

    let pool = cli.database.connect().await?;
    let store = PgStore::new(pool);

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(store.pool(), &csv).await?;
            println!("Inserted {inserted} metric samples from {}.", csv.display());
        }
        Commands::Aggregate => {
            let outcome = job::run(&store, &UniformJitter, Utc::now()).await;
            let (_, body) = server::outcome_body(&outcome);
            println!("{}", serde_json::to_string_pretty(&body)?);
            outcome?;
        }
        Commands::Serve { config } => {
            let state = server::AppState {
                store: Arc::new(store),
                jitter: Arc::new(UniformJitter),
            };
            server::serve(state, config.bind).await?;
        }
        Commands::Report { date, out } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let rows = db::fetch_team_metrics(store.pool(), date).await?;
            let report = report::build_report(date, &rows);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

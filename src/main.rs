use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod digest;
mod error;
mod fields;
mod metrics;
mod models;
mod notify;
mod report;
mod risk;
mod store;
#[cfg(test)]
mod testing;
mod throttle;
mod view;

use crate::config::AppConfig;
use crate::db::PgStore;
use crate::digest::{DigestRunner, DigestSettings};
use crate::models::DateRange;
use crate::notify::HttpMailer;

#[derive(Parser)]
#[command(name = "safety-scorecard")]
#[command(about = "Client safety scorecards and weekly metric digests", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Email every active client company its weekly scorecard
    Digest,
    /// Compute one company's metrics bundle
    Metrics {
        #[arg(long)]
        company: String,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        /// Write scalar metrics as CSV instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Render the scorecard page an access token would see
    View {
        #[arg(long)]
        token: String,
        #[arg(long, default_value = "dashboard.html")]
        out: PathBuf,
    },
}

fn load_app_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    match config::resolve_config_path(path) {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = load_app_config(cli.config)?;
    let store = PgStore::connect(&cfg.database_url()?, cfg.database.max_connections).await?;
    let census = cfg.employee_census();
    let now = Utc::now();

    match cli.command {
        Commands::Digest => {
            let mailer = HttpMailer::new(&cfg.mail, cfg.mail_api_key()?)?;
            let runner = DigestRunner {
                records: &store,
                directory: &store,
                sender: &mailer,
                census: &census,
                settings: DigestSettings {
                    window_days: cfg.digest.window_days,
                    company_delay: cfg.digest.company_delay(),
                    subject_prefix: cfg.mail.subject_prefix.clone(),
                },
            };
            match runner.run(now).await {
                Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "weekly digest aborted");
                    let failure = serde_json::json!({
                        "success": false,
                        "error": format!("{err:#}"),
                    });
                    println!("{}", serde_json::to_string_pretty(&failure)?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Metrics {
            company,
            since_days,
            csv,
        } => {
            let range = DateRange {
                from: (now - Duration::days(since_days.max(1))).date_naive(),
                to: now.date_naive(),
            };
            let bundle = digest::company_metrics(&store, &census, &company, range, now).await;
            match csv {
                Some(path) => {
                    report::write_metrics_csv(&bundle, &path)?;
                    println!("Metrics written to {}.", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&bundle)?),
            }
        }
        Commands::View { token, out } => {
            match view::open_dashboard(&store, &store, &census, &token, cfg.view.window_days, now)
                .await
            {
                Ok(dashboard) => {
                    std::fs::write(&out, report::render_dashboard_html(&dashboard))?;
                    println!("Scorecard written to {}.", out.display());
                }
                Err(denied) => {
                    eprintln!("{denied}");
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}

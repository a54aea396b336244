//! shadow-migrate CLI - schema migration for history and trash shadow tables.

use clap::{Parser, Subcommand};
use shadow_migrate::{Config, MigrateError, MigrationReport, PgBackend, RunContext, ShadowMigrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "shadow-migrate")]
#[command(about = "Schema migration for history and trash shadow tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the shadow-table migration
    Run,

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run => {
            let report = migrate(&config).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds());
                println!(
                    "  Junction tables created: {}",
                    report.junction_tables_created
                );
                println!("  Junction rows migrated: {}", report.junction_rows_migrated);
                println!("  Columns added: {}", report.columns_added);
                println!("  History rows updated: {}", report.history_rows_updated);
                if !report.failures.is_empty() {
                    println!("  Failures:");
                    for failure in &report.failures {
                        println!("    - {}", failure);
                    }
                }
            }

            if !report.failures.is_empty() {
                eprintln!(
                    "migration finished with {} failures",
                    report.failures.len()
                );
            }
            return Ok(ExitCode::from(completion_code(&report)));
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let result = check_connection(&config).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "connected": result.is_ok(),
                        "latency_ms": latency_ms,
                        "error": result.as_ref().err().map(|e| e.to_string()),
                    }))?
                );
            } else {
                match &result {
                    Ok(()) => println!("Database: OK ({}ms)", latency_ms),
                    Err(e) => println!("Database: FAILED\n  Error: {}", e),
                }
            }

            result?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Exit code for a run that completed: zero only when nothing failed.
fn completion_code(report: &MigrationReport) -> u8 {
    if report.failures.is_empty() {
        0
    } else {
        1
    }
}

/// Connect to the configured backend and run the full migration.
async fn migrate(config: &Config) -> Result<MigrationReport, MigrateError> {
    let ctx = RunContext::for_dialect(config.database.dialect()?);

    match config.database.normalized_type()? {
        "postgres" => {
            let backend = PgBackend::connect(&config.database).await?;
            ShadowMigrator::new(&backend, ctx).run().await
        }
        #[cfg(feature = "mysql")]
        "mysql" => {
            let backend = shadow_migrate::MysqlBackend::connect(&config.database).await?;
            ShadowMigrator::new(&backend, ctx).run().await
        }
        #[cfg(not(feature = "mysql"))]
        "mysql" => Err(MigrateError::Config(
            "built without MySQL support (enable the `mysql` feature)".to_string(),
        )),
        _ => unreachable!(),
    }
}

async fn check_connection(config: &Config) -> Result<(), MigrateError> {
    match config.database.normalized_type()? {
        "postgres" => {
            PgBackend::connect(&config.database).await?;
            Ok(())
        }
        #[cfg(feature = "mysql")]
        "mysql" => {
            shadow_migrate::MysqlBackend::connect(&config.database).await?;
            Ok(())
        }
        #[cfg(not(feature = "mysql"))]
        "mysql" => Err(MigrateError::Config(
            "built without MySQL support (enable the `mysql` feature)".to_string(),
        )),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report() -> MigrationReport {
        MigrationReport {
            run_id: "run".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            junction_tables_created: 0,
            junction_rows_migrated: 0,
            columns_added: 0,
            history_rows_updated: 0,
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_completion_code_zero_only_without_failures() {
        assert_eq!(completion_code(&report()), 0);

        let mut failed = report();
        failed.failures.push("table x: statement failed".to_string());
        assert_eq!(completion_code(&failed), 1);
        // isolated failures are not a configuration error
        assert_ne!(
            completion_code(&failed),
            MigrateError::Config(String::new()).exit_code()
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

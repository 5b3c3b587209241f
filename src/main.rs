//! Media Backup/Restore Tool
//!
//! Provides CLI interface for media backup and restore operations

// mediabackup/src/main.rs
use anyhow::{Context, Result};
use mediabackup::config::{
    AppConfig, OperationConfig, load_backup_config_from_json, load_restore_config_from_json,
};
use mediabackup::utils::human_size;
use mediabackup::{backup, restore};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_app() -> Result<()> {
    // MEDIABACKUP_CONFIG overrides the default config.json in the working directory.
    let config_path = env::var("MEDIABACKUP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let mut app_config = AppConfig::load_from_json(&config_path).with_context(|| {
        format!("Failed to load application configuration from {}", config_path.display())
    })?;
    init_logging(app_config.verbose);

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "backup" => {
            println!("🚀 Starting Backup Process...");
            let backup_config = load_backup_config_from_json(&app_config.raw_json_config)
                .context("Failed to load backup configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Backup(backup_config));
            let outcome = backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
            println!("Backup written: {} ({})", outcome.filename, human_size(outcome.size));
        }
        "2" | "restore" => {
            println!("🔄 Starting Restore Process...");
            let restore_config = load_restore_config_from_json(&app_config.raw_json_config)
                .context("Failed to load restore configuration from JSON")?;
            app_config.operation = Some(OperationConfig::Restore(restore_config));
            let summary = restore::run_restore_flow(&app_config)
                .await
                .context("Restore process failed")?;
            println!(
                "Restored {} file(s), replaced {}, skipped {}",
                summary.uploaded, summary.replaced, summary.skipped
            );
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup) or '2' (restore).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Prompts user to select backup or restore operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Take Media Backup (or type 'backup')");
    println!("2. Restore Media Backup (or type 'restore')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

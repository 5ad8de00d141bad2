//! Userflow CLI - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::Path;
use std::process;
use tracing::error;
use userflow_common::logging::{init_logging, LogConfig, LogLevel};
use userflow_pipeline::upload::UploadFileCommand;
use userflow_pipeline::{runner, simulate, Cli, Commands, ConfigSource, MalformedRowPolicy};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let prefix = match &cli.command {
        Commands::Run { stage, .. } => format!("userflow-{}", stage),
        Commands::Upload { .. } => "userflow-upload".to_string(),
        Commands::Simulate { .. } => "userflow-simulate".to_string(),
    };

    let mut log_config = LogConfig::for_process(prefix);
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid logging environment: {:#}", e);
            log_config
        }
    };

    // Keep the file writer alive until exit
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {:#}", e);
            None
        }
    };

    if let Err(e) = execute_command(cli.command).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run { stage, event } => {
            let source = ConfigSource::load()?;
            let event_json = read_event(event.as_deref())?;
            let status = runner::run_stage(&source, stage, &event_json).await?;
            println!("{}", status);
        }
        Commands::Upload {
            file,
            bucket,
            content_type,
        } => {
            let source = ConfigSource::load()?;
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let command = UploadFileCommand {
                filename: file_name(&file),
                content,
                content_type,
            };
            let response = runner::upload_file(&source, bucket, command)
                .await
                .context("Failed to upload file")?;
            println!(
                "Uploaded s3://{}/{} ({} bytes, sha256 {})",
                response.bucket, response.key, response.size, response.checksum
            );
        }
        Commands::Simulate {
            file,
            malformed_rows,
        } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let policy = match malformed_rows {
                Some(policy) => policy,
                None => MalformedRowPolicy::from_source(&ConfigSource::load()?)?,
            };
            let report = simulate::simulate(file_name(&file), content, policy).await?;
            println!("{}", report);
            for message in &report.notifications {
                println!("  -> {}", message.payload);
            }
        }
    }

    Ok(())
}

fn read_event(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read event from stdin")?;
            Ok(buffer)
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

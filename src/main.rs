use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::{Cli, Commands};
use subloop::config::{GlobalConfig, load_config};
use subloop::daemon::{EndpointStatus, read_endpoint_state};
use subloop::env::{FileSystem, LocalFileSystem, ProcessRunner, SystemClock, TokioProcessRunner};
use subloop::ins::{ComplianceStore, InsHook};
use subloop::scheduler::{BackupScheduler, HealthCheck, HealthStatus, restore_backup};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("subloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("subloop.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
        println!("  substrate: {}", config.paths.substrate.display());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    match &cli.command {
        Commands::Check => handle_check(fs, config).await,
        Commands::Compliance { reset } => handle_compliance(fs, config, *reset).await,
        Commands::Health => handle_health(fs, config).await,
        Commands::Backup { no_verify } => handle_backup(fs, config, !*no_verify).await,
        Commands::Restore { archive } => handle_restore(fs, config, archive.as_ref()).await,
        Commands::Endpoint => handle_endpoint(fs, config).await,
        Commands::Config => handle_config(config),
    }
}

async fn handle_check(fs: Arc<dyn FileSystem>, config: &GlobalConfig) -> Result<()> {
    info!("Evaluating rules against {}", config.paths.substrate.display());
    let (store, _) = ComplianceStore::load(fs.clone(), &config.paths.state).await;
    let mut hook = InsHook::new(
        fs,
        Arc::new(SystemClock),
        &config.paths.substrate,
        config.ins.clone(),
        store,
    );
    let result = hook.evaluate(0, None).await;
    if result.noop {
        println!("{}", "No actions".green());
        return Ok(());
    }
    for action in &result.actions {
        println!("{} {}: {}", format!("[{}]", action.kind).yellow(), action.target.bold(), action.detail);
    }
    Ok(())
}

async fn handle_compliance(fs: Arc<dyn FileSystem>, config: &GlobalConfig, reset: bool) -> Result<()> {
    let (mut store, fresh) = ComplianceStore::load(fs, &config.paths.state).await;
    if reset {
        store.clear_all();
        store.save().await;
        if store.is_dirty() {
            eyre::bail!("Failed to write {}", store.path().display());
        }
        println!("{}", "Compliance state cleared".green());
        return Ok(());
    }

    let state = store.snapshot();
    if fresh || state.partials.is_empty() {
        println!("{}", "No tracked preconditions".green());
        return Ok(());
    }
    println!("Last updated at cycle {}", state.last_updated_cycle);
    for (precondition, record) in &state.partials {
        println!(
            "  {} {} (cycles {}-{})",
            format!("x{}", record.count).yellow(),
            precondition,
            record.first_cycle,
            record.last_cycle
        );
    }
    Ok(())
}

async fn handle_health(fs: Arc<dyn FileSystem>, config: &GlobalConfig) -> Result<()> {
    let result = HealthCheck::for_substrate(fs, &config.paths.substrate)
        .run(Utc::now())
        .await;
    let overall = match result.overall {
        HealthStatus::Healthy => result.overall.to_string().green(),
        HealthStatus::Degraded => result.overall.to_string().yellow(),
        HealthStatus::Unhealthy => result.overall.to_string().red(),
    };
    println!("{} {}", "Health:".bold(), overall);
    for finding in &result.findings {
        let mark = if finding.healthy { "ok".green() } else { "!!".red() };
        println!("  {} {}: {}", mark, finding.analyzer, finding.detail);
    }
    Ok(())
}

async fn handle_backup(fs: Arc<dyn FileSystem>, config: &GlobalConfig, verify: bool) -> Result<()> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let mut backup_config = config.backup.clone();
    backup_config.verify = verify;
    let mut scheduler = BackupScheduler::new(
        fs,
        runner,
        Arc::new(SystemClock),
        &config.paths.substrate,
        &config.paths.backups,
        backup_config,
    );
    let result = scheduler.run_backup().await;
    if !result.success {
        eyre::bail!("Backup failed: {}", result.error.unwrap_or_default());
    }
    if let Some(path) = &result.backup_path {
        println!("{} {}", "Backup written:".green(), path.display());
    }
    if let Some(verification) = &result.verification {
        println!("  sha256 {}", verification.checksum.as_deref().unwrap_or("-"));
        println!("  {} bytes, {} entries", verification.size_bytes, verification.files.len());
    }
    Ok(())
}

async fn handle_restore(fs: Arc<dyn FileSystem>, config: &GlobalConfig, archive: Option<&PathBuf>) -> Result<()> {
    let result = restore_backup(
        &*fs,
        &TokioProcessRunner,
        &config.paths.substrate,
        archive.map(|p| p.as_path()),
        Some(config.paths.backups.as_path()),
    )
    .await;
    if !result.success {
        eyre::bail!("Restore failed: {}", result.error.unwrap_or_default());
    }
    if let Some(from) = &result.restored_from {
        println!("{} {}", "Restored from:".green(), from.display());
    }
    Ok(())
}

async fn handle_endpoint(fs: Arc<dyn FileSystem>, config: &GlobalConfig) -> Result<()> {
    let state = read_endpoint_state(&*fs, &config.paths.substrate).await;
    let status = match state.status {
        EndpointStatus::Up => state.status.to_string().green(),
        EndpointStatus::Down => state.status.to_string().red(),
        EndpointStatus::Degraded => state.status.to_string().yellow(),
        EndpointStatus::Unknown => state.status.to_string().dimmed(),
    };
    println!("{} {}", "Endpoint:".bold(), status);
    println!("  {}", state.context_line());
    Ok(())
}

fn handle_config(config: &GlobalConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

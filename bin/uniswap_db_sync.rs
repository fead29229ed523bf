use anyhow::Context;
use clap::{Parser, Subcommand};
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use uniswap_db_sync::{
    build_reader, cron::jobs::pool_sync, CronScheduler, CronSettings, PoolWriter, PostgresClient,
    Settings, SyncOrchestrator,
};

/// Keeps one Uniswap V3 pool's state and ticks mirrored in PostgreSQL.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync on a fixed interval until Ctrl+C or SIGTERM (default)
    Run,
    /// Sync once and exit
    Once,
    /// Apply the database schema and exit
    Migrate,
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?
        .validate()?;

    let postgres = PostgresClient::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;
    postgres.migrate().await?;

    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Migrate = command {
        return Ok(());
    }

    let reader = build_reader(&settings)?;
    let orchestrator = SyncOrchestrator::new(
        &settings.sync.pool_address,
        reader,
        PoolWriter::new(postgres),
        settings.run_deadline(),
    );

    match command {
        Command::Once => {
            pool_sync::run(&orchestrator).await?;
            Ok(())
        },
        _ => run_scheduler(CronScheduler::new(orchestrator, CronSettings::from(&settings.sync))).await,
    }
}

async fn run_scheduler(cron_scheduler: CronScheduler<PostgresClient>) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    // Set up graceful shutdown signal handler
    info!("Sync running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    // An in-flight run is abandoned here; its open transaction rolls back
    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}

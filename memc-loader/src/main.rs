use std::path::Path;
use std::time::Instant;

use anyhow::Error;
use envconfig::Envconfig;
use memc_loader::{
    config::Config,
    pipeline::{Pipeline, PipelineOptions},
    router::Router,
    source::{discover_files, finalize},
};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

// The file in flight still drains; no new file is started once this fires
fn spawn_shutdown_listener(shutdown: CancellationToken) -> Result<(), Error> {
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
        shutdown.cancel();
    });
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env()?;
    config.validate()?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone())?;

    let pipeline = Pipeline::new(
        Router::from_config(&config),
        PipelineOptions::from_config(&config),
    )
    .with_shutdown(shutdown.clone());

    let files = discover_files(Path::new(&config.input_dir), &config.pattern).await?;
    info!("found {} file(s) matching {:?}", files.len(), config.pattern);
    if files.is_empty() {
        info!("no files to process");
        return Ok(());
    }

    let start = Instant::now();
    for (i, path) in files.iter().enumerate() {
        if shutdown.is_cancelled() {
            warn!("shutting down, {} file(s) left unprocessed", files.len() - i);
            break;
        }
        info!("[{}/{}] processing {}", i + 1, files.len(), path.display());

        let summary = match pipeline.process_file(path).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("aborting, {} could not be fully read: {}", path.display(), e);
                return Err(e.into());
            }
        };
        if shutdown.is_cancelled() {
            warn!(
                "shutdown interrupted retries, leaving {} unmarked",
                path.display()
            );
            break;
        }
        finalize(path, &summary, config.normal_err_rate, config.test_mode).await;
    }
    info!("finished in {:?}", start.elapsed());

    Ok(())
}

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use site_monitoring::{
    Pipeline, PipelineError,
    alerts::build_notifier,
    config::{Config, read_config_file},
    probe::HttpProber,
    render::render_view,
    storage::open_backend,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log probe-level details
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("site_monitoring", level),
        ("site_monitor", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let config = read_config_file(&args.file)
        .with_context(|| format!("failed to load config from {}", args.file))?;

    let targets = config.resolve_targets()?;
    let settings = config.pipeline_settings()?;
    let views = config.dashboard_views()?;

    let storage = open_backend(&config.storage.clone().unwrap_or_default())
        .await
        .context("failed to open storage backend")?;
    let notifier = build_notifier(config.alerting.notify.as_ref())?;
    let prober = Arc::new(HttpProber::new()?);

    #[cfg(feature = "api")]
    let listener = match &config.api {
        Some(api) => Some(
            tokio::net::TcpListener::bind(api.bind_addr)
                .await
                .with_context(|| format!("failed to bind API address {}", api.bind_addr))?,
        ),
        None => None,
    };

    let cancel = CancellationToken::new();
    let mut supervisor =
        Pipeline::new(targets, settings, prober, storage, notifier).start(cancel.clone())?;

    for view in views {
        supervisor.spawn_component(
            "renderer",
            render_view(supervisor.dashboard(), view, cancel.clone()),
        );
    }

    #[cfg(feature = "api")]
    if let (Some(listener), Some(api)) = (listener, &config.api) {
        use site_monitoring::api::{ApiState, router, serve};

        let app = router(
            ApiState::new(supervisor.dashboard(), supervisor.storage()),
            api.enable_cors,
        );
        let api_cancel = cancel.clone();
        supervisor.spawn_component("api", async move {
            serve(listener, app, api_cancel)
                .await
                .map_err(|e| PipelineError::service("api", e))
        });
    }

    spawn_signal_handler(&config, cancel);

    supervisor.wait().await?;
    Ok(())
}

/// Cancel the pipeline on Ctrl-C
fn spawn_signal_handler(config: &Config, cancel: CancellationToken) {
    let targets = config.websites.len();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("received Ctrl-C, stopping {targets} monitors"),
                    Err(e) => error!("failed to listen for Ctrl-C: {e}, stopping"),
                }
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

mod cli;
mod config;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use kubelogs_k8s::{KubeProvider, ResourceProvider};
use kubelogs_logs::{Error, Record, RecordSink, WriterSink, stream_logs};

use crate::cli::Args;
use crate::config::Config;

/// Used when `RUST_LOG` is unset; keeps the pod choice notice visible
const DEFAULT_LOG_FILTER: &str = "warn,kubelogs_logs=info";

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr so stdout carries only log output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load()?;

    let context = args.context.as_deref().or(config.context.as_deref());
    let provider = KubeProvider::connect(context)
        .await
        .context("failed to load cluster configuration")?;

    let namespace = args
        .namespace
        .clone()
        .or_else(|| config.namespace.clone())
        .unwrap_or_else(|| provider.default_namespace().to_string());
    let target = args.target(namespace)?;
    let request = args.request(target, &config);
    tracing::debug!(?request, "starting");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let provider: Arc<dyn ResourceProvider> = Arc::new(provider);
    let result = if args.records {
        let json = args.json;
        let min_level = args.min_level;
        let mut stdout = std::io::stdout();
        let mut sink = RecordSink::new(move |record: Record| {
            if min_level.is_some_and(|min| !record.severity().is_at_least(min)) {
                return Ok(());
            }
            if json {
                let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
                writeln!(stdout, "{}", line)?;
            } else {
                writeln!(stdout, "{}", record)?;
            }
            Ok(())
        });
        let result = stream_logs(provider, &request, &mut sink, &cancel).await;
        if sink.dropped() > 0 {
            tracing::debug!("dropped {} lines without a timestamp", sink.dropped());
        }
        result
    } else {
        let mut sink = WriterSink::new(tokio::io::stdout());
        stream_logs(provider, &request, &mut sink, &cancel).await
    };

    match result {
        // Interrupted by the user
        Err(Error::Cancelled) => Ok(()),
        other => Ok(other?),
    }
}

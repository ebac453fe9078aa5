use std::time::Duration;

use clap::Parser;
use error::AppError;
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use vodrip_engine::{
    DownloadRequest, DownloaderConfig, HlsDownloader, HlsProtocolBuilder, RetryPolicy,
};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{format_bytes, format_duration};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("vodrip.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("vodrip {} - HLS video-on-demand downloader", env!("CARGO_PKG_VERSION"));
    info!("==================================================================");

    if args.concurrency == 0 {
        return Err(AppError::InvalidInput(
            "--concurrency must be at least 1".to_string(),
        ));
    }

    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    // Create common download configuration
    let download_config = {
        let mut builder = DownloaderConfig::builder()
            .with_timeout(Duration::from_secs(args.timeout))
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_headers(utils::parse_headers(&args.headers));
        if let Some(user_agent) = &args.user_agent {
            builder = builder.with_user_agent(user_agent);
        }
        builder.build()
    };

    let retry_policy = RetryPolicy {
        max_attempts: args.max_attempts(),
        base_delay: Duration::from_millis(args.retry_delay),
        ..RetryPolicy::default()
    };

    let mut builder = HlsProtocolBuilder::new()
        .with_base_config(download_config)
        .download_concurrency(args.concurrency)
        .retry_policy(retry_policy)
        .storage_mode(args.storage);
    if let Some(temp_dir) = &args.temp_dir {
        builder = builder.temp_dir(temp_dir);
    }

    // Ctrl-C stops the workers; partial segments are discarded
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping download");
            signal_token.cancel();
        }
    });

    let downloader = builder.build()?.with_cancellation(cancel);

    if args.list_qualities {
        return list_qualities(&downloader, &args.url).await;
    }

    if args.output.exists() && !args.force {
        info!(
            "{} has already been downloaded, use --force to download it again",
            args.output.display()
        );
        return Ok(());
    }

    // Create a progress manager based on show_progress flag
    let multi = MultiProgress::new();
    let progress_manager = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };
    let downloader = if progress_manager.is_disabled() {
        downloader
    } else {
        downloader.with_event_handler(move |event| {
            progress_manager.handle_event(event);
        })
    };

    info!(url = %args.url, quality = %args.quality, "Downloading");
    let started = std::time::Instant::now();
    let request = DownloadRequest::new(&args.url, &args.quality, &args.output);
    let report = downloader.download(&request).await?;

    if let Some(variant) = &report.variant {
        info!(
            "Quality {} selected from: {}",
            variant.resolution(),
            report.available_qualities.join(", ")
        );
    }
    if report.missing_count() > 0 {
        warn!(
            "{} of {} segments are missing from the output: {:?}",
            report.missing_count(),
            report.total_segments,
            report.missing
        );
    }
    info!(
        "Saved {} ({}) in {}",
        report.output_path.display(),
        format_bytes(report.bytes_written),
        format_duration(started.elapsed())
    );
    Ok(())
}

async fn list_qualities(downloader: &HlsDownloader, url: &str) -> Result<(), AppError> {
    let qualities = downloader.probe(url).await?;
    if qualities.is_empty() {
        info!("{url} is a media playlist with a single quality");
        return Ok(());
    }
    info!("Available qualities:");
    for quality in &qualities {
        info!("  {quality}");
    }
    Ok(())
}

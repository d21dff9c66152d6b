use std::process;

use castsync::{
    AppConfig, AppError, Catalog, Orchestrator, Result,
    cli::{Args, Commands},
    progress::TrackBars,
};
use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use vimeo_engine::{VideoReference, VimeoDownloader};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::from_settings(&args.settings)?;
    let client = config.build_client()?;
    let show_progress = !args.quiet;

    match args.command {
        Commands::Sync {
            catalog,
            series,
            episodes,
        } => {
            let catalog = Catalog::load(&catalog).await?.filtered(&series, &episodes);
            info!(
                series = catalog.series.len(),
                episodes = catalog.episode_count(),
                source = ?config.source,
                root = %config.series_root().display(),
                "Catalog loaded"
            );

            let orchestrator = Orchestrator::new(config, client, show_progress);
            orchestrator.preflight()?;
            orchestrator.run_batch(&catalog).await;
        }

        Commands::Video {
            id,
            output,
            quality,
        } => {
            let downloader = VimeoDownloader::new(client, config.vimeo_config());
            if !downloader.remuxer().is_available() {
                return Err(AppError::config(format!(
                    "ffmpeg not found at `{}`, set FFMPEG_PATH",
                    downloader.remuxer().program().display()
                )));
            }

            let mut video = VideoReference::new(id);
            if let Some(quality) = quality {
                video = video.with_quality(quality);
            }

            let bars = TrackBars::new(show_progress);
            if !downloader.download(&video, &output, &bars).await? {
                return Err(AppError::episode(
                    format!("video {id}"),
                    "ffmpeg could not merge the downloaded tracks",
                ));
            }
            info!(output = %output.display(), "Video saved");
        }
    }

    Ok(())
}

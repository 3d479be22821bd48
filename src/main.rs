use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vast_player::headless::HeadlessContainer;
use vast_player::models::TrackingDescriptor;
use vast_player::{
    AdEvent, Emitter, HttpFetcher, PlayerConfig, PlayerOptions, RendererKind, Selection, TrackingMapper,
    VastClient, VastPlayer, select_creative,
};

/// VAST ad player
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a VAST document and show which renderer would play it
    Inspect {
        /// VAST file path or URL; later ones are fallbacks
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<String>,

        /// Player options in TOML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Play an ad headlessly from start to finish, firing its pixels
    Play {
        /// VAST file path or URL; later ones are fallbacks
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<String>,

        /// Player options in TOML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seconds of playback per tick
        #[arg(long, default_value_t = 1.0)]
        step: f64,

        /// Length of the simulated media, in seconds
        #[arg(long, default_value_t = 30.0)]
        duration: f64,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    uri: &'a str,
    selection: Selection,
    tracking: Vec<TrackingDescriptor>,
}

async fn read_options(path: Option<&Path>) -> Result<PlayerOptions, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await?;
            Ok(PlayerOptions::from_toml_str(&text)?)
        }
        None => Ok(PlayerOptions::default()),
    }
}

async fn inspect(input: &[String], options: PlayerOptions, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = PlayerConfig::from(options);
    let fetcher = HttpFetcher::new(Duration::from_millis(config.vast.timeout_ms))?;
    let client = VastClient::new(Arc::new(fetcher));

    let mut last_error = None;
    for uri in input {
        let vast = match client.get(uri, &config.vast).await {
            Ok(vast) => vast,
            Err(e) => {
                log::warn!("Failed to load VAST from {}: {}", uri, e);
                last_error = Some(e);
                continue;
            }
        };

        let report = Report {
            uri,
            selection: select_creative(&vast)?,
            tracking: vast.tracking_descriptors(),
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("VAST {} from {}", vast.version, report.uri);
            println!("Renderer: {:?}", report.selection.kind);
            for file in &report.selection.media_files {
                println!(
                    "  media {} {} bitrate={:?} width={:?}",
                    file.mime_type, file.url, file.bitrate, file.width
                );
            }
            for icon in &report.selection.icons {
                println!("  icon {}x{} {}", icon.width, icon.height, icon.resource);
            }
            for pixel in &report.tracking {
                println!("  pixel {:<14} {}", pixel.event, pixel.uri);
            }
        }
        return Ok(());
    }

    match last_error {
        Some(e) => Err(e.into()),
        None => Err("no VAST URI given".into()),
    }
}

async fn play(
    input: &[String],
    options: PlayerOptions,
    step: f64,
    duration: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let container = Arc::new(
        HeadlessContainer::new(640.0, 360.0)
            .with_common_codecs()
            .with_duration(duration),
    );
    let options = if options.tracking.mapper.is_none() {
        options.with_mapper(TrackingMapper::cachebusting())
    } else {
        options
    };
    let player = VastPlayer::new(container.clone(), options)?;

    for event in AdEvent::ALL {
        player.on(event, move |args| log::info!("{} {:?}", event, args));
    }
    let stopped = Arc::new(AtomicBool::new(false));
    {
        let stopped = stopped.clone();
        player.on(AdEvent::AdStopped, move |_| stopped.store(true, Ordering::Relaxed));
    }

    player.load(input).await?;
    player.start_ad().await?;

    let ticks = (duration / step).ceil() as usize + 1;
    for _ in 0..ticks {
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        match player.renderer_kind() {
            Some(RendererKind::HtmlAudio | RendererKind::HtmlVideo) => {
                if let Some(media) = container.media().last() {
                    media.advance(step);
                }
            }
            Some(RendererKind::JavaScriptVpaid | RendererKind::FlashVpaid) => {
                if let Some(unit) = container.units().last() {
                    unit.advance(step);
                }
            }
            None => break,
        }
    }

    if !stopped.load(Ordering::Relaxed) {
        player.stop_ad().await?;
    }

    // Pixels are fired in the background
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    simple_logger::SimpleLogger::new().with_level(cli.log_level).init()?;

    match &cli.command {
        Commands::Inspect { input, config, json } => {
            let options = read_options(config.as_deref()).await?;
            inspect(input, options, *json).await?;
        }
        Commands::Play {
            input,
            config,
            step,
            duration,
        } => {
            if !(*step > 0.0) {
                return Err("--step must be positive".into());
            }
            let options = read_options(config.as_deref()).await?;
            play(input, options, *step, *duration).await?;
        }
    }

    Ok(())
}

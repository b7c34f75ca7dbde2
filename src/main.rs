//! Command-line narrator.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments.
//! - Load user configuration from `conf/config.toml`.
//! - Read a section of extracted text nodes from JSON.
//! - Print the refined queue (`--dump`) or narrate it until done.

use anyhow::{Context, Result, anyhow, bail};
use reader_narrator::config::{NarrationConfig, load_config};
use reader_narrator::output::AudioOutput;
use reader_narrator::pipeline::{ExtractedNode, NarrationPipeline, SectionInput};
use reader_narrator::playback::{PlaybackController, PlaybackEvent, PlaybackStatus};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";

struct Args {
    config_path: PathBuf,
    input_path: PathBuf,
    dump: bool,
}

/// Either a full section document or a bare list of nodes.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputFile {
    Section(SectionInput),
    Nodes(Vec<ExtractedNode>),
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args()?;
    let config = load_config(&args.config_path);
    if env::var_os("RUST_LOG").is_none() {
        set_log_level(reload_handle, config.log_level.as_filter_str());
    }
    info!(
        input = %args.input_path.display(),
        level = %config.log_level,
        provider = %config.provider,
        "Starting narrator"
    );

    let input = read_input(&args.input_path)?;
    let pipeline = NarrationPipeline::from_config(&config);
    let queue = pipeline.prepare_section(&input);
    info!(items = queue.len(), title = %input.section.title, "Prepared section");

    if args.dump {
        for item in &queue {
            println!("{}", serde_json::to_string(item)?);
        }
        return Ok(());
    }
    if queue.is_empty() {
        warn!("Nothing to narrate");
        return Ok(());
    }
    narrate(&config, queue)
}

fn narrate(config: &NarrationConfig, queue: Vec<reader_narrator::queue::QueueItem>) -> Result<()> {
    let controller = PlaybackController::from_config(config, build_output()?)?;
    let events = controller.subscribe();

    let interrupt = controller.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupted; stopping narration");
        interrupt.stop();
    })
    .context("Installing Ctrl-C handler")?;

    controller.set_queue(queue);
    controller.play();

    let mut failure = None;
    for event in events.iter() {
        match event {
            PlaybackEvent::NowSpeaking { index, item, .. } => {
                info!(index, text = %item.text(), "Speaking");
            }
            PlaybackEvent::Error { index, message, .. } => {
                error!(index, "Narration failed: {message}");
                failure = Some(message);
                controller.stop();
            }
            PlaybackEvent::StatusChanged { status, index, .. } => {
                info!(%status, index, "Playback status");
                if matches!(status, PlaybackStatus::Completed | PlaybackStatus::Stopped) {
                    break;
                }
            }
        }
    }

    match failure {
        Some(message) => bail!("narration stopped after an error: {message}"),
        None => Ok(()),
    }
}

#[cfg(feature = "playback")]
fn build_output() -> Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(reader_narrator::output::RodioOutput::new()?))
}

#[cfg(not(feature = "playback"))]
fn build_output() -> Result<Arc<dyn AudioOutput>> {
    warn!("Built without the `playback` feature; audio assets are not played");
    Ok(Arc::new(reader_narrator::output::NullOutput))
}

fn read_input(path: &Path) -> Result<SectionInput> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Reading input file {}", path.display()))?;
    let parsed: InputFile = serde_json::from_str(&contents)
        .with_context(|| format!("Parsing input JSON {}", path.display()))?;
    Ok(match parsed {
        InputFile::Section(section) => section,
        InputFile::Nodes(nodes) => SectionInput {
            nodes,
            ..SectionInput::default()
        },
    })
}

fn parse_args() -> Result<Args> {
    let usage = || anyhow!("Usage: reader-narrator [--config <path>] [--dump] <section.json>");
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut input_path = None;
    let mut dump = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump" => dump = true,
            "--config" => config_path = PathBuf::from(args.next().ok_or_else(usage)?),
            "-h" | "--help" => return Err(usage()),
            _ if input_path.is_none() => input_path = Some(PathBuf::from(arg)),
            _ => return Err(usage()),
        }
    }

    let input_path = input_path.ok_or_else(usage)?;
    if !input_path.exists() {
        return Err(anyhow!("File not found: {}", input_path.display()));
    }
    Ok(Args {
        config_path,
        input_path,
        dump,
    })
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

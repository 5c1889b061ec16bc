mod audio;
mod classify;
mod cli;
mod config;
mod error;
mod pipeline;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use audio::decode::RawAudio;
use classify::{Classification, Classifier, ClassifierClient};
use cli::Cli;
use config::RenderConfig;
use pipeline::{Pipeline, PipelineEvent, PoolDecoder};
use render::canvas::RgbaCanvas;
use render::color::Rgba;
use render::waveform::RenderSpec;

/// Everything resolved from CLI + config that a run needs.
struct Session {
    spec: RenderSpec,
    background: Option<Rgba>,
    resolution: usize,
    output: PathBuf,
    media_type: Option<String>,
    json: bool,
    classifier: Option<Arc<Classifier>>,
}

#[derive(Serialize)]
struct Report<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    waveform: Option<&'a WaveformReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification: Option<&'a Classification>,
}

#[derive(Serialize)]
struct WaveformReport {
    output: String,
    sample_rate: u32,
    samples: usize,
    channels: usize,
    duration_secs: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut render_cfg = RenderConfig::default();
    let mut timeout_secs = 30;

    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Config values apply only when the CLI flag is at its default
                if cli.resolution == 200 { cli.resolution = cfg.waveform.resolution; }
                if cli.width == 800 { cli.width = cfg.render.width; }
                if cli.height == 200 { cli.height = cfg.render.height; }
                if cli.bar_gap == 2.0 { cli.bar_gap = cfg.render.bar_gap; }
                if cli.amplitude == 0.8 { cli.amplitude = cfg.render.amplitude_fraction; }
                if cli.endpoint == classify::DEFAULT_ENDPOINT {
                    cli.endpoint = cfg.classifier.endpoint;
                }
                if !cfg.classifier.enabled {
                    cli.no_classify = true;
                }
                timeout_secs = cfg.classifier.timeout_secs;
                render_cfg.background = cfg.render.background;
                render_cfg.gradient = cfg.render.gradient;
            }
            Err(err) => log::warn!("Failed to load config from {}: {:#}", path.display(), err),
        }
    }

    render_cfg.width = cli.width;
    render_cfg.height = cli.height;
    render_cfg.bar_gap = cli.bar_gap;
    render_cfg.amplitude_fraction = cli.amplitude;
    let spec = render_cfg.to_spec().context("Invalid render settings")?;
    log::debug!(
        "Surface {}x{}, gap {}px, amplitude {}, {} gradient stops",
        spec.width(),
        spec.height(),
        spec.bar_gap(),
        spec.amplitude_fraction(),
        spec.gradient().len()
    );

    let timeout = Duration::from_secs(timeout_secs);
    if cli.check_classifier {
        let client = ClassifierClient::new(&cli.endpoint, timeout)?;
        client.health_check()?;
        println!("Classifier at {} is healthy", client.endpoint());
        return Ok(());
    }

    // A broken endpoint degrades to the error label; the waveform still renders.
    let classifier = if cli.no_classify {
        None
    } else {
        Some(Arc::new(Classifier::connect(&cli.endpoint, timeout)))
    };

    let session = Session {
        spec,
        background: render_cfg.background,
        resolution: cli.resolution,
        output: cli.output.clone(),
        media_type: cli.media_type.clone(),
        json: cli.json,
        classifier,
    };

    if cli.stdin {
        return run_stdin(&session);
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    run_once(&session, input)
}

impl Session {
    fn read_input(&self, path: &Path) -> Result<RawAudio> {
        RawAudio::from_path(path, self.media_type.as_deref())
            .with_context(|| format!("Failed to read audio file: {}", path.display()))
    }

    fn pipeline(&self) -> Pipeline<PoolDecoder, RgbaCanvas> {
        let (width, height) = self.spec.surface_size();
        let canvas = match self.background {
            Some(bg) => RgbaCanvas::with_background(width, height, bg),
            None => RgbaCanvas::new(width, height),
        };
        Pipeline::new(PoolDecoder, canvas, self.spec.clone(), self.resolution)
    }

    /// Classification runs beside the waveform, never blocking it.
    fn spawn_classifier(&self, raw: &RawAudio) -> Option<JoinHandle<Classification>> {
        let client = Arc::clone(self.classifier.as_ref()?);
        let raw = raw.clone();
        Some(thread::spawn(move || client.classify_or_fallback(&raw)))
    }

    /// Save the surface on success and build the waveform half of the report.
    fn handle_event(
        &self,
        event: PipelineEvent,
        pipeline: &Pipeline<PoolDecoder, RgbaCanvas>,
    ) -> Result<(String, std::result::Result<WaveformReport, String>)> {
        log::debug!("Pipeline stage after generation {}: {:?}", event.generation(), pipeline.stage());
        match event {
            PipelineEvent::Rendered { input, info, .. } => {
                pipeline
                    .surface()
                    .save_png(&self.output)
                    .with_context(|| format!("Failed to write {}", self.output.display()))?;
                log::info!("Waveform written to {}", self.output.display());
                let report = WaveformReport {
                    output: self.output.display().to_string(),
                    sample_rate: info.sample_rate,
                    samples: info.frames,
                    channels: info.channel_count,
                    duration_secs: info.duration_secs,
                };
                Ok((input, Ok(report)))
            }
            PipelineEvent::Failed {
                input,
                error,
                cleared,
                ..
            } => {
                if cleared {
                    pipeline
                        .surface()
                        .save_png(&self.output)
                        .with_context(|| format!("Failed to write {}", self.output.display()))?;
                }
                Ok((input, Err(error.to_string())))
            }
            PipelineEvent::Superseded { input, .. } => {
                let reason = format!(
                    "superseded; showing {}",
                    pipeline.displayed().unwrap_or("nothing yet")
                );
                Ok((input, Err(reason)))
            }
        }
    }

    fn print(
        &self,
        input: &str,
        waveform: Option<&std::result::Result<WaveformReport, String>>,
        classification: Option<&Classification>,
    ) -> Result<()> {
        if self.json {
            let (waveform, error) = match waveform {
                Some(Ok(report)) => (Some(report), None),
                Some(Err(err)) => (None, Some(err.clone())),
                None => (None, None),
            };
            let report = Report {
                input,
                waveform,
                error,
                classification,
            };
            println!("{}", serde_json::to_string(&report)?);
            return Ok(());
        }

        match waveform {
            Some(Ok(report)) => println!(
                "{}: waveform {} ({} samples, {}Hz, {} ch, {:.1}s)",
                input,
                report.output,
                report.samples,
                report.sample_rate,
                report.channels,
                report.duration_secs
            ),
            Some(Err(err)) => println!("{}: waveform failed: {}", input, err),
            None => {}
        }
        if let Some(c) = classification {
            println!("{}: {} ({:.2}%)", input, c.label, c.confidence);
        }
        Ok(())
    }
}

fn join_classifier(handle: JoinHandle<Classification>) -> Classification {
    handle.join().unwrap_or_else(|_| {
        log::error!("Classifier thread panicked");
        Classification::analysis_error()
    })
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn run_once(session: &Session, input: &Path) -> Result<()> {
    log::info!("wavescope - waveform + sound classification");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", session.output.display());

    let raw = session.read_input(input)?;
    let name = raw.name().to_string();
    let classifier = session.spawn_classifier(&raw);

    let mut pipeline = session.pipeline();
    let pb = spinner(format!("Decoding {}", name))?;
    pipeline.on_input_changed(raw);
    let event = pipeline.wait_settled();
    pb.finish_and_clear();

    let waveform = match event {
        Some(event) => session.handle_event(event, &pipeline)?.1,
        None => Err("no result".to_string()),
    };
    let classification = classifier.map(join_classifier);
    session.print(&name, Some(&waveform), classification.as_ref())?;

    if let Err(err) = waveform {
        anyhow::bail!("Waveform for {} failed: {}", name, err);
    }
    Ok(())
}

/// Each stdin line is a new file selection. Only the newest input's waveform
/// is ever written; classifications are reported as they finish.
fn run_stdin(session: &Session) -> Result<()> {
    let (line_tx, line_rx) = mpsc::channel::<PathBuf>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if line_tx.send(PathBuf::from(trimmed)).is_err() {
                break;
            }
        }
    });

    let mut pipeline = session.pipeline();
    let mut pending: Vec<(String, JoinHandle<Classification>)> = Vec::new();
    let mut open = true;

    while open || pipeline.is_pending() {
        if open {
            match line_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(path) => match session.read_input(&path) {
                    Ok(raw) => {
                        if let Some(handle) = session.spawn_classifier(&raw) {
                            pending.push((raw.name().to_string(), handle));
                        }
                        pipeline.on_input_changed(raw);
                    }
                    Err(err) => log::error!("{:#}", err),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => open = false,
            }
        }

        let mut events = Vec::new();
        while let Some(event) = pipeline.poll_event(Duration::ZERO) {
            events.push(event);
        }
        if !open {
            events.extend(pipeline.wait_settled());
        }
        for event in events {
            let superseded = matches!(event, PipelineEvent::Superseded { .. });
            let (name, waveform) = session.handle_event(event, &pipeline)?;
            if !superseded {
                session.print(&name, Some(&waveform), None)?;
            }
        }

        let (finished, still_running): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|(_, handle)| handle.is_finished());
        pending = still_running;
        for (name, handle) in finished {
            session.print(&name, None, Some(&join_classifier(handle)))?;
        }
    }

    for (name, handle) in pending {
        session.print(&name, None, Some(&join_classifier(handle)))?;
    }
    Ok(())
}

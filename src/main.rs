mod audio;
mod chain;
mod cli;
mod config;
mod encode;
mod graph;
mod helper;
mod visual;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use audio::media::MediaElement;
use audio::sink::{NullSink, Sink, WavSink};
use chain::command::ValidCommand;
use chain::impulse::REFLECTION_SECONDS;
use chain::{AudioAnalysis, AudioEngine, Automation, BuildStatus, EngineSettings, ParameterCommand};
use cli::{AnalyzeArgs, ChainArgs, Cli, Command, HelperArgs, ProcessArgs, RenderArgs, SourceArgs};
use config::Config;
use encode::ffmpeg::{FfmpegEncoder, VideoSettings};
use helper::{HttpHelper, TranscodeHelper};
use visual::beat::BeatDetector;
use visual::renderer::{FrameInput, LoopExit, RenderLoop, VisualSettings, Visualizer};

/// Hard cap on animation frames rendered after playback ends.
const MAX_TAIL_SECONDS: u32 = 10;
const PROCESS_CHUNK: usize = 4096;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect auralis.toml / global config
    let config = match cli.config.clone().or_else(config::locate_config) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Render(mut args) => {
            merge_output(&mut args, &config);
            render(args, &config)
        }
        Command::Process(args) => process(args, &config),
        Command::Analyze(args) => analyze(args, &config),
        Command::HelperHealth(args) => helper_health(&args, &config),
    }
}

/// Config values apply only where the CLI is still at its default.
fn merge_output(args: &mut RenderArgs, config: &Config) {
    let out = &config.output;
    if args.width == 1280 {
        args.width = out.width;
    }
    if args.height == 720 {
        args.height = out.height;
    }
    if args.fps == 60 {
        args.fps = out.fps;
    }
    if args.crf == 18 {
        args.crf = out.crf;
    }
    if args.codec == "libx264" {
        args.codec = out.codec.clone();
    }
    if args.bars == 64 {
        args.bars = config.visual.bars;
    }
}

/// Chain settings after merging CLI flags over the config file.
struct ChainSetup {
    sample_rate: u32,
    volume: f32,
    preamp: f32,
    eq: Vec<f32>,
    presence: f32,
    pan: f32,
    reflection: f32,
    rate: f32,
    limiter: bool,
    seed: Option<u64>,
    commands: Vec<ValidCommand>,
    automation: Automation,
}

impl ChainSetup {
    fn resolve(args: &ChainArgs, config: &Config) -> Result<Self> {
        let cfg = &config.chain;

        let commands = args
            .commands
            .iter()
            .map(|json| {
                ParameterCommand::parse(json).with_context(|| format!("Invalid --set command: {}", json))
            })
            .collect::<Result<Vec<_>>>()?;

        let automation = match &args.automation {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read automation file: {}", path.display()))?;
                let automation = Automation::from_json(&json)
                    .with_context(|| format!("Invalid automation file: {}", path.display()))?;
                log::info!("Loaded {} automation events", automation.len());
                automation
            }
            None => Automation::default(),
        };

        Ok(Self {
            sample_rate: args.sample_rate.unwrap_or(config.output.sample_rate),
            volume: args.volume.unwrap_or(cfg.volume),
            preamp: args.preamp.unwrap_or(cfg.preamp),
            eq: if args.eq.is_empty() { cfg.eq.clone() } else { args.eq.clone() },
            presence: args.presence.unwrap_or(cfg.presence),
            pan: args.pan.unwrap_or(cfg.stereo_width),
            reflection: args.reflection.unwrap_or(cfg.reflection),
            rate: args.rate.unwrap_or(cfg.playback_rate),
            limiter: cfg.limiter && !args.no_limiter,
            seed: args.seed.or(cfg.seed),
            commands,
            automation,
        })
    }

    /// Builds the chain for `media`, resumes the context and applies the initial settings.
    fn start(&self, media: &MediaElement) -> Result<AudioEngine> {
        let mut engine = AudioEngine::new(
            self.sample_rate,
            EngineSettings {
                initial_volume: self.volume,
                seed: self.seed,
            },
        );
        if engine.build(media) != BuildStatus::Built {
            anyhow::bail!("Signal chain was not built");
        }
        engine.resume_context();

        engine.set_preamp(self.preamp);
        if !self.eq.is_empty() {
            let eq = ParameterCommand::SetEq { gains: self.eq.clone() }
                .validate()
                .context("Invalid EQ settings")?;
            engine.apply(&eq);
        }
        engine.set_presence(self.presence);
        engine.set_stereo_width(self.pan);
        engine.set_reflection(self.reflection);
        engine.set_limiter_enabled(self.limiter);
        if self.rate > 0.0 {
            engine.set_playback_rate(self.rate);
        } else {
            log::warn!("Ignoring non-positive playback rate {}", self.rate);
        }
        for command in &self.commands {
            engine.apply(command);
        }

        log::info!(
            "Chain ready: {} nodes @ {}Hz, volume {:.2}, limiter {}",
            engine.node_count(),
            self.sample_rate,
            self.volume,
            if self.limiter { "on" } else { "off" }
        );
        Ok(engine)
    }
}

fn resolve_input(source: &SourceArgs, config: &Config) -> Result<PathBuf> {
    if let Some(input) = &source.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
        return Ok(input.clone());
    }

    let url = source
        .url
        .as_deref()
        .context("An input file or --url is required")?;
    let helper = connect_helper(&source.helper, config)?;
    if !helper.health() {
        anyhow::bail!("Transcoding helper at {} is not healthy", helper.base_url());
    }
    let track = helper
        .download(url)
        .with_context(|| format!("Helper failed to download {}", url))?;
    let dir = helper::stream_cache_dir()?;
    let path = helper
        .fetch_stream(&track, &dir)
        .context("Failed to fetch stream from helper")?;
    Ok(path)
}

fn connect_helper(args: &HelperArgs, config: &Config) -> Result<HttpHelper> {
    let url = args.helper_url.as_deref().unwrap_or(&config.helper.url);
    HttpHelper::new(url, Duration::from_secs(config.helper.timeout_secs))
        .context("Failed to create helper client")
}

fn load_media(source: &SourceArgs, config: &Config) -> Result<MediaElement> {
    let input = resolve_input(source, config)?;
    log::info!("Input: {}", input.display());
    log::info!("Decoding audio...");
    let audio = audio::decode::decode_audio(&input)?;
    let media = MediaElement::new(audio);
    if source.start > 0.0 {
        media.seek(source.start);
        log::info!("Starting at {:.2}s of {:.2}s", media.current_time(), media.duration());
    }
    Ok(media)
}

/// Seconds of output the rest of `media` takes at `rate`.
fn remaining_seconds(media: &MediaElement, rate: f32) -> f64 {
    (media.duration() - media.current_time()).max(0.0) / rate.max(f32::EPSILON) as f64
}

fn log_limiter(deepest_db: f32) {
    if deepest_db < -0.05 {
        log::info!("Limiter caught peaks: deepest reduction {:.1}dB", deepest_db);
    } else {
        log::debug!("Limiter never engaged");
    }
}

fn progress_bar(len: u64, unit: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "[{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos}}/{{len}} {} ({{eta}} remaining) {{msg}}",
                unit
            ))
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn render(args: RenderArgs, config: &Config) -> Result<()> {
    let mut setup = ChainSetup::resolve(&args.chain, config)?;
    let media = load_media(&args.source, config)?;
    let mut engine = setup.start(&media)?;
    let sample_rate = engine.sample_rate() as f64;
    let fps = args.fps.max(1);

    log::info!("Output: {}", args.output.display());
    log::info!("Resolution: {}x{} @ {}fps", args.width, args.height, fps);

    let scratch = std::env::temp_dir().join(format!("auralis-{}", std::process::id()));
    std::fs::create_dir_all(&scratch)
        .with_context(|| format!("Failed to create {}", scratch.display()))?;
    let video_path = scratch.join("video.mp4");
    let wav_path = scratch.join("audio.wav");

    let mut wav = WavSink::create(&wav_path, engine.sample_rate())?;
    let mut encoder = FfmpegEncoder::new(
        &video_path,
        &VideoSettings {
            width: args.width,
            height: args.height,
            fps,
            codec: args.codec.clone(),
            pix_fmt: args.pix_fmt.clone(),
            crf: args.crf,
            bitrate: args.bitrate.clone(),
        },
    )?;

    let visualizer = Visualizer::new(&VisualSettings {
        width: args.width,
        height: args.height,
        fps,
        bar_count: args.bars,
        max_particles: config.visual.max_particles,
        tip_chance: config.visual.tip_chance,
        seed: config.visual.seed,
    })?;
    let mut render_loop = RenderLoop::new(visualizer, engine.render_token());
    let tap = engine.analyser().context("Chain has no analyser")?;

    let play_seconds = remaining_seconds(&media, setup.rate);
    let expected_frames = (play_seconds * fps as f64).ceil() as u64;
    let pb = progress_bar(expected_frames, "frames")?;

    let tail_cap = (MAX_TAIL_SECONDS * fps) as u64;
    let mut bins = Vec::new();
    let mut frame_idx = 0u64;
    let mut rendered = 0u64;
    let mut tail_frames = 0u64;
    let mut deepest_reduction = 0f32;

    loop {
        let now = (frame_idx + 1) as f64 / fps as f64;
        let target = (now * sample_rate).round() as u64;
        setup.automation.apply_due(&engine, engine.context().current_time());
        engine.render((target - rendered) as usize, &mut wav)?;
        rendered = target;
        deepest_reduction = deepest_reduction.min(engine.limiter_reduction().unwrap_or(0.0));

        tap.fill_byte_frequency_data(&mut bins);
        let playing = engine.is_playing();
        let flow = render_loop.tick(
            &FrameInput {
                bins: &bins,
                now_ms: now * 1000.0,
                playing,
            },
            &mut |energy: f32| pb.set_message(format!("energy {:.2}", energy)),
        );
        if flow == ControlFlow::Break(LoopExit::Cancelled) {
            log::warn!("Render loop cancelled");
            break;
        }

        encoder.write_frame(render_loop.visualizer().canvas().pixels())?;
        frame_idx += 1;
        if frame_idx <= expected_frames {
            pb.set_position(frame_idx);
        }

        if flow.is_break() {
            log::info!("Animations drained after {} tail frames", tail_frames);
            break;
        }
        if !playing {
            tail_frames += 1;
            if tail_frames >= tail_cap {
                log::warn!("Stopping animation tail after {}s", MAX_TAIL_SECONDS);
                break;
            }
        }
    }

    pb.finish_with_message("Rendering complete");

    let stats = render_loop.visualizer().stats();
    log::info!(
        "Rendered {} frames, {} beats, {} over budget (slowest {:.1}ms)",
        stats.frames,
        stats.beats,
        stats.over_budget,
        stats.slowest.as_secs_f64() * 1000.0
    );
    log_limiter(deepest_reduction);

    wav.finish()?;
    log::info!("Finishing encoding...");
    encoder.finish()?;
    engine.close();

    encode::ffmpeg::mux(&video_path, &wav_path, &args.output)?;
    if let Err(e) = std::fs::remove_dir_all(&scratch) {
        log::debug!("Could not remove {}: {}", scratch.display(), e);
    }

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

fn process(args: ProcessArgs, config: &Config) -> Result<()> {
    let mut setup = ChainSetup::resolve(&args.chain, config)?;
    let media = load_media(&args.source, config)?;
    let mut engine = setup.start(&media)?;
    let mut wav = WavSink::create(&args.output, engine.sample_rate())?;

    let total = (remaining_seconds(&media, setup.rate) * engine.sample_rate() as f64) as u64;
    let pb = progress_bar(total, "samples")?;
    let tail = (REFLECTION_SECONDS * engine.sample_rate() as f32) as usize;

    let mut deepest_reduction = 0f32;
    render_until_end(&mut engine, &mut setup.automation, &mut wav, |engine, frames| {
        pb.inc(frames as u64);
        deepest_reduction = deepest_reduction.min(engine.limiter_reduction().unwrap_or(0.0));
    })?;
    engine.render(tail, &mut wav)?;
    wav.finish()?;
    pb.finish_with_message("Processing complete");
    log_limiter(deepest_reduction);
    engine.close();

    log::info!("Done! Output: {}", args.output.display());
    Ok(())
}

/// Renders in fixed chunks until the source runs out.
fn render_until_end(
    engine: &mut AudioEngine,
    automation: &mut Automation,
    sink: &mut dyn Sink,
    mut on_chunk: impl FnMut(&AudioEngine, usize),
) -> Result<()> {
    loop {
        automation.apply_due(engine, engine.context().current_time());
        let outcome = engine.render(PROCESS_CHUNK, sink)?;
        on_chunk(&*engine, outcome.frames);
        if outcome.source_ended {
            return Ok(());
        }
    }
}

#[derive(Serialize)]
struct AnalysisLine {
    time: f64,
    #[serde(flatten)]
    analysis: AudioAnalysis,
    beat: bool,
}

fn analyze(args: AnalyzeArgs, config: &Config) -> Result<()> {
    let mut setup = ChainSetup::resolve(&args.chain, config)?;
    let media = load_media(&args.source, config)?;
    let mut engine = setup.start(&media)?;
    let tap = engine.analyser().context("Chain has no analyser")?;

    let interval = args.interval.max(1.0 / engine.sample_rate() as f64);
    let step = (interval * engine.sample_rate() as f64).round().max(1.0) as usize;
    let mut detector = BeatDetector::new();
    let mut bins = Vec::new();
    let mut sink = NullSink;

    loop {
        setup.automation.apply_due(&engine, engine.context().current_time());
        let outcome = engine.render(step, &mut sink)?;
        let time = engine.context().current_time();

        let analysis = engine
            .get_audio_analysis()
            .context("Chain has no analyser")?;
        tap.fill_byte_frequency_data(&mut bins);
        let reading = detector.update(&bins, time * 1000.0);
        let line = AnalysisLine {
            time,
            analysis,
            beat: reading.onset,
        };
        println!("{}", serde_json::to_string(&line)?);

        if outcome.source_ended {
            break;
        }
    }

    engine.close();
    Ok(())
}

fn helper_health(args: &HelperArgs, config: &Config) -> Result<()> {
    let helper = connect_helper(args, config)?;
    if helper.health() {
        println!("ok {}", helper.base_url());
        Ok(())
    } else {
        anyhow::bail!("Transcoding helper at {} is unreachable", helper.base_url())
    }
}

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "auralis",
    version,
    about = "Audio enhancement chain with a beat-reactive visualizer"
)]
pub struct Cli {
    /// Config file (default: auralis.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process audio and render the visualizer to a video
    Render(RenderArgs),
    /// Process audio to a WAV file
    Process(ProcessArgs),
    /// Print bass/mid/treble and beats as JSON lines
    Analyze(AnalyzeArgs),
    /// Check whether the transcoding helper is up
    HelperHealth(HelperArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Remote media URL, fetched through the transcoding helper
    #[arg(long, conflicts_with = "input")]
    pub url: Option<String>,

    /// Seconds into the source to start from
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    #[command(flatten)]
    pub helper: HelperArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HelperArgs {
    /// Transcoding helper base URL
    #[arg(long)]
    pub helper_url: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChainArgs {
    /// Output volume (linear gain)
    #[arg(long)]
    pub volume: Option<f32>,

    /// Pre-amp gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub preamp: Option<f32>,

    /// Ten comma-separated band gains in dB, 32Hz first
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub eq: Vec<f32>,

    /// Presence (1.5kHz) gain in dB
    #[arg(long, allow_hyphen_values = true)]
    pub presence: Option<f32>,

    /// Stereo pan, -1 (left) to 1 (right)
    #[arg(long, allow_hyphen_values = true)]
    pub pan: Option<f32>,

    /// Reflection (wet) level, linear
    #[arg(long)]
    pub reflection: Option<f32>,

    /// Playback rate (nominally 0.5-2.0)
    #[arg(long)]
    pub rate: Option<f32>,

    /// Disable the safety limiter
    #[arg(long)]
    pub no_limiter: bool,

    /// JSON file of timed parameter commands
    #[arg(long)]
    pub automation: Option<PathBuf>,

    /// Parameter command as JSON, applied at start (repeatable)
    #[arg(long = "set")]
    pub commands: Vec<String>,

    /// Processing sample rate
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Seed for the reflection noise
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub chain: ChainArgs,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Spectrum bar count
    #[arg(long, default_value_t = 64)]
    pub bars: usize,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub chain: ChainArgs,

    /// Output WAV file
    #[arg(short, long, default_value = "processed.wav")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub chain: ChainArgs,

    /// Seconds between readings
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub interval: f64,
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "wavescope", about = "Render an audio file's waveform and classify its sound")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<PathBuf>,

    /// Output PNG file for the waveform
    #[arg(short, long, default_value = "waveform.png")]
    pub output: PathBuf,

    /// Number of bars in the waveform
    #[arg(short, long, default_value_t = 200)]
    pub resolution: usize,

    /// Image width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = 200)]
    pub height: u32,

    /// Horizontal gap between bars in pixels
    #[arg(long, default_value_t = 2.0)]
    pub bar_gap: f32,

    /// Fraction of the image height a full-scale bar occupies (0.0-1.0]
    #[arg(long, default_value_t = 0.8)]
    pub amplitude: f32,

    /// Declared media type; guessed from the file extension when omitted
    #[arg(long)]
    pub media_type: Option<String>,

    /// Classifier endpoint
    #[arg(long, default_value = "http://127.0.0.1:8000/classify")]
    pub endpoint: String,

    /// Skip the remote classifier
    #[arg(long)]
    pub no_classify: bool,

    /// Probe the classifier's health endpoint and exit
    #[arg(long)]
    pub check_classifier: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Read input paths from stdin, one per line; each new line replaces the previous input
    #[arg(long)]
    pub stdin: bool,

    /// Config file (default: ./wavescope.toml or ~/.config/wavescope/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

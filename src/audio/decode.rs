use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, WaveformError};

/// An uploaded audio file, exactly as the user supplied it.
///
/// The declared media type is only used to reject obviously non-audio input
/// and as a probe hint; the container is always sniffed by the decoder.
#[derive(Clone, Debug)]
pub struct RawAudio {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl RawAudio {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, declaring its media type from the extension
    /// unless one is given explicitly.
    pub fn from_path(path: &Path, media_type: Option<&str>) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = media_type.unwrap_or_else(|| media_type_for_path(path));
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Guess a media type from a file extension, the way a browser file picker would.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("wav") | Some("wave") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// Decoded PCM, one `Vec<f32>` per channel.
#[derive(Clone, Debug)]
pub struct DecodedSignal {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedSignal {
    /// Every channel must be non-empty and of equal length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(WaveformError::decode("sample rate is zero"));
        }
        let frames = match channels.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => return Err(WaveformError::decode("decoded stream contains no samples")),
        };
        if channels.iter().any(|c| c.len() != frames) {
            return Err(WaveformError::decode("channels have mismatched lengths"));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    #[allow(dead_code)]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Channel 0, the only one the waveform looks at.
    pub fn primary(&self) -> &[f32] {
        &self.channels[0]
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

pub fn decode(raw: &RawAudio) -> Result<DecodedSignal> {
    if raw.is_empty() {
        return Err(WaveformError::UnsupportedInput(format!("{} is empty", raw.name())));
    }
    if !raw.media_type().starts_with("audio/") {
        return Err(WaveformError::UnsupportedInput(format!(
            "{} declares media type '{}', expected audio/*",
            raw.name(),
            raw.media_type()
        )));
    }

    let source = Cursor::new(Arc::clone(&raw.bytes));
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.mime_type(raw.media_type());
    if let Some(ext) = Path::new(raw.name()).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| WaveformError::decode_with("failed to probe audio format", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| WaveformError::decode("no audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| WaveformError::decode("unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| WaveformError::decode_with("failed to create audio decoder", e))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(WaveformError::decode_with("failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| WaveformError::decode_with("failed to decode packet", e))?;

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }

        let count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); count];
        } else if channels.len() != count {
            return Err(WaveformError::decode("channel layout changed mid-stream"));
        }

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_planar_ref(decoded);

        // Planar layout: all of channel 0, then all of channel 1, ...
        for (channel, plane) in channels.iter_mut().zip(sample_buf.samples().chunks(num_frames)) {
            channel.extend_from_slice(plane);
        }
    }

    // Float containers can carry NaN/inf; those samples count as silence.
    let mut non_finite = 0usize;
    for sample in channels.iter_mut().flatten() {
        if !sample.is_finite() {
            *sample = 0.0;
            non_finite += 1;
        }
    }
    if non_finite > 0 {
        log::warn!("{}: replaced {} non-finite samples with silence", raw.name(), non_finite);
    }

    let signal = DecodedSignal::new(sample_rate, channels)?;

    log::info!(
        "Decoded {}: {} samples x {} channel(s), {}Hz, {:.1}s",
        raw.name(),
        signal.frames(),
        signal.channel_count(),
        signal.sample_rate(),
        signal.duration_secs()
    );

    Ok(signal)
}

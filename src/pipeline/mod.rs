//! Decode → reduce → normalize → render, once per submitted input.
//!
//! Decoding runs off-thread on a [`DecodeBackend`]. Its result comes back as a
//! [`DecodeCompletion`] on a channel owned by the [`Pipeline`], and the owner
//! thread dispatches it. Every submission gets a new generation number; a
//! completion is only allowed to draw if its generation is still the latest,
//! so a slow decode of an old file can never overwrite a newer waveform.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::audio::decode::{decode, DecodedSignal, RawAudio};
use crate::audio::envelope::reduce;
use crate::audio::normalize::normalize;
use crate::error::{Result, WaveformError};
use crate::render::canvas::DrawTarget;
use crate::render::waveform::{render, RenderSpec};

pub type Generation = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Decoding,
    Reducing,
    Rendering,
    Rendered,
    Failed,
}

/// The outcome of one background decode, tagged with its generation.
#[derive(Debug)]
pub struct DecodeCompletion {
    generation: Generation,
    input: String,
    result: Result<DecodedSignal>,
}

/// Handed to a backend with each decode request; consumed to report back.
#[derive(Debug)]
pub struct DecodeTicket {
    generation: Generation,
    input: String,
    tx: Sender<DecodeCompletion>,
}

impl DecodeTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn complete(self, result: Result<DecodedSignal>) {
        let completion = DecodeCompletion {
            generation: self.generation,
            input: self.input,
            result,
        };
        if self.tx.send(completion).is_err() {
            log::debug!("Pipeline gone before decode finished (generation {})", self.generation);
        }
    }
}

/// Somewhere to run decodes. Implementations must eventually call
/// [`DecodeTicket::complete`], from any thread.
pub trait DecodeBackend {
    fn submit(&self, raw: RawAudio, ticket: DecodeTicket);
}

/// Decodes on the rayon global pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolDecoder;

impl DecodeBackend for PoolDecoder {
    fn submit(&self, raw: RawAudio, ticket: DecodeTicket) {
        log::debug!("Queueing decode of {} (generation {})", raw.name(), ticket.generation());
        rayon::spawn(move || {
            let result = decode(&raw);
            ticket.complete(result);
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalInfo {
    pub sample_rate: u32,
    pub channel_count: usize,
    pub frames: usize,
    pub duration_secs: f32,
}

impl SignalInfo {
    fn of(signal: &DecodedSignal) -> Self {
        Self {
            sample_rate: signal.sample_rate(),
            channel_count: signal.channel_count(),
            frames: signal.frames(),
            duration_secs: signal.duration_secs(),
        }
    }
}

#[derive(Debug)]
pub enum PipelineEvent {
    Rendered {
        generation: Generation,
        input: String,
        info: SignalInfo,
    },
    /// `cleared` is set when the failing input was the one on screen.
    Failed {
        generation: Generation,
        input: String,
        error: WaveformError,
        cleared: bool,
    },
    Superseded {
        generation: Generation,
        input: String,
    },
}

impl PipelineEvent {
    pub fn generation(&self) -> Generation {
        match self {
            PipelineEvent::Rendered { generation, .. }
            | PipelineEvent::Failed { generation, .. }
            | PipelineEvent::Superseded { generation, .. } => *generation,
        }
    }
}

pub struct Pipeline<B, T> {
    backend: B,
    surface: T,
    spec: RenderSpec,
    resolution: usize,
    latest: Generation,
    stage: Stage,
    displayed: Option<String>,
    tx: Sender<DecodeCompletion>,
    rx: Receiver<DecodeCompletion>,
}

impl<B: DecodeBackend, T: DrawTarget> Pipeline<B, T> {
    pub fn new(backend: B, surface: T, spec: RenderSpec, resolution: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            surface,
            spec,
            resolution,
            latest: 0,
            stage: Stage::Idle,
            displayed: None,
            tx,
            rx,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// True while the most recent submission is still decoding.
    pub fn is_pending(&self) -> bool {
        self.stage == Stage::Decoding
    }

    pub fn surface(&self) -> &T {
        &self.surface
    }

    /// Name of the input whose waveform is currently drawn.
    pub fn displayed(&self) -> Option<&str> {
        self.displayed.as_deref()
    }

    /// Start processing a newly selected input, superseding any run in flight.
    pub fn on_input_changed(&mut self, raw: RawAudio) -> Generation {
        self.latest += 1;
        self.stage = Stage::Decoding;
        log::info!("Generation {}: decoding {} ({} bytes)", self.latest, raw.name(), raw.len());

        let ticket = DecodeTicket {
            generation: self.latest,
            input: raw.name().to_string(),
            tx: self.tx.clone(),
        };
        self.backend.submit(raw, ticket);
        self.latest
    }

    /// Run the synchronous stages for a finished decode.
    pub fn dispatch(&mut self, completion: DecodeCompletion) -> PipelineEvent {
        let DecodeCompletion {
            generation,
            input,
            result,
        } = completion;

        if generation != self.latest {
            log::warn!(
                "Dropping result for {} (generation {}, latest is {})",
                input,
                generation,
                self.latest
            );
            return PipelineEvent::Superseded { generation, input };
        }

        let outcome = result.and_then(|signal| {
            self.stage = Stage::Reducing;
            let envelope = reduce(signal.primary(), self.resolution)?;
            log::debug!("{} blocks of {} samples", envelope.len(), envelope.block_size());
            let values = normalize(&envelope);
            self.stage = Stage::Rendering;
            render(&values, &self.spec, &mut self.surface)?;
            Ok(SignalInfo::of(&signal))
        });

        match outcome {
            Ok(info) => {
                self.stage = Stage::Rendered;
                self.displayed = Some(input.clone());
                log::info!("Generation {}: rendered {}", generation, input);
                PipelineEvent::Rendered {
                    generation,
                    input,
                    info,
                }
            }
            Err(error) => {
                // Never pair a new failure with the stale drawing of the same file.
                let cleared = self.displayed.as_deref() == Some(input.as_str());
                if cleared {
                    self.surface.clear();
                    self.displayed = None;
                }
                self.stage = Stage::Failed;
                log::error!("Generation {}: {} failed: {}", generation, input, error);
                PipelineEvent::Failed {
                    generation,
                    input,
                    error,
                    cleared,
                }
            }
        }
    }

    /// Dispatch the next completion if one arrives within `timeout`.
    pub fn poll_event(&mut self, timeout: Duration) -> Option<PipelineEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(self.dispatch(completion)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Block until the latest submission settles, dispatching stale
    /// completions along the way. Returns `None` when nothing is pending.
    pub fn wait_settled(&mut self) -> Option<PipelineEvent> {
        while self.is_pending() {
            let completion = self.rx.recv().ok()?;
            let event = self.dispatch(completion);
            if event.generation() == self.latest {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{alternating, wav_input};
    use crate::render::canvas::RgbaCanvas;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Holds decode requests until the test releases them.
    #[derive(Clone, Default)]
    struct ManualDecoder {
        queue: Rc<RefCell<Vec<(RawAudio, DecodeTicket)>>>,
    }

    impl ManualDecoder {
        fn finish(&self, generation: Generation) {
            let (raw, ticket) = {
                let mut queue = self.queue.borrow_mut();
                let idx = queue
                    .iter()
                    .position(|(_, t)| t.generation() == generation)
                    .expect("no such pending decode");
                queue.remove(idx)
            };
            ticket.complete(decode(&raw));
        }
    }

    impl DecodeBackend for ManualDecoder {
        fn submit(&self, raw: RawAudio, ticket: DecodeTicket) {
            self.queue.borrow_mut().push((raw, ticket));
        }
    }

    struct InlineDecoder;

    impl DecodeBackend for InlineDecoder {
        fn submit(&self, raw: RawAudio, ticket: DecodeTicket) {
            ticket.complete(decode(&raw));
        }
    }

    fn spec() -> RenderSpec {
        RenderSpec::new(100.0, 40.0, 2.0, 0.8, crate::render::waveform::default_gradient()).unwrap()
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    fn next(pipeline: &mut Pipeline<impl DecodeBackend, RgbaCanvas>) -> PipelineEvent {
        pipeline
            .poll_event(Duration::from_secs(5))
            .expect("completion should be queued")
    }

    fn render_alone(raw: RawAudio) -> Vec<u8> {
        let mut pipeline = Pipeline::new(InlineDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        pipeline.on_input_changed(raw);
        pipeline.wait_settled().unwrap();
        pipeline.surface().pixels().to_vec()
    }

    #[test]
    fn latest_input_wins_when_old_decode_finishes_last() {
        let decoder = ManualDecoder::default();
        let mut pipeline = Pipeline::new(decoder.clone(), RgbaCanvas::new(100, 40), spec(), 10);

        let a = pipeline.on_input_changed(wav_input("a.wav", &alternating(1000)));
        let b = pipeline.on_input_changed(wav_input("b.wav", &ramp(1000)));
        assert!(pipeline.is_pending());

        decoder.finish(b);
        assert!(matches!(next(&mut pipeline), PipelineEvent::Rendered { generation, .. } if generation == b));
        let after_b = pipeline.surface().pixels().to_vec();

        decoder.finish(a);
        assert!(matches!(next(&mut pipeline), PipelineEvent::Superseded { generation, .. } if generation == a));
        assert_eq!(pipeline.surface().pixels(), &after_b[..]);
        assert_eq!(pipeline.displayed(), Some("b.wav"));
        assert_eq!(after_b, render_alone(wav_input("b.wav", &ramp(1000))));
    }

    #[test]
    fn stale_result_never_reaches_surface() {
        let decoder = ManualDecoder::default();
        let mut pipeline = Pipeline::new(decoder.clone(), RgbaCanvas::new(100, 40), spec(), 10);

        let a = pipeline.on_input_changed(wav_input("a.wav", &alternating(1000)));
        let b = pipeline.on_input_changed(wav_input("b.wav", &ramp(1000)));

        decoder.finish(a);
        assert!(matches!(next(&mut pipeline), PipelineEvent::Superseded { .. }));
        assert!(pipeline.surface().is_blank());
        assert_eq!(pipeline.stage(), Stage::Decoding);

        decoder.finish(b);
        assert!(matches!(next(&mut pipeline), PipelineEvent::Rendered { .. }));
        assert_eq!(pipeline.stage(), Stage::Rendered);
    }

    #[test]
    fn failure_for_another_input_keeps_previous_waveform() {
        let mut pipeline = Pipeline::new(InlineDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        pipeline.on_input_changed(wav_input("a.wav", &alternating(1000)));
        pipeline.wait_settled().unwrap();
        let drawn = pipeline.surface().pixels().to_vec();

        pipeline.on_input_changed(RawAudio::new("b.wav", "audio/wav", vec![7u8; 64]));
        match pipeline.wait_settled().unwrap() {
            PipelineEvent::Failed { error, cleared, .. } => {
                assert!(matches!(error, WaveformError::Decode { .. }));
                assert!(!cleared);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(pipeline.surface().pixels(), &drawn[..]);
        assert_eq!(pipeline.displayed(), Some("a.wav"));
        assert_eq!(pipeline.stage(), Stage::Failed);
    }

    #[test]
    fn failure_reprocessing_displayed_input_clears_surface() {
        let mut pipeline = Pipeline::new(InlineDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        pipeline.on_input_changed(wav_input("a.wav", &alternating(1000)));
        pipeline.wait_settled().unwrap();
        assert!(!pipeline.surface().is_blank());

        // Same file name, now too short for the configured resolution.
        pipeline.on_input_changed(wav_input("a.wav", &alternating(5)));
        match pipeline.wait_settled().unwrap() {
            PipelineEvent::Failed { error, cleared, .. } => {
                assert!(matches!(error, WaveformError::InsufficientSamples { samples: 5, resolution: 10 }));
                assert!(cleared);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(pipeline.surface().is_blank());
        assert_eq!(pipeline.displayed(), None);
    }

    #[test]
    fn non_audio_input_is_reported_not_rendered() {
        let mut pipeline = Pipeline::new(InlineDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        pipeline.on_input_changed(RawAudio::new("notes.txt", "text/plain", b"hi".to_vec()));
        let event = pipeline.wait_settled().unwrap();
        assert!(matches!(
            event,
            PipelineEvent::Failed { error: WaveformError::UnsupportedInput(_), .. }
        ));
        assert!(pipeline.surface().is_blank());
    }

    #[test]
    fn pool_decoder_renders_and_is_deterministic() {
        let input = wav_input("siren.wav", &alternating(1000));
        let mut first = Pipeline::new(PoolDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        let mut second = Pipeline::new(PoolDecoder, RgbaCanvas::new(100, 40), spec(), 10);
        first.on_input_changed(input.clone());
        second.on_input_changed(input);

        match first.wait_settled().unwrap() {
            PipelineEvent::Rendered { info, input, .. } => {
                assert_eq!(input, "siren.wav");
                assert_eq!(info.frames, 1000);
                assert_eq!(info.channel_count, 1);
                assert_eq!(info.sample_rate, 44_100);
            }
            other => panic!("unexpected event {:?}", other),
        }
        second.wait_settled().unwrap();
        assert_eq!(first.surface().pixels(), second.surface().pixels());
    }

    #[test]
    fn nothing_pending_means_nothing_to_wait_for() {
        let mut pipeline = Pipeline::new(InlineDecoder, RgbaCanvas::new(10, 10), spec(), 10);
        assert!(pipeline.wait_settled().is_none());
        assert_eq!(pipeline.stage(), Stage::Idle);
    }
}

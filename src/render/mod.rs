pub mod canvas;
pub mod color;
pub mod gradient;
pub mod waveform;

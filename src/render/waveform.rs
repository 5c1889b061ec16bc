use crate::audio::normalize::NormalizedEnvelope;
use crate::error::{Result, WaveformError};

use super::canvas::{DrawTarget, Rect};
use super::color::Rgba;
use super::gradient::{GradientStop, LinearGradient};

/// Geometry and paint for the bar chart. Only constructible in a valid state.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSpec {
    width: f32,
    height: f32,
    bar_gap: f32,
    amplitude_fraction: f32,
    gradient: Vec<GradientStop>,
}

impl RenderSpec {
    pub fn new(
        width: f32,
        height: f32,
        bar_gap: f32,
        amplitude_fraction: f32,
        mut gradient: Vec<GradientStop>,
    ) -> Result<Self> {
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(WaveformError::InvalidRenderSpec(format!(
                "surface must be positive, got {}x{}",
                width, height
            )));
        }
        if !(bar_gap.is_finite() && bar_gap >= 0.0) {
            return Err(WaveformError::InvalidRenderSpec(format!(
                "bar gap must be non-negative, got {}",
                bar_gap
            )));
        }
        if !(amplitude_fraction > 0.0 && amplitude_fraction <= 1.0) {
            return Err(WaveformError::InvalidRenderSpec(format!(
                "amplitude fraction must be in (0, 1], got {}",
                amplitude_fraction
            )));
        }
        if gradient.is_empty() {
            return Err(WaveformError::InvalidRenderSpec("gradient has no stops".into()));
        }
        if let Some(stop) = gradient.iter().find(|s| !(0.0..=1.0).contains(&s.offset)) {
            return Err(WaveformError::InvalidRenderSpec(format!(
                "gradient stop offset {} outside 0-1",
                stop.offset
            )));
        }
        gradient.sort_by(|a, b| a.offset.total_cmp(&b.offset));

        Ok(Self {
            width,
            height,
            bar_gap,
            amplitude_fraction,
            gradient,
        })
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn bar_gap(&self) -> f32 {
        self.bar_gap
    }

    pub fn amplitude_fraction(&self) -> f32 {
        self.amplitude_fraction
    }

    pub fn gradient(&self) -> &[GradientStop] {
        &self.gradient
    }

    /// Pixel dimensions of a surface that fits the whole chart.
    pub fn surface_size(&self) -> (u32, u32) {
        (self.width.ceil() as u32, self.height.ceil() as u32)
    }
}

/// Violet to teal, matching the web canvas the tool started as.
pub fn default_gradient() -> Vec<GradientStop> {
    vec![
        GradientStop::new(0.0, Rgba::from_hsl(270.0, 0.8, 0.65)),
        GradientStop::new(0.5, Rgba::from_hsl(280.0, 0.6, 0.5)),
        GradientStop::new(1.0, Rgba::from_hsl(180.0, 0.6, 0.55)),
    ]
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 200.0,
            bar_gap: 2.0,
            amplitude_fraction: 0.8,
            gradient: default_gradient(),
        }
    }
}

/// One rectangle per value: evenly spaced columns, vertically centred.
pub fn layout_bars(values: &[f32], spec: &RenderSpec) -> Vec<Rect> {
    if values.is_empty() {
        return Vec::new();
    }
    let bar_width = spec.width / values.len() as f32;
    let width = (bar_width - spec.bar_gap).max(0.0);
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let height = v * spec.height * spec.amplitude_fraction;
            Rect {
                x: i as f32 * bar_width,
                y: (spec.height - height) / 2.0,
                width,
                height,
            }
        })
        .collect()
}

/// Clear `surface` and draw one gradient-filled bar per value.
pub fn render<T: DrawTarget + ?Sized>(
    values: &NormalizedEnvelope,
    spec: &RenderSpec,
    surface: &mut T,
) -> Result<()> {
    if values.is_empty() {
        return Err(WaveformError::InvalidRenderSpec("no values to render".into()));
    }
    if surface.width() == 0 || surface.height() == 0 {
        return Err(WaveformError::InvalidRenderSpec(format!(
            "draw target is {}x{}",
            surface.width(),
            surface.height()
        )));
    }

    let paint = LinearGradient::vertical(&spec.gradient, spec.height, surface.height());

    surface.clear();
    for rect in layout_bars(values.values(), spec) {
        surface.fill_rect(&rect, &paint);
    }

    log::debug!(
        "Rendered {} bars onto {}x{} surface",
        values.len(),
        surface.width(),
        surface.height()
    );
    Ok(())
}

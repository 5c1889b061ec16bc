use serde::Deserialize;

use super::color::Rgba;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct GradientStop {
    /// Position along the gradient axis, 0.0-1.0.
    pub offset: f32,
    pub color: Rgba,
}

impl GradientStop {
    pub fn new(offset: f32, color: Rgba) -> Self {
        Self { offset, color }
    }
}

/// Top-to-bottom linear gradient, pre-sampled once per pixel row.
///
/// Like a canvas gradient, rows above the first stop take its colour and
/// rows below the last stop take the last colour.
#[derive(Clone, Debug)]
pub struct LinearGradient {
    rows: Vec<Rgba>,
}

impl LinearGradient {
    /// Gradient running from y = 0 to y = `span`, sampled at pixel centres
    /// for `rows` rows. `stops` must be sorted by offset.
    pub fn vertical(stops: &[GradientStop], span: f32, rows: u32) -> Self {
        let rows = (0..rows)
            .map(|y| color_at(stops, (y as f32 + 0.5) / span))
            .collect();
        Self { rows }
    }

    pub fn row(&self, y: u32) -> Rgba {
        match self.rows.get(y as usize) {
            Some(color) => *color,
            None => self.rows.last().copied().unwrap_or(Rgba::TRANSPARENT),
        }
    }
}

/// Colour at position `t` along sorted `stops`.
pub fn color_at(stops: &[GradientStop], t: f32) -> Rgba {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgba::TRANSPARENT;
    };
    if t <= first.offset {
        return first.color;
    }
    if t >= last.offset {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t >= a.offset && t <= b.offset {
            let span = b.offset - a.offset;
            if span <= f32::EPSILON {
                return b.color;
            }
            return Rgba::lerp(a.color, b.color, (t - a.offset) / span);
        }
    }
    last.color
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black_to_white() -> Vec<GradientStop> {
        vec![
            GradientStop::new(0.0, Rgba::opaque(0, 0, 0)),
            GradientStop::new(1.0, Rgba::opaque(255, 255, 255)),
        ]
    }

    #[test]
    fn interpolates_between_stops() {
        let stops = black_to_white();
        assert_eq!(color_at(&stops, 0.0), Rgba::opaque(0, 0, 0));
        assert_eq!(color_at(&stops, 1.0), Rgba::opaque(255, 255, 255));
        assert_eq!(color_at(&stops, 0.2), Rgba::opaque(51, 51, 51));
    }

    #[test]
    fn clamps_outside_stop_range() {
        let stops = vec![
            GradientStop::new(0.25, Rgba::opaque(10, 0, 0)),
            GradientStop::new(0.75, Rgba::opaque(0, 10, 0)),
        ];
        assert_eq!(color_at(&stops, 0.0), Rgba::opaque(10, 0, 0));
        assert_eq!(color_at(&stops, 0.9), Rgba::opaque(0, 10, 0));
    }

    #[test]
    fn coincident_stops_switch_hard() {
        let stops = vec![
            GradientStop::new(0.0, Rgba::opaque(1, 1, 1)),
            GradientStop::new(0.5, Rgba::opaque(2, 2, 2)),
            GradientStop::new(0.5, Rgba::opaque(9, 9, 9)),
            GradientStop::new(1.0, Rgba::opaque(9, 9, 9)),
        ];
        assert_eq!(color_at(&stops, 0.5), Rgba::opaque(2, 2, 2));
        assert_eq!(color_at(&stops, 0.51), Rgba::opaque(9, 9, 9));
    }

    #[test]
    fn rows_sample_pixel_centres() {
        let gradient = LinearGradient::vertical(&black_to_white(), 10.0, 10);
        assert_eq!(gradient.row(0), Rgba::opaque(13, 13, 13));
        assert_eq!(gradient.row(9), Rgba::opaque(242, 242, 242));
        assert_eq!(gradient.row(50), gradient.row(9));
    }
}

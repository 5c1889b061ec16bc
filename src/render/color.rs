use serde::Deserialize;
use std::str::FromStr;

/// Straight (non-premultiplied) 8-bit RGBA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 255])
    }

    /// CSS-style HSL: hue in degrees, saturation and lightness in 0.0-1.0.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);

        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let to_u8 = |c: f32| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgba::opaque(to_u8(r), to_u8(g), to_u8(b))
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }

    pub fn lerp(a: Rgba, b: Rgba, t: f32) -> Rgba {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            let (from, to) = (a.0[i] as f32, b.0[i] as f32);
            *channel = (from + (to - from) * t).round() as u8;
        }
        Rgba(out)
    }
}

impl FromStr for Rgba {
    type Err = String;

    /// Accepts `#rrggbb`, `#rrggbbaa` and `hsl(h, s%, l%)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| format!("invalid hex colour '{}'", s));
        }
        if let Some(body) = s.strip_prefix("hsl(").and_then(|rest| rest.strip_suffix(')')) {
            return parse_hsl(body).ok_or_else(|| format!("invalid hsl colour '{}'", s));
        }
        Err(format!("unrecognised colour '{}'", s))
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !(hex.len() == 6 || hex.len() == 8) || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
    Some(Rgba([byte(0)?, byte(2)?, byte(4)?, alpha]))
}

fn parse_hsl(body: &str) -> Option<Rgba> {
    let mut parts = body.split(',').map(str::trim);
    let hue: f32 = parts.next()?.trim_end_matches("deg").parse().ok()?;
    let saturation: f32 = parts.next()?.strip_suffix('%')?.trim().parse().ok()?;
    let lightness: f32 = parts.next()?.strip_suffix('%')?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Rgba::from_hsl(hue, saturation / 100.0, lightness / 100.0))
}

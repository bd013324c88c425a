use anyhow::{bail, Result};
use palette::{FromColor, IntoColor, Lab, Lch, Srgb};

/// Channel tolerance used when deciding whether a Lab value lands inside sRGB.
const GAMUT_EPSILON: f32 = 1e-3;
const GAMUT_SEARCH_STEPS: usize = 24;

/// Core color type used throughout the pipeline.
/// Wraps sRGB u8 components; two colors are "the same swatch" exactly when
/// their hex strings match, so equality and hashing work on the triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color string like `#ff8800` or `#FF8800`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            bail!("invalid hex color: expected 6 hex digits, got {:?}", hex);
        }
        let r = u8::from_str_radix(&hex[0..2], 16)?;
        let g = u8::from_str_radix(&hex[2..4], 16)?;
        let b = u8::from_str_radix(&hex[4..6], 16)?;
        Ok(Self { r, g, b })
    }

    /// Serialize to lowercase hex `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Convert to CIELAB (D65).
    pub fn to_lab(self) -> Lab {
        let srgb_f32: Srgb<f32> = Srgb::new(self.r, self.g, self.b).into_format();
        srgb_f32.into_color()
    }

    /// Create from CIELAB, clamping out-of-gamut channels.
    pub fn from_lab(lab: Lab) -> Self {
        let srgb_f32: Srgb<f32> = Srgb::from_color(lab);
        Self::from_srgb_f32_clamped(srgb_f32)
    }

    /// Clamp an Srgb<f32> to [0, 1] and convert to Color.
    fn from_srgb_f32_clamped(srgb: Srgb<f32>) -> Self {
        let r = (srgb.red.clamp(0.0, 1.0) * 255.0).round() as u8;
        let g = (srgb.green.clamp(0.0, 1.0) * 255.0).round() as u8;
        let b = (srgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { r, g, b }
    }

    /// WCAG 2.0 relative luminance.
    ///
    /// Linearizes each sRGB channel, then computes the weighted sum.
    pub fn relative_luminance(self) -> f32 {
        fn linearize(c: u8) -> f32 {
            let c = c as f32 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        let r = linearize(self.r);
        let g = linearize(self.g);
        let b = linearize(self.b);
        0.2126 * r + 0.7152 * g + 0.0722 * b
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Cylindrical form of a Lab value: `(L, chroma, hue degrees in [0, 360))`.
pub fn lab_to_lch(lab: Lab) -> (f32, f32, f32) {
    let lch = Lch::from_color(lab);
    let hue = if lch.chroma > 1e-6 {
        lch.hue.into_positive_degrees()
    } else {
        0.0
    };
    (lch.l, lch.chroma, hue)
}

/// Inverse of [`lab_to_lch`]. Lightness is clamped to [0, 100] and chroma to
/// be non-negative before the conversion.
pub fn lch_to_lab(l: f32, chroma: f32, hue: f32) -> Lab {
    let lch = Lch::new(l.clamp(0.0, 100.0), chroma.max(0.0), hue.rem_euclid(360.0));
    Lab::from_color(lch)
}

/// Whether a Lab value converts to sRGB without clamping.
pub fn in_gamut(lab: Lab) -> bool {
    let srgb: Srgb<f32> = Srgb::from_color(lab);
    [srgb.red, srgb.green, srgb.blue]
        .iter()
        .all(|c| c.is_finite() && *c >= -GAMUT_EPSILON && *c <= 1.0 + GAMUT_EPSILON)
}

/// Bring a Lab value into the sRGB gamut by reducing chroma at constant
/// lightness and hue. Lightness is clamped to [0, 100] first; the neutral
/// axis is always representable, so the search terminates.
pub fn gamut_map(lab: Lab) -> Lab {
    let (l, chroma, hue) = lab_to_lch(lab);
    let l = l.clamp(0.0, 100.0);
    let candidate = lch_to_lab(l, chroma, hue);
    if in_gamut(candidate) {
        return candidate;
    }

    let (mut lo, mut hi) = (0.0_f32, chroma);
    for _ in 0..GAMUT_SEARCH_STEPS {
        let mid = (lo + hi) / 2.0;
        if in_gamut(lch_to_lab(l, mid, hue)) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lch_to_lab(l, lo, hue)
}

/// CIE76 color difference (Euclidean distance in Lab).
pub fn delta_e(x: Lab, y: Lab) -> f32 {
    ((x.l - y.l).powi(2) + (x.a - y.a).powi(2) + (x.b - y.b).powi(2)).sqrt()
}

/// Shortest angular distance between two hues, in degrees within [0, 180].
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs().rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Signed offset from `center` to `hue`, in degrees within [-180, 180).
pub fn signed_hue_offset(hue: f32, center: f32) -> f32 {
    (hue - center + 180.0).rem_euclid(360.0) - 180.0
}

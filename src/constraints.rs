//! Learned perceptual constraints, scoped to one reference palette.
//!
//! The table is produced by an external statistics stage. Two JSON layouts
//! are accepted: a palette-scoped object, and the corpus-wide document whose
//! sections are keyed by palette name (scoped with
//! [`ConstraintTable::from_corpus_json_str`]).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::color::{hue_distance, signed_hue_offset};
use crate::element::{offset_keys, Element, Polarity, Role, RolePair};
use crate::error::ConstraintError;

/// Minimum structural gaps in the relaxed tier are this fraction of q25.
pub const RELAXED_GAP_FACTOR: f32 = 0.6;
/// Used when a hue entry carries no `relax_mult`.
pub const DEFAULT_HUE_RELAX_MULT: f32 = 1.3;

/// Search tier. Every stage runs strict first, then relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Strict,
    Relaxed,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Strict, Tier::Relaxed];

    pub fn is_relaxed(self) -> bool {
        self == Tier::Relaxed
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Strict => "strict",
            Tier::Relaxed => "relaxed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapStats {
    pub q25: f32,
    pub median: f32,
    pub q75: Option<f32>,
}

/// Quantile band of a per-role property (lightness or chroma).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub q10: f32,
    pub q25: f32,
    pub median: f32,
    pub q75: f32,
    pub q90: f32,
    pub relax_delta: f32,
}

impl Band {
    /// Acceptance window for `tier`, clipped to `[floor, ceil]`.
    pub fn bounds(&self, tier: Tier, floor: f32, ceil: f32) -> (f32, f32) {
        let (lo, hi) = match tier {
            Tier::Strict => (self.q25, self.q75),
            Tier::Relaxed => (self.q25 - self.relax_delta, self.q75 + self.relax_delta),
        };
        (lo.clamp(floor, ceil), hi.clamp(floor, ceil))
    }
}

/// Circular hue window of a role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HueWindow {
    pub center: f32,
    pub width: f32,
    pub relax_mult: f32,
}

impl HueWindow {
    pub fn half_width(&self, tier: Tier) -> f32 {
        let mult = if tier.is_relaxed() { self.relax_mult } else { 1.0 };
        (self.width / 2.0) * mult
    }

    pub fn contains(&self, hue: f32, tier: Tier) -> bool {
        hue_distance(hue, self.center) <= self.half_width(tier)
    }

    /// Pull a hue inside the window: strict snaps to the nearer edge, relaxed
    /// snaps to the center.
    pub fn clamp(&self, hue: f32, tier: Tier) -> f32 {
        if self.contains(hue, tier) {
            return hue;
        }
        match tier {
            Tier::Strict => {
                let half = self.half_width(tier);
                let offset = signed_hue_offset(hue, self.center);
                (self.center + half.copysign(offset)).rem_euclid(360.0)
            }
            Tier::Relaxed => self.center,
        }
    }
}

/// Learned accent-to-background lightness separation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    pub min: f32,
    pub q10: Option<f32>,
    pub q25: Option<f32>,
    pub median: Option<f32>,
}

/// Optional photo-derived preferences for the structural search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StructuralHints {
    /// Dominant photo hue for the background, with its confidence in [0, 1].
    pub photo_hue: Option<(f32, f32)>,
    /// Largest tolerated hue spread between the four UI anchors.
    pub ui_hue_max_dist: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ConstraintTable {
    palette: Option<String>,
    polarity: Option<Polarity>,
    gaps: [GapStats; 4],
    lightness: [Option<Band>; 8],
    chroma: [Band; 8],
    hue: [Option<HueWindow>; 8],
    offsets: BTreeMap<&'static str, f32>,
    separation: BTreeMap<(Polarity, Role), Separation>,
    hints: StructuralHints,
}

// ------------------------------------------------------------------
// Raw JSON shapes
// ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTable {
    palette: Option<String>,
    polarity: Option<Polarity>,
    #[serde(rename = "deltaL")]
    delta_l: Option<BTreeMap<String, RawGap>>,
    lightness: Option<BTreeMap<String, RawBand>>,
    chroma: Option<BTreeMap<String, RawBand>>,
    hue: Option<BTreeMap<String, RawHue>>,
    element_offsets: Option<BTreeMap<String, RawOffset>>,
    accent_separation: Option<BTreeMap<String, BTreeMap<String, RawSeparation>>>,
    photo_hue: Option<RawPhotoHue>,
    ui_hue_coherence: Option<RawCoherence>,
}

#[derive(Debug, Deserialize)]
struct RawGap {
    q25: Option<f32>,
    median: Option<f32>,
    q75: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawBand {
    q10: Option<f32>,
    q25: Option<f32>,
    median: Option<f32>,
    q75: Option<f32>,
    q90: Option<f32>,
    relax_delta: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawHue {
    center: Option<f32>,
    width: Option<f32>,
    relax_mult: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawOffset {
    value: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawSeparation {
    min: Option<f32>,
    q10: Option<f32>,
    q25: Option<f32>,
    median: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawPhotoHue {
    hue: f32,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RawCoherence {
    max_dist: f32,
}

fn require(value: Option<f32>, field: impl FnOnce() -> String) -> Result<f32, ConstraintError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ConstraintError::invalid(field(), format!("{v} is not finite"))),
        None => Err(ConstraintError::missing(field())),
    }
}

fn parse_band(raw: &RawBand, field: &str) -> Result<Band, ConstraintError> {
    let q10 = require(raw.q10, || format!("{field}.q10"))?;
    let q25 = require(raw.q25, || format!("{field}.q25"))?;
    let median = require(raw.median, || format!("{field}.median"))?;
    let q75 = require(raw.q75, || format!("{field}.q75"))?;
    let q90 = require(raw.q90, || format!("{field}.q90"))?;
    if !(q10 <= q25 && q25 <= median && median <= q75 && q75 <= q90) {
        return Err(ConstraintError::invalid(
            field,
            format!("quantiles out of order: {q10} {q25} {median} {q75} {q90}"),
        ));
    }
    let relax_delta = match raw.relax_delta {
        Some(d) if d.is_finite() && d >= 0.0 => d,
        Some(d) => {
            return Err(ConstraintError::invalid(
                format!("{field}.relax_delta"),
                format!("{d} must be a non-negative number"),
            ))
        }
        None => (q90 - q10) / 2.0,
    };
    Ok(Band {
        q10,
        q25,
        median,
        q75,
        q90,
        relax_delta,
    })
}

fn parse_hue(raw: &RawHue, field: &str) -> Result<HueWindow, ConstraintError> {
    let center = require(raw.center, || format!("{field}.center"))?;
    let width = require(raw.width, || format!("{field}.width"))?;
    if !(width > 0.0 && width <= 360.0) {
        return Err(ConstraintError::invalid(
            format!("{field}.width"),
            format!("{width} must lie in (0, 360]"),
        ));
    }
    let relax_mult = match raw.relax_mult {
        Some(m) if m.is_finite() && m >= 1.0 => m,
        Some(m) => {
            return Err(ConstraintError::invalid(
                format!("{field}.relax_mult"),
                format!("{m} must be >= 1"),
            ))
        }
        None => DEFAULT_HUE_RELAX_MULT,
    };
    Ok(HueWindow {
        center: center.rem_euclid(360.0),
        width,
        relax_mult,
    })
}

impl ConstraintTable {
    /// Parse a palette-scoped constraint object.
    pub fn from_json_str(json: &str) -> Result<Self, ConstraintError> {
        let raw: RawTable = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Parse a corpus-wide document and scope it to `palette`.
    ///
    /// Layout: `{"polarity": {name: ..}, "constraints": {section: {name: ..}}}`
    /// where `accent_separation` is shared across palettes (keyed by polarity).
    pub fn from_corpus_json_str(json: &str, palette: &str) -> Result<Self, ConstraintError> {
        let doc: Value = serde_json::from_str(json)?;
        let sections = doc
            .get("constraints")
            .and_then(Value::as_object)
            .ok_or_else(|| ConstraintError::missing("constraints"))?;

        let mut scoped = Map::new();
        scoped.insert("palette".into(), Value::String(palette.to_string()));
        if let Some(p) = doc.get("polarity").and_then(|p| p.get(palette)) {
            scoped.insert("polarity".into(), p.clone());
        }

        let mut found = false;
        for (section, by_palette) in sections {
            if section == "accent_separation" {
                scoped.insert(section.clone(), by_palette.clone());
                continue;
            }
            if let Some(v) = by_palette.get(palette) {
                found = true;
                scoped.insert(section.clone(), v.clone());
            }
        }
        if !found {
            return Err(ConstraintError::UnknownPalette(palette.to_string()));
        }

        let raw: RawTable = serde_json::from_value(Value::Object(scoped))?;
        Self::from_raw(raw)
    }

    /// Parse either layout; the corpus layout needs a palette name.
    pub fn from_json_auto(json: &str, palette: Option<&str>) -> Result<Self, ConstraintError> {
        let doc: Value = serde_json::from_str(json)?;
        if doc.get("constraints").is_some() {
            let palette = palette.ok_or_else(|| {
                ConstraintError::missing("palette name (needed to scope a corpus-wide document)")
            })?;
            Self::from_corpus_json_str(json, palette)
        } else {
            let raw: RawTable = serde_json::from_value(doc)?;
            Self::from_raw(raw)
        }
    }

    /// Load a constraint file from disk.
    pub fn load(path: &Path, palette: Option<&str>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read constraints: {}", path.display()))?;
        Self::from_json_auto(&json, palette)
            .with_context(|| format!("invalid constraint table: {}", path.display()))
    }

    fn from_raw(raw: RawTable) -> Result<Self, ConstraintError> {
        let delta_l = raw.delta_l.ok_or_else(|| ConstraintError::missing("deltaL"))?;
        let mut gaps = Vec::with_capacity(4);
        for pair in RolePair::ALL {
            let g = delta_l
                .get(pair.key())
                .or_else(|| delta_l.get(pair.ascii_key()))
                .ok_or_else(|| ConstraintError::missing(format!("deltaL[{}]", pair.key())))?;
            let q25 = require(g.q25, || format!("deltaL[{}].q25", pair.key()))?;
            let median = require(g.median, || format!("deltaL[{}].median", pair.key()))?;
            if q25 < 0.0 || median < 0.0 {
                return Err(ConstraintError::invalid(
                    format!("deltaL[{}]", pair.key()),
                    "absolute gaps must be non-negative",
                ));
            }
            gaps.push(GapStats {
                q25,
                median,
                q75: g.q75,
            });
        }
        let gaps: [GapStats; 4] = [gaps[0], gaps[1], gaps[2], gaps[3]];

        let mut lightness = [None; 8];
        if let Some(map) = &raw.lightness {
            for role in Role::ALL {
                if let Some(b) = map.get(role.as_str()) {
                    let band = parse_band(b, &format!("lightness[{role}]"))?;
                    if band.q10 < 0.0 || band.q90 > 100.0 {
                        return Err(ConstraintError::invalid(
                            format!("lightness[{role}]"),
                            "lightness quantiles must lie in [0, 100]",
                        ));
                    }
                    lightness[role as usize] = Some(band);
                }
            }
        }

        let chroma_map = raw.chroma.as_ref().ok_or_else(|| ConstraintError::missing("chroma"))?;
        let mut chroma = Vec::with_capacity(8);
        for role in Role::ALL {
            let b = chroma_map
                .get(role.as_str())
                .ok_or_else(|| ConstraintError::missing(format!("chroma[{role}]")))?;
            let band = parse_band(b, &format!("chroma[{role}]"))?;
            if band.q10 < 0.0 {
                return Err(ConstraintError::invalid(
                    format!("chroma[{role}]"),
                    "chroma quantiles must be non-negative",
                ));
            }
            chroma.push(band);
        }
        let chroma: [Band; 8] = std::array::from_fn(|i| chroma[i]);

        let hue_map = raw.hue.as_ref().ok_or_else(|| ConstraintError::missing("hue"))?;
        let mut hue = [None; 8];
        for role in Role::ALL {
            match hue_map.get(role.as_str()) {
                Some(h) => hue[role as usize] = Some(parse_hue(h, &format!("hue[{role}]"))?),
                None if role.is_accent() => {
                    return Err(ConstraintError::missing(format!("hue[{role}]")))
                }
                None => {}
            }
        }

        let offset_map = raw
            .element_offsets
            .as_ref()
            .ok_or_else(|| ConstraintError::missing("element_offsets"))?;
        let mut offsets = BTreeMap::new();
        for key in offset_keys() {
            let v = offset_map
                .get(key)
                .ok_or_else(|| ConstraintError::missing(format!("element_offsets[{key}]")))?;
            let value = require(v.value, || format!("element_offsets[{key}].value"))?;
            offsets.insert(key, value);
        }

        let mut separation = BTreeMap::new();
        if let Some(by_polarity) = &raw.accent_separation {
            for (pol_key, roles) in by_polarity {
                let polarity = match pol_key.as_str() {
                    "dark" => Polarity::Dark,
                    "light" => Polarity::Light,
                    other => {
                        return Err(ConstraintError::invalid(
                            "accent_separation",
                            format!("unknown polarity {other:?}"),
                        ))
                    }
                };
                for role in Role::ACCENTS {
                    if let Some(s) = roles.get(role.as_str()) {
                        let field = format!("accent_separation[{pol_key}][{role}]");
                        let min = require(s.min, || format!("{field}.min"))?;
                        separation.insert(
                            (polarity, role),
                            Separation {
                                min: min.abs(),
                                q10: s.q10,
                                q25: s.q25,
                                median: s.median,
                            },
                        );
                    }
                }
            }
        }

        let hints = StructuralHints {
            photo_hue: raw
                .photo_hue
                .map(|p| (p.hue.rem_euclid(360.0), p.confidence.clamp(0.0, 1.0))),
            ui_hue_max_dist: raw.ui_hue_coherence.map(|c| c.max_dist),
        };

        Ok(Self {
            palette: raw.palette,
            polarity: raw.polarity,
            gaps,
            lightness,
            chroma,
            hue,
            offsets,
            separation,
            hints,
        })
    }

    /// Fail fast if anything a run with `polarity` needs is absent.
    pub fn ensure_ready(&self, polarity: Polarity) -> Result<(), ConstraintError> {
        for role in Role::ACCENTS {
            self.accent_separation(role, polarity)?;
        }
        Ok(())
    }

    pub fn palette(&self) -> Option<&str> {
        self.palette.as_deref()
    }

    pub fn polarity(&self) -> Option<Polarity> {
        self.polarity
    }

    pub fn hints(&self) -> StructuralHints {
        self.hints
    }

    pub fn gap(&self, pair: RolePair) -> GapStats {
        self.gaps[pair as usize]
    }

    /// Minimum admissible absolute gap for `pair` in `tier`.
    pub fn min_gap(&self, pair: RolePair, tier: Tier) -> f32 {
        let q25 = self.gap(pair).q25;
        match tier {
            Tier::Strict => q25,
            Tier::Relaxed => q25 * RELAXED_GAP_FACTOR,
        }
    }

    /// Learned median gap, the structural search's target.
    pub fn target_gap(&self, pair: RolePair) -> f32 {
        self.gap(pair).median
    }

    pub fn lightness_band(&self, role: Role, tier: Tier) -> Option<(f32, f32)> {
        self.lightness[role as usize].map(|b| b.bounds(tier, 0.0, 100.0))
    }

    pub fn chroma_band(&self, role: Role, tier: Tier) -> (f32, f32) {
        self.chroma[role as usize].bounds(tier, 0.0, f32::MAX)
    }

    pub fn hue_window(&self, role: Role) -> Option<&HueWindow> {
        self.hue[role as usize].as_ref()
    }

    /// Learned lightness offset of `element` from its anchor, if it has one.
    pub fn element_offset(&self, element: Element) -> Option<f32> {
        element
            .offset_anchor()
            .and_then(|(_, key)| self.offsets.get(key).copied())
    }

    pub fn accent_separation(
        &self,
        role: Role,
        polarity: Polarity,
    ) -> Result<Separation, ConstraintError> {
        self.separation
            .get(&(polarity, role))
            .copied()
            .ok_or_else(|| {
                ConstraintError::missing(format!("accent_separation[{polarity}][{role}]"))
            })
    }

    /// Minimum foreground lightness separation of `role` from the background.
    pub fn accent_min_separation(
        &self,
        role: Role,
        polarity: Polarity,
    ) -> Result<f32, ConstraintError> {
        Ok(self.accent_separation(role, polarity)?.min)
    }
}

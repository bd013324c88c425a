use palette::Lab;
use serde::{Serialize, Serializer};

use crate::color::{self, Color};
use crate::element::{Role, RoleSet};

/// One color, either sampled from the photograph (a pool candidate) or
/// synthesized by the gap filler.
///
/// Lightness and the chromatic axes are only changed through
/// [`ColorRecord::with_lab`] and friends, which recompute chroma, hue and the
/// sRGB triple so the derived fields never drift from `(L, a, b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRecord {
    color: Color,
    lab: Lab,
    chroma: f32,
    hue: f32,
    /// Popularity weight in [0, 1], the highest over all eligible roles.
    pub frequency: f32,
    /// Composite desirability from the sampling stage, the highest over all
    /// eligible roles. Rankings use [`ColorRecord::score_for`].
    pub score: f32,
    pub roles: RoleSet,
    /// Score and frequency as measured for each eligible role.
    per_role: [Option<RoleScore>; Role::ALL.len()],
    pub delta_e_bg_rank: Option<f32>,
    pub abs_delta_l_bg_rank: Option<f32>,
    /// `true` when the color was synthesized rather than taken from the pool.
    pub derived: bool,
    /// The pool color a synthesized record was derived from.
    pub seed: Option<Color>,
}

/// Sampling-stage desirability of a color for one role.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RoleScore {
    score: f32,
    frequency: f32,
}

impl ColorRecord {
    /// Build a pool candidate. `color` is authoritative for identity (hex);
    /// `lab` is the sampling stage's measurement of it.
    pub fn sampled(color: Color, lab: Lab, frequency: f32, score: f32, roles: RoleSet) -> Self {
        let (_, chroma, hue) = color::lab_to_lch(lab);
        let mut per_role = [None; Role::ALL.len()];
        for role in roles.iter() {
            per_role[role as usize] = Some(RoleScore { score, frequency });
        }
        Self {
            color,
            lab,
            chroma,
            hue,
            frequency,
            score,
            roles,
            per_role,
            delta_e_bg_rank: None,
            abs_delta_l_bg_rank: None,
            derived: false,
            seed: None,
        }
    }

    /// Build a pool candidate measured from its sRGB triple.
    pub fn from_color(color: Color, frequency: f32, score: f32, roles: RoleSet) -> Self {
        Self::sampled(color, color.to_lab(), frequency, score, roles)
    }

    /// A synthesized color for `role`, seeded from `self`. The Lab value is
    /// gamut-mapped before the sRGB triple is derived.
    pub fn synthesize(&self, lab: Lab, role: Role) -> Self {
        let mut out = self.with_lab(lab);
        out.roles = RoleSet::single(role);
        out.per_role = [None; Role::ALL.len()];
        out.derived = true;
        out.seed = Some(self.seed.unwrap_or(self.color));
        out.delta_e_bg_rank = None;
        out.abs_delta_l_bg_rank = None;
        out
    }

    /// Copy with a new Lab value (gamut-mapped), keeping provenance.
    pub fn with_lab(&self, lab: Lab) -> Self {
        let lab = color::gamut_map(lab);
        let (_, chroma, hue) = color::lab_to_lch(lab);
        Self {
            color: Color::from_lab(lab),
            lab,
            chroma,
            hue,
            ..self.clone()
        }
    }

    /// Copy with only the lightness changed.
    pub fn with_lightness(&self, l: f32) -> Self {
        self.with_lab(Lab::new(l.clamp(0.0, 100.0), self.lab.a, self.lab.b))
    }

    /// Copy with the hue rotated by `degrees` at constant L and chroma.
    pub fn with_hue_shift(&self, degrees: f32) -> Self {
        self.with_lab(color::lch_to_lab(self.l(), self.chroma, self.hue + degrees))
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn hex(&self) -> String {
        self.color.to_hex()
    }

    pub fn lab(&self) -> Lab {
        self.lab
    }

    pub fn l(&self) -> f32 {
        self.lab.l
    }

    pub fn a(&self) -> f32 {
        self.lab.a
    }

    pub fn b(&self) -> f32 {
        self.lab.b
    }

    pub fn chroma(&self) -> f32 {
        self.chroma
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    pub fn delta_e(&self, other: &ColorRecord) -> f32 {
        color::delta_e(self.lab, other.lab)
    }

    pub fn is_eligible(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    /// Score of this color as a `role` candidate. Synthesized records carry
    /// no per-role measurement and report their overall score.
    pub fn score_for(&self, role: Role) -> f32 {
        self.per_role[role as usize].map_or(self.score, |s| s.score)
    }

    pub fn frequency_for(&self, role: Role) -> f32 {
        self.per_role[role as usize].map_or(self.frequency, |s| s.frequency)
    }

    /// Fold another sample of the same color into this one. Roles are
    /// united; each role keeps its own best score and frequency.
    pub fn merge(&mut self, other: &ColorRecord) {
        self.roles = self.roles.union(other.roles);
        for (mine, theirs) in self.per_role.iter_mut().zip(other.per_role) {
            *mine = match (*mine, theirs) {
                (Some(a), Some(b)) => Some(RoleScore {
                    score: a.score.max(b.score),
                    frequency: a.frequency.max(b.frequency),
                }),
                (a, b) => a.or(b),
            };
        }
        self.frequency = self.frequency.max(other.frequency);
        self.score = self.score.max(other.score);
        self.delta_e_bg_rank = self.delta_e_bg_rank.or(other.delta_e_bg_rank);
        self.abs_delta_l_bg_rank = self.abs_delta_l_bg_rank.or(other.abs_delta_l_bg_rank);
    }
}

#[derive(Serialize)]
struct RecordRow<'a> {
    hex: String,
    #[serde(rename = "R")]
    r: u8,
    #[serde(rename = "G")]
    g: u8,
    #[serde(rename = "B")]
    b: u8,
    #[serde(rename = "L")]
    l: f32,
    a: f32,
    #[serde(rename = "b")]
    lab_b: f32,
    chroma: f32,
    hue: f32,
    frequency: f32,
    score: f32,
    roles: &'a RoleSet,
    #[serde(rename = "deltaE_bg_rank", skip_serializing_if = "Option::is_none")]
    delta_e_bg_rank: Option<f32>,
    #[serde(rename = "abs_deltaL_bg_rank", skip_serializing_if = "Option::is_none")]
    abs_delta_l_bg_rank: Option<f32>,
    derived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed_hex: Option<String>,
}

impl Serialize for ColorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecordRow {
            hex: self.hex(),
            r: self.color.r,
            g: self.color.g,
            b: self.color.b,
            l: self.lab.l,
            a: self.lab.a,
            lab_b: self.lab.b,
            chroma: self.chroma,
            hue: self.hue,
            frequency: self.frequency,
            score: self.score,
            roles: &self.roles,
            delta_e_bg_rank: self.delta_e_bg_rank,
            abs_delta_l_bg_rank: self.abs_delta_l_bg_rank,
            derived: self.derived,
            seed_hex: self.seed.map(Color::to_hex),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ColorRecord {
        ColorRecord::from_color(
            Color::new(137, 180, 250),
            0.2,
            0.7,
            RoleSet::single(Role::AccentCool),
        )
    }

    #[test]
    fn derived_fields_follow_lab() {
        let rec = sample();
        let expected_chroma = (rec.a().powi(2) + rec.b().powi(2)).sqrt();
        assert!((rec.chroma() - expected_chroma).abs() < 1e-3);

        let lighter = rec.with_lightness(rec.l() + 10.0);
        let recomputed = (lighter.a().powi(2) + lighter.b().powi(2)).sqrt();
        assert!((lighter.chroma() - recomputed).abs() < 1e-3);
        assert_ne!(lighter.color(), rec.color());
        assert!(lighter.color().to_lab().l > rec.l());
    }

    #[test]
    fn synthesize_marks_provenance() {
        let rec = sample();
        let synth = rec.synthesize(Lab::new(70.0, -10.0, -30.0), Role::AccentBridge);
        assert!(synth.derived);
        assert_eq!(synth.seed, Some(rec.color()));
        assert!(synth.is_eligible(Role::AccentBridge));
        assert!(!synth.is_eligible(Role::AccentCool));

        // A re-derived color keeps pointing at the original pool seed.
        let again = synth.synthesize(Lab::new(72.0, -10.0, -30.0), Role::AccentBridge);
        assert_eq!(again.seed, Some(rec.color()));
    }

    #[test]
    fn merge_keeps_scores_per_role() {
        let blue = Color::new(137, 180, 250);
        let mut rec = ColorRecord::from_color(blue, 0.1, 0.2, RoleSet::single(Role::AccentCool));
        rec.merge(&ColorRecord::from_color(
            blue,
            0.4,
            0.9,
            RoleSet::single(Role::AccentBridge),
        ));
        assert_eq!(rec.score_for(Role::AccentCool), 0.2);
        assert_eq!(rec.frequency_for(Role::AccentCool), 0.1);
        assert_eq!(rec.score_for(Role::AccentBridge), 0.9);
        assert_eq!(rec.score, 0.9);

        let synth = rec.synthesize(Lab::new(60.0, -10.0, -30.0), Role::AccentCool);
        assert_eq!(synth.score_for(Role::AccentCool), 0.9);
    }

    #[test]
    fn hue_shift_keeps_lightness() {
        let rec = sample();
        let shifted = rec.with_hue_shift(16.0);
        assert!((shifted.l() - rec.l()).abs() < 0.01);
        assert!(crate::color::hue_distance(shifted.hue(), rec.hue() + 16.0) < 0.5);
    }

    #[test]
    fn serializes_named_columns() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["hex"], "#89b4fa");
        assert_eq!(json["R"], 137);
        assert_eq!(json["roles"], serde_json::json!(["accent_cool"]));
        assert_eq!(json["derived"], false);
        assert!(json.get("seed_hex").is_none());
    }
}

//! Structural assigner: picks the base/surface1/overlay1/text quadruple that
//! fixes the theme's lightness scale.

use tracing::{debug, info};

use crate::color::hue_distance;
use crate::constraints::{ConstraintTable, StructuralHints, Tier};
use crate::element::{Polarity, Role, RolePair};
use crate::error::AssignError;
use crate::pool::CandidatePool;
use crate::record::ColorRecord;

const POPULARITY_WEIGHT: f32 = 2.0;

/// Photo hue hints below this confidence are ignored.
const PHOTO_HUE_MIN_CONFIDENCE: f32 = 0.05;
const PHOTO_HUE_BASE_WEIGHT: f32 = 0.10;
const PHOTO_HUE_CONFIDENCE_WEIGHT: f32 = 0.25;
const UI_COHERENCE_WEIGHT: f32 = 0.06;
const UI_EXCESS_WEIGHT: f32 = 0.15;

/// Shortlist sizes as (background, surface, overlay, text).
fn shortlist_sizes(tier: Tier) -> (usize, usize, usize, usize) {
    match tier {
        Tier::Strict => (16, 20, 20, 16),
        Tier::Relaxed => (24, 32, 32, 24),
    }
}

/// The accepted quadruple.
#[derive(Debug, Clone)]
pub struct StructuralChoice {
    pub tier: Tier,
    pub base: ColorRecord,
    pub surface: ColorRecord,
    pub overlay: ColorRecord,
    pub text: ColorRecord,
    pub score: f32,
}

struct Thresholds {
    min: [f32; 4],
    target: [f32; 4],
}

impl Thresholds {
    fn new(constraints: &ConstraintTable, tier: Tier) -> Self {
        Self {
            min: RolePair::ALL.map(|p| constraints.min_gap(p, tier)),
            target: RolePair::ALL.map(|p| constraints.target_gap(p)),
        }
    }

    /// Admissible when the gap is strictly positive (lightness order matches
    /// polarity) and meets the tier minimum.
    fn admits(&self, pair: RolePair, gap: f32) -> bool {
        gap > 0.0 && gap >= self.min[pair as usize]
    }

    fn deviation(&self, pair: RolePair, gap: f32) -> f32 {
        (gap - self.target[pair as usize]).abs()
    }
}

/// Penalty for hue choices that ignore the photo's dominant hue or scatter
/// the UI anchors around the wheel.
fn hue_penalty(hints: &StructuralHints, quad: [&ColorRecord; 4]) -> f32 {
    let mut penalty = 0.0;

    if let Some((hue, confidence)) = hints.photo_hue {
        if confidence > PHOTO_HUE_MIN_CONFIDENCE {
            let weight = PHOTO_HUE_BASE_WEIGHT
                + PHOTO_HUE_CONFIDENCE_WEIGHT * (2.0 * confidence).min(1.0);
            penalty += weight * hue_distance(quad[0].hue(), hue);
        }
    }

    if let Some(max_dist) = hints.ui_hue_max_dist {
        let mut total = 0.0;
        let mut widest: f32 = 0.0;
        let mut pairs = 0;
        for i in 0..quad.len() {
            for j in (i + 1)..quad.len() {
                let d = hue_distance(quad[i].hue(), quad[j].hue());
                total += d;
                widest = widest.max(d);
                pairs += 1;
            }
        }
        penalty += UI_COHERENCE_WEIGHT * (total / pairs as f32);
        penalty += UI_EXCESS_WEIGHT * (widest - max_dist).max(0.0);
    }

    penalty
}

/// Exhaustive search over one tier's shortlists. Lowest score wins; ties keep
/// the first quadruple found, which the shortlist order makes deterministic.
fn search_tier(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    polarity: Polarity,
    tier: Tier,
) -> Option<StructuralChoice> {
    let (k_bg, k_surface, k_overlay, k_text) = shortlist_sizes(tier);
    let backgrounds = pool.shortlist(Role::Background, k_bg);
    let surfaces = pool.shortlist(Role::Surface, k_surface);
    let overlays = pool.shortlist(Role::Overlay, k_overlay);
    let texts = pool.shortlist(Role::Text, k_text);
    debug!(
        %tier,
        backgrounds = backgrounds.len(),
        surfaces = surfaces.len(),
        overlays = overlays.len(),
        texts = texts.len(),
        "structural shortlists"
    );

    let th = Thresholds::new(constraints, tier);
    let hints = constraints.hints();
    let mut best: Option<(f32, [&ColorRecord; 4])> = None;
    let mut admitted = 0usize;

    for &bg in &backgrounds {
        for &text in &texts {
            if text.color() == bg.color() {
                continue;
            }
            let g_bt = polarity.gap(bg.l(), text.l());
            if !th.admits(RolePair::BackgroundText, g_bt) {
                continue;
            }
            for &surface in &surfaces {
                if surface.color() == bg.color() || surface.color() == text.color() {
                    continue;
                }
                let g_bs = polarity.gap(bg.l(), surface.l());
                if !th.admits(RolePair::BackgroundSurface, g_bs) {
                    continue;
                }
                for &overlay in &overlays {
                    if [bg, surface, text].iter().any(|r| r.color() == overlay.color()) {
                        continue;
                    }
                    let g_so = polarity.gap(surface.l(), overlay.l());
                    let g_ot = polarity.gap(overlay.l(), text.l());
                    if !th.admits(RolePair::SurfaceOverlay, g_so)
                        || !th.admits(RolePair::OverlayText, g_ot)
                    {
                        continue;
                    }
                    admitted += 1;

                    let quad = [bg, surface, overlay, text];
                    let deviation = th.deviation(RolePair::BackgroundSurface, g_bs)
                        + th.deviation(RolePair::SurfaceOverlay, g_so)
                        + th.deviation(RolePair::OverlayText, g_ot)
                        + th.deviation(RolePair::BackgroundText, g_bt);
                    let popularity: f32 = quad
                        .iter()
                        .zip(Role::STRUCTURAL)
                        .map(|(r, role)| r.frequency_for(role))
                        .sum();
                    let score =
                        deviation - POPULARITY_WEIGHT * popularity + hue_penalty(&hints, quad);

                    if best.as_ref().map_or(true, |(s, _)| score < *s) {
                        best = Some((score, quad));
                    }
                }
            }
        }
    }

    debug!(%tier, admitted, "structural search finished");
    best.map(|(score, [bg, surface, overlay, text])| StructuralChoice {
        tier,
        base: bg.clone(),
        surface: surface.clone(),
        overlay: overlay.clone(),
        text: text.clone(),
        score,
    })
}

/// Run the strict pass, then the relaxed pass; the first pass with any
/// admissible quadruple wins. Failing both rejects the palette.
pub fn assign_structural(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    polarity: Polarity,
) -> Result<StructuralChoice, AssignError> {
    for tier in Tier::ALL {
        if let Some(choice) = search_tier(pool, constraints, polarity, tier) {
            info!(
                %tier,
                base = %choice.base.color(),
                surface1 = %choice.surface.color(),
                overlay1 = %choice.overlay.color(),
                text = %choice.text.color(),
                score = choice.score,
                "structural quadruple accepted"
            );
            return Ok(choice);
        }
    }

    let reason = if Role::STRUCTURAL
        .iter()
        .any(|r| pool.members(*r).next().is_none())
    {
        let empty: Vec<&str> = Role::STRUCTURAL
            .iter()
            .filter(|r| pool.members(**r).next().is_none())
            .map(|r| r.as_str())
            .collect();
        format!("no candidates for {}", empty.join(", "))
    } else {
        format!(
            "no quadruple meets the relaxed minimum gaps (background→text ≥ {:.1})",
            constraints.min_gap(RolePair::BackgroundText, Tier::Relaxed)
        )
    };
    Err(AssignError::StructuralInfeasible { polarity, reason })
}

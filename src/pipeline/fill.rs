//! Gap filler: completes every element the structural and accent stages left
//! empty, first from the pool and then by synthesizing new colors.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::{debug, warn};

use crate::color::lch_to_lab;
use crate::constraints::{ConstraintTable, Tier};
use crate::element::{Element, Role};
use crate::error::ConstraintError;
use crate::pipeline::accents::AccentFrame;
use crate::pipeline::assignment::Assignment;
use crate::pool::{by_desirability, CandidatePool};
use crate::record::ColorRecord;

/// A pool candidate qualifies within this many L* of the target.
fn acceptance_window(tier: Tier) -> f32 {
    match tier {
        Tier::Strict => 4.0,
        Tier::Relaxed => 8.0,
    }
}

/// Synthesized accents stay this far inside the accent band.
const BAND_INSET: f32 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct FillReport {
    pub from_pool: Vec<Element>,
    pub synthesized: Vec<Element>,
    pub unfilled: Vec<Element>,
}

/// Per-run context for filling one assignment.
struct Filler<'a> {
    pool: &'a CandidatePool,
    constraints: &'a ConstraintTable,
    frame: AccentFrame,
}

impl Filler<'_> {
    /// `value` clamped into the accent band, inset from both edges.
    fn clamp_to_band(&self, value: f32) -> f32 {
        let (a, b) = self.frame.band();
        let (lo, hi) = (a.min(b) + BAND_INSET, a.max(b) - BAND_INSET);
        if lo > hi {
            return (lo + hi) / 2.0;
        }
        value.clamp(lo, hi)
    }

    /// Push `l` out to the background-separation minimum of a
    /// foreground-safe role, never moving it back past `floor`.
    fn enforce_separation(&self, role: Role, l: f32, floor: f32) -> Result<f32, ConstraintError> {
        if !role.is_foreground_safe() {
            return Ok(l);
        }
        let min = self.constraints.accent_min_separation(role, self.frame.polarity)?;
        if self.frame.separation(l) >= min {
            return Ok(l);
        }
        let forced = self.frame.polarity.step(self.frame.base_l, min);
        let l = if self.frame.polarity.gap(forced, floor) > 0.0 {
            floor
        } else {
            forced
        };
        Ok(l.clamp(0.0, 100.0))
    }

    fn target_l(
        &self,
        element: Element,
        assignment: &Assignment,
    ) -> Result<Option<f32>, ConstraintError> {
        let role = element.role();
        if let Some((anchor, key)) = element.offset_anchor() {
            let Some(anchor) = assignment.get(anchor) else {
                return Ok(None);
            };
            let offset = self
                .constraints
                .element_offset(element)
                .ok_or_else(|| ConstraintError::missing(format!("element_offsets[{key}]")))?;
            return Ok(Some((anchor.l() + offset).clamp(0.0, 100.0)));
        }
        if role.is_accent() {
            let ideal = self.clamp_to_band(self.frame.ideal_l());
            return Ok(Some(self.enforce_separation(role, ideal, ideal)?));
        }
        // Structural anchors are never filled here.
        Ok(None)
    }

    fn pool_candidate(
        &self,
        element: Element,
        target: f32,
        tier: Tier,
        assignment: &Assignment,
    ) -> Result<Option<ColorRecord>, ConstraintError> {
        let role = element.role();
        let window = acceptance_window(tier);
        let min_sep = if role.is_foreground_safe() {
            Some(self.constraints.accent_min_separation(role, self.frame.polarity)?)
        } else {
            None
        };
        let hue_window = self.constraints.hue_window(role).filter(|_| role.is_accent());
        let band = self.constraints.lightness_band(role, tier);

        let distance = |c: &ColorRecord| (c.l() - target).abs();
        Ok(self
            .pool
            .members(role)
            .filter(|c| !assignment.is_used(c.color()))
            .filter(|c| distance(c) <= window)
            .filter(|c| !role.is_accent() || self.frame.in_band(c.l()))
            .filter(|c| band.map_or(true, |(lo, hi)| (lo..=hi).contains(&c.l())))
            .filter(|c| hue_window.map_or(true, |w| w.contains(c.hue(), tier)))
            .filter(|c| min_sep.map_or(true, |m| self.frame.separation(c.l()) >= m))
            .min_by(|x, y| {
                distance(x)
                    .total_cmp(&distance(y))
                    .then(by_desirability(role, x, y))
            })
            .cloned())
    }

    /// Seed color a synthesized element is derived from.
    fn seed<R: Rng + ?Sized>(
        &self,
        element: Element,
        target: f32,
        assignment: &Assignment,
        rng: &mut R,
    ) -> Option<ColorRecord> {
        let role = element.role();
        if let Some((anchor, _)) = element.offset_anchor() {
            let nearest = self.pool.members(role).min_by(|x, y| {
                (x.l() - target)
                    .abs()
                    .total_cmp(&(y.l() - target).abs())
                    .then(by_desirability(role, x, y))
            });
            return nearest.or_else(|| assignment.get(anchor)).cloned();
        }

        let best_unused = self
            .pool
            .members(role)
            .filter(|c| !assignment.is_used(c.color()))
            .min_by(|x, y| by_desirability(role, x, y));
        if let Some(seed) = best_unused {
            return Some(seed.clone());
        }

        // No usable role member: draw any pool color, weighted by frequency.
        let records = self.pool.records();
        if records.is_empty() {
            return None;
        }
        let index = match WeightedIndex::new(records.iter().map(|r| r.frequency)) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.gen_range(0..records.len()),
        };
        debug!(%element, seed = %records[index].color(), "weighted random synthesis seed");
        Some(records[index].clone())
    }

    fn synthesize(
        &self,
        element: Element,
        seed: &ColorRecord,
        target: f32,
        tier: Tier,
    ) -> Result<ColorRecord, ConstraintError> {
        let role = element.role();

        let l = if role.is_accent() {
            let banded = self.clamp_to_band(seed.l());
            self.enforce_separation(role, banded, seed.l())?
        } else {
            target
        };

        let (c_lo, c_hi) = self.constraints.chroma_band(role, tier);
        let chroma = seed.chroma().clamp(c_lo, c_hi.max(c_lo));

        let hue = match self.constraints.hue_window(role) {
            Some(window) => window.clamp(seed.hue(), tier),
            None => seed.hue(),
        };

        Ok(seed.synthesize(lch_to_lab(l, chroma, hue), role))
    }
}

/// Fill every missing non-anchor element. Pool picks are tried in both tiers
/// before any synthesis; synthesis then runs strict, then relaxed. Elements
/// whose color keeps colliding stay empty.
pub fn fill_gaps<R: Rng + ?Sized>(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    assignment: &mut Assignment,
    rng: &mut R,
) -> Result<FillReport, ConstraintError> {
    let mut report = FillReport::default();
    let Some(frame) = AccentFrame::from_assignment(assignment) else {
        report.unfilled = assignment.missing();
        return Ok(report);
    };
    let filler = Filler {
        pool,
        constraints,
        frame,
    };

    'elements: for element in assignment.missing() {
        let Some(target) = filler.target_l(element, assignment)? else {
            report.unfilled.push(element);
            continue;
        };

        for tier in Tier::ALL {
            if let Some(rec) = filler.pool_candidate(element, target, tier, assignment)? {
                if assignment.try_insert(element, rec) {
                    debug!(%element, %tier, target, "filled from pool");
                    report.from_pool.push(element);
                    continue 'elements;
                }
            }
        }

        let Some(seed) = filler.seed(element, target, assignment, rng) else {
            report.unfilled.push(element);
            continue;
        };
        for tier in Tier::ALL {
            let rec = filler.synthesize(element, &seed, target, tier)?;
            if assignment.insert_distinct(element, rec).is_some() {
                debug!(%element, %tier, seed = %seed.color(), "synthesized");
                report.synthesized.push(element);
                continue 'elements;
            }
        }

        warn!(%element, "could not place a distinct color; leaving element unassigned");
        report.unfilled.push(element);
    }

    Ok(report)
}

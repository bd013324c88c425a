//! Accent assigner: chooses each accent role's group of colors as the
//! best-scoring subset of a bounded shortlist.

use tracing::{debug, warn};

use crate::constraints::{ConstraintTable, Tier};
use crate::element::{Element, Polarity, Role};
use crate::error::ConstraintError;
use crate::pipeline::assignment::Assignment;
use crate::pool::{by_desirability, CandidatePool};
use crate::record::ColorRecord;

/// Accents must clear overlay and stay below text by this many L* units.
pub const BAND_MARGIN: f32 = 5.0;
/// Preferred accent lightness sits this far below text.
pub const IDEAL_TEXT_OFFSET: f32 = 30.0;
/// Members closer to text than this (in L*) take a large penalty.
const TEXT_SAFETY_GAP: f32 = 20.0;
const TEXT_SAFETY_PENALTY: f32 = 100.0;
const SOFT_WIDTH: f32 = 12.0;
const SOFT_WEIGHT: f32 = 0.5;

const SCORE_WEIGHT: f32 = 0.6;
const FREQUENCY_WEIGHT: f32 = 2.0;
const RANK_WEIGHT: f32 = 0.5;
/// Proximity penalties apply within this ΔE of text / background.
const PROXIMITY_RADIUS: f32 = 25.0;
const TEXT_PROXIMITY_WEIGHT: f32 = 0.30;
const BASE_PROXIMITY_WEIGHT: f32 = 0.20;

const MAX_SHORTLIST: usize = 80;

/// Shortlist cap for a group of `n` members, keeping C(cap, n) tractable.
fn shortlist_cap(n: usize) -> usize {
    match n {
        0..=2 => MAX_SHORTLIST,
        3..=4 => 60,
        _ => 45,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccentOptions {
    /// Minimum background percentile rank for `accent_cool` candidates.
    pub cool_rank_floor: f32,
}

impl Default for AccentOptions {
    fn default() -> Self {
        Self {
            cool_rank_floor: 0.60,
        }
    }
}

/// Lightness context shared by every accent role in one run.
#[derive(Debug, Clone, Copy)]
pub struct AccentFrame {
    pub polarity: Polarity,
    pub base_l: f32,
    pub overlay_l: f32,
    pub text_l: f32,
}

impl AccentFrame {
    pub fn from_assignment(assignment: &Assignment) -> Option<Self> {
        Some(Self {
            polarity: assignment.polarity(),
            base_l: assignment.get(Element::Base)?.l(),
            overlay_l: assignment.get(Element::Overlay1)?.l(),
            text_l: assignment.get(Element::Text)?.l(),
        })
    }

    /// Strictly between overlay and text, with a margin at both ends.
    pub fn in_band(&self, l: f32) -> bool {
        self.polarity.gap(self.overlay_l, l) > BAND_MARGIN
            && self.polarity.gap(l, self.text_l) > BAND_MARGIN
    }

    /// Band limits as (overlay side, text side).
    pub fn band(&self) -> (f32, f32) {
        (
            self.polarity.step(self.overlay_l, BAND_MARGIN),
            self.polarity.step(self.text_l, -BAND_MARGIN),
        )
    }

    pub fn ideal_l(&self) -> f32 {
        self.polarity.step(self.text_l, -IDEAL_TEXT_OFFSET)
    }

    /// Signed separation from the background (positive on the foreground side).
    pub fn separation(&self, l: f32) -> f32 {
        self.polarity.gap(self.base_l, l)
    }
}

/// Score contribution of a single member, independent of the rest of the
/// subset.
fn member_score(
    role: Role,
    rec: &ColorRecord,
    frame: &AccentFrame,
    text: &ColorRecord,
    base: &ColorRecord,
) -> f32 {
    let mut score =
        SCORE_WEIGHT * rec.score_for(role) + FREQUENCY_WEIGHT * rec.frequency_for(role);

    if let (Some(de), Some(dl)) = (rec.delta_e_bg_rank, rec.abs_delta_l_bg_rank) {
        score += RANK_WEIGHT * (de + dl) / 2.0;
    }

    score -= TEXT_PROXIMITY_WEIGHT * (PROXIMITY_RADIUS - rec.delta_e(text)).max(0.0);
    score -= BASE_PROXIMITY_WEIGHT * (PROXIMITY_RADIUS - rec.delta_e(base)).max(0.0);

    if frame.polarity.gap(rec.l(), frame.text_l) < TEXT_SAFETY_GAP {
        score -= TEXT_SAFETY_PENALTY;
    }

    let dist = (rec.l() - frame.ideal_l()).abs();
    score -= (dist / SOFT_WIDTH).powi(2) * SOFT_WEIGHT;
    score
}

/// Call `f` with every k-subset of `0..n` as ascending indices.
fn for_each_combination(n: usize, k: usize, mut f: impl FnMut(&[usize])) {
    if k == 0 || k > n {
        return;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        f(&idx);
        // Rightmost index that can still advance.
        let Some(i) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return;
        };
        idx[i] += 1;
        for j in (i + 1)..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Best-scoring subset of `size` members, by index into `cands`.
fn best_subset(
    role: Role,
    cands: &[&ColorRecord],
    size: usize,
    frame: &AccentFrame,
    text: &ColorRecord,
    base: &ColorRecord,
) -> Option<Vec<usize>> {
    let n = cands.len();
    let individual: Vec<f32> = cands
        .iter()
        .map(|c| member_score(role, c, frame, text, base))
        .collect();
    let mut dist = vec![0.0f32; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cands[i].delta_e(cands[j]);
            dist[i * n + j] = d;
            dist[j * n + i] = d;
        }
    }

    let mut best: Option<(f32, Vec<usize>)> = None;
    for_each_combination(n, size, |subset| {
        let mut score: f32 = subset.iter().map(|&i| individual[i]).sum();
        for (a, &i) in subset.iter().enumerate() {
            for &j in &subset[a + 1..] {
                score += dist[i * n + j];
            }
        }
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, subset.to_vec()));
        }
    });
    best.map(|(_, subset)| subset)
}

/// Shortlist for one role and tier after every hard gate. Empty when nothing
/// survives.
fn gated_candidates<'a>(
    role: Role,
    tier: Tier,
    members: &[&'a ColorRecord],
    constraints: &ConstraintTable,
    frame: &AccentFrame,
    options: &AccentOptions,
) -> Result<Vec<&'a ColorRecord>, ConstraintError> {
    let needed = role.elements().len();

    let mut cands: Vec<&ColorRecord> = match constraints.hue_window(role) {
        Some(window) => {
            let inside: Vec<&ColorRecord> = members
                .iter()
                .copied()
                .filter(|c| window.contains(c.hue(), tier))
                .collect();
            if inside.is_empty() {
                debug!(%role, %tier, "hue window empty, using the whole role pool");
                members.to_vec()
            } else {
                inside
            }
        }
        None => members.to_vec(),
    };

    cands.retain(|c| frame.in_band(c.l()));

    let min_sep = constraints.accent_min_separation(role, frame.polarity)?;
    let separated: Vec<&ColorRecord> = cands
        .iter()
        .copied()
        .filter(|c| frame.separation(c.l()) >= min_sep)
        .collect();
    if role.is_foreground_safe() || separated.len() >= needed.min(cands.len()) {
        cands = separated;
    }

    if role == Role::AccentCool {
        let floor = options.cool_rank_floor;
        let ranked: Vec<&ColorRecord> = cands
            .iter()
            .copied()
            .filter(|c| {
                c.delta_e_bg_rank.map_or(true, |r| r >= floor)
                    && c.abs_delta_l_bg_rank.map_or(true, |r| r >= floor)
            })
            .collect();
        if ranked.len() >= needed {
            cands = ranked;
        } else {
            debug!(%role, floor, kept = ranked.len(), "rank floor relaxed");
        }
    }

    cands.truncate(shortlist_cap(needed));
    Ok(cands)
}

/// What the accent stage managed, per role.
#[derive(Debug, Clone, Default)]
pub struct AccentReport {
    pub assigned: Vec<Element>,
    pub unassigned: Vec<Element>,
}

/// Fill every accent role from the pool. A role whose gates leave nothing
/// stays unassigned; that is never fatal.
pub fn assign_accents(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    assignment: &mut Assignment,
    options: &AccentOptions,
) -> Result<AccentReport, ConstraintError> {
    let mut report = AccentReport::default();
    let (Some(frame), Some(text), Some(base)) = (
        AccentFrame::from_assignment(assignment),
        assignment.get(Element::Text).cloned(),
        assignment.get(Element::Base).cloned(),
    ) else {
        report.unassigned = Role::ACCENTS.iter().flat_map(|r| r.elements()).copied().collect();
        return Ok(report);
    };

    for role in Role::ACCENTS {
        let elements = role.elements();
        let mut members: Vec<&ColorRecord> = pool
            .members(role)
            .filter(|c| !assignment.is_used(c.color()))
            .collect();
        members.sort_by(|x, y| by_desirability(role, x, y));

        let mut chosen: Option<(Tier, Vec<ColorRecord>)> = None;
        for tier in Tier::ALL {
            let cands = gated_candidates(role, tier, &members, constraints, &frame, options)?;
            if cands.is_empty() {
                debug!(%role, %tier, "no accent candidates survive the gates");
                continue;
            }
            let size = elements.len().min(cands.len());
            if let Some(subset) = best_subset(role, &cands, size, &frame, &text, &base) {
                let mut picked: Vec<ColorRecord> =
                    subset.into_iter().map(|i| cands[i].clone()).collect();
                picked.sort_by(|x, y| x.hue().total_cmp(&y.hue()));
                chosen = Some((tier, picked));
                break;
            }
        }

        let Some((tier, picked)) = chosen else {
            warn!(%role, "no admissible accent group; leaving role to the gap filler");
            report.unassigned.extend_from_slice(elements);
            continue;
        };

        debug!(%role, %tier, count = picked.len(), "accent group chosen");
        let mut picked = picked.into_iter();
        for &element in elements {
            let placed = match picked.next() {
                Some(rec) => assignment.try_insert(element, rec),
                None => false,
            };
            if placed {
                report.assigned.push(element);
            } else {
                report.unassigned.push(element);
            }
        }
    }

    Ok(report)
}

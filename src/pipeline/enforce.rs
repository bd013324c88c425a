//! Global enforcement pass and invariant checks over a finished assignment.

use std::fmt;

use palette::Lab;
use tracing::{debug, warn};

use crate::color::Color;
use crate::constraints::{ConstraintTable, Tier};
use crate::element::{Element, Polarity, Role, RolePair};
use crate::error::ConstraintError;
use crate::pipeline::assignment::Assignment;

/// Minimum lightness step between consecutive structural anchors.
pub const ORDER_EPSILON: f32 = 1.0;
/// Pushed values land this far past a threshold so float noise cannot
/// undo the fix.
const PUSH_MARGIN: f32 = 0.05;
/// Slack allowed by [`verify`] when comparing against thresholds.
const TOLERANCE: f32 = 1e-3;

/// A broken invariant of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    Missing(Element),
    Duplicate {
        first: Element,
        second: Element,
        color: Color,
    },
    Ordering {
        pair: RolePair,
        gap: f32,
        min: f32,
    },
    ForegroundUnsafe {
        element: Element,
        separation: f32,
        min: f32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing(e) => write!(f, "{e} is unassigned"),
            Violation::Duplicate {
                first,
                second,
                color,
            } => write!(f, "{first} and {second} share {color}"),
            Violation::Ordering { pair, gap, min } => {
                write!(f, "{pair} gap {gap:.2} is below {min:.2}")
            }
            Violation::ForegroundUnsafe {
                element,
                separation,
                min,
            } => write!(
                f,
                "{element} sits {separation:.2} L* from base, needs {min:.2}"
            ),
        }
    }
}

/// Elements the enforcement pass touched.
#[derive(Debug, Clone, Default)]
pub struct EnforceReport {
    pub adjusted: Vec<Element>,
    pub failed: Vec<Element>,
}

fn accepted_tier(assignment: &Assignment) -> Tier {
    assignment.structural_tier().unwrap_or(Tier::Relaxed)
}

/// Move `element` to lightness `l`, keeping its chromatic axes.
fn relight(assignment: &mut Assignment, element: Element, l: f32, report: &mut EnforceReport) {
    let Some(rec) = assignment.get(element) else {
        return;
    };
    if (rec.l() - l).abs() < 1e-4 {
        return;
    }
    let moved = rec.synthesize(Lab::new(l, rec.a(), rec.b()), element.role());
    debug!(%element, from = rec.l(), to = l, "enforcement moved lightness");
    if assignment.replace_distinct(element, moved).is_some() {
        report.adjusted.push(element);
    } else {
        report.failed.push(element);
    }
}

/// Anchor lightness values after restoring order and the accepted tier's gaps.
/// Base never moves; surface, overlay and text are pushed toward the
/// foreground side as needed.
fn enforced_anchor_lightness(
    polarity: Polarity,
    constraints: &ConstraintTable,
    tier: Tier,
    [lb, ls, lo, lt]: [f32; 4],
) -> [f32; 4] {
    let p = polarity;
    let (mut ls, mut lo, mut lt) = (ls, lo, lt);

    if p.gap(lb, ls) < ORDER_EPSILON {
        ls = p.step(lb, ORDER_EPSILON);
    }
    if p.gap(ls, lo) < ORDER_EPSILON {
        lo = p.step(ls, ORDER_EPSILON);
    }
    if p.gap(lo, lt) < ORDER_EPSILON {
        lt = p.step(lo, ORDER_EPSILON);
    }

    let need = |pair: RolePair| constraints.min_gap(pair, tier);
    if p.gap(lb, lt) < need(RolePair::BackgroundText) {
        lt = p.step(lb, need(RolePair::BackgroundText) + PUSH_MARGIN);
    }
    if p.gap(lb, ls) < need(RolePair::BackgroundSurface) {
        ls = p.step(lb, need(RolePair::BackgroundSurface) + PUSH_MARGIN);
    }
    if p.gap(ls, lo) < need(RolePair::SurfaceOverlay) {
        lo = p.step(ls, need(RolePair::SurfaceOverlay) + PUSH_MARGIN);
    }
    if p.gap(lo, lt) < need(RolePair::OverlayText) {
        lt = p.step(lo, need(RolePair::OverlayText) + PUSH_MARGIN);
    }

    [lb, ls, lo, lt].map(|l| l.clamp(0.0, 100.0))
}

/// Re-impose the structural ordering and gaps, then the background
/// separation of every foreground-safe accent (against the possibly moved
/// background).
pub fn enforce(
    constraints: &ConstraintTable,
    assignment: &mut Assignment,
) -> Result<EnforceReport, ConstraintError> {
    let mut report = EnforceReport::default();
    let polarity = assignment.polarity();
    let tier = accepted_tier(assignment);

    let anchors = Element::ANCHORS.map(|e| assignment.get(e).map(|r| r.l()));
    if let [Some(lb), Some(ls), Some(lo), Some(lt)] = anchors {
        let fixed = enforced_anchor_lightness(polarity, constraints, tier, [lb, ls, lo, lt]);
        for (element, l) in Element::ANCHORS.into_iter().zip(fixed) {
            relight(assignment, element, l, &mut report);
        }
    }

    if let Some(base_l) = assignment.get(Element::Base).map(|r| r.l()) {
        for role in Role::ACCENTS.into_iter().filter(|r| r.is_foreground_safe()) {
            let min = constraints.accent_min_separation(role, polarity)?;
            for &element in role.elements() {
                let Some(l) = assignment.get(element).map(|r| r.l()) else {
                    continue;
                };
                if polarity.gap(base_l, l) < min {
                    let target = polarity.step(base_l, min + PUSH_MARGIN).clamp(0.0, 100.0);
                    relight(assignment, element, target, &mut report);
                }
            }
        }
    }

    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "enforcement could not place some adjusted colors");
    }
    Ok(report)
}

/// Every invariant violation of `assignment`, in a stable order.
pub fn verify(constraints: &ConstraintTable, assignment: &Assignment) -> Vec<Violation> {
    let mut violations: Vec<Violation> =
        assignment.missing().into_iter().map(Violation::Missing).collect();

    let assigned: Vec<_> = assignment.iter().collect();
    for (i, (first, a)) in assigned.iter().enumerate() {
        for (second, b) in &assigned[i + 1..] {
            if a.color() == b.color() {
                violations.push(Violation::Duplicate {
                    first: *first,
                    second: *second,
                    color: a.color(),
                });
            }
        }
    }

    let polarity = assignment.polarity();
    let tier = accepted_tier(assignment);
    for pair in RolePair::ALL {
        let (from, to) = pair.elements();
        if let (Some(from), Some(to)) = (assignment.get(from), assignment.get(to)) {
            let gap = polarity.gap(from.l(), to.l());
            let min = constraints.min_gap(pair, tier);
            if gap <= 0.0 || gap < min - TOLERANCE {
                violations.push(Violation::Ordering { pair, gap, min });
            }
        }
    }

    if let Some(base) = assignment.get(Element::Base) {
        for role in Role::ACCENTS.into_iter().filter(|r| r.is_foreground_safe()) {
            let Ok(min) = constraints.accent_min_separation(role, polarity) else {
                continue;
            };
            for &element in role.elements() {
                if let Some(rec) = assignment.get(element) {
                    let separation = polarity.gap(base.l(), rec.l());
                    if separation < min - TOLERANCE {
                        violations.push(Violation::ForegroundUnsafe {
                            element,
                            separation,
                            min,
                        });
                    }
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{gamut_map, lch_to_lab};
    use crate::constraints::fixtures::dark_table_json;
    use crate::element::RoleSet;
    use crate::record::ColorRecord;

    fn table() -> ConstraintTable {
        ConstraintTable::from_json_str(&dark_table_json().to_string()).unwrap()
    }

    fn lch(l: f32, c: f32, h: f32, role: Role) -> ColorRecord {
        let lab = gamut_map(lch_to_lab(l, c, h));
        ColorRecord::sampled(Color::from_lab(lab), lab, 0.05, 0.5, RoleSet::single(role))
    }

    fn anchors(polarity: Polarity, ls: [f32; 4]) -> Assignment {
        let mut a = Assignment::new(polarity);
        for (element, l) in Element::ANCHORS.into_iter().zip(ls) {
            a.try_insert(element, lch(l, 5.0, 270.0, element.role()));
        }
        a.set_structural_tier(Tier::Strict);
        a
    }

    fn non_missing(v: Vec<Violation>) -> Vec<Violation> {
        v.into_iter()
            .filter(|v| !matches!(v, Violation::Missing(_)))
            .collect()
    }

    #[test]
    fn dark_cool_accent_is_lifted_past_the_minimum() {
        let t = table();
        let mut a = anchors(Polarity::Dark, [12.0, 24.0, 42.0, 88.0]);
        a.try_insert(Element::Blue, lch(50.0, 35.0, 230.0, Role::AccentCool));
        assert!(!non_missing(verify(&t, &a)).is_empty());

        let report = enforce(&t, &mut a).unwrap();
        assert_eq!(report.adjusted, vec![Element::Blue]);
        let blue = a.get(Element::Blue).unwrap();
        assert!(blue.l() - 12.0 >= 48.0);
        assert!(blue.derived);
        assert!(non_missing(verify(&t, &a)).is_empty());
    }

    #[test]
    fn light_accent_is_pushed_darker() {
        let t = table();
        let mut a = anchors(Polarity::Light, [95.0, 85.0, 68.0, 30.0]);
        a.try_insert(Element::Mauve, lch(70.0, 35.0, 300.0, Role::AccentBridge));
        enforce(&t, &mut a).unwrap();
        // Light bridge minimum is 33 below base.
        assert!(95.0 - a.get(Element::Mauve).unwrap().l() >= 33.0);
    }

    #[test]
    fn structural_gaps_are_restored() {
        let t = table();
        // base→surface gap of 3 is below the strict minimum of 8.
        let mut a = anchors(Polarity::Dark, [12.0, 15.0, 42.0, 88.0]);
        assert!(matches!(
            non_missing(verify(&t, &a)).as_slice(),
            [Violation::Ordering {
                pair: RolePair::BackgroundSurface,
                ..
            }]
        ));

        let report = enforce(&t, &mut a).unwrap();
        assert_eq!(report.adjusted, vec![Element::Surface1]);
        assert!((a.get(Element::Surface1).unwrap().l() - 20.05).abs() < 1e-3);
        assert_eq!(a.get(Element::Base).unwrap().l(), 12.0);
        assert!(non_missing(verify(&t, &a)).is_empty());
    }

    #[test]
    fn ordering_cascade() {
        let t = table();
        let [lb, ls, lo, lt] =
            enforced_anchor_lightness(Polarity::Dark, &t, Tier::Strict, [20.0, 18.0, 17.0, 40.0]);
        assert_eq!(lb, 20.0);
        assert!(ls - lb >= 8.0);
        assert!(lo - ls >= 10.0);
        assert!(lt - lo >= 18.0);
        assert!(lt - lb >= 50.0);
    }

    #[test]
    fn verify_reports_missing_elements() {
        let t = table();
        let a = anchors(Polarity::Dark, [12.0, 24.0, 42.0, 88.0]);
        let missing = verify(&t, &a)
            .into_iter()
            .filter(|v| matches!(v, Violation::Missing(_)))
            .count();
        assert_eq!(missing, Element::COUNT - 4);
        assert_eq!(
            Violation::Missing(Element::Mauve).to_string(),
            "mauve is unassigned"
        );
    }
}

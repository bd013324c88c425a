//! Relaxation controller: runs the structural, accent and gap-filling stages
//! in order, then the global enforcement pass.

pub mod accents;
pub mod assignment;
pub mod enforce;
pub mod fill;
pub mod structural;

use std::borrow::Cow;

use rand::Rng;
use tracing::{info, warn};

use crate::constraints::{ConstraintTable, Tier};
use crate::element::{Element, Polarity, Role};
use crate::error::AssignError;
use crate::pool::CandidatePool;

pub use accents::AccentOptions;
pub use assignment::Assignment;
pub use enforce::Violation;

/// Run-level settings that are not learned from the constraint table.
#[derive(Debug, Clone)]
pub struct AssignOptions {
    /// Forces the theme polarity instead of reading or inferring it.
    pub polarity: Option<Polarity>,
    /// Run the gap filler and enforcement pass after the accent stage.
    pub fill: bool,
    pub accents: AccentOptions,
}

impl Default for AssignOptions {
    fn default() -> Self {
        Self {
            polarity: None,
            fill: true,
            accents: AccentOptions::default(),
        }
    }
}

/// Result of a run that was not rejected outright.
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub palette: String,
    pub assignment: Assignment,
    /// Invariant violations other than unassigned elements.
    pub violations: Vec<Violation>,
}

impl AssignmentOutcome {
    pub fn polarity(&self) -> Polarity {
        self.assignment.polarity()
    }

    pub fn structural_tier(&self) -> Option<Tier> {
        self.assignment.structural_tier()
    }

    pub fn missing(&self) -> Vec<Element> {
        self.assignment.missing()
    }

    pub fn is_complete(&self) -> bool {
        self.assignment.is_complete()
    }
}

/// Polarity precedence: explicit override, then the constraint table, then
/// the median lightness of background candidates.
pub fn resolve_polarity(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    options: &AssignOptions,
) -> Polarity {
    options
        .polarity
        .or_else(|| constraints.polarity())
        .or_else(|| {
            pool.median_lightness(Role::Background)
                .map(Polarity::from_background_lightness)
        })
        .unwrap_or(Polarity::Dark)
}

/// Assign every element of a theme from `pool` under `constraints`.
///
/// Structural infeasibility and malformed constraints are errors; anything
/// else that cannot be filled is reported through
/// [`AssignmentOutcome::missing`].
pub fn run<R: Rng + ?Sized>(
    pool: &CandidatePool,
    constraints: &ConstraintTable,
    options: &AssignOptions,
    rng: &mut R,
) -> Result<AssignmentOutcome, AssignError> {
    let polarity = resolve_polarity(pool, constraints, options);
    constraints.ensure_ready(polarity)?;
    info!(%polarity, candidates = pool.len(), "assignment run started");

    let choice = structural::assign_structural(pool, constraints, polarity)?;
    let mut assignment = Assignment::new(polarity);
    assignment.set_structural_tier(choice.tier);
    for (element, rec) in Element::ANCHORS
        .into_iter()
        .zip([&choice.base, &choice.surface, &choice.overlay, &choice.text])
    {
        assignment.try_insert(element, rec.clone());
    }

    let pool: Cow<'_, CandidatePool> = if pool.has_background_ranks() {
        Cow::Borrowed(pool)
    } else {
        Cow::Owned(pool.with_background_ranks(&choice.base))
    };

    let accents = accents::assign_accents(&pool, constraints, &mut assignment, &options.accents)?;
    info!(
        assigned = accents.assigned.len(),
        unassigned = accents.unassigned.len(),
        "accent stage finished"
    );

    if options.fill {
        let filled = fill::fill_gaps(&pool, constraints, &mut assignment, rng)?;
        info!(
            from_pool = filled.from_pool.len(),
            synthesized = filled.synthesized.len(),
            unfilled = filled.unfilled.len(),
            "gap filling finished"
        );
        enforce::enforce(constraints, &mut assignment)?;
    }

    let violations: Vec<Violation> = enforce::verify(constraints, &assignment)
        .into_iter()
        .filter(|v| !matches!(v, Violation::Missing(_)))
        .collect();
    for v in &violations {
        warn!(violation = %v, "assignment invariant violated");
    }

    let missing = assignment.missing();
    if !missing.is_empty() {
        warn!(?missing, "elements left unassigned");
    }
    info!(
        assigned = assignment.len(),
        missing = missing.len(),
        "assignment run finished"
    );

    Ok(AssignmentOutcome {
        palette: constraints.palette().unwrap_or("custom").to_string(),
        assignment,
        violations,
    })
}

use thiserror::Error;

use crate::element::Polarity;

/// Malformed or incomplete constraint table.
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("constraint table is missing {field}")]
    Missing { field: String },

    #[error("constraint {field} is invalid: {reason}")]
    Invalid { field: String, reason: String },

    #[error("palette {0:?} not present in constraint document")]
    UnknownPalette(String),

    #[error("constraint JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConstraintError {
    pub fn missing(field: impl Into<String>) -> Self {
        ConstraintError::Missing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConstraintError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Malformed candidate pool input.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("candidate pool is missing required column {0:?}")]
    MissingColumn(&'static str),

    #[error("line {line}: column {column:?} has unparsable value {value:?}")]
    Parse {
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("line {line}: unknown role {role:?}")]
    UnknownRole { line: usize, role: String },

    #[error("line {line}: {field} = {value} is outside {range}")]
    OutOfRange {
        line: usize,
        field: &'static str,
        value: f32,
        range: &'static str,
    },

    #[error("line {line}: expected {expected} fields, found {found}")]
    RowWidth {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("candidate pool is empty")]
    Empty,

    #[error("candidate pool JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal outcomes of an assignment run.
#[derive(Debug, Error)]
pub enum AssignError {
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("rejected palette: no readable {polarity} structural configuration found ({reason})")]
    StructuralInfeasible { polarity: Polarity, reason: String },
}

use std::path::Path;

use anyhow::{Context, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::constraints::Tier;
use crate::element::{Element, Polarity};
use crate::pipeline::{Assignment, AssignmentOutcome};

/// Serializable view of a finished run:
/// `{palette, polarity, structural_tier, assigned, missing}`.
#[derive(Serialize)]
pub struct ThemeDocument<'a> {
    palette: &'a str,
    polarity: Polarity,
    structural_tier: Option<Tier>,
    assigned: AssignedMap<'a>,
    missing: Vec<Element>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
}

/// Assigned elements keyed by name, in canonical element order.
struct AssignedMap<'a>(&'a Assignment);

impl Serialize for AssignedMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (element, record) in self.0.iter() {
            map.serialize_entry(element.as_str(), record)?;
        }
        map.end()
    }
}

impl<'a> ThemeDocument<'a> {
    pub fn from_outcome(outcome: &'a AssignmentOutcome) -> Self {
        Self {
            palette: &outcome.palette,
            polarity: outcome.polarity(),
            structural_tier: outcome.structural_tier(),
            assigned: AssignedMap(&outcome.assignment),
            missing: outcome.missing(),
            violations: outcome.violations.iter().map(ToString::to_string).collect(),
        }
    }

    /// Pretty-printed JSON, newline-terminated.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).context("failed to serialize theme")?;
        json.push('\n');
        Ok(json)
    }

    /// Write the JSON document to an arbitrary path.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write theme: {}", path.display()))
    }
}

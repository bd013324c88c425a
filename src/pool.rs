//! Candidate pool: the sampled colors a theme may be built from.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use palette::Lab;
use serde::Deserialize;

use crate::color::{self, Color};
use crate::element::{Role, RoleSet};
use crate::error::PoolError;
use crate::record::ColorRecord;

const REQUIRED_COLUMNS: [&str; 11] = [
    "R", "G", "B", "L", "a", "b", "chroma", "hue", "frequency", "role", "score",
];

/// Read-only collection of candidates, one per distinct hex.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    records: Vec<ColorRecord>,
}

/// One validated input row before rows sharing a color are merged.
struct Row {
    line: usize,
    color: Color,
    lab: Lab,
    frequency: f32,
    score: f32,
    roles: RoleSet,
    delta_e_bg_rank: Option<f32>,
    abs_delta_l_bg_rank: Option<f32>,
}

#[allow(non_snake_case)]
#[derive(Debug, Deserialize)]
struct JsonRow {
    R: f32,
    G: f32,
    B: f32,
    L: f32,
    a: f32,
    b: f32,
    frequency: f32,
    score: f32,
    role: RoleField,
    #[serde(rename = "deltaE_bg_rank")]
    delta_e_bg_rank: Option<f32>,
    #[serde(rename = "abs_deltaL_bg_rank")]
    abs_delta_l_bg_rank: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoleField {
    One(String),
    Many(Vec<String>),
}

fn channel(line: usize, field: &'static str, v: f32) -> Result<u8, PoolError> {
    if !(0.0..=255.0).contains(&v) || v.fract() != 0.0 {
        return Err(PoolError::OutOfRange {
            line,
            field,
            value: v,
            range: "integer 0..=255",
        });
    }
    Ok(v as u8)
}

fn check_range(
    line: usize,
    field: &'static str,
    v: f32,
    lo: f32,
    hi: f32,
    range: &'static str,
) -> Result<f32, PoolError> {
    if v.is_finite() && v >= lo && v <= hi {
        Ok(v)
    } else {
        Err(PoolError::OutOfRange {
            line,
            field,
            value: v,
            range,
        })
    }
}

fn parse_roles(line: usize, text: &str) -> Result<RoleSet, PoolError> {
    let mut roles = RoleSet::default();
    for part in text.split(['|', ';']).map(str::trim).filter(|p| !p.is_empty()) {
        let role = part.parse::<Role>().map_err(|_| PoolError::UnknownRole {
            line,
            role: part.to_string(),
        })?;
        roles.insert(role);
    }
    if roles.is_empty() {
        return Err(PoolError::UnknownRole {
            line,
            role: text.to_string(),
        });
    }
    Ok(roles)
}

impl Row {
    #[allow(clippy::too_many_arguments)]
    fn validate(
        line: usize,
        rgb: [f32; 3],
        lab: [f32; 3],
        frequency: f32,
        score: f32,
        roles: RoleSet,
        ranks: (Option<f32>, Option<f32>),
    ) -> Result<Self, PoolError> {
        let color = Color::new(
            channel(line, "R", rgb[0])?,
            channel(line, "G", rgb[1])?,
            channel(line, "B", rgb[2])?,
        );
        let l = check_range(line, "L", lab[0], 0.0, 100.0, "[0, 100]")?;
        let a = check_range(line, "a", lab[1], -200.0, 200.0, "[-200, 200]")?;
        let b = check_range(line, "b", lab[2], -200.0, 200.0, "[-200, 200]")?;
        let frequency = check_range(line, "frequency", frequency, 0.0, 1.0, "[0, 1]")?;
        let score = check_range(line, "score", score, f32::MIN, f32::MAX, "finite values")?;
        let delta_e_bg_rank = ranks
            .0
            .map(|r| check_range(line, "deltaE_bg_rank", r, 0.0, 1.0, "[0, 1]"))
            .transpose()?;
        let abs_delta_l_bg_rank = ranks
            .1
            .map(|r| check_range(line, "abs_deltaL_bg_rank", r, 0.0, 1.0, "[0, 1]"))
            .transpose()?;
        Ok(Self {
            line,
            color,
            lab: Lab::new(l, a, b),
            frequency,
            score,
            roles,
            delta_e_bg_rank,
            abs_delta_l_bg_rank,
        })
    }
}

/// Percentile rank of each value (ties share their average rank), in (0, 1].
fn percentile_ranks(values: &[f32]) -> Vec<f32> {
    let n = values.len() as f32;
    values
        .iter()
        .map(|v| {
            let below = values.iter().filter(|x| *x < v).count() as f32;
            let equal = values.iter().filter(|x| *x == v).count() as f32;
            (below + (equal + 1.0) / 2.0) / n
        })
        .collect()
}

/// Candidate ordering used by every shortlist for `role`: higher score for
/// that role, then higher frequency, then hex for a stable tie-break.
pub fn by_desirability(role: Role, x: &ColorRecord, y: &ColorRecord) -> Ordering {
    y.score_for(role)
        .total_cmp(&x.score_for(role))
        .then(y.frequency_for(role).total_cmp(&x.frequency_for(role)))
        .then(x.color().cmp(&y.color()))
}

impl CandidatePool {
    /// Build a pool from already-typed records, merging records that share
    /// a color.
    pub fn new(records: Vec<ColorRecord>) -> Result<Self, PoolError> {
        if records.is_empty() {
            return Err(PoolError::Empty);
        }
        let mut index: HashMap<Color, usize> = HashMap::new();
        let mut merged: Vec<ColorRecord> = Vec::with_capacity(records.len());
        for rec in records {
            match index.get(&rec.color()) {
                Some(&i) => merged[i].merge(&rec),
                None => {
                    index.insert(rec.color(), merged.len());
                    merged.push(rec);
                }
            }
        }
        Ok(Self { records: merged })
    }

    fn from_rows(rows: Vec<Row>) -> Result<Self, PoolError> {
        let records = rows
            .into_iter()
            .map(|row| {
                tracing::trace!(line = row.line, color = %row.color, "pool row");
                let mut rec =
                    ColorRecord::sampled(row.color, row.lab, row.frequency, row.score, row.roles);
                rec.delta_e_bg_rank = row.delta_e_bg_rank;
                rec.abs_delta_l_bg_rank = row.abs_delta_l_bg_rank;
                rec
            })
            .collect();
        Self::new(records)
    }

    /// Parse the tabular pool format: a header row naming the columns, then
    /// one comma-separated row per (color, role). Unknown columns are ignored.
    pub fn from_csv_str(text: &str) -> Result<Self, PoolError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (_, header) = lines.next().ok_or(PoolError::Empty)?;
        let header: Vec<&str> = header.split(',').map(str::trim).collect();
        let column = |name: &'static str| header.iter().position(|h| *h == name);
        let mut required = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = column(name).ok_or(PoolError::MissingColumn(name))?;
        }
        let [r_col, g_col, b_col, l_col, a_col, lab_b_col, chroma_col, hue_col, freq_col, role_col, score_col] =
            required;
        let de_rank_col = column("deltaE_bg_rank");
        let dl_rank_col = column("abs_deltaL_bg_rank");

        let mut rows = Vec::new();
        for (line, text) in lines {
            let fields: Vec<&str> = text.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                return Err(PoolError::RowWidth {
                    line,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            let num = |idx: usize, name: &'static str| -> Result<f32, PoolError> {
                fields[idx].parse::<f32>().map_err(|_| PoolError::Parse {
                    line,
                    column: name,
                    value: fields[idx].to_string(),
                })
            };
            let opt = |idx: Option<usize>, name: &'static str| -> Result<Option<f32>, PoolError> {
                match idx {
                    Some(i) if !fields[i].is_empty() && fields[i] != "NaN" => num(i, name).map(Some),
                    _ => Ok(None),
                }
            };
            // Chroma and hue are re-derived from (a, b); the columns must still parse.
            num(chroma_col, "chroma")?;
            num(hue_col, "hue")?;
            rows.push(Row::validate(
                line,
                [num(r_col, "R")?, num(g_col, "G")?, num(b_col, "B")?],
                [num(l_col, "L")?, num(a_col, "a")?, num(lab_b_col, "b")?],
                num(freq_col, "frequency")?,
                num(score_col, "score")?,
                parse_roles(line, fields[role_col])?,
                (
                    opt(de_rank_col, "deltaE_bg_rank")?,
                    opt(dl_rank_col, "abs_deltaL_bg_rank")?,
                ),
            )?);
        }
        Self::from_rows(rows)
    }

    /// Parse a JSON array of row objects carrying the same fields as the CSV
    /// columns. `role` may be a single name or a list.
    pub fn from_json_str(text: &str) -> Result<Self, PoolError> {
        let raw: Vec<JsonRow> = serde_json::from_str(text)?;
        let mut rows = Vec::with_capacity(raw.len());
        for (i, r) in raw.into_iter().enumerate() {
            let line = i + 1;
            let roles = match &r.role {
                RoleField::One(s) => parse_roles(line, s)?,
                RoleField::Many(list) => {
                    let mut set = RoleSet::default();
                    for s in list {
                        set = set.union(parse_roles(line, s)?);
                    }
                    set
                }
            };
            rows.push(Row::validate(
                line,
                [r.R, r.G, r.B],
                [r.L, r.a, r.b],
                r.frequency,
                r.score,
                roles,
                (r.delta_e_bg_rank, r.abs_delta_l_bg_rank),
            )?);
        }
        Self::from_rows(rows)
    }

    /// Load a pool file; `.json` files use the JSON layout, anything else is
    /// read as CSV.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read candidate pool: {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let pool = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_csv_str(&text)
        };
        pool.with_context(|| format!("invalid candidate pool: {}", path.display()))
    }

    pub fn records(&self) -> &[ColorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every candidate eligible for `role`, in input order.
    pub fn members(&self, role: Role) -> impl Iterator<Item = &ColorRecord> {
        self.records.iter().filter(move |r| r.is_eligible(role))
    }

    /// The `k` most desirable candidates for `role`.
    pub fn shortlist(&self, role: Role, k: usize) -> Vec<&ColorRecord> {
        let mut members: Vec<&ColorRecord> = self.members(role).collect();
        members.sort_by(|x, y| by_desirability(role, x, y));
        members.truncate(k);
        members
    }

    /// Median L* of the candidates eligible for `role`.
    pub fn median_lightness(&self, role: Role) -> Option<f32> {
        let mut ls: Vec<f32> = self.members(role).map(ColorRecord::l).collect();
        if ls.is_empty() {
            return None;
        }
        ls.sort_by(f32::total_cmp);
        let mid = ls.len() / 2;
        Some(if ls.len() % 2 == 0 {
            (ls[mid - 1] + ls[mid]) / 2.0
        } else {
            ls[mid]
        })
    }

    pub fn has_background_ranks(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.delta_e_bg_rank.is_some() && r.abs_delta_l_bg_rank.is_some())
    }

    /// Copy of the pool whose missing background ranks are filled in as
    /// percentile ranks of ΔE and |ΔL| against `base`. Ranks already present
    /// in the input are kept.
    pub fn with_background_ranks(&self, base: &ColorRecord) -> Self {
        let de: Vec<f32> = self
            .records
            .iter()
            .map(|r| color::delta_e(r.lab(), base.lab()))
            .collect();
        let dl: Vec<f32> = self.records.iter().map(|r| (r.l() - base.l()).abs()).collect();
        let de_rank = percentile_ranks(&de);
        let dl_rank = percentile_ranks(&dl);

        let records = self
            .records
            .iter()
            .zip(de_rank.into_iter().zip(dl_rank))
            .map(|(r, (de, dl))| {
                let mut r = r.clone();
                r.delta_e_bg_rank = r.delta_e_bg_rank.or(Some(de));
                r.abs_delta_l_bg_rank = r.abs_delta_l_bg_rank.or(Some(dl));
                r
            })
            .collect();
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "R,G,B,L,a,b,chroma,hue,frequency,role,score";

    fn row(color: Color, freq: f32, role: &str, score: f32) -> String {
        let lab = color.to_lab();
        let (_, c, h) = color::lab_to_lch(lab);
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            color.r, color.g, color.b, lab.l, lab.a, lab.b, c, h, freq, role, score
        )
    }

    #[test]
    fn parses_csv_and_merges_roles() {
        let blue = Color::new(137, 180, 250);
        let text = [
            HEADER.to_string(),
            row(blue, 0.1, "accent_cool", 0.5),
            row(Color::new(30, 30, 46), 0.4, "background", 0.9),
            row(blue, 0.3, "accent_bridge", 0.2),
        ]
        .join("\n");
        let pool = CandidatePool::from_csv_str(&text).unwrap();
        assert_eq!(pool.len(), 2);
        let merged = &pool.records()[0];
        assert_eq!(merged.color(), blue);
        assert!(merged.is_eligible(Role::AccentCool));
        assert!(merged.is_eligible(Role::AccentBridge));
        assert_eq!(merged.frequency, 0.3);
        assert_eq!(merged.score, 0.5);
        assert_eq!(merged.score_for(Role::AccentCool), 0.5);
        assert_eq!(merged.score_for(Role::AccentBridge), 0.2);
        assert_eq!(merged.frequency_for(Role::AccentCool), 0.1);
    }

    #[test]
    fn shortlist_ranks_by_the_role_score() {
        // One color sampled twice: a poor background and a strong red.
        let dual = Color::new(27, 32, 40);
        let plain = Color::new(30, 30, 46);
        let text = [
            HEADER.to_string(),
            row(dual, 0.2, "background", 0.1),
            row(dual, 0.2, "accent_red", 0.9),
            row(plain, 0.2, "background", 0.5),
        ]
        .join("\n");
        let pool = CandidatePool::from_csv_str(&text).unwrap();
        assert_eq!(pool.len(), 2);

        let top = pool.shortlist(Role::Background, 1);
        assert_eq!(top[0].color(), plain);
        assert_eq!(pool.shortlist(Role::AccentRed, 1)[0].color(), dual);
    }

    #[test]
    fn csv_column_order_is_free() {
        let text = "role,score,frequency,hue,chroma,b,a,L,B,G,R,deltaE_bg_rank\n\
                    text,0.5,0.2,0,0,0,0,95,240,240,240,0.9\n";
        let pool = CandidatePool::from_csv_str(text).unwrap();
        let rec = &pool.records()[0];
        assert_eq!(rec.color(), Color::new(240, 240, 240));
        assert_eq!(rec.delta_e_bg_rank, Some(0.9));
        assert_eq!(rec.abs_delta_l_bg_rank, None);
        assert!(!pool.has_background_ranks());
    }

    #[test]
    fn csv_errors_name_the_problem() {
        let missing = "R,G,B,L,a,b,chroma,hue,frequency,score\n1,2,3,4,5,6,7,8,0.1,0.5\n";
        assert!(matches!(
            CandidatePool::from_csv_str(missing),
            Err(PoolError::MissingColumn("role"))
        ));

        let bad_role = format!("{HEADER}\n1,2,3,4,5,6,7,8,0.1,accent_purple,0.5\n");
        assert!(matches!(
            CandidatePool::from_csv_str(&bad_role),
            Err(PoolError::UnknownRole { line: 2, .. })
        ));

        let bad_freq = format!("{HEADER}\n1,2,3,4,5,6,7,8,1.5,text,0.5\n");
        assert!(matches!(
            CandidatePool::from_csv_str(&bad_freq),
            Err(PoolError::OutOfRange { field: "frequency", .. })
        ));

        let bad_num = format!("{HEADER}\n1,2,3,x,5,6,7,8,0.1,text,0.5\n");
        assert!(matches!(
            CandidatePool::from_csv_str(&bad_num),
            Err(PoolError::Parse { column: "L", .. })
        ));

        let short = format!("{HEADER}\n1,2,3\n");
        assert!(matches!(
            CandidatePool::from_csv_str(&short),
            Err(PoolError::RowWidth { found: 3, .. })
        ));

        assert!(matches!(
            CandidatePool::from_csv_str(HEADER),
            Err(PoolError::Empty)
        ));
    }

    #[test]
    fn parses_json_rows() {
        let text = r#"[
            {"R": 243, "G": 139, "B": 168, "L": 68.0, "a": 45.0, "b": 5.0,
             "chroma": 45.3, "hue": 6.3, "frequency": 0.05, "score": 0.4,
             "role": ["accent_red", "accent_bridge"]},
            {"R": 17, "G": 17, "B": 27, "L": 6.0, "a": 1.0, "b": -5.0,
             "chroma": 5.1, "hue": 281.0, "frequency": 0.5, "score": 0.9,
             "role": "background", "deltaE_bg_rank": 0.0, "abs_deltaL_bg_rank": 0.0}
        ]"#;
        let pool = CandidatePool::from_json_str(text).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(pool.records()[0].is_eligible(Role::AccentBridge));
        // Chroma is recomputed from (a, b), not copied from the input column.
        let expected = (45.0f32.powi(2) + 5.0f32.powi(2)).sqrt();
        assert!((pool.records()[0].chroma() - expected).abs() < 1e-3);
    }

    #[test]
    fn shortlist_orders_by_score_then_frequency() {
        let recs = vec![
            ColorRecord::from_color(Color::new(10, 10, 10), 0.1, 0.5, RoleSet::single(Role::Background)),
            ColorRecord::from_color(Color::new(20, 20, 20), 0.3, 0.5, RoleSet::single(Role::Background)),
            ColorRecord::from_color(Color::new(30, 30, 30), 0.9, 0.9, RoleSet::single(Role::Background)),
            ColorRecord::from_color(Color::new(200, 200, 200), 0.9, 1.0, RoleSet::single(Role::Text)),
        ];
        let pool = CandidatePool::new(recs).unwrap();
        let hexes: Vec<String> = pool
            .shortlist(Role::Background, 2)
            .into_iter()
            .map(ColorRecord::hex)
            .collect();
        assert_eq!(hexes, vec!["#1e1e1e", "#141414"]);
        assert_eq!(pool.shortlist(Role::Text, 10).len(), 1);
    }

    #[test]
    fn median_lightness_of_role() {
        let recs = [20u8, 40, 60]
            .into_iter()
            .map(|v| ColorRecord::from_color(Color::new(v, v, v), 0.1, 0.5, RoleSet::single(Role::Background)))
            .collect();
        let pool = CandidatePool::new(recs).unwrap();
        let median = pool.median_lightness(Role::Background).unwrap();
        assert!((median - Color::new(40, 40, 40).to_lab().l).abs() < 1e-3);
        assert_eq!(pool.median_lightness(Role::Text), None);
    }

    #[test]
    fn background_ranks_are_percentiles() {
        assert_eq!(percentile_ranks(&[1.0, 2.0, 2.0, 4.0]), vec![0.25, 0.625, 0.625, 1.0]);

        let recs: Vec<ColorRecord> = [30u8, 120, 250]
            .into_iter()
            .map(|v| ColorRecord::from_color(Color::new(v, v, v), 0.1, 0.5, RoleSet::single(Role::Text)))
            .collect();
        let base = recs[0].clone();
        let pool = CandidatePool::new(recs).unwrap().with_background_ranks(&base);
        assert!(pool.has_background_ranks());
        let ranks: Vec<f32> = pool
            .records()
            .iter()
            .map(|r| r.abs_delta_l_bg_rank.unwrap_or(-1.0))
            .collect();
        assert!(ranks[0] < ranks[1] && ranks[1] < ranks[2]);
        assert_eq!(ranks[2], 1.0);
    }
}

use std::path::{Path, PathBuf};
use std::process::Command;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use tinctor::color::{delta_e, gamut_map, lch_to_lab, Color};
use tinctor::constraints::{ConstraintTable, Tier};
use tinctor::element::{Element, Polarity, Role, RolePair, RoleSet};
use tinctor::error::AssignError;
use tinctor::output::ThemeDocument;
use tinctor::pipeline::{self, AssignOptions, AssignmentOutcome, Violation};
use tinctor::pool::CandidatePool;
use tinctor::record::ColorRecord;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn snapshot_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

fn band(q10: f32, q25: f32, median: f32, q75: f32, q90: f32) -> Value {
    json!({ "q10": q10, "q25": q25, "median": median, "q75": q75, "q90": q90 })
}

/// Constraint table learned from a mocha-like dark palette.
fn mocha_constraints() -> Value {
    json!({
        "palette": "mocha",
        "polarity": "dark",
        "deltaL": {
            "background→surface": { "q25": 8.0, "median": 12.0, "q75": 15.0 },
            "surface→overlay": { "q25": 10.0, "median": 18.0, "q75": 22.0 },
            "overlay→text": { "q25": 18.0, "median": 26.0, "q75": 30.0 },
            "background→text": { "q25": 50.0, "median": 60.0, "q75": 68.0 }
        },
        "lightness": {
            "background": band(8.0, 10.0, 15.0, 20.0, 24.0),
            "surface": band(20.0, 23.0, 28.0, 33.0, 37.0),
            "overlay": band(36.0, 40.0, 47.0, 55.0, 60.0),
            "text": band(68.0, 72.0, 80.0, 88.0, 92.0)
        },
        "chroma": {
            "background": band(2.0, 4.0, 8.0, 12.0, 15.0),
            "surface": band(2.0, 4.0, 8.0, 12.0, 15.0),
            "overlay": band(3.0, 5.0, 9.0, 13.0, 16.0),
            "text": band(2.0, 4.0, 8.0, 12.0, 15.0),
            "accent_red": band(20.0, 25.0, 35.0, 45.0, 55.0),
            "accent_warm": band(25.0, 30.0, 40.0, 55.0, 65.0),
            "accent_cool": band(20.0, 25.0, 32.0, 42.0, 50.0),
            "accent_bridge": band(25.0, 30.0, 40.0, 50.0, 60.0)
        },
        "hue": {
            "accent_red": { "center": 10.0, "width": 60.0, "relax_mult": 1.5 },
            "accent_warm": { "center": 80.0, "width": 80.0 },
            "accent_cool": { "center": 230.0, "width": 80.0, "relax_mult": 1.4 },
            "accent_bridge": { "center": 300.0, "width": 40.0 }
        },
        "element_offsets": {
            "mantle_from_base": { "value": -3.0 },
            "crust_from_base": { "value": -6.5 },
            "surface0_from_surface1": { "value": -5.0 },
            "surface2_from_surface1": { "value": 5.0 },
            "overlay0_from_overlay1": { "value": -6.0 },
            "overlay2_from_overlay1": { "value": 6.0 },
            "subtext1_from_text": { "value": -7.0 },
            "subtext0_from_text": { "value": -14.0 }
        },
        "accent_separation": {
            "dark": {
                "accent_red": { "min": 45.0 },
                "accent_warm": { "min": 45.0 },
                "accent_cool": { "min": 48.0 },
                "accent_bridge": { "min": 46.0 }
            },
            "light": {
                "accent_red": { "min": 30.0 },
                "accent_warm": { "min": 28.0 },
                "accent_cool": { "min": 35.0 },
                "accent_bridge": { "min": 33.0 }
            }
        }
    })
}

fn constraints() -> ConstraintTable {
    ConstraintTable::from_json_str(&mocha_constraints().to_string()).unwrap()
}

fn lch(l: f32, c: f32, h: f32, role: Role) -> ColorRecord {
    let lab = gamut_map(lch_to_lab(l, c, h));
    ColorRecord::sampled(Color::from_lab(lab), lab, 0.05, 0.5, RoleSet::single(role))
}

/// Structural anchors plus red, warm and cool accents. No bridge candidates.
fn reference_records() -> Vec<ColorRecord> {
    vec![
        lch(12.0, 6.0, 270.0, Role::Background),
        lch(24.0, 6.0, 270.0, Role::Surface),
        lch(42.0, 6.0, 270.0, Role::Overlay),
        lch(88.0, 6.0, 270.0, Role::Text),
        lch(64.0, 35.0, 15.0, Role::AccentRed),
        lch(66.0, 40.0, 80.0, Role::AccentWarm),
        lch(65.0, 35.0, 230.0, Role::AccentCool),
    ]
}

fn reference_pool() -> CandidatePool {
    CandidatePool::new(reference_records()).unwrap()
}

fn run_with(pool: &CandidatePool, options: &AssignOptions, seed: u64) -> AssignmentOutcome {
    let mut rng = StdRng::seed_from_u64(seed);
    pipeline::run(pool, &constraints(), options, &mut rng).unwrap()
}

fn to_json(outcome: &AssignmentOutcome) -> String {
    ThemeDocument::from_outcome(outcome).to_json().unwrap()
}

/// Render records in the tabular pool layout.
fn pool_csv(records: &[ColorRecord]) -> String {
    let mut out = String::from("R,G,B,L,a,b,chroma,hue,frequency,role,score\n");
    for rec in records {
        let c = rec.color();
        let role = rec.roles.iter().next().unwrap();
        out.push_str(&format!(
            "{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{},{},{}\n",
            c.r,
            c.g,
            c.b,
            rec.l(),
            rec.a(),
            rec.b(),
            rec.chroma(),
            rec.hue(),
            rec.frequency,
            role,
            rec.score
        ));
    }
    out
}

fn write_inputs(dir: &Path, records: &[ColorRecord]) -> (PathBuf, PathBuf) {
    let pool = dir.join("pool.csv");
    let table = dir.join("mocha.json");
    std::fs::write(&pool, pool_csv(records)).unwrap();
    std::fs::write(&table, mocha_constraints().to_string()).unwrap();
    (pool, table)
}

fn assert_no_violations(outcome: &AssignmentOutcome) {
    let violations: Vec<Violation> = outcome
        .violations
        .iter()
        .filter(|v| !matches!(v, Violation::Missing(_)))
        .cloned()
        .collect();
    assert!(violations.is_empty(), "violations: {violations:?}");
}

// ---------------------------------------------------------------------------
// Snapshot tests
// ---------------------------------------------------------------------------

fn snapshot_test(name: &str, output: &str) {
    let snap_dir = snapshot_dir();
    std::fs::create_dir_all(&snap_dir).unwrap();
    let snap_path = snap_dir.join(format!("{name}.snap"));

    if std::env::var("UPDATE_SNAPSHOTS").is_ok() || !snap_path.exists() {
        std::fs::write(&snap_path, output).unwrap();
        return;
    }

    let expected = std::fs::read_to_string(&snap_path).unwrap();
    assert_eq!(
        output, expected,
        "snapshot mismatch for {name}. Run with UPDATE_SNAPSHOTS=1 to update."
    );
}

/// Mocha's own swatches, one per role; no bridge color.
fn mocha_swatch_pool() -> CandidatePool {
    let swatch = |hex: &str, role: Role| {
        ColorRecord::from_color(Color::from_hex(hex).unwrap(), 0.1, 0.5, RoleSet::single(role))
    };
    CandidatePool::new(vec![
        swatch("#1e1e2e", Role::Background),
        swatch("#313244", Role::Surface),
        swatch("#585b70", Role::Overlay),
        swatch("#cdd6f4", Role::Text),
        swatch("#f38ba8", Role::AccentRed),
        swatch("#fab387", Role::AccentWarm),
        swatch("#89b4fa", Role::AccentCool),
    ])
    .unwrap()
}

/// Tier, assigned hexes in canonical order and the missing elements.
fn summary(outcome: &AssignmentOutcome) -> String {
    let tier = outcome
        .structural_tier()
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    let mut out = format!("{} {} {}\n", outcome.palette, outcome.polarity(), tier);
    for (element, rec) in outcome.assignment.iter() {
        out.push_str(&format!("{element} {}\n", rec.hex()));
    }
    let missing: Vec<&str> = outcome.missing().iter().map(|e| e.as_str()).collect();
    out.push_str(&format!("missing: {}\n", missing.join(", ")));
    out
}

#[test]
fn snapshot_mocha_swatches_without_fill() {
    let options = AssignOptions {
        fill: false,
        ..AssignOptions::default()
    };
    let outcome = run_with(&mocha_swatch_pool(), &options, 0);
    snapshot_test("mocha_swatches_no_fill", &summary(&outcome));
}

// ---------------------------------------------------------------------------
// Pipeline validation tests
// ---------------------------------------------------------------------------

#[test]
fn missing_bridge_candidates_are_reported_not_fatal() {
    let no_fill = AssignOptions {
        fill: false,
        ..AssignOptions::default()
    };
    let partial = run_with(&reference_pool(), &no_fill, 0);
    assert!(partial.missing().contains(&Element::Mauve));

    let json: Value = serde_json::from_str(&to_json(&partial)).unwrap();
    let missing: Vec<&str> = json["missing"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(missing.contains(&"mauve"));

    let full = run_with(&reference_pool(), &AssignOptions::default(), 0);
    assert!(full.is_complete(), "missing: {:?}", full.missing());
    assert!(full.assignment.get(Element::Mauve).unwrap().derived);
}

#[test]
fn narrow_structural_range_is_rejected() {
    // Background and text both sit in L* 40..50, below even the relaxed
    // 30-point background→text minimum.
    let pool = CandidatePool::new(vec![
        lch(40.0, 5.0, 270.0, Role::Background),
        lch(42.0, 5.0, 260.0, Role::Background),
        lch(44.0, 5.0, 270.0, Role::Surface),
        lch(46.0, 5.0, 270.0, Role::Overlay),
        lch(48.0, 5.0, 270.0, Role::Text),
        lch(50.0, 5.0, 250.0, Role::Text),
        lch(64.0, 35.0, 15.0, Role::AccentRed),
    ])
    .unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let err = pipeline::run(&pool, &constraints(), &AssignOptions::default(), &mut rng)
        .unwrap_err();
    assert!(
        matches!(
            err,
            AssignError::StructuralInfeasible {
                polarity: Polarity::Dark,
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert!(err.to_string().starts_with("rejected palette"));
}

#[test]
fn dark_cool_seed_ends_past_background_separation() {
    let mut records = reference_records();
    records.pop();
    records.push(lch(30.0, 30.0, 230.0, Role::AccentCool));
    let pool = CandidatePool::new(records).unwrap();

    let outcome = run_with(&pool, &AssignOptions::default(), 3);
    let base_l = outcome.assignment.get(Element::Base).unwrap().l();
    let min = constraints()
        .accent_min_separation(Role::AccentCool, Polarity::Dark)
        .unwrap();
    for &element in Role::AccentCool.elements() {
        let rec = outcome.assignment.get(element).unwrap();
        assert!(rec.derived, "{element} should be synthesized");
        assert!(
            rec.l() - base_l >= min - 1e-3,
            "{element} at L* {:.2}, base {:.2}",
            rec.l(),
            base_l
        );
    }
    assert_no_violations(&outcome);
}

#[test]
fn same_seed_is_byte_identical() {
    let pool = reference_pool();
    let first = to_json(&run_with(&pool, &AssignOptions::default(), 42));
    let second = to_json(&run_with(&pool, &AssignOptions::default(), 42));
    assert_eq!(first, second);
}

#[test]
fn complete_run_keeps_every_invariant() {
    let outcome = run_with(&reference_pool(), &AssignOptions::default(), 0);
    assert!(outcome.is_complete());
    assert_no_violations(&outcome);

    let mut seen = std::collections::HashSet::new();
    for (element, rec) in outcome.assignment.iter() {
        assert!(seen.insert(rec.color()), "{element} repeats {}", rec.hex());
    }

    let tier = outcome.structural_tier().unwrap();
    let table = constraints();
    for pair in RolePair::ALL {
        let (from, to) = pair.elements();
        let gap = outcome.polarity().gap(
            outcome.assignment.get(from).unwrap().l(),
            outcome.assignment.get(to).unwrap().l(),
        );
        assert!(gap > 0.0 && gap >= table.min_gap(pair, tier) - 1e-3, "{pair}: {gap}");
    }
}

#[test]
fn forced_light_polarity_uses_light_separation() {
    let pool = CandidatePool::new(vec![
        lch(95.0, 4.0, 90.0, Role::Background),
        lch(85.0, 4.0, 90.0, Role::Surface),
        lch(70.0, 5.0, 90.0, Role::Overlay),
        lch(30.0, 8.0, 270.0, Role::Text),
        lch(50.0, 45.0, 15.0, Role::AccentRed),
        lch(55.0, 45.0, 70.0, Role::AccentWarm),
        lch(50.0, 35.0, 240.0, Role::AccentCool),
        lch(48.0, 40.0, 300.0, Role::AccentBridge),
    ])
    .unwrap();
    let options = AssignOptions {
        polarity: Some(Polarity::Light),
        ..AssignOptions::default()
    };
    let outcome = run_with(&pool, &options, 0);
    assert_eq!(outcome.polarity(), Polarity::Light);
    let base_l = outcome.assignment.get(Element::Base).unwrap().l();
    for element in [Element::Blue, Element::Mauve] {
        if let Some(rec) = outcome.assignment.get(element) {
            assert!(base_l - rec.l() >= 33.0 - 1e-3, "{element} at {}", rec.l());
        }
    }
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_member(
        role: Role,
        l: std::ops::Range<f32>,
        c: std::ops::Range<f32>,
    ) -> impl Strategy<Value = ColorRecord> {
        (l, c, 0f32..360.0).prop_map(move |(l, c, h)| lch(l, c, h, role))
    }

    fn arb_accent() -> impl Strategy<Value = ColorRecord> {
        (0usize..4).prop_flat_map(|i| arb_member(Role::ACCENTS[i], 50.0..80.0, 20.0..50.0))
    }

    /// Dark pools with every structural role present and a handful of
    /// accents of arbitrary hue.
    fn arb_pool() -> impl Strategy<Value = Vec<ColorRecord>> {
        (
            proptest::collection::vec(arb_member(Role::Background, 6.0..18.0, 0.0..10.0), 1..3),
            proptest::collection::vec(arb_member(Role::Surface, 20.0..32.0, 0.0..10.0), 1..3),
            proptest::collection::vec(arb_member(Role::Overlay, 36.0..55.0, 0.0..12.0), 1..3),
            proptest::collection::vec(arb_member(Role::Text, 75.0..92.0, 0.0..10.0), 1..3),
            proptest::collection::vec(arb_accent(), 0..8),
        )
            .prop_map(|(bg, surface, overlay, text, accents)| {
                bg.into_iter()
                    .chain(surface)
                    .chain(overlay)
                    .chain(text)
                    .chain(accents)
                    .collect()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn outcomes_keep_structure_and_distinctness(records in arb_pool(), seed in any::<u64>()) {
            let pool = CandidatePool::new(records).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let table = constraints();
            match pipeline::run(&pool, &table, &AssignOptions::default(), &mut rng) {
                Ok(outcome) => {
                    let mut seen = std::collections::HashSet::new();
                    for (element, rec) in outcome.assignment.iter() {
                        prop_assert!(seen.insert(rec.color()), "{} repeats {}", element, rec.hex());
                        let hex = rec.hex();
                        prop_assert_eq!(hex.len(), 7);
                        prop_assert!(hex[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
                    }
                    let l = |e: Element| outcome.assignment.get(e).unwrap().l();
                    let gap = l(Element::Text) - l(Element::Base);
                    prop_assert!(
                        gap >= table.min_gap(RolePair::BackgroundText, Tier::Relaxed) - 1e-3,
                        "background→text gap {}", gap
                    );
                    prop_assert!(l(Element::Base) < l(Element::Surface1));
                    prop_assert!(l(Element::Surface1) < l(Element::Overlay1));
                    prop_assert!(l(Element::Overlay1) < l(Element::Text));
                }
                Err(err) => {
                    let infeasible = matches!(err, AssignError::StructuralInfeasible { .. });
                    prop_assert!(infeasible, "unexpected error: {}", err);
                }
            }
        }

        #[test]
        fn gamut_mapped_lab_survives_hex_round_trip(
            l in 5f32..95.0,
            c in 0f32..80.0,
            h in 0f32..360.0,
        ) {
            let mapped = gamut_map(lch_to_lab(l, c, h));
            let back = Color::from_hex(&Color::from_lab(mapped).to_hex()).unwrap().to_lab();
            let d = delta_e(back, mapped);
            prop_assert!(d < 1.0, "ΔE {} for L{} C{} h{}", d, l, c, h);
        }
    }
}

// ---------------------------------------------------------------------------
// CLI integration tests (run the actual binary)
// ---------------------------------------------------------------------------

fn cargo_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tinctor"))
}

#[test]
fn cli_stdout_produces_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, table) = write_inputs(dir.path(), &reference_records());
    let output = Command::new(cargo_bin())
        .arg(&pool)
        .arg("--constraints")
        .arg(&table)
        .output()
        .expect("failed to run binary");

    assert!(
        output.status.success(),
        "binary exited with error: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["palette"], "mocha");
    assert_eq!(json["polarity"], "dark");
    assert_eq!(json["assigned"].as_object().unwrap().len(), Element::COUNT);
}

#[test]
fn cli_output_flag_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, table) = write_inputs(dir.path(), &reference_records());
    let out_path = dir.path().join("out").join("theme.json");

    let output = Command::new(cargo_bin())
        .arg(&pool)
        .args(["-c", table.to_str().unwrap()])
        .args(["-o", out_path.to_str().unwrap()])
        .args(["--seed", "9", "--no-fill"])
        .output()
        .expect("failed to run binary");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let json: Value = serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert!(json["missing"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v == "mauve"));
}

#[test]
fn cli_help_output() {
    let output = Command::new(cargo_bin())
        .arg("--help")
        .output()
        .expect("failed to run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tinctor"));
    assert!(stdout.contains("--constraints"));
    assert!(stdout.contains("--mode"));
    assert!(stdout.contains("--seed"));
    assert!(stdout.contains("--no-fill"));
}

#[test]
fn cli_file_not_found_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, table) = write_inputs(dir.path(), &reference_records());
    let output = Command::new(cargo_bin())
        .arg("/nonexistent/pool.csv")
        .args(["-c", table.to_str().unwrap()])
        .output()
        .expect("failed to run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to read candidate pool"),
        "expected read error, got: {stderr}"
    );
}

#[test]
fn cli_rejected_palette_fails() {
    let dir = tempfile::tempdir().unwrap();
    let records = vec![
        lch(40.0, 5.0, 270.0, Role::Background),
        lch(44.0, 5.0, 270.0, Role::Surface),
        lch(46.0, 5.0, 270.0, Role::Overlay),
        lch(48.0, 5.0, 270.0, Role::Text),
    ];
    let (pool, table) = write_inputs(dir.path(), &records);
    let output = Command::new(cargo_bin())
        .arg(&pool)
        .args(["-c", table.to_str().unwrap()])
        .output()
        .expect("failed to run binary");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rejected palette"), "got: {stderr}");
}

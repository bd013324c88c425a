use std::path::PathBuf;

use clap::Parser;

use crate::element::Polarity;

/// Assign candidate colors to the semantic elements of a theme.
#[derive(Parser, Debug)]
#[command(name = "tinctor", version, about)]
pub struct Args {
    /// Candidate pool (.csv or .json)
    pub pool: PathBuf,

    /// Learned constraint table (.json)
    #[arg(short, long)]
    pub constraints: PathBuf,

    /// Palette to select from a multi-palette constraint corpus
    #[arg(short, long)]
    pub palette: Option<String>,

    /// Force dark or light polarity (read from constraints or inferred if omitted)
    #[arg(short, long, value_enum)]
    pub mode: Option<Polarity>,

    /// Seed for synthesis tie-breaks
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Write the assignment to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after the accent stage; leave gaps unassigned
    #[arg(long)]
    pub no_fill: bool,

    /// Minimum background-contrast percentile for cool accents, in [0, 1]
    #[arg(long, default_value_t = 0.60, value_parser = parse_unit_interval)]
    pub cool_rank_floor: f32,

    /// Print a colored terminal preview of the assignment
    #[arg(long)]
    pub preview: bool,

    /// Log each stage's decisions to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_unit_interval(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{v} is outside [0, 1]"))
    }
}

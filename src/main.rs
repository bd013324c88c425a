use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tinctor::cli::Args;
use tinctor::constraints::ConstraintTable;
use tinctor::output::ThemeDocument;
use tinctor::pipeline::{self, AccentOptions, AssignOptions};
use tinctor::pool::CandidatePool;
use tinctor::preview;

fn init_tracing(verbose: bool) {
    let default = if verbose { "tinctor=debug" } else { "tinctor=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(io::stderr),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let pool = CandidatePool::load(&args.pool)?;
    let constraints = ConstraintTable::load(&args.constraints, args.palette.as_deref())?;
    info!(candidates = pool.len(), "inputs loaded");

    let options = AssignOptions {
        polarity: args.mode,
        fill: !args.no_fill,
        accents: AccentOptions {
            cool_rank_floor: args.cool_rank_floor,
        },
    };
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut outcome = pipeline::run(&pool, &constraints, &options, &mut rng)?;
    if let Some(name) = &args.palette {
        outcome.palette = name.clone();
    }

    let document = ThemeDocument::from_outcome(&outcome);
    match &args.output {
        Some(path) => {
            document.write_to(path)?;
            eprintln!("Wrote assignment to {}", path.display());
            if args.preview {
                preview::render(&outcome, &mut io::stdout().lock())?;
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(document.to_json()?.as_bytes())
                .context("failed to write assignment to stdout")?;
            if args.preview {
                preview::render(&outcome, &mut io::stderr().lock())?;
            }
        }
    }

    Ok(())
}

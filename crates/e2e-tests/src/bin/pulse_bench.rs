//! Theme pipeline timing harness.
//!
//! Generates a synthetic review set (blobs plus noise plus duplicates),
//! runs the pipeline a few times and prints per-run timings as JSON.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use e2e_tests::{axis, random_text, run, test_config, Fixture, SampleLabeler};
use pulse_themes::artifact::write_run;

#[derive(Parser, Debug)]
#[command(name = "pulse_bench", about = "Review theme pipeline benchmark harness")]
struct Args {
    /// Number of blobs (raw clusters) to generate
    #[arg(long, default_value_t = 12)]
    blobs: usize,
    /// Reviews per blob
    #[arg(long, default_value_t = 40)]
    per_blob: usize,
    /// Fraction of reviews repeated as near-duplicates
    #[arg(long, default_value_t = 0.1)]
    duplicate_ratio: f64,
    /// Maximum named themes
    #[arg(long, default_value_t = 5)]
    max_themes: usize,
    #[arg(long, default_value_t = 3)]
    iterations: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Also write artifacts here
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Sample {
    iteration: usize,
    reviews: usize,
    millis: u128,
    raw_clusters: usize,
    merges: usize,
    themes: usize,
}

fn build_fixture(args: &Args) -> Fixture {
    let dim = args.blobs + 1;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut fixture = Fixture::default();
    for k in 0..args.blobs {
        fixture.push_blob(&format!("b{:03}", k), args.per_blob, &axis(dim, k), &mut rng);
    }

    let originals = fixture.reviews.clone();
    for (i, review) in originals.iter().enumerate() {
        if rng.random_bool(args.duplicate_ratio.clamp(0.0, 1.0)) {
            fixture.push(&format!("dup-{:05}", i), &format!("{}!", review.content), None);
        }
    }
    for i in 0..args.per_blob {
        let text = random_text(&mut rng);
        let vector: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0..1.0)).collect();
        fixture.push(&format!("noise-{:04}", i), &text, Some(vector));
    }
    fixture
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let fixture = build_fixture(&args);

    let mut samples = Vec::with_capacity(args.iterations);
    for iteration in 0..args.iterations {
        let started = Instant::now();
        let store = run(
            test_config(args.max_themes),
            &fixture,
            Box::new(SampleLabeler::default()),
        )?;
        let elapsed = started.elapsed();

        if let (Some(dir), 0) = (&args.out_dir, iteration) {
            write_run(dir, &store)?;
        }

        samples.push(Sample {
            iteration,
            reviews: fixture.reviews.len(),
            millis: elapsed.as_millis(),
            raw_clusters: store.stats().raw_clusters,
            merges: store.stats().merges,
            themes: store.stats().themes,
        });
    }

    println!("{}", serde_json::to_string_pretty(&samples)?);
    Ok(())
}

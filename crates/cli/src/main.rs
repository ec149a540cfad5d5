use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use confbary::observables::{RandomVariable, SquaredGyradius};
use confbary::sampler::{Sampler, SamplerSettings};
use std::path::Path;
use tracing_subscriber::fmt::SubscriberBuilder;

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Closed-polygon sampling experiment runner")]
struct Cmd {
    /// Ambient dimension (compiled fast paths: 2, 3, 4)
    #[arg(long, default_value_t = 3)]
    dim: usize,

    /// Number of polygon edges
    #[arg(long, default_value_t = 64)]
    edges: usize,

    /// Worker thread count
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Master seed; omit for a nondeterministic run
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Draw closed polygons and report weight/closure statistics
    Sample {
        #[arg(long, default_value_t = 1000)]
        count: usize,
        /// Optional JSON output path (stdout otherwise)
        #[arg(long)]
        out: Option<String>,
    },
    /// Histogram of the squared radius of gyration
    Gyradius {
        #[arg(long, default_value_t = 1000)]
        count: usize,
        #[arg(long, default_value_t = 50)]
        bins: usize,
        /// Upper histogram bound; lower bound is 0
        #[arg(long, default_value_t = 0.01)]
        hi: f64,
        #[arg(long)]
        out: Option<String>,
    },
}

fn main() -> Result<()> {
    SubscriberBuilder::default().with_target(false).init();
    let cmd = Cmd::parse();
    match cmd.dim {
        2 => run::<2>(&cmd),
        3 => run::<3>(&cmd),
        4 => run::<4>(&cmd),
        d => bail!("ambient dimension {d} is not compiled in (available: 2, 3, 4)"),
    }
}

fn run<const D: usize>(cmd: &Cmd) -> Result<()> {
    let mut sampler = Sampler::<D>::new(cmd.edges, SamplerSettings::default())?;
    if let Some(seed) = cmd.seed {
        sampler.seed(seed);
    }
    match cmd.action {
        Action::Sample { count, ref out } => sample(sampler, count, cmd.threads, out.as_deref()),
        Action::Gyradius {
            count,
            bins,
            hi,
            ref out,
        } => gyradius(sampler, count, bins, hi, cmd.threads, out.as_deref()),
    }
}

fn sample<const D: usize>(
    mut sampler: Sampler<D>,
    count: usize,
    threads: usize,
    out: Option<&str>,
) -> Result<()> {
    let n = sampler.edge_count();
    tracing::info!(dim = D, edges = n, count, threads, "sample");

    let mut x = vec![0.0; count * n * D];
    let mut w = vec![0.0; count * D];
    let mut y = vec![0.0; count * n * D];
    let mut k_edge = vec![0.0; count];
    let mut k_quot = vec![0.0; count];
    sampler.random_closed_polygons(
        &mut x,
        &mut w,
        &mut y,
        &mut k_edge,
        &mut k_quot,
        count,
        threads,
    )?;

    // Worst closure defect across the batch, from the returned directions.
    let r = sampler.edge_lengths().to_vec();
    let mut worst_defect = 0.0_f64;
    for sample in y.chunks_exact(n * D) {
        let mut sum = vec![0.0_f64; D];
        for (edge, &rk) in sample.chunks_exact(D).zip(&r) {
            for i in 0..D {
                sum[i] += rk * edge[i];
            }
        }
        let defect = sum.iter().map(|v| v * v).sum::<f64>().sqrt();
        worst_defect = worst_defect.max(defect);
    }

    let summary = serde_json::json!({
        "dim": D,
        "edges": n,
        "count": count,
        "worst_closure_defect": worst_defect,
        "k_edge": stats(&k_edge),
        "k_edge_quotient": stats(&k_quot),
    });
    emit(&summary, out)
}

fn gyradius<const D: usize>(
    mut sampler: Sampler<D>,
    count: usize,
    bins: usize,
    hi: f64,
    threads: usize,
    out: Option<&str>,
) -> Result<()> {
    if !(hi > 0.0) {
        bail!("histogram upper bound must be positive");
    }
    tracing::info!(dim = D, edges = sampler.edge_count(), count, bins, hi, "gyradius");

    let observables: Vec<Box<dyn RandomVariable<D>>> = vec![Box::new(SquaredGyradius)];
    let moment_count = 3;
    let ranges = [0.0, hi];
    let mut bin_data = vec![0.0; 3 * bins];
    let mut moments = vec![0.0; 3 * moment_count];
    sampler.sample_binned(
        &mut bin_data,
        bins,
        &mut moments,
        moment_count,
        &ranges,
        &observables,
        count,
        threads,
    )?;
    sampler.normalize_binned_samples(&mut bin_data, bins, &mut moments, moment_count, 1)?;

    let weightings = ["unweighted", "k_edge", "k_edge_quotient"];
    let mut rows = serde_json::Map::new();
    for (i, label) in weightings.iter().enumerate() {
        rows.insert(
            label.to_string(),
            serde_json::json!({
                "bins": &bin_data[i * bins..(i + 1) * bins],
                "mean": moments[i * moment_count + 1],
                "second_moment": moments[i * moment_count + 2],
            }),
        );
    }
    let summary = serde_json::json!({
        "dim": D,
        "edges": sampler.edge_count(),
        "count": count,
        "range": [0.0, hi],
        "observable": "SquaredGyradius",
        "histograms": rows,
    });
    emit(&summary, out)
}

fn stats(values: &[f64]) -> serde_json::Value {
    let count = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    serde_json::json!({ "mean": mean, "min": min, "max": max })
}

fn emit(summary: &serde_json::Value, out: Option<&str>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, serde_json::to_vec_pretty(summary)?)?;
            tracing::info!(path, "wrote summary");
        }
        None => println!("{}", serde_json::to_string_pretty(summary)?),
    }
    Ok(())
}

use clap::Parser;
use std::process::exit;
use voxelstats::correlation::{correlate, join_on_cluster, read_measure_column};

#[derive(Parser, Debug)]
#[command(name = "voxelstats-corr")]
#[command(about = "Correlate two per-cluster measurement tables.")]
#[command(version)]
struct Args {
    /// First per-cluster table (x).
    table_a: String,

    /// Second per-cluster table (y).
    table_b: String,

    /// Value column to take from the first table.
    #[arg(long, default_value = "count_per_mm3")]
    column_a: String,

    /// Value column to take from the second table.
    #[arg(long, default_value = "mean_intensity")]
    column_b: String,
}

fn main() {
    let args = Args::parse();

    let a = read_measure_column(&args.table_a, &args.column_a);
    let b = read_measure_column(&args.table_b, &args.column_b);
    let (xs, ys) = join_on_cluster(&a, &b);

    if xs.len() < 3 {
        eprintln!(
            "Only {} clusters are shared between the tables; need at least 3 to fit",
            xs.len()
        );
        exit(1);
    }

    let summary = correlate(&xs, &ys).unwrap_or_else(|err| {
        eprintln!("Regression failed: {}", err);
        exit(1);
    });

    println!("n         = {}", summary.n);
    println!("slope     = {:.6}", summary.slope);
    println!("intercept = {:.6}", summary.intercept);
    println!("r         = {:.6}", summary.r);
    println!("r^2       = {:.6}", summary.r_squared);
    println!("p         = {:.6e}", summary.p_value);
}

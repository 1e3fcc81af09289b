use clap::Parser;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::exit;
use voxelstats::cells::{assign_cells, count_by_cluster_class, read_cell_metadata_csv};
use voxelstats::output::{self, OutputFormat};
use voxelstats::relabel::cluster_sizes;
use voxelstats::{volume, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "voxelstats-cells")]
#[command(about = "Count ABCA/MERFISH cells per cluster and annotation class.")]
#[command(version)]
struct Args {
    /// Cell metadata CSV (optionally gzipped), one row per cell.
    #[arg(short, long)]
    metadata: String,

    /// Cluster index volume the cells are mapped into.
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long, default_value = "cell_counts.csv")]
    output: String,

    #[arg(long, default_value = "x_ccf")]
    x_column: String,

    #[arg(long, default_value = "y_ccf")]
    y_column: String,

    #[arg(long, default_value = "z_ccf")]
    z_column: String,

    /// Annotation column to group counts by (class, subclass, ...).
    #[arg(long, default_value = "class")]
    class_column: String,

    /// Keep only cells whose annotation matches this regular expression.
    #[arg(long)]
    include_classes: Option<String>,

    /// Multiplier taking cell coordinates into the volume's spatial units
    /// (e.g. 1000 for metadata in mm against a header in microns).
    #[arg(long, default_value_t = 1.0)]
    coordinate_scale: f64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Infer)]
    output_format: OutputFormat,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let config = RunConfig::new(args.verbose);

    let include_classes = args.include_classes.as_deref().map(|pattern| {
        Regex::new(pattern).unwrap_or_else(|err| {
            eprintln!("Invalid --include-classes pattern: {}", err);
            exit(1);
        })
    });

    let table = read_cell_metadata_csv(
        &args.metadata,
        &args.x_column,
        &args.y_column,
        &args.z_column,
        &args.class_column,
        include_classes.as_ref(),
    );
    println!(
        "Read {} cells across {} classes",
        table.cells.len(),
        table.class_names.len()
    );

    let (clusters, header) = volume::read_labels(&args.input).unwrap_or_else(|err| {
        eprintln!("Error reading {}: {}", args.input.display(), err);
        exit(1);
    });
    config.log(format!("Read cluster index {:?}", clusters.dim()));

    let assignments = assign_cells(
        &clusters,
        &table,
        volume::voxel_dims(&header),
        args.coordinate_scale,
    );
    let in_cluster = assignments.iter().filter(|&&c| c != 0).count();
    config.log(format!(
        "{} of {} cells fall inside a cluster",
        in_cluster,
        assignments.len()
    ));

    let counts = count_by_cluster_class(&assignments, &table);

    let voxel_volume_mm3 = volume::voxel_volume_mm3(&header);
    let cluster_volumes_mm3: HashMap<u32, f64> = cluster_sizes(&clusters)
        .into_iter()
        .map(|(id, n)| (id, n as f64 * voxel_volume_mm3))
        .collect();

    output::write_cell_counts(
        &args.output,
        args.output_format,
        &table,
        &counts,
        &cluster_volumes_mm3,
    )
    .unwrap_or_else(|err| {
        eprintln!("Error writing {}: {}", args.output, err);
        exit(1);
    });

    println!("Wrote {} cluster/class rows to {}", counts.len(), args.output);
}

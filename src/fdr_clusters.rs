use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use voxelstats::connectivity::Connectivity;
use voxelstats::fdr::{fdr_cluster_index, FdrParams};
use voxelstats::output::{self, OutputFormat};
use voxelstats::{volume, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "voxelstats-fdr")]
#[command(about = "FDR-correct a voxel-wise p-value map and extract a size-ranked cluster index.")]
#[command(version)]
struct Args {
    /// Voxel-wise p-value map (.nii or .nii.gz).
    #[arg(short, long)]
    input: PathBuf,

    /// Brain mask; voxels outside it are excluded from the correction.
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Acceptable false discovery rate.
    #[arg(short, long, default_value_t = 0.05)]
    q: f64,

    /// Discard surviving clusters smaller than this many voxels.
    #[arg(long, default_value_t = 1)]
    min_cluster_size: usize,

    #[arg(short, long, value_enum, default_value = "6")]
    connectivity: Connectivity,

    /// Output cluster index volume. The largest cluster gets ID 1.
    #[arg(short, long, default_value = "rev_cluster_index.nii.gz")]
    output: PathBuf,

    /// Per-cluster size table.
    #[arg(long, default_value = "cluster_sizes.csv")]
    output_csv: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Infer)]
    output_format: OutputFormat,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let config = RunConfig::new(args.verbose);

    let (pvalues, header) = volume::read_map(&args.input).unwrap_or_else(|err| {
        eprintln!("Error reading {}: {}", args.input.display(), err);
        exit(1);
    });

    let mask = args.mask.as_ref().map(|path| {
        let (labels, _header) = volume::read_labels(path).unwrap_or_else(|err| {
            eprintln!("Error reading {}: {}", path.display(), err);
            exit(1);
        });
        volume::assert_same_shape("p-value map", &pvalues, "mask", &labels);
        labels.mapv(|v| v != 0)
    });

    config.log(format!("Read p-value map {:?}", pvalues.dim()));

    let params = FdrParams {
        q: args.q,
        connectivity: args.connectivity,
        min_cluster_size: args.min_cluster_size,
    };
    let result = fdr_cluster_index(&pvalues, mask.as_ref(), &params);

    match result.threshold {
        Some(threshold) => println!(
            "FDR q = {}: p threshold {:.6e}, {} clusters survive",
            args.q,
            threshold,
            result.sizes.len()
        ),
        None => println!(
            "FDR q = {}: no voxels survive the correction; writing an empty index",
            args.q
        ),
    }

    volume::write_labels(&args.output, &result.clusters, &header).unwrap_or_else(|err| {
        eprintln!("Error writing {}: {}", args.output.display(), err);
        exit(1);
    });
    config.log(format!("Wrote cluster index to {}", args.output.display()));

    let voxel_volume_mm3 = volume::voxel_volume_mm3(&header);
    output::write_cluster_sizes(
        &args.output_csv,
        args.output_format,
        voxel_volume_mm3,
        &result.sizes,
    )
    .unwrap_or_else(|err| {
        eprintln!("Error writing {}: {}", args.output_csv, err);
        exit(1);
    });
    config.log(format!("Wrote cluster sizes to {}", args.output_csv));
}

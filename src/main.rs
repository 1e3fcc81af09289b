use clap::Parser;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::process::exit;
use voxelstats::connectivity::Connectivity;
use voxelstats::measure::{self, Measure, MeasureParams};
use voxelstats::output::{self, OutputFormat};
use voxelstats::{bbox, volume, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "voxelstats")]
#[command(about = "Count and measure segmented cells within 3D clusters.")]
#[command(version)]
struct Args {
    /// Cluster or atlas index volume (.nii or .nii.gz; 0 is background).
    #[arg(short, long)]
    input: PathBuf,

    /// Segmentation mask (for count/volume) or intensity volume (for mean)
    /// on the same grid as the cluster index.
    #[arg(short, long)]
    seg: PathBuf,

    #[arg(short, long, default_value = "cluster_measurements.csv")]
    output: String,

    #[arg(short, long, value_enum, default_value_t = Measure::Count)]
    measure: Measure,

    /// Neighborhood used when counting segmented objects.
    #[arg(short, long, value_enum, default_value = "6")]
    connectivity: Connectivity,

    /// Comma-separated cluster IDs to measure (default: every nonzero ID
    /// present in the index).
    #[arg(long, value_delimiter = ',')]
    clusters: Vec<u32>,

    /// Skip the initial crop to the union bounding box of all clusters.
    #[arg(long)]
    no_crop: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Infer)]
    output_format: OutputFormat,

    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let config = RunConfig::new(args.verbose);

    let (clusters, cluster_header) =
        volume::read_labels(&args.input).unwrap_or_else(|err| {
            eprintln!("Error reading {}: {}", args.input.display(), err);
            exit(1);
        });
    let (signal, signal_header) = volume::read_map(&args.seg).unwrap_or_else(|err| {
        eprintln!("Error reading {}: {}", args.seg.display(), err);
        exit(1);
    });
    volume::assert_same_shape("cluster index", &clusters, "segmentation", &signal);

    if volume::voxel_dims(&cluster_header) != volume::voxel_dims(&signal_header) {
        eprintln!(
            "Warning: voxel dimensions differ between {} and {}; using those of the cluster index",
            args.input.display(),
            args.seg.display()
        );
    }
    let voxel_volume_mm3 = volume::voxel_volume_mm3(&cluster_header);

    config.log(format!(
        "Read cluster index {:?} and segmentation {:?}",
        clusters.dim(),
        signal.dim()
    ));

    // Crop both volumes to the union bounding box of all clusters so
    // per-cluster scans never touch empty margins.
    let (clusters, signal) = if args.no_crop {
        (clusters, signal)
    } else {
        match bbox::of_foreground(&clusters) {
            Some(bb) => {
                config.log(format!(
                    "Cropped to foreground box {:?}..{:?}",
                    bb.start, bb.end
                ));
                (bb.crop(&clusters).to_owned(), bb.crop(&signal).to_owned())
            }
            None => {
                eprintln!(
                    "Warning: {} contains no clusters; writing an empty table",
                    args.input.display()
                );
                (clusters, signal)
            }
        }
    };

    let ids = if args.clusters.is_empty() {
        measure::present_ids(&clusters)
    } else {
        args.clusters.clone()
    };
    config.log(format!("Measuring {} clusters", ids.len()));

    let params = MeasureParams {
        measure: args.measure,
        connectivity: args.connectivity,
        voxel_volume_mm3,
    };

    let progress = ProgressBar::new(ids.len() as u64);
    let rows = measure::measure_clusters(&clusters, &signal, &ids, &params, Some(&progress));
    progress.finish_and_clear();

    output::write_measurements(&args.output, args.output_format, args.measure, &rows)
        .unwrap_or_else(|err| {
            eprintln!("Error writing {}: {}", args.output, err);
            exit(1);
        });

    println!("Wrote {} cluster rows to {}", rows.len(), args.output);
}

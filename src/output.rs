// CSV table output. Tables go to plain or gzipped CSV, chosen by filename
// extension unless an explicit format is given.

use crate::cells::CellTable;
use crate::measure::{ClusterMeasurement, Measure};
use clap::ValueEnum;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Infer,
    Csv,
    CsvGz,
}

pub fn determine_format(filename: &str, fmt: OutputFormat) -> OutputFormat {
    match fmt {
        OutputFormat::Infer => {
            if filename.ends_with(".csv.gz") {
                OutputFormat::CsvGz
            } else if filename.ends_with(".csv") {
                OutputFormat::Csv
            } else {
                panic!("Unable to infer output format from filename: {}", filename);
            }
        }
        fmt => fmt,
    }
}

fn open_writer(filename: &str, fmt: OutputFormat) -> csv::Writer<Box<dyn Write>> {
    let file = File::create(filename)
        .unwrap_or_else(|err| panic!("Unable to create {}: {}", filename, err));

    let writer: Box<dyn Write> = match determine_format(filename, fmt) {
        OutputFormat::Csv => Box::new(file),
        OutputFormat::CsvGz => Box::new(GzEncoder::new(file, Compression::default())),
        OutputFormat::Infer => unreachable!(),
    };

    csv::Writer::from_writer(writer)
}

fn fmt_f64(v: f64) -> String {
    format!("{}", v)
}

/// Column names for the measured value and its density, per measure.
fn measure_columns(measure: Measure) -> (&'static str, Option<&'static str>) {
    match measure {
        Measure::Count => ("count", Some("count_per_mm3")),
        Measure::Volume => ("segmented_mm3", Some("volume_fraction")),
        Measure::Mean => ("mean_intensity", None),
    }
}

pub fn write_measurements(
    filename: &str,
    fmt: OutputFormat,
    measure: Measure,
    rows: &[ClusterMeasurement],
) -> csv::Result<()> {
    let mut writer = open_writer(filename, fmt);
    let (value_col, density_col) = measure_columns(measure);

    let mut header = vec!["cluster", "cluster_voxels", "cluster_volume_mm3", value_col];
    if let Some(density_col) = density_col {
        header.push(density_col);
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.cluster.to_string(),
            row.cluster_voxels.to_string(),
            fmt_f64(row.cluster_volume_mm3),
            fmt_f64(row.value),
        ];
        if density_col.is_some() {
            record.push(row.density.map(fmt_f64).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Summary table for an extracted cluster index: one row per cluster,
/// largest first (IDs are already size-ranked).
pub fn write_cluster_sizes(
    filename: &str,
    fmt: OutputFormat,
    voxel_volume_mm3: f64,
    sizes: &[(u32, usize)],
) -> csv::Result<()> {
    let mut writer = open_writer(filename, fmt);
    writer.write_record(["cluster", "voxels", "volume_mm3"])?;
    for &(id, n) in sizes {
        writer.write_record(&[
            id.to_string(),
            n.to_string(),
            fmt_f64(n as f64 * voxel_volume_mm3),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Long-format per-cluster per-class cell counts. `cluster_volumes_mm3`
/// supplies the denominator for the density column.
pub fn write_cell_counts(
    filename: &str,
    fmt: OutputFormat,
    table: &CellTable,
    counts: &BTreeMap<(u32, u32), usize>,
    cluster_volumes_mm3: &HashMap<u32, f64>,
) -> csv::Result<()> {
    let mut writer = open_writer(filename, fmt);
    writer.write_record(["cluster", "class", "cells", "cells_per_mm3"])?;

    for (&(cluster, class), &n) in counts {
        let density = cluster_volumes_mm3
            .get(&cluster)
            .map(|&vol| fmt_f64(n as f64 / vol))
            .unwrap_or_default();
        writer.write_record(&[
            cluster.to_string(),
            table.class_names[class as usize].clone(),
            n.to_string(),
            density,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

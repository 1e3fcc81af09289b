// Per-cluster measurement: the parallel map over cluster IDs at the heart
// of the pipeline. Each unit of work is independent (crop, mask, count),
// so clusters are farmed out with rayon and rows are reassembled and
// sorted by ID afterwards, making output independent of scheduling.

use crate::bbox;
use crate::connectivity::{count_components, Connectivity};
use clap::ValueEnum;
use indicatif::ProgressBar;
use itertools::Itertools;
use ndarray::{Array3, Zip};
use rayon::prelude::*;
use std::collections::HashSet;

/// What to measure inside each cluster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Measure {
    /// Count segmented objects (connected components of the masked
    /// segmentation) and report objects per mm³.
    Count,
    /// Accumulate segmented voxel volume and report the volume fraction.
    Volume,
    /// Mean intensity over the cluster (for immunofluorescence maps).
    Mean,
}

#[derive(Clone, Copy, Debug)]
pub struct MeasureParams {
    pub measure: Measure,
    pub connectivity: Connectivity,
    pub voxel_volume_mm3: f64,
}

/// One output row per cluster ID.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterMeasurement {
    pub cluster: u32,
    pub cluster_voxels: usize,
    pub cluster_volume_mm3: f64,
    pub value: f64,
    pub density: Option<f64>,
}

/// All distinct nonzero IDs in the cluster index, ascending.
pub fn present_ids(clusters: &Array3<u32>) -> Vec<u32> {
    let ids: HashSet<u32> = clusters.iter().copied().filter(|&v| v != 0).collect();
    ids.into_iter().sorted_unstable().collect()
}

/// Measure every cluster in `ids`, in parallel. `signal` is a segmentation
/// mask for `Count`/`Volume` or an intensity volume for `Mean`; it must be
/// on the same grid as `clusters` (checked by the caller against the NIfTI
/// headers).
pub fn measure_clusters(
    clusters: &Array3<u32>,
    signal: &Array3<f32>,
    ids: &[u32],
    params: &MeasureParams,
    progress: Option<&ProgressBar>,
) -> Vec<ClusterMeasurement> {
    let mut rows: Vec<ClusterMeasurement> = ids
        .par_iter()
        .map(|&id| {
            let row = measure_one(clusters, signal, id, params);
            if let Some(pb) = progress {
                pb.inc(1);
            }
            row
        })
        .collect();

    rows.sort_unstable_by_key(|row| row.cluster);
    rows
}

fn measure_one(
    clusters: &Array3<u32>,
    signal: &Array3<f32>,
    id: u32,
    params: &MeasureParams,
) -> ClusterMeasurement {
    let bb = match bbox::of_label(clusters, id) {
        Some(bb) => bb,
        None => {
            // Requested ID with no voxels: an empty row, not an error.
            return ClusterMeasurement {
                cluster: id,
                cluster_voxels: 0,
                cluster_volume_mm3: 0.0,
                value: 0.0,
                density: None,
            };
        }
    };

    let cl = bb.crop(clusters);
    let sig = bb.crop(signal);

    let cluster_voxels = cl.iter().filter(|&&v| v == id).count();
    let cluster_volume_mm3 = cluster_voxels as f64 * params.voxel_volume_mm3;

    let (value, density) = match params.measure {
        Measure::Count => {
            // Zero out segmentation voxels that fall outside this cluster,
            // then count remaining objects.
            let masked =
                Zip::from(&cl).and(&sig).map_collect(|&c, &s| c == id && s != 0.0);
            let nobjects = count_components(masked.view(), params.connectivity) as f64;
            (nobjects, Some(nobjects / cluster_volume_mm3))
        }
        Measure::Volume => {
            let nseg = Zip::from(&cl)
                .and(&sig)
                .fold(0usize, |acc, &c, &s| {
                    if c == id && s != 0.0 {
                        acc + 1
                    } else {
                        acc
                    }
                });
            let seg_mm3 = nseg as f64 * params.voxel_volume_mm3;
            (seg_mm3, Some(seg_mm3 / cluster_volume_mm3))
        }
        Measure::Mean => {
            let sum = Zip::from(&cl)
                .and(&sig)
                .fold(0.0f64, |acc, &c, &s| {
                    if c == id {
                        acc + s as f64
                    } else {
                        acc
                    }
                });
            (sum / cluster_voxels as f64, None)
        }
    };

    ClusterMeasurement {
        cluster: id,
        cluster_voxels,
        cluster_volume_mm3,
        value,
        density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    // Two clusters: cluster 1 is a 3x3x3 block holding two separate cells,
    // cluster 2 is a 2x1x1 bar holding one cell voxel.
    fn fixture() -> (Array3<u32>, Array3<f32>) {
        let mut clusters = Array3::<u32>::zeros((10, 10, 10));
        let mut seg = Array3::<f32>::zeros((10, 10, 10));

        for i in 1..4 {
            for j in 1..4 {
                for k in 1..4 {
                    clusters[(i, j, k)] = 1;
                }
            }
        }
        seg[(1, 1, 1)] = 1.0;
        seg[(3, 3, 3)] = 1.0;

        clusters[(7, 7, 7)] = 2;
        clusters[(8, 7, 7)] = 2;
        seg[(7, 7, 7)] = 1.0;

        // A segmented voxel outside every cluster must not count anywhere.
        seg[(5, 5, 5)] = 1.0;

        (clusters, seg)
    }

    fn params(measure: Measure) -> MeasureParams {
        MeasureParams {
            measure,
            connectivity: Connectivity::Six,
            voxel_volume_mm3: 0.5,
        }
    }

    #[test]
    fn present_ids_are_sorted_and_nonzero() {
        let (clusters, _) = fixture();
        assert_eq!(present_ids(&clusters), vec![1, 2]);
    }

    #[test]
    fn counts_objects_within_each_cluster() {
        let (clusters, seg) = fixture();
        let rows = measure_clusters(&clusters, &seg, &[1, 2], &params(Measure::Count), None);

        assert_eq!(rows[0].cluster, 1);
        assert_eq!(rows[0].cluster_voxels, 27);
        assert_eq!(rows[0].value, 2.0);
        assert_eq!(rows[0].density, Some(2.0 / 13.5));

        assert_eq!(rows[1].cluster, 2);
        assert_eq!(rows[1].cluster_voxels, 2);
        assert_eq!(rows[1].value, 1.0);
    }

    #[test]
    fn volume_measure_reports_segmented_fraction() {
        let (clusters, seg) = fixture();
        let rows = measure_clusters(&clusters, &seg, &[1], &params(Measure::Volume), None);
        assert_eq!(rows[0].value, 2.0 * 0.5);
        assert_eq!(rows[0].density, Some(2.0 / 27.0));
    }

    #[test]
    fn mean_measure_averages_cluster_intensity() {
        let (clusters, seg) = fixture();
        let rows = measure_clusters(&clusters, &seg, &[2], &params(Measure::Mean), None);
        assert_eq!(rows[0].value, 0.5);
        assert_eq!(rows[0].density, None);
    }

    #[test]
    fn missing_cluster_yields_empty_row() {
        let (clusters, seg) = fixture();
        let rows = measure_clusters(&clusters, &seg, &[9], &params(Measure::Count), None);
        assert_eq!(rows[0].cluster, 9);
        assert_eq!(rows[0].cluster_voxels, 0);
        assert_eq!(rows[0].value, 0.0);
        assert_eq!(rows[0].density, None);
    }

    #[test]
    fn results_do_not_depend_on_scheduling() {
        let (clusters, seg) = fixture();
        let ids = present_ids(&clusters);
        let p = params(Measure::Count);
        let first = measure_clusters(&clusters, &seg, &ids, &p, None);
        for _ in 0..10 {
            assert_eq!(measure_clusters(&clusters, &seg, &ids, &p, None), first);
        }
    }
}

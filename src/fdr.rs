// Voxel-wise FDR correction and cluster extraction: the native replacement
// for the fdr/easythresh stage. A Benjamini-Hochberg threshold is found
// over the in-mask p-values, surviving voxels are grouped into connected
// components, small components are dropped, and the survivors are
// renumbered so the largest cluster is 1.

use crate::connectivity::{label_components, Connectivity};
use itertools::Itertools;
use ndarray::{Array3, Zip};

#[derive(Clone, Copy, Debug)]
pub struct FdrParams {
    /// Acceptable false discovery rate (q).
    pub q: f64,
    pub connectivity: Connectivity,
    /// Components smaller than this many voxels are discarded.
    pub min_cluster_size: usize,
}

#[derive(Clone, Debug)]
pub struct FdrClusters {
    /// The p-value threshold that controls FDR at q, or None when no voxel
    /// survives.
    pub threshold: Option<f64>,
    /// Size-ranked cluster index (largest cluster is 1, background 0).
    pub clusters: Array3<u32>,
    /// (cluster ID, voxel count), ascending by ID i.e. descending by size.
    pub sizes: Vec<(u32, usize)>,
}

/// Benjamini-Hochberg: the largest p(k) with p(k) <= (k/m) q, over the
/// given p-values. None when nothing passes.
pub fn bh_threshold(pvalues: &[f64], q: f64) -> Option<f64> {
    assert!(q > 0.0 && q < 1.0, "q must be in (0, 1), got {}", q);

    let m = pvalues.len() as f64;
    let mut threshold = None;
    for (k, &p) in pvalues
        .iter()
        .sorted_unstable_by(|a, b| a.partial_cmp(b).unwrap())
        .enumerate()
    {
        if p <= (k + 1) as f64 / m * q {
            threshold = Some(p);
        }
    }
    threshold
}

/// Run the full protocol on a p-value map, restricted to `mask` when given
/// (voxels outside the mask neither enter the correction nor the clusters).
pub fn fdr_cluster_index(
    pvalues: &Array3<f32>,
    mask: Option<&Array3<bool>>,
    params: &FdrParams,
) -> FdrClusters {
    let in_mask = |pos: (usize, usize, usize)| mask.map_or(true, |m| m[pos]);

    let mut pv: Vec<f64> = Vec::new();
    for (pos, &p) in pvalues.indexed_iter() {
        if !in_mask(pos) {
            continue;
        }
        if !(0.0..=1.0).contains(&p) {
            panic!("p-value map contains {} at {:?}; expected values in [0, 1]", p, pos);
        }
        pv.push(p as f64);
    }

    let threshold = bh_threshold(&pv, params.q);

    let threshold_f32 = match threshold {
        Some(t) => t as f32,
        None => {
            return FdrClusters {
                threshold: None,
                clusters: Array3::zeros(pvalues.dim()),
                sizes: Vec::new(),
            };
        }
    };

    let mut surviving = pvalues.mapv(|p| p <= threshold_f32);
    if let Some(mask) = mask {
        Zip::from(&mut surviving)
            .and(mask)
            .for_each(|s, &m| *s = *s && m);
    }

    let (components, ncomponents) = label_components(surviving.view(), params.connectivity);

    // Component sizes, indexed by label - 1.
    let mut sizes = vec![0usize; ncomponents as usize];
    for &v in components.iter() {
        if v != 0 {
            sizes[(v - 1) as usize] += 1;
        }
    }

    // Keep components meeting the size floor, ranked largest first.
    let order: Vec<(u32, usize)> = sizes
        .iter()
        .enumerate()
        .map(|(i, &n)| (i as u32 + 1, n))
        .filter(|&(_, n)| n >= params.min_cluster_size.max(1))
        .sorted_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .collect();

    let mut mapping = vec![0u32; ncomponents as usize + 1];
    for (rank, &(old, _)) in order.iter().enumerate() {
        mapping[old as usize] = rank as u32 + 1;
    }

    let clusters = components.mapv(|v| mapping[v as usize]);
    let sizes = order
        .iter()
        .enumerate()
        .map(|(rank, &(_, n))| (rank as u32 + 1, n))
        .collect();

    FdrClusters {
        threshold,
        clusters,
        sizes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn bh_threshold_classic_example() {
        // With m = 4 and q = 0.25, the cutoffs are 0.0625, 0.125, 0.1875,
        // 0.25: p = 0.01 and 0.04 pass (0.04 <= 0.125), 0.3 and 0.9 do not.
        let p = vec![0.3, 0.01, 0.9, 0.04];
        assert_eq!(bh_threshold(&p, 0.25), Some(0.04));
    }

    #[test]
    fn bh_threshold_none_when_nothing_passes() {
        let p = vec![0.5, 0.6, 0.9];
        assert_eq!(bh_threshold(&p, 0.05), None);
    }

    #[test]
    fn bh_threshold_accepts_everything_significant() {
        let p = vec![0.001, 0.002, 0.003];
        assert_eq!(bh_threshold(&p, 0.05), Some(0.003));
    }

    fn pmap() -> Array3<f32> {
        // Background at p = 1.0, two significant blobs: a 3-voxel bar and a
        // single voxel.
        let mut p = Array3::from_elem((8, 8, 8), 1.0f32);
        p[(1, 1, 1)] = 1e-6;
        p[(1, 1, 2)] = 1e-6;
        p[(1, 1, 3)] = 1e-6;
        p[(5, 5, 5)] = 1e-6;
        p
    }

    fn params(min_cluster_size: usize) -> FdrParams {
        FdrParams {
            q: 0.05,
            connectivity: Connectivity::Six,
            min_cluster_size,
        }
    }

    #[test]
    fn significant_blobs_become_size_ranked_clusters() {
        let out = fdr_cluster_index(&pmap(), None, &params(1));
        assert!(out.threshold.is_some());
        assert_eq!(out.sizes, vec![(1, 3), (2, 1)]);
        assert_eq!(out.clusters[(1, 1, 1)], 1);
        assert_eq!(out.clusters[(1, 1, 3)], 1);
        assert_eq!(out.clusters[(5, 5, 5)], 2);
        assert_eq!(out.clusters[(0, 0, 0)], 0);
    }

    #[test]
    fn min_cluster_size_drops_small_components() {
        let out = fdr_cluster_index(&pmap(), None, &params(2));
        assert_eq!(out.sizes, vec![(1, 3)]);
        assert_eq!(out.clusters[(5, 5, 5)], 0);
    }

    #[test]
    fn all_null_map_yields_empty_index() {
        let p = Array3::from_elem((4, 4, 4), 0.8f32);
        let out = fdr_cluster_index(&p, None, &params(1));
        assert_eq!(out.threshold, None);
        assert!(out.sizes.is_empty());
        assert!(out.clusters.iter().all(|&v| v == 0));
    }

    #[test]
    fn mask_excludes_voxels_from_correction_and_output() {
        let mut mask = Array3::from_elem((8, 8, 8), true);
        mask[(5, 5, 5)] = false;
        let out = fdr_cluster_index(&pmap(), Some(&mask), &params(1));
        assert_eq!(out.sizes, vec![(1, 3)]);
        assert_eq!(out.clusters[(5, 5, 5)], 0);
    }

    #[test]
    #[should_panic(expected = "expected values in [0, 1]")]
    fn out_of_range_pvalues_are_rejected() {
        let mut p = Array3::from_elem((2, 2, 2), 0.5f32);
        p[(0, 0, 0)] = 1.5;
        let _ = fdr_cluster_index(&p, None, &params(1));
    }
}

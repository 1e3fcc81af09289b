// Cluster index renumbering. The reversal convention: after FSL-style
// cluster extraction the largest surviving cluster gets ID 1, the second
// largest ID 2, and so on.

use ndarray::Array3;
use std::collections::HashMap;

/// Voxel count per nonzero label, sorted by label ID.
pub fn cluster_sizes(labels: &Array3<u32>) -> Vec<(u32, usize)> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &v in labels.iter() {
        if v != 0 {
            *counts.entry(v).or_insert(0) += 1;
        }
    }
    let mut sizes: Vec<(u32, usize)> = counts.into_iter().collect();
    sizes.sort_unstable_by_key(|&(id, _)| id);
    sizes
}

/// Renumber so the largest cluster becomes 1, the second largest 2, etc.
/// Ties are broken by original ID so the result does not depend on hash
/// iteration order. Background (0) is preserved.
pub fn reverse_clusters(labels: &Array3<u32>) -> Array3<u32> {
    let mut order = cluster_sizes(labels);
    order.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mapping: HashMap<u32, u32> = order
        .iter()
        .enumerate()
        .map(|(rank, &(id, _))| (id, rank as u32 + 1))
        .collect();

    labels.mapv(|v| if v == 0 { 0 } else { mapping[&v] })
}

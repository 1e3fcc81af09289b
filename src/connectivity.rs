// 3D connected-component labeling over boolean masks, with the three
// neighborhood definitions used for cell counting (6, 18, 26).

use clap::ValueEnum;
use ndarray::{Array3, ArrayView3};
use petgraph::unionfind::UnionFind;
use std::collections::HashMap;

/// Voxel neighborhood used when deciding whether two foreground voxels
/// belong to the same object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Connectivity {
    /// Face neighbors only.
    #[value(name = "6")]
    Six,
    /// Face and edge neighbors.
    #[value(name = "18")]
    Eighteen,
    /// Face, edge, and corner neighbors.
    #[value(name = "26")]
    TwentySix,
}

// Forward half of each neighborhood: every unordered neighbor pair is
// visited exactly once when scanning voxels in index order.
const OFFSETS_6: [(i64, i64, i64); 3] = [(1, 0, 0), (0, 1, 0), (0, 0, 1)];

const OFFSETS_18: [(i64, i64, i64); 9] = [
    (0, 0, 1),
    (0, 1, -1),
    (0, 1, 0),
    (0, 1, 1),
    (1, -1, 0),
    (1, 0, -1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, 0),
];

const OFFSETS_26: [(i64, i64, i64); 13] = [
    (0, 0, 1),
    (0, 1, -1),
    (0, 1, 0),
    (0, 1, 1),
    (1, -1, -1),
    (1, -1, 0),
    (1, -1, 1),
    (1, 0, -1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, -1),
    (1, 1, 0),
    (1, 1, 1),
];

impl Connectivity {
    fn forward_offsets(self) -> &'static [(i64, i64, i64)] {
        match self {
            Connectivity::Six => &OFFSETS_6,
            Connectivity::Eighteen => &OFFSETS_18,
            Connectivity::TwentySix => &OFFSETS_26,
        }
    }
}

/// Label the connected components of `mask`. Components are numbered
/// 1..=n in order of first appearance in index order (so labeling is
/// deterministic); background stays 0. Returns the label volume and n.
pub fn label_components(
    mask: ArrayView3<'_, bool>,
    connectivity: Connectivity,
) -> (Array3<u32>, u32) {
    let (nx, ny, nz) = mask.dim();
    let flat = |i: usize, j: usize, k: usize| (i * ny + j) * nz + k;

    let mut uf: UnionFind<usize> = UnionFind::new(nx * ny * nz);

    for ((i, j, k), &on) in mask.indexed_iter() {
        if !on {
            continue;
        }
        for &(di, dj, dk) in connectivity.forward_offsets() {
            let ni = i as i64 + di;
            let nj = j as i64 + dj;
            let nk = k as i64 + dk;
            if ni < 0 || nj < 0 || nk < 0 {
                continue;
            }
            let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
            if ni >= nx || nj >= ny || nk >= nz {
                continue;
            }
            if mask[(ni, nj, nk)] {
                uf.union(flat(i, j, k), flat(ni, nj, nk));
            }
        }
    }

    let mut labels = Array3::<u32>::zeros((nx, ny, nz));
    let mut root_label: HashMap<usize, u32> = HashMap::new();

    for ((i, j, k), &on) in mask.indexed_iter() {
        if !on {
            continue;
        }
        let root = uf.find(flat(i, j, k));
        let next = root_label.len() as u32 + 1;
        let label = *root_label.entry(root).or_insert(next);
        labels[(i, j, k)] = label;
    }

    let ncomponents = root_label.len() as u32;
    (labels, ncomponents)
}

/// Number of connected components in `mask`.
pub fn count_components(mask: ArrayView3<'_, bool>, connectivity: Connectivity) -> u32 {
    let (_, n) = label_components(mask, connectivity);
    n
}

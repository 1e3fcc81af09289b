// Axis-aligned 3D bounding boxes over labeled volumes. Boxes are computed
// from axis-wise any-projections: a voxel hit marks its coordinate on each
// axis, and the box spans the first through last marked coordinate per axis.

use ndarray::{s, Array3, ArrayView3};
use num_traits::Zero;

/// Inclusive start, exclusive end, per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub start: [usize; 3],
    pub end: [usize; 3],
}

impl BoundingBox {
    pub fn shape(&self) -> [usize; 3] {
        [
            self.end[0] - self.start[0],
            self.end[1] - self.start[1],
            self.end[2] - self.start[2],
        ]
    }

    pub fn nvoxels(&self) -> usize {
        let [nx, ny, nz] = self.shape();
        nx * ny * nz
    }

    pub fn contains(&self, pos: [usize; 3]) -> bool {
        (0..3).all(|ax| self.start[ax] <= pos[ax] && pos[ax] < self.end[ax])
    }

    /// View of `vol` restricted to this box.
    pub fn crop<'a, T>(&self, vol: &'a Array3<T>) -> ArrayView3<'a, T> {
        vol.slice(s![
            self.start[0]..self.end[0],
            self.start[1]..self.end[1],
            self.start[2]..self.end[2]
        ])
    }
}

fn of_predicate<T, F>(vol: &Array3<T>, pred: F) -> Option<BoundingBox>
where
    F: Fn(&T) -> bool,
{
    let (nx, ny, nz) = vol.dim();
    let mut xs = vec![false; nx];
    let mut ys = vec![false; ny];
    let mut zs = vec![false; nz];

    for ((i, j, k), v) in vol.indexed_iter() {
        if pred(v) {
            xs[i] = true;
            ys[j] = true;
            zs[k] = true;
        }
    }

    let (x0, x1) = extent(&xs)?;
    let (y0, y1) = extent(&ys)?;
    let (z0, z1) = extent(&zs)?;

    Some(BoundingBox {
        start: [x0, y0, z0],
        end: [x1, y1, z1],
    })
}

// First and one-past-last set flag, or None if no flag is set.
fn extent(hits: &[bool]) -> Option<(usize, usize)> {
    let first = hits.iter().position(|&h| h)?;
    let last = hits.iter().rposition(|&h| h).unwrap();
    Some((first, last + 1))
}

/// Bounding box of all voxels equal to `id`, or None if the label is absent.
pub fn of_label<T>(vol: &Array3<T>, id: T) -> Option<BoundingBox>
where
    T: Copy + PartialEq,
{
    of_predicate(vol, |&v| v == id)
}

/// Union bounding box of all nonzero voxels. This is the crop applied once
/// up front so per-cluster work never scans empty margins.
pub fn of_foreground<T>(vol: &Array3<T>) -> Option<BoundingBox>
where
    T: Copy + PartialEq + Zero,
{
    of_predicate(vol, |&v| v != T::zero())
}

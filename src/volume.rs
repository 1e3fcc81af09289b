// NIfTI volume I/O: label/cluster indices load as u32, signal and p-value
// maps as f32. Geometry is carried by keeping the input header around and
// reusing it when writing results.

use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiError, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

fn read_ndarray(path: &Path) -> Result<(ArrayD<f32>, NiftiHeader), NiftiError> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    let img = obj.into_volume().into_ndarray::<f32>()?;
    Ok((img, header))
}

fn to_3d(img: ArrayD<f32>, path: &Path) -> Array3<f32> {
    // Tolerate trailing singleton dimensions (e.g. 3D maps saved as
    // x,y,z,1 by other tools).
    let mut img = img;
    while img.ndim() > 3 && img.shape()[img.ndim() - 1] == 1 {
        let last = Axis(img.ndim() - 1);
        img = img.index_axis_move(last, 0);
    }

    match img.into_dimensionality::<Ix3>() {
        Ok(img) => img,
        Err(_) => panic!("{}: expected a 3D volume", path.display()),
    }
}

/// Read an intensity, segmentation, or p-value volume as f32.
pub fn read_map(path: &Path) -> Result<(Array3<f32>, NiftiHeader), NiftiError> {
    let (img, header) = read_ndarray(path)?;
    Ok((to_3d(img, path), header))
}

/// Read an integer-labeled volume (cluster or atlas index). Voxels must be
/// nonnegative integers; anything else means the wrong image was passed.
pub fn read_labels(path: &Path) -> Result<(Array3<u32>, NiftiHeader), NiftiError> {
    let (img, header) = read_ndarray(path)?;
    let img = to_3d(img, path);

    let labels = img.mapv(|v| {
        if v < 0.0 || v.fract() != 0.0 {
            panic!(
                "{}: voxel value {} is not a nonnegative integer label",
                path.display(),
                v
            );
        }
        v as u32
    });

    Ok((labels, header))
}

pub fn write_labels(
    path: &Path,
    labels: &Array3<u32>,
    reference: &NiftiHeader,
) -> Result<(), NiftiError> {
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(labels)
}

pub fn write_map(
    path: &Path,
    map: &Array3<f32>,
    reference: &NiftiHeader,
) -> Result<(), NiftiError> {
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(map)
}

/// Per-axis voxel dimensions from the header, in the header's spatial units.
pub fn voxel_dims(header: &NiftiHeader) -> [f64; 3] {
    [
        header.pixdim[1].abs() as f64,
        header.pixdim[2].abs() as f64,
        header.pixdim[3].abs() as f64,
    ]
}

/// Volume of a single voxel in mm³.
pub fn voxel_volume_mm3(header: &NiftiHeader) -> f64 {
    let [dx, dy, dz] = voxel_dims(header);
    dx * dy * dz
}

/// Two volumes that are analyzed jointly must sit on the same grid.
pub fn assert_same_shape<A, B>(
    name_a: &str,
    a: &Array3<A>,
    name_b: &str,
    b: &Array3<B>,
) {
    if a.dim() != b.dim() {
        panic!(
            "{} has shape {:?} but {} has shape {:?}; volumes must share a grid",
            name_a,
            a.dim(),
            name_b,
            b.dim()
        );
    }
}

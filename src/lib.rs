//! Cluster-wise measurement of segmented 3D brain volumes.
//!
//! The pipeline stages are independent binaries chained by file I/O:
//! NIfTI cluster indices and segmentation volumes in, per-cluster CSV
//! tables out.

pub mod bbox;
pub mod cells;
pub mod connectivity;
pub mod correlation;
pub mod fdr;
pub mod measure;
pub mod output;
pub mod relabel;
pub mod volume;

/// Run-wide settings, built once from CLI flags and passed down explicitly.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunConfig {
    pub verbose: bool,
}

impl RunConfig {
    pub fn new(verbose: bool) -> Self {
        RunConfig { verbose }
    }

    /// Print a progress line when running verbosely.
    pub fn log(&self, msg: impl AsRef<str>) {
        if self.verbose {
            println!("{}", msg.as_ref());
        }
    }
}

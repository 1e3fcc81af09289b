// Correlation between two per-cluster measures, e.g. cell-count density
// against mean immunofluorescence. Tables are joined on cluster ID and fit
// with ordinary least squares.

use crate::cells::find_column;
use flate2::read::GzDecoder;
use linregress::{Error as RegressionError, FormulaRegressionBuilder, RegressionDataBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;

#[derive(Clone, Copy, Debug)]
pub struct CorrelationSummary {
    pub n: usize,
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub r_squared: f64,
    pub p_value: f64,
}

/// Read a (cluster, value) column pair from a per-cluster table written by
/// this toolkit. Rows with an empty or non-numeric value are skipped.
pub fn read_measure_column(path: &str, value_column: &str) -> Vec<(u32, f64)> {
    let file = File::open(path)
        .unwrap_or_else(|err| panic!("Unable to open {}: {}", path, err));
    let reader: Box<dyn Read> = if path.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers().unwrap();
    let cluster_col = find_column(headers, "cluster");
    let value_col = find_column(headers, value_column);

    let mut values = Vec::new();
    for result in rdr.records() {
        let row = result.unwrap();
        let cluster = row[cluster_col]
            .parse::<u32>()
            .unwrap_or_else(|_| panic!("Non-integer cluster ID '{}'", &row[cluster_col]));
        if let Ok(value) = row[value_col].parse::<f64>() {
            values.push((cluster, value));
        }
    }
    values
}

/// Inner join on cluster ID, preserving the order of `a`.
pub fn join_on_cluster(a: &[(u32, f64)], b: &[(u32, f64)]) -> (Vec<f64>, Vec<f64>) {
    let b_by_id: HashMap<u32, f64> = b.iter().copied().collect();

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for &(id, va) in a {
        if let Some(&vb) = b_by_id.get(&id) {
            xs.push(va);
            ys.push(vb);
        }
    }
    (xs, ys)
}

/// Fit y ~ x and summarize the linear association.
pub fn correlate(xs: &[f64], ys: &[f64]) -> Result<CorrelationSummary, RegressionError> {
    assert_eq!(xs.len(), ys.len());

    let data = vec![("y", ys.to_vec()), ("x", xs.to_vec())];
    let data = RegressionDataBuilder::new().build_from(data)?;
    let model = FormulaRegressionBuilder::new()
        .data(&data)
        .formula("y ~ x")
        .fit()?;

    let intercept = model.parameters()[0];
    let slope = model.parameters()[1];
    let r_squared = model.rsquared();
    let r = slope.signum() * r_squared.sqrt();
    let p_value = model.p_values()[1];

    Ok(CorrelationSummary {
        n: xs.len(),
        slope,
        intercept,
        r,
        r_squared,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn join_keeps_only_shared_clusters() {
        let a = vec![(1, 1.0), (2, 2.0), (4, 4.0)];
        let b = vec![(2, 20.0), (3, 30.0), (4, 40.0)];
        let (xs, ys) = join_on_cluster(&a, &b);
        assert_eq!(xs, vec![2.0, 4.0]);
        assert_eq!(ys, vec![20.0, 40.0]);
    }

    #[test]
    fn perfect_linear_relation_has_unit_correlation() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 * x + 1.0).collect();
        let summary = correlate(&xs, &ys).unwrap();
        assert!((summary.slope - 3.0).abs() < 1e-8);
        assert!((summary.intercept - 1.0).abs() < 1e-8);
        assert!((summary.r - 1.0).abs() < 1e-8);
    }

    #[test]
    fn negative_association_has_negative_r() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ys = vec![9.8, 8.1, 6.2, 3.9, 2.2, 0.1];
        let summary = correlate(&xs, &ys).unwrap();
        assert!(summary.slope < 0.0);
        assert!(summary.r < -0.99);
    }

    #[test]
    fn reads_cluster_value_pairs_and_skips_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            "cluster,cluster_voxels,cluster_volume_mm3,count,count_per_mm3\n\
             1,10,5,4,0.8\n\
             2,0,0,0,\n\
             3,8,4,2,0.5\n"
        )
        .unwrap();
        drop(file);

        let values = read_measure_column(path.to_str().unwrap(), "count_per_mm3");
        assert_eq!(values, vec![(1, 0.8), (3, 0.5)]);
    }
}

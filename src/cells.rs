// Cell metadata wrangling for ABCA/MERFISH tables: read the (possibly
// gzipped) per-cell CSV, intern annotation class names, drop cells whose
// class does not match the requested filter, and assign each cell to a
// cluster by looking its coordinates up in a cluster index volume.

use flate2::read::GzDecoder;
use ndarray::Array3;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Index into `CellTable::class_names`.
    pub class: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CellTable {
    pub class_names: Vec<String>,
    pub cells: Vec<Cell>,
}

pub(crate) fn find_column(headers: &csv::StringRecord, column: &str) -> usize {
    match headers.iter().position(|x| x == column) {
        Some(col) => col,
        None => panic!("Column '{}' not found in CSV file", column),
    }
}

/// Read a cell metadata CSV. Column names are configurable because the
/// Allen releases are not consistent about them (`x_ccf` vs `x`, `class`
/// vs `subclass`, ...). `include_classes`, when given, keeps only cells
/// whose class annotation matches.
pub fn read_cell_metadata_csv(
    path: &str,
    x_column: &str,
    y_column: &str,
    z_column: &str,
    class_column: &str,
    include_classes: Option<&Regex>,
) -> CellTable {
    let file = File::open(path)
        .unwrap_or_else(|err| panic!("Unable to open {}: {}", path, err));
    let reader: Box<dyn Read> = if path.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr.headers().unwrap();
    let x_col = find_column(headers, x_column);
    let y_col = find_column(headers, y_column);
    let z_col = find_column(headers, z_column);
    let class_col = find_column(headers, class_column);

    let mut class_name_map: HashMap<String, u32> = HashMap::new();
    let mut table = CellTable::default();

    for result in rdr.records() {
        let row = result.unwrap();

        let class_name = &row[class_col];
        if let Some(pattern) = include_classes {
            if !pattern.is_match(class_name) {
                continue;
            }
        }

        let class = if let Some(&class) = class_name_map.get(class_name) {
            class
        } else {
            let class = table.class_names.len() as u32;
            table.class_names.push(class_name.to_string());
            class_name_map.insert(class_name.to_string(), class);
            class
        };

        let x = row[x_col].parse::<f64>().unwrap_or_else(|_| {
            panic!("Non-numeric {} value '{}'", x_column, &row[x_col])
        });
        let y = row[y_col].parse::<f64>().unwrap_or_else(|_| {
            panic!("Non-numeric {} value '{}'", y_column, &row[y_col])
        });
        let z = row[z_col].parse::<f64>().unwrap_or_else(|_| {
            panic!("Non-numeric {} value '{}'", z_column, &row[z_col])
        });

        table.cells.push(Cell { x, y, z, class });
    }

    table
}

/// Cluster ID for each cell. Physical coordinates are multiplied by
/// `coordinate_scale`, divided by the voxel dimensions, and floored to a
/// voxel index; cells falling outside the volume land in background (0).
pub fn assign_cells(
    clusters: &Array3<u32>,
    table: &CellTable,
    voxel_dims: [f64; 3],
    coordinate_scale: f64,
) -> Vec<u32> {
    let dim = clusters.dim();
    let shape = [dim.0, dim.1, dim.2];

    table
        .cells
        .iter()
        .map(|cell| {
            let coords = [cell.x, cell.y, cell.z];
            let mut idx = [0usize; 3];
            for ax in 0..3 {
                let v = (coords[ax] * coordinate_scale / voxel_dims[ax]).floor();
                if v < 0.0 || v >= shape[ax] as f64 {
                    return 0;
                }
                idx[ax] = v as usize;
            }
            clusters[(idx[0], idx[1], idx[2])]
        })
        .collect()
}

/// Cell counts keyed by (cluster ID, class index), background excluded.
pub fn count_by_cluster_class(
    assignments: &[u32],
    table: &CellTable,
) -> BTreeMap<(u32, u32), usize> {
    assert_eq!(assignments.len(), table.cells.len());

    let mut counts: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    for (&cluster, cell) in assignments.iter().zip(table.cells.iter()) {
        if cluster != 0 {
            *counts.entry((cluster, cell.class)).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::io::Write;

    fn write_csv(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let path = path.to_str().unwrap().to_string();
        (dir, path)
    }

    const METADATA: &str = "\
cell_label,x_ccf,y_ccf,z_ccf,class\n\
a,0.5,0.5,0.5,30 Astro\n\
b,1.5,0.5,0.5,30 Astro\n\
c,2.5,2.5,2.5,01 IT-ET Glut\n\
d,9.5,9.5,9.5,01 IT-ET Glut\n";

    #[test]
    fn reads_and_interns_classes() {
        let (_dir, path) = write_csv(METADATA);
        let table =
            read_cell_metadata_csv(&path, "x_ccf", "y_ccf", "z_ccf", "class", None);
        assert_eq!(table.cells.len(), 4);
        assert_eq!(table.class_names, vec!["30 Astro", "01 IT-ET Glut"]);
        assert_eq!(table.cells[0].class, 0);
        assert_eq!(table.cells[2].class, 1);
    }

    #[test]
    fn class_filter_drops_nonmatching_cells() {
        let (_dir, path) = write_csv(METADATA);
        let pattern = Regex::new("Glut").unwrap();
        let table = read_cell_metadata_csv(
            &path,
            "x_ccf",
            "y_ccf",
            "z_ccf",
            "class",
            Some(&pattern),
        );
        assert_eq!(table.cells.len(), 2);
        assert_eq!(table.class_names, vec!["01 IT-ET Glut"]);
    }

    #[test]
    #[should_panic(expected = "not found in CSV file")]
    fn missing_column_is_fatal() {
        let (_dir, path) = write_csv(METADATA);
        let _ = read_cell_metadata_csv(&path, "x", "y_ccf", "z_ccf", "class", None);
    }

    fn cluster_volume() -> Array3<u32> {
        let mut clusters = Array3::<u32>::zeros((4, 4, 4));
        clusters[(0, 0, 0)] = 1;
        clusters[(1, 0, 0)] = 2;
        clusters[(2, 2, 2)] = 2;
        clusters
    }

    #[test]
    fn cells_map_to_clusters_by_coordinate() {
        let (_dir, path) = write_csv(METADATA);
        let table =
            read_cell_metadata_csv(&path, "x_ccf", "y_ccf", "z_ccf", "class", None);
        let assignments = assign_cells(&cluster_volume(), &table, [1.0, 1.0, 1.0], 1.0);
        // a -> voxel (0,0,0) -> cluster 1; b -> (1,0,0) -> 2;
        // c -> (2,2,2) -> 2; d is out of bounds -> background.
        assert_eq!(assignments, vec![1, 2, 2, 0]);
    }

    #[test]
    fn coordinate_scale_converts_units() {
        let (_dir, path) = write_csv(METADATA);
        let table =
            read_cell_metadata_csv(&path, "x_ccf", "y_ccf", "z_ccf", "class", None);
        // Finer x sampling: voxel index = x / 0.5 along the first axis.
        let assignments = assign_cells(&cluster_volume(), &table, [0.5, 1.0, 1.0], 1.0);
        // a -> (1,0,0) -> cluster 2; b -> (3,0,0) -> background.
        assert_eq!(assignments[0], 2);
        assert_eq!(assignments[1], 0);
    }

    #[test]
    fn counting_excludes_background() {
        let (_dir, path) = write_csv(METADATA);
        let table =
            read_cell_metadata_csv(&path, "x_ccf", "y_ccf", "z_ccf", "class", None);
        let assignments = assign_cells(&cluster_volume(), &table, [1.0, 1.0, 1.0], 1.0);
        let counts = count_by_cluster_class(&assignments, &table);

        let mut expected = BTreeMap::new();
        expected.insert((1u32, 0u32), 1usize); // cluster 1: one Astro
        expected.insert((2, 0), 1); // cluster 2: one Astro
        expected.insert((2, 1), 1); // cluster 2: one Glut
        assert_eq!(counts, expected);
    }
}

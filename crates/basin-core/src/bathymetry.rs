use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BathymetryError;

/// A 2D elevation grid in metres, row-major: row `i` is along-shore,
/// value `j` within the row is cross-shore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bathymetry {
    /// Row-major elevation values in metres (negative below datum).
    pub data: Vec<f64>,
    pub nx: usize,
    pub ny: usize,
}

impl Bathymetry {
    /// Create a new grid filled with the given value.
    pub fn new(nx: usize, ny: usize, fill: f64) -> Self {
        Self { data: vec![fill; nx * ny], nx, ny }
    }

    /// Shelf uniform along-shore: land above `shore_row`, sloping into the
    /// sea beyond it.  Elevation is `(shore_row − j − 0.5) · y_res · slope`,
    /// so row `shore_row` is the first submerged row.
    pub fn sloping_shelf(nx: usize, ny: usize, y_res: f64, shore_row: usize, slope: f64) -> Self {
        let mut b = Self::new(nx, ny, 0.0);
        for i in 0..nx {
            for j in 0..ny {
                let z = (shore_row as f64 - j as f64 - 0.5) * y_res * slope;
                b.set(i, j, z);
            }
        }
        b
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.ny + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, val: f64) {
        self.data[i * self.ny + j] = val;
    }

    pub fn min_elevation(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max_elevation(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Parse a `;`-delimited grid.  Lines starting with `#` and blank lines
    /// are skipped; every data line must have the same number of values.
    pub fn parse(text: &str) -> Result<Self, BathymetryError> {
        let mut data = Vec::new();
        let mut ny = 0usize;
        let mut nx = 0usize;
        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row: Vec<f64> = line
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .enumerate()
                .map(|(col, s)| {
                    s.parse::<f64>().map_err(|_| BathymetryError::Parse {
                        line: n + 1,
                        column: col + 1,
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
            if nx == 0 {
                ny = row.len();
            } else if row.len() != ny {
                return Err(BathymetryError::Ragged { line: n + 1, expected: ny, found: row.len() });
            }
            data.extend(row);
            nx += 1;
        }
        if nx == 0 || ny == 0 {
            return Err(BathymetryError::Empty);
        }
        Ok(Self { data, nx, ny })
    }

    pub fn from_file(path: &Path) -> Result<Self, BathymetryError> {
        let text = fs::read_to_string(path).map_err(|source| BathymetryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let b = Self::parse(&text)?;
        tracing::info!(path = %path.display(), nx = b.nx, ny = b.ny, "bathymetry.loaded");
        Ok(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_grid_with_comments() {
        let text = "# elevation (m)\n 5 ; 1 ; -3\n\n# second row\n4;0;-2\n";
        let b = Bathymetry::parse(text).unwrap();
        assert_eq!((b.nx, b.ny), (2, 3));
        assert_eq!(b.get(0, 2), -3.0);
        assert_eq!(b.get(1, 0), 4.0);
        assert_eq!(b.min_elevation(), -3.0);
        assert_eq!(b.max_elevation(), 5.0);
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Bathymetry::parse("1;2;3\n1;2\n").unwrap_err();
        assert!(matches!(err, BathymetryError::Ragged { line: 2, expected: 3, found: 2 }));
    }

    #[test]
    fn bad_number_reports_position() {
        let err = Bathymetry::parse("1;x;3\n").unwrap_err();
        assert!(matches!(err, BathymetryError::Parse { line: 1, column: 2, .. }), "{err:?}");
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(Bathymetry::parse("# nothing\n"), Err(BathymetryError::Empty)));
    }

    #[test]
    fn shelf_shoreline_at_requested_row() {
        let b = Bathymetry::sloping_shelf(4, 10, 100.0, 3, 0.01);
        for i in 0..4 {
            assert!(b.get(i, 2) > 0.0);
            assert!(b.get(i, 3) < 0.0);
        }
    }
}

/// ESRI ASCII grid rasters, the format the monthly satellite rainfall
/// products are delivered in.
///
/// # Expected layout:
/// ```text
/// ncols        4
/// nrows        3
/// xllcorner    33.5
/// yllcorner    -1.0
/// cellsize     0.05
/// NODATA_value -9999
/// 12.0 14.5 -9999 13.1
/// ...                      (nrows lines, northernmost row first)
/// ```
use thiserror::Error;

use crate::geo::GeoPoint;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridParseError {
    #[error("Missing header field: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid header value for {key}: {value}")]
    InvalidHeader { key: String, value: String },

    #[error("{key} must be a positive whole number, got {value}")]
    InvalidDimension { key: String, value: String },

    #[error("cellsize must be positive, got {0}")]
    InvalidCellSize(f64),

    #[error("Grid of {ncols} x {nrows} cells is too large")]
    TooLarge { ncols: usize, nrows: usize },

    #[error("Invalid cell value at row {row}: {value}")]
    InvalidCell { row: usize, value: String },

    #[error("Expected {expected} cells, found {found}")]
    CellCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGrid {
    pub ncols: usize,
    pub nrows: usize,
    /// Longitude of the western edge
    pub xll: f64,
    /// Latitude of the southern edge
    pub yll: f64,
    pub cellsize: f64,
    pub nodata: f64,
    /// Row-major, northernmost row first
    pub values: Vec<f64>,
}

impl AsciiGrid {
    pub fn parse(raw: &str) -> Result<Self, GridParseError> {
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut centre_registered = false;
        let mut cellsize = None;
        let mut nodata = -9999.0;
        let mut values = Vec::new();

        for (line_idx, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let first = trimmed.split_whitespace().next().unwrap_or_default();
            if first.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                let value = trimmed[first.len()..].trim();
                let parse = |v: &str| {
                    v.parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite())
                        .ok_or_else(|| GridParseError::InvalidHeader {
                            key: first.to_string(),
                            value: v.to_string(),
                        })
                };
                let dimension = |v: &str| -> Result<usize, GridParseError> {
                    let n = parse(v)?;
                    if n < 1.0 || n.fract() != 0.0 || n > f64::from(u32::MAX) {
                        return Err(GridParseError::InvalidDimension {
                            key: first.to_string(),
                            value: v.to_string(),
                        });
                    }
                    Ok(n as usize)
                };
                match first.to_ascii_lowercase().as_str() {
                    "ncols" => ncols = Some(dimension(value)?),
                    "nrows" => nrows = Some(dimension(value)?),
                    "xllcorner" => xll = Some(parse(value)?),
                    "yllcorner" => yll = Some(parse(value)?),
                    "xllcenter" => {
                        xll = Some(parse(value)?);
                        centre_registered = true;
                    }
                    "yllcenter" => {
                        yll = Some(parse(value)?);
                        centre_registered = true;
                    }
                    "cellsize" => cellsize = Some(parse(value)?),
                    "nodata_value" => nodata = parse(value)?,
                    _ => {
                        return Err(GridParseError::InvalidHeader {
                            key: first.to_string(),
                            value: value.to_string(),
                        })
                    }
                }
                continue;
            }

            for token in trimmed.split_whitespace() {
                let value = token.parse::<f64>().map_err(|_| GridParseError::InvalidCell {
                    row: line_idx,
                    value: token.to_string(),
                })?;
                values.push(value);
            }
        }

        let ncols = ncols.ok_or(GridParseError::MissingHeader("ncols"))?;
        let nrows = nrows.ok_or(GridParseError::MissingHeader("nrows"))?;
        let cellsize = cellsize.ok_or(GridParseError::MissingHeader("cellsize"))?;
        if cellsize <= 0.0 {
            return Err(GridParseError::InvalidCellSize(cellsize));
        }
        let mut xll = xll.ok_or(GridParseError::MissingHeader("xllcorner"))?;
        let mut yll = yll.ok_or(GridParseError::MissingHeader("yllcorner"))?;
        if centre_registered {
            xll -= cellsize / 2.0;
            yll -= cellsize / 2.0;
        }

        let expected = ncols
            .checked_mul(nrows)
            .ok_or(GridParseError::TooLarge { ncols, nrows })?;
        if values.len() != expected {
            return Err(GridParseError::CellCount {
                expected,
                found: values.len(),
            });
        }

        Ok(Self {
            ncols,
            nrows,
            xll,
            yll,
            cellsize,
            nodata,
            values,
        })
    }

    pub fn cell_centre(&self, row: usize, col: usize) -> GeoPoint {
        GeoPoint::new(
            self.yll + (self.nrows - row) as f64 * self.cellsize - self.cellsize / 2.0,
            self.xll + col as f64 * self.cellsize + self.cellsize / 2.0,
        )
    }

    /// Cell value, or `None` for nodata / non-finite cells.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = *self.values.get(row * self.ncols + col)?;
        (v.is_finite() && (v - self.nodata).abs() > f64::EPSILON).then_some(v)
    }

    /// Value of the cell containing `point`, if inside the grid and valid.
    pub fn value_at(&self, point: &GeoPoint) -> Option<f64> {
        let col = ((point.lon - self.xll) / self.cellsize).floor();
        let row_from_south = ((point.lat - self.yll) / self.cellsize).floor();
        if col < 0.0 || row_from_south < 0.0 {
            return None;
        }
        let (col, row_from_south) = (col as usize, row_from_south as usize);
        if col >= self.ncols || row_from_south >= self.nrows {
            return None;
        }
        self.value(self.nrows - 1 - row_from_south, col)
    }

    /// Iterate `(centre, value)` over valid cells.
    pub fn valid_cells(&self) -> impl Iterator<Item = (GeoPoint, f64)> + '_ {
        (0..self.nrows).flat_map(move |row| {
            (0..self.ncols)
                .filter_map(move |col| self.value(row, col).map(|v| (self.cell_centre(row, col), v)))
        })
    }
}

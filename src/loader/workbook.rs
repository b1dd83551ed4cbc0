/// Maize tables delivered as Excel workbooks.
///
/// # Expected Sheet Structure (first sheet):
/// ```text
/// Row 1: county | year | production_tonnes | area_ha      (any order)
/// Row 2+: one county-year per row
/// ```
/// Synchronous; callers read the bytes and run it on `spawn_blocking`.
use calamine::{Data, Range, Reader, Xlsx};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::adapters::maize::MaizeRecord;
use crate::counties::County;
use crate::error::LoadError;
use crate::loader::tables::parse_number;
use crate::model::clean_value;

fn invalid(path: &Path, row: usize, msg: String) -> LoadError {
    LoadError::InvalidValue {
        path: path.to_path_buf(),
        row,
        msg,
    }
}

fn cell_text(range: &Range<Data>, row: usize, col: usize) -> String {
    match range.get((row, col)) {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Float(f)) => f.to_string(),
        Some(Data::Int(i)) => i.to_string(),
        _ => String::new(),
    }
}

fn cell_number(range: &Range<Data>, path: &Path, row: usize, col: usize) -> Result<Option<f64>, LoadError> {
    match range.get((row, col)) {
        Some(Data::Float(f)) => Ok(clean_value(Some(*f))),
        Some(Data::Int(i)) => Ok(clean_value(Some(*i as f64))),
        Some(Data::String(s)) => parse_number(s, path, row + 1),
        Some(Data::Empty) | None => Ok(None),
        other => Err(invalid(path, row + 1, format!("Expected number, got: {other:?}"))),
    }
}

/// Parse the first sheet of an in-memory `.xlsx` workbook read from `path`.
pub fn read_maize_workbook(path: &Path, bytes: Vec<u8>) -> Result<Vec<MaizeRecord>, LoadError> {
    let workbook_error = |msg: String| LoadError::Workbook {
        path: path.to_path_buf(),
        msg,
    };
    let mut workbook = match Xlsx::new(Cursor::new(bytes)) {
        Ok(wb) => wb,
        Err(e) => return Err(workbook_error(e.to_string())),
    };

    let sheet_names = workbook.sheet_names().to_owned();
    let Some(first) = sheet_names.first() else {
        return Err(workbook_error("Workbook has no sheets".to_string()));
    };
    let range = workbook
        .worksheet_range(first)
        .map_err(|e| workbook_error(e.to_string()))?;
    debug!(sheet = %first, rows = range.height(), "Reading maize sheet");
    parse_maize_range(&range, path)
}

/// Parse a maize sheet whose first row holds the column names.
pub fn parse_maize_range(range: &Range<Data>, path: &Path) -> Result<Vec<MaizeRecord>, LoadError> {
    let columns: BTreeMap<String, usize> = (0..range.width())
        .map(|col| (cell_text(range, 0, col).to_ascii_lowercase(), col))
        .collect();
    let column = |name: &str| {
        columns.get(name).copied().ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
    };
    let county_col = column("county")?;
    let year_col = column("year")?;
    let production_col = column("production_tonnes")?;
    let area_col = column("area_ha")?;

    let mut records = Vec::new();
    for row in 1..range.height() {
        let county_name = cell_text(range, row, county_col);
        if county_name.is_empty() {
            continue;
        }
        let county = county_name
            .parse::<County>()
            .map_err(|source| LoadError::UnknownCounty {
                path: path.to_path_buf(),
                row: row + 1,
                source,
            })?;
        let year = cell_number(range, path, row, year_col)?
            .ok_or_else(|| invalid(path, row + 1, "Missing year".to_string()))?;
        if year.fract() != 0.0 || !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&year) {
            return Err(invalid(path, row + 1, format!("Invalid year: {year}")));
        }

        records.push(MaizeRecord {
            county,
            year: year as i32,
            production_tonnes: cell_number(range, path, row, production_col)?,
            area_ha: cell_number(range, path, row, area_col)?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(rows: Vec<Vec<Data>>) -> Range<Data> {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (rows.len() as u32 - 1, width - 1));
        for (r, cells) in rows.iter().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    fn header() -> Vec<Data> {
        vec![text("Area_ha"), text("County"), text("Year"), text("Production_Tonnes")]
    }

    #[test]
    fn test_sheet_columns_are_found_by_name() {
        let rows = vec![
            header(),
            vec![Data::Float(1200.0), text("Kitui"), Data::Float(2020.0), Data::Int(1800)],
            vec![Data::Empty, text(""), Data::Float(2021.0), Data::Float(5.0)],
            vec![text("950.5"), text("Makueni"), Data::Int(2021), Data::Empty],
        ];
        let path = Path::new("maize.xlsx");

        let records = parse_maize_range(&sheet(rows), path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].county, County::Kitui);
        assert_eq!(records[0].year, 2020);
        assert_eq!(records[0].production_tonnes, Some(1800.0));
        assert_eq!(records[0].area_ha, Some(1200.0));
        assert_eq!(records[1].county, County::Makueni);
        assert_eq!(records[1].year, 2021);
        assert_eq!(records[1].production_tonnes, None);
        assert_eq!(records[1].area_ha, Some(950.5));
    }

    #[test]
    fn test_sheet_without_area_column() {
        let rows = vec![
            vec![text("county"), text("year"), text("production_tonnes")],
            vec![text("Kitui"), Data::Float(2020.0), Data::Float(1.0)],
        ];
        let err = parse_maize_range(&sheet(rows), Path::new("maize.xlsx")).unwrap_err();
        match err {
            LoadError::MissingColumn { column, .. } => assert_eq!(column, "area_ha"),
            other => panic!("Expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_sheet_with_unknown_county() {
        let rows = vec![
            header(),
            vec![Data::Float(1.0), text("Kitui"), Data::Float(2020.0), Data::Float(1.0)],
            vec![Data::Float(1.0), text("Atlantis"), Data::Float(2020.0), Data::Float(1.0)],
        ];
        let err = parse_maize_range(&sheet(rows), Path::new("maize.xlsx")).unwrap_err();
        assert!(matches!(err, LoadError::UnknownCounty { row: 3, .. }));
    }

    #[test]
    fn test_sheet_with_fractional_year() {
        let rows = vec![
            header(),
            vec![Data::Float(1.0), text("Kitui"), Data::Float(2020.5), Data::Float(1.0)],
        ];
        let err = parse_maize_range(&sheet(rows), Path::new("maize.xlsx")).unwrap_err();
        assert!(matches!(err, LoadError::InvalidValue { row: 2, .. }));
    }

    #[test]
    fn test_bytes_that_are_not_a_workbook() {
        let err = read_maize_workbook(Path::new("maize.xlsx"), b"county,year\n".to_vec()).unwrap_err();
        assert!(matches!(err, LoadError::Workbook { .. }));
    }
}

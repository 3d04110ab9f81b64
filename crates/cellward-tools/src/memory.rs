//! A plain in-process [`SpreadsheetApi`] backed by a hash map, used by
//! the `cellward` CLI's `tool` subcommand and available to any host
//! that wants to exercise the tool catalogue without wiring up a real
//! spreadsheet engine. Not part of the spec's external interface —
//! production hosts supply their own [`SpreadsheetApi`].

use crate::spreadsheet_api::{Address, AddressedCell, SpreadsheetApi};
use cellward_protocol::{Cell, Range, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Sheets {
    cells: HashMap<(String, u32, u32), Cell>,
    sheet_names: Vec<String>,
}

/// Thread-safe in-memory spreadsheet. Cloning (`clone_handle`) shares
/// the underlying document rather than forking it, matching a host
/// that hands out multiple handles onto the same live workbook.
#[derive(Clone)]
pub struct InMemorySpreadsheet {
    inner: Arc<Mutex<Sheets>>,
}

impl InMemorySpreadsheet {
    pub fn new(sheet_names: Vec<String>) -> Self {
        let sheet_names = if sheet_names.is_empty() { vec!["Sheet1".to_string()] } else { sheet_names };
        Self { inner: Arc::new(Mutex::new(Sheets { cells: HashMap::new(), sheet_names })) }
    }

    /// Seed the document from a `{sheet: [[value, ...], ...]}` JSON
    /// object, the shape the `cellward tool` CLI command accepts as a
    /// fixture file.
    pub fn from_fixture(fixture: &Value) -> Self {
        let mut sheet_names = Vec::new();
        let mut cells = HashMap::new();
        if let Some(obj) = fixture.as_object() {
            for (sheet, rows) in obj {
                sheet_names.push(sheet.clone());
                if let Some(rows) = rows.as_array() {
                    for (r, row) in rows.iter().enumerate() {
                        if let Some(row) = row.as_array() {
                            for (c, value) in row.iter().enumerate() {
                                cells.insert((sheet.clone(), r as u32, c as u32), cell_from_json(value));
                            }
                        }
                    }
                }
            }
        }
        Self { inner: Arc::new(Mutex::new(Sheets { cells, sheet_names })) }
    }
}

fn cell_from_json(value: &Value) -> Cell {
    use cellward_protocol::{CellValue, Scalar};
    if let Some(s) = value.as_str() {
        if let Some(formula) = s.strip_prefix('=') {
            return Cell::formula(format!("={formula}"));
        }
        return Cell::value(CellValue::Scalar(Scalar::String(s.to_string())));
    }
    let scalar = match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => Scalar::Number(n.as_f64().unwrap_or(f64::NAN)),
        other => Scalar::String(other.to_string()),
    };
    Cell::value(CellValue::Scalar(scalar))
}

impl SpreadsheetApi for InMemorySpreadsheet {
    fn list_sheets(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().unwrap().sheet_names.clone())
    }

    fn list_non_empty_cells(&self, sheet: Option<&str>) -> Result<Vec<AddressedCell>> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .cells
            .iter()
            .filter(|((s, _, _), _)| sheet.map_or(true, |want| want == s))
            .map(|((s, row, col), cell)| AddressedCell {
                address: Address::new(cellward_protocol::SheetId::new(s.clone()), *row, *col),
                cell: cell.clone(),
            })
            .collect())
    }

    fn get_cell(&self, address: &Address) -> Result<Cell> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .cells
            .get(&(address.sheet.0.clone(), address.row, address.col))
            .cloned()
            .unwrap_or_default())
    }

    fn set_cell(&self, address: &Address, cell: Cell) -> Result<()> {
        self.inner.lock().unwrap().cells.insert((address.sheet.0.clone(), address.row, address.col), cell);
        Ok(())
    }

    fn read_range(&self, range: &Range) -> Result<Vec<Vec<Cell>>> {
        let guard = self.inner.lock().unwrap();
        let mut grid = Vec::new();
        for row in range.start_row..=range.end_row {
            let mut out_row = Vec::new();
            for col in range.start_col..=range.end_col {
                out_row.push(guard.cells.get(&(range.sheet.0.clone(), row, col)).cloned().unwrap_or_default());
            }
            grid.push(out_row);
        }
        Ok(grid)
    }

    fn write_range(&self, range: &Range, cells: Vec<Vec<Cell>>) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        for (r, row) in cells.into_iter().enumerate() {
            for (c, cell) in row.into_iter().enumerate() {
                guard.cells.insert((range.sheet.0.clone(), range.start_row + r as u32, range.start_col + c as u32), cell);
            }
        }
        Ok(())
    }

    fn apply_formatting(&self, range: &Range, _format: &Map<String, Value>) -> Result<u64> {
        Ok(range.cell_count())
    }

    fn get_last_used_row(&self, sheet: &str) -> Result<u32> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.cells.keys().filter(|(s, _, _)| s == sheet).map(|(_, r, _)| *r).max().unwrap_or(0))
    }

    fn clone_handle(&self) -> Box<dyn SpreadsheetApi> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_fixture_cell() {
        let sheet = InMemorySpreadsheet::from_fixture(&json!({ "Sheet1": [[1.0, "hello"]] }));
        let cell = sheet.get_cell(&Address::new(cellward_protocol::SheetId::new("Sheet1"), 0, 1)).unwrap();
        assert_eq!(cell.value.summarize(32), "hello");
    }

    #[test]
    fn clone_handle_shares_the_document() {
        let sheet = InMemorySpreadsheet::new(vec!["Sheet1".to_string()]);
        let addr = Address::new(cellward_protocol::SheetId::new("Sheet1"), 0, 0);
        sheet.set_cell(&addr, Cell::value(cellward_protocol::CellValue::Scalar(cellward_protocol::Scalar::Number(7.0)))).unwrap();
        let handle = sheet.clone_handle();
        assert_eq!(handle.get_cell(&addr).unwrap().value.summarize(8), "7");
    }
}

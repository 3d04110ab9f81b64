//! A1-style reference parsing (spec §4.4). Every tool that accepts a
//! `range` or `cell` string argument goes through here first so the
//! DLP and budget layers downstream only ever see resolved
//! [`Range`]/[`Address`] values.

use crate::spreadsheet_api::Address;
use cellward_protocol::{CellwardError, Range, Result, SheetId};

/// Resolves a display sheet name to the stable [`SheetId`] the rest of
/// the executor operates on. Absent a real resolver, the display name
/// and stable id are the same string (spec §4.4 `sheet_name_resolver`).
pub trait SheetNameResolver: Send + Sync {
    fn resolve(&self, display_name: &str) -> Option<SheetId>;
}

pub struct IdentitySheetResolver;

impl SheetNameResolver for IdentitySheetResolver {
    fn resolve(&self, display_name: &str) -> Option<SheetId> {
        Some(SheetId::new(display_name))
    }
}

fn col_to_index(letters: &str) -> Result<u32> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CellwardError::validation(format!("invalid column letters: {letters}")));
    }
    let mut index: u64 = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as u64 + 1;
        index = index * 26 + digit;
        if index > u32::MAX as u64 {
            return Err(CellwardError::validation("column reference out of range"));
        }
    }
    Ok((index - 1) as u32)
}

/// Splits `A1` into (`A`, `1`). Returns an error if either half is
/// empty or the row is not a positive integer.
fn split_cell_ref(cell_ref: &str) -> Result<(u32, u32)> {
    let letters_end = cell_ref
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| CellwardError::validation(format!("missing row number in '{cell_ref}'")))?;
    let (letters, digits) = cell_ref.split_at(letters_end);
    let col = col_to_index(letters)?;
    let row_one_based: u32 = digits
        .parse()
        .map_err(|_| CellwardError::validation(format!("invalid row number in '{cell_ref}'")))?;
    if row_one_based == 0 {
        return Err(CellwardError::validation("row numbers are 1-based"));
    }
    Ok((row_one_based - 1, col))
}

/// Splits an optional `Sheet!...` qualifier off the front of a
/// reference string, returning `(sheet_name, rest)`.
fn split_sheet_qualifier(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once('!') {
        Some((sheet, rest)) => (Some(sheet.trim_matches('\'')), rest),
        None => (None, reference),
    }
}

/// Parses a single-cell reference such as `A1` or `Sheet2!C7`.
pub fn parse_address(
    reference: &str,
    default_sheet: &str,
    resolver: &dyn SheetNameResolver,
) -> Result<Address> {
    let (sheet_name, rest) = split_sheet_qualifier(reference);
    let sheet_name = sheet_name.unwrap_or(default_sheet);
    let sheet = resolver
        .resolve(sheet_name)
        .ok_or_else(|| CellwardError::validation(format!("unknown sheet '{sheet_name}'")))?;
    let (row, col) = split_cell_ref(rest)?;
    Ok(Address::new(sheet, row, col))
}

/// Parses a range reference such as `A1:B10` or `'My Sheet'!A1:A1`. A
/// bare cell reference is accepted as a 1x1 range.
pub fn parse_range(
    reference: &str,
    default_sheet: &str,
    resolver: &dyn SheetNameResolver,
) -> Result<Range> {
    let (sheet_name, rest) = split_sheet_qualifier(reference);
    let sheet_name = sheet_name.unwrap_or(default_sheet);
    let sheet = resolver
        .resolve(sheet_name)
        .ok_or_else(|| CellwardError::validation(format!("unknown sheet '{sheet_name}'")))?;

    match rest.split_once(':') {
        Some((start, end)) => {
            let (start_row, start_col) = split_cell_ref(start)?;
            let (end_row, end_col) = split_cell_ref(end)?;
            Ok(Range {
                sheet,
                start_row: start_row.min(end_row),
                end_row: start_row.max(end_row),
                start_col: start_col.min(end_col),
                end_col: start_col.max(end_col),
            })
        }
        None => {
            let (row, col) = split_cell_ref(rest)?;
            Ok(Range { sheet, start_row: row, end_row: row, start_col: col, end_col: col })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_cell() {
        let addr = parse_address("B3", "Sheet1", &IdentitySheetResolver).unwrap();
        assert_eq!(addr.row, 2);
        assert_eq!(addr.col, 1);
        assert_eq!(addr.sheet, SheetId::new("Sheet1"));
    }

    #[test]
    fn parses_qualified_range() {
        let range = parse_range("Sheet2!A1:C4", "Sheet1", &IdentitySheetResolver).unwrap();
        assert_eq!(range.sheet, SheetId::new("Sheet2"));
        assert_eq!(range.start_row, 0);
        assert_eq!(range.end_row, 3);
        assert_eq!(range.start_col, 0);
        assert_eq!(range.end_col, 2);
    }

    #[test]
    fn normalizes_reversed_corners() {
        let range = parse_range("B4:A1", "Sheet1", &IdentitySheetResolver).unwrap();
        assert_eq!(range.start_row, 0);
        assert_eq!(range.end_row, 3);
        assert_eq!(range.start_col, 0);
        assert_eq!(range.end_col, 1);
    }

    #[test]
    fn rejects_zero_row() {
        assert!(parse_address("A0", "Sheet1", &IdentitySheetResolver).is_err());
    }

    #[test]
    fn handles_multi_letter_columns() {
        let addr = parse_address("AA1", "Sheet1", &IdentitySheetResolver).unwrap();
        assert_eq!(addr.col, 26);
    }
}

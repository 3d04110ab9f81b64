use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::cmp::{max, min};

/// A stable sheet identifier. Display names are resolved to/from this
/// by an optional `sheet_name_resolver` in the tool executor; absent a
/// resolver the display name and stable id are the same string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SheetId(pub String);

impl SheetId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rectangular cell range (spec §3). Rows/columns are 0-based and
/// inclusive on both ends; this convention is used consistently by
/// every crate that constructs or interprets a `Range`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub sheet: SheetId,
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl Range {
    pub fn single_cell(sheet: SheetId, row: u32, col: u32) -> Self {
        Self {
            sheet,
            start_row: row,
            end_row: row,
            start_col: col,
            end_col: col,
        }
    }

    pub fn rows(&self) -> u32 {
        self.end_row.saturating_sub(self.start_row) + 1
    }

    pub fn cols(&self) -> u32 {
        self.end_col.saturating_sub(self.start_col) + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.rows() as u64 * self.cols() as u64
    }

    /// True if `other` shares at least one cell with `self`, on the
    /// same sheet.
    pub fn intersects(&self, other: &Range) -> bool {
        self.sheet == other.sheet
            && self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }

    pub fn contains_cell(&self, sheet: &SheetId, row: u32, col: u32) -> bool {
        &self.sheet == sheet
            && row >= self.start_row
            && row <= self.end_row
            && col >= self.start_col
            && col <= self.end_col
    }

    /// The smallest range containing both `self` and `other`. Only
    /// meaningful on the same sheet; callers must check that first.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            sheet: self.sheet.clone(),
            start_row: min(self.start_row, other.start_row),
            end_row: max(self.end_row, other.end_row),
            start_col: min(self.start_col, other.start_col),
            end_col: max(self.end_col, other.end_col),
        }
    }
}

/// A plain scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Null
    }
}

/// A closed sum type over every shape a cell's value can take,
/// replacing reflective stringification of rich/host values (spec §9
/// "Runtime reflection"). Unknown/overflowing shapes collapse to a
/// bounded string via [`CellValue::summarize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellValue {
    Scalar(Scalar),
    RichText { text: String },
    Image { alt_text: String, width: u32, height: u32 },
    Collection { collection_kind: String, length: usize, sample: Vec<Scalar> },
}

impl CellValue {
    pub fn scalar(s: Scalar) -> Self {
        CellValue::Scalar(s)
    }

    /// A bounded, visitor-style string summary used anywhere a plain
    /// display value is needed (heuristic DLP scanning, JSON transforms).
    pub fn summarize(&self, max_len: usize) -> String {
        let raw = match self {
            CellValue::Scalar(Scalar::Null) => String::new(),
            CellValue::Scalar(Scalar::Bool(b)) => b.to_string(),
            CellValue::Scalar(Scalar::Number(n)) => n.to_string(),
            CellValue::Scalar(Scalar::String(s)) => s.clone(),
            CellValue::RichText { text } => text.clone(),
            CellValue::Image { alt_text, width, height } => {
                format!("[image {width}x{height}: {alt_text}]")
            }
            CellValue::Collection { collection_kind, length, .. } => {
                format!("[{collection_kind} of {length} items]")
            }
        };
        if raw.chars().count() > max_len {
            raw.chars().take(max_len).collect::<String>() + "\u{2026}"
        } else {
            raw
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Scalar(Scalar::Null)
    }
}

/// A single spreadsheet cell (spec §3). Formula cells typically carry
/// `value = Scalar::Null` unless the backend pre-evaluated them or
/// `include_formula_values` surfaced the computed value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Map<String, serde_json::Value>>,
}

impl Cell {
    pub fn value(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
            format: None,
        }
    }

    pub fn formula(formula: impl Into<String>) -> Self {
        Self {
            value: CellValue::default(),
            formula: Some(formula.into()),
            format: None,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Replace the cell's content with the DLP redaction marker, in
    /// both value and formula (spec §4.4 REDACT per-cell enforcement).
    pub fn redacted() -> Self {
        Self {
            value: CellValue::Scalar(Scalar::String("[REDACTED]".to_string())),
            formula: Some("[REDACTED]".to_string()),
            format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> SheetId {
        SheetId::new("Sheet1")
    }

    #[test]
    fn range_intersection_is_symmetric() {
        let a = Range { sheet: sheet(), start_row: 0, end_row: 5, start_col: 0, end_col: 5 };
        let b = Range { sheet: sheet(), start_row: 4, end_row: 10, start_col: 4, end_col: 10 };
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn range_no_intersection_different_sheet() {
        let a = Range { sheet: sheet(), start_row: 0, end_row: 5, start_col: 0, end_col: 5 };
        let b = Range { sheet: SheetId::new("Sheet2"), start_row: 0, end_row: 5, start_col: 0, end_col: 5 };
        assert!(!a.intersects(&b));
    }

    #[test]
    fn cell_count_is_inclusive() {
        let r = Range { sheet: sheet(), start_row: 0, end_row: 0, start_col: 0, end_col: 0 };
        assert_eq!(r.cell_count(), 1);
    }
}

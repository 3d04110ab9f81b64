//! Per-cell classification index and the DLP enforcement fold (spec
//! §4.4). Built once per tool call from either an inline list of
//! [`ClassificationRecord`]s or a caller-supplied store, then consulted
//! cell-by-cell when a `REDACT` decision requires masking only the
//! cells that actually exceed the policy's `maxAllowed`.

use crate::classification::{Classification, ClassificationRecord, ClassificationSelector};
use cellward_protocol::{Range, SheetId};
use std::collections::HashMap;

/// Source of classification records for one document. A caller-backed
/// store (spec §4.4 `classification_store`) is consulted lazily
/// instead of being materialized into an index up front.
pub trait ClassificationStore: Send + Sync {
    fn records_for_document(&self, document_id: &str) -> Vec<ClassificationRecord>;
}

pub struct StaticClassificationStore {
    records: Vec<ClassificationRecord>,
}

impl StaticClassificationStore {
    pub fn new(records: Vec<ClassificationRecord>) -> Self {
        Self { records }
    }
}

impl ClassificationStore for StaticClassificationStore {
    fn records_for_document(&self, _document_id: &str) -> Vec<ClassificationRecord> {
        self.records.clone()
    }
}

/// Folded view of a document's classification records, ranked
/// document < sheet < column < range < cell so a more specific
/// selector overrides a broader one covering the same cell.
#[derive(Debug, Default)]
pub struct ClassificationIndex {
    document: Option<Classification>,
    sheets: HashMap<SheetId, Classification>,
    columns: HashMap<(SheetId, u32), Classification>,
    ranges: Vec<(Range, Classification)>,
    cells: HashMap<(SheetId, u32, u32), Classification>,
}

impl ClassificationIndex {
    pub fn build(records: &[ClassificationRecord]) -> Self {
        let mut index = ClassificationIndex::default();
        for record in records {
            match &record.selector {
                ClassificationSelector::Document => {
                    index.document = Some(
                        index.document.map_or(record.classification, |c| c.max(record.classification)),
                    );
                }
                ClassificationSelector::Sheet { sheet } => {
                    let entry = index.sheets.entry(sheet.clone()).or_insert(record.classification);
                    *entry = (*entry).max(record.classification);
                }
                ClassificationSelector::Column { sheet, column } => {
                    let entry = index
                        .columns
                        .entry((sheet.clone(), *column))
                        .or_insert(record.classification);
                    *entry = (*entry).max(record.classification);
                }
                ClassificationSelector::Range { range } => {
                    index.ranges.push((range.clone(), record.classification));
                }
                ClassificationSelector::Cell { sheet, row, column } => {
                    let entry = index
                        .cells
                        .entry((sheet.clone(), *row, *column))
                        .or_insert(record.classification);
                    *entry = (*entry).max(record.classification);
                }
            }
        }
        index
    }

    /// Effective classification of a single cell: the highest-rank
    /// selector that covers it, with ties at the same rank folded by
    /// `max()`.
    pub fn effective_at(&self, sheet: &SheetId, row: u32, col: u32) -> Classification {
        if let Some(c) = self.cells.get(&(sheet.clone(), row, col)) {
            return *c;
        }
        let range_hit = self
            .ranges
            .iter()
            .filter(|(range, _)| range.contains_cell(sheet, row, col))
            .map(|(_, c)| *c)
            .max();
        if let Some(c) = range_hit {
            return c;
        }
        if let Some(c) = self.columns.get(&(sheet.clone(), col)) {
            return *c;
        }
        if let Some(c) = self.sheets.get(sheet) {
            return *c;
        }
        self.document.unwrap_or_default()
    }

    /// The maximum effective classification over every cell in
    /// `range` — used for the single whole-range policy evaluation
    /// that precedes per-cell masking (spec §4.4 step 1).
    pub fn effective_for_range(&self, range: &Range) -> Classification {
        let mut max = self.document.unwrap_or_default();
        if let Some(c) = self.sheets.get(&range.sheet) {
            max = max.max(*c);
        }
        for col in range.start_col..=range.end_col {
            if let Some(c) = self.columns.get(&(range.sheet.clone(), col)) {
                max = max.max(*c);
            }
        }
        for (other, c) in &self.ranges {
            if other.intersects(range) {
                max = max.max(*c);
            }
        }
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                if let Some(c) = self.cells.get(&(range.sheet.clone(), row, col)) {
                    max = max.max(*c);
                }
            }
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationRecord;

    fn sheet() -> SheetId {
        SheetId::new("Sheet1")
    }

    #[test]
    fn cell_selector_overrides_sheet_selector() {
        let records = vec![
            ClassificationRecord {
                selector: ClassificationSelector::Sheet { sheet: sheet() },
                classification: Classification::Internal,
            },
            ClassificationRecord {
                selector: ClassificationSelector::Cell { sheet: sheet(), row: 2, column: 2 },
                classification: Classification::Restricted,
            },
        ];
        let index = ClassificationIndex::build(&records);
        assert_eq!(index.effective_at(&sheet(), 2, 2), Classification::Restricted);
        assert_eq!(index.effective_at(&sheet(), 0, 0), Classification::Internal);
    }

    #[test]
    fn range_for_whole_range_is_max_of_intersecting_records() {
        let records = vec![
            ClassificationRecord {
                selector: ClassificationSelector::Range {
                    range: Range { sheet: sheet(), start_row: 0, end_row: 1, start_col: 0, end_col: 1 },
                },
                classification: Classification::Confidential,
            },
            ClassificationRecord {
                selector: ClassificationSelector::Document,
                classification: Classification::Public,
            },
        ];
        let index = ClassificationIndex::build(&records);
        let probe = Range { sheet: sheet(), start_row: 0, end_row: 5, start_col: 0, end_col: 5 };
        assert_eq!(index.effective_for_range(&probe), Classification::Confidential);
    }

    #[test]
    fn defaults_to_public_with_no_records() {
        let index = ClassificationIndex::build(&[]);
        assert_eq!(index.effective_at(&sheet(), 0, 0), Classification::Public);
    }
}

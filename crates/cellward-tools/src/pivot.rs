//! Pivot-table registry and the refresh-on-write rule (spec §4.4): a
//! pivot registered by `create_pivot_table` is re-executed whenever a
//! later mutating tool writes into its source range, so the pivot
//! never silently goes stale while the AI keeps editing the sheet.

use cellward_protocol::Range;
use std::collections::HashMap;
use std::sync::Mutex;

/// Aggregation function for one pivot value column (spec §4.4
/// `valueSpecs`).
#[derive(Debug, Clone, Copy)]
pub enum Agg {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl Agg {
    pub fn from_str(s: &str) -> Self {
        match s {
            "count" => Agg::Count,
            "avg" | "average" | "mean" => Agg::Avg,
            "min" => Agg::Min,
            "max" => Agg::Max,
            _ => Agg::Sum,
        }
    }

    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            Agg::Sum => values.iter().sum(),
            Agg::Count => values.len() as f64,
            Agg::Avg => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            Agg::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Agg::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// One aggregated output column: `column` is the source-relative
/// column offset to aggregate, `agg` the reduction applied per group.
#[derive(Debug, Clone, Copy)]
pub struct ValueSpec {
    pub column: usize,
    pub agg: Agg,
}

#[derive(Debug, Clone)]
pub struct PivotRegistration {
    pub source_range: Range,
    pub destination_range: Range,
    pub row_fields: Vec<usize>,
    pub value_specs: Vec<ValueSpec>,
}

/// Pivots registered so far, keyed by an opaque id the caller chooses
/// (typically the destination range's top-left address).
#[derive(Default)]
pub struct PivotRegistry {
    entries: Mutex<HashMap<String, PivotRegistration>>,
}

impl PivotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<String>, registration: PivotRegistration) {
        self.entries.lock().expect("pivot registry lock poisoned").insert(id.into(), registration);
    }

    /// Pivots whose source range intersects `written_range`, skipping
    /// any whose source or destination already exceeds `max_cells` —
    /// a pivot that large was never going to be auto-refreshed safely
    /// in the first place.
    pub fn affected_by(&self, written_range: &Range, max_cells: u64) -> Vec<(String, PivotRegistration)> {
        self.entries
            .lock()
            .expect("pivot registry lock poisoned")
            .iter()
            .filter(|(_, reg)| reg.source_range.intersects(written_range))
            .filter(|(_, reg)| {
                reg.source_range.cell_count() <= max_cells && reg.destination_range.cell_count() <= max_cells
            })
            .map(|(id, reg)| (id.clone(), reg.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellward_protocol::SheetId;

    fn range(r0: u32, r1: u32, c0: u32, c1: u32) -> Range {
        Range { sheet: SheetId::new("Sheet1"), start_row: r0, end_row: r1, start_col: c0, end_col: c1 }
    }

    #[test]
    fn finds_pivots_whose_source_intersects_write() {
        let registry = PivotRegistry::new();
        registry.register(
            "p1",
            PivotRegistration { source_range: range(0, 10, 0, 2), destination_range: range(0, 5, 5, 6), row_fields: Vec::new(), value_specs: Vec::new() },
        );
        let hits = registry.affected_by(&range(5, 5, 1, 1), 1_000_000);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn skips_oversized_pivots() {
        let registry = PivotRegistry::new();
        registry.register(
            "p1",
            PivotRegistration { source_range: range(0, 10, 0, 2), destination_range: range(0, 5, 5, 6), row_fields: Vec::new(), value_specs: Vec::new() },
        );
        let hits = registry.affected_by(&range(5, 5, 1, 1), 1);
        assert!(hits.is_empty());
    }
}

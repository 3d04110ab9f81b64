use cellward_protocol::{Cell, Range, SheetId};

/// A resolved cell address: a sheet plus a 0-based row/column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub sheet: SheetId,
    pub row: u32,
    pub col: u32,
}

impl Address {
    pub fn new(sheet: SheetId, row: u32, col: u32) -> Self {
        Self { sheet, row, col }
    }

    pub fn as_range(&self) -> Range {
        Range::single_cell(self.sheet.clone(), self.row, self.col)
    }
}

/// A cell together with the address it was read from, as returned by
/// [`SpreadsheetApi::list_non_empty_cells`].
#[derive(Debug, Clone)]
pub struct AddressedCell {
    pub address: Address,
    pub cell: Cell,
}

/// The host-provided spreadsheet surface every tool is built against
/// (spec §6.1). Implementations back this with whatever in-process
/// document model the host embeds cellward in; the tool executor only
/// ever sees this trait.
///
/// `apply_formatting` and any mutating method must return `Err` rather
/// than a zero-count success when nothing was written — a tool that
/// silently no-ops on failure is indistinguishable from one that
/// succeeded on an empty range, and DLP accounting depends on the
/// written-cell count being accurate.
pub trait SpreadsheetApi: Send + Sync {
    fn list_sheets(&self) -> cellward_protocol::Result<Vec<String>>;

    fn list_non_empty_cells(
        &self,
        sheet: Option<&str>,
    ) -> cellward_protocol::Result<Vec<AddressedCell>>;

    fn get_cell(&self, address: &Address) -> cellward_protocol::Result<Cell>;

    fn set_cell(&self, address: &Address, cell: Cell) -> cellward_protocol::Result<()>;

    fn read_range(&self, range: &Range) -> cellward_protocol::Result<Vec<Vec<Cell>>>;

    fn write_range(&self, range: &Range, cells: Vec<Vec<Cell>>) -> cellward_protocol::Result<()>;

    /// Number of cells whose formatting changed. Must never return `0`
    /// on a failure path — raise an error instead (spec §6.1).
    fn apply_formatting(
        &self,
        range: &Range,
        format: &serde_json::Map<String, serde_json::Value>,
    ) -> cellward_protocol::Result<u64>;

    /// Optional: hosts without chart support return `None` and the
    /// `create_chart` tool answers with `not_implemented`.
    fn create_chart(
        &self,
        _spec: &serde_json::Value,
    ) -> cellward_protocol::Result<Option<serde_json::Value>> {
        Ok(None)
    }

    fn get_last_used_row(&self, sheet: &str) -> cellward_protocol::Result<u32>;

    /// A fresh, independent handle to the same underlying document —
    /// used when a tool needs to probe state without holding the
    /// caller's handle across an `await` boundary.
    fn clone_handle(&self) -> Box<dyn SpreadsheetApi>;
}

//! DLP-gated AI tool executor (spec §4.4): the fixed spreadsheet tool
//! catalogue, A1 address parsing, the classification/policy engine,
//! budget enforcement, pivot refresh, and external-data fetch.

pub mod a1;
pub mod budgets;
pub mod classification;
pub mod compaction;
pub mod dlp_index;
pub mod external_fetch;
pub mod heuristics;
pub mod memory;
pub mod pivot;
pub mod spreadsheet_api;
pub mod tools;

pub use a1::{parse_address, parse_range, IdentitySheetResolver, SheetNameResolver};
pub use budgets::{AllowedHost, DlpConfig, ToolExecutorConfig};
pub use classification::{
    evaluate_policy, Classification, ClassificationSelector, Decision, PolicyEvaluation, PolicyEvaluationInput,
    PolicyRecord, PolicyRule,
};
pub use dlp_index::{ClassificationIndex, ClassificationRecord, ClassificationStore, StaticClassificationStore};
pub use memory::InMemorySpreadsheet;
pub use pivot::{PivotRegistration, PivotRegistry};
pub use spreadsheet_api::{Address, AddressedCell, SpreadsheetApi};
pub use tools::ToolExecutor;

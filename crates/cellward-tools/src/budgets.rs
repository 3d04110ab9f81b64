//! Tool executor configuration and the escape-accurate JSON sizing
//! used to enforce `max_read_range_chars` (spec §4.4).

use crate::a1::{IdentitySheetResolver, SheetNameResolver};
use crate::classification::PolicyRecord;
use crate::dlp_index::{ClassificationStore, StaticClassificationStore};
use cellward_protocol::{CellwardError, Range, Result};
use serde_json::Value;
use std::sync::Arc;

/// DLP wiring for one tool call (spec §4.4 `dlp` config block). Absent
/// entirely, every tool runs with no classification enforcement at all
/// — callers that want DLP must opt in explicitly.
pub struct DlpConfig {
    pub document_id: String,
    pub sheet_id: Option<String>,
    pub policy: PolicyRecord,
    pub classification_store: Arc<dyn ClassificationStore>,
    pub table_column_resolver: Option<Arc<dyn Fn(&str) -> Option<u32> + Send + Sync>>,
    pub include_restricted_content: bool,
    pub audit_logger: Option<Arc<dyn Fn(Value) + Send + Sync>>,
}

impl DlpConfig {
    pub fn new(document_id: impl Into<String>, policy: PolicyRecord, records: Vec<crate::classification::ClassificationRecord>) -> Self {
        Self {
            document_id: document_id.into(),
            sheet_id: None,
            policy,
            classification_store: Arc::new(StaticClassificationStore::new(records)),
            table_column_resolver: None,
            include_restricted_content: false,
            audit_logger: None,
        }
    }
}

/// One `host[:port]` entry on the external-fetch allowlist. `port:
/// None` matches any port on that host.
#[derive(Debug, Clone)]
pub struct AllowedHost {
    pub host: String,
    pub port: Option<u16>,
}

impl AllowedHost {
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.host.eq_ignore_ascii_case(host) && self.port.map_or(true, |p| p == port)
    }
}

pub struct ToolExecutorConfig {
    pub default_sheet: String,
    pub sheet_name_resolver: Arc<dyn SheetNameResolver>,
    pub allow_external_data: bool,
    pub preview_mode: bool,
    pub allowed_external_hosts: Vec<AllowedHost>,
    pub max_external_bytes: u64,
    pub max_read_range_cells: u64,
    pub max_read_range_chars: u64,
    pub max_tool_range_cells: u64,
    pub max_filter_range_matching_rows: u64,
    pub max_detect_anomalies: u64,
    pub include_formula_values: bool,
    pub dlp: Option<DlpConfig>,
}

impl Default for ToolExecutorConfig {
    fn default() -> Self {
        Self {
            default_sheet: "Sheet1".to_string(),
            sheet_name_resolver: Arc::new(IdentitySheetResolver),
            allow_external_data: false,
            preview_mode: false,
            allowed_external_hosts: Vec::new(),
            max_external_bytes: 5 * 1024 * 1024,
            max_read_range_cells: 50_000,
            max_read_range_chars: 2_000_000,
            max_tool_range_cells: 200_000,
            max_filter_range_matching_rows: 10_000,
            max_detect_anomalies: 5_000,
            include_formula_values: false,
            dlp: None,
        }
    }
}

impl ToolExecutorConfig {
    pub fn assert_range_within_read_budget(&self, range: &Range) -> Result<()> {
        if range.cell_count() > self.max_read_range_cells {
            return Err(CellwardError::validation(format!(
                "range has {} cells, exceeding max_read_range_cells of {}",
                range.cell_count(),
                self.max_read_range_cells
            )));
        }
        Ok(())
    }

    pub fn assert_range_within_tool_budget(&self, range: &Range) -> Result<()> {
        if range.cell_count() > self.max_tool_range_cells {
            return Err(CellwardError::validation(format!(
                "range has {} cells, exceeding max_tool_range_cells of {}",
                range.cell_count(),
                self.max_tool_range_cells
            )));
        }
        Ok(())
    }
}

/// Length (in UTF-16 code units, matching `JSON.stringify(...).length`)
/// a single character contributes once embedded in a JSON string
/// literal — accounting for quote/backslash/control escapes, the
/// ` `/` ` line/paragraph separators some hosts escape
/// defensively, and astral characters which cost two UTF-16 units.
fn escaped_char_len(c: char) -> usize {
    match c {
        '"' | '\\' => 2,
        '\n' | '\r' | '\t' => 2,
        '\u{08}' | '\u{0C}' => 2,
        '\u{2028}' | '\u{2029}' => 6,
        c if (c as u32) < 0x20 => 6,
        c if (c as u32) > 0xFFFF => 2,
        _ => 1,
    }
}

fn string_literal_len(s: &str) -> u64 {
    2 + s.chars().map(escaped_char_len).sum::<usize>() as u64
}

/// Size, in the same units a host's `JSON.stringify` would report, of
/// `value` as embedded JSON (spec §4.4 `max_read_range_chars`). Used
/// instead of `serde_json::to_string(value).len()` because byte length
/// under-counts astral characters relative to UTF-16 string length and
/// over-counts plain ASCII relative to escape-expanded content.
pub fn estimate_json_chars(value: &Value) -> u64 {
    match value {
        Value::Null => 4,
        Value::Bool(b) => if *b { 4 } else { 5 },
        Value::Number(n) => n.to_string().chars().count() as u64,
        Value::String(s) => string_literal_len(s),
        Value::Array(items) => {
            let inner: u64 = items.iter().map(estimate_json_chars).sum();
            let commas = items.len().saturating_sub(1) as u64;
            2 + inner + commas
        }
        Value::Object(map) => {
            let mut total = 2u64;
            let mut first = true;
            for (key, val) in map {
                if !first {
                    total += 1;
                }
                first = false;
                total += string_literal_len(key) + 1 + estimate_json_chars(val);
            }
            total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_ascii_matches_simple_length() {
        let v = json!("hello");
        assert_eq!(estimate_json_chars(&v), 7);
    }

    #[test]
    fn line_separator_expands_to_escape() {
        let v = json!("a\u{2028}b");
        assert_eq!(estimate_json_chars(&v), 2 + 1 + 6 + 1);
    }

    #[test]
    fn object_counts_keys_and_separators() {
        let v = json!({"a": 1, "b": 2});
        assert_eq!(estimate_json_chars(&v), 2 + (3 + 1 + 1) + 1 + (3 + 1 + 1));
    }
}

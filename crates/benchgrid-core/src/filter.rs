//! Row filtering for one test block: search text, quantization, parameter
//! size range and backend subset.

use crate::grouping::{ModelRow, TestGroup};

/// Slack applied to both ends of the size range so boundary values parsed
/// from floating point survive the comparison.
const SIZE_EPS: f64 = 1e-6;

/// Filter state as plain values, applied by reference to a test group.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    /// Lowercased substring matched against the row's search blob.
    pub search: String,
    /// Uppercased quantization, empty for any.
    pub quant: String,
    pub size_lo: Option<f64>,
    pub size_hi: Option<f64>,
}

impl RowFilter {
    pub fn matches(&self, row: &ModelRow) -> bool {
        if !self.search.is_empty() && !row.search_blob.contains(&self.search) {
            return false;
        }
        if !self.quant.is_empty() && row.quant != self.quant {
            return false;
        }
        if let Some(size) = row.size_b {
            if let Some(lo) = self.size_lo {
                if size < lo - SIZE_EPS {
                    return false;
                }
            }
            if let Some(hi) = self.size_hi {
                if size > hi + SIZE_EPS {
                    return false;
                }
            }
        }
        true
    }

    /// Matching rows of `test`, sorted case-insensitively by model name.
    pub fn apply<'a>(&self, test: &'a TestGroup) -> Vec<&'a ModelRow> {
        let mut rows: Vec<&ModelRow> = test
            .models
            .values()
            .filter(|row| self.matches(row))
            .collect();
        rows.sort_by(|a, b| a.model.to_lowercase().cmp(&b.model.to_lowercase()));
        rows
    }
}

/// Restricts a display-ordered backend list to the selected subset,
/// preserving display order. Winner selection and column layout both
/// depend on this order being stable.
pub fn selected_backends(order: &[String], selected: &[String]) -> Vec<String> {
    order
        .iter()
        .filter(|env| selected.contains(env))
        .cloned()
        .collect()
}

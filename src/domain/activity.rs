//! Input activities to classify.

use crate::utils::content_id;

/// One input row. The identifier is derived from the selected fields only, so
/// reordering or re-slicing the input file does not change it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    /// Position within the sliced input.
    pub position: usize,
    pub id: String,
    /// Columns used to describe the activity, in input order.
    pub fields: Vec<(String, String)>,
    /// The full input row, copied into the tabular summary.
    pub row: Vec<(String, String)>,
}

impl ActivityRecord {
    pub fn new(position: usize, row: Vec<(String, String)>, columns: &[String]) -> Self {
        let fields: Vec<(String, String)> = columns
            .iter()
            .filter_map(|col| row.iter().find(|(name, _)| name == col).cloned())
            .collect();
        let id = content_id(&fields);
        Self { position, id, fields, row }
    }

    /// Build an activity whose only field is free text, for ad-hoc queries and tests.
    pub fn from_text(position: usize, column: &str, text: &str) -> Self {
        let row = vec![(column.to_string(), text.to_string())];
        Self::new(position, row, &[column.to_string()])
    }

    /// `column: value` lines describing the activity.
    pub fn text(&self) -> String {
        if let [(_, value)] = self.fields.as_slice() {
            return value.clone();
        }
        self.fields
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

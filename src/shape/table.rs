// ABOUTME: Fixed-width tabular output of the shaper
// ABOUTME: Rows always carry exactly one cell per declared column, in order

use super::columns::{column_names, Column};
use crate::sink::tsv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ShapedTable {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            columns: column_names(columns),
            rows: Vec::new(),
        }
    }

    /// Append a row; panics in debug builds if the width is wrong.
    pub(crate) fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row number and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// TabSeparatedWithNames payload, UTF-8.
    pub fn to_tsv(&self) -> String {
        tsv::encode(&self.columns, &self.rows)
    }
}

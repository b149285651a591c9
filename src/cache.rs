//! Raw data cache.
//! Flattens every sheet once per run into two indexes: label/value pairs keyed
//! by normalized label text, and the table regions detected in the sheet.
//! Nothing here changes after [`RawDataCache::build`] returns.

use std::collections::HashSet;
use std::ops::Range;

use indexmap::IndexMap;
use log::debug;
use serde::Serialize;

use crate::workbook::{CellValue, SheetGrid, Workbook};

/// Absolute position of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: usize,
    pub column: usize,
}

impl std::fmt::Display for CellRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!R{}C{}", self.sheet, self.row + 1, self.column + 1)
    }
}

/// A label/value pair found in a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueCandidate {
    pub key: String,
    pub value: String,
    pub location: CellRef,
}

/// A rectangular block: one header row followed by data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    pub sheet: String,
    pub header_row: usize,
    pub start_col: usize,
    /// Exclusive
    pub end_col: usize,
    /// Exclusive
    pub end_row: usize,
    pub headers: Vec<String>,
}

impl TableRegion {
    pub fn data_rows(&self) -> Range<usize> {
        self.header_row + 1..self.end_row
    }

    pub fn columns(&self) -> Range<usize> {
        self.start_col..self.end_col
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.header_row..self.end_row).contains(&row) && self.columns().contains(&col)
    }

    /// Header text of an absolute column.
    pub fn header_at(&self, col: usize) -> Option<&str> {
        col.checked_sub(self.start_col)
            .and_then(|i| self.headers.get(i))
            .map(String::as_str)
    }

    /// True when any header contains any of the lower-cased keywords.
    pub fn has_header_matching(&self, keywords: &[String]) -> bool {
        self.headers.iter().any(|h| {
            let h = h.to_lowercase();
            keywords.iter().any(|k| h.contains(k.as_str()))
        })
    }
}

/// Inputs of cache construction.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Header cells longer than this are not column titles
    pub header_max_len: usize,
    /// Normalized label texts accepted without trailing punctuation
    pub vocabulary: HashSet<String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { header_max_len: 48, vocabulary: HashSet::new() }
    }
}

/// Normalizes label text: lower-case, trimmed, trailing `:`/`*` removed,
/// inner whitespace collapsed.
pub fn normalize_key(text: &str) -> String {
    let trimmed = text.trim().trim_end_matches([':', '*', ' ']);
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Index of one sheet.
#[derive(Debug, Clone, Default)]
pub struct SheetIndex {
    pub grid: SheetGrid,
    pub key_values: IndexMap<String, Vec<KeyValueCandidate>>,
    pub tables: Vec<TableRegion>,
}

/// Read-only lookup structure over the whole workbook.
#[derive(Debug, Clone, Default)]
pub struct RawDataCache {
    sheets: IndexMap<String, SheetIndex>,
}

impl RawDataCache {
    /// Indexes every sheet of the workbook.
    pub fn build(workbook: Workbook, options: &CacheOptions) -> Self {
        let sheets = workbook
            .into_sheets()
            .into_iter()
            .map(|(name, grid)| {
                let index = index_sheet(&name, grid, options);
                debug!(
                    "Indexed sheet '{}': {} key-value labels, {} tables",
                    name,
                    index.key_values.len(),
                    index.tables.len()
                );
                (name, index)
            })
            .collect();
        Self { sheets }
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetIndex> {
        self.sheets.get(name)
    }

    /// First pair for `key` in workbook order.
    pub fn lookup_key_value(&self, key: &str) -> Option<&KeyValueCandidate> {
        self.sheets
            .values()
            .find_map(|s| s.key_values.get(key).and_then(|c| c.first()))
    }

    /// First pair for `key` within one sheet.
    pub fn lookup_key_value_in(&self, sheet: &str, key: &str) -> Option<&KeyValueCandidate> {
        self.sheets
            .get(sheet)
            .and_then(|s| s.key_values.get(key))
            .and_then(|c| c.first())
    }

    /// Every pair for `key`, in workbook order then scan order.
    pub fn key_value_candidates<'a>(
        &'a self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a KeyValueCandidate> + 'a {
        self.sheets
            .values()
            .filter_map(move |s| s.key_values.get(key))
            .flatten()
    }

    /// Tables of a sheet in scan order; empty for unknown sheets.
    pub fn tables_in_sheet(&self, sheet: &str) -> &[TableRegion] {
        self.sheets.get(sheet).map(|s| s.tables.as_slice()).unwrap_or(&[])
    }

    /// Tables of every sheet, sheet by sheet.
    pub fn all_tables(&self) -> impl Iterator<Item = &TableRegion> {
        self.sheets.values().flat_map(|s| s.tables.iter())
    }

    pub fn cell(&self, sheet: &str, row: usize, col: usize) -> Option<&CellValue> {
        self.sheets.get(sheet).and_then(|s| s.grid.get(row, col))
    }
}

fn index_sheet(name: &str, grid: SheetGrid, options: &CacheOptions) -> SheetIndex {
    let tables = detect_tables(name, &grid, options);
    let key_values = detect_key_values(name, &grid, &tables, options);
    SheetIndex { grid, key_values, tables }
}

fn is_header_like(cell: &CellValue, max_len: usize) -> bool {
    match cell.as_text() {
        Some(text) => {
            !text.is_empty()
                && text.chars().count() <= max_len
                && !text.contains(':')
                && text.parse::<f64>().is_err()
        }
        None => false,
    }
}

/// A two-cell run led by a vocabulary label is a label and its value.
fn is_label_value_pair(
    grid: &SheetGrid,
    row: usize,
    span: &Range<usize>,
    vocabulary: &HashSet<String>,
) -> bool {
    span.len() == 2
        && grid
            .get(row, span.start)
            .and_then(CellValue::as_text)
            .is_some_and(|text| vocabulary.contains(&normalize_key(text)))
}

fn row_has_data(grid: &SheetGrid, row: usize, cols: &Range<usize>) -> bool {
    cols.clone().any(|c| grid.is_filled(row, c))
}

/// Scans for header runs followed by data, top-to-bottom then left-to-right.
/// A two-cell run starting with a vocabulary label is left to key-value detection.
pub fn detect_tables(sheet: &str, grid: &SheetGrid, options: &CacheOptions) -> Vec<TableRegion> {
    let mut tables: Vec<TableRegion> = Vec::new();

    for row in 0..grid.height() {
        let width = grid.row_len(row);
        let mut col = 0;
        while col < width {
            let covered = |c: usize| tables.iter().any(|t| t.contains(row, c));
            if !grid.is_filled(row, col) || covered(col) {
                col += 1;
                continue;
            }

            // Maximal run of adjacent filled cells not claimed by an earlier table.
            let start = col;
            while col < width && grid.is_filled(row, col) && !covered(col) {
                col += 1;
            }
            let span = start..col;

            let all_headers = span.clone().all(|c| {
                grid.get(row, c)
                    .is_some_and(|cell| is_header_like(cell, options.header_max_len))
            });
            if span.len() < 2 || !all_headers || !row_has_data(grid, row + 1, &span) {
                continue;
            }
            if is_label_value_pair(grid, row, &span, &options.vocabulary) {
                continue;
            }

            let mut end_row = row + 1;
            while end_row < grid.height() && row_has_data(grid, end_row, &span) {
                end_row += 1;
            }

            let headers = span
                .clone()
                .map(|c| grid.get(row, c).map(CellValue::to_text).unwrap_or_default())
                .collect();
            tables.push(TableRegion {
                sheet: sheet.to_string(),
                header_row: row,
                start_col: span.start,
                end_col: span.end,
                end_row,
                headers,
            });
        }
    }

    tables
}

fn is_label(text: &str, vocabulary: &HashSet<String>) -> bool {
    text.ends_with(':') || vocabulary.contains(&normalize_key(text))
}

/// Collects label/value pairs outside detected tables, in row-major order.
pub fn detect_key_values(
    sheet: &str,
    grid: &SheetGrid,
    tables: &[TableRegion],
    options: &CacheOptions,
) -> IndexMap<String, Vec<KeyValueCandidate>> {
    let mut pairs: IndexMap<String, Vec<KeyValueCandidate>> = IndexMap::new();
    let covered = |r: usize, c: usize| tables.iter().any(|t| t.contains(r, c));
    let location = |row: usize, column: usize| CellRef { sheet: sheet.to_string(), row, column };

    for row in 0..grid.height() {
        for col in 0..grid.row_len(row) {
            if covered(row, col) {
                continue;
            }
            let Some(text) = grid.get(row, col).and_then(CellValue::as_text) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            if is_label(text, &options.vocabulary) {
                let key = normalize_key(text);
                if key.is_empty() {
                    continue;
                }
                let value_at = [(row, col + 1), (row + 1, col)].into_iter().find(|&(r, c)| {
                    !covered(r, c)
                        && grid.get(r, c).is_some_and(|v| !v.is_empty() && !v.to_text().ends_with(':'))
                });
                if let Some((r, c)) = value_at {
                    let value = grid.get(r, c).map(CellValue::to_text).unwrap_or_default();
                    pairs.entry(key.clone()).or_default().push(KeyValueCandidate {
                        key,
                        value,
                        location: location(r, c),
                    });
                }
            } else if let Some((left, right)) = text.split_once(':') {
                // Inline "Label: value" in a single cell.
                let key = normalize_key(left);
                let value = right.trim();
                if !value.is_empty() && options.vocabulary.contains(&key) {
                    pairs.entry(key.clone()).or_default().push(KeyValueCandidate {
                        key,
                        value: value.to_string(),
                        location: location(row, col),
                    });
                }
            }
        }
    }

    pairs
}

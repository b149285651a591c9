//! Value resolution.
//! Determines the authoritative value of one semantic field by walking a fixed
//! precedence chain: exact key-value pair, then table inference, then the
//! fallback default. The first accepted value wins and is never replaced.

use globset::GlobSet;
use log::trace;
use serde::Serialize;

use crate::cache::{CellRef, RawDataCache, TableRegion};
use crate::config::Layout;
use crate::rules::FieldMatcher;
use crate::workbook::CellValue;

/// How a value was obtained, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Defaulted,
    Inferred,
    Exact,
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValueEntry {
    pub semantic_key: String,
    /// `None` only when nothing matched and there was no fallback
    pub value: Option<String>,
    pub source: Option<CellRef>,
    pub confidence: Confidence,
}

impl KeyValueEntry {
    pub fn is_defaulted(&self) -> bool {
        self.confidence == Confidence::Defaulted
    }

    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

/// Restricts table inference to one data row of one region.
#[derive(Debug, Clone, Copy)]
pub struct RowBinding<'r> {
    pub region: &'r TableRegion,
    pub row: usize,
}

/// Resolves fields against a read-only cache.
pub struct Resolver<'a> {
    cache: &'a RawDataCache,
    denylist: &'a GlobSet,
}

impl<'a> Resolver<'a> {
    pub fn new(cache: &'a RawDataCache, denylist: &'a GlobSet) -> Self {
        Self { cache, denylist }
    }

    pub fn cache(&self) -> &'a RawDataCache {
        self.cache
    }

    /// Resolves one field.
    ///
    /// # Arguments
    /// * `field` - Compiled rule naming synonyms, keywords, sheet and offset
    /// * `binding` - Row to read for repeating entities; `None` scans every data row
    /// * `fallback` - Value used when no source yields an accepted value
    pub fn resolve(
        &self,
        field: &FieldMatcher,
        binding: Option<RowBinding<'_>>,
        fallback: Option<&str>,
    ) -> KeyValueEntry {
        if let Some(entry) = self.from_key_values(field) {
            return entry;
        }
        if let Some(entry) = self.from_tables(field, binding) {
            return entry;
        }

        trace!("Field '{}' fell back to {:?}", field.key, fallback);
        KeyValueEntry {
            semantic_key: field.key.clone(),
            value: fallback.map(str::to_string),
            source: None,
            confidence: Confidence::Defaulted,
        }
    }

    /// True when a value is non-empty, not denylisted and matches the field pattern.
    pub fn accepts(&self, field: &FieldMatcher, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let folded = value.to_lowercase();
        if self.denylist.is_match(&folded) || field.denylist.is_match(&folded) {
            return false;
        }
        field.pattern.as_ref().map_or(true, |p| p.is_match(value))
    }

    fn from_key_values(&self, field: &FieldMatcher) -> Option<KeyValueEntry> {
        if !field.key_value {
            return None;
        }

        let cache = self.cache;
        let in_sheet = field.sheet.iter().flat_map(|sheet| {
            field.synonyms.iter().flat_map(move |key| {
                cache
                    .sheet(sheet)
                    .and_then(|s| s.key_values.get(key))
                    .into_iter()
                    .flatten()
            })
        });
        let anywhere = field
            .synonyms
            .iter()
            .flat_map(|key| cache.key_value_candidates(key));

        in_sheet
            .chain(anywhere)
            .find(|candidate| self.accepts(field, &candidate.value))
            .map(|candidate| KeyValueEntry {
                semantic_key: field.key.clone(),
                value: Some(candidate.value.trim().to_string()),
                source: Some(candidate.location.clone()),
                confidence: Confidence::Exact,
            })
    }

    fn from_tables(
        &self,
        field: &FieldMatcher,
        binding: Option<RowBinding<'_>>,
    ) -> Option<KeyValueEntry> {
        if field.keywords.is_empty() {
            return None;
        }

        if let Some(binding) = binding {
            return match field.layout {
                Layout::Header => self.header_value(field, binding.region, Some(binding.row)),
                Layout::RowLabel => None,
            };
        }

        let regions: Vec<&TableRegion> = match &field.sheet {
            Some(sheet) => self.cache.tables_in_sheet(sheet).iter().collect(),
            None => self.cache.all_tables().collect(),
        };

        regions.into_iter().find_map(|region| match field.layout {
            Layout::Header => self.header_value(field, region, None),
            Layout::RowLabel => self.row_label_value(field, region),
        })
    }

    /// Header layout: first matching header column by column order, value at
    /// the column offset, in the bound row or the first accepted data row.
    fn header_value(
        &self,
        field: &FieldMatcher,
        region: &TableRegion,
        row: Option<usize>,
    ) -> Option<KeyValueEntry> {
        let label_col = region
            .columns()
            .find(|&c| region.header_at(c).is_some_and(|h| field.matches_label(h)))?;
        let value_col = offset_column(label_col, field.column_offset)?;

        let mut rows = match row {
            Some(r) => r..r + 1,
            None => region.data_rows(),
        };
        rows.find_map(|r| self.accepted_cell(field, region, r, value_col))
    }

    /// Row-label layout: first row whose leading cell names the field.
    fn row_label_value(&self, field: &FieldMatcher, region: &TableRegion) -> Option<KeyValueEntry> {
        let value_col = offset_column(region.start_col, field.column_offset)?;

        (region.header_row..region.end_row).find_map(|r| {
            let label = self.cache.cell(&region.sheet, r, region.start_col)?;
            if !label.as_text().is_some_and(|l| field.matches_label(l)) {
                return None;
            }
            self.accepted_cell(field, region, r, value_col)
        })
    }

    fn accepted_cell(
        &self,
        field: &FieldMatcher,
        region: &TableRegion,
        row: usize,
        col: usize,
    ) -> Option<KeyValueEntry> {
        let value = self.cache.cell(&region.sheet, row, col).map(CellValue::to_text)?;
        if !self.accepts(field, &value) {
            return None;
        }
        Some(KeyValueEntry {
            semantic_key: field.key.clone(),
            value: Some(value),
            source: Some(CellRef { sheet: region.sheet.clone(), row, column: col }),
            confidence: Confidence::Inferred,
        })
    }
}

fn offset_column(col: usize, offset: i32) -> Option<usize> {
    let target = col as i64 + i64::from(offset);
    usize::try_from(target).ok()
}

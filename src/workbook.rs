//! Spreadsheet access.
//! Opens a workbook with `calamine` and snapshots every sheet into an
//! immutable grid addressed by absolute (row, column) positions.

use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use indexmap::IndexMap;
use log::debug;

use crate::error::{Error, Result};

/// A scalar cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Returns true when the cell holds nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Returns the trimmed text of a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.trim()),
            _ => None,
        }
    }

    /// Renders the cell the way a user sees it, trimmed.
    pub fn to_text(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{n:.0}")
                } else {
                    write!(f, "{n}")
                }
            }
            CellValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::Error(e) => CellValue::Text(format!("#ERROR: {e:?}")),
            Data::DateTime(dt) => CellValue::Text(format!("{dt}")),
            Data::DateTimeIso(s) => CellValue::Text(s.clone()),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }
}

/// Rows × columns of cells. Rows may have different lengths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Builds a grid from string rows; empty strings become empty cells.
    pub fn from_strings<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| CellValue::from(s.as_ref())).collect())
            .collect();
        Self { rows }
    }

    /// Copies a calamine range, placing cells at their absolute positions.
    fn from_range(range: &Range<Data>) -> Self {
        let (start_row, start_col) = match range.start() {
            Some((r, c)) => (r as usize, c as usize),
            None => return Self::default(),
        };

        let mut rows = vec![Vec::new(); start_row];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; start_col];
            cells.extend(row.iter().map(CellValue::from));
            rows.push(cells);
        }
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Length of the given row; zero past the end of the sheet.
    pub fn row_len(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, Vec::len)
    }

    /// Cell at an absolute position; `None` past the end of a row.
    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// True when the position holds a non-empty cell.
    pub fn is_filled(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some_and(|c| !c.is_empty())
    }
}

/// Snapshot of every sheet in a workbook, in workbook order.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    path: PathBuf,
    sheets: IndexMap<String, SheetGrid>,
}

impl Workbook {
    /// Opens the workbook at `path` and reads every sheet.
    ///
    /// # Errors
    /// * `Error::WorkbookError` if the file is missing, unreadable or not a spreadsheet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.is_file() {
            return Err(Error::WorkbookError { path: display, reason: "file not found".into() });
        }

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| Error::WorkbookError { path: display.clone(), reason: e.to_string() })?;

        let mut sheets = IndexMap::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name).map_err(|e| Error::WorkbookError {
                path: display.clone(),
                reason: format!("sheet '{name}': {e}"),
            })?;
            let grid = SheetGrid::from_range(&range);
            debug!("Read sheet '{}' ({} rows)", name, grid.height());
            sheets.insert(name, grid);
        }

        Ok(Self { path: path.to_path_buf(), sheets })
    }

    /// Builds a workbook from in-memory string rows.
    pub fn from_rows<N, R, S>(sheets: impl IntoIterator<Item = (N, R)>) -> Self
    where
        N: Into<String>,
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sheets = sheets
            .into_iter()
            .map(|(name, rows)| (name.into(), SheetGrid::from_strings(rows)))
            .collect();
        Self { path: PathBuf::from("<memory>"), sheets }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetGrid> {
        self.sheets.get(name)
    }

    /// Fails on the first required sheet the workbook lacks.
    ///
    /// # Errors
    /// * `Error::MissingSheetError` naming the absent sheet
    pub fn require_sheets<S: AsRef<str>>(&self, required: &[S]) -> Result<()> {
        for sheet in required {
            let sheet = sheet.as_ref();
            if !self.sheets.contains_key(sheet) {
                return Err(Error::MissingSheetError {
                    sheet: sheet.to_string(),
                    path: self.path.display().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Hands the grids over to the cache.
    pub fn into_sheets(self) -> IndexMap<String, SheetGrid> {
        self.sheets
    }
}

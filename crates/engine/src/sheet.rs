use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellContent, Value};
use crate::error::{EngineError, Result};
use crate::history::History;

pub use cellgraph_config::{MAX_COLS, MAX_ROWS};

/// Stable sheet identity. Assigned by the workbook, never reused after the
/// sheet is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub u64);

impl SheetId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        SheetId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalize a sheet name for case-insensitive comparison.
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A sheet name must contain something other than whitespace.
pub fn is_valid_sheet_name(name: &str) -> bool {
    !name.trim().is_empty()
}

static EMPTY_VALUE: Value = Value::Empty;
static EMPTY_CONTENT: CellContent = CellContent::Empty;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    /// Lowercased, trimmed name used for lookups
    pub(crate) name_key: String,
    pub rows: usize,
    pub cols: usize,
    #[serde(with = "cell_entries")]
    cells: FxHashMap<(usize, usize), Cell>,
    /// Undo/redo stacks. Never persisted.
    #[serde(skip)]
    pub(crate) history: History,
}

impl Sheet {
    /// Dimensions are capped at [`MAX_ROWS`] x [`MAX_COLS`].
    pub fn new(id: SheetId, name: &str, rows: usize, cols: usize) -> Self {
        Self {
            id,
            name: name.trim().to_string(),
            name_key: normalize_sheet_name(name),
            rows: rows.min(MAX_ROWS),
            cols: cols.min(MAX_COLS),
            cells: FxHashMap::default(),
            history: History::default(),
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
        self.name_key = normalize_sheet_name(name);
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if self.in_bounds(row, col) {
            Ok(())
        } else {
            Err(EngineError::OutOfBounds { row, col, rows: self.rows, cols: self.cols })
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Last computed value; `Empty` for cells never written.
    pub fn value(&self, row: usize, col: usize) -> &Value {
        self.cells.get(&(row, col)).map_or(&EMPTY_VALUE, |c| &c.cached)
    }

    /// Raw content as entered; `Empty` for cells never written.
    pub fn content(&self, row: usize, col: usize) -> &CellContent {
        self.cells.get(&(row, col)).map_or(&EMPTY_CONTENT, |c| &c.content)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &Cell)> {
        self.cells.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Coordinates of every cell holding a formula, sorted row-major.
    pub fn formula_cells(&self) -> Vec<(usize, usize)> {
        let mut cells: Vec<_> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.content.is_formula())
            .map(|(&pos, _)| pos)
            .collect();
        cells.sort_unstable();
        cells
    }

    pub fn has_dirty_cells(&self) -> bool {
        self.cells.values().any(|c| c.dirty)
    }

    pub(crate) fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(&(row, col))
    }

    /// Replace a cell's content, creating the cell on first write.
    ///
    /// Returns the previous content. The cached value is left alone: only the
    /// recalc pass writes it.
    pub(crate) fn set_content(&mut self, row: usize, col: usize, content: CellContent) -> CellContent {
        let cell = self.cells.entry((row, col)).or_default();
        std::mem::replace(&mut cell.content, content)
    }

    pub(crate) fn put_cell(&mut self, row: usize, col: usize, cell: Cell) {
        self.cells.insert((row, col), cell);
    }

    /// Insert rows at the specified position, shifting existing rows down.
    /// The sheet grows by `count` rows so nothing falls off the bottom.
    pub(crate) fn insert_rows(&mut self, at_row: usize, count: usize) {
        self.shift_cells(|r, c| if r >= at_row { Some((r + count, c)) } else { Some((r, c)) });
        self.rows += count;
    }

    /// Delete rows, shifting remaining rows up. Returns the removed cells.
    pub(crate) fn delete_rows(&mut self, start_row: usize, count: usize) -> Vec<((usize, usize), Cell)> {
        let end = start_row + count;
        let removed = self.shift_cells(|r, c| {
            if r < start_row {
                Some((r, c))
            } else if r < end {
                None
            } else {
                Some((r - count, c))
            }
        });
        self.rows -= count;
        removed
    }

    /// Insert columns at the specified position, shifting existing columns right.
    pub(crate) fn insert_cols(&mut self, at_col: usize, count: usize) {
        self.shift_cells(|r, c| if c >= at_col { Some((r, c + count)) } else { Some((r, c)) });
        self.cols += count;
    }

    /// Delete columns, shifting remaining columns left. Returns the removed cells.
    pub(crate) fn delete_cols(&mut self, start_col: usize, count: usize) -> Vec<((usize, usize), Cell)> {
        let end = start_col + count;
        let removed = self.shift_cells(|r, c| {
            if c < start_col {
                Some((r, c))
            } else if c < end {
                None
            } else {
                Some((r, c - count))
            }
        });
        self.cols -= count;
        removed
    }

    /// Move every cell through `map`. Cells mapped to `None` are removed and
    /// returned, sorted row-major.
    fn shift_cells<F>(&mut self, map: F) -> Vec<((usize, usize), Cell)>
    where
        F: Fn(usize, usize) -> Option<(usize, usize)>,
    {
        let old = std::mem::take(&mut self.cells);
        let mut removed = Vec::new();
        for ((r, c), cell) in old {
            match map(r, c) {
                Some(pos) => {
                    self.cells.insert(pos, cell);
                }
                None => removed.push(((r, c), cell)),
            }
        }
        removed.sort_by_key(|(pos, _)| *pos);
        removed
    }
}

/// Cells persist as a row-major list of `(row, col, cell)` entries, since
/// tuple keys are not valid map keys in most formats.
mod cell_entries {
    use rustc_hash::FxHashMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::cell::Cell;

    pub fn serialize<S>(cells: &FxHashMap<(usize, usize), Cell>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut entries: Vec<(usize, usize, &Cell)> =
            cells.iter().map(|(&(r, c), cell)| (r, c, cell)).collect();
        entries.sort_by_key(|(r, c, _)| (*r, *c));
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<FxHashMap<(usize, usize), Cell>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries: Vec<(usize, usize, Cell)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|(r, c, cell)| ((r, c), cell)).collect())
    }
}

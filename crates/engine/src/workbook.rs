use serde::{Deserialize, Serialize};

use cellgraph_config::Settings;

use crate::cell::{Cell, CellContent, Value};
use crate::cell_id::CellId;
use crate::command::Edit;
use crate::dep_graph::DepGraph;
use crate::error::{EngineError, Result};
use crate::formula::eval::CellLookup;
use crate::formula::refs::extract_cell_ids;
use crate::history::History;
use crate::recalc::RecalcReport;
use crate::sheet::{is_valid_sheet_name, normalize_sheet_name, Sheet, SheetId};

static EMPTY_VALUE: Value = Value::Empty;
static EMPTY_CONTENT: CellContent = CellContent::Empty;

/// A workbook containing multiple sheets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub(crate) sheets: Vec<Sheet>,
    #[serde(default)]
    active_sheet: Option<SheetId>,
    /// Next ID to assign to a new sheet. Monotonically increasing, never reused.
    #[serde(default = "default_next_sheet_id")]
    next_sheet_id: u64,

    #[serde(skip)]
    pub(crate) settings: Settings,

    /// Dependency graph for formula cells.
    /// Rebuilt on load, updated incrementally on cell changes.
    #[serde(skip)]
    pub(crate) dep_graph: DepGraph,
}

fn default_next_sheet_id() -> u64 {
    1
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Create an empty workbook with default settings. Add sheets with
    /// [`create_sheet`](Self::create_sheet).
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            sheets: Vec::new(),
            active_sheet: None,
            next_sheet_id: default_next_sheet_id(),
            settings: settings.clone(),
            dep_graph: DepGraph::new(),
        }
    }

    /// Swap in new settings. The history cap applies to every existing sheet
    /// immediately; default dimensions only affect sheets created later.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.settings = settings.clone();
        for sheet in &mut self.sheets {
            sheet.history.set_max_entries(settings.history_max_entries);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Generate a new unique SheetId (monotonically increasing, never reused)
    fn generate_sheet_id(&mut self) -> SheetId {
        let id = SheetId(self.next_sheet_id);
        self.next_sheet_id += 1;
        id
    }

    // =========================================================================
    // Sheets
    // =========================================================================

    /// Add a sheet sized from the settings defaults.
    ///
    /// The first sheet created becomes the active sheet.
    pub fn create_sheet(&mut self, name: &str) -> Result<SheetId> {
        if !is_valid_sheet_name(name) {
            return Err(EngineError::InvalidSheetName(name.to_string()));
        }
        if self.sheet_name_exists(name) {
            return Err(EngineError::DuplicateSheetName(name.trim().to_string()));
        }

        let id = self.generate_sheet_id();
        let mut sheet = Sheet::new(id, name, self.settings.default_rows, self.settings.default_cols);
        sheet.history = History::new(self.settings.history_max_entries);
        log::info!("created sheet '{}' ({})", sheet.name, id);
        self.sheets.push(sheet);

        if self.active_sheet.is_none() {
            self.active_sheet = Some(id);
        }

        // Formulas entered before the sheet existed read #REF! until now
        let waiting = self.formulas_reading_sheet(id);
        if !waiting.is_empty() {
            self.recalc_from(waiting);
        }
        Ok(id)
    }

    /// Remove a sheet and its history.
    ///
    /// Formulas on other sheets that read it are recalculated and evaluate to
    /// `#REF!`. This is a workbook operation and is not undoable.
    pub fn delete_sheet(&mut self, id: SheetId) -> Result<RecalcReport> {
        let idx = self.sheet_index(id)?;
        let readers = self.formulas_reading_sheet(id);

        let sheet = self.sheets.remove(idx);
        self.dep_graph.remove_sheet(id);
        log::info!("deleted sheet '{}' ({})", sheet.name, id);

        if self.active_sheet == Some(id) {
            let next = idx.min(self.sheets.len().saturating_sub(1));
            self.active_sheet = self.sheets.get(next).map(|s| s.id);
        }

        Ok(self.recalc_from(readers))
    }

    /// Rename a sheet. References hold sheet ids, so no formula changes.
    pub fn rename_sheet(&mut self, id: SheetId, new_name: &str) -> Result<()> {
        if !is_valid_sheet_name(new_name) {
            return Err(EngineError::InvalidSheetName(new_name.to_string()));
        }
        if !self.is_name_available(new_name, id) {
            return Err(EngineError::DuplicateSheetName(new_name.trim().to_string()));
        }
        let idx = self.sheet_index(id)?;
        let sheet = &mut self.sheets[idx];
        log::info!("renamed sheet '{}' to '{}' ({})", sheet.name, new_name.trim(), id);
        sheet.set_name(new_name);
        Ok(())
    }

    /// Check if a sheet name already exists (case-insensitive)
    pub fn sheet_name_exists(&self, name: &str) -> bool {
        let key = normalize_sheet_name(name);
        self.sheets.iter().any(|s| s.name_key == key)
    }

    /// Returns true if the name is not used by any sheet other than `exclude_id`
    pub fn is_name_available(&self, name: &str, exclude_id: SheetId) -> bool {
        let key = normalize_sheet_name(name);
        !self.sheets.iter().any(|s| s.id != exclude_id && s.name_key == key)
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Sheets in creation order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet_by_id(&self, id: SheetId) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.id == id)
    }

    /// Find a sheet by name (case-insensitive)
    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        let key = normalize_sheet_name(name);
        self.sheets.iter().find(|s| s.name_key == key)
    }

    pub fn sheet_id_by_name(&self, name: &str) -> Result<SheetId> {
        self.sheet_by_name(name)
            .map(|s| s.id)
            .ok_or_else(|| EngineError::SheetNameNotFound(name.to_string()))
    }

    pub fn set_active_sheet(&mut self, id: SheetId) -> Result<()> {
        self.sheet_index(id)?;
        self.active_sheet = Some(id);
        Ok(())
    }

    pub fn active_sheet_id(&self) -> Option<SheetId> {
        self.active_sheet
    }

    pub fn active_sheet(&self) -> Option<&Sheet> {
        self.active_sheet.and_then(|id| self.sheet_by_id(id))
    }

    pub(crate) fn sheet_index(&self, id: SheetId) -> Result<usize> {
        self.sheets
            .iter()
            .position(|s| s.id == id)
            .ok_or(EngineError::SheetNotFound(id))
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Cached value of a cell; `Empty` for unwritten cells and unknown sheets.
    pub fn value(&self, sheet: SheetId, row: usize, col: usize) -> &Value {
        self.sheet_by_id(sheet).map_or(&EMPTY_VALUE, |s| s.value(row, col))
    }

    /// Raw content of a cell; `Empty` for unwritten cells and unknown sheets.
    pub fn content(&self, sheet: SheetId, row: usize, col: usize) -> &CellContent {
        self.sheet_by_id(sheet).map_or(&EMPTY_CONTENT, |s| s.content(row, col))
    }

    /// Set one cell's content and recalculate everything downstream.
    ///
    /// Recorded on the cell's sheet history like any other edit.
    pub fn apply_edit(&mut self, cell: CellId, content: CellContent) -> Result<RecalcReport> {
        self.execute(cell.sheet, Edit::SetCell { row: cell.row, col: cell.col, content })
    }

    pub fn set_cell(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        content: impl Into<CellContent>,
    ) -> Result<RecalcReport> {
        self.apply_edit(CellId::new(sheet, row, col), content.into())
    }

    /// Write a rectangular block of imported values anchored at (row, col)
    /// as one undoable paste.
    pub fn import_block(
        &mut self,
        sheet: SheetId,
        row: usize,
        col: usize,
        block: Vec<Vec<Value>>,
    ) -> Result<RecalcReport> {
        let block = block
            .into_iter()
            .map(|r| r.into_iter().map(CellContent::from).collect())
            .collect();
        self.execute(sheet, Edit::Paste { row, col, block })
    }

    pub fn has_dirty_cells(&self) -> bool {
        self.sheets.iter().any(Sheet::has_dirty_cells)
    }

    pub(crate) fn cell_exists(&self, cell: CellId) -> bool {
        self.sheet_by_id(cell.sheet)
            .map_or(false, |s| s.cell(cell.row, cell.col).is_some())
    }

    pub(crate) fn cell_mut(&mut self, cell: CellId) -> Option<&mut Cell> {
        self.sheets
            .iter_mut()
            .find(|s| s.id == cell.sheet)
            .and_then(|s| s.cell_mut(cell.row, cell.col))
    }

    pub(crate) fn content_at(&self, cell: CellId) -> &CellContent {
        self.content(cell.sheet, cell.row, cell.col)
    }

    /// Replace content without touching the graph. Callers re-derive edges
    /// with [`update_cell_deps`](Self::update_cell_deps) once positions are
    /// final.
    pub(crate) fn write_content(&mut self, cell: CellId, content: CellContent) {
        if let Some(sheet) = self.sheets.iter_mut().find(|s| s.id == cell.sheet) {
            sheet.set_content(cell.row, cell.col, content);
        }
    }

    /// Every formula cell in the workbook, sorted.
    pub(crate) fn formula_cell_ids(&self) -> Vec<CellId> {
        let mut ids: Vec<CellId> = self
            .sheets
            .iter()
            .flat_map(|sheet| {
                sheet
                    .formula_cells()
                    .into_iter()
                    .map(move |(row, col)| CellId::new(sheet.id, row, col))
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn sheet_formula_ids(&self, idx: usize) -> Vec<CellId> {
        let sheet = &self.sheets[idx];
        sheet
            .formula_cells()
            .into_iter()
            .map(|(row, col)| CellId::new(sheet.id, row, col))
            .collect()
    }

    /// Formula cells on other sheets with an edge into `sheet`, sorted.
    fn formulas_reading_sheet(&self, sheet: SheetId) -> Vec<CellId> {
        let mut readers: Vec<CellId> = self
            .dep_graph
            .formula_cells()
            .filter(|c| c.sheet != sheet && self.dep_graph.precedents(*c).any(|p| p.sheet == sheet))
            .collect();
        readers.sort_unstable();
        readers
    }

    // =========================================================================
    // Dependency Graph
    // =========================================================================

    pub fn dep_graph(&self) -> &DepGraph {
        &self.dep_graph
    }

    /// Cells the formula at `cell` reads directly, sorted.
    pub fn precedents_of(&self, cell: CellId) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.dep_graph.precedents(cell).collect();
        cells.sort_unstable();
        cells
    }

    /// Every cell recomputed when `cell` changes, direct or transitive, sorted.
    pub fn dependents_of(&self, cell: CellId) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.dep_graph.dependents_of(cell).into_iter().collect();
        cells.sort_unstable();
        cells
    }

    /// Re-derive the reads-from edges of one cell from its current content.
    ///
    /// Non-formula cells end up with no precedents. A cycle is logged; the
    /// next recalc pass turns its members into `#CYCLE!`.
    pub(crate) fn update_cell_deps(&mut self, cell: CellId) {
        let sources = self
            .content_at(cell)
            .formula_expr()
            .map(|expr| extract_cell_ids(expr, cell.sheet))
            .unwrap_or_default();

        if let Err(cycle) = self.dep_graph.set_dependencies(cell, sources) {
            log::warn!("{}", cycle);
        }
    }

    /// Rebuild the dependency graph from scratch.
    pub fn rebuild_dep_graph(&mut self) {
        self.dep_graph = DepGraph::new();
        for cell in self.formula_cell_ids() {
            self.update_cell_deps(cell);
        }
        log::debug!(
            "dependency graph rebuilt: {} formulas, {} referenced cells",
            self.dep_graph.formula_cell_count(),
            self.dep_graph.referenced_cell_count()
        );
    }

    /// Bring a deserialized workbook to a consistent state: sheet histories
    /// get the configured cap, the graph is rebuilt and every cell is
    /// recomputed.
    pub fn rebuild_after_load(&mut self) -> RecalcReport {
        let settings = self.settings.clone();
        self.apply_settings(&settings);
        if self.active_sheet.map_or(true, |id| self.sheet_by_id(id).is_none()) {
            self.active_sheet = self.sheets.first().map(|s| s.id);
        }
        self.rebuild_dep_graph();
        self.recalculate_all()
    }
}

/// Read-only view over the sheets used while a formula is evaluated.
pub(crate) struct WorkbookLookup<'a> {
    sheets: &'a [Sheet],
}

impl<'a> WorkbookLookup<'a> {
    pub(crate) fn new(sheets: &'a [Sheet]) -> Self {
        Self { sheets }
    }
}

impl<'a> CellLookup for WorkbookLookup<'a> {
    fn value_at(&self, cell: CellId) -> Option<&Value> {
        let sheet = self.sheets.iter().find(|s| s.id == cell.sheet)?;
        if !sheet.in_bounds(cell.row, cell.col) {
            return None;
        }
        Some(sheet.value(cell.row, cell.col))
    }
}

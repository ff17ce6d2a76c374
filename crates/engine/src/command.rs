//! Reversible edits and per-sheet undo/redo.
//!
//! An [`Edit`] is what a caller asks for. Executing it validates the request,
//! applies it through the recalculation pass and records a [`Command`] on the
//! target sheet's history. A command holds enough to replay or revert the
//! edit exactly.

use std::collections::BTreeMap;

use crate::cell::CellContent;
use crate::cell_id::{col_to_letters, CellId};
use crate::error::{EngineError, Result};
use crate::recalc::RecalcReport;
use crate::sheet::SheetId;
use crate::structure::StructureOp;
use crate::workbook::Workbook;

/// A single content write, as produced by paste blocks and templates.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub row: usize,
    pub col: usize,
    pub content: CellContent,
}

impl CellWrite {
    pub fn new(row: usize, col: usize, content: impl Into<CellContent>) -> Self {
        Self { row, col, content: content.into() }
    }
}

/// A mutation request against one sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    SetCell { row: usize, col: usize, content: CellContent },
    ClearCell { row: usize, col: usize },
    /// Inclusive rectangle
    ClearRange { start_row: usize, start_col: usize, end_row: usize, end_col: usize },
    /// Rectangular block anchored at (row, col)
    Paste { row: usize, col: usize, block: Vec<Vec<CellContent>> },
    /// Arbitrary writes applied as one command
    Batch { label: String, writes: Vec<CellWrite> },
    InsertRows { at: usize, count: usize },
    DeleteRows { at: usize, count: usize },
    InsertCols { at: usize, count: usize },
    DeleteCols { at: usize, count: usize },
}

impl Edit {
    fn structure_op(&self) -> Option<StructureOp> {
        match *self {
            Edit::InsertRows { at, count } => Some(StructureOp::InsertRows { at, count }),
            Edit::DeleteRows { at, count } => Some(StructureOp::DeleteRows { at, count }),
            Edit::InsertCols { at, count } => Some(StructureOp::InsertCols { at, count }),
            Edit::DeleteCols { at, count } => Some(StructureOp::DeleteCols { at, count }),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        let addr = |row: usize, col: usize| format!("{}{}", col_to_letters(col), row + 1);
        match self {
            Edit::SetCell { row, col, .. } => format!("Edit {}", addr(*row, *col)),
            Edit::ClearCell { row, col } => format!("Clear {}", addr(*row, *col)),
            Edit::ClearRange { start_row, start_col, end_row, end_col } => {
                format!("Clear {}:{}", addr(*start_row, *start_col), addr(*end_row, *end_col))
            }
            Edit::Paste { row, col, block } => {
                let cells: usize = block.iter().map(Vec::len).sum();
                format!("Paste {} cells at {}", cells, addr(*row, *col))
            }
            Edit::Batch { label, .. } => label.clone(),
            other => other.structure_op().map(|op| op.label()).unwrap_or_default(),
        }
    }
}

/// Before/after content of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub row: usize,
    pub col: usize,
    pub before: CellContent,
    pub after: CellContent,
}

/// A formula rewritten by a structural edit. `cell` is its position after
/// the edit.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRewrite {
    pub cell: CellId,
    pub before: CellContent,
    pub after: CellContent,
}

/// Recorded, reversible mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Content changes on the owning sheet
    Cells { label: String, changes: Vec<CellChange> },
    /// Row/column edit with the snapshots its inverse needs
    Structure {
        op: StructureOp,
        removed: Vec<CellWrite>,
        rewritten: Vec<FormulaRewrite>,
    },
}

impl Command {
    pub fn label(&self) -> String {
        match self {
            Command::Cells { label, .. } => label.clone(),
            Command::Structure { op, .. } => op.label(),
        }
    }
}

impl Workbook {
    /// Validate and run an edit on `sheet_id`, recording it on that sheet's
    /// undo stack and clearing its redo stack.
    ///
    /// All-or-nothing: an edit that fails validation changes nothing.
    pub fn execute(&mut self, sheet_id: SheetId, edit: Edit) -> Result<RecalcReport> {
        let idx = self.sheet_index(sheet_id)?;

        if let Some(op) = edit.structure_op() {
            op.validate(&self.sheets[idx])?;
            let (command, seeds) = self.apply_structure(idx, op);
            let report = self.recalc_from(seeds);
            self.sheets[idx].history.push(command);
            return Ok(report);
        }

        let label = edit.label();
        let changes = self.plan_changes(idx, edit)?;
        let seeds = self.apply_changes(sheet_id, &changes, true);
        let report = self.recalc_from(seeds);
        self.sheets[idx].history.push(Command::Cells { label, changes });
        Ok(report)
    }

    /// Revert the most recent command on `sheet_id`.
    ///
    /// Cells on other sheets that read the reverted cells are recalculated;
    /// their histories are untouched.
    pub fn undo(&mut self, sheet_id: SheetId) -> Result<RecalcReport> {
        let idx = self.sheet_index(sheet_id)?;
        let command = self.sheets[idx]
            .history
            .undo()
            .ok_or(EngineError::NothingToUndo(sheet_id))?;

        let seeds = match &command {
            Command::Cells { changes, .. } => self.apply_changes(sheet_id, changes, false),
            Command::Structure { op, removed, rewritten } => {
                self.revert_structure(idx, *op, removed, rewritten)
            }
        };
        log::debug!("undo '{}' on sheet {}", command.label(), sheet_id);
        Ok(self.recalc_from(seeds))
    }

    /// Re-apply the most recently undone command on `sheet_id`.
    pub fn redo(&mut self, sheet_id: SheetId) -> Result<RecalcReport> {
        let idx = self.sheet_index(sheet_id)?;
        let command = self.sheets[idx]
            .history
            .redo()
            .ok_or(EngineError::NothingToRedo(sheet_id))?;

        let seeds = match &command {
            Command::Cells { changes, .. } => self.apply_changes(sheet_id, changes, true),
            Command::Structure { op, .. } => {
                // Formulas elsewhere may have changed since the first run, so
                // the snapshots are taken again
                let (fresh, seeds) = self.apply_structure(idx, *op);
                self.sheets[idx].history.replace_last_undo(fresh);
                seeds
            }
        };
        log::debug!("redo '{}' on sheet {}", command.label(), sheet_id);
        Ok(self.recalc_from(seeds))
    }

    pub fn can_undo(&self, sheet_id: SheetId) -> bool {
        self.sheet_by_id(sheet_id).map_or(false, |s| s.history.can_undo())
    }

    pub fn can_redo(&self, sheet_id: SheetId) -> bool {
        self.sheet_by_id(sheet_id).map_or(false, |s| s.history.can_redo())
    }

    pub fn undo_depth(&self, sheet_id: SheetId) -> usize {
        self.sheet_by_id(sheet_id).map_or(0, |s| s.history.undo_depth())
    }

    pub fn redo_depth(&self, sheet_id: SheetId) -> usize {
        self.sheet_by_id(sheet_id).map_or(0, |s| s.history.redo_depth())
    }

    /// Drop both stacks of one sheet.
    pub fn clear_history(&mut self, sheet_id: SheetId) -> Result<()> {
        let idx = self.sheet_index(sheet_id)?;
        self.sheets[idx].history.clear();
        Ok(())
    }

    /// Turn a content edit into per-cell changes, checking bounds and
    /// formula shape first. Later writes to the same cell win; `before` is
    /// always the content prior to the whole edit.
    fn plan_changes(&self, idx: usize, edit: Edit) -> Result<Vec<CellChange>> {
        let sheet = &self.sheets[idx];

        let writes: Vec<CellWrite> = match edit {
            Edit::SetCell { row, col, content } => vec![CellWrite { row, col, content }],
            Edit::ClearCell { row, col } => vec![CellWrite { row, col, content: CellContent::Empty }],
            Edit::ClearRange { start_row, start_col, end_row, end_col } => {
                if start_row > end_row || start_col > end_col {
                    return Err(EngineError::InvalidRange(format!(
                        "{}{}:{}{}",
                        col_to_letters(start_col),
                        start_row + 1,
                        col_to_letters(end_col),
                        end_row + 1
                    )));
                }
                sheet.check_bounds(end_row, end_col)?;
                // Cells never written are already empty
                let mut cells: Vec<(usize, usize)> = sheet
                    .cells_iter()
                    .map(|(&pos, _)| pos)
                    .filter(|&(r, c)| (start_row..=end_row).contains(&r) && (start_col..=end_col).contains(&c))
                    .collect();
                cells.sort_unstable();
                cells
                    .into_iter()
                    .map(|(row, col)| CellWrite { row, col, content: CellContent::Empty })
                    .collect()
            }
            Edit::Paste { row, col, block } => {
                let width = block.first().map_or(0, Vec::len);
                if width == 0 || block.iter().any(|r| r.len() != width) {
                    return Err(EngineError::InvalidRange(
                        "paste block must be a non-empty rectangle".to_string(),
                    ));
                }
                let mut writes = Vec::with_capacity(block.len() * width);
                for (i, block_row) in block.into_iter().enumerate() {
                    for (j, content) in block_row.into_iter().enumerate() {
                        writes.push(CellWrite { row: row + i, col: col + j, content });
                    }
                }
                writes
            }
            Edit::Batch { writes, .. } => writes,
            Edit::InsertRows { .. } | Edit::DeleteRows { .. } | Edit::InsertCols { .. } | Edit::DeleteCols { .. } => {
                return Err(EngineError::InvalidStructure("not a content edit".to_string()));
            }
        };

        let mut planned: BTreeMap<(usize, usize), CellChange> = BTreeMap::new();
        for write in writes {
            sheet.check_bounds(write.row, write.col)?;
            if let Some(expr) = write.content.formula_expr() {
                expr.validate()?;
            }
            planned
                .entry((write.row, write.col))
                .and_modify(|change| change.after = write.content.clone())
                .or_insert_with(|| CellChange {
                    row: write.row,
                    col: write.col,
                    before: sheet.content(write.row, write.col).clone(),
                    after: write.content.clone(),
                });
        }
        Ok(planned.into_values().collect())
    }

    /// Write the `after` (or `before`) side of each change and re-derive the
    /// written cells' edges. Returns the written cells as recalc seeds.
    fn apply_changes(&mut self, sheet_id: SheetId, changes: &[CellChange], forward: bool) -> Vec<CellId> {
        let mut seeds = Vec::with_capacity(changes.len());
        for change in changes {
            let cell = CellId::new(sheet_id, change.row, change.col);
            let content = if forward { &change.after } else { &change.before };
            self.write_content(cell, content.clone());
            self.update_cell_deps(cell);
            seeds.push(cell);
        }
        seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Value;
    use crate::formula::expr::{Expr, Func};

    fn workbook() -> (Workbook, SheetId) {
        let mut wb = Workbook::new();
        let id = wb.create_sheet("Sheet1").unwrap();
        (wb, id)
    }

    #[test]
    fn test_edit_labels() {
        assert_eq!(Edit::SetCell { row: 0, col: 1, content: CellContent::Empty }.label(), "Edit B1");
        assert_eq!(
            Edit::ClearRange { start_row: 0, start_col: 0, end_row: 2, end_col: 1 }.label(),
            "Clear A1:B3"
        );
        let paste = Edit::Paste {
            row: 0,
            col: 2,
            block: vec![vec![CellContent::number(1.0)], vec![CellContent::number(2.0)]],
        };
        assert_eq!(paste.label(), "Paste 2 cells at C1");
        assert_eq!(Edit::InsertRows { at: 4, count: 2 }.label(), "Insert 2 rows at 5");
    }

    #[test]
    fn test_set_cell_records_before_and_after() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(5.0) }).unwrap();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(7.0) }).unwrap();

        assert_eq!(wb.undo_depth(s), 2);
        assert_eq!(wb.sheet_by_id(s).unwrap().history().undo_label().as_deref(), Some("Edit A1"));

        wb.undo(s).unwrap();
        assert_eq!(wb.value(s, 0, 0), &Value::Number(5.0));
        assert_eq!(wb.sheet_by_id(s).unwrap().history().redo_label().as_deref(), Some("Edit A1"));
        wb.undo(s).unwrap();
        assert_eq!(wb.content(s, 0, 0), &CellContent::Empty);
        assert_eq!(wb.value(s, 0, 0), &Value::Empty);
    }

    #[test]
    fn test_undo_on_empty_stack() {
        let (mut wb, s) = workbook();
        assert_eq!(wb.undo(s), Err(EngineError::NothingToUndo(s)));
        assert_eq!(wb.redo(s), Err(EngineError::NothingToRedo(s)));
    }

    #[test]
    fn test_out_of_bounds_is_atomic() {
        let (mut wb, s) = workbook();
        let rows = wb.sheet_by_id(s).unwrap().rows;

        let block = vec![vec![CellContent::number(1.0)], vec![CellContent::number(2.0)]];
        let err = wb.execute(s, Edit::Paste { row: rows - 1, col: 0, block }).unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { .. }));

        // First row of the block was in bounds but must not have been written
        assert_eq!(wb.content(s, rows - 1, 0), &CellContent::Empty);
        assert_eq!(wb.undo_depth(s), 0);
    }

    #[test]
    fn test_arity_error_is_atomic() {
        let (mut wb, s) = workbook();
        let bad = Expr::call(Func::Round, vec![Expr::num(1.0)]);
        let err = wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::Formula(bad) });
        assert!(matches!(err, Err(EngineError::Arity { func: "ROUND", expected: 2, got: 1 })));
        assert_eq!(wb.sheet_by_id(s).unwrap().cell_count(), 0);
        assert!(!wb.can_undo(s));
    }

    #[test]
    fn test_ragged_paste_rejected() {
        let (mut wb, s) = workbook();
        let block = vec![vec![CellContent::number(1.0), CellContent::number(2.0)], vec![CellContent::number(3.0)]];
        let err = wb.execute(s, Edit::Paste { row: 0, col: 0, block }).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
    }

    #[test]
    fn test_unknown_sheet() {
        let (mut wb, _) = workbook();
        let ghost = SheetId::from_raw(99);
        let err = wb.execute(ghost, Edit::ClearCell { row: 0, col: 0 }).unwrap_err();
        assert_eq!(err, EngineError::SheetNotFound(ghost));
        assert_eq!(wb.undo(ghost), Err(EngineError::SheetNotFound(ghost)));
    }

    #[test]
    fn test_batch_last_write_wins_and_undo_restores_original() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(1.0) }).unwrap();

        let writes = vec![
            CellWrite::new(0, 0, Value::Number(2.0)),
            CellWrite::new(0, 0, Value::Number(3.0)),
        ];
        wb.execute(s, Edit::Batch { label: "Fill".to_string(), writes }).unwrap();
        assert_eq!(wb.value(s, 0, 0), &Value::Number(3.0));

        wb.undo(s).unwrap();
        assert_eq!(wb.value(s, 0, 0), &Value::Number(1.0));
    }

    #[test]
    fn test_clear_range_only_touches_written_cells() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 1, col: 1, content: CellContent::number(1.0) }).unwrap();
        wb.execute(s, Edit::SetCell { row: 5, col: 5, content: CellContent::number(2.0) }).unwrap();

        let report = wb
            .execute(s, Edit::ClearRange { start_row: 0, start_col: 0, end_row: 3, end_col: 3 })
            .unwrap();
        assert_eq!(report.dirty, vec![CellId::new(s, 1, 1)]);
        assert_eq!(wb.value(s, 1, 1), &Value::Empty);
        assert_eq!(wb.value(s, 5, 5), &Value::Number(2.0));
    }

    #[test]
    fn test_clear_cell_keeps_cell_record() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(1.0) }).unwrap();
        wb.execute(s, Edit::ClearCell { row: 0, col: 0 }).unwrap();

        let sheet = wb.sheet_by_id(s).unwrap();
        assert!(sheet.cell(0, 0).is_some());
        assert_eq!(sheet.content(0, 0), &CellContent::Empty);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(1.0) }).unwrap();
        wb.undo(s).unwrap();
        assert!(wb.can_redo(s));

        wb.execute(s, Edit::SetCell { row: 0, col: 1, content: CellContent::number(2.0) }).unwrap();
        assert!(!wb.can_redo(s));
    }

    #[test]
    fn test_clear_history() {
        let (mut wb, s) = workbook();
        wb.execute(s, Edit::SetCell { row: 0, col: 0, content: CellContent::number(1.0) }).unwrap();
        wb.clear_history(s).unwrap();
        assert!(!wb.can_undo(s));
        assert_eq!(wb.value(s, 0, 0), &Value::Number(1.0));
    }
}

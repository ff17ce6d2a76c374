//! Row and column insertion/deletion.
//!
//! A structural edit moves cells on one sheet and rewrites every formula in
//! the workbook whose references point into the moved region. The recorded
//! command keeps the removed cells and the formulas it rewrote, so undo can
//! put back exactly what was there.

use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellContent};
use crate::cell_id::{col_to_letters, CellId};
use crate::command::{CellWrite, Command, FormulaRewrite};
use crate::error::{EngineError, Result};
use crate::formula::refs::adjust_refs;
use crate::sheet::{Sheet, SheetId, MAX_COLS, MAX_ROWS};
use crate::workbook::Workbook;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureOp {
    InsertRows { at: usize, count: usize },
    DeleteRows { at: usize, count: usize },
    InsertCols { at: usize, count: usize },
    DeleteCols { at: usize, count: usize },
}

impl StructureOp {
    pub fn is_row_op(&self) -> bool {
        matches!(self, StructureOp::InsertRows { .. } | StructureOp::DeleteRows { .. })
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, StructureOp::InsertRows { .. } | StructureOp::InsertCols { .. })
    }

    pub fn at(&self) -> usize {
        match *self {
            StructureOp::InsertRows { at, .. }
            | StructureOp::DeleteRows { at, .. }
            | StructureOp::InsertCols { at, .. }
            | StructureOp::DeleteCols { at, .. } => at,
        }
    }

    pub fn count(&self) -> usize {
        match *self {
            StructureOp::InsertRows { count, .. }
            | StructureOp::DeleteRows { count, .. }
            | StructureOp::InsertCols { count, .. }
            | StructureOp::DeleteCols { count, .. } => count,
        }
    }

    /// The edit that moves cells back where they were.
    pub fn inverse(&self) -> StructureOp {
        match *self {
            StructureOp::InsertRows { at, count } => StructureOp::DeleteRows { at, count },
            StructureOp::DeleteRows { at, count } => StructureOp::InsertRows { at, count },
            StructureOp::InsertCols { at, count } => StructureOp::DeleteCols { at, count },
            StructureOp::DeleteCols { at, count } => StructureOp::InsertCols { at, count },
        }
    }

    /// Grid size along the axis this edit shifts.
    fn limit(&self) -> usize {
        if self.is_row_op() {
            MAX_ROWS
        } else {
            MAX_COLS
        }
    }

    /// New position of a row (or column) index. `None` if it was deleted or
    /// pushed off the end of the grid.
    pub fn map_index(&self, i: usize) -> Option<usize> {
        let (at, count) = (self.at(), self.count());
        if self.is_insert() {
            if i < at {
                return Some(i);
            }
            i.checked_add(count).filter(|&moved| moved < self.limit())
        } else if i < at {
            Some(i)
        } else if i - at < count {
            None
        } else {
            Some(i - count)
        }
    }

    /// New bounds of an inclusive span. Insertion inside the span grows it;
    /// deletion shrinks it. `None` if the whole span was deleted.
    pub fn map_span(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if self.is_insert() {
            // A span pushed partly off the grid keeps what is left
            let end = self.map_index(end).unwrap_or(self.limit() - 1);
            return Some((self.map_index(start)?, end));
        }

        let (at, count) = (self.at(), self.count());
        let band_end = at.saturating_add(count);
        if start >= at && end < band_end {
            return None;
        }

        let new_start = if start < at {
            start
        } else if start < band_end {
            at
        } else {
            start - count
        };
        let new_end = if end < at {
            end
        } else if end < band_end {
            at - 1
        } else {
            end - count
        };
        Some((new_start, new_end))
    }

    /// Position of `cell` after this edit runs on `sheet`.
    pub fn map_cell(&self, cell: CellId, sheet: SheetId) -> Option<CellId> {
        if cell.sheet != sheet {
            return Some(cell);
        }
        if self.is_row_op() {
            self.map_index(cell.row).map(|row| cell.at(row, cell.col))
        } else {
            self.map_index(cell.col).map(|col| cell.at(cell.row, col))
        }
    }

    /// Reject edits the sheet cannot take.
    pub fn validate(&self, sheet: &Sheet) -> Result<()> {
        let (at, count) = (self.at(), self.count());
        let (len, axis) = if self.is_row_op() { (sheet.rows, "row") } else { (sheet.cols, "column") };

        if count == 0 {
            return Err(EngineError::InvalidStructure(format!("{} count must be at least 1", axis)));
        }

        if self.is_insert() {
            if at > len {
                return Err(EngineError::InvalidStructure(format!(
                    "cannot insert at {} {}: sheet has {}",
                    axis, at, len
                )));
            }
            match len.checked_add(count) {
                Some(grown) if grown <= self.limit() => {}
                _ => {
                    return Err(EngineError::InvalidStructure(format!(
                        "a sheet holds at most {} {}s",
                        self.limit(),
                        axis
                    )))
                }
            }
        } else {
            match at.checked_add(count) {
                Some(end) if end <= len => {}
                _ => {
                    return Err(EngineError::InvalidStructure(format!(
                        "cannot delete {} {}(s) at {}: sheet has {}",
                        count, axis, at, len
                    )))
                }
            }
            if count >= len {
                return Err(EngineError::InvalidStructure(format!("cannot delete every {}", axis)));
            }
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        let count = self.count();
        let plural = if count == 1 { "" } else { "s" };
        match *self {
            StructureOp::InsertRows { at, .. } => format!("Insert {} row{} at {}", count, plural, at.saturating_add(1)),
            StructureOp::DeleteRows { at, .. } => format!("Delete {} row{} at {}", count, plural, at.saturating_add(1)),
            StructureOp::InsertCols { at, .. } => {
                format!("Insert {} column{} at {}", count, plural, col_to_letters(at))
            }
            StructureOp::DeleteCols { at, .. } => {
                format!("Delete {} column{} at {}", count, plural, col_to_letters(at))
            }
        }
    }
}

impl Workbook {
    /// Run a validated structural edit on the sheet at `idx`.
    ///
    /// Returns the command recording it and the cells the following recalc
    /// pass must start from.
    pub(crate) fn apply_structure(&mut self, idx: usize, op: StructureOp) -> (Command, Vec<CellId>) {
        let sheet = &mut self.sheets[idx];
        let sheet_id = sheet.id;

        let removed_cells = match op {
            StructureOp::InsertRows { at, count } => {
                sheet.insert_rows(at, count);
                Vec::new()
            }
            StructureOp::DeleteRows { at, count } => sheet.delete_rows(at, count),
            StructureOp::InsertCols { at, count } => {
                sheet.insert_cols(at, count);
                Vec::new()
            }
            StructureOp::DeleteCols { at, count } => sheet.delete_cols(at, count),
        };
        let removed: Vec<CellWrite> = removed_cells
            .into_iter()
            .map(|((row, col), cell)| CellWrite { row, col, content: cell.content })
            .collect();

        self.dep_graph.apply_mapping(|c| op.map_cell(c, sheet_id));

        let mut rewritten = Vec::new();
        for id in self.formula_cell_ids() {
            let content = self.content_at(id);
            let Some(expr) = content.formula_expr() else { continue };
            if let Some(adjusted) = adjust_refs(expr, id.sheet, sheet_id, op) {
                let after = CellContent::Formula(adjusted);
                rewritten.push(FormulaRewrite { cell: id, before: content.clone(), after });
            }
        }

        let mut seeds = self.sheet_formula_ids(idx);
        for rewrite in &rewritten {
            self.write_content(rewrite.cell, rewrite.after.clone());
            self.update_cell_deps(rewrite.cell);
            seeds.push(rewrite.cell);
        }

        log::debug!(
            "{} on sheet {}: {} removed, {} formulas rewritten",
            op.label(),
            sheet_id,
            removed.len(),
            rewritten.len()
        );

        (Command::Structure { op, removed, rewritten }, seeds)
    }

    /// Undo a structural edit on the sheet at `idx`.
    ///
    /// Each rewritten formula goes back to its recorded content. A formula
    /// that changed since (possible only on another sheet) and every other
    /// formula referencing the region get the inverse shift applied instead.
    pub(crate) fn revert_structure(
        &mut self,
        idx: usize,
        op: StructureOp,
        removed: &[CellWrite],
        rewritten: &[FormulaRewrite],
    ) -> Vec<CellId> {
        let sheet_id = self.sheets[idx].id;
        let inverse = op.inverse();
        let snapshots: FxHashMap<CellId, &FormulaRewrite> =
            rewritten.iter().map(|r| (r.cell, r)).collect();

        // Restore references while cells still sit at their shifted positions.
        // Edges are re-derived once everything is back in place.
        let mut touched: Vec<CellId> = Vec::new();
        for id in self.formula_cell_ids() {
            let current = self.content_at(id).clone();
            if let Some(snapshot) = snapshots.get(&id) {
                if current == snapshot.after {
                    self.write_content(id, snapshot.before.clone());
                    touched.push(id);
                    continue;
                }
                log::warn!(
                    "{} changed after '{}'; shifting its references instead of restoring",
                    id,
                    op.label()
                );
            }
            let Some(expr) = current.formula_expr() else { continue };
            if let Some(adjusted) = adjust_refs(expr, id.sheet, sheet_id, inverse) {
                self.write_content(id, CellContent::Formula(adjusted));
                touched.push(id);
            }
        }

        let sheet = &mut self.sheets[idx];
        match inverse {
            StructureOp::InsertRows { at, count } => sheet.insert_rows(at, count),
            StructureOp::DeleteRows { at, count } => {
                sheet.delete_rows(at, count);
            }
            StructureOp::InsertCols { at, count } => sheet.insert_cols(at, count),
            StructureOp::DeleteCols { at, count } => {
                sheet.delete_cols(at, count);
            }
        }
        for w in removed {
            sheet.put_cell(w.row, w.col, Cell::with_content(w.content.clone()));
        }

        self.dep_graph.apply_mapping(|c| inverse.map_cell(c, sheet_id));

        let mut seeds: Vec<CellId> = touched
            .into_iter()
            .filter_map(|c| inverse.map_cell(c, sheet_id))
            .collect();
        seeds.extend(removed.iter().map(|w| CellId::new(sheet_id, w.row, w.col)));
        for &cell in &seeds {
            self.update_cell_deps(cell);
        }
        seeds.extend(self.sheet_formula_ids(idx));
        seeds
    }
}

//! Recalculation pass and reporting.
//!
//! A pass takes a set of seed cells, expands it to the dirty closure,
//! flags cycle members with `#CYCLE!`, orders the rest topologically and
//! evaluates each cell exactly once against the cached values of its
//! precedents.

use std::collections::BTreeSet;
use std::time::Instant;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::cell::{CellContent, CellError, Value};
use crate::cell_id::CellId;
use crate::formula::eval::evaluate;
use crate::workbook::{Workbook, WorkbookLookup};

/// Report from a recalculation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalcReport {
    /// True for a pass over every cell in the workbook.
    pub full: bool,

    /// The dirty closure: every cell this pass recomputed, sorted.
    pub dirty: Vec<CellId>,

    /// Evaluation order. Cycle members are not in it.
    pub order: Vec<CellId>,

    /// Cells whose cached value differs from before the pass, sorted.
    pub changed: Vec<CellId>,

    /// Cells on a dependency cycle; their value is `#CYCLE!`.
    pub cycle_cells: Vec<CellId>,

    /// Maximum dependency depth encountered.
    /// A formula with no formula dependencies in the pass has depth 1.
    /// A formula depending on another formula has depth = max(precedent depths) + 1.
    /// Value cells have depth 0.
    pub max_depth: usize,

    /// Time taken for the pass in milliseconds.
    pub duration_ms: u64,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells_recomputed(&self) -> usize {
        self.dirty.len()
    }

    pub fn had_cycles(&self) -> bool {
        !self.cycle_cells.is_empty()
    }

    /// Format as a concise one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} cells in {}ms, depth={}, changed={}, cycles={}",
            self.cells_recomputed(),
            self.duration_ms,
            self.max_depth,
            self.changed.len(),
            self.cycle_cells.len(),
        )
    }

    /// Format as a one-line log entry.
    ///
    /// Format: `[recalc/incr]    0ms  3 cells  depth=2  changed=2  cycles=0`
    pub fn log_line(&self) -> String {
        format!(
            "[recalc/{}] {:>4}ms  {} cells  depth={}  changed={}  cycles={}",
            if self.full { "full" } else { "incr" },
            self.duration_ms,
            self.cells_recomputed(),
            self.max_depth,
            self.changed.len(),
            self.cycle_cells.len(),
        )
    }
}

/// Signal that a dependency update put a cell on a cycle.
///
/// The edit that triggered it is still applied; the cycle members evaluate to
/// `#CYCLE!` until the cycle is broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CycleDetected {
    /// The strongly-connected set, sorted.
    pub cells: Vec<CellId>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleDetected {
    pub fn self_reference(cell: CellId) -> Self {
        Self {
            cells: vec![cell],
            message: format!("Cell {} references itself", cell),
        }
    }

    pub fn cycle(cells: Vec<CellId>) -> Self {
        let cell_list: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        let message = match (cell_list.first(), cell_list.last()) {
            (Some(first), Some(last)) if cells.len() > 5 => format!(
                "Circular reference involving {} cells: {} → ... → {}",
                cells.len(),
                first,
                last
            ),
            _ => format!("Circular reference: {}", cell_list.join(" → ")),
        };
        Self { cells, message }
    }
}

impl Workbook {
    /// Recompute every cell in the workbook.
    pub fn recalculate_all(&mut self) -> RecalcReport {
        let seeds: Vec<CellId> = self
            .sheets
            .iter()
            .flat_map(|sheet| {
                sheet
                    .cells_iter()
                    .map(move |(&(row, col), _)| CellId::new(sheet.id, row, col))
            })
            .collect();
        self.run_pass(seeds, true)
    }

    /// Recompute `seeds` and everything downstream of them, in one pass.
    pub(crate) fn recalc_from<I>(&mut self, seeds: I) -> RecalcReport
    where
        I: IntoIterator<Item = CellId>,
    {
        self.run_pass(seeds.into_iter().collect(), false)
    }

    fn run_pass(&mut self, seeds: Vec<CellId>, full: bool) -> RecalcReport {
        let start = Instant::now();

        // Dirty closure. A seed already in the closure had its dependents
        // added when it was reached.
        let mut closure: BTreeSet<CellId> = BTreeSet::new();
        for seed in seeds {
            if closure.insert(seed) {
                closure.extend(self.dep_graph.dependents_of(seed));
            }
        }
        // Cells that were never written (or whose sheet is gone) have
        // nothing to compute
        closure.retain(|c| self.cell_exists(*c));

        for &cell in &closure {
            if let Some(c) = self.cell_mut(cell) {
                c.dirty = true;
            }
        }

        let mut report = RecalcReport {
            full,
            dirty: closure.iter().copied().collect(),
            ..RecalcReport::default()
        };

        // Cycle members are flagged and excluded from the order
        let mut remaining = closure;
        for scc in self.dep_graph.find_cycle_sccs(&remaining) {
            log::warn!("{}", CycleDetected::cycle(scc.clone()));
            for cell in scc {
                remaining.remove(&cell);
                report.cycle_cells.push(cell);
            }
        }

        let order = match self.dep_graph.topo_order(&remaining) {
            Ok(order) => order,
            Err(stuck) => {
                log::warn!("unordered cells after cycle removal: {}", stuck);
                let stuck_set: BTreeSet<CellId> = stuck.cells.iter().copied().collect();
                report.cycle_cells.extend(stuck.cells);
                remaining.retain(|c| !stuck_set.contains(c));
                remaining.iter().copied().collect()
            }
        };
        report.cycle_cells.sort_unstable();

        for &cell in &report.cycle_cells {
            if let Some(c) = self.cell_mut(cell) {
                let value = Value::Error(CellError::Circular);
                if c.cached != value {
                    report.changed.push(cell);
                }
                c.cached = value;
                c.dirty = false;
            }
        }

        let mut depths: FxHashMap<CellId, usize> = FxHashMap::default();
        for &cell in &order {
            let (value, is_formula) = self.compute(cell);

            let depth = if is_formula {
                1 + self
                    .dep_graph
                    .precedents(cell)
                    .filter_map(|p| depths.get(&p).copied())
                    .max()
                    .unwrap_or(0)
            } else {
                0
            };
            depths.insert(cell, depth);
            report.max_depth = report.max_depth.max(depth);

            if let Some(c) = self.cell_mut(cell) {
                if c.cached != value {
                    report.changed.push(cell);
                }
                c.cached = value;
                c.dirty = false;
            }
        }

        report.order = order;
        report.changed.sort_unstable();
        report.duration_ms = start.elapsed().as_millis() as u64;

        if self.settings.log_recalc_reports {
            log::debug!("{}", report.log_line());
        }
        report
    }

    /// Evaluate one cell's content against the current cached values.
    fn compute(&self, cell: CellId) -> (Value, bool) {
        let Some(sheet) = self.sheet_by_id(cell.sheet) else {
            return (Value::Error(CellError::Reference), false);
        };
        match sheet.content(cell.row, cell.col) {
            CellContent::Empty => (Value::Empty, false),
            CellContent::Literal(v) => (v.clone(), false),
            CellContent::Formula(expr) => {
                let lookup = WorkbookLookup::new(&self.sheets);
                (evaluate(expr, cell.sheet, &lookup), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::SheetId;

    fn cell(sheet: u64, row: usize, col: usize) -> CellId {
        CellId::new(SheetId::from_raw(sheet), row, col)
    }

    #[test]
    fn test_recalc_report_default() {
        let report = RecalcReport::default();
        assert_eq!(report.duration_ms, 0);
        assert_eq!(report.cells_recomputed(), 0);
        assert_eq!(report.max_depth, 0);
        assert!(!report.had_cycles());
    }

    #[test]
    fn test_recalc_report_summary() {
        let report = RecalcReport {
            dirty: vec![cell(1, 0, 0), cell(1, 0, 1)],
            changed: vec![cell(1, 0, 1)],
            max_depth: 1,
            duration_ms: 42,
            ..Default::default()
        };
        assert_eq!(report.summary(), "2 cells in 42ms, depth=1, changed=1, cycles=0");
    }

    #[test]
    fn test_recalc_report_log_line() {
        let report = RecalcReport {
            full: true,
            dirty: (0..628).map(|r| cell(1, r, 0)).collect(),
            max_depth: 7,
            duration_ms: 14,
            ..Default::default()
        };
        assert_eq!(
            report.log_line(),
            "[recalc/full]   14ms  628 cells  depth=7  changed=0  cycles=0"
        );
    }

    #[test]
    fn test_recalc_report_log_line_incremental_with_cycles() {
        let report = RecalcReport {
            dirty: vec![cell(1, 0, 0), cell(1, 0, 1)],
            cycle_cells: vec![cell(1, 0, 0), cell(1, 0, 1)],
            changed: vec![cell(1, 0, 0), cell(1, 0, 1)],
            duration_ms: 5,
            ..Default::default()
        };
        assert_eq!(
            report.log_line(),
            "[recalc/incr]    5ms  2 cells  depth=0  changed=2  cycles=2"
        );
    }

    #[test]
    fn test_cycle_detected_self_reference() {
        let a1 = cell(1, 0, 0);
        let err = CycleDetected::self_reference(a1);
        assert_eq!(err.cells, vec![a1]);
        assert_eq!(err.to_string(), "Cell Sheet1!A1 references itself");
    }

    #[test]
    fn test_cycle_detected_small_cycle() {
        let err = CycleDetected::cycle(vec![cell(1, 0, 0), cell(1, 0, 1)]);
        assert_eq!(err.to_string(), "Circular reference: Sheet1!A1 → Sheet1!B1");
    }

    #[test]
    fn test_cycle_detected_large_cycle() {
        let cells: Vec<CellId> = (0..10).map(|i| cell(1, i, 0)).collect();
        let err = CycleDetected::cycle(cells);
        assert!(err.message.contains("..."));
        assert!(err.message.contains("10 cells"));
    }
}

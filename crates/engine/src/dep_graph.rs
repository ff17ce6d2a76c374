//! Dependency graph for formula cells.
//!
//! Tracks precedents (cells a formula reads from) and dependents (cells that
//! read from a given cell) across every sheet of a workbook.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! Edges are derived data: the edge set is always the union of the references
//! in the current content of every formula cell.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_id::CellId;
use crate::recalc::CycleDetected;
use crate::sheet::SheetId;

/// Persistent dependency graph for formula cells.
///
/// Maintains bidirectional adjacency for O(1) lookups:
/// - `preds[B]` = cells that B depends on (precedents)
/// - `succs[A]` = cells that depend on A (dependents)
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
/// 3. **No duplicate edges:** Set semantics enforced by FxHashSet.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// B -> {A1, A2, ...}
    preds: FxHashMap<CellId, FxHashSet<CellId>>,

    /// A -> {B1, B2, ...}
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct precedents of a cell (the cells its formula reads).
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Direct dependents of a cell (the formulas that read it).
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Returns true if this cell has formula dependencies tracked in the graph.
    pub fn is_formula_cell(&self, cell: CellId) -> bool {
        self.preds.contains_key(&cell)
    }

    pub fn formula_cell_count(&self) -> usize {
        self.preds.len()
    }

    pub fn referenced_cell_count(&self) -> usize {
        self.succs.len()
    }

    /// All cells with at least one precedent.
    pub fn formula_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.preds.keys().copied()
    }

    /// Replace every reads-from edge of `cell` with `sources`, then check
    /// whether `cell` now sits on a cycle.
    ///
    /// The edges are applied either way. On a cycle the error carries the
    /// whole strongly-connected set containing `cell`, sorted.
    pub fn set_dependencies<I>(&mut self, cell: CellId, sources: I) -> Result<(), CycleDetected>
    where
        I: IntoIterator<Item = CellId>,
    {
        self.replace_edges(cell, sources.into_iter().collect());

        if !self.reaches_self(cell) {
            return Ok(());
        }

        let members = self.scc_of(cell);
        if members.len() == 1 {
            Err(CycleDetected::self_reference(cell))
        } else {
            Err(CycleDetected::cycle(members))
        }
    }

    /// Replace all edges for a formula cell atomically.
    ///
    /// 1. Removes the cell from all its old precedents' successor sets
    /// 2. Adds the cell to all new precedents' successor sets
    /// 3. Stores the new precedent set
    ///
    /// Pass an empty set to clear all edges for this cell.
    fn replace_edges(&mut self, formula_cell: CellId, new_preds: FxHashSet<CellId>) {
        if let Some(old_preds) = self.preds.remove(&formula_cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&formula_cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(formula_cell);
        }
        self.preds.insert(formula_cell, new_preds);
    }

    /// Depth-first walk along reads-from edges starting at `cell`.
    ///
    /// `cell` stays on the traversal stack for the whole walk, so reaching it
    /// again means it is on a cycle. Nodes already finished are not revisited.
    fn reaches_self(&self, cell: CellId) -> bool {
        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        let mut stack: Vec<CellId> = vec![cell];
        visited.insert(cell);

        while let Some(current) = stack.pop() {
            for pred in self.precedents(current) {
                if pred == cell {
                    return true;
                }
                if visited.insert(pred) {
                    stack.push(pred);
                }
            }
        }
        false
    }

    /// The strongly-connected set containing `cell`: everything `cell` reads
    /// from (transitively) that also reads from `cell`.
    fn scc_of(&self, cell: CellId) -> Vec<CellId> {
        let upstream = self.reachable(cell, |c| self.precedents(c).collect());
        let downstream = self.reachable(cell, |c| self.dependents(c).collect());
        let mut members: Vec<CellId> = upstream.intersection(&downstream).copied().collect();
        members.sort_unstable();
        members
    }

    fn reachable<F>(&self, start: CellId, next: F) -> FxHashSet<CellId>
    where
        F: Fn(CellId) -> Vec<CellId>,
    {
        let mut seen = FxHashSet::default();
        seen.insert(start);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for n in next(current) {
                if seen.insert(n) {
                    stack.push(n);
                }
            }
        }
        seen
    }

    /// Every cell that must be recomputed when `cell` changes: direct and
    /// transitive dependents, excluding `cell` itself unless it is on a
    /// cycle. Each node is visited once, even under diamond fan-out.
    pub fn dependents_of(&self, cell: CellId) -> FxHashSet<CellId> {
        let mut visited: FxHashSet<CellId> = FxHashSet::default();
        let mut stack: Vec<CellId> = self.dependents(cell).collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.dependents(current).filter(|d| !visited.contains(d)));
        }
        visited
    }

    /// Drop every edge touching `cell`, in both directions.
    pub fn remove_cell(&mut self, cell: CellId) {
        self.replace_edges(cell, FxHashSet::default());

        if let Some(dependents) = self.succs.remove(&cell) {
            for dep in dependents {
                if let Some(preds) = self.preds.get_mut(&dep) {
                    preds.remove(&cell);
                    if preds.is_empty() {
                        self.preds.remove(&dep);
                    }
                }
            }
        }
    }

    /// Remove all edges involving cells from a specific sheet.
    ///
    /// Called when a sheet is deleted.
    pub fn remove_sheet(&mut self, sheet: SheetId) {
        let mut touched: Vec<CellId> = self
            .preds
            .keys()
            .chain(self.succs.keys())
            .filter(|c| c.sheet == sheet)
            .copied()
            .collect();
        touched.sort_unstable();
        touched.dedup();

        for cell in touched {
            self.remove_cell(cell);
        }
    }

    /// Apply a coordinate mapping to all cells in the graph.
    ///
    /// Used for row/column insert/delete operations. The mapping function
    /// returns `Some(new_id)` if the cell moves, or `None` if it's deleted.
    pub fn apply_mapping<F>(&mut self, map: F)
    where
        F: Fn(CellId) -> Option<CellId>,
    {
        let mut new_preds: FxHashMap<CellId, FxHashSet<CellId>> = FxHashMap::default();
        let mut new_succs: FxHashMap<CellId, FxHashSet<CellId>> = FxHashMap::default();

        for (formula_cell, preds) in &self.preds {
            let Some(new_formula_cell) = map(*formula_cell) else {
                continue;
            };

            let mapped_preds: FxHashSet<CellId> = preds.iter().filter_map(|p| map(*p)).collect();
            if mapped_preds.is_empty() {
                continue;
            }

            for pred in &mapped_preds {
                new_succs.entry(*pred).or_default().insert(new_formula_cell);
            }
            new_preds.insert(new_formula_cell, mapped_preds);
        }

        self.preds = new_preds;
        self.succs = new_succs;
    }

    // =========================================================================
    // Cycle Membership (Tarjan's SCC)
    // =========================================================================

    /// Find all non-trivial SCCs within `subset`, returned as separate groups.
    ///
    /// Only edges between cells of the subset are considered. A group is a
    /// true cycle: size > 1, or a single cell reading itself. Iteration is in
    /// sorted order and each group is sorted, so output is deterministic.
    ///
    /// Iterative, to avoid stack overflow on deep graphs.
    pub fn find_cycle_sccs(&self, subset: &BTreeSet<CellId>) -> Vec<Vec<CellId>> {
        let sorted_neighbours = |cell: CellId| -> Vec<CellId> {
            let mut neighbours: Vec<CellId> =
                self.precedents(cell).filter(|c| subset.contains(c)).collect();
            neighbours.sort_unstable();
            neighbours
        };

        struct DfsFrame {
            cell: CellId,
            neighbours: Vec<CellId>,
            next_idx: usize,
        }

        let mut index_counter: u32 = 0;
        let mut stack: Vec<CellId> = Vec::new();
        let mut on_stack: FxHashSet<CellId> = FxHashSet::default();
        let mut indices: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut lowlinks: FxHashMap<CellId, u32> = FxHashMap::default();
        let mut sccs: Vec<Vec<CellId>> = Vec::new();

        for &root in subset {
            if indices.contains_key(&root) {
                continue;
            }

            indices.insert(root, index_counter);
            lowlinks.insert(root, index_counter);
            index_counter += 1;
            stack.push(root);
            on_stack.insert(root);

            let mut dfs_stack = vec![DfsFrame {
                cell: root,
                neighbours: sorted_neighbours(root),
                next_idx: 0,
            }];

            while let Some(frame) = dfs_stack.last_mut() {
                if frame.next_idx < frame.neighbours.len() {
                    let w = frame.neighbours[frame.next_idx];
                    frame.next_idx += 1;

                    if let Some(&w_idx) = indices.get(&w) {
                        if on_stack.contains(&w) {
                            let v_low = lowlinks.entry(frame.cell).or_insert(w_idx);
                            *v_low = (*v_low).min(w_idx);
                        }
                    } else {
                        indices.insert(w, index_counter);
                        lowlinks.insert(w, index_counter);
                        index_counter += 1;
                        stack.push(w);
                        on_stack.insert(w);

                        dfs_stack.push(DfsFrame {
                            cell: w,
                            neighbours: sorted_neighbours(w),
                            next_idx: 0,
                        });
                    }
                    continue;
                }

                // All neighbours explored: pop and propagate lowlink
                let v = frame.cell;
                dfs_stack.pop();
                let v_low = lowlinks[&v];
                let v_idx = indices[&v];

                if let Some(parent) = dfs_stack.last() {
                    if let Some(parent_low) = lowlinks.get_mut(&parent.cell) {
                        *parent_low = (*parent_low).min(v_low);
                    }
                }

                if v_low != v_idx {
                    continue;
                }

                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack.remove(&w);
                    scc.push(w);
                    if w == v {
                        break;
                    }
                }

                let is_cycle = scc.len() > 1
                    || self.preds.get(&v).map_or(false, |p| p.contains(&v));
                if is_cycle {
                    scc.sort_unstable();
                    sccs.push(scc);
                }
            }
        }

        sccs
    }

    // =========================================================================
    // Topological Ordering
    // =========================================================================

    /// Order `subset` so precedents come before dependents.
    ///
    /// Kahn's algorithm with in-degree counted only over edges inside the
    /// subset. Among ready cells the smallest `CellId` is emitted first, which
    /// gives (sheet, row, col) order for independent cells.
    ///
    /// Cells left over (because they sit on or behind a cycle inside the
    /// subset) are returned in the error.
    pub fn topo_order(&self, subset: &BTreeSet<CellId>) -> Result<Vec<CellId>, CycleDetected> {
        let mut in_degree: FxHashMap<CellId, usize> = FxHashMap::default();
        for &cell in subset {
            let count = self.precedents(cell).filter(|p| subset.contains(p)).count();
            in_degree.insert(cell, count);
        }

        let mut ready: BTreeSet<CellId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();

        let mut order = Vec::with_capacity(subset.len());
        while let Some(cell) = ready.pop_first() {
            order.push(cell);
            for dep in self.dependents(cell) {
                if let Some(deg) = in_degree.get_mut(&dep) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.insert(dep);
                    }
                }
            }
        }

        if order.len() < subset.len() {
            let emitted: FxHashSet<CellId> = order.iter().copied().collect();
            let stuck: Vec<CellId> = subset.iter().filter(|c| !emitted.contains(c)).copied().collect();
            return Err(CycleDetected::cycle(stuck));
        }

        Ok(order)
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (formula_cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "Empty preds set stored for {:?}", formula_cell);
            for pred in preds {
                assert!(
                    self.succs.get(pred).map_or(false, |s| s.contains(formula_cell)),
                    "Missing succ edge: {:?} should have {:?} in dependents",
                    pred,
                    formula_cell
                );
            }
        }

        for (cell, dependents) in &self.succs {
            assert!(!dependents.is_empty(), "Empty succs set stored for {:?}", cell);
            for dep in dependents {
                assert!(
                    self.preds.get(dep).map_or(false, |s| s.contains(cell)),
                    "Missing pred edge: {:?} should have {:?} in precedents",
                    dep,
                    cell
                );
            }
        }
    }
}

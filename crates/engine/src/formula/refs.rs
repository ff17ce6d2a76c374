//! Reference extraction and structural rewriting.
//!
//! Extraction turns a formula tree into the set of `CellId`s it reads, for
//! dependency graph construction. Rewriting moves references when rows or
//! columns are inserted or deleted.

use rustc_hash::FxHashSet;

use crate::cell_id::CellId;
use crate::sheet::SheetId;
use crate::structure::StructureOp;

use super::expr::{CellRef, Expr, RangeRef};

/// Extract all cell references from an expression.
///
/// Ranges are expanded to their individual cells. The result is deduplicated
/// and sorted, so edges are registered in a stable order.
pub fn extract_cell_ids(expr: &Expr, context_sheet: SheetId) -> Vec<CellId> {
    let mut refs = FxHashSet::default();
    collect_refs(expr, context_sheet, &mut refs);
    let mut refs: Vec<CellId> = refs.into_iter().collect();
    refs.sort_unstable();
    refs
}

fn collect_refs(expr: &Expr, context_sheet: SheetId, refs: &mut FxHashSet<CellId>) {
    match expr {
        Expr::Literal(_) | Expr::RefError => {}

        Expr::Ref(r) => {
            refs.insert(CellId::new(r.sheet.resolve(context_sheet), r.row, r.col));
        }

        Expr::Range(r) => {
            let sheet = r.sheet.resolve(context_sheet);
            for (row, col) in r.cells() {
                refs.insert(CellId::new(sheet, row, col));
            }
        }

        Expr::Unary { operand, .. } => collect_refs(operand, context_sheet, refs),

        Expr::Binary { lhs, rhs, .. } => {
            collect_refs(lhs, context_sheet, refs);
            collect_refs(rhs, context_sheet, refs);
        }

        Expr::Call { args, .. } => {
            for arg in args {
                collect_refs(arg, context_sheet, refs);
            }
        }
    }
}

/// Rewrite references after a structural edit on `target`.
///
/// `context_sheet` is the sheet holding the formula. References into the
/// shifted region move with it. A single reference into a deleted band, or a
/// range lying entirely inside it, becomes [`Expr::RefError`]. Ranges that
/// straddle a deleted band shrink.
///
/// Returns `None` when nothing in the tree changed.
pub fn adjust_refs(expr: &Expr, context_sheet: SheetId, target: SheetId, op: StructureOp) -> Option<Expr> {
    let adjusted = adjust(expr, context_sheet, target, op);
    if &adjusted == expr {
        None
    } else {
        Some(adjusted)
    }
}

fn adjust(expr: &Expr, context_sheet: SheetId, target: SheetId, op: StructureOp) -> Expr {
    match expr {
        Expr::Literal(_) | Expr::RefError => expr.clone(),

        Expr::Ref(r) => {
            if r.sheet.resolve(context_sheet) != target {
                return expr.clone();
            }
            adjust_cell_ref(r, op).map_or(Expr::RefError, Expr::Ref)
        }

        Expr::Range(r) => {
            if r.sheet.resolve(context_sheet) != target {
                return expr.clone();
            }
            adjust_range_ref(r, op).map_or(Expr::RefError, Expr::Range)
        }

        Expr::Unary { op: unary, operand } => Expr::Unary {
            op: *unary,
            operand: Box::new(adjust(operand, context_sheet, target, op)),
        },

        Expr::Binary { op: binary, lhs, rhs } => Expr::Binary {
            op: *binary,
            lhs: Box::new(adjust(lhs, context_sheet, target, op)),
            rhs: Box::new(adjust(rhs, context_sheet, target, op)),
        },

        Expr::Call { func, args } => Expr::Call {
            func: *func,
            args: args.iter().map(|a| adjust(a, context_sheet, target, op)).collect(),
        },
    }
}

fn adjust_cell_ref(r: &CellRef, op: StructureOp) -> Option<CellRef> {
    let mut out = *r;
    if op.is_row_op() {
        out.row = op.map_index(r.row)?;
    } else {
        out.col = op.map_index(r.col)?;
    }
    Some(out)
}

fn adjust_range_ref(r: &RangeRef, op: StructureOp) -> Option<RangeRef> {
    let mut out = *r;
    if op.is_row_op() {
        let (start, end) = op.map_span(r.start_row, r.end_row)?;
        out.start_row = start;
        out.end_row = end;
    } else {
        let (start, end) = op.map_span(r.start_col, r.end_col)?;
        out.start_col = start;
        out.end_col = end;
    }
    Some(out)
}

// Property-based tests for recalculation and per-sheet undo.
// CI: 128 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;

use cellgraph_config::Settings;
use cellgraph_engine::cell::{CellContent, Value};
use cellgraph_engine::command::Edit;
use cellgraph_engine::formula::expr::{Expr, Func};
use cellgraph_engine::sheet::SheetId;
use cellgraph_engine::workbook::Workbook;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_128() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const DIM: usize = 5;

/// One generated edit. Coordinates may fall outside the sheet after
/// structural edits; those edits are rejected and skipped.
#[derive(Debug, Clone)]
enum Step {
    Number { sheet: usize, row: usize, col: usize, n: i32 },
    Text { sheet: usize, row: usize, col: usize },
    /// cell = ref + k, where ref may sit on the other sheet
    RefPlus { sheet: usize, row: usize, col: usize, target_sheet: usize, tr: usize, tc: usize, k: i32 },
    /// cell = SUM(column range)
    Sum { sheet: usize, row: usize, col: usize, from: usize, to: usize, tc: usize },
    Clear { sheet: usize, row: usize, col: usize },
    ClearRange { sheet: usize, row: usize, col: usize },
    Paste { sheet: usize, row: usize, col: usize, a: i32, b: i32 },
    InsertRows { sheet: usize, at: usize, count: usize },
    DeleteRows { sheet: usize, at: usize, count: usize },
    InsertCols { sheet: usize, at: usize, count: usize },
    DeleteCols { sheet: usize, at: usize, count: usize },
}

fn arb_step() -> impl Strategy<Value = Step> {
    let sheet = 0usize..2;
    let pos = 0usize..DIM;
    prop_oneof![
        4 => (sheet.clone(), pos.clone(), pos.clone(), -20i32..20)
            .prop_map(|(sheet, row, col, n)| Step::Number { sheet, row, col, n }),
        1 => (sheet.clone(), pos.clone(), pos.clone())
            .prop_map(|(sheet, row, col)| Step::Text { sheet, row, col }),
        4 => (sheet.clone(), pos.clone(), pos.clone(), 0usize..2, pos.clone(), pos.clone(), -5i32..5)
            .prop_map(|(sheet, row, col, target_sheet, tr, tc, k)| Step::RefPlus {
                sheet, row, col, target_sheet, tr, tc, k,
            }),
        2 => (sheet.clone(), pos.clone(), pos.clone(), pos.clone(), pos.clone(), pos.clone())
            .prop_map(|(sheet, row, col, a, b, tc)| Step::Sum {
                sheet, row, col, from: a.min(b), to: a.max(b), tc,
            }),
        1 => (sheet.clone(), pos.clone(), pos.clone())
            .prop_map(|(sheet, row, col)| Step::Clear { sheet, row, col }),
        1 => (sheet.clone(), pos.clone(), pos.clone())
            .prop_map(|(sheet, row, col)| Step::ClearRange { sheet, row, col }),
        1 => (sheet.clone(), pos.clone(), pos.clone(), -9i32..9, -9i32..9)
            .prop_map(|(sheet, row, col, a, b)| Step::Paste { sheet, row, col, a, b }),
        1 => (sheet.clone(), 0usize..=DIM, 1usize..3)
            .prop_map(|(sheet, at, count)| Step::InsertRows { sheet, at, count }),
        1 => (sheet.clone(), pos.clone(), 1usize..3)
            .prop_map(|(sheet, at, count)| Step::DeleteRows { sheet, at, count }),
        1 => (sheet.clone(), 0usize..=DIM, 1usize..3)
            .prop_map(|(sheet, at, count)| Step::InsertCols { sheet, at, count }),
        1 => (sheet, pos, 1usize..3)
            .prop_map(|(sheet, at, count)| Step::DeleteCols { sheet, at, count }),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_book() -> (Workbook, [SheetId; 2]) {
    let settings = Settings { default_rows: DIM, default_cols: DIM, ..Settings::default() };
    let mut wb = Workbook::with_settings(&settings);
    let a = wb.create_sheet("Inputs").unwrap();
    let b = wb.create_sheet("Report").unwrap();
    (wb, [a, b])
}

fn to_edit(step: &Step, sheets: &[SheetId; 2]) -> (usize, Edit) {
    let set = |row, col, content| Edit::SetCell { row, col, content };
    match *step {
        Step::Number { sheet, row, col, n } => (sheet, set(row, col, CellContent::number(n as f64))),
        Step::Text { sheet, row, col } => (sheet, set(row, col, CellContent::text("x"))),
        Step::RefPlus { sheet, row, col, target_sheet, tr, tc, k } => {
            let target = if target_sheet == sheet {
                Expr::cell(tr, tc)
            } else {
                Expr::cell_on(sheets[target_sheet], tr, tc)
            };
            (sheet, set(row, col, CellContent::Formula(Expr::add(target, Expr::num(k as f64)))))
        }
        Step::Sum { sheet, row, col, from, to, tc } => {
            let sum = Expr::call(Func::Sum, vec![Expr::range(from, tc, to, tc)]);
            (sheet, set(row, col, CellContent::Formula(sum)))
        }
        Step::Clear { sheet, row, col } => (sheet, Edit::ClearCell { row, col }),
        Step::ClearRange { sheet, row, col } => (
            sheet,
            Edit::ClearRange { start_row: row, start_col: col, end_row: row + 1, end_col: col + 1 },
        ),
        Step::Paste { sheet, row, col, a, b } => (
            sheet,
            Edit::Paste {
                row,
                col,
                block: vec![vec![CellContent::number(a as f64), CellContent::number(b as f64)]],
            },
        ),
        Step::InsertRows { sheet, at, count } => (sheet, Edit::InsertRows { at, count }),
        Step::DeleteRows { sheet, at, count } => (sheet, Edit::DeleteRows { at, count }),
        Step::InsertCols { sheet, at, count } => (sheet, Edit::InsertCols { at, count }),
        Step::DeleteCols { sheet, at, count } => (sheet, Edit::DeleteCols { at, count }),
    }
}

/// Run every step, returning the sheet index of each accepted edit in order.
fn run(wb: &mut Workbook, sheets: &[SheetId; 2], steps: &[Step]) -> Vec<usize> {
    let mut accepted = Vec::new();
    for step in steps {
        let (sheet, edit) = to_edit(step, sheets);
        if wb.execute(sheets[sheet], edit).is_ok() {
            accepted.push(sheet);
        }
    }
    accepted
}

type SheetState = (usize, usize, Vec<(usize, usize, CellContent, Value)>);

/// Dimensions plus every cell with visible content or value, row-major.
/// Cells that exist but are empty are left out.
fn snapshot(wb: &Workbook) -> Vec<SheetState> {
    wb.sheets()
        .iter()
        .map(|sheet| {
            let mut cells: Vec<_> = sheet
                .cells_iter()
                .filter(|(_, cell)| !cell.content.is_empty() || !cell.cached.is_empty())
                .map(|(&(r, c), cell)| (r, c, cell.content.clone(), cell.cached.clone()))
                .collect();
            cells.sort_by_key(|(r, c, _, _)| (*r, *c));
            (sheet.rows, sheet.cols, cells)
        })
        .collect()
}

/// The incrementally maintained graph has the same edges as one rebuilt
/// from cell contents.
fn assert_graph_matches_rebuild(wb: &Workbook) {
    let mut rebuilt = wb.clone();
    rebuilt.rebuild_dep_graph();
    assert_eq!(wb.dep_graph().formula_cell_count(), rebuilt.dep_graph().formula_cell_count());

    let mut formulas: Vec<_> = rebuilt.dep_graph().formula_cells().collect();
    formulas.sort_unstable();
    for cell in formulas {
        assert_eq!(wb.precedents_of(cell), rebuilt.precedents_of(cell), "precedents of {}", cell);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_128())]

    /// After any edit sequence a full pass changes nothing, so incremental
    /// results equal a from-scratch evaluation.
    #[test]
    fn prop_incremental_matches_full(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let (mut wb, sheets) = new_book();
        run(&mut wb, &sheets, &steps);

        prop_assert!(!wb.has_dirty_cells());
        let report = wb.recalculate_all();
        prop_assert!(report.changed.is_empty(), "full pass changed {:?}", report.changed);

        // And a second full pass is a fixed point too
        let again = wb.recalculate_all();
        prop_assert!(again.changed.is_empty());
    }

    #[test]
    fn prop_graph_tracks_contents(steps in proptest::collection::vec(arb_step(), 1..40)) {
        let (mut wb, sheets) = new_book();
        run(&mut wb, &sheets, &steps);
        assert_graph_matches_rebuild(&wb);
    }

    /// Undoing every accepted edit in reverse order restores the empty
    /// workbook; redoing them in order restores the final state.
    #[test]
    fn prop_undo_redo_round_trip(steps in proptest::collection::vec(arb_step(), 1..30)) {
        let (mut wb, sheets) = new_book();
        let initial = snapshot(&wb);
        let accepted = run(&mut wb, &sheets, &steps);
        let after = snapshot(&wb);

        for &sheet in accepted.iter().rev() {
            wb.undo(sheets[sheet]).unwrap();
        }
        prop_assert_eq!(snapshot(&wb), initial);
        prop_assert!(!wb.can_undo(sheets[0]) && !wb.can_undo(sheets[1]));
        assert_graph_matches_rebuild(&wb);

        for &sheet in &accepted {
            wb.redo(sheets[sheet]).unwrap();
        }
        prop_assert_eq!(snapshot(&wb), after);
        prop_assert!(!wb.has_dirty_cells());
        assert_graph_matches_rebuild(&wb);
    }

    /// A rejected edit leaves both the model and the stacks untouched.
    #[test]
    fn prop_rejected_edit_is_atomic(
        steps in proptest::collection::vec(arb_step(), 0..20),
        // Past anything 20 inserts can grow the sheet to
        row in DIM * 20..DIM * 40,
    ) {
        let (mut wb, sheets) = new_book();
        run(&mut wb, &sheets, &steps);
        let before = snapshot(&wb);
        let depth = wb.undo_depth(sheets[0]);

        let block = vec![vec![CellContent::number(1.0)], vec![CellContent::number(2.0)]];
        let paste = Edit::Paste { row, col: 0, block };
        prop_assert!(wb.execute(sheets[0], paste).is_err());
        prop_assert_eq!(snapshot(&wb), before);
        prop_assert_eq!(wb.undo_depth(sheets[0]), depth);
    }
}

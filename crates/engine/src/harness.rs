//! Test harness for workbook operations addressed in A1 notation.
//!
//! `TestBook` wraps a `Workbook` with named sheets and lets tests write
//! `book.set("B1", ...)` instead of spelling out sheet ids and 0-based
//! coordinates. Every write goes through `Workbook::execute`, so it is
//! recorded and recalculated exactly like a real edit.

use crate::cell::{CellContent, Value};
use crate::cell_id::{parse_a1, CellId};
use crate::command::Edit;
use crate::formula::expr::Expr;
use crate::recalc::RecalcReport;
use crate::sheet::SheetId;
use crate::workbook::Workbook;

/// Parse an A1 address, panicking on typos in test code.
pub fn addr(a1: &str) -> (usize, usize) {
    parse_a1(a1).unwrap_or_else(|| panic!("bad address in test: {}", a1))
}

/// Same-sheet reference expression from an A1 address.
pub fn r(a1: &str) -> Expr {
    let (row, col) = addr(a1);
    Expr::cell(row, col)
}

/// Same-sheet range expression from two A1 corners.
pub fn range(from: &str, to: &str) -> Expr {
    let (r1, c1) = addr(from);
    let (r2, c2) = addr(to);
    Expr::range(r1, c1, r2, c2)
}

/// Cross-sheet reference expression.
pub fn r_on(sheet: SheetId, a1: &str) -> Expr {
    let (row, col) = addr(a1);
    Expr::cell_on(sheet, row, col)
}

pub struct TestBook {
    pub wb: Workbook,
    pub sheets: Vec<SheetId>,
}

impl TestBook {
    /// One sheet named "Sheet1".
    pub fn new() -> Self {
        Self::with_sheets(&["Sheet1"])
    }

    pub fn with_sheets(names: &[&str]) -> Self {
        let mut wb = Workbook::new();
        let sheets = names
            .iter()
            .map(|name| wb.create_sheet(name).expect("create sheet"))
            .collect();
        Self { wb, sheets }
    }

    /// Id of the n-th sheet created by the harness.
    pub fn sheet(&self, n: usize) -> SheetId {
        self.sheets[n]
    }

    pub fn id(&self, a1: &str) -> CellId {
        self.id_on(0, a1)
    }

    pub fn id_on(&self, sheet: usize, a1: &str) -> CellId {
        let (row, col) = addr(a1);
        CellId::new(self.sheets[sheet], row, col)
    }

    /// Write to the first sheet.
    pub fn set(&mut self, a1: &str, content: impl Into<CellContent>) -> RecalcReport {
        self.set_on(0, a1, content)
    }

    pub fn set_on(&mut self, sheet: usize, a1: &str, content: impl Into<CellContent>) -> RecalcReport {
        let (row, col) = addr(a1);
        self.wb
            .execute(self.sheets[sheet], Edit::SetCell { row, col, content: content.into() })
            .expect("set cell")
    }

    pub fn edit(&mut self, sheet: usize, edit: Edit) -> RecalcReport {
        self.wb.execute(self.sheets[sheet], edit).expect("execute edit")
    }

    pub fn undo(&mut self, sheet: usize) -> RecalcReport {
        self.wb.undo(self.sheets[sheet]).expect("undo")
    }

    pub fn redo(&mut self, sheet: usize) -> RecalcReport {
        self.wb.redo(self.sheets[sheet]).expect("redo")
    }

    pub fn value(&self, a1: &str) -> Value {
        self.value_on(0, a1)
    }

    pub fn value_on(&self, sheet: usize, a1: &str) -> Value {
        let (row, col) = addr(a1);
        self.wb.value(self.sheets[sheet], row, col).clone()
    }

    pub fn content(&self, a1: &str) -> CellContent {
        self.content_on(0, a1)
    }

    pub fn content_on(&self, sheet: usize, a1: &str) -> CellContent {
        let (row, col) = addr(a1);
        self.wb.content(self.sheets[sheet], row, col).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_addresses() {
        assert_eq!(addr("A1"), (0, 0));
        assert_eq!(addr("C10"), (9, 2));

        let book = TestBook::with_sheets(&["Data", "Report"]);
        assert_eq!(book.id_on(1, "B2"), CellId::new(book.sheet(1), 1, 1));
    }

    #[test]
    fn test_harness_set_and_read() {
        let mut book = TestBook::new();
        book.set("A1", Value::Number(2.0));
        book.set("B1", Expr::mul(r("A1"), Expr::num(3.0)));
        assert_eq!(book.value("B1"), Value::Number(6.0));
        assert_eq!(book.content("A1"), CellContent::number(2.0));
    }
}

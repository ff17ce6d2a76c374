//! User templates.
//!
//! A template never touches workbook state directly. It reads a sheet
//! through a shared reference and returns the writes it wants. The workbook
//! then applies them as one batch command:
//!
//! - single recalc pass after all writes
//! - single undo entry per template run
//! - the same input on the same sheet always yields the same writes

use crate::command::{CellWrite, Edit};
use crate::error::Result;
use crate::recalc::RecalcReport;
use crate::sheet::{Sheet, SheetId};
use crate::workbook::Workbook;

pub trait Template {
    type Input;

    /// Shown as the undo label.
    fn name(&self) -> &str;

    /// Writes to perform on `sheet`, in order. Later writes to the same cell
    /// win.
    fn render(&self, sheet: &Sheet, input: &Self::Input) -> Vec<CellWrite>;
}

impl Workbook {
    /// Render `template` against a sheet and execute the result as one
    /// undoable batch.
    pub fn apply_template<T: Template>(
        &mut self,
        sheet_id: SheetId,
        template: &T,
        input: &T::Input,
    ) -> Result<RecalcReport> {
        let idx = self.sheet_index(sheet_id)?;
        let writes = template.render(&self.sheets[idx], input);
        log::debug!("template '{}' produced {} writes", template.name(), writes.len());

        self.execute(
            sheet_id,
            Edit::Batch { label: format!("Template: {}", template.name()), writes },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellContent, Value};
    use crate::error::EngineError;
    use crate::formula::expr::{Expr, Func};
    use crate::harness::{r, range, TestBook};

    /// Writes a column of numbers under a header and a SUM below them.
    struct Ledger;

    impl Template for Ledger {
        type Input = Vec<f64>;

        fn name(&self) -> &str {
            "Ledger"
        }

        fn render(&self, sheet: &Sheet, input: &Vec<f64>) -> Vec<CellWrite> {
            // Start below whatever already sits in column A
            let start = (0..sheet.rows)
                .take_while(|&row| !sheet.content(row, 0).is_empty())
                .count();

            let mut writes: Vec<CellWrite> = input
                .iter()
                .enumerate()
                .map(|(i, n)| CellWrite::new(start + i, 0, Value::Number(*n)))
                .collect();
            let total_row = start + input.len();
            writes.push(CellWrite::new(
                total_row,
                0,
                Expr::call(Func::Sum, vec![Expr::range(0, 0, total_row.saturating_sub(1), 0)]),
            ));
            writes
        }
    }

    #[test]
    fn test_template_is_one_undo_entry() {
        let mut book = TestBook::new();
        book.set("A1", Value::Number(10.0));
        let s = book.sheet(0);

        let report = book.wb.apply_template(s, &Ledger, &vec![1.0, 2.0]).unwrap();
        assert_eq!(book.value("A2"), Value::Number(1.0));
        assert_eq!(book.value("A3"), Value::Number(2.0));
        assert_eq!(book.content("A4"), CellContent::Formula(Expr::call(Func::Sum, vec![range("A1", "A3")])));
        assert_eq!(book.value("A4"), Value::Number(13.0));
        assert_eq!(report.dirty.len(), 3);
        assert_eq!(
            book.wb.sheet_by_id(s).unwrap().history().undo_label().as_deref(),
            Some("Template: Ledger")
        );

        book.undo(0);
        assert_eq!(book.content("A2"), CellContent::Empty);
        assert_eq!(book.content("A4"), CellContent::Empty);
        assert_eq!(book.value("A1"), Value::Number(10.0));
    }

    #[test]
    fn test_template_reads_current_sheet() {
        let mut book = TestBook::new();
        book.set("B1", Expr::mul(r("A1"), Expr::num(2.0)));
        let s = book.sheet(0);

        // Column A is empty, so the ledger starts at A1 and B1 picks it up
        book.wb.apply_template(s, &Ledger, &vec![4.0]).unwrap();
        assert_eq!(book.value("B1"), Value::Number(8.0));
    }

    #[test]
    fn test_template_out_of_bounds_is_atomic() {
        let mut book = TestBook::new();
        let s = book.sheet(0);
        let rows = book.wb.sheet_by_id(s).unwrap().rows;
        let input: Vec<f64> = (0..rows).map(|i| i as f64).collect();

        // The SUM lands one row past the end
        let err = book.wb.apply_template(s, &Ledger, &input).unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { .. }));
        assert_eq!(book.wb.sheet_by_id(s).unwrap().cell_count(), 0);
        assert!(!book.wb.can_undo(s));
    }
}

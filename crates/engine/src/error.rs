//! Contract violations reported to callers.
//!
//! Value-level problems (type mismatch, division by zero, broken references,
//! cycles) never show up here: they are stored as [`CellError`] values in the
//! cells themselves. `EngineError` is reserved for misuse of the API and for
//! the empty-history signals of undo/redo. Every operation that returns one
//! leaves the workbook exactly as it was.
//!
//! [`CellError`]: crate::cell::CellError

use thiserror::Error;

use crate::sheet::{SheetId, MAX_COLS, MAX_ROWS};

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("sheet {0} does not exist")]
    SheetNotFound(SheetId),

    #[error("no sheet named '{0}'")]
    SheetNameNotFound(String),

    #[error("sheet name '{0}' is already in use")]
    DuplicateSheetName(String),

    #[error("invalid sheet name '{0}'")]
    InvalidSheetName(String),

    #[error("cell ({row}, {col}) is outside the sheet bounds ({rows} x {cols})")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("invalid structural edit: {0}")]
    InvalidStructure(String),

    #[error("{func} expects {expected} argument(s), got {got}")]
    Arity {
        func: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("reference {0} is outside the {} x {} grid", MAX_ROWS, MAX_COLS)]
    InvalidReference(String),

    #[error("nothing to undo on sheet {0}")]
    NothingToUndo(SheetId),

    #[error("nothing to redo on sheet {0}")]
    NothingToRedo(SheetId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EngineError::OutOfBounds { row: 5, col: 2, rows: 3, cols: 3 };
        assert_eq!(err.to_string(), "cell (5, 2) is outside the sheet bounds (3 x 3)");

        let err = EngineError::Arity { func: "ROUND", expected: 2, got: 1 };
        assert_eq!(err.to_string(), "ROUND expects 2 argument(s), got 1");

        let err = EngineError::NothingToUndo(SheetId::from_raw(3));
        assert_eq!(err.to_string(), "nothing to undo on sheet 3");
    }
}

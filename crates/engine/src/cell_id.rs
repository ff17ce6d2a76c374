//! Cell identity for the dependency graph.
//!
//! A `CellId` uniquely identifies a cell across all sheets in a workbook.
//! The derived ordering (sheet, row, col) is the tie-break used everywhere the
//! engine needs a deterministic order.

use serde::{Deserialize, Serialize};

use crate::sheet::SheetId;

/// Unique identifier for a cell in a workbook.
///
/// Combines sheet identity with row/column coordinates.
/// Used as graph nodes in the dependency graph and as history keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    /// The sheet this cell belongs to (stable, never reused after deletion)
    pub sheet: SheetId,
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl CellId {
    #[inline]
    pub fn new(sheet: SheetId, row: usize, col: usize) -> Self {
        Self { sheet, row, col }
    }

    /// Same sheet, different coordinates.
    #[inline]
    pub fn at(self, row: usize, col: usize) -> Self {
        Self { row, col, ..self }
    }

    /// A1-style address without the sheet prefix.
    pub fn a1(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row + 1)
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sheet{}!{}", self.sheet.raw(), self.a1())
    }
}

/// Convert 0-based column index to Excel-style letter(s).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Parse an A1-style address ("B3", "aa10") into 0-based (row, col).
///
/// Only plain addresses are accepted: no sheet prefix, no `$` markers.
pub fn parse_a1(addr: &str) -> Option<(usize, usize)> {
    let addr = addr.trim();
    let split = addr.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = addr.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col: usize = 0;
    for c in letters.chars() {
        let v = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        col = col.checked_mul(26)?.checked_add(v)?;
    }

    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

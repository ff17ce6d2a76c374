//! Formula operation tree.
//!
//! Formulas are handed to the engine already parsed. Leaves are literals,
//! single-cell references and range references; internal nodes are unary or
//! binary operators and functions with a fixed arity.

use serde::{Deserialize, Serialize};

use crate::cell::Value;
use crate::cell_id::col_to_letters;
use crate::error::{EngineError, Result};
use crate::sheet::{SheetId, MAX_COLS, MAX_ROWS};

/// Which sheet a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SheetRef {
    /// The sheet containing the formula
    Current,
    /// Any sheet, by stable ID (cross-sheet reference)
    Id(SheetId),
}

impl SheetRef {
    /// Resolve against the sheet the formula lives on.
    #[inline]
    pub fn resolve(self, context: SheetId) -> SheetId {
        match self {
            SheetRef::Current => context,
            SheetRef::Id(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: SheetRef,
    pub row: usize,
    pub col: usize,
}

/// Rectangular range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeRef {
    pub sheet: SheetRef,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl RangeRef {
    pub fn cell_count(&self) -> usize {
        let rows = self.end_row.saturating_sub(self.start_row).saturating_add(1);
        let cols = self.end_col.saturating_sub(self.start_col).saturating_add(1);
        rows.saturating_mul(cols)
    }

    /// Row-major iteration over (row, col), clipped to the addressable grid.
    ///
    /// No sheet reaches past the grid, so a clipped range still runs into the
    /// sheet edge first and reads as `#REF!`.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let end_row = self.end_row.min(MAX_ROWS - 1);
        let end_col = self.end_col.min(MAX_COLS - 1);
        (self.start_row..=end_row).flat_map(move |r| (self.start_col..=end_col).map(move |c| (r, c)))
    }
}

/// Largest number of cells a single range may cover: one full column.
pub const MAX_RANGE_CELLS: usize = MAX_ROWS;

fn a1(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letters(col), row.saturating_add(1))
}

fn in_grid(row: usize, col: usize) -> bool {
    row < MAX_ROWS && col < MAX_COLS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    // String
    Concat,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
        }
    }
}

/// Built-in functions. Every function has a fixed arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Func {
    Sum,
    Average,
    Min,
    Max,
    Count,
    Abs,
    Round,
    If,
    And,
    Or,
    Not,
}

impl Func {
    pub fn name(&self) -> &'static str {
        match self {
            Func::Sum => "SUM",
            Func::Average => "AVERAGE",
            Func::Min => "MIN",
            Func::Max => "MAX",
            Func::Count => "COUNT",
            Func::Abs => "ABS",
            Func::Round => "ROUND",
            Func::If => "IF",
            Func::And => "AND",
            Func::Or => "OR",
            Func::Not => "NOT",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Func::Sum | Func::Average | Func::Min | Func::Max | Func::Count => 1,
            Func::Abs | Func::Not => 1,
            Func::Round | Func::And | Func::Or => 2,
            Func::If => 3,
        }
    }

    /// Aggregates accept a range argument.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Func::Sum | Func::Average | Func::Min | Func::Max | Func::Count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Ref(CellRef),
    Range(RangeRef),
    /// A reference whose target was deleted by a structural edit
    RefError,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn num(n: f64) -> Self {
        Expr::Literal(Value::Number(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::Literal(Value::Text(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Expr::Literal(Value::Boolean(b))
    }

    /// Reference to a cell on the formula's own sheet.
    pub fn cell(row: usize, col: usize) -> Self {
        Expr::Ref(CellRef { sheet: SheetRef::Current, row, col })
    }

    /// Reference to a cell on another sheet.
    pub fn cell_on(sheet: SheetId, row: usize, col: usize) -> Self {
        Expr::Ref(CellRef { sheet: SheetRef::Id(sheet), row, col })
    }

    pub fn range(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Expr::Range(RangeRef { sheet: SheetRef::Current, start_row, start_col, end_row, end_col })
    }

    pub fn range_on(
        sheet: SheetId,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    ) -> Self {
        Expr::Range(RangeRef { sheet: SheetRef::Id(sheet), start_row, start_col, end_row, end_col })
    }

    pub fn neg(operand: Expr) -> Self {
        Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Div, lhs, rhs)
    }

    pub fn call(func: Func, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    /// Check the shape of the tree: function arity, range orientation, and
    /// reference coordinates inside the [`MAX_ROWS`] x [`MAX_COLS`] grid.
    ///
    /// A malformed tree is a caller bug, so it is rejected before any edit
    /// touches the workbook. References past the target sheet's current edge
    /// but inside the grid are fine; they evaluate to `#REF!`.
    pub fn validate(&self) -> Result<()> {
        match self {
            Expr::Literal(_) | Expr::RefError => Ok(()),
            Expr::Ref(r) => {
                if !in_grid(r.row, r.col) {
                    return Err(EngineError::InvalidReference(a1(r.row, r.col)));
                }
                Ok(())
            }
            Expr::Range(r) => {
                let text = || format!("{}:{}", a1(r.start_row, r.start_col), a1(r.end_row, r.end_col));
                if r.start_row > r.end_row || r.start_col > r.end_col {
                    return Err(EngineError::InvalidRange(text()));
                }
                if !in_grid(r.end_row, r.end_col) {
                    return Err(EngineError::InvalidReference(text()));
                }
                if r.cell_count() > MAX_RANGE_CELLS {
                    return Err(EngineError::InvalidRange(format!(
                        "{} covers more than {} cells",
                        text(),
                        MAX_RANGE_CELLS
                    )));
                }
                Ok(())
            }
            Expr::Unary { operand, .. } => operand.validate(),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.validate()?;
                rhs.validate()
            }
            Expr::Call { func, args } => {
                if args.len() != func.arity() {
                    return Err(EngineError::Arity {
                        func: func.name(),
                        expected: func.arity(),
                        got: args.len(),
                    });
                }
                args.iter().try_for_each(Expr::validate)
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn sheet_prefix(sheet: &SheetRef) -> String {
            match sheet {
                SheetRef::Current => String::new(),
                SheetRef::Id(id) => format!("Sheet{}!", id.raw()),
            }
        }

        match self {
            Expr::Literal(Value::Text(s)) => write!(f, "\"{}\"", s),
            Expr::Literal(v) => write!(f, "{}", v.display()),
            Expr::Ref(r) => write!(f, "{}{}", sheet_prefix(&r.sheet), a1(r.row, r.col)),
            Expr::Range(r) => write!(
                f,
                "{}{}:{}",
                sheet_prefix(&r.sheet),
                a1(r.start_row, r.start_col),
                a1(r.end_row, r.end_col)
            ),
            Expr::RefError => f.write_str("#REF!"),
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{}", operand),
            Expr::Binary { op, lhs, rhs } => write!(f, "({}{}{})", lhs, op.symbol(), rhs),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

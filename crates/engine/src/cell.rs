use serde::{Deserialize, Serialize};

use crate::formula::expr::Expr;

/// Value-level error stored in a cell.
///
/// These are terminal values, not failures: they propagate through every
/// formula that reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    /// An operand had the wrong type (e.g. text where a number is required)
    TypeMismatch,
    DivisionByZero,
    /// Reference to a cell or sheet that no longer exists
    Reference,
    /// The cell sits on a dependency cycle (or reads from one)
    Circular,
    /// Result is not a finite number
    Numeric,
}

impl CellError {
    pub fn code(&self) -> &'static str {
        match self {
            CellError::TypeMismatch => "#VALUE!",
            CellError::DivisionByZero => "#DIV/0!",
            CellError::Reference => "#REF!",
            CellError::Circular => "#CYCLE!",
            CellError::Numeric => "#NUM!",
        }
    }
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A computed (or literal) cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_error(&self) -> Option<CellError> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Text shown for this value (no number formatting).
    pub fn display(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Value::Error(e) => e.code().to_string(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// What the user (or an import adapter) put into a cell.
///
/// Formulas arrive already parsed into an [`Expr`] tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellContent {
    #[default]
    Empty,
    Literal(Value),
    Formula(Expr),
}

impl CellContent {
    pub fn number(n: f64) -> Self {
        CellContent::Literal(Value::Number(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        CellContent::Literal(Value::Text(s.into()))
    }

    pub fn formula(expr: Expr) -> Self {
        CellContent::Formula(expr)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellContent::Formula(_))
    }

    pub fn formula_expr(&self) -> Option<&Expr> {
        match self {
            CellContent::Formula(expr) => Some(expr),
            _ => None,
        }
    }
}

impl From<Value> for CellContent {
    fn from(value: Value) -> Self {
        match value {
            Value::Empty => CellContent::Empty,
            other => CellContent::Literal(other),
        }
    }
}

impl From<Expr> for CellContent {
    fn from(expr: Expr) -> Self {
        CellContent::Formula(expr)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub content: CellContent,
    /// Last computed result. Only the recalc pass writes this.
    #[serde(default)]
    pub cached: Value,
    /// Set while the cell is waiting in a recalc pass. Always false once a
    /// mutating call has returned.
    #[serde(skip)]
    pub dirty: bool,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: CellContent) -> Self {
        Self { content, cached: Value::Empty, dirty: false }
    }
}

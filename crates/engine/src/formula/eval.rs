// Formula evaluator - evaluates operation trees against cached cell values

use std::cmp::Ordering;

use crate::cell::{CellError, Value};
use crate::cell_id::CellId;
use crate::sheet::SheetId;

use super::expr::{BinaryOp, Expr, Func, RangeRef, UnaryOp};

/// Read access to cached values while a formula is evaluated.
pub trait CellLookup {
    /// Cached value of a cell. `None` when the sheet does not exist or the
    /// coordinates are outside its bounds.
    fn value_at(&self, cell: CellId) -> Option<&Value>;
}

/// Evaluate `expr` as the formula of a cell on `context_sheet`.
///
/// Never fails: every problem becomes a [`Value::Error`]. The evaluator only
/// reads through `lookup`, so the only state an evaluation affects is the
/// value it returns.
pub fn evaluate<L: CellLookup + ?Sized>(expr: &Expr, context_sheet: SheetId, lookup: &L) -> Value {
    Evaluator { context_sheet, lookup }.eval(expr)
}

struct Evaluator<'a, L: ?Sized> {
    context_sheet: SheetId,
    lookup: &'a L,
}

impl<'a, L: CellLookup + ?Sized> Evaluator<'a, L> {
    fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(v) => v.clone(),
            Expr::RefError => Value::Error(CellError::Reference),
            Expr::Ref(r) => {
                let cell = CellId::new(r.sheet.resolve(self.context_sheet), r.row, r.col);
                self.read(cell)
            }
            // A bare range outside an aggregate has no scalar value
            Expr::Range(_) => Value::Error(CellError::TypeMismatch),
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                let v = self.eval(operand);
                match to_number(&v) {
                    Ok(n) => Value::Number(-n),
                    Err(e) => Value::Error(e),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                if let Some(e) = first_error(&[&l, &r]) {
                    return Value::Error(e);
                }
                binary(*op, &l, &r)
            }
            Expr::Call { func, args } => self.call(*func, args),
        }
    }

    fn read(&self, cell: CellId) -> Value {
        match self.lookup.value_at(cell) {
            Some(v) => v.clone(),
            None => Value::Error(CellError::Reference),
        }
    }

    fn call(&self, func: Func, args: &[Expr]) -> Value {
        // Arity is checked when the formula is entered; a malformed tree that
        // slips through still must not panic.
        if args.len() != func.arity() {
            return Value::Error(CellError::TypeMismatch);
        }

        if func.is_aggregate() {
            return self.aggregate(func, &args[0]);
        }

        match func {
            // Both branches are evaluated: an error anywhere in the call is
            // the result, whichever branch the condition picks.
            Func::If => {
                let cond = self.eval(&args[0]);
                let then = self.eval(&args[1]);
                let otherwise = self.eval(&args[2]);
                if let Some(e) = first_error(&[&cond, &then, &otherwise]) {
                    return Value::Error(e);
                }
                match to_bool(&cond) {
                    Ok(true) => then,
                    Ok(false) => otherwise,
                    Err(e) => Value::Error(e),
                }
            }
            Func::And | Func::Or => {
                let a = self.eval(&args[0]);
                let b = self.eval(&args[1]);
                if let Some(e) = first_error(&[&a, &b]) {
                    return Value::Error(e);
                }
                match (to_bool(&a), to_bool(&b)) {
                    (Ok(a), Ok(b)) => Value::Boolean(if func == Func::And { a && b } else { a || b }),
                    (Err(e), _) | (_, Err(e)) => Value::Error(e),
                }
            }
            Func::Not => match to_bool(&self.eval(&args[0])) {
                Ok(b) => Value::Boolean(!b),
                Err(e) => Value::Error(e),
            },
            Func::Abs => match to_number(&self.eval(&args[0])) {
                Ok(n) => Value::Number(n.abs()),
                Err(e) => Value::Error(e),
            },
            Func::Round => {
                let x = self.eval(&args[0]);
                let digits = self.eval(&args[1]);
                if let Some(e) = first_error(&[&x, &digits]) {
                    return Value::Error(e);
                }
                match (to_number(&x), to_number(&digits)) {
                    (Ok(x), Ok(d)) => finite(round_half_away(x, d.trunc() as i32)),
                    (Err(e), _) | (_, Err(e)) => Value::Error(e),
                }
            }
            // Aggregates handled above
            Func::Sum | Func::Average | Func::Min | Func::Max | Func::Count => {
                Value::Error(CellError::TypeMismatch)
            }
        }
    }

    /// Aggregates take a range or a scalar. Non-numeric values are skipped;
    /// the first error in row-major order wins.
    fn aggregate(&self, func: Func, arg: &Expr) -> Value {
        let numbers = match arg {
            Expr::Range(r) => self.range_numbers(r),
            other => {
                let v = self.eval(other);
                match v {
                    Value::Error(e) => Err(e),
                    Value::Number(n) => Ok(vec![n]),
                    _ => Ok(Vec::new()),
                }
            }
        };

        let numbers = match numbers {
            Ok(numbers) => numbers,
            Err(e) => return Value::Error(e),
        };

        match func {
            Func::Sum => finite(numbers.iter().sum()),
            Func::Count => Value::Number(numbers.len() as f64),
            Func::Average => {
                if numbers.is_empty() {
                    Value::Error(CellError::DivisionByZero)
                } else {
                    finite(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Func::Min => Value::Number(numbers.iter().copied().fold(None, |acc: Option<f64>, n| {
                Some(acc.map_or(n, |a| a.min(n)))
            }).unwrap_or(0.0)),
            Func::Max => Value::Number(numbers.iter().copied().fold(None, |acc: Option<f64>, n| {
                Some(acc.map_or(n, |a| a.max(n)))
            }).unwrap_or(0.0)),
            _ => Value::Error(CellError::TypeMismatch),
        }
    }

    fn range_numbers(&self, r: &RangeRef) -> Result<Vec<f64>, CellError> {
        let sheet = r.sheet.resolve(self.context_sheet);
        let mut numbers = Vec::new();
        for (row, col) in r.cells() {
            match self.lookup.value_at(CellId::new(sheet, row, col)) {
                None => return Err(CellError::Reference),
                Some(Value::Error(e)) => return Err(*e),
                Some(Value::Number(n)) => numbers.push(*n),
                Some(_) => {}
            }
        }
        Ok(numbers)
    }
}

/// First error among operands, scanning left to right.
fn first_error(operands: &[&Value]) -> Option<CellError> {
    operands.iter().find_map(|v| v.as_error())
}

/// Numeric coercion for arithmetic. Booleans count as 1/0; text and empty
/// cells are a type mismatch.
fn to_number(v: &Value) -> Result<f64, CellError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Error(e) => Err(*e),
        Value::Text(_) | Value::Empty => Err(CellError::TypeMismatch),
    }
}

fn to_bool(v: &Value) -> Result<bool, CellError> {
    match v {
        Value::Boolean(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Empty => Ok(false),
        Value::Error(e) => Err(*e),
        Value::Text(_) => Err(CellError::TypeMismatch),
    }
}

fn to_text(v: &Value) -> String {
    v.display()
}

fn finite(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Error(CellError::Numeric)
    }
}

fn round_half_away(x: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits.saturating_abs());
    // Past f64 precision there is nothing left to round
    if !factor.is_finite() {
        return if digits >= 0 { x } else { 0.0 };
    }
    if digits >= 0 {
        let scaled = x * factor;
        if !scaled.is_finite() {
            return x;
        }
        scaled.round() / factor
    } else {
        (x / factor).round() * factor
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            let (a, b) = match (to_number(l), to_number(r)) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return Value::Error(e),
            };
            match op {
                BinaryOp::Add => finite(a + b),
                BinaryOp::Sub => finite(a - b),
                BinaryOp::Mul => finite(a * b),
                BinaryOp::Div => {
                    if b == 0.0 {
                        Value::Error(CellError::DivisionByZero)
                    } else {
                        finite(a / b)
                    }
                }
                _ => finite(a.powf(b)),
            }
        }
        BinaryOp::Concat => Value::Text(format!("{}{}", to_text(l), to_text(r))),
        BinaryOp::Eq => Value::Boolean(compare(l, r) == Ordering::Equal),
        BinaryOp::NotEq => Value::Boolean(compare(l, r) != Ordering::Equal),
        BinaryOp::Lt => Value::Boolean(compare(l, r) == Ordering::Less),
        BinaryOp::LtEq => Value::Boolean(compare(l, r) != Ordering::Greater),
        BinaryOp::Gt => Value::Boolean(compare(l, r) == Ordering::Greater),
        BinaryOp::GtEq => Value::Boolean(compare(l, r) != Ordering::Less),
    }
}

/// Compare two non-error values.
///
/// An empty operand takes the zero value of the other side's type. Mixed
/// types order as Number < Text < Boolean; text compares case-insensitively.
fn compare(l: &Value, r: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) | Value::Empty => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
            Value::Error(_) => 3,
        }
    }

    match (l, r) {
        (Value::Empty, Value::Text(s)) => "".cmp(s.as_str()),
        (Value::Text(s), Value::Empty) => s.as_str().cmp(""),
        (Value::Empty, Value::Boolean(b)) => false.cmp(b),
        (Value::Boolean(b), Value::Empty) => b.cmp(&false),
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Empty, Value::Number(n)) => 0.0f64.partial_cmp(n).unwrap_or(Ordering::Equal),
        (Value::Number(n), Value::Empty) => n.partial_cmp(&0.0).unwrap_or(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        _ => rank(l).cmp(&rank(r)),
    }
}

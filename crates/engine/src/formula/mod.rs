// Formula trees, evaluation and reference handling

pub mod expr;
pub mod eval;
pub mod refs;

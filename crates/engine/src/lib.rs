pub mod cell;
pub mod cell_id;
pub mod command;
pub mod dep_graph;
pub mod error;
pub mod formula;
pub mod history;
pub mod recalc;
pub mod sheet;
pub mod structure;
pub mod template;
pub mod workbook;

#[cfg(test)]
pub mod harness;

pub mod expression_translator;
pub use expression_translator::*;

pub mod dml_generator;
pub use dml_generator::*;

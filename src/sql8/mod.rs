pub mod checker;
pub use checker::*;

pub mod rewriter;
pub use rewriter::*;

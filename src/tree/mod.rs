pub mod constant;
pub use constant::*;

pub mod expression_kind;
pub use expression_kind::*;

pub mod expression;
pub use expression::*;

pub mod builder;
pub use builder::*;

pub mod command_tree;
pub use command_tree::*;

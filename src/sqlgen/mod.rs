pub mod name_registry;
pub use name_registry::*;

pub mod symbol;
pub use symbol::*;

pub mod symbol_table;
pub use symbol_table::*;

pub mod sql_fragment;
pub use sql_fragment::*;

pub mod select_statement;
pub use select_statement::*;

pub mod sql_writer;
pub use sql_writer::*;

pub mod sql_generator;
pub use sql_generator::*;

mod columns;
mod function_handler;
mod in_rewrite;
mod literal;
mod non_unicode;
mod relational;
mod spatial;

#[cfg(test)]
mod sql_generator_tests;

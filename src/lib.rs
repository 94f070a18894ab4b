pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::*;

pub mod metadata;
pub use metadata::*;

pub mod tree;
pub use tree::*;

pub mod sqlgen;

pub mod sql8;

pub mod dml;

pub mod generate;
pub use generate::{CommandType, GeneratedCommand, generate_sql};

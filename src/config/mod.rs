pub mod sql_version;
pub use sql_version::*;

pub mod generator_config;
pub use generator_config::*;

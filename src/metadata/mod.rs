pub mod primitive_type_kind;
pub use primitive_type_kind::*;

pub mod type_usage;
pub use type_usage::*;

pub mod entity_set;
pub use entity_set::*;

pub mod edm_function;
pub use edm_function::*;

pub mod store_type;
pub use store_type::*;

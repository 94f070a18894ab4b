use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTypeKind {
    Binary,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Decimal,
    Single,
    Double,
    Guid,
    String,
    DateTime,
    Time,
    DateTimeOffset,
    Geography,
    Geometry,
}

impl PrimitiveTypeKind {
    pub fn is_spatial(self) -> bool {
        matches!(self, PrimitiveTypeKind::Geography | PrimitiveTypeKind::Geometry)
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveTypeKind::Binary => "Binary",
            PrimitiveTypeKind::Boolean => "Boolean",
            PrimitiveTypeKind::Byte => "Byte",
            PrimitiveTypeKind::SByte => "SByte",
            PrimitiveTypeKind::Int16 => "Int16",
            PrimitiveTypeKind::Int32 => "Int32",
            PrimitiveTypeKind::Int64 => "Int64",
            PrimitiveTypeKind::Decimal => "Decimal",
            PrimitiveTypeKind::Single => "Single",
            PrimitiveTypeKind::Double => "Double",
            PrimitiveTypeKind::Guid => "Guid",
            PrimitiveTypeKind::String => "String",
            PrimitiveTypeKind::DateTime => "DateTime",
            PrimitiveTypeKind::Time => "Time",
            PrimitiveTypeKind::DateTimeOffset => "DateTimeOffset",
            PrimitiveTypeKind::Geography => "Geography",
            PrimitiveTypeKind::Geometry => "Geometry",
        }
    }
}

impl Display for PrimitiveTypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

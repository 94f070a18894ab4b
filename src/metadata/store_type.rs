use crate::{Error, MaxLength, PrimitiveTypeKind, Result, SqlVersion, TypeUsage};

const BINARY_MAX_SIZE: u32 = 8000;
const VARCHAR_MAX_SIZE: u32 = 8000;
const NVARCHAR_MAX_SIZE: u32 = 4000;
const DEFAULT_DECIMAL_PRECISION: u8 = 18;

/// Store types whose length is fixed at "max" or that are large-object types.
pub const MAX_TYPE_NAMES: [&str; 7] =
    ["varchar(max)", "nvarchar(max)", "text", "ntext", "varbinary(max)", "image", "xml"];

/// A SQL Server type a model type maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreType {
    pub name: String,
    pub kind: PrimitiveTypeKind,
    /// Variable length facet, rendered as `name(n)`.
    pub max_length: Option<u32>,
    /// Variable precision and scale, rendered as `name(p,s)`.
    pub precision_scale: Option<(u8, u8)>,
}

impl StoreType {
    fn fixed(name: &str, kind: PrimitiveTypeKind) -> Self {
        Self { name: name.to_string(), kind, max_length: None, precision_scale: None }
    }

    fn sized(name: &str, kind: PrimitiveTypeKind, max_length: u32) -> Self {
        Self { name: name.to_string(), kind, max_length: Some(max_length), precision_scale: None }
    }

    /// Maps a primitive model type to its store type for `version`.
    pub fn for_type(version: SqlVersion, ty: &TypeUsage) -> Result<Self> {
        let kind = ty
            .primitive_kind()
            .ok_or_else(|| Error::not_supported(format!("type {ty} has no store equivalent")))?;
        let facets = &ty.facets;

        let mut store = match kind {
            PrimitiveTypeKind::Boolean => Self::fixed("bit", kind),
            PrimitiveTypeKind::Byte => Self::fixed("tinyint", kind),
            PrimitiveTypeKind::Int16 => Self::fixed("smallint", kind),
            PrimitiveTypeKind::Int32 => Self::fixed("int", kind),
            PrimitiveTypeKind::Int64 => Self::fixed("bigint", kind),
            PrimitiveTypeKind::Guid => Self::fixed("uniqueidentifier", kind),
            PrimitiveTypeKind::Double => Self::fixed("float", kind),
            PrimitiveTypeKind::Single => Self::fixed("real", kind),
            PrimitiveTypeKind::DateTime => Self::fixed("datetime", kind),
            PrimitiveTypeKind::Time => Self::fixed("time", kind),
            PrimitiveTypeKind::DateTimeOffset => Self::fixed("datetimeoffset", kind),
            PrimitiveTypeKind::Decimal => Self {
                name: "decimal".to_string(),
                kind,
                max_length: None,
                precision_scale: Some((
                    facets.precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                    facets.scale.unwrap_or(0),
                )),
            },
            PrimitiveTypeKind::Geography | PrimitiveTypeKind::Geometry => {
                if version.is_pre_katmai() {
                    return Err(Error::not_supported(format!(
                        "type {kind} is not supported prior to SQL Server 2008"
                    )));
                }
                Self::fixed(if kind == PrimitiveTypeKind::Geography { "geography" } else { "geometry" }, kind)
            }
            PrimitiveTypeKind::Binary => {
                let fixed = facets.fixed_length.unwrap_or(false);
                let max = bounded_length(facets.max_length, BINARY_MAX_SIZE);
                match (fixed, max) {
                    (true, None) => Self::sized("binary", kind, BINARY_MAX_SIZE),
                    (true, Some(n)) => Self::sized("binary", kind, n),
                    (false, None) if version == SqlVersion::Sql8 => Self::sized("varbinary", kind, BINARY_MAX_SIZE),
                    (false, None) => Self::fixed("varbinary(max)", kind),
                    (false, Some(n)) => Self::sized("varbinary", kind, n),
                }
            }
            PrimitiveTypeKind::String => {
                let unicode = facets.unicode.unwrap_or(true);
                let fixed = facets.fixed_length.unwrap_or(false);
                let (limit, fixed_name, var_name) = if unicode {
                    (NVARCHAR_MAX_SIZE, "nchar", "nvarchar")
                } else {
                    (VARCHAR_MAX_SIZE, "char", "varchar")
                };
                match (fixed, bounded_length(facets.max_length, limit)) {
                    (true, None) => Self::sized(fixed_name, kind, limit),
                    (true, Some(n)) => Self::sized(fixed_name, kind, n),
                    (false, None) if version == SqlVersion::Sql8 => Self::sized(var_name, kind, limit),
                    (false, None) => Self::fixed(&format!("{var_name}(max)"), kind),
                    (false, Some(n)) => Self::sized(var_name, kind, n),
                }
            }
            PrimitiveTypeKind::SByte => {
                return Err(Error::not_supported("type SByte has no SQL Server equivalent"));
            }
        };

        if let Some(name) = facets.store_type_name.as_deref() {
            if !matches!(name, "char" | "nchar" | "varchar" | "nvarchar" | "binary" | "varbinary") {
                store.max_length = None;
            }
            if !matches!(name, "decimal" | "numeric") {
                store.precision_scale = None;
            }
            store.name = name.to_string();
        }

        Ok(store)
    }

    /// Type name as written in CAST, CONVERT and DECLARE.
    pub fn sql_name(&self, version: SqlVersion) -> Result<String> {
        match self.kind {
            PrimitiveTypeKind::DateTime if self.name == "datetime" => {
                return Ok(if version.is_pre_katmai() { "datetime" } else { "datetime2" }.to_string());
            }
            PrimitiveTypeKind::Time | PrimitiveTypeKind::DateTimeOffset if version.is_pre_katmai() => {
                return Err(Error::not_supported(format!(
                    "type {} is not supported prior to SQL Server 2008",
                    self.kind
                )));
            }
            _ => {}
        }
        Ok(match (self.max_length, self.precision_scale) {
            (Some(n), _) => format!("{}({n})", self.name),
            (None, Some((p, s))) => format!("{}({p},{s})", self.name),
            (None, None) => self.name.clone(),
        })
    }

    pub fn is_max_type(&self) -> bool {
        MAX_TYPE_NAMES.contains(&self.name.as_str())
    }

    /// Types SQL Server accepts for an IDENTITY column.
    pub fn is_valid_identity_type(&self) -> bool {
        match self.name.as_str() {
            "tinyint" | "smallint" | "int" | "bigint" => true,
            "decimal" | "numeric" => self.precision_scale.is_some_and(|(_, scale)| scale == 0),
            _ => false,
        }
    }
}

/// `None` when the length is unbounded, unspecified or above `limit`.
fn bounded_length(max_length: Option<MaxLength>, limit: u32) -> Option<u32> {
    match max_length {
        Some(MaxLength::Bounded(n)) if n <= limit => Some(n),
        _ => None,
    }
}

/// SQL type name for a primitive model type.
pub fn sql_type_name(version: SqlVersion, ty: &TypeUsage) -> Result<String> {
    StoreType::for_type(version, ty)?.sql_name(version)
}

/// Name of the default string store type, used for `AsGml` results.
pub fn default_string_type_name(version: SqlVersion) -> &'static str {
    if version == SqlVersion::Sql8 { "nvarchar(4000)" } else { "nvarchar(max)" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(version: SqlVersion, ty: TypeUsage) -> String {
        sql_type_name(version, &ty).unwrap()
    }

    #[test]
    fn strings_map_by_unicode_and_length() {
        let v = SqlVersion::Sql9;
        assert_eq!(name(v, TypeUsage::string(None)), "nvarchar(max)");
        assert_eq!(name(SqlVersion::Sql8, TypeUsage::string(None)), "nvarchar(4000)");
        assert_eq!(name(v, TypeUsage::string(Some(false)).with_max_length(20)), "varchar(20)");
        assert_eq!(name(v, TypeUsage::string(Some(false)).with_max_length(9000)), "varchar(max)");
        assert_eq!(name(v, TypeUsage::string(Some(true)).fixed_length().with_max_length(3)), "nchar(3)");
        assert_eq!(name(v, TypeUsage::string(Some(false)).fixed_length()), "char(8000)");
    }

    #[test]
    fn binary_and_decimal() {
        let bin = TypeUsage::primitive(PrimitiveTypeKind::Binary);
        assert_eq!(name(SqlVersion::Sql9, bin.clone()), "varbinary(max)");
        assert_eq!(name(SqlVersion::Sql8, bin.clone()), "varbinary(8000)");
        assert_eq!(name(SqlVersion::Sql9, bin.fixed_length().with_max_length(16)), "binary(16)");

        let dec = TypeUsage::primitive(PrimitiveTypeKind::Decimal);
        assert_eq!(name(SqlVersion::Sql9, dec.clone()), "decimal(18,0)");
        assert_eq!(name(SqlVersion::Sql9, dec.with_precision(10, 2)), "decimal(10,2)");
    }

    #[test]
    fn date_types_follow_version() {
        let dt = TypeUsage::primitive(PrimitiveTypeKind::DateTime);
        assert_eq!(name(SqlVersion::Sql9, dt.clone()), "datetime");
        assert_eq!(name(SqlVersion::Sql10, dt), "datetime2");

        let time = TypeUsage::primitive(PrimitiveTypeKind::Time);
        match sql_type_name(SqlVersion::Sql9, &time) {
            Err(Error::NotSupported(msg)) => assert!(msg.contains("Time")),
            other => panic!("expected NotSupported, got {other:?}"),
        }
        assert_eq!(name(SqlVersion::Sql10, time), "time");
    }

    #[test]
    fn store_type_override_and_max_types() {
        let xml = TypeUsage::string(None).with_store_type("xml");
        let store = StoreType::for_type(SqlVersion::Sql9, &xml).unwrap();
        assert_eq!(store.sql_name(SqlVersion::Sql9).unwrap(), "xml");
        assert!(store.is_max_type());

        let narrow = StoreType::for_type(SqlVersion::Sql9, &TypeUsage::string(None).with_max_length(10)).unwrap();
        assert!(!narrow.is_max_type());
    }

    #[test]
    fn identity_types() {
        let int = StoreType::for_type(SqlVersion::Sql9, &TypeUsage::int32()).unwrap();
        assert!(int.is_valid_identity_type());
        let dec = TypeUsage::primitive(PrimitiveTypeKind::Decimal).with_precision(10, 0);
        assert!(StoreType::for_type(SqlVersion::Sql9, &dec).unwrap().is_valid_identity_type());
        let guid = TypeUsage::primitive(PrimitiveTypeKind::Guid);
        assert!(!StoreType::for_type(SqlVersion::Sql9, &guid).unwrap().is_valid_identity_type());
    }

    #[test]
    fn spatial_requires_katmai() {
        let geo = TypeUsage::primitive(PrimitiveTypeKind::Geography);
        assert!(sql_type_name(SqlVersion::Sql9, &geo).is_err());
        assert_eq!(name(SqlVersion::Sql10, geo), "geography");
    }
}

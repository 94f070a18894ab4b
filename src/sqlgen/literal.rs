use crate::{
    ConstantValue, DbExpression, EdmFunction, Error, PrimitiveTypeKind, Result, SpatialValue, SqlVersion, TypeUsage,
    tree::constant::format_time_of_day,
    sqlgen::{SqlFragment, SqlGenerator},
};

/// Precision a decimal literal gets at least when it is cast.
const DEFAULT_DECIMAL_PRECISION: usize = 18;

/// `'text'` or `N'text'`, with single quotes doubled.
pub(crate) fn escape_single_quote(s: &str, unicode: bool) -> String {
    let prefix = if unicode { "N'" } else { "'" };
    format!("{prefix}{}'", s.replace('\'', "''"))
}

fn wrap_with_cast_if_needed(cast: bool, value: String, type_name: &str) -> String {
    if cast { format!("cast({value} as {type_name})") } else { value }
}

impl SqlGenerator {
    /// Writes a literal. `cast_optional` drops the type-fixing cast of small
    /// integers and booleans when the other operand already has their type.
    pub(super) fn visit_constant(
        &mut self,
        value: &ConstantValue,
        ty: &TypeUsage,
        cast_optional: bool,
    ) -> Result<SqlFragment> {
        let katmai = self.version == SqlVersion::Sql10;
        let text = match value {
            ConstantValue::Int32(v) => v.to_string(),
            ConstantValue::Binary(_) => format!(" 0x{value} "),
            ConstantValue::Boolean(b) => {
                wrap_with_cast_if_needed(!cast_optional, if *b { "1" } else { "0" }.to_string(), "bit")
            }
            ConstantValue::Byte(v) => wrap_with_cast_if_needed(!cast_optional, v.to_string(), "tinyint"),
            ConstantValue::Int16(v) => wrap_with_cast_if_needed(!cast_optional, v.to_string(), "smallint"),
            ConstantValue::Int64(v) => wrap_with_cast_if_needed(!cast_optional, v.to_string(), "bigint"),
            ConstantValue::DateTime(dt) => {
                let (type_name, format) =
                    if katmai { ("datetime2", "%Y-%m-%d %H:%M:%S%.7f") } else { ("datetime", "%Y-%m-%d %H:%M:%S%.3f") };
                format!("convert({type_name}, {}, 121)", escape_single_quote(&dt.format(format).to_string(), false))
            }
            ConstantValue::Time(t) => {
                self.require_katmai("time literals")?;
                format!("convert(time, {}, 121)", escape_single_quote(&format_time_of_day(t), false))
            }
            ConstantValue::DateTimeOffset(dto) => {
                self.require_katmai("datetimeoffset literals")?;
                let text = dto.format("%Y-%m-%d %H:%M:%S%.7f %:z").to_string();
                format!("convert(datetimeoffset, {}, 121)", escape_single_quote(&text, false))
            }
            ConstantValue::Decimal(text) => {
                // Integral decimals would otherwise be typed as int or bigint by the server.
                let needs_cast = !text.contains('.') && text.trim_start_matches('-').len() < 20;
                let precision = text.len().max(DEFAULT_DECIMAL_PRECISION);
                wrap_with_cast_if_needed(needs_cast, text.clone(), &format!("decimal({precision})"))
            }
            ConstantValue::Double(v) => {
                if !v.0.is_finite() {
                    return Err(Error::not_supported(format!("the double constant {} has no SQL literal", v.0)));
                }
                wrap_with_cast_if_needed(true, v.0.to_string(), "float(53)")
            }
            ConstantValue::Single(v) => {
                if !v.0.is_finite() {
                    return Err(Error::not_supported(format!("the single constant {} has no SQL literal", v.0)));
                }
                wrap_with_cast_if_needed(true, v.0.to_string(), "real")
            }
            ConstantValue::Guid(g) => {
                wrap_with_cast_if_needed(true, escape_single_quote(&g.to_string(), false), "uniqueidentifier")
            }
            ConstantValue::String(s) => {
                let unicode = ty.facets.unicode.unwrap_or(!self.force_non_unicode);
                escape_single_quote(s, unicode)
            }
            ConstantValue::Geography(spatial) => return self.visit_spatial_constant(spatial, true),
            ConstantValue::Geometry(spatial) => return self.visit_spatial_constant(spatial, false),
            ConstantValue::SByte(_) => {
                return Err(Error::not_supported("SByte constants have no SQL Server type"));
            }
        };
        Ok(text.into())
    }

    /// A spatial literal goes through the canonical constructor matching the
    /// first serialization it carries.
    fn visit_spatial_constant(&mut self, spatial: &SpatialValue, geography: bool) -> Result<SqlFragment> {
        let (prefix, kind) =
            if geography { ("Geography", PrimitiveTypeKind::Geography) } else { ("Geometry", PrimitiveTypeKind::Geometry) };
        let srid = spatial
            .srid
            .ok_or_else(|| Error::not_supported(format!("{prefix} constant without a coordinate system id")))?;

        let (constructor, value) = if let Some(text) = &spatial.well_known_text {
            ("FromText", DbExpression::constant(text.as_str()))
        } else if let Some(binary) = &spatial.well_known_binary {
            ("FromBinary", DbExpression::constant(binary.clone()))
        } else if let Some(gml) = &spatial.gml {
            ("FromGml", DbExpression::constant(gml.as_str()))
        } else {
            return Err(Error::not_supported(format!("{prefix} constant without a serialized value")));
        };

        let function = EdmFunction::canonical(&format!("{prefix}{constructor}"));
        let arguments = vec![value, DbExpression::constant(srid)];
        self.visit_function(&function, &arguments, &TypeUsage::primitive(kind))
    }

    pub(super) fn require_katmai(&self, what: &str) -> Result<()> {
        if self.version.is_pre_katmai() {
            return Err(Error::not_supported(format!("{what} require SQL Server 2008")));
        }
        Ok(())
    }
}

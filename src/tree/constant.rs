use std::fmt::Display;

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, Timelike};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PrimitiveTypeKind;

/// Serialized forms of a spatial constant, any of which may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialValue {
    #[serde(default)]
    pub srid: Option<i32>,
    #[serde(default)]
    pub well_known_text: Option<String>,
    #[serde(default)]
    pub well_known_binary: Option<Vec<u8>>,
    #[serde(default)]
    pub gml: Option<String>,
}

impl SpatialValue {
    pub fn from_text(text: &str, srid: i32) -> Self {
        Self { srid: Some(srid), well_known_text: Some(text.to_string()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantValue {
    Binary(Vec<u8>),
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    /// Invariant culture text of the decimal, e.g. `-12.50`.
    Decimal(String),
    Single(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    Guid(Uuid),
    String(String),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Geography(SpatialValue),
    Geometry(SpatialValue),
}

impl ConstantValue {
    pub fn kind(&self) -> PrimitiveTypeKind {
        match self {
            ConstantValue::Binary(_) => PrimitiveTypeKind::Binary,
            ConstantValue::Boolean(_) => PrimitiveTypeKind::Boolean,
            ConstantValue::Byte(_) => PrimitiveTypeKind::Byte,
            ConstantValue::SByte(_) => PrimitiveTypeKind::SByte,
            ConstantValue::Int16(_) => PrimitiveTypeKind::Int16,
            ConstantValue::Int32(_) => PrimitiveTypeKind::Int32,
            ConstantValue::Int64(_) => PrimitiveTypeKind::Int64,
            ConstantValue::Decimal(_) => PrimitiveTypeKind::Decimal,
            ConstantValue::Single(_) => PrimitiveTypeKind::Single,
            ConstantValue::Double(_) => PrimitiveTypeKind::Double,
            ConstantValue::Guid(_) => PrimitiveTypeKind::Guid,
            ConstantValue::String(_) => PrimitiveTypeKind::String,
            ConstantValue::DateTime(_) => PrimitiveTypeKind::DateTime,
            ConstantValue::Time(_) => PrimitiveTypeKind::Time,
            ConstantValue::DateTimeOffset(_) => PrimitiveTypeKind::DateTimeOffset,
            ConstantValue::Geography(_) => PrimitiveTypeKind::Geography,
            ConstantValue::Geometry(_) => PrimitiveTypeKind::Geometry,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstantValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// `hh:mm:ss` with a seven digit fraction when there is one.
pub(crate) fn format_time_of_day(time: &NaiveTime) -> String {
    let ticks = time.nanosecond() % 1_000_000_000 / 100;
    if ticks == 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        format!("{}.{ticks:07}", time.format("%H:%M:%S"))
    }
}

impl Display for ConstantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstantValue::Binary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
            ConstantValue::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            ConstantValue::Byte(v) => write!(f, "{v}"),
            ConstantValue::SByte(v) => write!(f, "{v}"),
            ConstantValue::Int16(v) => write!(f, "{v}"),
            ConstantValue::Int32(v) => write!(f, "{v}"),
            ConstantValue::Int64(v) => write!(f, "{v}"),
            ConstantValue::Decimal(v) => write!(f, "{v}"),
            ConstantValue::Single(v) => write!(f, "{}", v.0),
            ConstantValue::Double(v) => write!(f, "{}", v.0),
            ConstantValue::Guid(g) => write!(f, "{g}"),
            ConstantValue::String(s) => write!(f, "{s}"),
            ConstantValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            ConstantValue::Time(t) => write!(f, "{}", format_time_of_day(t)),
            ConstantValue::DateTimeOffset(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S %:z")),
            ConstantValue::Geography(v) | ConstantValue::Geometry(v) => {
                write!(f, "{}", v.well_known_text.as_deref().unwrap_or("<spatial>"))
            }
        }
    }
}

impl From<bool> for ConstantValue {
    fn from(v: bool) -> Self {
        ConstantValue::Boolean(v)
    }
}

impl From<u8> for ConstantValue {
    fn from(v: u8) -> Self {
        ConstantValue::Byte(v)
    }
}

impl From<i16> for ConstantValue {
    fn from(v: i16) -> Self {
        ConstantValue::Int16(v)
    }
}

impl From<i32> for ConstantValue {
    fn from(v: i32) -> Self {
        ConstantValue::Int32(v)
    }
}

impl From<i64> for ConstantValue {
    fn from(v: i64) -> Self {
        ConstantValue::Int64(v)
    }
}

impl From<f32> for ConstantValue {
    fn from(v: f32) -> Self {
        ConstantValue::Single(OrderedFloat(v))
    }
}

impl From<f64> for ConstantValue {
    fn from(v: f64) -> Self {
        ConstantValue::Double(OrderedFloat(v))
    }
}

impl From<&str> for ConstantValue {
    fn from(v: &str) -> Self {
        ConstantValue::String(v.to_string())
    }
}

impl From<String> for ConstantValue {
    fn from(v: String) -> Self {
        ConstantValue::String(v)
    }
}

impl From<Uuid> for ConstantValue {
    fn from(v: Uuid) -> Self {
        ConstantValue::Guid(v)
    }
}

impl From<Vec<u8>> for ConstantValue {
    fn from(v: Vec<u8>) -> Self {
        ConstantValue::Binary(v)
    }
}

impl From<NaiveDateTime> for ConstantValue {
    fn from(v: NaiveDateTime) -> Self {
        ConstantValue::DateTime(v)
    }
}

impl From<NaiveTime> for ConstantValue {
    fn from(v: NaiveTime) -> Self {
        ConstantValue::Time(v)
    }
}

impl From<DateTime<FixedOffset>> for ConstantValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        ConstantValue::DateTimeOffset(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_values() {
        assert_eq!(ConstantValue::from(1i64).kind(), PrimitiveTypeKind::Int64);
        assert_eq!(ConstantValue::from("x").kind(), PrimitiveTypeKind::String);
        assert_eq!(ConstantValue::from(vec![1u8]).kind(), PrimitiveTypeKind::Binary);
        assert_eq!(ConstantValue::Decimal("1.5".into()).kind(), PrimitiveTypeKind::Decimal);
    }

    #[test]
    fn time_of_day_has_optional_fraction() {
        let whole = NaiveTime::from_hms_opt(13, 5, 9).unwrap();
        assert_eq!(format_time_of_day(&whole), "13:05:09");
        let frac = NaiveTime::from_hms_nano_opt(1, 2, 3, 500_000_000).unwrap();
        assert_eq!(format_time_of_day(&frac), "01:02:03.5000000");
    }

    #[test]
    fn display_matches_invariant_culture() {
        assert_eq!(ConstantValue::from(true).to_string(), "True");
        assert_eq!(ConstantValue::from(42i32).to_string(), "42");
        assert_eq!(ConstantValue::Binary(vec![0x0a, 0xff]).to_string(), "0AFF");
    }

    #[test]
    fn nan_constants_are_comparable() {
        let a = ConstantValue::from(f64::NAN);
        assert_eq!(a, a.clone());
    }
}

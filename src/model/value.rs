//! Primitive and structured property values.
//!
//! [`ODataValue`] is the in-memory form of a property. Conversions from JSON
//! honour the declared [`PropertyType`] when the model provides one, and fall
//! back to the narrowest natural type otherwise.

use crate::error::{ODataError, Result};
use crate::serializer::literal::parse_duration;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A property value held by an entity instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ODataValue {
    Null,
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    /// Canonical decimal text (`-?digits[.digits]`)
    Decimal(String),
    String(String),
    /// Lower-case 8-4-4-4-12 hex form
    Guid(String),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(TimeDelta),
    Binary(Vec<u8>),
    Enum {
        type_name: String,
        member: String,
    },
    Collection(Vec<ODataValue>),
    Complex(IndexMap<String, ODataValue>),
}

impl ODataValue {
    /// Build a decimal value, validating its textual form.
    pub fn decimal(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if is_decimal_text(&text) {
            Ok(Self::Decimal(text))
        } else {
            Err(ODataError::argument(
                "decimal",
                format!("'{text}' is not a valid Edm.Decimal literal"),
            ))
        }
    }

    /// Build a GUID value, validating and normalizing it to lower case.
    pub fn guid(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        let well_formed = bytes.len() == 36
            && bytes.iter().enumerate().all(|(i, b)| match i {
                8 | 13 | 18 | 23 => *b == b'-',
                _ => b.is_ascii_hexdigit(),
            });
        if well_formed {
            Ok(Self::Guid(text.to_ascii_lowercase()))
        } else {
            Err(ODataError::argument(
                "guid",
                format!("'{text}' is not a valid Edm.Guid literal"),
            ))
        }
    }

    /// Build an enum member value.
    pub fn enum_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::Enum {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON value, using the declared type when one is known.
    pub fn from_json(value: &Value, declared: Option<&PropertyType>) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::Null);
        }
        match declared {
            Some(PropertyType::Primitive(kind)) => from_json_primitive(value, *kind),
            Some(PropertyType::Enum(type_name)) => match value {
                Value::String(member) => Ok(Self::enum_member(type_name.clone(), member.clone())),
                other => Err(mismatch(other, type_name)),
            },
            Some(PropertyType::Collection(kind)) => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| from_json_primitive(item, *kind).or_else(|_| untyped(item)))
                    .collect::<Result<Vec<_>>>()
                    .map(Self::Collection),
                other => Err(mismatch(other, &format!("Collection({kind})"))),
            },
            None => untyped(value),
        }
    }
}

fn is_decimal_text(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    !int_part.is_empty()
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

fn mismatch(value: &Value, expected: &str) -> ODataError {
    ODataError::validation(format!("cannot convert {value} to {expected}"))
}

fn untyped(value: &Value) -> Result<ODataValue> {
    Ok(match value {
        Value::Null => ODataValue::Null,
        Value::Bool(b) => ODataValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i32::try_from(i).map_or(ODataValue::Int64(i), ODataValue::Int32)
            } else if let Some(f) = n.as_f64() {
                ODataValue::Double(f)
            } else {
                return Err(mismatch(value, "a number"));
            }
        }
        Value::String(s) => ODataValue::String(s.clone()),
        Value::Array(items) => {
            ODataValue::Collection(items.iter().map(untyped).collect::<Result<Vec<_>>>()?)
        }
        Value::Object(map) => {
            let mut props = IndexMap::new();
            for (k, v) in map {
                if !k.starts_with('@') {
                    props.insert(k.clone(), untyped(v)?);
                }
            }
            ODataValue::Complex(props)
        }
    })
}

fn integer<T: TryFrom<i64>>(value: &Value, kind: EdmPrimitiveType) -> Result<T> {
    let raw = match value {
        Value::Number(n) => n.as_i64(),
        // IEEE754Compatible payloads carry Int64 as strings
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    raw.and_then(|i| T::try_from(i).ok())
        .ok_or_else(|| mismatch(value, kind.name()))
}

fn float(value: &Value, kind: EdmPrimitiveType) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(value, kind.name())),
        Value::String(s) => match s.as_str() {
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            "NaN" => Ok(f64::NAN),
            other => other.parse::<f64>().map_err(|_| mismatch(value, kind.name())),
        },
        _ => Err(mismatch(value, kind.name())),
    }
}

fn text<'v>(value: &'v Value, kind: EdmPrimitiveType) -> Result<&'v str> {
    value.as_str().ok_or_else(|| mismatch(value, kind.name()))
}

fn from_json_primitive(value: &Value, kind: EdmPrimitiveType) -> Result<ODataValue> {
    use EdmPrimitiveType as K;
    if value.is_null() {
        return Ok(ODataValue::Null);
    }
    Ok(match kind {
        K::Boolean => ODataValue::Boolean(value.as_bool().ok_or_else(|| mismatch(value, kind.name()))?),
        K::Byte => ODataValue::Byte(integer(value, kind)?),
        K::SByte => ODataValue::SByte(integer(value, kind)?),
        K::Int16 => ODataValue::Int16(integer(value, kind)?),
        K::Int32 => ODataValue::Int32(integer(value, kind)?),
        K::Int64 => ODataValue::Int64(integer(value, kind)?),
        K::Single => ODataValue::Single(float(value, kind)? as f32),
        K::Double => ODataValue::Double(float(value, kind)?),
        K::Decimal => match value {
            Value::Number(n) => ODataValue::decimal(n.to_string())?,
            Value::String(s) => ODataValue::decimal(s.clone())?,
            _ => return Err(mismatch(value, kind.name())),
        },
        K::String => ODataValue::String(text(value, kind)?.to_string()),
        K::Guid => ODataValue::guid(text(value, kind)?)?,
        K::Date => ODataValue::Date(
            NaiveDate::parse_from_str(text(value, kind)?, "%Y-%m-%d")
                .map_err(|_| mismatch(value, kind.name()))?,
        ),
        K::TimeOfDay => ODataValue::TimeOfDay(
            NaiveTime::parse_from_str(text(value, kind)?, "%H:%M:%S%.f")
                .map_err(|_| mismatch(value, kind.name()))?,
        ),
        K::DateTimeOffset => ODataValue::DateTimeOffset(
            DateTime::parse_from_rfc3339(text(value, kind)?)
                .map_err(|_| mismatch(value, kind.name()))?,
        ),
        K::Duration => ODataValue::Duration(parse_duration(text(value, kind)?)?),
        K::Binary => ODataValue::Binary(
            BASE64
                .decode(text(value, kind)?)
                .map_err(|_| mismatch(value, kind.name()))?,
        ),
    })
}

/// The EDM primitive types understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdmPrimitiveType {
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Guid,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Duration,
    Binary,
}

impl EdmPrimitiveType {
    const ALL: [Self; 16] = [
        Self::Boolean,
        Self::Byte,
        Self::SByte,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Single,
        Self::Double,
        Self::Decimal,
        Self::String,
        Self::Guid,
        Self::Date,
        Self::TimeOfDay,
        Self::DateTimeOffset,
        Self::Duration,
        Self::Binary,
    ];

    /// Qualified EDM name, e.g. `Edm.Int32`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::SByte => "Edm.SByte",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Single => "Edm.Single",
            Self::Double => "Edm.Double",
            Self::Decimal => "Edm.Decimal",
            Self::String => "Edm.String",
            Self::Guid => "Edm.Guid",
            Self::Date => "Edm.Date",
            Self::TimeOfDay => "Edm.TimeOfDay",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::Duration => "Edm.Duration",
            Self::Binary => "Edm.Binary",
        }
    }

    /// Parse a qualified EDM name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EdmPrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a structural property.
///
/// Written in models as `Edm.Int32`, `Collection(Edm.String)` or, for enum
/// types, the qualified enum type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropertyType {
    Primitive(EdmPrimitiveType),
    Enum(String),
    Collection(EdmPrimitiveType),
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(inner) = s.strip_prefix("Collection(").and_then(|r| r.strip_suffix(')')) {
            return EdmPrimitiveType::from_name(inner)
                .map(Self::Collection)
                .ok_or_else(|| format!("unknown collection element type '{inner}'"));
        }
        if let Some(kind) = EdmPrimitiveType::from_name(s) {
            return Ok(Self::Primitive(kind));
        }
        if s.starts_with("Edm.") || s.is_empty() {
            return Err(format!("unknown primitive type '{s}'"));
        }
        Ok(Self::Enum(s.to_string()))
    }
}

impl TryFrom<String> for PropertyType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{kind}"),
            Self::Enum(name) => f.write_str(name),
            Self::Collection(kind) => write!(f, "Collection({kind})"),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ODataValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value.into())
            }
        })*
    };
}

impl_from_value! {
    bool => Boolean,
    u8 => Byte,
    i8 => SByte,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Single,
    f64 => Double,
    &str => String,
    String => String,
    Vec<u8> => Binary,
    NaiveDate => Date,
    NaiveTime => TimeOfDay,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => Duration,
}

impl<T: Into<ODataValue>> From<Option<T>> for ODataValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untyped_numbers_pick_narrowest() {
        assert_eq!(ODataValue::from_json(&json!(7), None).unwrap(), ODataValue::Int32(7));
        assert_eq!(
            ODataValue::from_json(&json!(5_000_000_000_i64), None).unwrap(),
            ODataValue::Int64(5_000_000_000)
        );
        assert_eq!(ODataValue::from_json(&json!(1.5), None).unwrap(), ODataValue::Double(1.5));
    }

    #[test]
    fn test_declared_types_drive_conversion() {
        let int64 = PropertyType::Primitive(EdmPrimitiveType::Int64);
        assert_eq!(
            ODataValue::from_json(&json!("42"), Some(&int64)).unwrap(),
            ODataValue::Int64(42)
        );

        let double = PropertyType::Primitive(EdmPrimitiveType::Double);
        assert_eq!(
            ODataValue::from_json(&json!("-INF"), Some(&double)).unwrap(),
            ODataValue::Double(f64::NEG_INFINITY)
        );

        let duration = PropertyType::Primitive(EdmPrimitiveType::Duration);
        assert_eq!(
            ODataValue::from_json(&json!("P1DT2H"), Some(&duration)).unwrap(),
            ODataValue::Duration(TimeDelta::hours(26))
        );
    }

    #[test]
    fn test_declared_type_mismatch_is_validation_error() {
        let int32 = PropertyType::Primitive(EdmPrimitiveType::Int32);
        let err = ODataValue::from_json(&json!("abc"), Some(&int32)).unwrap_err();
        assert!(matches!(err, ODataError::Validation(_)), "{err:?}");
    }

    #[test]
    fn test_property_type_parsing() {
        assert_eq!(
            "Edm.Guid".parse::<PropertyType>().unwrap(),
            PropertyType::Primitive(EdmPrimitiveType::Guid)
        );
        assert_eq!(
            "Collection(Edm.String)".parse::<PropertyType>().unwrap(),
            PropertyType::Collection(EdmPrimitiveType::String)
        );
        assert_eq!(
            "NS.Color".parse::<PropertyType>().unwrap(),
            PropertyType::Enum("NS.Color".to_string())
        );
        assert!("Edm.Nope".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_decimal_and_guid_validation() {
        assert!(ODataValue::decimal("-12.50").is_ok());
        assert!(ODataValue::decimal("1e5").is_err());
        assert!(ODataValue::decimal("3.").is_err());
        assert_eq!(
            ODataValue::guid("0A1B2C3D-0000-1111-2222-333344445555").unwrap(),
            ODataValue::Guid("0a1b2c3d-0000-1111-2222-333344445555".to_string())
        );
        assert!(ODataValue::guid("not-a-guid").is_err());
    }
}

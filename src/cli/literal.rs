//! Literal command handler.

use crate::model::{ODataValue, PropertyType};
use crate::serializer::literal::{format_uri_literal, write_json_value};
use crate::serializer::JsonWriter;
use anyhow::{anyhow, Context, Result};
use serde_json::Value;

/// Which literal form to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralForm {
    /// `duration'PT1S'`, `'O''Neil'`, `1E+15`
    Uri,
    /// JSON token as written in payloads
    Json,
}

/// Read `raw` as a value of `type_name`.
///
/// The text is tried as JSON first so numbers and booleans keep their
/// type, then as a plain string.
pub fn parse_value(type_name: &str, raw: &str) -> Result<ODataValue> {
    let declared: PropertyType = type_name
        .parse()
        .map_err(|err: String| anyhow!(err))
        .with_context(|| format!("'{type_name}' is not a property type"))?;
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        if let Ok(value) = ODataValue::from_json(&json, Some(&declared)) {
            return Ok(value);
        }
    }
    ODataValue::from_json(&Value::String(raw.to_string()), Some(&declared))
        .with_context(|| format!("'{raw}' is not a valid {type_name}"))
}

/// Format `raw` of `type_name` in the requested form.
pub fn format_literal(type_name: &str, raw: &str, form: LiteralForm, ieee754: bool) -> Result<String> {
    let value = parse_value(type_name, raw)?;
    match form {
        LiteralForm::Uri => Ok(format_uri_literal(&value)?),
        LiteralForm::Json => {
            let mut writer = JsonWriter::new(Vec::new(), false);
            write_json_value(&mut writer, &value, ieee754)?;
            Ok(String::from_utf8(writer.into_inner()?)?)
        }
    }
}

/// Run the literal command.
pub fn run_literal(type_name: &str, raw: &str, form: LiteralForm, ieee754: bool) -> Result<()> {
    println!("{}", format_literal(type_name, raw, form, ieee754)?);
    Ok(())
}

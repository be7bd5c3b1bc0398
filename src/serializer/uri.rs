//! Entity URIs and key predicates.
//!
//! Key literals are percent-encoded byte by byte: unreserved characters and
//! the sub-delimiters OData allows inside a segment (`!$'()*,;:@`) are kept,
//! every other byte becomes `%XX` with upper-case hex digits.

use super::literal::format_uri_literal;
use crate::config::KeyDelimiter;
use crate::error::{ODataError, Result, SerializationErrorKind};
use crate::model::{EntityInstance, ODataValue, ServiceModel};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_segment_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b',' | b';' | b':' | b'@'
        )
}

/// Percent-encode a literal for use inside a path segment.
#[must_use]
pub fn percent_encode(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for byte in literal.bytes() {
        if is_segment_safe(byte) {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
    }
    out
}

/// Render the key part that follows the entity-set name.
///
/// A single key is `(v)` or `/v`; composite keys are always
/// `(K1=v1,K2=v2)`, since key-as-segment cannot express them.
pub fn key_predicate(keys: &[(&str, &ODataValue)], delimiter: KeyDelimiter) -> Result<String> {
    let literal = |value: &ODataValue| format_uri_literal(value).map(|text| percent_encode(&text));
    match keys {
        [] => Err(ODataError::argument("keys", "an entity key needs at least one property")),
        [(_, value)] => {
            let text = literal(value)?;
            Ok(match delimiter {
                KeyDelimiter::Parentheses => format!("({text})"),
                KeyDelimiter::Slash => format!("/{text}"),
            })
        }
        composite => {
            let parts = composite
                .iter()
                .map(|(name, value)| literal(value).map(|text| format!("{name}={text}")))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(",")))
        }
    }
}

/// Relative canonical path of an entity, e.g. `People(100)`.
///
/// Fails when a key property is missing or null.
pub fn entity_path(
    model: &dyn ServiceModel,
    entity_set: &str,
    instance: &EntityInstance,
    delimiter: KeyDelimiter,
) -> Result<String> {
    let key_names = model.key_properties(instance.type_name());
    let mut keys = Vec::with_capacity(key_names.len());
    for name in &key_names {
        match instance.get(name) {
            Some(value) if !value.is_null() => keys.push((name.as_str(), value)),
            _ => {
                return Err(ODataError::serialization(
                    format!("building the URI of a {} in '{entity_set}'", instance.type_name()),
                    SerializationErrorKind::MissingKey {
                        entity_type: instance.type_name().to_string(),
                        property: name.clone(),
                    },
                ))
            }
        }
    }
    if keys.is_empty() {
        return Err(ODataError::serialization(
            format!("building the URI of a {} in '{entity_set}'", instance.type_name()),
            SerializationErrorKind::MissingKey {
                entity_type: instance.type_name().to_string(),
                property: "<no key declared>".to_string(),
            },
        ));
    }
    Ok(format!("{entity_set}{}", key_predicate(&keys, delimiter)?))
}

/// Absolute URI of a resource path under the service root.
#[must_use]
pub fn absolute_uri(service_root: &str, path: &str) -> String {
    format!("{}/{}", service_root.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Context URL: `{root}/$metadata#{fragment}`.
#[must_use]
pub fn metadata_context(service_root: &str, fragment: &str) -> String {
    format!("{}/$metadata#{fragment}", service_root.trim_end_matches('/'))
}

//! Query response materialization.
//!
//! A response is read into a [`QueryResult`] according to the [`PayloadKind`]
//! the caller expects. `204 No Content` and empty bodies yield an empty,
//! non-null sequence for every kind.

use crate::config::AnnotationStyle;
use crate::error::{ErrorContext, ODataError, Result, ServerError};
use crate::model::{EntityInstance, ODataValue, PropertyType, ServiceModel};
use crate::response::SaveChangesResponse;
use crate::transport::ODataResponse;
use serde_json::{Map, Value};

/// Expected shape of a query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A single entry
    Entity,
    /// A `value` array of entries
    Feed,
    /// `{"value": ...}` wrapping one property value
    Property,
    /// Raw `$value` text
    Value,
    /// Raw bytes
    Binary,
}

/// One materialized item.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Entity(EntityInstance),
    Property(ODataValue),
    Value(String),
    Binary(Vec<u8>),
}

impl Materialized {
    #[must_use]
    pub fn as_entity(&self) -> Option<&EntityInstance> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }
}

/// Forward-only cursor over materialized items.
///
/// `current()` is `None` until the first `move_next()` and after the end.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    items: Vec<Materialized>,
    position: Option<usize>,
    next_link: Option<String>,
    count: Option<u64>,
}

impl QueryResult {
    fn new(items: Vec<Materialized>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Item under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Materialized> {
        self.position.and_then(|i| self.items.get(i))
    }

    /// Advance the cursor; false once the sequence is exhausted.
    pub fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |i| i + 1);
        if next < self.items.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.items.len());
            false
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Materialized> {
        self.items.iter()
    }

    /// `@nextLink` of a feed, if the service paged it.
    #[must_use]
    pub fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }

    /// `@count` of a feed, when requested.
    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        self.count
    }
}

impl IntoIterator for QueryResult {
    type Item = Materialized;
    type IntoIter = std::vec::IntoIter<Materialized>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Materialized;
    type IntoIter = std::slice::Iter<'a, Materialized>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Reads query responses into [`QueryResult`]s.
pub struct Materializer<'a> {
    model: &'a dyn ServiceModel,
    style: AnnotationStyle,
}

impl<'a> Materializer<'a> {
    pub fn new(model: &'a dyn ServiceModel, style: AnnotationStyle) -> Self {
        Self { model, style }
    }

    /// Materialize `response` as `kind`.
    ///
    /// `expected_type` names the entity type of entries (used when the
    /// payload carries no `@type`) or the declared type of a property.
    pub fn materialize(
        &self,
        response: &ODataResponse,
        kind: PayloadKind,
        expected_type: Option<&str>,
    ) -> Result<QueryResult> {
        if response.status >= 400 {
            let message = String::from_utf8_lossy(&response.body).into_owned();
            return Err(ODataError::request(
                "the query failed",
                Some(ServerError {
                    status_code: response.status,
                    code: None,
                    message,
                }),
                SaveChangesResponse::default(),
            ));
        }
        if response.is_no_content() {
            tracing::debug!(?kind, "empty query response");
            return Ok(QueryResult::default());
        }

        match kind {
            PayloadKind::Value => {
                let text = String::from_utf8(response.body.clone())
                    .map_err(|err| ODataError::validation(format!("raw value is not UTF-8: {err}")))?;
                Ok(QueryResult::new(vec![Materialized::Value(text)]))
            }
            PayloadKind::Binary => Ok(QueryResult::new(vec![Materialized::Binary(
                response.body.clone(),
            )])),
            PayloadKind::Entity | PayloadKind::Feed | PayloadKind::Property => {
                let body: Value = serde_json::from_slice(&response.body)
                    .map_err(|err| ODataError::validation(format!("invalid JSON response: {err}")))?;
                self.read_document(&body, kind, expected_type)
            }
        }
    }

    fn read_document(
        &self,
        body: &Value,
        kind: PayloadKind,
        expected_type: Option<&str>,
    ) -> Result<QueryResult> {
        match kind {
            PayloadKind::Entity => {
                let members = body
                    .as_object()
                    .ok_or_else(|| ODataError::validation("expected an entry object"))?;
                let entity = self.read_entity(members, expected_type)?;
                Ok(QueryResult::new(vec![Materialized::Entity(entity)]))
            }
            PayloadKind::Feed => {
                let entries = body
                    .get("value")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ODataError::validation("expected a 'value' array"))?;
                let items = entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| {
                        let members = entry.as_object().ok_or_else(|| {
                            ODataError::validation(format!("feed entry {index} is not an object"))
                        })?;
                        self.read_entity(members, expected_type)
                            .map(Materialized::Entity)
                            .with_context(|| format!("feed entry {index}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut result = QueryResult::new(items);
                result.next_link = self.annotation(body, "nextLink").and_then(Value::as_str).map(str::to_string);
                result.count = self.annotation(body, "count").and_then(Value::as_u64);
                Ok(result)
            }
            _ => {
                let value = body.get("value").unwrap_or(body);
                let declared = expected_type.and_then(|t| t.parse::<PropertyType>().ok());
                let value = ODataValue::from_json(value, declared.as_ref())?;
                Ok(QueryResult::new(vec![Materialized::Property(value)]))
            }
        }
    }

    fn annotation<'v>(&self, body: &'v Value, term: &str) -> Option<&'v Value> {
        body.get(self.style.annotation(term)).or_else(|| {
            AnnotationStyle::spellings(term)
                .iter()
                .find_map(|name| body.get(name.as_str()))
        })
    }

    fn read_entity(&self, members: &Map<String, Value>, expected_type: Option<&str>) -> Result<EntityInstance> {
        let type_name = AnnotationStyle::spellings("type")
            .iter()
            .find_map(|name| members.get(name).and_then(Value::as_str))
            .map(|t| t.trim_start_matches('#').to_string())
            .or_else(|| expected_type.map(str::to_string))
            .ok_or_else(|| ODataError::validation("entry has no type and none was expected"))?;

        let mut entity = EntityInstance::new(type_name.clone());
        for (name, value) in members {
            if name.contains('@') || self.model.navigation(&type_name, name).is_some() {
                continue;
            }
            let declared = self.model.property_type(&type_name, name);
            let value = ODataValue::from_json(value, declared.as_ref())
                .with_context(|| format!("reading '{name}' of '{type_name}'"))?;
            entity.set(name.clone(), value);
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdmModel, EdmPrimitiveType, EntityTypeDef};

    fn model() -> EdmModel {
        EdmModel::new()
            .with_entity_type(
                "NS.Person",
                EntityTypeDef::new()
                    .key("ID", PropertyType::Primitive(EdmPrimitiveType::Int32))
                    .property("Name", PropertyType::Primitive(EdmPrimitiveType::String))
                    .navigation("Cars", "NS.Car", true),
            )
            .with_entity_set("People", "NS.Person")
    }

    #[test]
    fn test_no_content_is_empty_for_every_kind() {
        let model = model();
        let materializer = Materializer::new(&model, AnnotationStyle::Short);
        for kind in [
            PayloadKind::Entity,
            PayloadKind::Feed,
            PayloadKind::Property,
            PayloadKind::Value,
            PayloadKind::Binary,
        ] {
            let mut result = materializer
                .materialize(&ODataResponse::no_content(), kind, None)
                .unwrap();
            assert!(result.is_empty());
            assert!(result.current().is_none());
            assert!(!result.move_next());
            assert!(result.current().is_none());
        }
    }

    #[test]
    fn test_feed_entries_and_paging() {
        let model = model();
        let materializer = Materializer::new(&model, AnnotationStyle::Short);
        let body = r#"{"@count":2,"@nextLink":"People?$skip=2","value":[
            {"ID":1,"Name":"A","Cars":[]},
            {"ID":2,"Name":"B"}
        ]}"#;
        let mut result = materializer
            .materialize(&ODataResponse::new(200, body), PayloadKind::Feed, Some("NS.Person"))
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.total_count(), Some(2));
        assert_eq!(result.next_link(), Some("People?$skip=2"));

        assert!(result.move_next());
        let first = result.current().and_then(Materialized::as_entity).unwrap();
        assert_eq!(first.get("ID"), Some(&ODataValue::Int32(1)));
        assert!(first.get("Cars").is_none());
        assert!(result.move_next());
        assert!(!result.move_next());
    }

    #[test]
    fn test_property_and_raw_value() {
        let model = model();
        let materializer = Materializer::new(&model, AnnotationStyle::Short);
        let result = materializer
            .materialize(
                &ODataResponse::new(200, r#"{"value":"9223372036854775807"}"#),
                PayloadKind::Property,
                Some("Edm.Int64"),
            )
            .unwrap();
        assert_eq!(
            result.iter().next(),
            Some(&Materialized::Property(ODataValue::Int64(i64::MAX)))
        );

        let raw = materializer
            .materialize(&ODataResponse::new(200, "Bing"), PayloadKind::Value, None)
            .unwrap();
        assert_eq!(raw.into_iter().next(), Some(Materialized::Value("Bing".into())));
    }

    #[test]
    fn test_error_status_is_request_error() {
        let model = model();
        let materializer = Materializer::new(&model, AnnotationStyle::Short);
        let err = materializer
            .materialize(&ODataResponse::new(404, "not found"), PayloadKind::Entity, None)
            .unwrap_err();
        let request = err.as_request_error().unwrap();
        assert_eq!(request.inner.as_ref().map(|e| e.status_code), Some(404));
    }
}

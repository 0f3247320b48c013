//! Conversion between shell JSON and documents.
//!
//! Commands travel as plain JSON. Values JSON cannot express use the canonical
//! extended-JSON wrappers:
//!
//! - `{ "$oid": "67a74fcb2e6f3ba1884d7942" }` for object ids
//! - `{ "$date": "2025-05-02" }` or `{ "$date": "2025-05-02T10:00:00Z" }` for dates;
//!   a bare calendar date means midnight UTC, like `new Date("2025-05-02")`
//! - `{ "$numberLong": "254743423232" }` for explicit 64-bit integers
//!
//! Integers that fit in 32 bits become `Int32`, larger ones `Int64`, and
//! everything else `Double`.

use bson::{Bson, DateTime, Document, oid::ObjectId};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Converts a JSON value into a BSON value.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] for malformed `$oid`, `$date`
/// or `$numberLong` wrappers.
pub fn bson_from_json(value: Value) -> DocumentStoreResult<Bson> {
    Ok(match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(flag),
        Value::Number(number) => number_to_bson(&number),
        Value::String(text) => Bson::String(text),
        Value::Array(items) => Bson::Array(
            items
                .into_iter()
                .map(bson_from_json)
                .collect::<DocumentStoreResult<Vec<_>>>()?,
        ),
        Value::Object(map) => match extended_value(&map)? {
            Some(special) => special,
            None => Bson::Document(map_to_document(map)?),
        },
    })
}

/// Converts a JSON object into a document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if `value` is not an object.
pub fn document_from_json(value: Value) -> DocumentStoreResult<Document> {
    match value {
        Value::Object(map) => map_to_document(map),
        other => Err(DocumentStoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Converts a BSON value into JSON, using extended-JSON wrappers where needed.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(flag) => Value::Bool(*flag),
        Bson::Int32(v) => Value::from(*v),
        Bson::Int64(v) => Value::from(*v),
        Bson::Double(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(text) => Value::String(text.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(document) => document_to_json(document),
        Bson::ObjectId(oid) => wrapped("$oid", Value::String(oid.to_hex())),
        Bson::DateTime(date) => wrapped(
            "$date",
            Value::String(date.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)),
        ),
        other => Value::String(other.to_string()),
    }
}

/// Converts a document into a JSON object.
pub fn document_to_json(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), bson_to_json(value)))
            .collect(),
    )
}

fn map_to_document(map: Map<String, Value>) -> DocumentStoreResult<Document> {
    let mut document = Document::new();

    for (key, value) in map {
        document.insert(key, bson_from_json(value)?);
    }

    Ok(document)
}

fn wrapped(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn number_to_bson(number: &Number) -> Bson {
    match number.as_i64() {
        Some(v) => match i32::try_from(v) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(v),
        },
        None => Bson::Double(number.as_f64().unwrap_or(f64::NAN)),
    }
}

fn extended_value(map: &Map<String, Value>) -> DocumentStoreResult<Option<Bson>> {
    if map.len() != 1 {
        return Ok(None);
    }

    let Some((key, value)) = map.iter().next() else {
        return Ok(None);
    };

    match (key.as_str(), value) {
        ("$oid", Value::String(hex)) => ObjectId::parse_str(hex)
            .map(|oid| Some(Bson::ObjectId(oid)))
            .map_err(|err| DocumentStoreError::Serialization(format!("invalid $oid '{hex}': {err}"))),
        ("$date", Value::String(text)) => parse_date(text).map(|date| Some(Bson::DateTime(date))),
        ("$date", Value::Number(millis)) => millis
            .as_i64()
            .map(|millis| Some(Bson::DateTime(DateTime::from_millis(millis))))
            .ok_or_else(|| DocumentStoreError::Serialization(format!("invalid $date millis {millis}"))),
        ("$numberLong", Value::String(text)) => text
            .parse::<i64>()
            .map(|v| Some(Bson::Int64(v)))
            .map_err(|err| DocumentStoreError::Serialization(format!("invalid $numberLong '{text}': {err}"))),
        ("$oid" | "$date" | "$numberLong", other) => Err(DocumentStoreError::Serialization(format!(
            "malformed {key} value {other}"
        ))),
        _ => Ok(None),
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(text: &str) -> DocumentStoreResult<DateTime> {
    if let Ok(timestamp) = chrono::DateTime::parse_from_rfc3339(text) {
        return Ok(DateTime::from_chrono(timestamp.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| DateTime::from_chrono(midnight.and_utc()))
        .ok_or_else(|| DocumentStoreError::Serialization(format!("invalid $date '{text}'")))
}

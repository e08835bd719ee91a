use crate::collection::{Document, ObjectId};
use crate::common::{RegexValue, Value};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use chrono::DateTime;
use serde_json::{Map, Number};

const DATE_MARKER: &str = "$date";
const OID_MARKER: &str = "$oid";
const BINARY_MARKER: &str = "$binary";
const REGEX_MARKER: &str = "$regularExpression";

impl Value {
    /// Converts the value into extended JSON.
    ///
    /// Dates, object ids, binaries and regular expressions are written as
    /// single key marker objects. Non finite floats become `null` and
    /// predicates are written as the string `"[predicate]"`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I64(i) => serde_json::Value::Number(Number::from(*i)),
            Value::F64(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(bytes) => marker(
                BINARY_MARKER,
                serde_json::Value::Array(
                    bytes
                        .iter()
                        .map(|b| serde_json::Value::Number(Number::from(*b)))
                        .collect(),
                ),
            ),
            Value::Date(date) => marker(
                DATE_MARKER,
                serde_json::Value::Number(Number::from(date.timestamp_millis())),
            ),
            Value::ObjectId(id) => marker(OID_MARKER, serde_json::Value::String(id.to_hex())),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Value::Document(doc) => doc.to_json(),
            Value::Regex(regex) => {
                let mut inner = Map::new();
                inner.insert(
                    "pattern".to_string(),
                    serde_json::Value::String(regex.pattern().to_string()),
                );
                inner.insert(
                    "options".to_string(),
                    serde_json::Value::String(regex.flags().to_string()),
                );
                marker(REGEX_MARKER, serde_json::Value::Object(inner))
            }
            Value::Predicate(_) => serde_json::Value::String("[predicate]".to_string()),
        }
    }

    /// Builds a value from extended JSON. See [Value::to_json].
    pub fn from_json(json: serde_json::Value) -> LodestoneResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::I64(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::F64(f))
                } else {
                    log::error!("Unsupported JSON number {}", n);
                    Err(LodestoneError::new(
                        &format!("Unsupported JSON number {}", n),
                        ErrorKind::EncodingError,
                    ))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => {
                let values = items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<LodestoneResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        match key.as_str() {
                            DATE_MARKER => return date_from_json(inner),
                            OID_MARKER => return object_id_from_json(inner),
                            BINARY_MARKER => return binary_from_json(inner),
                            REGEX_MARKER => return regex_from_json(inner),
                            _ => {}
                        }
                    }
                }
                Ok(Value::Document(Document::from_json_map(map)?))
            }
        }
    }

    /// Parses a JSON text into a value.
    pub fn parse_json(text: &str) -> LodestoneResult<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Value::from_json(json)
    }
}

impl Document {
    /// Converts the document into an extended JSON object, keys in
    /// insertion order.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = Map::new();
        for (key, value) in self.iter() {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Builds a document from an extended JSON object.
    ///
    /// # Errors
    ///
    /// Returns an `EncodingError` if the JSON is not an object or a marker
    /// object inside it is malformed.
    pub fn from_json(json: serde_json::Value) -> LodestoneResult<Document> {
        match Value::from_json(json)? {
            Value::Document(doc) => Ok(doc),
            other => {
                log::error!("Expected a JSON object but found {}", other);
                Err(LodestoneError::new(
                    "Expected a JSON object",
                    ErrorKind::EncodingError,
                ))
            }
        }
    }

    /// Parses a JSON text into a document.
    pub fn parse_json(text: &str) -> LodestoneResult<Document> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Document::from_json(json)
    }

    fn from_json_map(map: Map<String, serde_json::Value>) -> LodestoneResult<Document> {
        let mut doc = Document::new();
        for (key, value) in map {
            doc.put(key, Value::from_json(value)?);
        }
        Ok(doc)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

fn marker(key: &str, value: serde_json::Value) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    serde_json::Value::Object(map)
}

fn malformed(marker: &str) -> LodestoneError {
    log::error!("Malformed {} marker in JSON", marker);
    LodestoneError::new(
        &format!("Malformed {} marker in JSON", marker),
        ErrorKind::EncodingError,
    )
}

fn date_from_json(inner: &serde_json::Value) -> LodestoneResult<Value> {
    inner
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .map(Value::Date)
        .ok_or_else(|| malformed(DATE_MARKER))
}

fn object_id_from_json(inner: &serde_json::Value) -> LodestoneResult<Value> {
    let hex = inner.as_str().ok_or_else(|| malformed(OID_MARKER))?;
    Ok(Value::ObjectId(ObjectId::parse(hex)?))
}

fn binary_from_json(inner: &serde_json::Value) -> LodestoneResult<Value> {
    let items = inner.as_array().ok_or_else(|| malformed(BINARY_MARKER))?;
    let mut bytes = Vec::with_capacity(items.len());
    for item in items {
        let byte = item
            .as_u64()
            .and_then(|b| u8::try_from(b).ok())
            .ok_or_else(|| malformed(BINARY_MARKER))?;
        bytes.push(byte);
    }
    Ok(Value::Binary(bytes))
}

fn regex_from_json(inner: &serde_json::Value) -> LodestoneResult<Value> {
    let pattern = inner
        .get("pattern")
        .and_then(|p| p.as_str())
        .ok_or_else(|| malformed(REGEX_MARKER))?;
    let options = inner.get("options").and_then(|o| o.as_str()).unwrap_or("");
    Ok(Value::Regex(RegexValue::new(pattern, options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{doc, val};
    use chrono::{TimeZone, Utc};

    #[test]
    fn markers_survive_conversion() {
        let id = ObjectId::from_bytes([7; 12]);
        let date = Utc.timestamp_millis_opt(1_500).unwrap();
        let doc = doc! {
            _id: id,
            at: date,
            raw: (Value::binary(vec![0, 255])),
            re: (Value::regex("^a", "i").unwrap()),
            nested: { list: [1, 2.5, "x", ()] },
        };

        let json = doc.to_json();
        assert_eq!(json["_id"]["$oid"], "070707070707070707070707");
        assert_eq!(json["at"]["$date"], 1_500);

        let back = Document::from_json(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn regex_operator_objects_stay_documents() {
        let selector = Document::parse_json(r#"{"a": {"$regex": "x", "$options": "i"}}"#).unwrap();
        let inner = selector.get("a").unwrap();
        assert!(inner.is_document());
    }

    #[test]
    fn key_order_is_preserved() {
        let doc = Document::parse_json(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn malformed_markers_are_errors() {
        let err = Value::parse_json(r#"{"$oid": 12}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
        let err = Value::parse_json(r#"{"$binary": [300]}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
        let err = Value::parse_json(r#"{"$oid": "zz"}"#).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidId);
    }

    #[test]
    fn non_object_is_not_a_document() {
        assert!(Document::parse_json("[1, 2]").is_err());
    }

    #[test]
    fn display_uses_json() {
        assert_eq!(val!(doc! { a: [1, "b"] }).to_string(), r#"{"a":[1,"b"]}"#);
        assert_eq!(val!(f64::INFINITY).to_string(), "null");
    }
}

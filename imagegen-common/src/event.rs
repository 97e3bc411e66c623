use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// A row image as carried by the change stream: attribute name to typed value.
pub type Item = HashMap<String, AttributeValue>;

/// Enumeration of reasons an incoming event cannot be processed.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("failed to parse event payload: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("event holds no record")]
    NoRecords,
    #[error("{0} event carries no new image")]
    MissingNewImage(EventType),
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("required field {field} must be a string but is {found}")]
    WrongFieldType {
        field: &'static str,
        found: &'static str,
    },
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
}

/// A single typed value in the change stream's wire format, e.g. `{"S": "hello"}`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    M(HashMap<String, AttributeValue>),
    L(Vec<AttributeValue>),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
    #[serde(rename = "BS")]
    BinarySet(Vec<String>),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(value) => Some(value),
            _ => None,
        }
    }

    /// The wire tag of this value, for error reporting.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null(_) => "NULL",
            AttributeValue::M(_) => "M",
            AttributeValue::L(_) => "L",
            AttributeValue::StringSet(_) => "SS",
            AttributeValue::NumberSet(_) => "NS",
            AttributeValue::BinarySet(_) => "BS",
        }
    }
}

/// Look up a string attribute that must be present and non-empty.
pub fn required_string<'a>(item: &'a Item, field: &'static str) -> Result<&'a str, EventError> {
    let value = item.get(field).ok_or(EventError::MissingField(field))?;
    let value = value.as_s().ok_or(EventError::WrongFieldType {
        field,
        found: value.type_name(),
    })?;

    if value.is_empty() {
        return Err(EventError::EmptyField(field));
    }

    Ok(value)
}

/// Kind of change a stream record describes.
/// `UPDATE` and `DELETE` are accepted as aliases of the stream's own names.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    #[serde(alias = "UPDATE")]
    Modify,
    #[serde(alias = "DELETE")]
    Remove,
    #[serde(other)]
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "INSERT",
            EventType::Modify => "MODIFY",
            EventType::Remove => "REMOVE",
            EventType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The envelope delivered by the change stream.
#[derive(Deserialize, Debug, Clone)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StreamRecord {
    #[serde(rename = "eventID", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventName")]
    pub event_name: EventType,
    #[serde(default)]
    pub dynamodb: StreamRecordData,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct StreamRecordData {
    #[serde(rename = "NewImage", default)]
    pub new_image: Option<Item>,
}

/// One change notification, as consumed by the pipeline.
#[derive(Clone, PartialEq)]
pub struct ChangeEvent {
    pub event_id: Option<String>,
    pub event_type: EventType,
    pub new_image: Option<Item>,
}

// Row images carry the interaction token, so only attribute names are printed.
impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let attributes = self.new_image.as_ref().map(|image| {
            let mut names: Vec<&str> = image.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        });

        f.debug_struct("ChangeEvent")
            .field("event_id", &self.event_id)
            .field("event_type", &self.event_type.as_str())
            .field("new_image", &attributes)
            .finish()
    }
}

impl ChangeEvent {
    pub fn new(event_type: EventType, new_image: Option<Item>) -> Self {
        Self {
            event_id: None,
            event_type,
            new_image,
        }
    }
}

impl From<StreamRecord> for ChangeEvent {
    fn from(record: StreamRecord) -> Self {
        Self {
            event_id: record.event_id,
            event_type: record.event_name,
            new_image: record.dynamodb.new_image,
        }
    }
}

impl StreamEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Invocations carry a single event: the first record is kept and any
    /// others are dropped with a warning.
    pub fn into_change_event(self) -> Result<ChangeEvent, EventError> {
        let count = self.records.len();
        let first = self.records.into_iter().next().ok_or(EventError::NoRecords)?;

        if count > 1 {
            warn!(
                records = count,
                "stream event holds more than one record, only the first is processed"
            );
        }

        Ok(first.into())
    }
}

/// The envelope delivered by the object store when an object is created.
#[derive(Deserialize, Debug, Clone)]
pub struct ObjectCreatedEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<ObjectCreatedRecord>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectCreatedRecord {
    pub s3: ObjectEntity,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectRef {
    pub key: String,
}

/// Location of a freshly created object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedObject {
    pub bucket: String,
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn from_slice(payload: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn into_created_object(self) -> Result<CreatedObject, EventError> {
        let count = self.records.len();
        let first = self.records.into_iter().next().ok_or(EventError::NoRecords)?;

        if count > 1 {
            warn!(
                records = count,
                "object event holds more than one record, only the first is processed"
            );
        }

        Ok(CreatedObject {
            bucket: first.s3.bucket.name,
            key: first.s3.object.key,
        })
    }
}

/// The response returned to the invoking transport.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    pub fn ignored() -> Self {
        Self {
            status_code: 200,
            body: "ignore".to_owned(),
        }
    }

    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: "ok".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream_payload(event_name: &str) -> serde_json::Value {
        json!({
            "Records": [{
                "eventID": "c4ca4238a0b923820dcc509a6f75849b",
                "eventName": event_name,
                "eventSource": "aws:dynamodb",
                "dynamodb": {
                    "Keys": {
                        "UserId": {"S": "u1"},
                        "PromptId": {"S": "p1"}
                    },
                    "NewImage": {
                        "UserId": {"S": "u1"},
                        "PromptId": {"S": "p1"},
                        "prompt": {"S": "a cat"},
                        "Favorite": {"BOOL": false},
                        "InteractionId": {"S": "i1"},
                        "InteractionToken": {"S": "t1"}
                    },
                    "StreamViewType": "NEW_IMAGE"
                }
            }]
        })
    }

    #[test]
    fn parses_insert_record() {
        let payload = serde_json::to_vec(&stream_payload("INSERT")).unwrap();
        let event = StreamEvent::from_slice(&payload)
            .unwrap()
            .into_change_event()
            .unwrap();

        assert_eq!(event.event_type, EventType::Insert);
        assert_eq!(
            event.event_id.as_deref(),
            Some("c4ca4238a0b923820dcc509a6f75849b")
        );

        let image = event.new_image.unwrap();
        assert_eq!(image.get("prompt"), Some(&AttributeValue::S("a cat".to_owned())));
        assert_eq!(image.get("Favorite"), Some(&AttributeValue::Bool(false)));
    }

    #[test]
    fn accepts_event_type_aliases() {
        for (name, expected) in [
            ("MODIFY", EventType::Modify),
            ("UPDATE", EventType::Modify),
            ("REMOVE", EventType::Remove),
            ("DELETE", EventType::Remove),
            ("TRUNCATE", EventType::Unknown),
        ] {
            let parsed: EventType = serde_json::from_value(json!(name)).unwrap();
            assert_eq!(parsed, expected, "{name}");
        }
    }

    #[test]
    fn debug_output_hides_attribute_values() {
        let payload = serde_json::to_vec(&stream_payload("INSERT")).unwrap();
        let event = StreamEvent::from_slice(&payload)
            .unwrap()
            .into_change_event()
            .unwrap();

        let printed = format!("{event:?}");

        assert!(printed.contains("InteractionToken"));
        assert!(printed.contains("INSERT"));
        assert!(!printed.contains("\"t1\""));
        assert!(!printed.contains("a cat"));
    }

    #[test]
    fn remove_record_has_no_image() {
        let payload = json!({
            "Records": [{
                "eventName": "REMOVE",
                "dynamodb": {"Keys": {"UserId": {"S": "u1"}, "PromptId": {"S": "p1"}}}
            }]
        });
        let event = StreamEvent::from_slice(&serde_json::to_vec(&payload).unwrap())
            .unwrap()
            .into_change_event()
            .unwrap();

        assert_eq!(event.event_type, EventType::Remove);
        assert!(event.new_image.is_none());
    }

    #[test]
    fn empty_records_is_an_error() {
        let event = StreamEvent::from_slice(br#"{"Records": []}"#).unwrap();
        assert!(matches!(
            event.into_change_event(),
            Err(EventError::NoRecords)
        ));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            StreamEvent::from_slice(b"not json"),
            Err(EventError::ParseError(_))
        ));
    }

    #[test]
    fn required_string_reports_each_failure() {
        let item: Item = HashMap::from([
            ("name".to_owned(), AttributeValue::S("value".to_owned())),
            ("count".to_owned(), AttributeValue::N("3".to_owned())),
            ("blank".to_owned(), AttributeValue::S(String::new())),
        ]);

        assert_eq!(required_string(&item, "name").unwrap(), "value");
        assert!(matches!(
            required_string(&item, "absent"),
            Err(EventError::MissingField("absent"))
        ));
        assert!(matches!(
            required_string(&item, "count"),
            Err(EventError::WrongFieldType {
                field: "count",
                found: "N"
            })
        ));
        assert!(matches!(
            required_string(&item, "blank"),
            Err(EventError::EmptyField("blank"))
        ));
    }

    #[test]
    fn parses_object_created_event() {
        let payload = json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "halfjourneybucket1234"},
                    "object": {"key": "public/u1/p1.png", "size": 1024}
                }
            }]
        });
        let object = ObjectCreatedEvent::from_slice(&serde_json::to_vec(&payload).unwrap())
            .unwrap()
            .into_created_object()
            .unwrap();

        assert_eq!(
            object,
            CreatedObject {
                bucket: "halfjourneybucket1234".to_owned(),
                key: "public/u1/p1.png".to_owned(),
            }
        );
    }

    #[test]
    fn invocation_response_uses_camel_case() {
        let body = serde_json::to_value(InvocationResponse::ignored()).unwrap();
        assert_eq!(body, json!({"statusCode": 200, "body": "ignore"}));
    }
}

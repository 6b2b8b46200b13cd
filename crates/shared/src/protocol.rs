use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{CommandId, EntityId, ParticipantId},
    error::ProtocolError,
};

pub const DEFAULT_FOLLOW_ME_CHANNEL: &str = "follow-me";

/// Complete followable state of one moderator, carried as the body of a
/// named broadcast command. Unset properties are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowMeCommand {
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub panel_visible: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_entity_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub focused_entity_id: Option<EntityId>,
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub shared_artifact_visible: Option<bool>,
}

/// Result of decoding a payload field by field. A field that fails to decode
/// is left unset and reported in `rejected`.
#[derive(Debug, Default)]
pub struct DecodedCommand {
    pub command: FollowMeCommand,
    pub rejected: Vec<ProtocolError>,
}

impl FollowMeCommand {
    /// Only a payload that is not a JSON object is rejected as a whole.
    pub fn from_value(value: &Value) -> Result<DecodedCommand, ProtocolError> {
        let Value::Object(object) = value else {
            return Err(ProtocolError::NotAnObject {
                kind: json_kind(value),
            });
        };

        let mut rejected = Vec::new();
        let command = Self {
            panel_visible: decode_field(
                object,
                "panelVisible",
                lenient_bool_field,
                &mut rejected,
            ),
            focused_entity_id: decode_field(
                object,
                "focusedEntityId",
                entity_id_field,
                &mut rejected,
            ),
            shared_artifact_visible: decode_field(
                object,
                "sharedArtifactVisible",
                lenient_bool_field,
                &mut rejected,
            ),
        };
        Ok(DecodedCommand { command, rejected })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()))
    }
}

/// One delivery of a named command, as seen by a single subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDelivery {
    pub command_id: CommandId,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<ParticipantId>,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

/// Normalizes the textual form of a boolean. The transport may stringify
/// attribute values, so `"true"` and `true` mean the same thing.
pub fn parse_lenient_bool(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrText {
    Bool(bool),
    Text(String),
}

fn deserialize_lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BoolOrText>::deserialize(deserializer)?;
    Ok(match raw {
        Some(BoolOrText::Bool(value)) => Some(value),
        Some(BoolOrText::Text(text)) => parse_lenient_bool(&text),
        None => None,
    })
}

fn deserialize_entity_id<'de, D>(deserializer: D) -> Result<Option<EntityId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|value| !value.trim().is_empty())
        .map(EntityId))
}

fn lenient_bool_field(value: &Value) -> Result<Option<bool>, serde_json::Error> {
    deserialize_lenient_bool(value)
}

fn entity_id_field(value: &Value) -> Result<Option<EntityId>, serde_json::Error> {
    deserialize_entity_id(value)
}

fn decode_field<T>(
    object: &Map<String, Value>,
    field: &'static str,
    decode: fn(&Value) -> Result<Option<T>, serde_json::Error>,
    rejected: &mut Vec<ProtocolError>,
) -> Option<T> {
    let value = object.get(field)?;
    match decode(value) {
        Ok(decoded) => decoded,
        Err(source) => {
            rejected.push(ProtocolError::InvalidField { field, source });
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value};

use super::window::Window;
use crate::timestamp;

/// Key every outgoing envelope carries so the parent can tell embeds apart.
pub const IDENTITY_KEY: &str = "warcEmbedHref";

pub const CMD_UPDATE_URL: &str = "updateUrl";
pub const CMD_UPDATE_TS: &str = "updateTs";
pub const CMD_GET_INITED: &str = "getInited";
pub const CMD_GET_COLL_INFO: &str = "getCollInfo";
pub const CMD_OVERRIDE_ELEMENT_ATTRIBUTE: &str = "overrideElementAttribute";

pub const STATUS_TIMED_OUT: &str = "timed out";

/// An inbound `message` event as seen by the embed page.
pub struct MessageEvent {
    pub source: Option<Rc<dyn Window>>,
    pub origin: String,
    pub data: Value,
}

impl MessageEvent {
    pub fn new(source: Rc<dyn Window>, origin: impl Into<String>, data: Value) -> Self {
        Self {
            source: Some(source),
            origin: origin.into(),
            data,
        }
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("source", &self.source.as_ref().map(|source| source.id()))
            .field("origin", &self.origin)
            .field("data", &self.data)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub selector: String,
    pub attribute_name: String,
    pub attribute_contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UpdateUrl(String),
    /// Already normalized to `YYYYMMDDHHMMSS` where applicable.
    UpdateTs(String),
    GetInited,
    GetCollInfo,
    OverrideElementAttribute {
        request: OverrideRequest,
        /// The payload exactly as received, echoed back on failure.
        raw: Value,
    },
}

/// JavaScript truthiness, which decides whether a command key is "present".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text an attribute ends up holding when `value` is assigned to it.
pub fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Extract the recognized commands of a parent message, in processing order.
/// Unknown keys are ignored; a malformed override request is logged and
/// skipped.
pub fn parse_commands(data: &Value) -> Vec<Command> {
    let Some(fields) = data.as_object() else {
        return Vec::new();
    };
    let present = |key: &str| fields.get(key).filter(|value| is_truthy(value));

    let mut commands = Vec::new();
    if let Some(url) = present(CMD_UPDATE_URL) {
        commands.push(Command::UpdateUrl(attribute_text(url)));
    }
    if let Some(ts) = present(CMD_UPDATE_TS) {
        commands.push(Command::UpdateTs(timestamp::normalize_value(ts)));
    }
    if present(CMD_GET_INITED).is_some() {
        commands.push(Command::GetInited);
    }
    if present(CMD_GET_COLL_INFO).is_some() {
        commands.push(Command::GetCollInfo);
    }
    if let Some(raw) = present(CMD_OVERRIDE_ELEMENT_ATTRIBUTE) {
        match serde_json::from_value::<OverrideRequest>(raw.clone()) {
            Ok(request) => commands.push(Command::OverrideElementAttribute {
                request,
                raw: raw.clone(),
            }),
            Err(err) => {
                tracing::warn!(
                    target = "relay",
                    error = %err,
                    "ignoring malformed overrideElementAttribute request"
                );
            }
        }
    }
    commands
}

fn with_identity(mut fields: JsonMap<String, Value>, identity: &str) -> Value {
    fields.insert(IDENTITY_KEY.to_string(), Value::String(identity.to_string()));
    Value::Object(fields)
}

/// A widget message re-addressed to the parent. Object payloads keep all of
/// their fields; the identity always wins over a field of the same name.
pub fn forward_envelope(data: &Value, identity: &str) -> Value {
    let fields = data.as_object().cloned().unwrap_or_default();
    with_identity(fields, identity)
}

pub fn inited_reply(inited: bool, identity: &str) -> Value {
    let mut fields = JsonMap::new();
    fields.insert("inited".into(), Value::Bool(inited));
    with_identity(fields, identity)
}

pub fn coll_info_reply(coll_info: Value, identity: &str) -> Value {
    let mut fields = JsonMap::new();
    fields.insert("collInfo".into(), coll_info);
    with_identity(fields, identity)
}

pub fn override_timeout_reply(raw_request: &Value, identity: &str) -> Value {
    let mut status = JsonMap::new();
    status.insert("status".into(), json!(STATUS_TIMED_OUT));
    status.insert("request".into(), raw_request.clone());
    let mut envelope = JsonMap::new();
    envelope.insert(
        CMD_OVERRIDE_ELEMENT_ATTRIBUTE.to_string(),
        with_identity(status, identity),
    );
    Value::Object(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HREF: &str = "https://embed.example/?source=a.wacz";

    #[test]
    fn truthiness_matches_javascript() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn parses_known_commands_in_fixed_order() {
        let commands = parse_commands(&json!({
            "getCollInfo": true,
            "updateTs": 0,
            "somethingElse": 1,
            "updateUrl": "https://example.com/",
            "getInited": 1,
        }));
        assert_eq!(
            commands,
            vec![
                Command::UpdateUrl("https://example.com/".into()),
                Command::GetInited,
                Command::GetCollInfo,
            ]
        );
    }

    #[test]
    fn update_ts_is_normalized() {
        let commands = parse_commands(&json!({"updateTs": 1700000000000u64}));
        assert_eq!(commands, vec![Command::UpdateTs("20231114221320".into())]);
    }

    #[test]
    fn malformed_override_is_skipped() {
        assert!(parse_commands(&json!({"overrideElementAttribute": {"selector": "a"}})).is_empty());
        assert!(parse_commands(&json!("getInited")).is_empty());

        let raw = json!({
            "selector": "a",
            "attributeName": "href",
            "attributeContents": "/x",
            "note": "kept verbatim",
        });
        let commands = parse_commands(&json!({"overrideElementAttribute": raw.clone()}));
        assert_eq!(
            commands,
            vec![Command::OverrideElementAttribute {
                request: OverrideRequest {
                    selector: "a".into(),
                    attribute_name: "href".into(),
                    attribute_contents: "/x".into(),
                },
                raw,
            }]
        );
    }

    #[test]
    fn identity_cannot_be_spoofed_by_forwarded_payload() {
        let forwarded = forward_envelope(&json!({"warcEmbedHref": "evil", "type": "ready"}), HREF);
        assert_eq!(forwarded, json!({"warcEmbedHref": HREF, "type": "ready"}));
        assert_eq!(forward_envelope(&json!("text"), HREF), json!({"warcEmbedHref": HREF}));
    }

    #[test]
    fn timeout_reply_shape() {
        let raw = json!({"selector": "a", "attributeName": "b", "attributeContents": "c"});
        assert_eq!(
            override_timeout_reply(&raw, HREF),
            json!({"overrideElementAttribute": {
                "status": "timed out",
                "request": raw,
                "warcEmbedHref": HREF,
            }})
        );
    }
}

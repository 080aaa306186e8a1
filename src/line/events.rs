use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ConciergeBotError, Result};

/// Normalized inbound event consumed by the dialogue layer. Everything else
/// in the webhook payload (joins, unsends, stickers) is ignored.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text {
        user_id: String,
        reply_token: String,
        text: String,
    },
    Postback {
        user_id: String,
        reply_token: String,
        action: String,
        args: HashMap<String, String>,
        picked_datetime: Option<String>,
    },
}

#[derive(Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "replyToken")]
    reply_token: Option<String>,
    source: Option<EventSource>,
    message: Option<InboundMessage>,
    postback: Option<InboundPostback>,
}

#[derive(Deserialize)]
struct EventSource {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct InboundMessage {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct InboundPostback {
    data: Option<String>,
    params: Option<PostbackParams>,
}

#[derive(Deserialize)]
struct PostbackParams {
    datetime: Option<String>,
}

pub fn parse_webhook(body: &[u8]) -> Result<Vec<InboundEvent>> {
    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| ConciergeBotError::Serialization(e.to_string()))?;

    let mut events = Vec::new();
    for event in payload.events {
        let Some(user_id) = event.source.and_then(|source| source.user_id) else {
            continue;
        };
        let Some(reply_token) = event.reply_token else {
            continue;
        };

        match event.kind.as_str() {
            "message" => {
                let Some(message) = event.message else {
                    continue;
                };
                if message.kind != "text" {
                    continue;
                }
                let Some(text) = message.text else {
                    continue;
                };
                events.push(InboundEvent::Text {
                    user_id,
                    reply_token,
                    text,
                });
            }
            "postback" => {
                let Some(postback) = event.postback else {
                    continue;
                };
                let (action, args) = parse_postback_data(postback.data.as_deref().unwrap_or(""));
                if action.is_empty() {
                    continue;
                }
                let picked_datetime = postback.params.and_then(|params| params.datetime);
                events.push(InboundEvent::Postback {
                    user_id,
                    reply_token,
                    action,
                    args,
                    picked_datetime,
                });
            }
            _ => {}
        }
    }
    Ok(events)
}

/// Splits query-string style postback data (`action=delete_note&id=3`) into
/// the action name and its remaining arguments.
pub fn parse_postback_data(data: &str) -> (String, HashMap<String, String>) {
    let mut action = String::new();
    let mut args = HashMap::new();
    for pair in data.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or("");
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        if key == "action" {
            action = value;
        } else {
            args.insert(key.to_string(), value);
        }
    }
    (action, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_and_postback_events() {
        let body = br#"{
            "events": [
                {
                    "type": "message",
                    "replyToken": "rt-1",
                    "source": {"userId": "U1"},
                    "message": {"type": "text", "text": "hello"}
                },
                {
                    "type": "postback",
                    "replyToken": "rt-2",
                    "source": {"userId": "U1"},
                    "postback": {
                        "data": "action=schedule_time_select",
                        "params": {"datetime": "2024-05-01T09:30"}
                    }
                }
            ]
        }"#;

        let events = parse_webhook(body).unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            InboundEvent::Text { user_id, text, .. } => {
                assert_eq!(user_id, "U1");
                assert_eq!(text, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[1] {
            InboundEvent::Postback {
                action,
                picked_datetime,
                ..
            } => {
                assert_eq!(action, "schedule_time_select");
                assert_eq!(picked_datetime.as_deref(), Some("2024-05-01T09:30"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn skips_non_text_messages() {
        let body = br#"{
            "events": [
                {
                    "type": "message",
                    "replyToken": "rt-1",
                    "source": {"userId": "U1"},
                    "message": {"type": "sticker"}
                }
            ]
        }"#;
        let events = parse_webhook(body).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn decodes_postback_args() {
        let (action, args) = parse_postback_data("action=delete_note&id=42");
        assert_eq!(action, "delete_note");
        assert_eq!(args.get("id").map(String::as_str), Some("42"));
    }
}

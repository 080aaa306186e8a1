use serde_json::{json, Value};

use crate::store::{NoteItem, ReminderItem, ScheduleItem};

/// Outbound message shapes the bot produces. Rendered to the platform's JSON
/// wire format just before sending.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Text(String),
    DatetimePicker {
        title: String,
        text: String,
        label: String,
        data: String,
    },
    FlexCarousel {
        alt_text: String,
        bubbles: Vec<Value>,
    },
}

impl OutboundMessage {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => json!({"type": "text", "text": text}),
            Self::DatetimePicker {
                title,
                text,
                label,
                data,
            } => json!({
                "type": "template",
                "altText": title,
                "template": {
                    "type": "buttons",
                    "title": title,
                    "text": text,
                    "actions": [{
                        "type": "datetimepicker",
                        "label": label,
                        "data": data,
                        "mode": "datetime"
                    }]
                }
            }),
            Self::FlexCarousel { alt_text, bubbles } => json!({
                "type": "flex",
                "altText": alt_text,
                "contents": {"type": "carousel", "contents": bubbles}
            }),
        }
    }
}

pub fn note_bubble(note: &NoteItem) -> Value {
    json!({
        "type": "bubble",
        "size": "kilo",
        "body": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": format!("Note #{}", note.id), "weight": "bold", "size": "xl"},
                {"type": "text", "text": note.content, "wrap": true, "size": "md", "margin": "md"},
                {"type": "text", "text": note.created_at, "size": "xs", "color": "#aaaaaa", "margin": "md"},
                {
                    "type": "box",
                    "layout": "horizontal",
                    "margin": "md",
                    "contents": [delete_button("delete_note", note.id)]
                }
            ]
        }
    })
}

pub fn schedule_bubble(schedule: &ScheduleItem) -> Value {
    json!({
        "type": "bubble",
        "size": "kilo",
        "header": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": format!("Schedule #{}", schedule.id), "weight": "bold", "size": "xl"},
                {"type": "text", "text": schedule.title, "size": "lg", "wrap": true}
            ]
        },
        "body": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": schedule.description, "wrap": true},
                {"type": "text", "text": format!("Time: {}", schedule.scheduled_time), "size": "sm"}
            ]
        },
        "footer": {
            "type": "box",
            "layout": "horizontal",
            "spacing": "sm",
            "contents": [
                delete_button("delete_schedule", schedule.id),
                postback_button("Add to calendar", format!("action=add_to_calendar&id={}", schedule.id))
            ]
        }
    })
}

pub fn reminder_bubble(reminder: &ReminderItem) -> Value {
    json!({
        "type": "bubble",
        "size": "kilo",
        "header": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": format!("Reminder #{}", reminder.id), "weight": "bold", "size": "xl"}
            ]
        },
        "body": {
            "type": "box",
            "layout": "vertical",
            "contents": [
                {"type": "text", "text": reminder.content, "wrap": true},
                {"type": "text", "text": format!("Remind at: {}", reminder.remind_time), "size": "sm"}
            ]
        },
        "footer": {
            "type": "box",
            "layout": "horizontal",
            "spacing": "sm",
            "contents": [delete_button("delete_reminder", reminder.id)]
        }
    })
}

fn delete_button(action: &str, id: i32) -> Value {
    postback_button("Delete", format!("action={action}&id={id}"))
}

fn postback_button(label: &str, data: String) -> Value {
    json!({
        "type": "button",
        "style": "link",
        "height": "sm",
        "action": {
            "type": "postback",
            "label": label,
            "data": data
        }
    })
}

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::calendar;
use crate::clock::{self, CivilClock};
use crate::error::{ConciergeBotError, Result};
use crate::line::messages::{note_bubble, reminder_bubble, schedule_bubble, OutboundMessage};
use crate::store::{BotStore, UserStateRecord};

/// Lead-time offsets a schedule flow may choose from, in minutes.
pub const LEAD_TIME_CHOICES: [i64; 7] = [5, 10, 15, 30, 60, 120, 1440];
pub const DEFAULT_LEAD_MINUTES: i64 = 5;

const RESTART_MESSAGE: &str = "Something went wrong with that flow. Please start over from the menu.";
const PERSIST_FAILURE_MESSAGE: &str = "Sorry, saving failed. Please try again.";

/// One step of a multi-turn entry flow, tagged per flow type with the fields
/// accumulated so far. Persisted per user; absence means idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum FlowState {
    NoteAwaitingContent,
    ScheduleAwaitingTime,
    ScheduleAwaitingTitle {
        selected_time: String,
    },
    ScheduleAwaitingDescription {
        selected_time: String,
        title: String,
    },
    ScheduleAwaitingLeadTime {
        selected_time: String,
        title: String,
        description: String,
    },
    ReminderAwaitingTime,
    ReminderAwaitingContent {
        selected_time: String,
    },
}

impl FlowState {
    pub fn to_record(&self) -> Result<UserStateRecord> {
        let value =
            serde_json::to_value(self).map_err(|e| ConciergeBotError::Serialization(e.to_string()))?;
        let state = value
            .get("state")
            .and_then(|tag| tag.as_str())
            .ok_or_else(|| ConciergeBotError::Serialization("missing state tag".to_string()))?
            .to_string();
        let data = value.get("data").map(|payload| payload.to_string());
        Ok(UserStateRecord { state, data })
    }

    /// A record whose payload no longer matches its tag (stale rows, missing
    /// prerequisite fields) fails here; callers treat that as
    /// [`ConciergeBotError::InvalidFlowState`].
    pub fn from_record(record: &UserStateRecord) -> Result<Self> {
        let mut value = json!({ "state": record.state });
        if let Some(data) = &record.data {
            let payload: serde_json::Value = serde_json::from_str(data)
                .map_err(|e| ConciergeBotError::InvalidFlowState(e.to_string()))?;
            value["data"] = payload;
        }
        serde_json::from_value(value)
            .map_err(|e| ConciergeBotError::InvalidFlowState(e.to_string()))
    }
}

/// Result of offering free text to the state machine.
#[derive(Debug)]
pub enum TextOutcome {
    /// The text belonged to an active flow; these replies answer it.
    Replies(Vec<OutboundMessage>),
    /// No flow is active; the text is ordinary conversation for the chat
    /// provider.
    PassThrough,
}

/// Drives per-user dialogue flows: each inbound turn fills the next missing
/// field, the final turn performs exactly one persistence write.
pub struct DialogueEngine {
    store: Arc<BotStore>,
    clock: CivilClock,
    /// Externally reachable base URL for event-file downloads. Without it the
    /// calendar reply carries the Google link only.
    public_base: Option<String>,
}

impl DialogueEngine {
    pub fn new(store: Arc<BotStore>, clock: CivilClock, public_base: Option<String>) -> Self {
        Self {
            store,
            clock,
            public_base,
        }
    }

    pub async fn handle_text(&self, user_id: &str, text: &str) -> Result<TextOutcome> {
        let Some(record) = self.store.get_user_state(user_id).await? else {
            return Ok(TextOutcome::PassThrough);
        };

        let state = match FlowState::from_record(&record) {
            Ok(state) => state,
            Err(_) => {
                self.store.clear_user_state(user_id).await?;
                return Ok(TextOutcome::Replies(vec![OutboundMessage::text(
                    RESTART_MESSAGE,
                )]));
            }
        };

        let replies = match state {
            FlowState::NoteAwaitingContent => self.finish_note(user_id, text).await?,
            FlowState::ScheduleAwaitingTime => {
                // The time step only accepts a structured picker value.
                vec![schedule_time_picker()]
            }
            FlowState::ReminderAwaitingTime => vec![reminder_time_picker()],
            FlowState::ScheduleAwaitingTitle { selected_time } => {
                self.advance(
                    user_id,
                    FlowState::ScheduleAwaitingDescription {
                        selected_time,
                        title: text.to_string(),
                    },
                    "Please enter the schedule description:",
                )
                .await?
            }
            FlowState::ScheduleAwaitingDescription {
                selected_time,
                title,
            } => {
                self.advance(
                    user_id,
                    FlowState::ScheduleAwaitingLeadTime {
                        selected_time,
                        title,
                        description: text.to_string(),
                    },
                    "How many minutes before should I remind you? (5, 10, 15, 30, 60, 120 or 1440)",
                )
                .await?
            }
            FlowState::ScheduleAwaitingLeadTime {
                selected_time,
                title,
                description,
            } => {
                let lead = select_lead_minutes(text);
                self.finish_schedule(user_id, &selected_time, &title, &description, lead)
                    .await?
            }
            FlowState::ReminderAwaitingContent { selected_time } => {
                self.finish_reminder(user_id, &selected_time, text).await?
            }
        };
        Ok(TextOutcome::Replies(replies))
    }

    pub async fn handle_postback(
        &self,
        user_id: &str,
        action: &str,
        args: &HashMap<String, String>,
        picked_datetime: Option<&str>,
    ) -> Result<Vec<OutboundMessage>> {
        match action {
            "note" => {
                self.start_flow(user_id, FlowState::NoteAwaitingContent)
                    .await?;
                Ok(vec![OutboundMessage::text("Please enter the note content:")])
            }
            "schedule" => {
                self.start_flow(user_id, FlowState::ScheduleAwaitingTime)
                    .await?;
                Ok(vec![schedule_time_picker()])
            }
            "reminder" => {
                self.start_flow(user_id, FlowState::ReminderAwaitingTime)
                    .await?;
                Ok(vec![reminder_time_picker()])
            }
            "schedule_time_select" => {
                self.accept_time_pick(user_id, picked_datetime, |selected_time| {
                    FlowState::ScheduleAwaitingTitle { selected_time }
                })
                .await
                .map(|accepted| match accepted {
                    Some(_) => vec![OutboundMessage::text("Please enter the schedule title:")],
                    None => vec![OutboundMessage::text(
                        "Time selection failed. Please pick a time again.",
                    )],
                })
            }
            "reminder_time_select" => {
                self.accept_time_pick(user_id, picked_datetime, |selected_time| {
                    FlowState::ReminderAwaitingContent { selected_time }
                })
                .await
                .map(|accepted| match accepted {
                    Some(_) => vec![OutboundMessage::text("Please enter the reminder content:")],
                    None => vec![OutboundMessage::text(
                        "Time selection failed. Please pick a time again.",
                    )],
                })
            }
            "view_notes" => self.view_notes(user_id).await,
            "view_schedules" => self.view_schedules(user_id).await,
            "view_reminders" => self.view_reminders(user_id).await,
            "delete_note" => {
                let deleted = match parse_id(args) {
                    Some(id) => self.store.delete_note(user_id, id).await?,
                    None => false,
                };
                Ok(vec![OutboundMessage::text(if deleted {
                    "Note deleted."
                } else {
                    "Could not find that note."
                })])
            }
            "delete_schedule" => {
                let deleted = match parse_id(args) {
                    Some(id) => self.store.delete_schedule(user_id, id).await?,
                    None => false,
                };
                Ok(vec![OutboundMessage::text(if deleted {
                    "Schedule deleted."
                } else {
                    "Could not find that schedule."
                })])
            }
            "add_to_calendar" => self.calendar_links(user_id, parse_id(args)).await,
            "delete_reminder" => {
                let deleted = match parse_id(args) {
                    Some(id) => self.store.delete_reminder(user_id, id).await?,
                    None => false,
                };
                Ok(vec![OutboundMessage::text(if deleted {
                    "Reminder deleted."
                } else {
                    "Could not find that reminder."
                })])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn calendar_links(
        &self,
        user_id: &str,
        id: Option<i32>,
    ) -> Result<Vec<OutboundMessage>> {
        let schedule = match id {
            Some(id) => self.store.get_schedule(id).await?,
            None => None,
        };
        let Some(schedule) = schedule.filter(|schedule| schedule.user_id == user_id) else {
            return Ok(vec![OutboundMessage::text("Could not find that schedule.")]);
        };

        let google_url = calendar::google_calendar_url(&schedule, &self.clock)?;
        let mut message = String::from("Add this event to your calendar:\n");
        if let Some(base) = &self.public_base {
            message.push_str(&format!(
                "\niPhone/Mac calendar:\n{}{}\n",
                base.trim_end_matches('/'),
                calendar::ics_download_path(schedule.id)
            ));
        }
        message.push_str(&format!("\nGoogle Calendar:\n{google_url}"));
        Ok(vec![OutboundMessage::text(message)])
    }

    /// Deliberate overwrite: any unfinished flow for the user is discarded.
    async fn start_flow(&self, user_id: &str, state: FlowState) -> Result<()> {
        let record = state.to_record()?;
        self.store.set_user_state(user_id, &record).await
    }

    async fn accept_time_pick(
        &self,
        user_id: &str,
        picked_datetime: Option<&str>,
        next: impl FnOnce(String) -> FlowState,
    ) -> Result<Option<String>> {
        let Some(raw) = picked_datetime else {
            return Ok(None);
        };
        let Ok(selected_time) = clock::normalize_datetime(raw) else {
            return Ok(None);
        };
        self.start_flow(user_id, next(selected_time.clone())).await?;
        Ok(Some(selected_time))
    }

    async fn advance(
        &self,
        user_id: &str,
        state: FlowState,
        prompt: &str,
    ) -> Result<Vec<OutboundMessage>> {
        match self.start_flow(user_id, state).await {
            Ok(()) => Ok(vec![OutboundMessage::text(prompt)]),
            Err(_) => {
                let _ = self.store.clear_user_state(user_id).await;
                Ok(vec![OutboundMessage::text(PERSIST_FAILURE_MESSAGE)])
            }
        }
    }

    async fn finish_note(&self, user_id: &str, content: &str) -> Result<Vec<OutboundMessage>> {
        let result = self.store.create_note(user_id, content).await;
        self.store.clear_user_state(user_id).await?;
        Ok(vec![OutboundMessage::text(match result {
            Ok(_) => "Note saved!".to_string(),
            Err(_) => PERSIST_FAILURE_MESSAGE.to_string(),
        })])
    }

    async fn finish_schedule(
        &self,
        user_id: &str,
        selected_time: &str,
        title: &str,
        description: &str,
        lead_minutes: i64,
    ) -> Result<Vec<OutboundMessage>> {
        let result = self
            .store
            .create_schedule(user_id, title, description, selected_time, lead_minutes)
            .await;
        // State is cleared whether or not the write succeeded, so a failed
        // write never leaves the user stuck mid-flow.
        self.store.clear_user_state(user_id).await?;
        Ok(vec![OutboundMessage::text(match result {
            Ok(schedule) => format!(
                "Schedule added: {}\n{}\nTime: {}\nReminder: {} minutes before",
                schedule.title, schedule.description, schedule.scheduled_time, schedule.remind_before
            ),
            Err(_) => PERSIST_FAILURE_MESSAGE.to_string(),
        })])
    }

    async fn finish_reminder(
        &self,
        user_id: &str,
        selected_time: &str,
        content: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let result = self
            .store
            .create_reminder(user_id, content, selected_time)
            .await;
        self.store.clear_user_state(user_id).await?;
        Ok(vec![OutboundMessage::text(match result {
            Ok(reminder) => format!(
                "Reminder added: {}\nRemind at: {}",
                reminder.content, reminder.remind_time
            ),
            Err(_) => PERSIST_FAILURE_MESSAGE.to_string(),
        })])
    }

    async fn view_notes(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let notes = self.store.list_notes(user_id).await?;
        if notes.is_empty() {
            return Ok(vec![OutboundMessage::text("No notes yet.")]);
        }
        Ok(vec![OutboundMessage::FlexCarousel {
            alt_text: "Your notes".to_string(),
            bubbles: notes.iter().map(note_bubble).collect(),
        }])
    }

    async fn view_schedules(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let schedules = self.store.list_schedules(user_id).await?;
        if schedules.is_empty() {
            return Ok(vec![OutboundMessage::text("No schedules yet.")]);
        }
        Ok(vec![OutboundMessage::FlexCarousel {
            alt_text: "Your schedules".to_string(),
            bubbles: schedules.iter().map(schedule_bubble).collect(),
        }])
    }

    async fn view_reminders(&self, user_id: &str) -> Result<Vec<OutboundMessage>> {
        let reminders = self
            .store
            .list_upcoming_reminders(user_id, self.clock.now())
            .await?;
        if reminders.is_empty() {
            return Ok(vec![OutboundMessage::text("No upcoming reminders.")]);
        }
        Ok(vec![OutboundMessage::FlexCarousel {
            alt_text: "Your reminders".to_string(),
            bubbles: reminders.iter().map(reminder_bubble).collect(),
        }])
    }
}

/// Unlisted values fall back to the 5-minute default rather than erroring.
pub fn select_lead_minutes(input: &str) -> i64 {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|minutes| LEAD_TIME_CHOICES.contains(minutes))
        .unwrap_or(DEFAULT_LEAD_MINUTES)
}

fn parse_id(args: &HashMap<String, String>) -> Option<i32> {
    args.get("id").and_then(|raw| raw.parse().ok())
}

fn schedule_time_picker() -> OutboundMessage {
    OutboundMessage::DatetimePicker {
        title: "New schedule".to_string(),
        text: "Please pick the schedule time".to_string(),
        label: "Pick a time".to_string(),
        data: "action=schedule_time_select".to_string(),
    }
}

fn reminder_time_picker() -> OutboundMessage {
    OutboundMessage::DatetimePicker {
        title: "New reminder".to_string(),
        text: "Please pick the reminder time".to_string(),
        label: "Pick a time".to_string(),
        data: "action=reminder_time_select".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_time_accepts_listed_values() {
        assert_eq!(select_lead_minutes("30"), 30);
        assert_eq!(select_lead_minutes(" 1440 "), 1440);
    }

    #[test]
    fn lead_time_falls_back_to_default() {
        assert_eq!(select_lead_minutes("7"), DEFAULT_LEAD_MINUTES);
        assert_eq!(select_lead_minutes("soon"), DEFAULT_LEAD_MINUTES);
        assert_eq!(select_lead_minutes(""), DEFAULT_LEAD_MINUTES);
    }

    #[test]
    fn state_round_trips_through_record() {
        let state = FlowState::ScheduleAwaitingDescription {
            selected_time: "2024-05-01 09:30:00".to_string(),
            title: "dentist".to_string(),
        };
        let record = state.to_record().unwrap();
        assert_eq!(record.state, "schedule_awaiting_description");
        assert_eq!(FlowState::from_record(&record).unwrap(), state);
    }

    #[test]
    fn unit_state_has_no_payload() {
        let record = FlowState::ScheduleAwaitingTime.to_record().unwrap();
        assert_eq!(record.state, "schedule_awaiting_time");
        assert!(record.data.is_none());
    }

    #[test]
    fn missing_prerequisite_field_is_invalid() {
        let record = UserStateRecord {
            state: "schedule_awaiting_description".to_string(),
            data: Some(r#"{"title": "dentist"}"#.to_string()),
        };
        let err = FlowState::from_record(&record).unwrap_err();
        assert!(matches!(err, ConciergeBotError::InvalidFlowState(_)));
    }

    #[test]
    fn corrupt_payload_is_invalid() {
        let record = UserStateRecord {
            state: "reminder_awaiting_content".to_string(),
            data: Some("not json".to_string()),
        };
        assert!(FlowState::from_record(&record).is_err());
    }
}

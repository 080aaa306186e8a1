use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::{self, CivilClock};
use crate::error::Result;
use crate::interfaces::messaging::MessagingGateway;
use crate::interfaces::scheduler::ScheduledJob;
use crate::store::{BotStore, ReminderItem, ScheduleItem};

/// Background scan for due, undelivered schedules and reminders. Each due row
/// gets one push; the delivered flag is flipped only after a successful send,
/// so failed sends are retried on the next tick. A send that succeeds while
/// the flag write fails is redelivered; that duplicate is the accepted
/// failure mode.
pub struct ReminderPollJob {
    store: Arc<BotStore>,
    gateway: Arc<dyn MessagingGateway>,
    clock: CivilClock,
    interval: Duration,
}

impl ReminderPollJob {
    pub fn new(
        store: Arc<BotStore>,
        gateway: Arc<dyn MessagingGateway>,
        clock: CivilClock,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            interval,
        }
    }

    /// One tick over schedules. Delivery failures leave the row undelivered
    /// and never stop the remaining rows.
    async fn poll_schedules(&self, now: time::PrimitiveDateTime) -> Result<()> {
        let due = self.store.list_due_schedules(now).await?;
        for schedule in due {
            let message = format_schedule_message(&schedule);
            match self.gateway.push(&schedule.user_id, &message).await {
                Ok(()) => {
                    if let Err(err) = self.store.mark_schedule_delivered(schedule.id).await {
                        tracing::error!(
                            schedule_id = schedule.id,
                            error = %err,
                            "schedule pushed but delivered flag not written; duplicate possible"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        schedule_id = schedule.id,
                        user_id = %schedule.user_id,
                        error = %err,
                        "schedule push failed; retrying next tick"
                    );
                }
            }
        }
        Ok(())
    }

    async fn poll_reminders(&self, now: time::PrimitiveDateTime) -> Result<()> {
        let due = self.store.list_due_reminders(now).await?;
        for reminder in due {
            let message = format_reminder_message(&reminder);
            match self.gateway.push(&reminder.user_id, &message).await {
                Ok(()) => {
                    if let Err(err) = self.store.mark_reminder_delivered(reminder.id).await {
                        tracing::error!(
                            reminder_id = reminder.id,
                            error = %err,
                            "reminder pushed but delivered flag not written; duplicate possible"
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        reminder_id = reminder.id,
                        user_id = %reminder.user_id,
                        error = %err,
                        "reminder push failed; retrying next tick"
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledJob for ReminderPollJob {
    fn name(&self) -> &str {
        "reminder_poll"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let now = self.clock.now();
        if let Err(err) = self.poll_schedules(now).await {
            tracing::error!(error = %err, "due-schedule scan failed");
        }
        if let Err(err) = self.poll_reminders(now).await {
            tracing::error!(error = %err, "due-reminder scan failed");
        }
        Ok(())
    }
}

pub fn format_schedule_message(schedule: &ScheduleItem) -> String {
    let when = clock::parse_civil(&schedule.scheduled_time)
        .map(clock::format_short)
        .unwrap_or_else(|_| schedule.scheduled_time.clone());
    let mut message = format!(
        "Reminder: you have a schedule at {when}\nTitle: {}",
        schedule.title
    );
    if !schedule.description.is_empty() {
        message.push_str(&format!("\nDescription: {}", schedule.description));
    }
    message
}

pub fn format_reminder_message(reminder: &ReminderItem) -> String {
    format!("Reminder: {}", reminder.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(description: &str) -> ScheduleItem {
        ScheduleItem {
            id: 1,
            user_id: "U1".to_string(),
            title: "dentist".to_string(),
            description: description.to_string(),
            scheduled_time: "2024-01-01 10:00:00".to_string(),
            remind_before: 10,
            created_at: "2024-01-01 08:00:00".to_string(),
            delivered: false,
        }
    }

    #[test]
    fn schedule_message_includes_description_when_present() {
        let message = format_schedule_message(&schedule("bring insurance card"));
        assert!(message.contains("2024-01-01 10:00"));
        assert!(message.contains("Title: dentist"));
        assert!(message.contains("Description: bring insurance card"));
    }

    #[test]
    fn schedule_message_omits_empty_description() {
        let message = format_schedule_message(&schedule(""));
        assert!(!message.contains("Description:"));
    }
}

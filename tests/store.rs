use tempfile::NamedTempFile;

use concierge_bot::clock::{self, CivilClock};
use concierge_bot::config::Config;
use concierge_bot::config_store;
use concierge_bot::store::{BotStore, UserStateRecord};

async fn make_store() -> (BotStore, NamedTempFile) {
    let db = NamedTempFile::new().unwrap();
    let clock = CivilClock::from_offset_hours(8).unwrap();
    let store = BotStore::new(db.path().to_str().unwrap(), clock)
        .await
        .unwrap();
    (store, db)
}

#[tokio::test]
async fn notes_roundtrip_and_user_scoped_delete() {
    let (store, _db) = make_store().await;

    let note = store.create_note("U1", "buy milk").await.unwrap();
    assert_eq!(note.content, "buy milk");
    store.create_note("U2", "other user's note").await.unwrap();

    let notes = store.list_notes("U1").await.unwrap();
    assert_eq!(notes.len(), 1);

    assert!(!store.delete_note("U2", note.id).await.unwrap());
    assert!(store.delete_note("U1", note.id).await.unwrap());
    assert!(store.list_notes("U1").await.unwrap().is_empty());
}

#[tokio::test]
async fn schedule_creation_normalizes_picker_time() {
    let (store, _db) = make_store().await;

    let schedule = store
        .create_schedule("U1", "dentist", "checkup", "2024-05-01T09:30", 10)
        .await
        .unwrap();
    assert_eq!(schedule.scheduled_time, "2024-05-01 09:30:00");
    assert_eq!(schedule.remind_before, 10);
    assert!(!schedule.delivered);

    assert!(store
        .create_schedule("U1", "bad", "", "next tuesday", 10)
        .await
        .is_err());
}

#[tokio::test]
async fn due_schedules_respect_lead_window() {
    let (store, _db) = make_store().await;
    store
        .create_schedule("U1", "dentist", "", "2024-01-01 10:00:00", 15)
        .await
        .unwrap();

    // Before the window opens.
    let now = clock::parse_civil("2024-01-01 09:44:00").unwrap();
    assert!(store.list_due_schedules(now).await.unwrap().is_empty());

    // Inside the window.
    let now = clock::parse_civil("2024-01-01 09:50:00").unwrap();
    assert_eq!(store.list_due_schedules(now).await.unwrap().len(), 1);

    // The scheduled moment itself is still inside.
    let now = clock::parse_civil("2024-01-01 10:00:00").unwrap();
    assert_eq!(store.list_due_schedules(now).await.unwrap().len(), 1);

    // Once the moment has passed, the window stays closed.
    let now = clock::parse_civil("2024-01-01 10:05:00").unwrap();
    assert!(store.list_due_schedules(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn delivered_schedule_is_never_due_again() {
    let (store, _db) = make_store().await;
    let schedule = store
        .create_schedule("U1", "dentist", "", "2024-01-01 10:00:00", 15)
        .await
        .unwrap();

    let now = clock::parse_civil("2024-01-01 09:50:00").unwrap();
    assert_eq!(store.list_due_schedules(now).await.unwrap().len(), 1);

    store.mark_schedule_delivered(schedule.id).await.unwrap();
    assert!(store.list_due_schedules(now).await.unwrap().is_empty());

    let listed = store.list_schedules("U1").await.unwrap();
    assert!(listed[0].delivered);
}

#[tokio::test]
async fn delivered_mark_targets_one_row_even_with_equal_times() {
    let (store, _db) = make_store().await;
    let first = store
        .create_schedule("U1", "a", "", "2024-01-01 10:00:00", 15)
        .await
        .unwrap();
    store
        .create_schedule("U1", "b", "", "2024-01-01 10:00:00", 15)
        .await
        .unwrap();

    store.mark_schedule_delivered(first.id).await.unwrap();

    let now = clock::parse_civil("2024-01-01 09:50:00").unwrap();
    let due = store.list_due_schedules(now).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title, "b");
}

#[tokio::test]
async fn due_reminders_match_the_exact_minute_only() {
    let (store, _db) = make_store().await;
    store
        .create_reminder("U1", "call mom", "2024-01-01 10:00:00")
        .await
        .unwrap();

    let now = clock::parse_civil("2024-01-01 10:00:00").unwrap();
    assert_eq!(store.list_due_reminders(now).await.unwrap().len(), 1);

    let now = clock::parse_civil("2024-01-01 09:59:00").unwrap();
    assert!(store.list_due_reminders(now).await.unwrap().is_empty());

    // A moment that passed unobserved is never delivered late.
    let now = clock::parse_civil("2024-01-01 10:01:00").unwrap();
    assert!(store.list_due_reminders(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn upcoming_reminders_exclude_past_entries() {
    let (store, _db) = make_store().await;
    store
        .create_reminder("U1", "past", "2024-01-01 09:00:00")
        .await
        .unwrap();
    store
        .create_reminder("U1", "future", "2024-01-01 11:00:00")
        .await
        .unwrap();

    let now = clock::parse_civil("2024-01-01 10:00:00").unwrap();
    let upcoming = store.list_upcoming_reminders("U1", now).await.unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].content, "future");
}

#[test]
fn saved_config_is_loaded_back_from_the_store() {
    let db = NamedTempFile::new().unwrap();
    let path = db.path().to_str().unwrap();

    // Fresh database yields defaults.
    let config = Config::from_store(path).unwrap();
    assert!(config.line.is_none());

    let mut config = Config::default();
    config.public_base_url = Some("https://bot.example.com".to_string());
    config.utc_offset_hours = Some(9);
    config_store::save_config(path, &config).unwrap();

    let loaded = Config::from_store(path).unwrap();
    assert_eq!(
        loaded.public_base_url(),
        Some("https://bot.example.com".to_string())
    );
    assert_eq!(loaded.utc_offset_hours(), 9);

    // Saving again overwrites the single row.
    config.utc_offset_hours = Some(8);
    config_store::save_config(path, &config).unwrap();
    assert_eq!(Config::from_store(path).unwrap().utc_offset_hours(), 8);
}

#[tokio::test]
async fn user_state_overwrites_and_clears() {
    let (store, _db) = make_store().await;
    assert!(store.get_user_state("U1").await.unwrap().is_none());

    let first = UserStateRecord {
        state: "schedule_awaiting_time".to_string(),
        data: None,
    };
    store.set_user_state("U1", &first).await.unwrap();
    assert_eq!(store.get_user_state("U1").await.unwrap(), Some(first));

    let second = UserStateRecord {
        state: "note_awaiting_content".to_string(),
        data: Some(r#"{"k":"v"}"#.to_string()),
    };
    store.set_user_state("U1", &second).await.unwrap();
    assert_eq!(store.get_user_state("U1").await.unwrap(), Some(second));

    store.clear_user_state("U1").await.unwrap();
    assert!(store.get_user_state("U1").await.unwrap().is_none());
}

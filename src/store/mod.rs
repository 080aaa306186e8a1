use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::RunQueryDsl;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::clock::{self, CivilClock};
use crate::config_store::ensure_parent_dir;
use crate::error::{ConciergeBotError, Result};

mod schema;
use schema::{notes, reminders, schedules, user_states};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

#[derive(Debug, Clone, Serialize)]
pub struct NoteItem {
    pub id: i32,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleItem {
    pub id: i32,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub scheduled_time: String,
    pub remind_before: i64,
    pub created_at: String,
    pub delivered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderItem {
    pub id: i32,
    pub user_id: String,
    pub content: String,
    pub remind_time: String,
    pub created_at: String,
    pub delivered: bool,
}

/// Raw persisted dialogue state: a tag plus an optional JSON payload.
/// The dialogue layer owns the typed interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStateRecord {
    pub state: String,
    pub data: Option<String>,
}

#[derive(Queryable)]
struct NoteRow {
    id: i32,
    user_id: String,
    content: String,
    created_at: String,
}

#[derive(Queryable)]
struct ScheduleRow {
    id: i32,
    user_id: String,
    title: String,
    description: String,
    scheduled_time: String,
    remind_before: i64,
    created_at: String,
    delivered: bool,
}

#[derive(Queryable)]
struct ReminderRow {
    id: i32,
    user_id: String,
    content: String,
    remind_time: String,
    created_at: String,
    delivered: bool,
}

#[derive(Queryable)]
struct UserStateRow {
    _user_id: String,
    state: String,
    data: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = notes)]
struct NewNote<'a> {
    user_id: &'a str,
    content: &'a str,
    created_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = schedules)]
struct NewSchedule<'a> {
    user_id: &'a str,
    title: &'a str,
    description: &'a str,
    scheduled_time: &'a str,
    remind_before: i64,
    created_at: &'a str,
    delivered: bool,
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewReminder<'a> {
    user_id: &'a str,
    content: &'a str,
    remind_time: &'a str,
    created_at: &'a str,
    delivered: bool,
}

#[derive(Insertable)]
#[diesel(table_name = user_states)]
struct NewUserState<'a> {
    user_id: &'a str,
    state: &'a str,
    data: Option<&'a str>,
}

/// Persistence gateway over the bot's four record kinds. Flows create rows,
/// the poller flips delivered flags; nothing else mutates shared state.
pub struct BotStore {
    pool: SqlitePool,
    clock: CivilClock,
}

impl BotStore {
    pub async fn new(sqlite_path: impl AsRef<str>, clock: CivilClock) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(Self { pool, clock })
    }

    pub async fn create_note(&self, user_id: &str, content: &str) -> Result<NoteItem> {
        let created_at = self.clock.now_string();
        let new = NewNote {
            user_id,
            content,
            created_at: &created_at,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(notes::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;

        let row: NoteRow = notes::table
            .filter(notes::user_id.eq(user_id))
            .order(notes::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(map_note(row))
    }

    pub async fn list_notes(&self, user_id: &str) -> Result<Vec<NoteItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<NoteRow> = notes::table
            .filter(notes::user_id.eq(user_id))
            .order(notes::created_at.desc())
            .load(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(rows.into_iter().map(map_note).collect())
    }

    pub async fn delete_note(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            notes::table
                .filter(notes::user_id.eq(user_id))
                .filter(notes::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(deleted > 0)
    }

    pub async fn create_schedule(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
        scheduled_time: &str,
        remind_before: i64,
    ) -> Result<ScheduleItem> {
        let scheduled_time = clock::normalize_datetime(scheduled_time)?;
        let created_at = self.clock.now_string();
        let new = NewSchedule {
            user_id,
            title,
            description,
            scheduled_time: &scheduled_time,
            remind_before,
            created_at: &created_at,
            delivered: false,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(schedules::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;

        let row: ScheduleRow = schedules::table
            .filter(schedules::user_id.eq(user_id))
            .order(schedules::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(map_schedule(row))
    }

    pub async fn list_schedules(&self, user_id: &str) -> Result<Vec<ScheduleItem>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ScheduleRow> = schedules::table
            .filter(schedules::user_id.eq(user_id))
            .order(schedules::scheduled_time.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(rows.into_iter().map(map_schedule).collect())
    }

    pub async fn get_schedule(&self, id: i32) -> Result<Option<ScheduleItem>> {
        let mut conn = self.conn().await?;
        let row: Option<ScheduleRow> = schedules::table
            .filter(schedules::id.eq(id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(row.map(map_schedule))
    }

    pub async fn delete_schedule(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            schedules::table
                .filter(schedules::user_id.eq(user_id))
                .filter(schedules::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(deleted > 0)
    }

    /// Undelivered schedules whose reminder window contains `now`: the window
    /// opens `remind_before` minutes ahead of the scheduled moment and closes
    /// at the moment itself. A moment that passed unobserved stays closed.
    pub async fn list_due_schedules(&self, now: PrimitiveDateTime) -> Result<Vec<ScheduleItem>> {
        let now_str = clock::format_civil(now);
        let mut conn = self.conn().await?;
        // The canonical encoding is lexicographically ordered, so the upper
        // bound runs in SQL; the per-row lead offset is applied after load.
        let rows: Vec<ScheduleRow> = schedules::table
            .filter(schedules::delivered.eq(false))
            .filter(schedules::scheduled_time.ge(now_str))
            .order(schedules::scheduled_time.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;

        let mut due = Vec::new();
        for row in rows {
            let scheduled = match clock::parse_civil(&row.scheduled_time) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if clock::lead_window_start(scheduled, row.remind_before) <= now {
                due.push(map_schedule(row));
            }
        }
        Ok(due)
    }

    /// Flips the delivered flag for one schedule, matched by identity so rows
    /// sharing a timestamp are never marked together. The flag only ever goes
    /// from false to true.
    pub async fn mark_schedule_delivered(&self, id: i32) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::update(schedules::table.filter(schedules::id.eq(id)))
            .set(schedules::delivered.eq(true))
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn create_reminder(
        &self,
        user_id: &str,
        content: &str,
        remind_time: &str,
    ) -> Result<ReminderItem> {
        let remind_time = clock::normalize_datetime(remind_time)?;
        let created_at = self.clock.now_string();
        let new = NewReminder {
            user_id,
            content,
            remind_time: &remind_time,
            created_at: &created_at,
            delivered: false,
        };

        let mut conn = self.conn().await?;
        diesel::insert_into(reminders::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;

        let row: ReminderRow = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .order(reminders::id.desc())
            .first(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(map_reminder(row))
    }

    pub async fn list_upcoming_reminders(
        &self,
        user_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Vec<ReminderItem>> {
        let now_str = clock::format_civil(now);
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .filter(reminders::remind_time.ge(now_str))
            .order(reminders::remind_time.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(rows.into_iter().map(map_reminder).collect())
    }

    pub async fn delete_reminder(&self, user_id: &str, id: i32) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(
            reminders::table
                .filter(reminders::user_id.eq(user_id))
                .filter(reminders::id.eq(id)),
        )
        .execute(&mut conn)
        .await
        .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(deleted > 0)
    }

    /// Undelivered reminders due at `now`, bounded above by the same
    /// missed-window cutoff the schedules use.
    pub async fn list_due_reminders(&self, now: PrimitiveDateTime) -> Result<Vec<ReminderItem>> {
        let now_str = clock::format_civil(now);
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::delivered.eq(false))
            .filter(reminders::remind_time.le(now_str.clone()))
            .filter(reminders::remind_time.ge(now_str))
            .order(reminders::remind_time.asc())
            .load(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(rows.into_iter().map(map_reminder).collect())
    }

    pub async fn mark_reminder_delivered(&self, id: i32) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::update(reminders::table.filter(reminders::id.eq(id)))
            .set(reminders::delivered.eq(true))
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn get_user_state(&self, user_id: &str) -> Result<Option<UserStateRecord>> {
        let mut conn = self.conn().await?;
        let row: Option<UserStateRow> = user_states::table
            .filter(user_states::user_id.eq(user_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(row.map(|row| UserStateRecord {
            state: row.state,
            data: row.data,
        }))
    }

    /// Overwrites any previous state for the user. Starting a new flow on top
    /// of an unfinished one silently discards the stale payload.
    pub async fn set_user_state(&self, user_id: &str, record: &UserStateRecord) -> Result<()> {
        let new = NewUserState {
            user_id,
            state: &record.state,
            data: record.data.as_deref(),
        };
        let mut conn = self.conn().await?;
        diesel::replace_into(user_states::table)
            .values(&new)
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(())
    }

    pub async fn clear_user_state(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::delete(user_states::table.filter(user_states::user_id.eq(user_id)))
            .execute(&mut conn)
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))
    }
}

fn map_note(row: NoteRow) -> NoteItem {
    NoteItem {
        id: row.id,
        user_id: row.user_id,
        content: row.content,
        created_at: row.created_at,
    }
}

fn map_schedule(row: ScheduleRow) -> ScheduleItem {
    ScheduleItem {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        description: row.description,
        scheduled_time: row.scheduled_time,
        remind_before: row.remind_before,
        created_at: row.created_at,
        delivered: row.delivered,
    }
}

fn map_reminder(row: ReminderRow) -> ReminderItem {
    ReminderItem {
        id: row.id,
        user_id: row.user_id,
        content: row.content,
        remind_time: row.remind_time,
        created_at: row.created_at,
        delivered: row.delivered,
    }
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| ConciergeBotError::Persistence(e.to_string()))?;
        Ok::<_, ConciergeBotError>(())
    })
    .await
    .map_err(|e| ConciergeBotError::Runtime(e.to_string()))??;
    Ok(())
}

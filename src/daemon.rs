use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::clock::CivilClock;
use crate::config::Config;
use crate::dialogue::{DialogueEngine, TextOutcome};
use crate::error::{ConciergeBotError, Result};
use crate::interfaces::messaging::MessagingGateway;
use crate::interfaces::providers::ChatProvider;
use crate::line::client::LineClient;
use crate::line::events::{self, InboundEvent};
use crate::line::messages::OutboundMessage;
use crate::poller::ReminderPollJob;
use crate::providers::gemini::GeminiProvider;
use crate::scheduler::Scheduler;
use crate::store::BotStore;

const CHAT_FALLBACK_MESSAGE: &str =
    "Sorry, I cannot handle that request right now. Please try again later.";
const GENERIC_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BotStore>,
    pub engine: Arc<DialogueEngine>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub chat: Arc<dyn ChatProvider>,
    pub channel_secret: String,
    pub clock: CivilClock,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/callback", post(callback))
        .route("/calendar_events/:file", get(calendar_event))
        .with_state(state)
}

async fn home() -> &'static str {
    "Concierge bot is running"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Serves one schedule as a downloadable iCalendar file, named `<id>.ics`.
async fn calendar_event(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> impl IntoResponse {
    let Some(id) = file
        .strip_suffix(".ics")
        .and_then(|raw| raw.parse::<i32>().ok())
    else {
        return (StatusCode::NOT_FOUND, "calendar event not found").into_response();
    };

    let schedule = match state.store.get_schedule(id).await {
        Ok(Some(schedule)) => schedule,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "calendar event not found").into_response();
        }
        Err(err) => {
            tracing::warn!(schedule_id = id, error = %err, "calendar event lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "calendar event unavailable")
                .into_response();
        }
    };

    match crate::calendar::ics_document(&schedule, &state.clock) {
        Ok(document) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/calendar".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"event_{id}.ics\""),
                ),
            ],
            document,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(schedule_id = id, error = %err, "calendar rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "calendar event unavailable").into_response()
        }
    }
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("x-line-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !crate::line::verify_signature(&state.channel_secret, &body, signature) {
        return (StatusCode::BAD_REQUEST, "invalid signature").into_response();
    }

    let inbound = match events::parse_webhook(&body) {
        Ok(inbound) => inbound,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable webhook payload");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    for event in inbound {
        if let Err(err) = handle_event(&state, event).await {
            tracing::warn!(error = %err, "webhook event handling failed");
        }
    }
    (StatusCode::OK, "OK").into_response()
}

async fn handle_event(state: &AppState, event: InboundEvent) -> Result<()> {
    match event {
        InboundEvent::Text {
            user_id,
            reply_token,
            text,
        } => match state.engine.handle_text(&user_id, &text).await {
            Ok(TextOutcome::Replies(replies)) => state.gateway.reply(&reply_token, replies).await,
            Ok(TextOutcome::PassThrough) => {
                let reply = match state.chat.chat(&user_id, &text).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        tracing::warn!(user_id = %user_id, error = %err, "chat provider failed");
                        CHAT_FALLBACK_MESSAGE.to_string()
                    }
                };
                state
                    .gateway
                    .reply(&reply_token, vec![OutboundMessage::text(reply)])
                    .await
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "dialogue text handling failed");
                state
                    .gateway
                    .reply(
                        &reply_token,
                        vec![OutboundMessage::text(GENERIC_FAILURE_MESSAGE)],
                    )
                    .await
            }
        },
        InboundEvent::Postback {
            user_id,
            reply_token,
            action,
            args,
            picked_datetime,
        } => {
            match state
                .engine
                .handle_postback(&user_id, &action, &args, picked_datetime.as_deref())
                .await
            {
                Ok(replies) if replies.is_empty() => Ok(()),
                Ok(replies) => state.gateway.reply(&reply_token, replies).await,
                Err(err) => {
                    tracing::warn!(
                        user_id = %user_id,
                        action = %action,
                        error = %err,
                        "dialogue postback handling failed"
                    );
                    state
                        .gateway
                        .reply(
                            &reply_token,
                            vec![OutboundMessage::text(GENERIC_FAILURE_MESSAGE)],
                        )
                        .await
                }
            }
        }
    }
}

pub async fn run(host: &str, port: u16, config: Config) -> Result<()> {
    run_with_shutdown(host, port, config, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(host: &str, port: u16, config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let clock = CivilClock::from_offset_hours(config.utc_offset_hours())?;
    let store = Arc::new(BotStore::new(config.sqlite_path(), clock).await?);

    let line = config
        .line
        .clone()
        .ok_or_else(|| ConciergeBotError::Config("line section is required".to_string()))?;
    let access_token = line
        .channel_access_token
        .ok_or_else(|| ConciergeBotError::Config("line.channel_access_token is required".to_string()))?;
    let channel_secret = line
        .channel_secret
        .ok_or_else(|| ConciergeBotError::Config("line.channel_secret is required".to_string()))?;
    let gateway: Arc<dyn MessagingGateway> =
        Arc::new(LineClient::new(access_token, line.api_base));

    let gemini = config.gemini.clone().unwrap_or_default();
    let chat: Arc<dyn ChatProvider> = Arc::new(GeminiProvider::new(
        gemini.api_key.unwrap_or_default(),
        gemini.model,
        gemini.base_url,
    ));

    let engine = Arc::new(DialogueEngine::new(
        store.clone(),
        clock,
        config.public_base_url(),
    ));

    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(ReminderPollJob::new(
        store.clone(),
        gateway.clone(),
        clock,
        Duration::from_secs(config.poll_seconds()),
    )));
    scheduler.start();

    let state = AppState {
        store,
        engine,
        gateway,
        chat,
        channel_secret,
        clock,
    };
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ConciergeBotError::Runtime(e.to_string()))?;
    let shutdown = async move {
        shutdown.await;
        scheduler.stop().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConciergeBotError::Runtime(e.to_string()))?;

    Ok(())
}

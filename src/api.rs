//! HTTP endpoint for the voice assistant.
//!
//! Every skill request (launch or intent) gets the same answer: the cached
//! announcement as SSML plus the card text. The request body is only read
//! for logging.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::FeedCache;

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<FeedCache>,
    pub card_title: String,
}

// --- Request/Response types ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SkillRequest {
    request: RequestBody,
    session: Session,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestBody {
    #[serde(rename = "type")]
    kind: String,
    intent: Option<Intent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Intent {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Session {
    user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct User {
    user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SkillResponse {
    version: &'static str,
    response: ResponseBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody {
    output_speech: OutputSpeech,
    card: Card,
    should_end_session: bool,
}

#[derive(Serialize)]
struct OutputSpeech {
    #[serde(rename = "type")]
    kind: &'static str,
    ssml: String,
}

#[derive(Serialize)]
struct Card {
    #[serde(rename = "type")]
    kind: &'static str,
    title: String,
    content: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    identity: String,
}

/// Build the axum router. `route` is where the skill requests arrive.
pub fn router(state: ApiState, route: &str) -> Router {
    let route = if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    };

    Router::new()
        .route(&route, post(handle_skill))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Skill endpoint listening on {addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

// --- Handlers ---

async fn handle_skill(State(state): State<ApiState>, body: Bytes) -> Json<SkillResponse> {
    let req: SkillRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        debug!("Unreadable skill request: {e}");
        SkillRequest::default()
    });
    let intent = req.request.intent.as_ref().map(|i| i.name.as_str()).unwrap_or("-");
    info!(
        "----> Request {} for intent {intent}, user {}",
        req.request.kind, req.session.user.user_id
    );

    let (card, speech) = state.cache.get();
    info!("<---- Answering with {card}");

    Json(SkillResponse {
        version: "1.0",
        response: ResponseBody {
            output_speech: OutputSpeech {
                kind: "SSML",
                ssml: speech,
            },
            card: Card {
                kind: "Simple",
                title: state.card_title.clone(),
                content: card,
            },
            should_end_session: true,
        },
    })
}

async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        identity: state.cache.identity(),
    })
}

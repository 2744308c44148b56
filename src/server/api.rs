use crate::agent::{AgentError, ChatAgent};
use crate::cli::Args;
use crate::history::HistoryError;
use crate::models::api::{
    ChatRequest, ChatResponse, ConversationHistory, ErrorResponse, HealthCheck, StreamEvent,
};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use log::{error, info};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    agent: Arc<ChatAgent>,
    args: Args,
}

pub async fn start_http_server(
    addr: &str,
    agent: Arc<ChatAgent>,
    args: Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(AppState { agent, args });

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
    })?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.args);

    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/conversations/{conversation_id}", get(get_conversation_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(args: &Args) -> CorsLayer {
    if args.allowed_origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = args
        .allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Upstream failure detail reaches the client only when debug is enabled.
fn turn_error_message(err: &AgentError, debug: bool) -> String {
    if debug {
        format!("Chat processing failed: {}", err)
    } else {
        "Chat processing failed".to_string()
    }
}

fn turn_error_response(err: &AgentError, debug: bool) -> Response {
    let status = match err {
        AgentError::Llm(_) => StatusCode::BAD_GATEWAY,
        AgentError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &turn_error_message(err, debug))
}

async fn health_handler() -> Json<HealthCheck> {
    Json(HealthCheck::default())
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let conversation_id = req
        .conversation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state
        .agent
        .chat(&req.message, &req.user_id, &conversation_id)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatResponse {
                message: outcome.message,
                conversation_id: outcome.conversation_id,
                timestamp: outcome.timestamp,
                status: "success".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Chat turn failed for conversation {}: {}", conversation_id, e);
            turn_error_response(&e, state.args.debug)
        }
    }
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let conversation_id = req
        .conversation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let debug = state.args.debug;

    let events = state
        .agent
        .clone()
        .chat_stream(req.message, req.user_id, conversation_id)
        .map(move |item| {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    error!("Streaming chat turn failed: {}", e);
                    StreamEvent::Error {
                        error: turn_error_message(&e, debug),
                    }
                }
            };
            Event::default().json_data(&event)
        });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(events),
    )
        .into_response()
}

async fn get_conversation_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.agent.conversation(&conversation_id).await {
        Ok(conversation) => {
            (StatusCode::OK, Json(ConversationHistory::from(conversation))).into_response()
        }
        Err(HistoryError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Conversation not found")
        }
    }
}

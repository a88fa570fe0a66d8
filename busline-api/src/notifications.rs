//! Delay fan-out and the per-user notification socket.
//!
//! Every message goes onto one `broadcast` channel; each socket only
//! forwards the entries addressed to its own destination.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use busline_booking::DeliveryReport;
use busline_core::{destination_for, AccessToken, CoreError, Role};
use busline_shared::Notification;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{error::AppError, middleware::Caller, state::AppState};

#[derive(Debug, Deserialize)]
pub struct DelayNotice {
    pub bus_id: i64,
    pub message: String,
}

/// Admin-only; mounted behind the admin middleware.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/v1/notifications/delay", post(notify_delay))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/ws/notifications", get(subscribe))
}

async fn notify_delay(
    State(state): State<AppState>,
    Json(notice): Json<DelayNotice>,
) -> Result<Json<DeliveryReport>, AppError> {
    if notice.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".into()));
    }
    Ok(Json(state.relay.notify_delay(notice.bus_id, &notice.message).await?))
}

async fn subscribe(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if !caller.has_role(Role::User) {
        return Err(CoreError::AccessDenied.into());
    }
    let rx = state.notifications.subscribe();
    tracing::info!(user_id = caller.entity_id, "notification socket requested");
    Ok(ws.on_upgrade(move |socket| forward(socket, caller, rx)))
}

async fn forward(socket: WebSocket, caller: AccessToken, mut rx: broadcast::Receiver<Notification>) {
    let destination = destination_for(caller.entity_id);
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) if notification.destination == destination => {
                    let json = match serde_json::to_string(&notification) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!("failed to encode notification: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%destination, skipped, "notification socket lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!(user_id = caller.entity_id, "notification socket closed");
}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use uuid::Uuid;

use crate::auth::jwt::verify_token;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Push an event to the given users' open sockets. A no-op when the feed
/// is disabled or nobody is listening.
pub fn broadcast(state: &AppState, audience: &[Uuid], event: &str, payload: Value) {
    let Some(tx) = state.ws_tx.as_ref() else {
        return;
    };
    let message = json!({
        "type": event,
        "audience": audience,
        "data": payload,
    });
    if tx.send(message.to_string()).is_err() {
        tracing::trace!(event, "No WebSocket subscribers");
    }
}

/// Broadcast to a user and, when linked, their partner.
pub async fn notify_couple(state: &AppState, user_id: Uuid, event: &str, payload: Value) {
    let mut audience = vec![user_id];
    match state.engagement.partner_of(user_id).await {
        Ok(Some(partner_id)) => audience.push(partner_id),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, user_id = %user_id, "Partner lookup failed for notification"),
    }
    broadcast(state, &audience, event, payload);
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match authenticate_ws(&state, query.token.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("WebSocket auth failed: {}", e);
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    if state.ws_tx.is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Realtime feed disabled").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

fn authenticate_ws(state: &AppState, token: Option<&str>) -> Result<Uuid, &'static str> {
    let token = token.ok_or("Missing token query parameter")?;
    let token_data = verify_token(token, &state.config).map_err(|_| "Invalid or expired token")?;
    Ok(token_data.claims.sub)
}

fn is_addressed_to(message: &str, user_id: Uuid) -> bool {
    let Ok(parsed) = serde_json::from_str::<Value>(message) else {
        return false;
    };
    let me = user_id.to_string();
    parsed
        .get("audience")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().any(|id| id.as_str() == Some(me.as_str())))
        .unwrap_or(false)
}

/// Next event meant for `user_id`. A receiver that fell behind skips the
/// overwritten events and keeps going; None only once the feed is closed.
async fn next_addressed(rx: &mut Receiver<String>, user_id: Uuid) -> Option<String> {
    loop {
        match rx.recv().await {
            Ok(msg) if is_addressed_to(&msg, user_id) => return Some(msg),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(user_id = %user_id, skipped, "WebSocket client lagged, events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let Some(mut rx) = state.ws_tx.as_ref().map(|tx| tx.subscribe()) else {
        return;
    };
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = next_addressed(&mut rx, user_id).await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(user_id = %user_id, message = %text, "WebSocket message received");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_reach_only_their_audience() {
        let alex = Uuid::new_v4();
        let sam = Uuid::new_v4();
        let msg = json!({ "type": "check_in_created", "audience": [alex], "data": {} }).to_string();

        assert!(is_addressed_to(&msg, alex));
        assert!(!is_addressed_to(&msg, sam));
        assert!(!is_addressed_to("not json", alex));
    }

    #[tokio::test]
    async fn lagging_receiver_keeps_receiving() {
        let alex = Uuid::new_v4();
        let sam = Uuid::new_v4();
        let (tx, mut rx) = tokio::sync::broadcast::channel::<String>(2);
        for n in 0..5 {
            let msg = json!({ "type": "tick", "audience": [alex], "data": { "n": n } });
            tx.send(msg.to_string()).unwrap();
        }
        tx.send(json!({ "type": "tick", "audience": [sam], "data": {} }).to_string())
            .unwrap();
        drop(tx);

        let first = next_addressed(&mut rx, alex).await.unwrap();
        let first: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first["data"]["n"], 4);

        // Sam's event is skipped, then the closed channel ends the feed.
        assert!(next_addressed(&mut rx, alex).await.is_none());
    }
}

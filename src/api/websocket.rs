use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::agent::StatusEvent;
use crate::coordinator::TabId;

use super::state::{AppState, WsEvent};

#[derive(Debug, Deserialize)]
struct WsIncoming {
    #[serde(rename = "type")]
    msg_type: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WsOutgoing {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tab_id: Option<TabId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    level: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<WsEvent> for WsOutgoing {
    fn from(event: WsEvent) -> Self {
        match event {
            WsEvent::ExtractionSaved {
                tab_id,
                page_id,
                page_name,
                count,
            } => WsOutgoing {
                msg_type: "extraction_saved".to_string(),
                tab_id: Some(tab_id),
                page_id: Some(page_id),
                page_name: Some(page_name),
                count: Some(count),
                ..Default::default()
            },
            WsEvent::EntryCompleted { tab_id, result } => WsOutgoing {
                msg_type: "entry_complete".to_string(),
                tab_id: Some(tab_id),
                result: Some(serde_json::to_value(result).unwrap_or_default()),
                ..Default::default()
            },
            WsEvent::Error { tab_id, error } => WsOutgoing {
                msg_type: "error".to_string(),
                tab_id: Some(tab_id),
                error: Some(error),
                ..Default::default()
            },
            WsEvent::Pong => WsOutgoing {
                msg_type: "pong".to_string(),
                ..Default::default()
            },
        }
    }
}

impl From<StatusEvent> for WsOutgoing {
    fn from(event: StatusEvent) -> Self {
        WsOutgoing {
            msg_type: "status".to_string(),
            tab_id: Some(event.tab_id),
            frame_id: Some(event.frame_id),
            level: serde_json::to_value(event.level).ok(),
            message: Some(event.message),
            ..Default::default()
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request from client: {}", client_id);
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    tracing::info!("WebSocket connected: {}", client_id);
    state.client_connected(&client_id);

    let (mut sender, mut receiver) = socket.split();

    let mut events = state.subscribe();
    let mut status = state.subscribe_status();

    // Forward app events and agent status lines to this client
    let send_task = tokio::spawn(async move {
        loop {
            let msg: WsOutgoing = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => event.into(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagging behind events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                line = status.recv() => match line {
                    Ok(line) => line.into(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket client lagging behind status");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Task to handle incoming messages (ping/pong)
    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(incoming) = serde_json::from_str::<WsIncoming>(&text) {
                    if incoming.msg_type == "ping" {
                        state_clone.broadcast(WsEvent::Pong);
                    }
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.client_disconnected(&client_id);
    tracing::info!("WebSocket disconnected: {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::StatusLevel;
    use crate::replay::ReplayResult;

    #[test]
    fn test_status_event_wire_shape() {
        let msg: WsOutgoing = StatusEvent {
            tab_id: 1,
            frame_id: 2,
            level: StatusLevel::Success,
            message: "Selected 4 elements".into(),
        }
        .into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["tabId"], 1);
        assert_eq!(json["frameId"], 2);
        assert_eq!(json["level"], "success");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_entry_event_wire_shape() {
        let msg: WsOutgoing = WsEvent::EntryCompleted {
            tab_id: 3,
            result: ReplayResult {
                total_actions: 3,
                applied_actions: 3,
                ..Default::default()
            },
        }
        .into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "entry_complete");
        assert_eq!(json["result"]["appliedActions"], 3);
    }
}

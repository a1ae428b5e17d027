//! WebSocket handler for live meters

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::meter::MeterBank;
use crate::protocol::ControlMessage;
use crate::ui::server::AppState;

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the initial snapshot so no version is missed
    let mut snapshots_rx = state.store.subscribe();
    let mut control_rx = state.subscribe_control();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ControlMessage>();

    // Each connection renders its own meters
    let mut bank = MeterBank::new(state.meter.clone());

    // Send initial status, snapshot and a full set of meters
    let mut initial = Vec::with_capacity(3);
    if let Ok(status) = state.session.status().await {
        initial.push(ControlMessage::Status(status));
    }
    let snapshot = state.store.snapshot();
    let meters = bank.render(&snapshot);
    initial.push(ControlMessage::Snapshot(snapshot));
    initial.push(ControlMessage::Meters(meters));
    for msg in &initial {
        if send_json(&mut sender, msg).await.is_err() {
            return;
        }
    }

    // Forward snapshots (as changed meters), broadcasts and direct replies
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                snapshot = snapshots_rx.recv() => match snapshot {
                    Ok(snapshot) => {
                        let meters = bank.render_changed(&snapshot);
                        if meters.is_empty() {
                            continue;
                        }
                        ControlMessage::Meters(meters)
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "WebSocket client lagging, skipping snapshots");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                control = control_rx.recv() => match control {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };

            if send_json(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(control_msg) => handle_control_message(control_msg, &recv_state, &reply_tx).await,
                    Err(e) => {
                        let _ = reply_tx.send(ControlMessage::Error {
                            message: format!("invalid message: {}", e),
                        });
                    }
                },
                Message::Close(_) => break,
                // Binary not supported; ping/pong handled by axum
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }
}

async fn send_json<S>(sender: &mut S, msg: &ControlMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to encode control message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await.map_err(|_| ())
}

/// Handle incoming control message
async fn handle_control_message(msg: ControlMessage, state: &AppState, reply_tx: &mpsc::UnboundedSender<ControlMessage>) {
    let result = match msg {
        ControlMessage::SetMonitoring { enabled } => {
            let result = if enabled {
                state.session.enable().await.map(|_| ())
            } else {
                state.session.disable().await
            };
            if result.is_ok() {
                state.broadcast_status().await;
            }
            result
        }

        ControlMessage::RemoveChannel { channel_id } => match state.session.remove_channel(channel_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                let _ = reply_tx.send(ControlMessage::Error {
                    message: format!("channel {} has no meter", channel_id),
                });
                Ok(())
            }
            Err(e) => Err(e),
        },

        ControlMessage::GetStatus => state.session.status().await.map(|status| {
            let _ = reply_tx.send(ControlMessage::Status(status));
        }),

        ControlMessage::GetSnapshot => {
            let _ = reply_tx.send(ControlMessage::Snapshot(state.store.snapshot()));
            Ok(())
        }

        ControlMessage::Ping => {
            let _ = reply_tx.send(ControlMessage::Pong);
            Ok(())
        }

        _ => {
            // Other messages are informational
            Ok(())
        }
    };

    if let Err(e) = result {
        let _ = reply_tx.send(ControlMessage::Error { message: e.to_string() });
    }
}

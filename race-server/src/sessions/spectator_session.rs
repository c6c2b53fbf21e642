use futures_util::{SinkExt, StreamExt};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use race_contracts::{reason, ServerFrameV1};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::state::AppState;

/// Drives one spectator WebSocket connection: send `race_state` on hello,
/// then passively forward the broadcast set. No inbound frame is ever
/// acted on.
pub async fn handle_spectator_socket(socket: WebSocket, state: AppState, race_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let room = match state.rooms.get_or_load_race(race_id).await {
        Ok(room) => room,
        Err(err) => {
            warn!(error = %err, race_id = %race_id, "failed to load race room for spectator session");
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let mut outbox_rx = state.registry.attach_listener(race_id, session_id).await;

    let hello = room.race_state_frame().await;
    if send_frame(&mut sender, &hello).await.is_err() {
        state.registry.detach_listener(race_id, session_id).await;
        return;
    }

    info!(race_id = %race_id, session_id = %session_id, "spectator connected");

    loop {
        tokio::select! {
            outbound = outbox_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        let closes = matches!(
                            &frame,
                            ServerFrameV1::Error { reason: r }
                                if r == reason::SERVER_SHUTTING_DOWN || r == reason::SEND_OVERFLOW
                        );
                        if send_frame(&mut sender, &frame).await.is_err() || closes {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // non-empty inbound frames are discarded
                    Some(Err(err)) => {
                        warn!(error = %err, "spectator socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.detach_listener(race_id, session_id).await;
    info!(race_id = %race_id, session_id = %session_id, "spectator disconnected");
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrameV1,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).expect("server frame always serializes");
    sender.send(WsMessage::text(json)).await
}

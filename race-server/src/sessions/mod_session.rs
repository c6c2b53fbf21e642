use futures_util::{SinkExt, StreamExt};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use race_contracts::{reason, ClientFrameV1, ServerFrameV1};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::db::queries::{participants as participant_queries, training as training_queries};

enum AuthedAs {
    Participant { race_id: Uuid, participant_id: Uuid },
    Training { session_id: Uuid },
}

/// Drives one mod WebSocket connection through the auth/ready/playing state
/// machine: split the socket, subscribe to an outbound channel, `select!`
/// between inbound frames and outbound pushes, but gated by an explicit
/// auth handshake first.
pub async fn handle_mod_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let auth = match timeout(state.config.auth_timeout, receiver.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => serde_json::from_str::<ClientFrameV1>(&text).ok(),
        _ => None,
    };

    let mod_token = match auth {
        Some(ClientFrameV1::Auth { mod_token }) => mod_token,
        _ => {
            send_and_close(&mut sender, ServerFrameV1::AuthError { reason: reason::AUTH_TIMEOUT.to_string() }).await;
            return;
        }
    };

    let authed = match resolve_mod_token(&state, &mod_token).await {
        Some(a) => a,
        None => {
            send_and_close(&mut sender, ServerFrameV1::AuthError { reason: reason::INVALID_TOKEN.to_string() }).await;
            return;
        }
    };

    match authed {
        AuthedAs::Participant { race_id, participant_id } => {
            run_race_mod_session(sender, receiver, state, race_id, participant_id).await;
        }
        AuthedAs::Training { session_id } => {
            run_training_mod_session(sender, receiver, state, session_id).await;
        }
    }
}

async fn resolve_mod_token(state: &AppState, mod_token: &str) -> Option<AuthedAs> {
    if let Ok(Some(p)) = participant_queries::get_participant_by_token(&state.db, mod_token).await {
        return Some(AuthedAs::Participant { race_id: p.race_id, participant_id: p.id });
    }
    if let Ok(Some(s)) = training_queries::get_training_session_by_token(&state.db, mod_token).await {
        return Some(AuthedAs::Training { session_id: s.id });
    }
    None
}

async fn send_and_close(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    frame: ServerFrameV1,
) {
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = sender.send(WsMessage::text(json)).await;
    }
    let _ = sender.close().await;
}

async fn run_race_mod_session(
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    state: AppState,
    race_id: Uuid,
    participant_id: Uuid,
) {
    let room = match state.rooms.get_or_load_race(race_id).await {
        Ok(room) => room,
        Err(err) => {
            warn!(error = %err, "failed to load race room for mod session");
            return;
        }
    };

    let (mut outbox_rx, evicted) = state.registry.attach_mod(race_id, participant_id).await;
    if let Some(evicted_tx) = evicted {
        evicted_tx.try_send(ServerFrameV1::Error { reason: reason::REPLACED.to_string() });
    }

    let Some(participant) = room.find_participant(participant_id).await else {
        state.registry.detach_mod(race_id, participant_id).await;
        return;
    };

    let race_state = room.race_state_frame().await;
    let (race, seed, participants) = match race_state {
        ServerFrameV1::RaceState { race, seed, leaderboard, .. } => (race, seed, leaderboard),
        _ => unreachable!(),
    };

    let auth_ok = ServerFrameV1::AuthOk {
        race,
        seed,
        participants,
        my_participant_id: participant.id,
    };
    if send_frame(&mut sender, &auth_ok).await.is_err() {
        state.registry.detach_mod(race_id, participant_id).await;
        return;
    }

    info!(race_id = %race_id, participant_id = %participant_id, "mod session authenticated");

    loop {
        tokio::select! {
            outbound = outbox_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        let closes = matches!(
                            &frame,
                            ServerFrameV1::Error { reason }
                                if reason == reason::REPLACED
                                    || reason == reason::SERVER_SHUTTING_DOWN
                                    || reason == reason::SEND_OVERFLOW
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
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_inbound_frame(&state, &room, participant_id, &text, &mut sender).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "mod socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.detach_mod(race_id, participant_id).await;
    info!(race_id = %race_id, participant_id = %participant_id, "mod session closed");
}

async fn handle_inbound_frame(
    state: &AppState,
    room: &crate::engine::RaceRoom,
    participant_id: Uuid,
    text: &str,
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
) {
    let Ok(frame) = serde_json::from_str::<ClientFrameV1>(text) else {
        return; // malformed/unknown frame: logged and dropped, never closes
    };

    let result = match frame {
        ClientFrameV1::Ready {} => room.apply_ready(participant_id).await.map_err(|e| e.to_string()).err(),
        ClientFrameV1::Pong {} => {
            room.record_pong(participant_id).await;
            None
        }
        ClientFrameV1::StatusUpdate { igt_ms, current_zone, death_count } => room
            .apply_status(participant_id, igt_ms, current_zone, death_count)
            .await
            .err()
            .map(str::to_string),
        ClientFrameV1::ZoneEntered { to_zone, igt_ms, .. } => room
            .apply_zone_entered(participant_id, &to_zone, igt_ms)
            .await
            .err()
            .map(str::to_string),
        ClientFrameV1::EventFlag { igt_ms, .. } => room
            .apply_event_flag(participant_id, igt_ms)
            .await
            .err()
            .map(str::to_string),
        ClientFrameV1::Finished { igt_ms } => room
            .apply_finished(participant_id, igt_ms)
            .await
            .err()
            .map(str::to_string),
        ClientFrameV1::Auth { .. } => None,
    };

    if let Some(reason) = result {
        if reason == reason::PARTICIPANT_TERMINAL {
            return;
        }
        let _ = send_frame(sender, &ServerFrameV1::Error { reason }).await;
    }
}

async fn run_training_mod_session(
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    state: AppState,
    session_id: Uuid,
) {
    let room = match state.rooms.get_or_load_training(session_id).await {
        Ok(room) => room,
        Err(err) => {
            warn!(error = %err, "failed to load training session");
            return;
        }
    };

    let (mut outbox_rx, evicted) = state.registry.attach_mod(session_id, session_id).await;
    if let Some(evicted_tx) = evicted {
        evicted_tx.try_send(ServerFrameV1::Error { reason: reason::REPLACED.to_string() });
    }

    let race_state = room.race_state_frame().await;
    let (race, seed, participants) = match race_state {
        ServerFrameV1::RaceState { race, seed, leaderboard, .. } => (race, seed, leaderboard),
        _ => unreachable!(),
    };
    let my_id = session_id;
    let auth_ok = ServerFrameV1::AuthOk { race, seed, participants, my_participant_id: my_id };
    if send_frame(&mut sender, &auth_ok).await.is_err() {
        state.registry.detach_mod(session_id, session_id).await;
        return;
    }
    // Training sessions start RUNNING immediately: no `ready` gating.
    let _ = send_frame(&mut sender, &ServerFrameV1::RaceStart {}).await;

    loop {
        tokio::select! {
            outbound = outbox_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        let closes = matches!(
                            &frame,
                            ServerFrameV1::Error { reason }
                                if reason == reason::REPLACED
                                    || reason == reason::SERVER_SHUTTING_DOWN
                                    || reason == reason::SEND_OVERFLOW
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
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_training_inbound(&room, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "training mod socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.detach_mod(session_id, session_id).await;
}

async fn handle_training_inbound(room: &crate::engine::TrainingRoom, text: &str) {
    let Ok(frame) = serde_json::from_str::<ClientFrameV1>(text) else { return };
    match frame {
        ClientFrameV1::StatusUpdate { igt_ms, current_zone, death_count } => {
            let _ = room.apply_status(igt_ms, current_zone, death_count).await;
        }
        ClientFrameV1::ZoneEntered { to_zone, igt_ms, .. } => {
            let _ = room.apply_zone_entered(&to_zone, igt_ms).await;
        }
        ClientFrameV1::EventFlag { igt_ms, .. } => {
            let _ = room.apply_event_flag(igt_ms).await;
        }
        ClientFrameV1::Finished { igt_ms } => {
            let _ = room.apply_finished(igt_ms).await;
        }
        _ => {}
    }
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrameV1,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).expect("server frame always serializes");
    sender.send(WsMessage::text(json)).await
}

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use race_contracts::{reason, ServerFrameV1};
use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

/// Outbound queue depth per session. Overflow drops the oldest dirty
/// `leaderboard_update` first (self-healing: the next tick resends current
/// truth); if nothing coalescible is left to drop, the session is closed
/// with an error instead of growing unbounded.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

fn is_coalescible(frame: &ServerFrameV1) -> bool {
    matches!(frame, ServerFrameV1::LeaderboardUpdate { .. })
}

struct Outbound {
    queue: Mutex<VecDeque<ServerFrameV1>>,
    notify: Notify,
    closed: AtomicBool,
    drop_count: AtomicU64,
}

impl Outbound {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(OUTBOUND_QUEUE_DEPTH)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            drop_count: AtomicU64::new(0),
        }
    }
}

/// Send half of a session's outbound queue. Cheap to clone — every clone
/// shares the same bounded buffer.
#[derive(Clone)]
pub struct Outbox(Arc<Outbound>);

/// Receive half of a session's outbound queue, held by the WebSocket
/// handler's `select!` loop.
pub struct OutboxReceiver(Arc<Outbound>);

impl Outbox {
    fn channel() -> (Outbox, OutboxReceiver) {
        let inner = Arc::new(Outbound::new());
        (Outbox(inner.clone()), OutboxReceiver(inner))
    }

    /// Enqueues `frame`, applying the backpressure policy described on
    /// `OUTBOUND_QUEUE_DEPTH` when the queue is already full. Never blocks.
    pub fn try_send(&self, frame: ServerFrameV1) {
        let mut queue = self.0.queue.lock().unwrap();
        if self.0.closed.load(Ordering::Acquire) {
            return;
        }

        if queue.len() < OUTBOUND_QUEUE_DEPTH {
            queue.push_back(frame);
            drop(queue);
            self.0.notify.notify_one();
            return;
        }

        if let Some(pos) = queue.iter().position(is_coalescible) {
            queue.remove(pos);
            let dropped = self.0.drop_count.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped, "outbound queue full, dropped oldest leaderboard_update");
            queue.push_back(frame);
            drop(queue);
            self.0.notify.notify_one();
            return;
        }

        warn!("outbound queue full of non-coalescible frames, closing session");
        queue.clear();
        queue.push_back(ServerFrameV1::Error { reason: reason::SEND_OVERFLOW.to_string() });
        self.0.closed.store(true, Ordering::Release);
        drop(queue);
        self.0.notify.notify_one();
    }

    pub fn drop_count(&self) -> u64 {
        self.0.drop_count.load(Ordering::Relaxed)
    }
}

impl OutboxReceiver {
    /// Waits for the next frame, or returns `None` once the session has been
    /// closed by the backpressure policy and the queue has drained.
    pub async fn recv(&mut self) -> Option<ServerFrameV1> {
        loop {
            {
                let mut queue = self.0.queue.lock().unwrap();
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
                if self.0.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.0.notify.notified().await;
        }
    }

    /// Non-blocking drain, used by tests that want to inspect already
    /// buffered frames without awaiting.
    pub fn try_recv(&mut self) -> Option<ServerFrameV1> {
        self.0.queue.lock().unwrap().pop_front()
    }
}

#[derive(Clone)]
struct Session {
    tx: Outbox,
}

/// Per-race connection fan-out: one mod per participant, any number of
/// listeners (spectators/casters share the listener channel). Sends are
/// best-effort — see `Outbox::try_send` for the backpressure policy.
#[derive(Default)]
struct RaceConnections {
    mods: HashMap<Uuid, Session>,
    listeners: HashMap<Uuid, Session>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    races: tokio::sync::Mutex<HashMap<Uuid, RaceConnections>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mod session for `participant_id`, evicting and returning
    /// the previous session's handle if one existed (reconnection replaces
    /// the live session rather than stacking a second one).
    pub async fn attach_mod(&self, race_id: Uuid, participant_id: Uuid) -> (OutboxReceiver, Option<Outbox>) {
        let (tx, rx) = Outbox::channel();
        let session = Session { tx };

        let mut races = self.races.lock().await;
        let entry = races.entry(race_id).or_default();
        let previous = entry.mods.insert(participant_id, session).map(|s| s.tx);
        (rx, previous)
    }

    pub async fn attach_listener(&self, race_id: Uuid, session_id: Uuid) -> OutboxReceiver {
        let (tx, rx) = Outbox::channel();
        let session = Session { tx };

        let mut races = self.races.lock().await;
        races.entry(race_id).or_default().listeners.insert(session_id, session);
        rx
    }

    pub async fn detach_mod(&self, race_id: Uuid, participant_id: Uuid) {
        let mut races = self.races.lock().await;
        if let Some(conns) = races.get_mut(&race_id) {
            conns.mods.remove(&participant_id);
        }
    }

    pub async fn detach_listener(&self, race_id: Uuid, session_id: Uuid) {
        let mut races = self.races.lock().await;
        if let Some(conns) = races.get_mut(&race_id) {
            conns.listeners.remove(&session_id);
        }
    }

    pub async fn send_to_mod(&self, race_id: Uuid, participant_id: Uuid, frame: ServerFrameV1) {
        let races = self.races.lock().await;
        if let Some(conns) = races.get(&race_id) {
            if let Some(session) = conns.mods.get(&participant_id) {
                session.tx.try_send(frame);
            }
        }
    }

    /// Sends `frame` to every mod and listener attached to `race_id`.
    /// Per-session order is preserved; no ordering guarantee across sessions.
    /// Iterates a snapshot of the session handles rather than holding the
    /// registry lock across the sends.
    pub async fn broadcast(&self, race_id: Uuid, frame: ServerFrameV1) {
        let sessions = {
            let races = self.races.lock().await;
            let Some(conns) = races.get(&race_id) else { return };
            conns.mods.values().chain(conns.listeners.values()).cloned().collect::<Vec<_>>()
        };
        for session in sessions {
            session.tx.try_send(frame.clone());
        }
    }

    /// Sends `frame` to every mod attached to `race_id` (used for pings,
    /// which listeners never receive).
    pub async fn broadcast_to_mods(&self, race_id: Uuid, frame: ServerFrameV1) {
        let sessions = {
            let races = self.races.lock().await;
            let Some(conns) = races.get(&race_id) else { return };
            conns.mods.values().cloned().collect::<Vec<_>>()
        };
        for session in sessions {
            session.tx.try_send(frame.clone());
        }
    }

    /// Sends `frame` to every session across every race — used for process
    /// shutdown, so every connected client sees `server_shutting_down`
    /// before the socket closes.
    pub async fn broadcast_all(&self, frame: ServerFrameV1) {
        let sessions = {
            let races = self.races.lock().await;
            races
                .values()
                .flat_map(|conns| conns.mods.values().chain(conns.listeners.values()))
                .cloned()
                .collect::<Vec<_>>()
        };
        for session in sessions {
            session.tx.try_send(frame.clone());
        }
    }

    pub async fn drop_count_for_mod(&self, race_id: Uuid, participant_id: Uuid) -> u64 {
        let races = self.races.lock().await;
        races
            .get(&race_id)
            .and_then(|c| c.mods.get(&participant_id))
            .map(|s| s.tx.drop_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attaching_a_second_mod_session_evicts_the_first() {
        let registry = ConnectionRegistry::new();
        let race_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();

        let (_rx1, evicted1) = registry.attach_mod(race_id, participant_id).await;
        assert!(evicted1.is_none());

        let (_rx2, evicted2) = registry.attach_mod(race_id, participant_id).await;
        assert!(evicted2.is_some());
    }

    #[tokio::test]
    async fn broadcast_reaches_mods_and_listeners() {
        let registry = ConnectionRegistry::new();
        let race_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let listener_id = Uuid::new_v4();

        let (mut mod_rx, _) = registry.attach_mod(race_id, participant_id).await;
        let mut listener_rx = registry.attach_listener(race_id, listener_id).await;

        registry.broadcast(race_id, ServerFrameV1::RaceStart {}).await;

        assert!(matches!(mod_rx.recv().await, Some(ServerFrameV1::RaceStart {})));
        assert!(matches!(listener_rx.recv().await, Some(ServerFrameV1::RaceStart {})));
    }

    #[tokio::test]
    async fn full_queue_of_leaderboard_updates_drops_oldest_instead_of_closing() {
        let registry = ConnectionRegistry::new();
        let race_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let (mut rx, _) = registry.attach_mod(race_id, participant_id).await;

        for _ in 0..(OUTBOUND_QUEUE_DEPTH + 10) {
            registry
                .send_to_mod(race_id, participant_id, ServerFrameV1::LeaderboardUpdate { participants: vec![] })
                .await;
        }

        assert!(registry.drop_count_for_mod(race_id, participant_id).await > 0);
        // still open: the next frame is delivered rather than the session
        // having been torn down.
        registry.send_to_mod(race_id, participant_id, ServerFrameV1::RaceStart {}).await;
        let mut saw_race_start = false;
        while let Some(frame) = rx.try_recv() {
            if matches!(frame, ServerFrameV1::RaceStart {}) {
                saw_race_start = true;
            }
        }
        assert!(saw_race_start);
    }

    #[tokio::test]
    async fn full_queue_with_no_coalescible_frames_closes_the_session() {
        let registry = ConnectionRegistry::new();
        let race_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let (mut rx, _) = registry.attach_mod(race_id, participant_id).await;

        for _ in 0..(OUTBOUND_QUEUE_DEPTH + 1) {
            registry.send_to_mod(race_id, participant_id, ServerFrameV1::RaceStart {}).await;
        }

        let mut saw_overflow_error = false;
        while let Some(frame) = rx.try_recv() {
            if matches!(&frame, ServerFrameV1::Error { reason } if reason == race_contracts::reason::SEND_OVERFLOW) {
                saw_overflow_error = true;
            }
        }
        assert!(saw_overflow_error);
        assert!(rx.recv().await.is_none(), "session is closed after the overflow error");
    }
}

//! The session registry: the single source of truth for which connection
//! belongs to which room, and the room-scoped fan-out path.
//!
//! Both tables (session id to outbound channel, session id to room) live
//! behind one lock, so any read sees a consistent snapshot and no
//! membership change is ever observable half-applied.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

/// One outbound item for a session's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A text line; the writer appends CRLF.
    Line(String),
    /// A pre-encoded binary file frame, written verbatim.
    Frame(Bytes),
}

/// Concurrency-guarded session/room registry. Cheap to clone; all clones
/// share one inner state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistryState>>,
}

struct RegistryState {
    next_id: i32,
    /// Connection table: session id -> outbound channel.
    sessions: HashMap<i32, mpsc::UnboundedSender<Outbound>>,
    /// Membership table: session id -> room id.
    rooms: HashMap<i32, i64>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState {
                next_id: 1,
                sessions: HashMap::new(),
                rooms: HashMap::new(),
            })),
        }
    }

    /// Admit a new connection. Returns its session id (monotonic, starting
    /// at 1, never reused within the process) and the receiving end of its
    /// outbound channel.
    pub async fn register(&self) -> (i32, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.write().await;
        let session_id = state.next_id;
        state.next_id += 1;
        state.sessions.insert(session_id, tx);
        (session_id, rx)
    }

    /// Drop a session from both tables. Returns the room it belonged to,
    /// if any, so the caller can notify the remaining members.
    pub async fn unregister(&self, session_id: i32) -> Option<i64> {
        let mut state = self.inner.write().await;
        state.sessions.remove(&session_id);
        state.rooms.remove(&session_id)
    }

    /// Move a session into a room. Returns the room it previously belonged
    /// to, if that was a different one.
    pub async fn set_room(&self, session_id: i32, room_id: i64) -> Option<i64> {
        let mut state = self.inner.write().await;
        let previous = state.rooms.insert(session_id, room_id);
        previous.filter(|&prev| prev != room_id)
    }

    /// Remove a session's room membership. Returns the room left, if any.
    pub async fn clear_room(&self, session_id: i32) -> Option<i64> {
        self.inner.write().await.rooms.remove(&session_id)
    }

    /// Room a session currently belongs to.
    pub async fn room_of(&self, session_id: i32) -> Option<i64> {
        self.inner.read().await.rooms.get(&session_id).copied()
    }

    /// Session ids currently in a room, ascending.
    pub async fn members_of(&self, room_id: i64) -> Vec<i32> {
        let state = self.inner.read().await;
        let mut members: Vec<i32> = state
            .rooms
            .iter()
            .filter(|&(_, &room)| room == room_id)
            .map(|(&session, _)| session)
            .collect();
        members.sort_unstable();
        members
    }

    /// Live participant count per room.
    pub async fn room_counts(&self) -> HashMap<i64, usize> {
        let state = self.inner.read().await;
        let mut counts = HashMap::new();
        for &room_id in state.rooms.values() {
            *counts.entry(room_id).or_insert(0) += 1;
        }
        counts
    }

    /// Queue one outbound item for a single session. A missing or closed
    /// session is not an error; the item is dropped.
    pub async fn send_to(&self, session_id: i32, item: Outbound) {
        let state = self.inner.read().await;
        if let Some(tx) = state.sessions.get(&session_id) {
            if tx.send(item).is_err() {
                warn!("session {} outbound channel closed, dropping", session_id);
            }
        }
    }

    /// Deliver a line to every member of a room except `exclude`.
    pub async fn broadcast_line(&self, room_id: i64, line: String, exclude: Option<i32>) {
        self.broadcast(room_id, Outbound::Line(line), exclude).await;
    }

    /// Deliver a binary frame to every member of a room except `exclude`.
    pub async fn broadcast_frame(&self, room_id: i64, frame: Bytes, exclude: Option<i32>) {
        self.broadcast(room_id, Outbound::Frame(frame), exclude)
            .await;
    }

    /// The target set is a snapshot taken under the lock; a failed send to
    /// one member never affects delivery to the others.
    async fn broadcast(&self, room_id: i64, item: Outbound, exclude: Option<i32>) {
        let state = self.inner.read().await;
        for (&session_id, &member_room) in state.rooms.iter() {
            if member_room != room_id || Some(session_id) == exclude {
                continue;
            }
            if let Some(tx) = state.sessions.get(&session_id) {
                if tx.send(item.clone()).is_err() {
                    warn!(
                        "session {} outbound channel closed, dropping broadcast",
                        session_id
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_lines(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(item) = rx.try_recv() {
            match item {
                Outbound::Line(line) => lines.push(line),
                Outbound::Frame(_) => lines.push("<frame>".into()),
            }
        }
        lines
    }

    #[tokio::test]
    async fn ids_are_monotonic_from_one() {
        let registry = Registry::new();
        let (a, _rx_a) = registry.register().await;
        let (b, _rx_b) = registry.register().await;
        let (c, _rx_c) = registry.register().await;
        assert_eq!((a, b, c), (1, 2, 3));

        // Ids are never reused, even after a session goes away.
        registry.unregister(b).await;
        let (d, _rx_d) = registry.register().await;
        assert_eq!(d, 4);
    }

    #[tokio::test]
    async fn set_room_reports_the_previous_room() {
        let registry = Registry::new();
        let (id, _rx) = registry.register().await;

        assert_eq!(registry.set_room(id, 10).await, None);
        assert_eq!(registry.set_room(id, 10).await, None); // re-join, no move
        assert_eq!(registry.set_room(id, 20).await, Some(10));
        assert_eq!(registry.room_of(id).await, Some(20));
        assert!(registry.members_of(10).await.is_empty());
    }

    #[tokio::test]
    async fn members_are_sorted_and_scoped() {
        let registry = Registry::new();
        let (a, _ra) = registry.register().await;
        let (b, _rb) = registry.register().await;
        let (c, _rc) = registry.register().await;
        registry.set_room(c, 1).await;
        registry.set_room(a, 1).await;
        registry.set_room(b, 2).await;

        assert_eq!(registry.members_of(1).await, vec![a, c]);
        assert_eq!(registry.members_of(2).await, vec![b]);
        assert_eq!(registry.room_counts().await.get(&1), Some(&2));
    }

    #[tokio::test]
    async fn unregister_clears_both_tables() {
        let registry = Registry::new();
        let (id, _rx) = registry.register().await;
        registry.set_room(id, 5).await;

        assert_eq!(registry.unregister(id).await, Some(5));
        assert!(registry.members_of(5).await.is_empty());
        assert_eq!(registry.room_of(id).await, None);
    }

    #[tokio::test]
    async fn broadcast_excludes_the_named_session() {
        let registry = Registry::new();
        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        let (c, mut rx_c) = registry.register().await;
        registry.set_room(a, 1).await;
        registry.set_room(b, 1).await;
        registry.set_room(c, 2).await;

        registry
            .broadcast_line(1, "MESSAGE:1:9:hello".into(), Some(a))
            .await;

        assert!(collect_lines(&mut rx_a).is_empty());
        assert_eq!(collect_lines(&mut rx_b), vec!["MESSAGE:1:9:hello"]);
        assert!(collect_lines(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn broadcast_survives_a_dropped_receiver() {
        let registry = Registry::new();
        let (a, rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        registry.set_room(a, 1).await;
        registry.set_room(b, 1).await;
        drop(rx_a);

        registry.broadcast_line(1, "MESSAGE:1:9:hi".into(), None).await;
        assert_eq!(collect_lines(&mut rx_b), vec!["MESSAGE:1:9:hi"]);
    }
}

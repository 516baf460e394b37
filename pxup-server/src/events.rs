//! Session notifications.
//!
//! The server publishes connection and frame events on a broadcast channel.
//! Subscribers that fall behind lose the oldest events; publishing never
//! blocks the frame pipeline.

use pxup_protocol::PacketKind;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A peer was accepted and the session is awaiting frames.
    Connected { addr: SocketAddr },
    /// The connection ended. `reason` is `None` on a clean close.
    Disconnected {
        addr: SocketAddr,
        reason: Option<String>,
    },
    /// A frame was decoded and applied.
    FrameApplied {
        frame_id: u32,
        kind: PacketKind,
        /// Entries declared in the header.
        entries: u16,
        /// Pixels written by this frame.
        updates_applied: u64,
        /// Entries dropped by the bounds check.
        skipped: u32,
    },
}

/// Broadcast channel for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning the number of receivers it reached.
    pub fn publish(&self, event: SessionEvent) -> usize {
        // No receivers is not an error
        self.sender.send(event).unwrap_or(0)
    }

}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

//! Connection session state machine.
//!
//! A single `Session` lives for the whole process and is re-attached to each
//! accepted connection. It owns the per-connection frame counters and the
//! reusable update buffer; the decoder and applier only ever see them through
//! borrowed references.

use crate::decoder::FrameDecoder;
use crate::error::ServerError;
use crate::reader::FramedReader;
use pxup_core::{apply_frame, ApplyOutcome, FrameCounters, Surface, UpdateBuffer};
use pxup_protocol::{PacketHeader, HEADER_SIZE};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::debug;
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Idle,
    /// Connection accepted, waiting for the next header.
    Awaiting,
    /// Header or entries in flight.
    Decoding,
    /// Frame fully decoded, being written to the surface.
    Applying,
}

impl SessionState {
    /// Returns whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Awaiting)
                | (Awaiting, Decoding)
                | (Decoding, Applying)
                | (Decoding, Awaiting)
                | (Applying, Awaiting)
        )
    }
}

/// The active connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub remote_addr: SocketAddr,
    pub connected_at: Instant,
}

/// One processed frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub header: PacketHeader,
    pub outcome: ApplyOutcome,
    /// Time spent reading the body.
    pub decode_time: Duration,
    pub apply_time: Duration,
}

/// Frame pipeline state for the single serviced connection.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    connection: Option<ConnectionInfo>,
    counters: FrameCounters,
    buffer: UpdateBuffer,
}

impl Session {
    pub fn new(buffer: UpdateBuffer) -> Self {
        Self {
            state: SessionState::Idle,
            connection: None,
            counters: FrameCounters::new(),
            buffer,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    pub fn buffer(&self) -> &UpdateBuffer {
        &self.buffer
    }

    /// Binds the session to a newly accepted connection.
    ///
    /// Resets the per-connection counters. Returns the connection id.
    pub fn attach(&mut self, remote_addr: SocketAddr) -> Uuid {
        if self.state != SessionState::Idle {
            self.detach();
        }
        let info = ConnectionInfo {
            id: Uuid::new_v4(),
            remote_addr,
            connected_at: Instant::now(),
        };
        let id = info.id;
        self.connection = Some(info);
        self.counters.reset();
        self.buffer.discard();
        self.set_state(SessionState::Awaiting);
        id
    }

    /// Releases the current connection, returning its info.
    ///
    /// The surface and buffer capacity are left as they are.
    pub fn detach(&mut self) -> Option<ConnectionInfo> {
        self.buffer.discard();
        self.set_state(SessionState::Idle);
        self.connection.take()
    }

    /// Decodes and applies the next frame.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between frames. Any
    /// error leaves the surface untouched by the failed frame; the caller is
    /// expected to drop the connection and [`detach`](Self::detach).
    pub async fn next_frame<R, S>(
        &mut self,
        reader: &mut FramedReader<R>,
        decoder: &FrameDecoder,
        surface: &mut S,
    ) -> Result<Option<FrameReport>, ServerError>
    where
        R: AsyncRead + Unpin,
        S: Surface + ?Sized,
    {
        if !reader.wait_for(HEADER_SIZE).await? {
            if reader.buffered() > 0 {
                return Err(ServerError::ShortRead {
                    expected: HEADER_SIZE,
                    received: reader.buffered(),
                });
            }
            return Ok(None);
        }

        self.set_state(SessionState::Decoding);
        let header = decoder.read_header(reader).await?;

        if header.is_empty() {
            self.counters
                .record_frame(header.frame_id, ApplyOutcome::default());
            self.set_state(SessionState::Awaiting);
            return Ok(Some(FrameReport {
                header,
                outcome: ApplyOutcome::default(),
                decode_time: Duration::ZERO,
                apply_time: Duration::ZERO,
            }));
        }

        let started = Instant::now();
        decoder.read_body(reader, &header, &mut self.buffer).await?;
        let decode_time = started.elapsed();

        self.set_state(SessionState::Applying);
        let started = Instant::now();
        let outcome = apply_frame(surface, self.buffer.as_slice());
        let apply_time = started.elapsed();

        self.counters.record_frame(header.frame_id, outcome);
        self.set_state(SessionState::Awaiting);

        Ok(Some(FrameReport {
            header,
            outcome,
            decode_time,
            apply_time,
        }))
    }

    fn set_state(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        if self.state != next {
            debug!("session {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(UpdateBuffer::new())
    }
}

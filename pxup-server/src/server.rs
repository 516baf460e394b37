//! TCP server implementation.
//!
//! One task accepts a connection and serves it to completion before accepting
//! the next, so at most one peer ever drives the surface. Later connection
//! attempts wait in the listen backlog until the active peer goes away.

use crate::config::Config;
use crate::decoder::FrameDecoder;
use crate::error::ServerError;
use crate::events::{EventBus, SessionEvent, DEFAULT_EVENT_CAPACITY};
use crate::metrics::Metrics;
use crate::reader::FramedReader;
use crate::session::{FrameReport, Session};
use pxup_core::{GrowthStrategy, Rgb565, Surface, UpdateBuffer};
use pxup_protocol::DEFAULT_PORT;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Set TCP_NODELAY on accepted streams.
    pub nodelay: bool,
    /// Longest a read may wait for bytes.
    pub read_timeout: Option<Duration>,
    /// Fill the surface with black on every new connection.
    pub clear_on_connect: bool,
    /// Hard cap on entries per frame, below the surface area.
    pub max_entries: Option<usize>,
    /// Update buffer growth strategy.
    pub growth: GrowthStrategy,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("nodelay", &self.nodelay)
            .field("read_timeout", &self.read_timeout)
            .field("clear_on_connect", &self.clear_on_connect)
            .field("max_entries", &self.max_entries)
            .field("growth", &self.growth)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            nodelay: true,
            read_timeout: None,
            clear_on_connect: true,
            max_entries: None,
            growth: GrowthStrategy::Exact,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the server settings from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            nodelay: config.network.nodelay,
            read_timeout: config.network.read_timeout(),
            clear_on_connect: config.surface.clear_on_connect,
            max_entries: config.decoder.max_entries(),
            growth: config.decoder.growth,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
///
/// Unlike the session's frame counters these cover the whole process and
/// are never reset.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub frames_total: AtomicU64,
    pub updates_applied: AtomicU64,
    pub entries_skipped: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Signals a running [`Server`] to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }

    /// Returns a receiver for the shutdown signal, for companion tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}

/// TCP server for pxup.
pub struct Server<S> {
    config: ServerConfig,
    surface: S,
    session: Session,
    decoder: FrameDecoder,
    events: EventBus,
    stats: ServerStats,
    shutdown: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    running: AtomicBool,
}

impl<S: Surface> Server<S> {
    /// Creates a new server driving `surface`.
    pub fn new(config: ServerConfig, surface: S) -> Self {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let decoder = FrameDecoder::for_surface(surface.area(), config.max_entries);
        let buffer =
            UpdateBuffer::with_strategy(config.growth).with_frame_limit(decoder.entry_limit());
        Self {
            config,
            surface,
            session: Session::new(buffer),
            decoder,
            events: EventBus::new(DEFAULT_EVENT_CAPACITY),
            stats: ServerStats::default(),
            shutdown,
            shutdown_rx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            "Listening on {} ({}x{} surface)",
            listener.local_addr()?,
            self.surface.width(),
            self.surface.height()
        );
        self.serve(listener).await
    }

    /// Serves connections from `listener` one at a time until shutdown.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);

        loop {
            let accepted = tokio::select! {
                result = listener.accept() => result,
                _ = self.shutdown_rx.recv() => break,
            };

            match accepted {
                Ok((stream, addr)) => {
                    if let Err(ServerError::ShuttingDown) =
                        self.handle_connection(stream, addr).await
                    {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }

        tracing::info!("Server shutting down");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Serves one connection until it closes, fails, or shutdown is signalled.
    async fn handle_connection(
        &mut self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("[{}] Failed to set TCP_NODELAY: {}", addr, e);
            }
        }

        let id = self.session.attach(addr);
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.store(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connections_total.inc();
            metrics.connection_active.set(1.0);
        }
        tracing::info!("[{}] Client connected (session {})", addr, id);

        if self.config.clear_on_connect {
            self.surface.clear(Rgb565::BLACK);
        }
        self.events.publish(SessionEvent::Connected { addr });

        let mut reader = FramedReader::new(stream).with_read_timeout(self.config.read_timeout);
        let result = self.pump_frames(&mut reader, addr).await;

        let frames = self.session.counters().frame_count;
        self.session.detach();
        self.stats.connections_active.store(0, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.connection_active.set(0.0);
        }

        match &result {
            Ok(()) => {
                tracing::info!("[{}] Client disconnected after {} frames", addr, frames);
            }
            Err(ServerError::ShuttingDown) => {
                tracing::info!("[{}] Closing connection for shutdown", addr);
            }
            Err(ServerError::Protocol(e)) if e.is_framing_lost() => {
                tracing::warn!("[{}] Stream framing lost, dropping connection: {}", addr, e);
            }
            Err(e) if e.is_peer_fault() => {
                tracing::warn!(
                    "[{}] Connection dropped ({}): {}",
                    addr,
                    e.class().as_str(),
                    e
                );
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Connection dropped ({}): {}",
                    addr,
                    e.class().as_str(),
                    e
                );
            }
        }

        if let Some(e) = result
            .as_ref()
            .err()
            .filter(|e| !matches!(e, ServerError::ShuttingDown))
        {
            self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            if let Some(ref metrics) = self.config.metrics {
                metrics.observe_error(e.class());
            }
        }

        self.events.publish(SessionEvent::Disconnected {
            addr,
            reason: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }

    async fn pump_frames(
        &mut self,
        reader: &mut FramedReader<TcpStream>,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let decoder = self.decoder;

        loop {
            // A frame cut short by shutdown is dropped before it is applied
            let frame = tokio::select! {
                frame = self.session.next_frame(reader, &decoder, &mut self.surface) => frame?,
                _ = self.shutdown_rx.recv() => return Err(ServerError::ShuttingDown),
            };

            match frame {
                Some(report) => self.on_frame(addr, &report),
                None => return Ok(()),
            }
        }
    }

    fn on_frame(&self, addr: SocketAddr, report: &FrameReport) {
        let header = &report.header;
        let outcome = report.outcome;

        self.stats.frames_total.fetch_add(1, Ordering::Relaxed);
        self.stats
            .updates_applied
            .fetch_add(outcome.updates_applied, Ordering::Relaxed);
        self.stats
            .entries_skipped
            .fetch_add(outcome.skipped as u64, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.observe_frame(header.kind, header.frame_id, outcome, report.apply_time);
        }

        tracing::debug!(
            "[{}] Frame {} ({}): {} entries, {} updates, {} skipped, decode {:?}, apply {:?}",
            addr,
            header.frame_id,
            header.kind,
            header.entry_count,
            outcome.updates_applied,
            outcome.skipped,
            report.decode_time,
            report.apply_time
        );

        self.events.publish(SessionEvent::FrameApplied {
            frame_id: header.frame_id,
            kind: header.kind,
            entries: header.entry_count,
            updates_applied: outcome.updates_applied,
            skipped: outcome.skipped,
        });
    }

    /// Returns a handle that stops the server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown.clone(),
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}

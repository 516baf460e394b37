//! # pxup-server
//!
//! TCP receiver for pxup.
//!
//! This crate provides:
//! - Exact-length reads over a partial-read tolerant transport buffer
//! - Header validation and bounded body decoding into a reusable buffer
//! - The connection session state machine and its frame pipeline
//! - A single-connection accept loop with graceful shutdown
//! - Frame and connection notifications, periodic statistics, and metrics

pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod metrics;
pub mod reader;
pub mod server;
pub mod session;
pub mod stats;

pub use config::{
    Config, ConfigError, DecoderConfig, MetricsConfig, NetworkConfig, StatsConfig, SurfaceConfig,
};
pub use decoder::FrameDecoder;
pub use error::{ErrorClass, ServerError};
pub use events::{EventBus, SessionEvent};
pub use metrics::Metrics;
pub use reader::FramedReader;
pub use server::{Server, ServerConfig, ServerStats, ShutdownHandle};
pub use session::{ConnectionInfo, FrameReport, Session, SessionState};
pub use stats::StatsReporter;

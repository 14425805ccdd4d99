//! # igeb-rs
//!
//! Async Rust client and acquisition session engine for IGEB ear-worn
//! EEG/impedance headsets over Bluetooth Low Energy.
//!
//! The crate covers the full capture loop: device discovery and connection,
//! characteristic subscription and sample decoding, a live
//! electrode-contact-quality metric, and a timed recording session whose
//! samples export as a CSV dataset. Rendering and persistence stay outside:
//! the library produces events and bytes, the caller decides what they look
//! like and where they go.
//!
//! ## Quick start
//!
//! ```no_run
//! use igeb_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mut session, mut events) =
//!         DeviceSession::new(BleTransport::new(), SessionConfig::default());
//!     let mut engine = AcquisitionEngine::new(EngineConfig::default());
//!
//!     session.connect().await?;
//!     session.subscribe_all().await?;
//!     engine.start_recording(Some(30)).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let SensorEvent::Disconnected = event {
//!             break;
//!         }
//!         engine.handle(event).await;
//!         if engine.recording_status().await == RecordingStatus::Completed {
//!             std::fs::write("capture.csv", engine.export().await)?;
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`session`] | Connection lifecycle and the decode/publish pump |
//! | [`engine`] | Single-writer fan-out to window, classifier and recording |
//! | [`recording`] | The timed capture state machine |
//! | [`quality`] | Impedance → tier classifier and the rolling window |
//! | [`export`] | CSV dataset exporter |
//! | [`transport`] | The sample-source capability set |
//! | [`ble`] | `btleplug`-backed radio transport |
//! | [`feed`] | Remote-relay transport (server-pushed sample stream) |
//! | [`parse`] | Duration grammar and per-role byte decoders |
//! | [`protocol`] | GATT UUIDs and wire-format defaults |

pub mod ble;
pub mod engine;
pub mod error;
pub mod export;
pub mod feed;
pub mod parse;
pub mod protocol;
pub mod quality;
pub mod recording;
pub mod session;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::ble::BleTransport;
    pub use crate::engine::{AcquisitionEngine, EngineConfig};
    pub use crate::error::{DecodeError, InvalidFormat, RecordingError, SessionError};
    pub use crate::export::export_csv;
    pub use crate::feed::{FeedHandle, RemoteFeed};
    pub use crate::parse::{parse_duration, DecodeScheme, SampleWidth};
    pub use crate::quality::{QualityThresholds, QualityTier, RollingWindow};
    pub use crate::recording::{RecordingSession, RecordingStatus};
    pub use crate::session::{DeviceSession, SessionConfig, SessionState};
    pub use crate::transport::Transport;
    pub use crate::types::{Role, Sample, SensorEvent};
}

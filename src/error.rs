//! Error taxonomy for the acquisition engine.
//!
//! Connection-establishment failures are terminal for that attempt: the
//! [`crate::session::DeviceSession`] returns to `Disconnected` and the caller
//! decides whether to retry. Per-sample decode failures are recovered locally
//! (the sample is dropped and logged) and never surface through these types
//! mid-stream.

use thiserror::Error;

use crate::types::Role;

/// Failures of the device connection lifecycle and the underlying transport.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The user aborted device selection before a peripheral was picked.
    #[error("device discovery was cancelled")]
    DiscoveryCancelled,

    /// No matching peripheral responded within the scan window.
    #[error("no matching device found within {0} s")]
    DiscoveryTimeout(u64),

    /// The link could not be established after discovery.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    /// The expected primary service is not advertised by the peripheral.
    #[error("acquisition service not found on device")]
    ServiceNotFound,

    /// The service is present but lacks the characteristic for `role`.
    #[error("no {0} characteristic on device")]
    CharacteristicNotFound(Role),

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// Radio-level failure outside the connection-establishment taxonomy
    /// (adapter missing, write rejected, stack error).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Caller-usage errors of the recording state machine. Returned synchronously
/// and never mutate session state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordingError {
    /// The device session is not `Connected`, so a capture cannot start.
    #[error("cannot start recording: device not connected")]
    NotConnected,

    /// A capture is already in progress.
    #[error("a recording is already active")]
    AlreadyActive,
}

/// A notification payload too short for the configured decode scheme.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("payload of {got} byte(s) is too short for {role} (need {need})")]
pub struct DecodeError {
    pub role: Role,
    pub got: usize,
    pub need: usize,
}

/// A duration string that does not match the accepted `<digits><s|m>` grammar.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration {0:?} (expected e.g. \"30s\" or \"2m\")")]
pub struct InvalidFormat(pub String);

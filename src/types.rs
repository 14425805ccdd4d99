use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Measurement role of a subscribable data channel.
///
/// Exactly one characteristic per role is active per connection; the
/// [`crate::session::DeviceSession`] owns both handles and enforces the
/// single-subscription rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Electrode-contact-quality metric. Lower is better contact.
    Impedance,
    /// The primary biosignal stream recorded during a capture.
    Signal,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Impedance => write!(f, "impedance"),
            Role::Signal => write!(f, "signal"),
        }
    }
}

/// One decoded reading from a characteristic notification.
///
/// Immutable once produced. The timestamp is assigned at decode time; radio
/// receive time and decode time are treated as coincident for this use case.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub captured_at: DateTime<Utc>,
    pub role: Role,
    pub value: f64,
}

impl Sample {
    pub fn new(role: Role, value: f64) -> Self {
        Self {
            captured_at: Utc::now(),
            role,
            value,
        }
    }
}

/// Events published by a [`crate::session::DeviceSession`] to its consumer.
///
/// Delivered in arrival order per role over the session's `mpsc` channel;
/// impedance and signal samples may interleave arbitrarily.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// Link established and characteristics resolved. Carries the advertised
    /// device name (e.g. `"IGEB-0042"`).
    Connected(String),
    /// One-shot battery readout in percent, taken right after connect when
    /// the device exposes the standard battery characteristic.
    Battery(u8),
    /// A decoded reading from a subscribed characteristic.
    Sample(Sample),
    /// The link was torn down or lost. No sample is delivered after this
    /// event has been observed.
    Disconnected,
}

//! GATT UUIDs and wire-format defaults for IGEB ear-EEG headsets.
//!
//! All vendor UUIDs belong to the IGEB namespace
//! `4742XXXX-4947-4542-96be-e61a81b0b8a1`. The battery readout uses the
//! Bluetooth SIG battery service instead.

use uuid::Uuid;

use crate::parse::{DecodeScheme, SampleWidth};

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary acquisition service advertised by IGEB headsets.
///
/// Its absence after service discovery means the connected peripheral is not
/// an IGEB device (or runs incompatible firmware) and resolution fails with
/// [`crate::error::SessionError::ServiceNotFound`].
pub const IGEB_SERVICE_UUID: Uuid = Uuid::from_u128(0x47420001_4947_4542_96be_e61a81b0b8a1);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Electrode-contact impedance channel, notified at ~1 Hz.
pub const IMPEDANCE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x47420002_4947_4542_96be_e61a81b0b8a1);

/// Raw biosignal amplitude channel.
pub const SIGNAL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x47420003_4947_4542_96be_e61a81b0b8a1);

/// Bluetooth SIG battery service (`0x180F`).
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Bluetooth SIG battery level characteristic (`0x2A19`): one unsigned byte,
/// percent. Read once after connect, never subscribed.
pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Advertised-name prefix matched during discovery. All known IGEB headsets
/// advertise as `IGEB-<serial>`.
pub const DEVICE_NAME_PREFIX: &str = "IGEB";

// ── Default decode schemes ────────────────────────────────────────────────────

/// Wire format of the impedance characteristic: unsigned 16-bit little-endian
/// at the start of the payload, in raw device units.
pub const IMPEDANCE_DECODE: DecodeScheme = DecodeScheme {
    width: SampleWidth::U16Le,
    offset: 0,
};

/// Wire format of the signal characteristic: unsigned 16-bit little-endian at
/// the start of the payload, in raw ADC units.
pub const SIGNAL_DECODE: DecodeScheme = DecodeScheme {
    width: SampleWidth::U16Le,
    offset: 0,
};

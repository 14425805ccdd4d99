//! The transport seam: everything the acquisition session needs from a
//! sample source, whether that is the BLE radio ([`crate::ble`]) or the
//! remote relay feed ([`crate::feed`]).

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::SessionError;
use crate::types::Role;

/// Name filter and scan window applied during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryFilter {
    /// Match peripherals whose advertised name starts with this string.
    pub name_prefix: String,
    /// Seconds to scan before giving up with `DiscoveryTimeout`.
    pub timeout_secs: u64,
}

/// Opaque handle to a matched, discoverable peripheral.
///
/// Created on successful discovery, owned by the session, discarded on
/// disconnect.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Platform identifier: a UUID string on macOS/Windows, a MAC address
    /// on Linux, relay-assigned for the remote feed.
    pub id: String,
    /// Advertised device name.
    pub name: String,
}

/// Opaque handle to a subscribable data channel, tagged with its role.
///
/// Resolved once per connection; invalid after disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub role: Role,
    pub uuid: Uuid,
}

/// One raw payload pushed from a subscribed characteristic.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub role: Role,
    pub payload: Vec<u8>,
}

/// A service and its characteristics as advertised by the peripheral.
/// Diagnostic data for [`crate::session::DeviceSession::describe_gatt`].
#[derive(Debug, Clone)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Capability set the acquisition session consumes.
///
/// One logical connection per transport instance. Implementations map the
/// discovery/connect/resolve/subscribe lifecycle onto their medium; the
/// session never touches the medium directly.
#[async_trait]
pub trait Transport: Send {
    /// Find a peripheral matching `filter`.
    ///
    /// Fails with `DiscoveryCancelled` when the user aborts selection, or
    /// `DiscoveryTimeout` when nothing matching responds in time.
    async fn discover(&mut self, filter: &DiscoveryFilter) -> Result<DeviceIdentity, SessionError>;

    /// Establish the link to a previously discovered peripheral.
    async fn connect(&mut self, device: &DeviceIdentity) -> Result<(), SessionError>;

    /// Resolve the data channel for `role`.
    ///
    /// Fails with `ServiceNotFound` / `CharacteristicNotFound` when the
    /// expected channel is absent.
    async fn resolve_characteristic(&mut self, role: Role)
        -> Result<CharacteristicHandle, SessionError>;

    /// Activate notification delivery for a resolved channel.
    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError>;

    /// Deactivate notification delivery for a channel.
    async fn unsubscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError>;

    /// The merged push stream of raw payloads from all subscribed channels.
    ///
    /// Per-role arrival order is preserved; the stream ends when the link
    /// drops.
    async fn notifications(&mut self)
        -> Result<BoxStream<'static, RawNotification>, SessionError>;

    /// One-shot read of a resolved channel, the polling fallback for media
    /// without push notifications.
    async fn read_once(&mut self, handle: &CharacteristicHandle) -> Result<Vec<u8>, SessionError>;

    /// One-shot battery readout in percent, when the peripheral exposes one.
    async fn read_battery_level(&mut self) -> Result<Option<u8>, SessionError>;

    /// Advertised service/characteristic tree, for diagnostics.
    async fn describe_gatt(&mut self) -> Result<Vec<GattService>, SessionError>;

    /// Release the link and the peripheral handle. Idempotent.
    async fn disconnect(&mut self) -> Result<(), SessionError>;
}

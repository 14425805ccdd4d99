//! Device session: the connection lifecycle from discovery to teardown.
//!
//! A [`DeviceSession`] owns one [`Transport`] and the two resolved
//! characteristic handles, and is the sole producer of [`SensorEvent`]s for
//! its consumer. Notification payloads are decoded on a single pump task and
//! published in arrival order; malformed payloads are logged and dropped
//! without touching the subscription.

use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::parse::DecodeScheme;
use crate::protocol::{DEVICE_NAME_PREFIX, IMPEDANCE_DECODE, SIGNAL_DECODE};
use crate::transport::{CharacteristicHandle, DeviceIdentity, DiscoveryFilter, GattService, Transport};
use crate::types::{Role, Sample, SensorEvent};

/// Connection lifecycle states.
///
/// `Disconnected → Connecting → Resolving → Connected`, and back to
/// `Disconnected` on teardown or radio-level failure. Re-entry into
/// `Connecting` happens only through an explicit [`DeviceSession::reconnect`]
/// (or a fresh [`DeviceSession::connect`]), never automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Resolving,
    Connected,
}

/// Configuration for a [`DeviceSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Match devices whose advertised name starts with this string.
    /// Default: `"IGEB"`.
    pub name_prefix: String,
    /// Scan duration in seconds before discovery gives up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Wire format of the impedance characteristic.
    pub impedance_scheme: DecodeScheme,
    /// Wire format of the signal characteristic.
    pub signal_scheme: DecodeScheme,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEVICE_NAME_PREFIX.into(),
            scan_timeout_secs: 15,
            impedance_scheme: IMPEDANCE_DECODE,
            signal_scheme: SIGNAL_DECODE,
        }
    }
}

/// Owns the connection lifecycle against one transport.
pub struct DeviceSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: Arc<RwLock<SessionState>>,
    device: Option<DeviceIdentity>,
    impedance_char: Option<CharacteristicHandle>,
    signal_char: Option<CharacteristicHandle>,
    events: mpsc::Sender<SensorEvent>,
    pump: Option<JoinHandle<()>>,
}

impl<T: Transport> DeviceSession<T> {
    /// Create a session and the event channel its consumer reads from.
    pub fn new(transport: T, config: SessionConfig) -> (Self, mpsc::Receiver<SensorEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let session = Self {
            transport,
            config,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            device: None,
            impedance_char: None,
            signal_char: None,
            events: tx,
            pump: None,
        };
        (session, rx)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    /// Name of the connected device, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.name.as_str())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap() = state;
    }

    /// Discover, connect, and resolve both characteristic roles.
    ///
    /// Any failure along the way tears the attempt down completely and
    /// leaves the session `Disconnected`: no partial-connected state is
    /// ever observable, and nothing retries automatically. A session that is
    /// not `Disconnected` is torn down first.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Disconnected {
            self.disconnect().await?;
        }

        self.set_state(SessionState::Connecting);
        let filter = DiscoveryFilter {
            name_prefix: self.config.name_prefix.clone(),
            timeout_secs: self.config.scan_timeout_secs,
        };

        let device = match self.transport.discover(&filter).await {
            Ok(device) => device,
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = self.transport.connect(&device).await {
            self.transport.disconnect().await.ok();
            self.set_state(SessionState::Disconnected);
            return Err(e);
        }

        self.set_state(SessionState::Resolving);
        let resolved = self.resolve_roles().await;
        let (impedance_char, signal_char) = match resolved {
            Ok(handles) => handles,
            Err(e) => {
                self.transport.disconnect().await.ok();
                self.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        self.impedance_char = Some(impedance_char);
        self.signal_char = Some(signal_char);
        self.set_state(SessionState::Connected);
        info!("connected: {}", device.name);
        let _ = self
            .events
            .send(SensorEvent::Connected(device.name.clone()))
            .await;
        self.device = Some(device);

        match self.transport.read_battery_level().await {
            Ok(Some(percent)) => {
                let _ = self.events.send(SensorEvent::Battery(percent)).await;
            }
            Ok(None) => {}
            Err(e) => debug!("battery readout failed: {e}"),
        }

        Ok(())
    }

    async fn resolve_roles(
        &mut self,
    ) -> Result<(CharacteristicHandle, CharacteristicHandle), SessionError> {
        let impedance = self
            .transport
            .resolve_characteristic(Role::Impedance)
            .await?;
        let signal = self.transport.resolve_characteristic(Role::Signal).await?;
        Ok((impedance, signal))
    }

    /// Explicit, user-triggered re-entry into the connect sequence.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        info!("reconnect requested");
        self.disconnect().await?;
        self.connect().await
    }

    /// Activate notification delivery for both roles and start the decode
    /// pump.
    ///
    /// At most one pump and one subscription per role exist at any time:
    /// calling this again first unsubscribes and stops the previous pump, so
    /// a repeated call can never register duplicate listeners.
    pub async fn subscribe_all(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        if self.pump.is_some() {
            debug!("re-subscribe requested; dropping previous subscriptions first");
            self.unsubscribe_all().await;
        }

        let impedance = self.impedance_char.clone().ok_or(SessionError::NotConnected)?;
        let signal = self.signal_char.clone().ok_or(SessionError::NotConnected)?;
        self.transport.subscribe(&impedance).await?;
        self.transport.subscribe(&signal).await?;

        let mut stream = self.transport.notifications().await?;
        let impedance_scheme = self.config.impedance_scheme;
        let signal_scheme = self.config.signal_scheme;
        let tx = self.events.clone();
        let state = Arc::clone(&self.state);

        self.pump = Some(tokio::spawn(async move {
            use futures::StreamExt;

            while let Some(notification) = stream.next().await {
                let scheme = match notification.role {
                    Role::Impedance => impedance_scheme,
                    Role::Signal => signal_scheme,
                };
                match scheme.decode(notification.role, &notification.payload) {
                    Ok(value) => {
                        let sample = Sample::new(notification.role, value);
                        if tx.send(SensorEvent::Sample(sample)).await.is_err() {
                            return;
                        }
                    }
                    // Malformed payload: drop the sample, keep the stream.
                    Err(e) => warn!("dropping sample: {e}"),
                }
            }

            // The stream only ends when the link drops underneath us.
            if transition_to_disconnected(&state) {
                info!("notification stream ended, link lost");
                let _ = tx.send(SensorEvent::Disconnected).await;
            }
        }));

        Ok(())
    }

    /// One-shot read and decode of the characteristic for `role`, the
    /// polling fallback for transports without push delivery.
    ///
    /// The decoded sample is also published on the event channel. Returns
    /// `Ok(None)` when the payload was malformed (logged and dropped, like a
    /// notification).
    pub async fn poll_once(&mut self, role: Role) -> Result<Option<Sample>, SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let handle = match role {
            Role::Impedance => &self.impedance_char,
            Role::Signal => &self.signal_char,
        }
        .clone()
        .ok_or(SessionError::NotConnected)?;

        let raw = self.transport.read_once(&handle).await?;
        let scheme = match role {
            Role::Impedance => self.config.impedance_scheme,
            Role::Signal => self.config.signal_scheme,
        };
        match scheme.decode(role, &raw) {
            Ok(value) => {
                let sample = Sample::new(role, value);
                let _ = self
                    .events
                    .send(SensorEvent::Sample(sample.clone()))
                    .await;
                Ok(Some(sample))
            }
            Err(e) => {
                warn!("dropping polled sample: {e}");
                Ok(None)
            }
        }
    }

    /// Advertised service/characteristic tree of the connected device.
    pub async fn describe_gatt(&mut self) -> Result<Vec<GattService>, SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.transport.describe_gatt().await
    }

    async fn unsubscribe_all(&mut self) {
        // Stop the pump before touching the subscriptions so nothing is
        // delivered past this point.
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        for handle in [self.impedance_char.clone(), self.signal_char.clone()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.transport.unsubscribe(&handle).await {
                debug!("unsubscribe {}: {e}", handle.role);
            }
        }
    }

    /// Tear down subscriptions and release the peripheral. Idempotent; no
    /// sample is delivered after the `Disconnected` state is observable.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.unsubscribe_all().await;
        self.transport.disconnect().await.ok();
        self.impedance_char = None;
        self.signal_char = None;
        self.device = None;
        if transition_to_disconnected(&self.state) {
            info!("disconnected");
            let _ = self.events.send(SensorEvent::Disconnected).await;
        }
        Ok(())
    }
}

/// Flip to `Disconnected`; `true` if this call made the transition.
/// Manual teardown and a dying notification stream race here; whichever
/// runs first reports the event, the other sees `false`.
fn transition_to_disconnected(state: &Arc<RwLock<SessionState>>) -> bool {
    let mut guard = state.write().unwrap();
    if *guard == SessionState::Disconnected {
        false
    } else {
        *guard = SessionState::Disconnected;
        true
    }
}

impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

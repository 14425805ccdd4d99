//! Bluetooth Low Energy transport backed by `btleplug`.
//!
//! Owns the adapter and peripheral handles for one logical connection and
//! maps the GATT lifecycle onto the [`Transport`] capability set. The
//! session layer above never sees a `btleplug` type.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SessionError;
use crate::protocol::{
    BATTERY_LEVEL_CHARACTERISTIC, IGEB_SERVICE_UUID, IMPEDANCE_CHARACTERISTIC,
    SIGNAL_CHARACTERISTIC,
};
use crate::transport::{
    CharacteristicHandle, DeviceIdentity, DiscoveryFilter, GattService, RawNotification, Transport,
};
use crate::types::Role;

fn characteristic_uuid(role: Role) -> Uuid {
    match role {
        Role::Impedance => IMPEDANCE_CHARACTERISTIC,
        Role::Signal => SIGNAL_CHARACTERISTIC,
    }
}

fn role_for_uuid(uuid: Uuid) -> Option<Role> {
    if uuid == IMPEDANCE_CHARACTERISTIC {
        Some(Role::Impedance)
    } else if uuid == SIGNAL_CHARACTERISTIC {
        Some(Role::Signal)
    } else {
        None
    }
}

/// BLE transport for IGEB headsets.
pub struct BleTransport {
    cancel: CancellationToken,
    adapter: Option<Adapter>,
    peripheral: Option<Peripheral>,
    resolved: HashMap<Role, Characteristic>,
}

impl BleTransport {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            adapter: None,
            peripheral: None,
            resolved: HashMap::new(),
        }
    }

    /// Token that aborts an in-flight [`Transport::discover`] with
    /// `DiscoveryCancelled` when cancelled. Hand a clone to whatever drives
    /// the user's "cancel" affordance.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn default_adapter() -> Result<Adapter, SessionError> {
        let manager = Manager::new()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        adapters
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::Transport("no Bluetooth adapter found".into()))
    }

    /// Wait for CoreBluetooth to reach PoweredOn before scanning.
    ///
    /// Freshly after launch CBCentralManager starts in an "unknown" state and
    /// scanForPeripherals is a silent no-op until it is ready.
    #[cfg(target_os = "macos")]
    async fn wait_for_powered_on(adapter: &Adapter) {
        use btleplug::api::CentralState;
        use log::warn;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(state) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!("adapter still in state {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    debug!("adapter state = {state:?}, waiting…");
                }
                Err(e) => {
                    warn!("adapter_state() error: {e}");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    /// Poll the adapter's peripheral list until a name match appears.
    async fn find_first(adapter: &Adapter, prefix: &str) -> Peripheral {
        loop {
            let peripherals = adapter.peripherals().await.unwrap_or_default();
            for p in peripherals {
                if let Ok(Some(props)) = p.properties().await {
                    if let Some(name) = &props.local_name {
                        if name.starts_with(prefix) {
                            return p;
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    fn peripheral(&self) -> Result<&Peripheral, SessionError> {
        self.peripheral.as_ref().ok_or(SessionError::NotConnected)
    }

    fn resolved(&self, handle: &CharacteristicHandle) -> Result<&Characteristic, SessionError> {
        self.resolved
            .get(&handle.role)
            .ok_or(SessionError::CharacteristicNotFound(handle.role))
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn discover(&mut self, filter: &DiscoveryFilter) -> Result<DeviceIdentity, SessionError> {
        let adapter = Self::default_adapter().await?;

        #[cfg(target_os = "macos")]
        Self::wait_for_powered_on(&adapter).await;

        info!(
            "scanning for '{}*' (timeout: {} s) …",
            filter.name_prefix, filter.timeout_secs
        );
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let found = tokio::select! {
            _ = self.cancel.cancelled() => {
                adapter.stop_scan().await.ok();
                return Err(SessionError::DiscoveryCancelled);
            }
            result = tokio::time::timeout(
                Duration::from_secs(filter.timeout_secs),
                Self::find_first(&adapter, &filter.name_prefix),
            ) => {
                adapter.stop_scan().await.ok();
                result.map_err(|_| SessionError::DiscoveryTimeout(filter.timeout_secs))?
            }
        };

        let props = found
            .properties()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?
            .unwrap_or_default();
        let name = props.local_name.unwrap_or_else(|| "Unknown".into());
        let id = found.id().to_string();
        info!("found {name}  id={id}");

        self.adapter = Some(adapter);
        self.peripheral = Some(found);
        Ok(DeviceIdentity { id, name })
    }

    async fn connect(&mut self, device: &DeviceIdentity) -> Result<(), SessionError> {
        let peripheral = self.peripheral()?.clone();

        // Hard timeout: BlueZ's Connect can block forever when the device is
        // out of range or the stack is wedged. A real connect takes < 2 s.
        tokio::time::timeout(Duration::from_secs(10), peripheral.connect())
            .await
            .map_err(|_| SessionError::ConnectFailed("connect() timed out after 10 s".into()))?
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        // On Linux the stack signals connection completion before the remote
        // GATT cache is populated; discovering services too quickly returns
        // an empty set and every characteristic lookup fails.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| {
                SessionError::ConnectFailed("discover_services() timed out after 15 s".into())
            })?
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        info!("connected and services discovered: {}", device.name);
        Ok(())
    }

    async fn resolve_characteristic(
        &mut self,
        role: Role,
    ) -> Result<CharacteristicHandle, SessionError> {
        let peripheral = self.peripheral()?;

        if !peripheral
            .services()
            .iter()
            .any(|s| s.uuid == IGEB_SERVICE_UUID)
        {
            return Err(SessionError::ServiceNotFound);
        }

        let uuid = characteristic_uuid(role);
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(SessionError::CharacteristicNotFound(role))?;

        debug!("resolved {role} characteristic {uuid}");
        self.resolved.insert(role, characteristic);
        Ok(CharacteristicHandle { role, uuid })
    }

    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError> {
        let characteristic = self.resolved(handle)?.clone();
        self.peripheral()?
            .subscribe(&characteristic)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn unsubscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError> {
        let characteristic = self.resolved(handle)?.clone();
        self.peripheral()?
            .unsubscribe(&characteristic)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn notifications(
        &mut self,
    ) -> Result<BoxStream<'static, RawNotification>, SessionError> {
        let peripheral = self.peripheral()?;
        let stream = peripheral
            .notifications()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        // Watch the adapter's event stream for a DeviceDisconnected on this
        // peripheral and end the notification stream when it fires. The link
        // dropping (headset powered off, out of range) is often reported
        // there before the notification stream itself closes.
        let adapter = self
            .adapter
            .clone()
            .ok_or(SessionError::NotConnected)?;
        let peripheral_id = peripheral.id();
        let link_lost = async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("adapter reported disconnect of {id:?}");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("could not subscribe to adapter events: {e}");
                    futures::future::pending::<()>().await;
                }
            }
        };

        Ok(stream
            .filter_map(|n| async move {
                match role_for_uuid(n.uuid) {
                    Some(role) => Some(RawNotification {
                        role,
                        payload: n.value,
                    }),
                    None => {
                        debug!("notification from unknown characteristic {}", n.uuid);
                        None
                    }
                }
            })
            .take_until(Box::pin(link_lost))
            .boxed())
    }

    async fn read_once(&mut self, handle: &CharacteristicHandle) -> Result<Vec<u8>, SessionError> {
        let characteristic = self.resolved(handle)?.clone();
        self.peripheral()?
            .read(&characteristic)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn read_battery_level(&mut self) -> Result<Option<u8>, SessionError> {
        let peripheral = self.peripheral()?;
        let Some(characteristic) = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == BATTERY_LEVEL_CHARACTERISTIC)
        else {
            debug!("device exposes no battery characteristic");
            return Ok(None);
        };
        let value = peripheral
            .read(&characteristic)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(value.first().copied())
    }

    async fn describe_gatt(&mut self) -> Result<Vec<GattService>, SessionError> {
        let peripheral = self.peripheral()?;
        Ok(peripheral
            .services()
            .into_iter()
            .map(|s| GattService {
                uuid: s.uuid,
                characteristics: s.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.resolved.clear();
        if let Some(peripheral) = self.peripheral.take() {
            if let Err(e) = peripheral.disconnect().await {
                debug!("disconnect: {e}");
            }
        }
        self.adapter = None;
        Ok(())
    }
}

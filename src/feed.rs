//! Remote-relay transport: an alternative sample source where payloads
//! arrive over a server-pushed event feed instead of the radio.
//!
//! The relay side of the link is represented by [`FeedHandle`]; whatever
//! bridges the actual wire (an SSE client, a websocket, a test) pushes
//! `{role, payload}` frames through it and answers capture requests. The
//! session consumes the feed through the same [`Transport`] capability set
//! as the radio, so the two sources are interchangeable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::debug;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::SessionError;
use crate::protocol::{IGEB_SERVICE_UUID, IMPEDANCE_CHARACTERISTIC, SIGNAL_CHARACTERISTIC};
use crate::transport::{
    CharacteristicHandle, DeviceIdentity, DiscoveryFilter, GattService, RawNotification, Transport,
};
use crate::types::Role;

fn characteristic_uuid(role: Role) -> uuid::Uuid {
    match role {
        Role::Impedance => IMPEDANCE_CHARACTERISTIC,
        Role::Signal => SIGNAL_CHARACTERISTIC,
    }
}

/// A request to start or stop a capture on the relay side.
///
/// The relay acknowledges through `ack`; [`RemoteFeed::request_capture`]
/// resolves once the acknowledgement arrives.
#[derive(Debug)]
pub struct CaptureRequest {
    pub active: bool,
    pub ack: oneshot::Sender<()>,
}

/// Shared state between the transport and its relay handle.
struct Shared {
    device_name: String,
    online: AtomicBool,
    battery: Mutex<Option<u8>>,
    /// Most recent payload per role, served by the polling fallback.
    latest: Mutex<HashMap<Role, Vec<u8>>>,
}

/// The relay side of the feed. Push frames and answer capture requests here.
pub struct FeedHandle {
    shared: Arc<Shared>,
    frames: broadcast::Sender<RawNotification>,
    /// Capture start/stop requests issued by the consumer side.
    pub capture_requests: mpsc::UnboundedReceiver<CaptureRequest>,
}

impl FeedHandle {
    /// Push one raw payload into the feed. Also retained as the latest value
    /// for [`Transport::read_once`]. Returns the number of live subscribers.
    pub fn push(&self, role: Role, payload: Vec<u8>) -> usize {
        self.shared
            .latest
            .lock()
            .unwrap()
            .insert(role, payload.clone());
        self.frames
            .send(RawNotification { role, payload })
            .unwrap_or(0)
    }

    /// Make the feed (un)discoverable, e.g. to simulate the relay going away.
    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::Relaxed);
    }

    /// Battery percent reported on the next connect, if any.
    pub fn set_battery(&self, percent: Option<u8>) {
        *self.shared.battery.lock().unwrap() = percent;
    }
}

/// Transport over a relay-pushed sample stream.
pub struct RemoteFeed {
    shared: Arc<Shared>,
    frames: broadcast::Sender<RawNotification>,
    capture_tx: mpsc::UnboundedSender<CaptureRequest>,
    subscribed: HashSet<Role>,
    connected: bool,
}

impl RemoteFeed {
    /// Create a feed transport and the handle its relay side is driven by.
    pub fn new(device_name: impl Into<String>) -> (Self, FeedHandle) {
        let (frames, _) = broadcast::channel(256);
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            device_name: device_name.into(),
            online: AtomicBool::new(true),
            battery: Mutex::new(None),
            latest: Mutex::new(HashMap::new()),
        });
        let transport = Self {
            shared: Arc::clone(&shared),
            frames: frames.clone(),
            capture_tx,
            subscribed: HashSet::new(),
            connected: false,
        };
        let handle = FeedHandle {
            shared,
            frames,
            capture_requests: capture_rx,
        };
        (transport, handle)
    }

    /// Ask the relay to start (`true`) or stop (`false`) a remote-side
    /// capture, resolving once the relay acknowledges.
    pub async fn request_capture(&self, active: bool) -> Result<(), SessionError> {
        let (ack, done) = oneshot::channel();
        self.capture_tx
            .send(CaptureRequest { active, ack })
            .map_err(|_| SessionError::Transport("relay is gone".into()))?;
        done.await
            .map_err(|_| SessionError::Transport("relay dropped the capture request".into()))
    }
}

#[async_trait]
impl Transport for RemoteFeed {
    async fn discover(&mut self, filter: &DiscoveryFilter) -> Result<DeviceIdentity, SessionError> {
        if !self.shared.online.load(Ordering::Relaxed)
            || !self.shared.device_name.starts_with(&filter.name_prefix)
        {
            // Nothing matching will appear; honor the scan window anyway.
            tokio::time::sleep(Duration::from_secs(filter.timeout_secs)).await;
            return Err(SessionError::DiscoveryTimeout(filter.timeout_secs));
        }
        Ok(DeviceIdentity {
            id: format!("feed:{}", self.shared.device_name),
            name: self.shared.device_name.clone(),
        })
    }

    async fn connect(&mut self, device: &DeviceIdentity) -> Result<(), SessionError> {
        if !self.shared.online.load(Ordering::Relaxed) {
            return Err(SessionError::ConnectFailed("relay offline".into()));
        }
        debug!("feed connected: {}", device.name);
        self.connected = true;
        Ok(())
    }

    async fn resolve_characteristic(
        &mut self,
        role: Role,
    ) -> Result<CharacteristicHandle, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        Ok(CharacteristicHandle {
            role,
            uuid: characteristic_uuid(role),
        })
    }

    async fn subscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.subscribed.insert(handle.role);
        Ok(())
    }

    async fn unsubscribe(&mut self, handle: &CharacteristicHandle) -> Result<(), SessionError> {
        self.subscribed.remove(&handle.role);
        Ok(())
    }

    async fn notifications(
        &mut self,
    ) -> Result<BoxStream<'static, RawNotification>, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        let roles = self.subscribed.clone();
        let mut rx = self.frames.subscribe();
        let (tx, out) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) if roles.contains(&frame.role) => {
                        if tx.unbounded_send(frame).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("feed consumer lagged, {missed} frame(s) dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(out.boxed())
    }

    async fn read_once(&mut self, handle: &CharacteristicHandle) -> Result<Vec<u8>, SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.shared
            .latest
            .lock()
            .unwrap()
            .get(&handle.role)
            .cloned()
            .ok_or_else(|| SessionError::Transport("no value pushed for role yet".into()))
    }

    async fn read_battery_level(&mut self) -> Result<Option<u8>, SessionError> {
        Ok(*self.shared.battery.lock().unwrap())
    }

    async fn describe_gatt(&mut self) -> Result<Vec<GattService>, SessionError> {
        Ok(vec![GattService {
            uuid: IGEB_SERVICE_UUID,
            characteristics: vec![IMPEDANCE_CHARACTERISTIC, SIGNAL_CHARACTERISTIC],
        }])
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.subscribed.clear();
        self.connected = false;
        Ok(())
    }
}

//! The acquisition engine: the single consumer of a session's event stream,
//! fanning each sample out to the rolling window, the quality classifier and
//! the recording session.
//!
//! All mutation happens from one delivery path: feed it events from exactly
//! one [`crate::session::DeviceSession`] channel. A delivered event runs to
//! completion before the next is handled, so none of the underlying
//! structures need further locking.

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RecordingError;
use crate::export::export_csv;
use crate::quality::{QualityThresholds, QualityTier, RollingWindow, DEFAULT_WINDOW_CAPACITY};
use crate::recording::{RecordingSession, RecordingStatus};
use crate::types::{Role, Sample, SensorEvent};

/// Policy knobs of the live-metrics/recording fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rolling-window capacity for the live impedance chart. Default: 50.
    pub window_capacity: usize,
    /// Quality tier cut points, in decoder units.
    pub thresholds: QualityThresholds,
    /// Co-record impedance samples into an active capture alongside signal
    /// samples. Firmware deployments disagree on this, so it is policy, not
    /// a fixed rule. Default: `false` (signal-only captures).
    pub record_impedance: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            thresholds: QualityThresholds::default(),
            record_impedance: false,
        }
    }
}

/// Live acquisition state for one device session.
pub struct AcquisitionEngine {
    thresholds: QualityThresholds,
    record_impedance: bool,
    window: RollingWindow,
    recording: RecordingSession,
    connected: bool,
    device_name: Option<String>,
    battery_percent: Option<u8>,
}

impl AcquisitionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            record_impedance: config.record_impedance,
            window: RollingWindow::new(config.window_capacity),
            recording: RecordingSession::new(),
            connected: false,
            device_name: None,
            battery_percent: None,
        }
    }

    /// Deliver one session event.
    pub async fn handle(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Connected(name) => {
                self.connected = true;
                self.device_name = Some(name);
                self.window.clear();
            }
            SensorEvent::Battery(percent) => {
                self.battery_percent = Some(percent);
            }
            SensorEvent::Disconnected => {
                self.connected = false;
                self.device_name = None;
                self.battery_percent = None;
                self.window.clear();
            }
            SensorEvent::Sample(sample) => self.ingest(&sample).await,
        }
    }

    async fn ingest(&mut self, sample: &Sample) {
        match sample.role {
            Role::Impedance => {
                self.window.push(sample.value);
                if self.record_impedance {
                    self.recording.offer(sample).await;
                }
            }
            Role::Signal => self.recording.offer(sample).await,
        }
    }

    /// Start a capture; with `deadline_secs` it stops itself at the deadline.
    ///
    /// Fails with `NotConnected` unless the device session is connected, and
    /// with `AlreadyActive` while a capture runs; neither failure mutates
    /// anything.
    pub async fn start_recording(
        &mut self,
        deadline_secs: Option<u64>,
    ) -> Result<(), RecordingError> {
        if !self.connected {
            return Err(RecordingError::NotConnected);
        }
        self.recording
            .start(deadline_secs.map(Duration::from_secs))
            .await
    }

    /// End the capture (reported no-op outside `Active`).
    pub async fn stop_recording(&mut self) {
        self.recording.stop().await;
    }

    /// Discard a completed capture, permitting a new one.
    pub async fn reset_recording(&mut self) {
        self.recording.reset().await;
    }

    /// Export the captured samples as a CSV payload. Where the bytes go is
    /// the caller's business.
    pub async fn export(&self) -> Vec<u8> {
        let samples = self.recording.samples().await;
        debug!("exporting {} sample(s)", samples.len());
        export_csv(&samples)
    }

    pub async fn recording_status(&self) -> RecordingStatus {
        self.recording.status().await
    }

    pub async fn recorded_count(&self) -> usize {
        self.recording.sample_count().await
    }

    /// Contact quality derived from the latest impedance reading.
    pub fn quality(&self) -> QualityTier {
        self.thresholds.classify(self.window.latest())
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.battery_percent
    }
}

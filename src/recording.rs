//! Timed recording session: a small state machine that buffers samples
//! between `start()` and `stop()`, with an optional deadline that stops the
//! capture on its own.
//!
//! The deadline lives in an owned, cancellable task. Manual `stop()` aborts
//! it, and a deadline that fires marks the session `Completed` so a later
//! manual `stop()` is a reported no-op. Exactly one of the two paths
//! performs the transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::RecordingError;
use crate::types::Sample;

/// `Idle → Active → Completed → (reset) → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingStatus {
    Idle,
    Active,
    Completed,
}

#[derive(Debug)]
struct RecordingState {
    status: RecordingStatus,
    started_at: Option<DateTime<Utc>>,
    samples: Vec<Sample>,
    /// Bumped on every `start()`; a deadline task only completes the run it
    /// was scheduled for.
    generation: u64,
}

/// A bounded, timed capture of samples.
pub struct RecordingSession {
    inner: Arc<Mutex<RecordingState>>,
    deadline_task: Option<JoinHandle<()>>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecordingState {
                status: RecordingStatus::Idle,
                started_at: None,
                samples: Vec::new(),
                generation: 0,
            })),
            deadline_task: None,
        }
    }

    pub async fn status(&self) -> RecordingStatus {
        self.inner.lock().await.status
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.started_at
    }

    pub async fn sample_count(&self) -> usize {
        self.inner.lock().await.samples.len()
    }

    /// Snapshot of the accumulated samples in arrival order.
    pub async fn samples(&self) -> Vec<Sample> {
        self.inner.lock().await.samples.clone()
    }

    /// Begin a capture, clearing any previous buffer.
    ///
    /// With a `deadline`, an automatic stop is scheduled for
    /// `started_at + deadline`. Fails with `AlreadyActive` while a capture is
    /// running, leaving the running capture untouched.
    pub async fn start(&mut self, deadline: Option<Duration>) -> Result<(), RecordingError> {
        let generation = {
            let mut state = self.inner.lock().await;
            if state.status == RecordingStatus::Active {
                return Err(RecordingError::AlreadyActive);
            }
            state.status = RecordingStatus::Active;
            state.started_at = Some(Utc::now());
            state.samples.clear();
            state.generation += 1;
            state.generation
        };

        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }

        if let Some(deadline) = deadline {
            let inner = Arc::clone(&self.inner);
            self.deadline_task = Some(tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                let mut state = inner.lock().await;
                if state.status == RecordingStatus::Active && state.generation == generation {
                    state.status = RecordingStatus::Completed;
                    info!(
                        "recording deadline reached, {} sample(s) captured",
                        state.samples.len()
                    );
                }
            }));
            info!("recording started (auto-stop in {deadline:?})");
        } else {
            info!("recording started (manual stop)");
        }

        Ok(())
    }

    /// Append a sample if (and only if) the capture is active.
    ///
    /// Role filtering is the caller's concern; see
    /// [`crate::engine::AcquisitionEngine`].
    pub async fn offer(&self, sample: &Sample) {
        let mut state = self.inner.lock().await;
        if state.status == RecordingStatus::Active {
            state.samples.push(sample.clone());
        }
    }

    /// End the capture and freeze the buffer for export.
    ///
    /// Cancels a pending scheduled stop. Outside `Active` this is a no-op
    /// with a reported warning. A capture with zero samples completes
    /// normally, the export is just empty.
    pub async fn stop(&mut self) {
        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }
        let mut state = self.inner.lock().await;
        if state.status != RecordingStatus::Active {
            warn!("stop requested but no recording is active");
            return;
        }
        state.status = RecordingStatus::Completed;
        info!("recording stopped, {} sample(s) captured", state.samples.len());
    }

    /// Return to `Idle` and clear the buffer, permitting a new `start()`.
    /// Only legal from `Completed`; anywhere else it is a reported no-op.
    pub async fn reset(&mut self) {
        let mut state = self.inner.lock().await;
        if state.status != RecordingStatus::Completed {
            warn!("reset requested but recording is not completed");
            return;
        }
        state.status = RecordingStatus::Idle;
        state.started_at = None;
        state.samples.clear();
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{Role, Sample};

    fn signal(value: f64) -> Sample {
        Sample::new(Role::Signal, value)
    }

    #[tokio::test]
    async fn samples_accumulate_only_while_active() {
        let mut rec = RecordingSession::new();
        rec.offer(&signal(1.0)).await;
        assert_eq!(rec.sample_count().await, 0);

        rec.start(None).await.unwrap();
        rec.offer(&signal(2.0)).await;
        rec.stop().await;
        rec.offer(&signal(3.0)).await;

        let values: Vec<f64> = rec.samples().await.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0]);
        assert_eq!(rec.status().await, RecordingStatus::Completed);
    }

    #[tokio::test]
    async fn second_start_fails_and_keeps_first_buffer() {
        let mut rec = RecordingSession::new();
        rec.start(None).await.unwrap();
        rec.offer(&signal(10.0)).await;

        assert_eq!(rec.start(None).await, Err(RecordingError::AlreadyActive));
        assert_eq!(rec.sample_count().await, 1);
        assert_eq!(rec.status().await, RecordingStatus::Active);
    }

    #[tokio::test]
    async fn stop_outside_active_is_a_noop() {
        let mut rec = RecordingSession::new();
        rec.stop().await;
        assert_eq!(rec.status().await, RecordingStatus::Idle);

        rec.start(None).await.unwrap();
        rec.stop().await;
        rec.stop().await;
        assert_eq!(rec.status().await, RecordingStatus::Completed);
    }

    #[tokio::test]
    async fn reset_only_from_completed() {
        let mut rec = RecordingSession::new();
        rec.start(None).await.unwrap();
        rec.offer(&signal(1.0)).await;

        rec.reset().await; // still active, ignored
        assert_eq!(rec.status().await, RecordingStatus::Active);

        rec.stop().await;
        rec.reset().await;
        assert_eq!(rec.status().await, RecordingStatus::Idle);
        assert_eq!(rec.sample_count().await, 0);

        rec.start(None).await.unwrap();
        assert_eq!(rec.status().await, RecordingStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_completes_the_capture() {
        let mut rec = RecordingSession::new();
        rec.start(Some(Duration::from_secs(2))).await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        rec.offer(&signal(42.0)).await;

        tokio::time::sleep(Duration::from_millis(1500)).await; // t = 2.5 s
        assert_eq!(rec.status().await, RecordingStatus::Completed);
        rec.offer(&signal(43.0)).await; // late sample, not recorded

        let values: Vec<f64> = rec.samples().await.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![42.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_cancels_the_deadline() {
        let mut rec = RecordingSession::new();
        rec.start(Some(Duration::from_secs(10))).await.unwrap();
        rec.stop().await;
        assert_eq!(rec.status().await, RecordingStatus::Completed);

        // A fresh manual-stop capture must not be killed by anything left
        // over from the timed one.
        rec.reset().await;
        rec.start(None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rec.status().await, RecordingStatus::Active);
    }

    #[tokio::test]
    async fn zero_sample_stop_completes_cleanly() {
        let mut rec = RecordingSession::new();
        rec.start(None).await.unwrap();
        rec.stop().await;
        assert_eq!(rec.status().await, RecordingStatus::Completed);
        assert!(rec.samples().await.is_empty());
    }
}

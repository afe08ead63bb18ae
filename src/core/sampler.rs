use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::camera::FrameSource;
use crate::common::{CaptureError, Result};
use crate::core::detector::{Detection, DetectionProvider, FrameDimensions};
use crate::core::gate::{AcceptanceGate, ThresholdProfile};
use crate::core::session::{FailureReason, SampleKind, SharedSession, Transition};

pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One frame read plus the provider's answer for it.
#[derive(Debug, Clone)]
pub struct Sample {
    pub frame: FrameDimensions,
    pub detection: Option<Detection>,
    pub taken_at: Instant,
}

/// Reads the current frame from the video source and runs detection on it.
///
/// At most one sample is in flight at a time: periodic ticks skip while the
/// permit is held, explicit one-shot samples wait for it.
pub struct FrameSampler {
    source: Arc<dyn FrameSource>,
    provider: Arc<dyn DetectionProvider>,
    sample_timeout: Duration,
    permit: Mutex<()>,
    taken: AtomicU64,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn FrameSource>, provider: Arc<dyn DetectionProvider>) -> Self {
        Self {
            source,
            provider,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            permit: Mutex::new(()),
            taken: AtomicU64::new(0),
        }
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.provider.is_ready()
    }

    /// Samples unless another sample is still running, in which case the tick
    /// is dropped and `None` returned.
    pub async fn try_sample(&self, min_score: f32) -> Result<Option<Sample>> {
        let _permit = match self.permit.try_lock() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Previous sample still in flight, skipping tick");
                return Ok(None);
            }
        };
        self.run(min_score).await.map(Some)
    }

    /// Waits for any in-flight sample, then takes a fresh one.
    pub async fn sample(&self, min_score: f32) -> Result<Sample> {
        let _permit = self.permit.lock().await;
        self.run(min_score).await
    }

    async fn run(&self, min_score: f32) -> Result<Sample> {
        let capture_start = Instant::now();
        let frame = self.source.current_frame()?;
        let capture_time = capture_start.elapsed();

        let detect_start = Instant::now();
        let detection = tokio::time::timeout(
            self.sample_timeout,
            self.provider.detect(&frame, min_score),
        )
        .await
        .map_err(|_| CaptureError::SampleTimeout(self.sample_timeout))??;
        let detect_time = detect_start.elapsed();

        let taken = self.taken.fetch_add(1, Ordering::Relaxed) + 1;
        if taken % 10 == 0 || taken == 1 {
            info!(
                "Sample {} timing: capture={:.1}ms, detect={:.1}ms",
                taken,
                capture_time.as_secs_f32() * 1000.0,
                detect_time.as_secs_f32() * 1000.0
            );
        } else {
            debug!(
                sample = taken,
                face = detection.is_some(),
                "Sampled in {:.1}ms",
                (capture_time + detect_time).as_secs_f32() * 1000.0
            );
        }

        Ok(Sample {
            frame: frame.dimensions(),
            detection,
            taken_at: Instant::now(),
        })
    }
}

/// Cadence and acceptance rule for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollPlan {
    pub interval: Duration,
    pub profile: ThresholdProfile,
    pub kind: SampleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Succeeded,
    TimedOut,
    Failed,
    Cancelled,
    /// The session left `Detecting` through some other path.
    Stopped,
}

/// Samples on a fixed cadence until the session leaves `Detecting`.
///
/// The deadline branch is polled before the tick and sample branches, so once
/// the deadline is reached no later sample can be recorded.
pub async fn poll_session(
    session: Arc<SharedSession>,
    sampler: Arc<FrameSampler>,
    gate: AcceptanceGate,
    plan: PollPlan,
    mut cancel: watch::Receiver<bool>,
) -> LoopExit {
    let deadline = match session.read(|s| s.deadline_at()) {
        Some(deadline) => deadline,
        None => return LoopExit::Stopped,
    };

    let mut ticker = interval(plan.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => return LoopExit::Cancelled,
            _ = sleep_until(deadline) => return expire(&session),
            _ = ticker.tick() => {}
        }

        if *cancel.borrow() {
            return LoopExit::Cancelled;
        }

        let sampled = tokio::select! {
            biased;
            _ = cancel.changed() => return LoopExit::Cancelled,
            _ = sleep_until(deadline) => return expire(&session),
            sampled = sampler.try_sample(plan.profile.min_score) => sampled,
        };

        let sample = match sampled {
            Ok(Some(sample)) => sample,
            Ok(None) => continue,
            Err(CaptureError::SampleTimeout(limit)) => {
                warn!("Sample timed out after {:?}, waiting for next tick", limit);
                continue;
            }
            Err(e) => return fail(&session, &e),
        };

        let verdict = match gate.evaluate(sample.detection.as_ref(), sample.frame, &plan.profile) {
            Ok(verdict) => verdict,
            Err(e) => return fail(&session, &e),
        };

        let now = Instant::now();
        let recorded =
            session.update(|s| s.record_sample(now, plan.kind, sample.detection, &verdict));
        match recorded {
            Ok(Transition::Succeeded) => return LoopExit::Succeeded,
            Ok(Transition::TimedOut) => return LoopExit::TimedOut,
            Ok(_) => {}
            Err(e) => {
                debug!("Polling stopped: {}", e);
                return LoopExit::Stopped;
            }
        }
    }
}

fn expire(session: &SharedSession) -> LoopExit {
    session.update(|s| s.expire_if_due(Instant::now()));
    LoopExit::TimedOut
}

fn fail(session: &SharedSession, err: &CaptureError) -> LoopExit {
    error!("Sampling failed: {}", err);
    let _ = session.update(|s| s.fail(FailureReason::from_error(err)));
    LoopExit::Failed
}

/// Handle to a spawned polling loop.
///
/// Stopping is guaranteed on every exit path: `stop`, `shutdown` and `Drop`
/// all raise the cancel flag and abort the task.
pub struct PollingTask {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PollingTask {
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(f(cancel_rx));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn stop(&mut self) {
        self.cancel.send_replace(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Stops the loop and waits until the task has actually been torn down.
    pub async fn shutdown(mut self) {
        self.cancel.send_replace(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.stop();
    }
}

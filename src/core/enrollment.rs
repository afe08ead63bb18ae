use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::common::{CaptureError, Config, Result};
use crate::core::centering::{CenteringBounds, CenteringEvaluator};
use crate::core::gate::{AcceptanceGate, ThresholdProfile, Verdict};
use crate::core::sampler::{poll_session, FrameSampler, PollPlan, PollingTask};
use crate::core::session::{
    CaptureSession, CaptureStatus, FailureReason, SampleKind, SharedSession, StatusEvent,
    Transition, DEFAULT_DEADLINE,
};
use crate::service::{EnrollmentBackend, EnrollmentReceipt};

#[derive(Debug, Clone)]
pub struct EnrollmentSettings {
    pub feedback_interval: Duration,
    pub feedback_profile: ThresholdProfile,
    pub capture_profile: ThresholdProfile,
    pub deadline: Duration,
    pub centering: CenteringBounds,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            feedback_interval: Duration::from_millis(1000),
            feedback_profile: ThresholdProfile::FEEDBACK,
            capture_profile: ThresholdProfile::CAPTURE,
            deadline: DEFAULT_DEADLINE,
            centering: CenteringBounds::default(),
        }
    }
}

impl EnrollmentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            feedback_interval: Duration::from_millis(config.enrollment.feedback_interval_ms),
            feedback_profile: config.profiles.feedback,
            capture_profile: config.profiles.capture,
            deadline: config.capture.deadline(),
            centering: config.centering,
        }
    }
}

/// Face enrollment: continuous low-threshold hints while the user lines up,
/// and a single strict sample taken only when the user asks for it.
pub struct EnrollmentFlow {
    session: Arc<SharedSession>,
    sampler: Arc<FrameSampler>,
    gate: AcceptanceGate,
    backend: Arc<dyn EnrollmentBackend>,
    credential: String,
    settings: EnrollmentSettings,
    feedback: Option<PollingTask>,
    receipt: Option<EnrollmentReceipt>,
}

impl EnrollmentFlow {
    pub fn new(
        sampler: Arc<FrameSampler>,
        backend: Arc<dyn EnrollmentBackend>,
        credential: impl Into<String>,
        settings: EnrollmentSettings,
    ) -> Self {
        Self {
            session: SharedSession::new(CaptureSession::new(settings.deadline)),
            sampler,
            gate: AcceptanceGate::new(CenteringEvaluator::new(settings.centering)),
            backend,
            credential: credential.into(),
            settings,
            feedback: None,
            receipt: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.session.subscribe()
    }

    pub fn status(&self) -> CaptureStatus {
        self.session.status()
    }

    pub fn snapshot(&self) -> StatusEvent {
        self.session.read(|s| s.snapshot())
    }

    /// Backend acknowledgment of the last successful enrollment.
    pub fn receipt(&self) -> Option<&EnrollmentReceipt> {
        self.receipt.as_ref()
    }

    /// Enters `Detecting` and starts the feedback loop.
    pub fn start(&mut self) -> Result<()> {
        self.session.update(|s| s.start(Instant::now()))?;

        if !self.sampler.is_ready() {
            self.session.update(|s| s.fail(FailureReason::ProviderNotReady))?;
            return Err(CaptureError::ProviderNotReady);
        }

        let plan = PollPlan {
            interval: self.settings.feedback_interval,
            profile: self.settings.feedback_profile,
            kind: SampleKind::Feedback,
        };
        let session = self.session.clone();
        let sampler = self.sampler.clone();
        let gate = self.gate;
        self.feedback = Some(PollingTask::spawn(move |cancel| async move {
            let exit = poll_session(session, sampler, gate, plan, cancel).await;
            tracing::debug!("Enrollment feedback loop ended: {:?}", exit);
        }));

        info!("Enrollment capture started");
        Ok(())
    }

    /// Takes one sample under the capture profile.
    ///
    /// On acceptance, feedback stops and the embedding goes to the backend;
    /// a backend refusal ends the session in `Error` with the backend's own
    /// message. A rejected sample leaves the session detecting. A sample that
    /// lands on or after the deadline is an error, never a verdict.
    pub async fn capture(&mut self) -> Result<Verdict> {
        if self.session.read(|s| s.is_disposed()) {
            return Err(CaptureError::Disposed);
        }
        let status = self.session.status();
        if status != CaptureStatus::Detecting {
            return Err(CaptureError::InvalidTransition {
                from: status,
                action: "capture",
            });
        }

        let min_score = self.settings.capture_profile.min_score;
        let sample = match self.sampler.sample(min_score).await {
            Ok(sample) => sample,
            Err(e @ CaptureError::SampleTimeout(_)) => return Err(e),
            Err(e) => return Err(self.abort_with(e)),
        };

        let verdict = match self.gate.evaluate(
            sample.detection.as_ref(),
            sample.frame,
            &self.settings.capture_profile,
        ) {
            Ok(verdict) => verdict,
            Err(e) => return Err(self.abort_with(e)),
        };

        let now = Instant::now();
        let transition = self
            .session
            .update(|s| s.record_sample(now, SampleKind::Commit, sample.detection, &verdict))?;

        match transition {
            Transition::Succeeded => {
                self.stop_feedback();
                self.submit().await;
            }
            Transition::TimedOut => {
                self.stop_feedback();
                return Err(CaptureError::DeadlineExceeded(self.settings.deadline));
            }
            Transition::Rejected | Transition::Hinted => {}
        }

        Ok(verdict)
    }

    /// Back to `Idle` for a re-scan. Stops any running feedback loop.
    pub fn reset(&mut self) -> Result<()> {
        self.stop_feedback();
        self.receipt = None;
        self.session.update(|s| s.reset())
    }

    pub fn dispose(&mut self) {
        self.stop_feedback();
        self.session.update(|s| s.dispose());
    }

    async fn submit(&mut self) {
        let embedding = match self.session.read(|s| s.result().cloned()) {
            Some(embedding) => embedding,
            None => return,
        };

        let _ = self.session.update(|s| s.annotate("Saving enrollment..."));
        match self.backend.enroll(&embedding, &self.credential).await {
            Ok(receipt) => {
                info!("Enrollment accepted by backend");
                let message = if receipt.message.is_empty() {
                    "Face enrolled".to_string()
                } else {
                    receipt.message.clone()
                };
                let _ = self.session.update(|s| s.annotate(message));
                self.receipt = Some(receipt);
            }
            Err(e) => {
                warn!("Enrollment rejected: {}", e);
                let message = match e {
                    CaptureError::BackendRejected(message) => message,
                    other => other.to_string(),
                };
                let _ = self
                    .session
                    .update(|s| s.fail(FailureReason::BackendRejected(message)));
            }
        }
    }

    fn abort_with(&mut self, err: CaptureError) -> CaptureError {
        self.stop_feedback();
        let _ = self.session.update(|s| s.fail(FailureReason::from_error(&err)));
        err
    }

    fn stop_feedback(&mut self) {
        if let Some(mut task) = self.feedback.take() {
            task.stop();
        }
    }
}

impl Drop for EnrollmentFlow {
    fn drop(&mut self) {
        self.dispose();
    }
}

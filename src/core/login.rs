use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::common::{CaptureError, Config, Result};
use crate::core::centering::{CenteringBounds, CenteringEvaluator};
use crate::core::gate::{AcceptanceGate, ThresholdProfile};
use crate::core::sampler::{poll_session, FrameSampler, LoopExit, PollPlan, PollingTask};
use crate::core::session::{
    CaptureSession, CaptureStatus, FailureReason, SampleKind, SharedSession, StatusEvent,
    DEFAULT_DEADLINE,
};
use crate::service::{VerificationBackend, VerifiedLogin};

/// Shown for every verification refusal so the response does not reveal
/// whether the identifier exists.
pub const LOGIN_REJECTED_MESSAGE: &str = "Face verification failed. Please try again.";

#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub poll_interval: Duration,
    pub profile: ThresholdProfile,
    pub deadline: Duration,
    pub centering: CenteringBounds,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(800),
            profile: ThresholdProfile::LOGIN,
            deadline: DEFAULT_DEADLINE,
            centering: CenteringBounds::default(),
        }
    }
}

impl LoginSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.login.poll_interval_ms),
            profile: config.profiles.login,
            deadline: config.capture.deadline(),
            centering: config.centering,
        }
    }
}

/// Where a login attempt ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Pending,
    Verified(VerifiedLogin),
    Failed(String),
}

/// Face login: polls until the first sample passes the login profile, then
/// sends that embedding with the user's email for verification.
///
/// There is no automatic retry. After any failure the caller must `reset` and
/// `start` again.
pub struct LoginFlow {
    session: Arc<SharedSession>,
    sampler: Arc<FrameSampler>,
    gate: AcceptanceGate,
    backend: Arc<dyn VerificationBackend>,
    settings: LoginSettings,
    task: Option<PollingTask>,
    outcome: watch::Receiver<LoginOutcome>,
}

impl LoginFlow {
    pub fn new(
        sampler: Arc<FrameSampler>,
        backend: Arc<dyn VerificationBackend>,
        settings: LoginSettings,
    ) -> Self {
        let (_, outcome) = watch::channel(LoginOutcome::Pending);
        Self {
            session: SharedSession::new(CaptureSession::new(settings.deadline)),
            sampler,
            gate: AcceptanceGate::new(CenteringEvaluator::new(settings.centering)),
            backend,
            settings,
            task: None,
            outcome,
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

    pub fn outcome(&self) -> LoginOutcome {
        self.outcome.borrow().clone()
    }

    /// Enters `Detecting` and starts auto-detection for `email`.
    pub fn start(&mut self, email: impl Into<String>) -> Result<()> {
        self.session.update(|s| s.start(Instant::now()))?;

        let (outcome_tx, outcome_rx) = watch::channel(LoginOutcome::Pending);
        self.outcome = outcome_rx;

        if !self.sampler.is_ready() {
            self.session.update(|s| s.fail(FailureReason::ProviderNotReady))?;
            outcome_tx.send_replace(LoginOutcome::Failed(FailureReason::ProviderNotReady.to_string()));
            return Err(CaptureError::ProviderNotReady);
        }

        let email = email.into();
        let plan = PollPlan {
            interval: self.settings.poll_interval,
            profile: self.settings.profile,
            kind: SampleKind::Commit,
        };
        let session = self.session.clone();
        let sampler = self.sampler.clone();
        let backend = self.backend.clone();
        let gate = self.gate;

        self.task = Some(PollingTask::spawn(move |cancel| async move {
            let exit = poll_session(session.clone(), sampler, gate, plan, cancel).await;
            let outcome = match exit {
                LoopExit::Succeeded => verify(&session, backend.as_ref(), &email).await,
                LoopExit::Cancelled => return,
                _ => LoginOutcome::Failed(session.read(|s| s.message().to_string())),
            };
            outcome_tx.send_replace(outcome);
        }));

        info!("Login auto-detection started");
        Ok(())
    }

    /// Waits until the attempt is verified or has failed.
    pub async fn wait(&self) -> LoginOutcome {
        let mut outcome = self.outcome.clone();
        let settled = outcome
            .wait_for(|o| !matches!(o, LoginOutcome::Pending))
            .await
            .map(|o| o.clone());
        settled.unwrap_or_else(|_| LoginOutcome::Failed("login attempt was cancelled".to_string()))
    }

    /// Back to `Idle` after a failure. `Success` is terminal for login, also
    /// while verification is still running.
    pub fn reset(&mut self) -> Result<()> {
        let verified = matches!(self.outcome(), LoginOutcome::Verified(_));
        if verified || self.session.status() == CaptureStatus::Success {
            return Err(CaptureError::InvalidTransition {
                from: CaptureStatus::Success,
                action: "reset",
            });
        }
        self.stop_polling();
        self.session.update(|s| s.reset())?;
        let (_, outcome) = watch::channel(LoginOutcome::Pending);
        self.outcome = outcome;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.stop_polling();
        self.session.update(|s| s.dispose());
    }

    fn stop_polling(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
        }
    }
}

impl Drop for LoginFlow {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn verify(
    session: &SharedSession,
    backend: &dyn VerificationBackend,
    email: &str,
) -> LoginOutcome {
    let embedding = match session.read(|s| s.result().cloned()) {
        Some(embedding) => embedding,
        None => return LoginOutcome::Failed("no embedding captured".to_string()),
    };

    let _ = session.update(|s| s.annotate("Verifying..."));
    match backend.verify(email, &embedding).await {
        Ok(login) => {
            info!(user_id = %login.user.id, "Face login verified");
            let _ = session.update(|s| s.annotate("Login successful"));
            LoginOutcome::Verified(login)
        }
        Err(e) => {
            warn!("Face login rejected: {}", e);
            let _ = session.update(|s| {
                s.fail(FailureReason::BackendRejected(LOGIN_REJECTED_MESSAGE.to_string()))
            });
            LoginOutcome::Failed(LOGIN_REJECTED_MESSAGE.to_string())
        }
    }
}

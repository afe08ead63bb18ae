use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::common::{CaptureError, Result};
use crate::core::detector::{Detection, Embedding};
use crate::core::gate::Verdict;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);

const DETECTING_MESSAGE: &str = "Looking for your face...";
const READY_MESSAGE: &str = "Face aligned, ready to capture";
const CAPTURED_MESSAGE: &str = "Face captured";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Detecting,
    Success,
    Error,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Detecting => "detecting",
            CaptureStatus::Success => "success",
            CaptureStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Why a session ended in `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Timeout,
    ProviderNotReady,
    Provider(String),
    BackendRejected(String),
}

impl FailureReason {
    pub fn from_error(err: &CaptureError) -> Self {
        match err {
            CaptureError::ProviderNotReady => FailureReason::ProviderNotReady,
            CaptureError::DeadlineExceeded(_) => FailureReason::Timeout,
            other => FailureReason::Provider(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::ProviderNotReady => write!(f, "face model is not loaded yet"),
            FailureReason::Provider(msg) => write!(f, "detection failed: {}", msg),
            FailureReason::BackendRejected(msg) => write!(f, "{}", msg),
        }
    }
}

/// Snapshot published to observers after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub status: CaptureStatus,
    pub message: String,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// Whether a sample only drives hints or may complete the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Feedback,
    Commit,
}

/// What recording a sample did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Hinted,
    Rejected,
    Succeeded,
    TimedOut,
}

/// The capture state machine. Holds no timers: callers pass the current
/// instant, which keeps it driveable from tests and from the polling loop.
#[derive(Debug)]
pub struct CaptureSession {
    status: CaptureStatus,
    message: String,
    last_detection: Option<Detection>,
    started_at: Option<Instant>,
    attempts: u32,
    deadline: Duration,
    result: Option<Embedding>,
    failure: Option<FailureReason>,
    disposed: bool,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE)
    }
}

impl CaptureSession {
    pub fn new(deadline: Duration) -> Self {
        Self {
            status: CaptureStatus::Idle,
            message: String::new(),
            last_detection: None,
            started_at: None,
            attempts: 0,
            deadline,
            result: None,
            failure: None,
            disposed: false,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_detection(&self) -> Option<&Detection> {
        self.last_detection.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Embedding of the accepted sample, once the session reached `Success`.
    pub fn result(&self) -> Option<&Embedding> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.started_at.map(|start| start + self.deadline)
    }

    pub fn snapshot(&self) -> StatusEvent {
        StatusEvent {
            status: self.status,
            message: self.message.clone(),
            attempts: self.attempts,
            at: Utc::now(),
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<()> {
        self.ensure_live()?;
        if self.status != CaptureStatus::Idle {
            return Err(CaptureError::InvalidTransition {
                from: self.status,
                action: "start",
            });
        }

        self.status = CaptureStatus::Detecting;
        self.started_at = Some(now);
        self.message = DETECTING_MESSAGE.to_string();
        info!("Capture started (deadline {:?})", self.deadline);
        Ok(())
    }

    /// Fails the session with a timeout if the deadline has passed.
    pub fn expire_if_due(&mut self, now: Instant) -> bool {
        if self.disposed || self.status != CaptureStatus::Detecting {
            return false;
        }
        match self.deadline_at() {
            Some(deadline) if now >= deadline => {
                self.enter_error(FailureReason::Timeout);
                true
            }
            _ => false,
        }
    }

    /// Records one evaluated sample taken at `now`.
    ///
    /// The deadline is checked first: a sample observed at or after it never
    /// produces `Success`, however good it is.
    pub fn record_sample(
        &mut self,
        now: Instant,
        kind: SampleKind,
        detection: Option<Detection>,
        verdict: &Verdict,
    ) -> Result<Transition> {
        self.ensure_live()?;
        if self.status != CaptureStatus::Detecting {
            return Err(CaptureError::InvalidTransition {
                from: self.status,
                action: "record a sample",
            });
        }
        if self.expire_if_due(now) {
            return Ok(Transition::TimedOut);
        }

        match (verdict, kind) {
            (Verdict::Rejected(reason), _) => {
                self.attempts += 1;
                self.message = format!("{} - {}", reason, reason.guidance());
                self.last_detection = detection;
                debug!(attempt = self.attempts, "Sample rejected: {}", reason);
                Ok(Transition::Rejected)
            }
            (Verdict::Accepted, SampleKind::Feedback) => {
                self.message = READY_MESSAGE.to_string();
                self.last_detection = detection;
                Ok(Transition::Hinted)
            }
            (Verdict::Accepted, SampleKind::Commit) => {
                let detection = detection.ok_or_else(|| {
                    CaptureError::Other(anyhow::anyhow!("accepted sample carried no detection"))
                })?;
                self.result = Some(detection.embedding.clone());
                self.last_detection = Some(detection);
                self.status = CaptureStatus::Success;
                self.message = CAPTURED_MESSAGE.to_string();
                info!("Capture succeeded after {} rejected samples", self.attempts);
                Ok(Transition::Succeeded)
            }
        }
    }

    /// Moves to `Error`. Allowed while detecting, and from `Success` when the
    /// collaborator that received the embedding refuses it.
    pub fn fail(&mut self, reason: FailureReason) -> Result<()> {
        self.ensure_live()?;
        match self.status {
            CaptureStatus::Detecting | CaptureStatus::Success => {
                self.enter_error(reason);
                Ok(())
            }
            from => Err(CaptureError::InvalidTransition { from, action: "fail" }),
        }
    }

    /// Replaces the user-facing message without changing status.
    pub fn annotate(&mut self, message: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        self.message = message.into();
        Ok(())
    }

    /// Back to `Idle`, clearing everything the last attempt produced.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.status = CaptureStatus::Idle;
        self.message.clear();
        self.last_detection = None;
        self.started_at = None;
        self.attempts = 0;
        self.result = None;
        self.failure = None;
        debug!("Capture session reset");
        Ok(())
    }

    pub fn dispose(&mut self) {
        if !self.disposed {
            debug!("Capture session disposed while {}", self.status);
        }
        self.disposed = true;
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(CaptureError::Disposed);
        }
        Ok(())
    }

    fn enter_error(&mut self, reason: FailureReason) {
        info!("Capture failed: {}", reason);
        self.status = CaptureStatus::Error;
        self.message = reason.to_string();
        self.failure = Some(reason);
    }
}

/// A session shared between its owning flow and the polling task.
///
/// Every access through `update` publishes a fresh [`StatusEvent`].
pub struct SharedSession {
    inner: Mutex<CaptureSession>,
    events: watch::Sender<StatusEvent>,
}

impl SharedSession {
    pub fn new(session: CaptureSession) -> Arc<Self> {
        let (events, _) = watch::channel(session.snapshot());
        Arc::new(Self {
            inner: Mutex::new(session),
            events,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn update<T>(&self, f: impl FnOnce(&mut CaptureSession) -> T) -> T {
        let mut session = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let out = f(&mut session);
        let snapshot = session.snapshot();
        drop(session);
        self.events.send_replace(snapshot);
        out
    }

    pub fn read<T>(&self, f: impl FnOnce(&CaptureSession) -> T) -> T {
        let session = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&session)
    }

    pub fn status(&self) -> CaptureStatus {
        self.read(|s| s.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::BoundingBox;
    use crate::core::gate::RejectReason;

    fn detection() -> Detection {
        Detection {
            embedding: vec![0.25; 128],
            bounding_box: BoundingBox::new(270.0, 190.0, 100.0, 100.0),
            score: 0.9,
        }
    }

    fn started(now: Instant) -> CaptureSession {
        let mut session = CaptureSession::default();
        session.start(now).unwrap();
        session
    }

    #[test]
    fn start_enters_detecting() {
        let now = Instant::now();
        let session = started(now);
        assert_eq!(session.status(), CaptureStatus::Detecting);
        assert_eq!(session.started_at(), Some(now));
        assert_eq!(session.deadline_at(), Some(now + Duration::from_secs(45)));
    }

    #[test]
    fn start_twice_is_rejected() {
        let now = Instant::now();
        let mut session = started(now);
        assert!(matches!(
            session.start(now),
            Err(CaptureError::InvalidTransition { from: CaptureStatus::Detecting, .. })
        ));
    }

    #[test]
    fn rejections_update_message_and_attempts() {
        let now = Instant::now();
        let mut session = started(now);
        let verdict = Verdict::Rejected(RejectReason::NoFace);

        for i in 1..=3 {
            let t = session
                .record_sample(now + Duration::from_secs(i), SampleKind::Commit, None, &verdict)
                .unwrap();
            assert_eq!(t, Transition::Rejected);
        }
        assert_eq!(session.status(), CaptureStatus::Detecting);
        assert_eq!(session.attempts(), 3);
        assert!(session.message().starts_with("no face found"));
    }

    #[test]
    fn accepted_commit_captures_embedding() {
        let now = Instant::now();
        let mut session = started(now);
        let t = session
            .record_sample(now, SampleKind::Commit, Some(detection()), &Verdict::Accepted)
            .unwrap();

        assert_eq!(t, Transition::Succeeded);
        assert_eq!(session.status(), CaptureStatus::Success);
        assert_eq!(session.result(), Some(&vec![0.25; 128]));
    }

    #[test]
    fn accepted_feedback_only_hints() {
        let now = Instant::now();
        let mut session = started(now);
        let t = session
            .record_sample(now, SampleKind::Feedback, Some(detection()), &Verdict::Accepted)
            .unwrap();

        assert_eq!(t, Transition::Hinted);
        assert_eq!(session.status(), CaptureStatus::Detecting);
        assert_eq!(session.attempts(), 0);
        assert!(session.result().is_none());
    }

    #[test]
    fn success_is_unreachable_after_deadline() {
        let now = Instant::now();
        let mut session = started(now);
        let late = now + Duration::from_secs(45);

        let t = session
            .record_sample(late, SampleKind::Commit, Some(detection()), &Verdict::Accepted)
            .unwrap();

        assert_eq!(t, Transition::TimedOut);
        assert_eq!(session.status(), CaptureStatus::Error);
        assert_eq!(session.failure(), Some(&FailureReason::Timeout));
        assert_eq!(session.message(), "timeout");
        assert!(session.result().is_none());
    }

    #[test]
    fn expire_only_fires_while_detecting() {
        let now = Instant::now();
        let mut session = CaptureSession::default();
        assert!(!session.expire_if_due(now + Duration::from_secs(100)));

        session.start(now).unwrap();
        assert!(!session.expire_if_due(now + Duration::from_millis(44_999)));
        assert!(session.expire_if_due(now + Duration::from_secs(46)));
        assert!(!session.expire_if_due(now + Duration::from_secs(47)));
    }

    #[test]
    fn samples_after_terminal_state_are_refused() {
        let now = Instant::now();
        let mut session = started(now);
        session
            .record_sample(now, SampleKind::Commit, Some(detection()), &Verdict::Accepted)
            .unwrap();

        let result = session.record_sample(
            now,
            SampleKind::Feedback,
            None,
            &Verdict::Rejected(RejectReason::NoFace),
        );
        assert!(result.is_err());
        assert_eq!(session.status(), CaptureStatus::Success);
    }

    #[test]
    fn backend_rejection_after_success_is_an_error() {
        let now = Instant::now();
        let mut session = started(now);
        session
            .record_sample(now, SampleKind::Commit, Some(detection()), &Verdict::Accepted)
            .unwrap();

        session
            .fail(FailureReason::BackendRejected("already enrolled".into()))
            .unwrap();
        assert_eq!(session.status(), CaptureStatus::Error);
        assert_eq!(session.message(), "already enrolled");
    }

    #[test]
    fn reset_clears_attempt_state() {
        let now = Instant::now();
        let mut session = started(now);
        session
            .record_sample(
                now,
                SampleKind::Commit,
                Some(detection()),
                &Verdict::Rejected(RejectReason::NoFace),
            )
            .unwrap();
        session.fail(FailureReason::Timeout).unwrap();

        session.reset().unwrap();
        assert_eq!(session.status(), CaptureStatus::Idle);
        assert_eq!(session.attempts(), 0);
        assert!(session.message().is_empty());
        assert!(session.last_detection().is_none());
        assert!(session.started_at().is_none());
        assert!(session.failure().is_none());
    }

    #[test]
    fn shared_session_publishes_every_update() {
        let shared = SharedSession::new(CaptureSession::default());
        let mut events = shared.subscribe();
        assert_eq!(events.borrow_and_update().status, CaptureStatus::Idle);

        shared.update(|s| s.start(Instant::now())).unwrap();
        assert!(events.has_changed().unwrap());
        let event = events.borrow_and_update().clone();
        assert_eq!(event.status, CaptureStatus::Detecting);
        assert_eq!(event.message, "Looking for your face...");
    }

    #[test]
    fn disposed_session_refuses_everything() {
        let now = Instant::now();
        let mut session = started(now);
        session.dispose();

        assert!(matches!(session.reset(), Err(CaptureError::Disposed)));
        assert!(matches!(session.fail(FailureReason::Timeout), Err(CaptureError::Disposed)));
        assert!(!session.expire_if_due(now + Duration::from_secs(60)));
    }
}

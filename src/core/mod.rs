pub mod centering;
pub mod detector;
pub mod enrollment;
pub mod gate;
pub mod login;
pub mod sampler;
pub mod session;

pub use centering::{is_centered, CenteringBounds, CenteringEvaluator, Offset};
pub use detector::{
    BoundingBox, Detection, DetectionProvider, Embedding, FrameDimensions, ReplayDetector,
    ReplayExhaustion,
};
pub use enrollment::{EnrollmentFlow, EnrollmentSettings};
pub use gate::{AcceptanceGate, ProfileSet, RejectReason, ThresholdProfile, Verdict};
pub use login::{LoginFlow, LoginOutcome, LoginSettings, LOGIN_REJECTED_MESSAGE};
pub use sampler::{FrameSampler, LoopExit, PollPlan, PollingTask, Sample};
pub use session::{
    CaptureSession, CaptureStatus, FailureReason, SampleKind, SharedSession, StatusEvent,
    Transition,
};

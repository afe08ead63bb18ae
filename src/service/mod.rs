pub mod client;
pub mod protocol;

pub use client::BackendClient;
pub use protocol::{EnrollmentReceipt, UserRecord, VerifiedLogin};

use async_trait::async_trait;

use crate::common::Result;

/// Stores an enrollment embedding for the user the credential belongs to.
#[async_trait]
pub trait EnrollmentBackend: Send + Sync {
    async fn enroll(&self, embedding: &[f32], credential: &str) -> Result<EnrollmentReceipt>;
}

/// Matches a login embedding against the account named by `identifier`.
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    async fn verify(&self, identifier: &str, embedding: &[f32]) -> Result<VerifiedLogin>;
}

use serde::{Deserialize, Serialize};

// Request types
#[derive(Serialize, Debug, Clone)]
pub struct EnrollRequest<'a> {
    pub embedding: &'a [f32],
}

#[derive(Serialize, Debug, Clone)]
pub struct VerifyRequest<'a> {
    pub email: &'a str,
    pub embedding: &'a [f32],
}

// Response types
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EnrollmentReceipt {
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct UserRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Accepted face login: a session credential plus the signed-in user.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VerifiedLogin {
    pub token: String,
    pub user: UserRecord,
}

/// Body the backend sends with a non-2xx status.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ErrorBody {
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

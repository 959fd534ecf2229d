use serde::{Deserialize, Serialize};

/// Minimal user record; owned by the identity service, read here only to
/// validate the requester at admission.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

use serde::{Deserialize, Serialize};

// -- Updates --

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateAccepted {
    /// Number of outgoing messages published for this update.
    pub queued: usize,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

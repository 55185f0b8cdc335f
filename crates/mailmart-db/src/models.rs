//! Database row types. These map directly to SQLite rows.
//! Status columns are decoded into the shared enums at read time.

use mailmart_types::models::{InventoryStatus, Role, SubmissionKind, SubmissionStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub user_id: UserId,
    pub balance: i64,
    pub role: Role,
    pub referred_by: Option<UserId>,
    pub referral_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRow {
    pub id: i64,
    pub credential: String,
    pub secret: String,
    pub status: InventoryStatus,
    pub buyer: Option<UserId>,
    pub sold_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    pub id: i64,
    pub seller: UserId,
    pub credential: String,
    pub secret: String,
    pub kind: SubmissionKind,
    pub status: SubmissionStatus,
    pub rejection_reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryCounts {
    pub available: i64,
    pub sold: i64,
    pub total: i64,
}

/// Result of adding one inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The credential is already stocked (UNIQUE constraint).
    Duplicate,
}

/// Admin verdict on a pending submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve { credit: i64 },
    Reject { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecideOutcome {
    /// The submission moved out of `pending`. `balance` is the seller's
    /// balance after an approval, `None` after a rejection.
    Applied { seller: UserId, balance: Option<i64> },
    NotFound,
    AlreadyResolved,
}

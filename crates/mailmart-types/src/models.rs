use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identity assigned by the messaging platform.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Unknown values fall back to `User` so a hand-edited row never grants admin.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

/// Lifecycle of an inventory record: `Available -> Sold`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    Available,
    Sold,
}

impl InventoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Sold => "sold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "sold" => Some(Self::Sold),
            _ => None,
        }
    }
}

/// Where a submitted credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// Bought from the bot's own inventory.
    Inventory,
    /// Brought by the seller.
    SelfSourced,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::SelfSourced => "self_sourced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inventory" => Some(Self::Inventory),
            "self_sourced" => Some(Self::SelfSourced),
            _ => None,
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inventory => f.write_str("from inventory"),
            Self::SelfSourced => f.write_str("self-sourced"),
        }
    }
}

/// `Pending -> Approved | Rejected`; both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Admin button on a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Accept(i64),
    Reject(i64),
}

impl ReviewAction {
    /// Callback payload carried by the inline button, e.g. `accept_12`.
    pub fn callback_data(&self) -> String {
        match self {
            Self::Accept(id) => format!("accept_{}", id),
            Self::Reject(id) => format!("reject_{}", id),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (action, id) = data.split_once('_')?;
        let id: i64 = id.parse().ok()?;
        match action {
            "accept" => Some(Self::Accept(id)),
            "reject" => Some(Self::Reject(id)),
            _ => None,
        }
    }
}

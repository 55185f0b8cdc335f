use std::collections::HashMap;

use tokio::sync::RwLock;

use mailmart_types::models::{SubmissionKind, UserId};

/// Where a user is in a multi-step flow. Scratch data lives in the variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AddingInventory,
    ManagingInventory,
    ChoosingSellMethod,
    EnteringSellCount,
    ChoosingSubmitMethod,
    EnteringSubmission {
        kind: SubmissionKind,
    },
    EnteringDeleteTarget,
    EnteringRejectionReason {
        submission_id: i64,
        seller: UserId,
        credential: String,
    },
    EnteringApprovalAmount {
        submission_id: i64,
        seller: UserId,
        credential: String,
    },
}

impl ConversationState {
    /// What the user was doing, for cancellation messages.
    pub fn activity(&self) -> &'static str {
        match self {
            Self::Idle => "nothing",
            Self::AddingInventory => "adding inventory",
            Self::ManagingInventory | Self::EnteringDeleteTarget => "inventory management",
            Self::ChoosingSellMethod | Self::EnteringSellCount => "the sale",
            Self::ChoosingSubmitMethod | Self::EnteringSubmission { .. } => "the submission",
            Self::EnteringRejectionReason { .. } | Self::EnteringApprovalAmount { .. } => {
                "the review"
            }
        }
    }
}

/// Per-user conversation state, held in memory only.
///
/// An entry exists only while a user is mid-flow; returning to `Idle`
/// removes it.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, ConversationState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: UserId) -> ConversationState {
        self.sessions
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set(&self, user_id: UserId, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        if state == ConversationState::Idle {
            sessions.remove(&user_id);
        } else {
            sessions.insert(user_id, state);
        }
    }

    /// Drop the user's session. Returns the state they were in.
    pub async fn clear(&self, user_id: UserId) -> ConversationState {
        self.sessions
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default()
    }
}

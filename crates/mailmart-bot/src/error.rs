use thiserror::Error;

/// Failures that end the current conversation with a generic apology.
/// Validation problems are not errors; they are answered in-flow.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

//! Conversation layer: turns one inbound chat event into the outgoing
//! messages it causes, tracking where each user is in a multi-step flow.

pub mod error;
pub mod handlers;
pub mod keyboards;
pub mod parse;
pub mod session;

pub use handlers::{Bot, BotConfig};
pub use session::{ConversationState, SessionStore};

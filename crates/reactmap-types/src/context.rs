//! Reaction usage rows derived from the base conversation store.

use serde::{Deserialize, Serialize};

/// One reaction symbol applied to one message by one user.
///
/// Rows are derived from the base `reactions` and `messages` tables and are
/// unique on `(reaction_name, message_ts, reactor_user)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContext {
    /// Reaction symbol, e.g. `"heart"`.
    pub reaction_name: String,
    /// Timestamp of the message the reaction was applied to.
    pub message_ts: String,
    /// Text of that message.
    pub message_text: String,
    /// User who applied the reaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactor_user: Option<String>,
    /// User who wrote the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_author: Option<String>,
    /// Channel the message was posted in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

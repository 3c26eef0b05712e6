//! Chat delivery for cycle summaries.

pub mod slack;

use async_trait::async_trait;

use herald_common::error::RemoteError;

pub use slack::SlackClient;

/// A chat platform that can post a text message to a channel.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Post `text` to `channel`. No retry; failures are returned as-is.
    async fn send(&self, channel: &str, text: &str) -> Result<(), RemoteError>;
}

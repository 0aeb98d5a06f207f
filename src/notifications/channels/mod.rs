//! Delivery channels for broadcast digests

pub mod telegram;

use async_trait::async_trait;

pub use telegram::{TelegramChannel, TelegramConfig};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur while delivering a message
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The messaging API answered with an error
    #[error("Delivery rejected ({status}): {description}")]
    Rejected { status: u16, description: String },

    /// Rate limit exceeded on the API side
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

/// A messenger able to deliver text to one recipient
///
/// Implementations must not retry on their own; the broadcaster treats every
/// failure as final for that recipient and digest.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Send `text` to the chat identified by `recipient`
    async fn send(&self, recipient: i64, text: &str) -> ChannelResult<()>;
}

//! Broadcast of reachability digests to subscribers
//!
//! # Architecture
//!
//! ```text
//!  CycleScheduler ──digest──▶ DigestSender
//!                                 │  bounded queue (blocking send)
//!                                 ▼
//!                  ┌──────────────────────────────┐
//!                  │ Broadcaster (single consumer)│
//!                  │ - fresh subscriber fetch     │
//!                  │ - one limiter token per send │
//!                  └──────────────┬───────────────┘
//!                                 ▼
//!                          ┌─────────────┐
//!                          │  Messenger  │  (Telegram)
//!                          └─────────────┘
//! ```

mod broadcaster;
pub mod channels;
pub mod digest;

pub use broadcaster::{BroadcastStats, Broadcaster, DeliveryReport, DigestSender};
pub use channels::{ChannelError, Messenger, TelegramChannel, TelegramConfig};
pub use digest::{
    format_changes, format_registry, split_message, ReachabilitySnapshot, MAX_MESSAGE_CHARS,
};

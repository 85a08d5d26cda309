//! Core building blocks for gateway sessions.
//!
//! This crate provides:
//! - `LruCache` / `SharedCache` - Bounded object cache with LRU eviction
//! - `UsageStats` - Per-command counters with a scheduled daily drain
//! - `Interaction` - Typed interaction events with handler key resolution
//! - `CommandHandler` - Trait implemented by command callbacks

pub mod cache;
pub mod interaction;
pub mod stats;
pub mod traits;

pub use cache::{LruCache, ObjectKey, SharedCache};
pub use interaction::{CommandKey, Interaction, InteractionData, InteractionKind};
pub use stats::{UsageReport, UsageStats};
pub use traits::CommandHandler;

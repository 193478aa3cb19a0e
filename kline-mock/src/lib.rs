//! kline-mock
//!
//! CI-safe collaborators for the kline workspace: a synthetic exchange
//! ([`MockProvider`]), an in-memory candle store ([`MemoryStore`]) and a push-driven
//! tick feed ([`MockFeed`]). Everything is deterministic and never touches the network.

mod feed;
mod provider;
mod store;
mod timeline;

pub use feed::{MockFeed, MockFeedSender};
pub use provider::MockProvider;
pub use store::MemoryStore;
pub use timeline::SyntheticTimeline;

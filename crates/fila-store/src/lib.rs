//! # fila-store
//!
//! Persistence seams for the queue subsystem: the async key-value
//! storage trait the embedding app implements, an in-memory store for
//! tests and the simulator-only setup, the injected clock, and the
//! versioned cache document reader/writer.

pub mod cache;
pub mod clock;
pub mod keys;
pub mod kv;

pub use cache::CacheStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use kv::{KvStore, MemoryStore};

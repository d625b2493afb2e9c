//! # fila-engine
//!
//! The queue synchronization engine. Construct a [`QueueEngine`] with
//! an [`EngineConfig`] and the app's key-value storage, call
//! [`QueueEngine::start_polling`], and read queue state through the
//! synchronous selectors. Mutations go to the active backend and pull
//! a fresh snapshot behind them.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fila_engine::{EngineConfig, QueueEngine};
//! use fila_store::MemoryStore;
//!
//! # async fn run() -> fila_core::QueueResult<()> {
//! let engine = QueueEngine::new(EngineConfig::from_env(), Arc::new(MemoryStore::new())).await?;
//! engine.start_polling();
//! println!("{} orders cached", engine.orders().len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod status;

pub use config::EngineConfig;
pub use engine::QueueEngine;
pub use status::QueueStatus;

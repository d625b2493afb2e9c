//! # Storage Key Namespace
//!
//! Every persisted document lives under a fixed namespaced key. The
//! cache document and the simulator database deliberately use separate
//! keys: the simulator owns its database independently of the cache and
//! is the source of truth while active.

/// Versioned cache snapshot written by the engine.
pub const CACHE_KEY: &str = "fila/queue-cache";

/// Versioned private database owned by the lifecycle simulator.
pub const SIM_DB_KEY: &str = "fila/simulator-db";

/// Opaque session token written by the auth layer (external to this
/// subsystem); read here only as a fallback-policy signal.
pub const SESSION_TOKEN_KEY: &str = "fila/session-token";

/// Tokens carrying this prefix mark a local-development session and
/// route the engine straight to the simulator.
pub const LOCAL_SESSION_PREFIX: &str = "local-";

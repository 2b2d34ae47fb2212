#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(deprecated)]

//!
//! Runtime host: the execution and commitment boundary between a node and the runtime
//! that executes transaction batches on its behalf.
//!
//! A caller holding a [`host::Runtime`] sends request [`protocol::Body`] values through
//! `call`. Batch execution builds an authenticated input tree and I/O tree
//! ([`transaction::Tree`]) and assembles a [`commitment::ComputeResultsHeader`] that other
//! nodes can compare without re-executing. Lifecycle transitions are observable through
//! `watch_events`.

// Shared identifiers and digests (Namespace, Hash, Root, Version).
pub mod types;

// Host error taxonomy and its wire codes.
pub mod error;

// Host configuration loaded from JSON.
pub mod config;

// Cancellation and deadlines threaded through calls.
pub mod context;

// Abstract authenticated tree and its in-memory implementation.
pub mod storage;

// Authenticated batch tree over inputs and outputs.
pub mod transaction;

// Block and compute results headers.
pub mod commitment;

// Per-transaction admission checks.
pub mod checktx;

// Wire protocol bodies and message framing.
pub mod protocol;

// Fully qualified service and method names.
pub mod rpc;

// Debug pass-through service.
pub mod control;

// Runtime interface, lifecycle events, mock and proxy runtimes.
pub mod host;

pub use error::{HostError, ProtocolError, RuntimeError};
pub use host::{Event, MockRuntime, ProxyRuntime, Runtime};
pub use types::{Hash, Namespace, Root, RootKind, Round, Version};

/// Installs a `tracing` subscriber configured from `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs anything.
#[cfg(feature = "log-subscriber")]
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

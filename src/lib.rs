//! # ChargeSync - cloud polling engine for EV charge point management
//!
//! A Rust engine that keeps a local, always-fresh view of charge points,
//! active charges, and wallet state from a remote EV-charging management
//! API, while respecting the remote service's rate limits and managing
//! the OAuth token lifecycle without human intervention.
//!
//! ## Features
//!
//! - **Independent Pollers**: One cadence per resource class, staggered
//!   per-charge-point fetches within the charges window
//! - **Adaptive Backoff**: Trusts the server's own reset hint on 429 and
//!   recovers gradually after sustained success
//! - **Token Lifecycle**: Preemptive and reactive refresh with a single
//!   in-flight refresh, persisted through a pluggable store
//! - **Last-Known-Good Snapshots**: Stale-but-present data during
//!   outages, replaced atomically per resource class
//! - **Graceful Shutdown**: In-flight requests finish, pending sleeps
//!   are cancelled immediately
//!
//! ## Architecture
//!
//! The engine follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `models`: Wire data model of the remote API
//! - `storage`: Token record persistence
//! - `auth`: OAuth token lifecycle
//! - `api`: Authenticated HTTP transport
//! - `backoff`: Per-class rate-limit backoff state machine
//! - `snapshot`: Last-known-good snapshot store
//! - `poller`: Periodic resource pollers
//! - `engine`: Wiring and lifecycle

pub mod api;
pub mod auth;
pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod poller;
pub mod snapshot;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineState, SyncEngine};
pub use error::{ChargeSyncError, Result};

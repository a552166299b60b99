//! # Core Engine Module
//!
//! This module forms the heart of the live-data distribution core. It
//! aggregates the components that turn a pull-based data source into a
//! push-based stream for many simultaneous observers, and that coordinate
//! access to the pull-based source itself.
//!
//! ## Core Components:
//!
//! - **`broadcaster`**: The per-resource subscription broadcaster. One poll
//!   loop and one set of connected observers per distinct resource key; it
//!   decides when to re-fetch, deduplicates unchanged results by content
//!   fingerprint, and fans out changes to every registered observer.
//!
//! - **`coordinator`**: The query coordinator. Owns one connection pool per
//!   logical backing store and executes supplied query functions against it
//!   with configurable retry-on-empty and "supersede-in-flight" cancellation
//!   semantics (latest request wins).
//!
//! - **`events`**: The observer abstraction plus the event model written to
//!   each live output sink (`connected`, `heartbeat`, data and error events).
//!
//! - **`fingerprint`**: A fast content hash used to detect payload changes
//!   between polls so that identical results produce no network writes.
//!
//! By declaring and re-exporting these components, the `core` module provides
//! a unified public API for the `servers` crate and other in-process callers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Per-resource polling, deduplication and fan-out of live data.
pub mod broadcaster;
/// Pooled, retryable, supersedable query execution.
pub mod coordinator;
/// Observer handles and the stream event model.
pub mod events;
/// Content fingerprinting for change detection.
pub mod fingerprint;

// --- Public API Re-exports ---
// Make the primary structs from the core modules directly accessible.
pub use broadcaster::{Broadcaster, BroadcasterConfig, SubscriptionHandle};
pub use coordinator::{QueryCoordinator, QueryOutcome, RetryPolicy};
pub use events::{Observer, StreamEvent};
pub use fingerprint::fingerprint;

// Declare the modules to re-export
pub mod connections; // Named connection pools for the backing stores
pub mod core;        // Broadcaster, coordinator and shared primitives

// Re-export the primary types
pub use crate::connections::db_postgres::{DbError, PoolManager, PoolPhase, StoreConfig};
pub use crate::core::broadcaster::{
    Broadcaster, BroadcasterConfig, FetchFn, FetchFuture, SubscriptionHandle,
};
pub use crate::core::coordinator::{
    ExecuteOptions, QueryCoordinator, QueryError, QueryOutcome, RetryPolicy,
};
pub use crate::core::events::{EventSender, Observer, StreamEvent};
pub use crate::core::fingerprint::fingerprint;

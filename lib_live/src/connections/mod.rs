//! # Connections Module
//!
//! This module handles persistent connections to the backing stores,
//! i.e. the named PostgreSQL pools the query coordinator executes against.

/// Module for PostgreSQL connection pooling keyed by backing-store name.
pub mod db_postgres;

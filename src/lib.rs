//! Index advisory engine for SQLite and PostgreSQL.
//!
//! The crate reflects a live schema, scores existing indexes for
//! effectiveness, parses query execution plans, and turns the combined
//! evidence into prioritized create/remove recommendations. All engine
//! differences are isolated behind the [`dialect::DialectStrategy`] trait;
//! everything above it is dialect-agnostic.

pub mod advisor;
pub mod analysis;
pub mod config;
pub mod dialect;
pub mod manager;
pub mod models;
pub mod reporter;

pub use advisor::{
    analyze_database_indexes, get_index_manager, optimize_database_indexes,
    validate_database_indexes, IndexAdvisor,
};
pub use config::AdvisorConfig;
pub use manager::IndexManager;

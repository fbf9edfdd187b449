//! Gatehouse-State: persistence for pipeline runs and releases
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: append-only durability and history queries (by commit, by time
//! range). Nothing here knows about checks, policies, or the environment
//! ladder; records are stored in flat, queryable form.
//!
//! ## Key Components
//!
//! - `RunHistory` / `ReleaseLog`: storage traits
//! - `fakes`: in-memory implementations for tests
//! - `SurrealHandle`, `SurrealRunHistory`, `SurrealReleaseLog`: SurrealDB backends

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_history;
mod surreal_release_log;

pub use error::StorageError;
pub use handle::{SurrealHandle, DATABASE, NAMESPACE};
pub use storage_traits::{
    ReleaseLog, ReleaseRecord, RunHistory, RunRecord, StorageResult, TimeRange,
};
pub use surreal_history::SurrealRunHistory;
pub use surreal_release_log::SurrealReleaseLog;

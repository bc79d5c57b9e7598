//! Block hierarchy storage for Canopy.
//!
//! Every block version is appended to a flat history table; the newest
//! version of each block is what reads see, and a deletion is just another
//! version with a non-zero `delete_at`. The same store also keeps users,
//! sessions, workspaces and system settings.
//!
//! # Backends
//!
//! All backends implement the [`Store`] trait:
//!
//! - [`SqliteStore`] -- single-connection SQLite store, in memory or on disk
//!
//! `Arc<S>` implements [`Store`] for any `S: Store`, so a store can be shared
//! between an owner and a wrapping layer.
//!
//! # Design Rules
//!
//! 1. Block rows are never updated in place; history is append-only.
//! 2. Versions of a block are ordered by a hybrid logical clock, never by
//!    wall time alone.
//! 3. A block's `root_id` is checked on every insert.
//! 4. Storage errors are propagated, never logged and swallowed.

pub mod clock;
pub mod config;
pub mod error;
pub mod sqlite;
pub mod traits;

pub use clock::{now_ms, VersionClock};
pub use config::{DatabaseLocation, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use traits::Store;

//! Directory-backed account overlay for Canopy stores.
//!
//! [`AuthLayer`] wraps any [`Store`](canopy_store::Store) and hands account
//! questions to an external directory database that it opens read only:
//!
//! - users and user counts are read from the directory's `users` and
//!   `sessions` tables;
//! - workspaces map onto directory channels, and access means channel
//!   membership;
//! - creating or changing users and sessions is refused with
//!   [`StoreError::NotPermitted`](canopy_store::StoreError::NotPermitted).
//!
//! Everything else goes to the wrapped store untouched.

pub mod config;
mod directory;
pub mod layer;

#[cfg(test)]
mod fixture;

pub use config::AuthLayerConfig;
pub use layer::AuthLayer;

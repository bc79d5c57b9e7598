//! Foundation types for Canopy.
//!
//! Canopy stores tree-structured content ("blocks") in a flat, append-only
//! history table. This crate holds the data model shared by every other
//! Canopy crate; it contains no storage logic, only data and the validation
//! rules a block must satisfy before it may be written.
//!
//! # Key Types
//!
//! - [`Block`] -- a tree node with a denormalized root pointer
//! - [`FieldValue`] / [`Fields`] -- the opaque JSON payload of a block
//! - [`InsertAt`] -- ordering key distinguishing the versions of a block
//! - [`Container`] -- workspace scope threaded through every block operation
//! - [`User`], [`Session`], [`Workspace`] -- account entities served by a store

pub mod block;
pub mod container;
pub mod error;
pub mod fields;
pub mod temporal;
pub mod user;
pub mod workspace;

pub use block::Block;
pub use container::Container;
pub use error::TypeError;
pub use fields::{FieldValue, Fields};
pub use temporal::InsertAt;
pub use user::{Props, Session, User};
pub use workspace::Workspace;

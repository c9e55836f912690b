//! Document store access for ChronoPrint.
//!
//! This crate owns everything that crosses the persistence boundary:
//!
//! - **Records**: the on-the-wire shape of schedules and execution logs,
//!   with instants carried as [`StoreTimestamp`]s
//! - **Store trait**: [`DocumentStore`], the contract the scheduler talks to
//! - **Memory store**: an in-process implementation for tests and demos
//! - **HTTP store**: a JSON client for a remote document store

mod client;
mod error;
mod memory;
mod records;
mod store;
mod types;

pub use client::{CommitWrite, HttpStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use records::*;
pub use store::DocumentStore;
pub use types::*;

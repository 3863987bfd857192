//! lockpick-core - Distributed locking on a hierarchical coordination service
//!
//! This crate provides:
//! - The lock data model (paths, modes, contenders, handles)
//! - The coordination client seam and an in-memory store
//! - The blocking acquire recipe and the polling acquirer around it
//! - Contender listing, identity-checked release and interrupt cleanup

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod acquire;
pub mod client;
pub mod contenders;
pub mod error;
pub mod guard;
pub mod memory;
pub mod mode;
pub mod node;
pub mod path;
pub mod recipe;
pub mod release;

pub use acquire::{AcquisitionOutcome, ContentionObserver, LockAcquirer, LogObserver, RetryPolicy};
pub use client::CoordinationClient;
pub use contenders::list_contenders;
pub use error::{Error, Result};
pub use guard::CancellationGuard;
pub use memory::{MemoryClient, MemoryStore};
pub use mode::LockMode;
pub use node::{Contender, LockHandle};
pub use path::LockPath;
pub use recipe::{LockDescriptor, PendingNode};
pub use release::{release, release_node};

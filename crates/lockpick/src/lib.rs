//! lockpick - distributed locks over ZooKeeper for shell scripts
//!
//! `lock`, `rlock` and `wlock` print the node they hold; `unlock` releases
//! it in a later invocation; `list` shows who holds or waits.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod signal;
pub mod zk;

pub use error::{Error, Result};

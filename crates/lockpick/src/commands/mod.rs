//! Command implementations for the lockpick CLI
//!
//! Each command writes its result to the given writer and logs everything
//! else, so stdout only ever carries a complete result.

pub mod acquire;
pub mod list;
pub mod unlock;

//! list

use std::io::Write;

use anyhow::{Context, Result};
use lockpick_core::{list_contenders, CoordinationClient, LockPath};

use crate::Error;

/// Print one `'<identity>' <path>` line per contender
///
/// # Errors
///
/// Returns an error if the lock path does not exist or listing fails
pub async fn run<C>(client: &C, lock_path: &LockPath, out: &mut impl Write) -> Result<()>
where
    C: CoordinationClient + ?Sized,
{
    let contenders = list_contenders(client, lock_path)
        .await
        .map_err(Error::Lock)?;

    for contender in &contenders {
        writeln!(out, "{contender}").context("Failed to write contender")?;
    }
    Ok(())
}

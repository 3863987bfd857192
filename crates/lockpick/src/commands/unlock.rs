//! unlock

use anyhow::Result;
use lockpick_core::{release_node, CoordinationClient};

use crate::Error;

/// Release the node at `node_path`, checking its identity when one is given.
///
/// # Errors
///
/// Returns an error if:
/// - The node does not exist
/// - The stored identity differs from `identifier`
/// - The coordination service fails
pub async fn run<C>(client: &C, node_path: &str, identifier: Option<&str>) -> Result<()>
where
    C: CoordinationClient + ?Sized,
{
    release_node(client, node_path, identifier)
        .await
        .map_err(Error::Lock)?;
    tracing::info!("Lock {node_path} released");
    Ok(())
}

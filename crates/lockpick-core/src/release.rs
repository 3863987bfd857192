//! Lock release with identity verification

use crate::{CoordinationClient, Error, Result};

/// Delete a lock node, refusing when a given identity does not match.
///
/// An empty `expected` identity is treated as none.
///
/// # Errors
///
/// - `NotFound` when the node does not exist
/// - `IdentityMismatch` when `expected` differs from the stored identity; the
///   node is left in place
/// - coordination errors from the client
pub async fn release_node<C>(client: &C, node_path: &str, expected: Option<&str>) -> Result<()>
where
    C: CoordinationClient + ?Sized,
{
    let stored = client.get_data(node_path).await?;

    if let Some(expected) = expected.filter(|id| !id.is_empty()) {
        let found = String::from_utf8_lossy(&stored);
        if found != expected {
            return Err(Error::IdentityMismatch {
                path: node_path.to_string(),
                found: found.into_owned(),
            });
        }
    }

    client.delete(node_path).await?;
    tracing::debug!("Deleted lock node {node_path}");
    Ok(())
}

/// Release a lock node, folding the expected refusals into `false`.
///
/// `NotFound` and `IdentityMismatch` are logged and reported as `Ok(false)`.
///
/// # Errors
///
/// Coordination errors are passed through.
pub async fn release<C>(client: &C, node_path: &str, expected: Option<&str>) -> Result<bool>
where
    C: CoordinationClient + ?Sized,
{
    match release_node(client, node_path, expected).await {
        Ok(()) => Ok(true),
        Err(err @ (Error::NotFound(_) | Error::IdentityMismatch { .. })) => {
            tracing::error!("{err}");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

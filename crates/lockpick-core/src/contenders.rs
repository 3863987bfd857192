//! Contender enumeration

use crate::{mode::NodeKind, node::Contender, CoordinationClient, Error, LockPath, Result};

/// List holders and waiters of `lock_path`.
///
/// Entries come back in the service's enumeration order. Use [`by_sequence`]
/// when holder/waiter order matters. A child that vanishes between the listing
/// and its payload read is skipped.
///
/// # Errors
///
/// Returns `NotFound` when `lock_path` does not exist, or the client's error.
pub async fn list_contenders<C>(client: &C, lock_path: &LockPath) -> Result<Vec<Contender>>
where
    C: CoordinationClient + ?Sized,
{
    let children = client.get_children(lock_path.as_str()).await?;
    let mut contenders = Vec::with_capacity(children.len());

    for child in children {
        let path = lock_path.child(&child);
        match client.get_data(&path).await {
            Ok(data) => contenders.push(Contender {
                identity: String::from_utf8_lossy(&data).into_owned(),
                path,
            }),
            Err(Error::NotFound(_)) => tracing::debug!("Contender {path} left while listing"),
            Err(err) => return Err(err),
        }
    }

    Ok(contenders)
}

/// Sort contenders by sequence number; unsequenced entries go last
#[must_use]
pub fn by_sequence(mut contenders: Vec<Contender>) -> Vec<Contender> {
    contenders.sort_by_key(|c| (c.sequence().is_none(), c.sequence()));
    contenders
}

/// Contenders currently holding the lock.
///
/// The lowest write node holds alone; otherwise every read node before the
/// first write node holds together.
#[must_use]
pub fn holders(contenders: &[Contender]) -> Vec<&Contender> {
    let mut ordered: Vec<&Contender> = contenders
        .iter()
        .filter(|c| c.kind().is_some() && c.sequence().is_some())
        .collect();
    ordered.sort_by_key(|c| c.sequence());

    match ordered.first().and_then(|c| c.kind()) {
        Some(NodeKind::Write) => ordered.into_iter().take(1).collect(),
        Some(NodeKind::Read) => ordered
            .into_iter()
            .take_while(|c| c.kind() == Some(NodeKind::Read))
            .collect(),
        None => Vec::new(),
    }
}

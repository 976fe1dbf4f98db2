//! Recursive graph walker: archives every block reachable from a root.
//!
//! The walker is the only part of the crate that looks inside payloads, and
//! it does so through an external [`LinkEnumerator`]; blocks themselves are
//! fetched through an external [`BlockLoader`]. Traversal is depth-first
//! and deterministic: links are taken in the order the enumerator yields
//! them, fetched in chunks of `concurrency` without reordering, and each
//! reachable CID is written to the archive exactly once.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::future::{try_join_all, LocalBoxFuture};
use futures::FutureExt;

use crate::error::Result;
use crate::store::CarDatastore;
use crate::wire::cid::RawCid;

/// Multicodec tag for opaque payloads, which carry no links.
pub const RAW_CODEC: u64 = 0x55;

/// Fetches a block's payload by CID.
#[async_trait]
pub trait BlockLoader: Send + Sync {
    /// Returns the payload for `cid`
    async fn load(&self, cid: &RawCid) -> Result<Vec<u8>>;
}

/// Enumerates the CIDs embedded in a block's payload.
pub trait LinkEnumerator: Send + Sync {
    /// Returns the outbound links of a payload with the given codec tag,
    /// in a stable order
    fn links(&self, codec: u64, payload: &[u8]) -> Result<Vec<RawCid>>;
}

/// Configuration for [`complete_graph`].
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    /// How many sibling links are fetched in parallel (minimum 1)
    pub concurrency: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions { concurrency: 1 }
    }
}

/// Writes the full graph reachable from `root` into a fresh write-mode
/// datastore, then closes it.
///
/// The root becomes the archive's single header root. Cycles and shared
/// subtrees are handled by a seen-set keyed on the base58btc rendering of
/// each CID.
pub async fn complete_graph<L, E>(
    root: &RawCid,
    loader: &L,
    links: &E,
    store: &mut CarDatastore,
    options: WalkOptions,
) -> Result<()>
where
    L: BlockLoader,
    E: LinkEnumerator,
{
    let concurrency = options.concurrency.max(1);
    store.set_roots(std::slice::from_ref(root)).await?;
    let payload = loader.load(root).await?;
    let mut seen = HashSet::new();
    seen.insert(root.to_base58());
    walk(
        root.clone(),
        payload,
        loader,
        links,
        store,
        &mut seen,
        concurrency,
    )
    .await?;
    store.close().await
}

fn walk<'a, L, E>(
    cid: RawCid,
    payload: Vec<u8>,
    loader: &'a L,
    links: &'a E,
    store: &'a mut CarDatastore,
    seen: &'a mut HashSet<String>,
    concurrency: usize,
) -> LocalBoxFuture<'a, Result<()>>
where
    L: BlockLoader,
    E: LinkEnumerator,
{
    async move {
        tracing::trace!(cid = %cid, "archiving block");
        store.put(&cid, &payload).await?;
        if cid.codec() == RAW_CODEC {
            return Ok(());
        }
        let outbound: Vec<RawCid> = links
            .links(cid.codec(), &payload)?
            .into_iter()
            .filter(|link| !seen.contains(&link.to_base58()))
            .collect();
        for chunk in outbound.chunks(concurrency) {
            // Deeper recursion may have covered part of the chunk already
            let pending: Vec<RawCid> = chunk
                .iter()
                .filter(|link| !seen.contains(&link.to_base58()))
                .cloned()
                .collect();
            let blocks = try_join_all(pending.iter().map(|link| loader.load(link))).await?;
            for (link, block) in pending.into_iter().zip(blocks) {
                if !seen.insert(link.to_base58()) {
                    continue;
                }
                walk(link, block, loader, links, &mut *store, &mut *seen, concurrency).await?;
            }
        }
        Ok(())
    }
    .boxed_local()
}

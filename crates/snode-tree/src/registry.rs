//! Root handle allocation and pending-root tracking.

use std::sync::{Mutex, PoisonError};

use indexmap::IndexSet;
use snode_core::{LayoutConfig, RootId, SNodeError};

use crate::draft::{NodeRef, SNodeTreeDraft};

/// Issues root handles and remembers which drafts are still open.
///
/// A root is *pending* from [`create_root`](Self::create_root) until
/// [`finalize`](Self::finalize) consumes it. Finalizing a draft that this
/// registry did not issue, or one it already finalized, fails.
#[derive(Debug, Default)]
pub struct SNodeRegistry {
    pending: Mutex<IndexSet<RootId>>,
}

impl SNodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh draft tree with its root registered as pending.
    pub fn create_root(&self, config: LayoutConfig) -> SNodeTreeDraft {
        let root = RootId::next();
        self.lock().insert(root);
        tracing::debug!(%root, packed = config.packed, "snode root created");
        SNodeTreeDraft::new(root, config)
    }

    /// Consume a pending draft, freezing its topology.
    pub fn finalize(&self, draft: SNodeTreeDraft) -> Result<SealedTree, SNodeError> {
        let root = draft.root_id();
        if !self.lock().shift_remove(&root) {
            return Err(SNodeError::invalid(format!(
                "{root} is not a pending root of this registry"
            )));
        }
        Ok(SealedTree { draft })
    }

    /// Forget a pending root whose draft was abandoned.
    ///
    /// Returns `false` if the root was not pending.
    pub fn discard(&self, root: RootId) -> bool {
        self.lock().shift_remove(&root)
    }

    /// Whether `root` is pending.
    pub fn is_pending(&self, root: RootId) -> bool {
        self.lock().contains(&root)
    }

    /// Number of pending roots.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexSet<RootId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A draft whose topology can no longer change.
///
/// Produced by [`SNodeRegistry::finalize`]; the input of layout
/// compilation.
#[derive(Debug)]
pub struct SealedTree {
    draft: SNodeTreeDraft,
}

impl SealedTree {
    /// The frozen tree.
    pub fn draft(&self) -> &SNodeTreeDraft {
        &self.draft
    }

    /// Root view.
    pub fn root(&self) -> NodeRef<'_> {
        self.draft.root()
    }
}

//! The fields builder: one-shot construction of a tree against a runtime.
//!
//! A [`FieldsBuilder`] wraps a fresh draft whose root it extends. Structural
//! calls delegate to the root and return the created child for chaining.
//! [`finalize`](FieldsBuilder::finalize) seals, compiles and materializes
//! the draft exactly once; afterwards every structural call fails with
//! [`SNodeError::Finalized`].

use std::fmt;
use std::mem;

use snode_core::{AccessError, Axis, Field, NodeId, Place, SNodeError};
use snode_layout::SNode;
use snode_tree::{Dims, NodeMut, NodeRef, PlaceOptions, SNodeTreeDraft};

use crate::runtime::Runtime;

/// Non-fatal conditions recorded by a builder.
///
/// Each is also logged with `tracing::warn!` when recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderWarning {
    /// The builder was finalized with nothing but its root.
    EmptyFinalize,
    /// `deactivate_all` was called before finalize and did nothing.
    DeactivateAllBeforeFinalize,
}

impl fmt::Display for BuilderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyFinalize => write!(f, "finalizing an empty fields builder"),
            Self::DeactivateAllBeforeFinalize => {
                write!(f, "deactivate_all called before finalize; ignored")
            }
        }
    }
}

enum State {
    Open(SNodeTreeDraft),
    /// Holds the root once finalize succeeded; `None` if compilation or
    /// materialization failed.
    Finalized(Option<SNode>),
}

/// Builds one tree; finalized at most once.
///
/// Placement binds field members to this builder's root immediately, and
/// the binding is never undone. If the builder is dropped before finalize,
/// or finalize fails to compile or materialize the tree, the placed members
/// stay bound to a root that is never registered:
/// [`Runtime::snode_of`] returns `None` for them and they cannot be placed
/// again. Declare fresh fields to retry.
pub struct FieldsBuilder<'rt> {
    runtime: &'rt Runtime,
    state: State,
    empty: bool,
    warnings: Vec<BuilderWarning>,
}

impl<'rt> FieldsBuilder<'rt> {
    pub(crate) fn new(runtime: &'rt Runtime, draft: SNodeTreeDraft) -> Self {
        Self {
            runtime,
            state: State::Open(draft),
            empty: true,
            warnings: Vec::new(),
        }
    }

    /// Dense child of the root.
    pub fn dense(
        &mut self,
        axes: &[Axis],
        dims: impl Into<Dims>,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().dense(axes, dims)?;
        self.empty = false;
        Ok(node)
    }

    /// Pointer child of the root.
    pub fn pointer(
        &mut self,
        axes: &[Axis],
        dims: impl Into<Dims>,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().pointer(axes, dims)?;
        self.empty = false;
        Ok(node)
    }

    /// Bitmasked child of the root.
    pub fn bitmasked(
        &mut self,
        axes: &[Axis],
        dims: impl Into<Dims>,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().bitmasked(axes, dims)?;
        self.empty = false;
        Ok(node)
    }

    /// Dynamic child of the root.
    pub fn dynamic(
        &mut self,
        axes: &[Axis],
        dim: u32,
        chunk_size: Option<u32>,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?
            .root_mut()
            .dynamic(axes, dim, chunk_size)?;
        self.empty = false;
        Ok(node)
    }

    /// Bit-struct child of the root.
    pub fn bit_struct(&mut self, num_bits: u32) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().bit_struct(num_bits)?;
        self.empty = false;
        Ok(node)
    }

    /// Bit-array child of the root.
    pub fn bit_array(
        &mut self,
        axes: &[Axis],
        dims: impl Into<Dims>,
        num_bits: u32,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?
            .root_mut()
            .bit_array(axes, dims, num_bits)?;
        self.empty = false;
        Ok(node)
    }

    /// Hashed containers are not supported; always fails.
    pub fn hash(
        &mut self,
        axes: &[Axis],
        dims: impl Into<Dims>,
    ) -> Result<NodeMut<'_>, SNodeError> {
        open(&mut self.state)?.root_mut().hash(axes, dims)
    }

    /// Place `fields` on the root (under an implicit zero-axis dense node).
    pub fn place(&mut self, fields: &[&Field]) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().place(fields)?;
        self.empty = false;
        Ok(node)
    }

    /// [`place`](Self::place) with offsets or a shared exponent.
    pub fn place_with(
        &mut self,
        args: &[Place<'_>],
        options: &PlaceOptions,
    ) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?
            .root_mut()
            .place_with(args, options)?;
        self.empty = false;
        Ok(node)
    }

    /// Place adjoints next to their primals across the whole tree.
    pub fn lazy_grad(&mut self) -> Result<NodeMut<'_>, SNodeError> {
        let node = open(&mut self.state)?.root_mut().lazy_grad()?;
        self.empty = false;
        Ok(node)
    }

    /// Read-only view of node `id` of the open draft.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        match &self.state {
            State::Open(draft) => draft.node(id),
            State::Finalized(_) => None,
        }
    }

    /// Re-open node `id` for further extension.
    pub fn node_mut(&mut self, id: NodeId) -> Result<NodeMut<'_>, SNodeError> {
        open(&mut self.state)?
            .node_mut(id)
            .ok_or_else(|| SNodeError::invalid(format!("no node {id} in this tree")))
    }

    /// Seal, compile and materialize the tree; returns its root.
    ///
    /// With `raise_warning`, finalizing an empty builder records and logs
    /// [`BuilderWarning::EmptyFinalize`]; it still proceeds. The builder is
    /// finalized even if compilation fails.
    pub fn finalize(&mut self, raise_warning: bool) -> Result<SNode, SNodeError> {
        self.finish(raise_warning, false)
    }

    /// Resolve the layout without allocating storage.
    ///
    /// Sparse operations on the resulting tree fail with
    /// [`AccessError::NotMaterialized`].
    pub fn finalize_for_aot(&mut self) -> Result<SNode, SNodeError> {
        self.finish(false, true)
    }

    fn finish(&mut self, raise_warning: bool, compile_only: bool) -> Result<SNode, SNodeError> {
        let draft = match mem::replace(&mut self.state, State::Finalized(None)) {
            State::Open(draft) => draft,
            finalized @ State::Finalized(_) => {
                self.state = finalized;
                return Err(SNodeError::Finalized);
            }
        };
        if raise_warning && self.empty && draft.node_count() <= 1 {
            self.warn(BuilderWarning::EmptyFinalize);
        }
        let root = self.runtime.finalize_tree(draft, compile_only)?;
        self.state = State::Finalized(Some(root.clone()));
        Ok(root)
    }

    /// Deactivate every cell of the finalized tree.
    ///
    /// Before finalize this records
    /// [`BuilderWarning::DeactivateAllBeforeFinalize`] and does nothing.
    pub fn deactivate_all(&mut self) -> Result<(), AccessError> {
        if let State::Open(_) = self.state {
            self.warn(BuilderWarning::DeactivateAllBeforeFinalize);
            return Ok(());
        }
        match &self.state {
            State::Finalized(Some(root)) => self.runtime.deactivate_all(root),
            _ => Ok(()),
        }
    }

    /// Roots of every finalized, non-destroyed tree of `runtime`, in
    /// finalization order.
    pub fn finalized_roots(runtime: &Runtime) -> Vec<SNode> {
        (0..runtime.snode_tree_size())
            .filter_map(|i| runtime.snode_root(i))
            .collect()
    }

    /// Root of the finalized tree.
    pub fn root(&self) -> Option<&SNode> {
        match &self.state {
            State::Finalized(root) => root.as_ref(),
            State::Open(_) => None,
        }
    }

    /// Whether [`finalize`](Self::finalize) has been called.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized(_))
    }

    /// Whether no structural call has succeeded yet.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[BuilderWarning] {
        &self.warnings
    }

    fn warn(&mut self, warning: BuilderWarning) {
        tracing::warn!(%warning, "fields builder");
        self.warnings.push(warning);
    }
}

impl Drop for FieldsBuilder<'_> {
    fn drop(&mut self) {
        if let State::Open(draft) = &self.state {
            let root = draft.root_id();
            if self.runtime.registry().discard(root) {
                tracing::trace!(%root, "unfinalized fields builder dropped");
            }
        }
    }
}

fn open(state: &mut State) -> Result<&mut SNodeTreeDraft, SNodeError> {
    match state {
        State::Open(draft) => Ok(draft),
        State::Finalized(_) => Err(SNodeError::Finalized),
    }
}

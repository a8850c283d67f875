//! The runtime: tree registration, storage ownership and sparse operations.
//!
//! A [`Runtime`] owns the root registry, the layout compiler and the
//! storage of every tree finalized against it. Trees are numbered in
//! finalization order. A tree is pushed under the write lock only after it
//! compiled and (unless compile-only) its storage was allocated, so readers
//! never observe a partially registered tree.
//!
//! Sparse operations take an [`SNode`] handle and an index expression. The
//! handle must come from this runtime; its tree must be materialized and not
//! destroyed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use snode_core::{AccessError, ConfigError, FieldMember, RootId, SNodeError, SNodeTreeId, Scalar};
use snode_layout::{CompileRequest, LayoutCompiler, SNode, SNodeTree, StructCompiler};
use snode_tree::{SNodeRegistry, SNodeTreeDraft};

use crate::access::{resolve, Coords};
use crate::builder::FieldsBuilder;
use crate::config::RuntimeConfig;
use crate::storage::TreeStorage;

struct TreeSlot {
    tree: Arc<SNodeTree>,
    storage: Option<Mutex<TreeStorage>>,
    destroyed: bool,
}

#[derive(Default)]
struct Trees {
    slots: Vec<TreeSlot>,
    by_root: IndexMap<RootId, SNodeTreeId>,
}

/// Owner of finalized trees and their storage.
pub struct Runtime {
    config: RuntimeConfig,
    registry: SNodeRegistry,
    compiler: Box<dyn LayoutCompiler>,
    trees: RwLock<Trees>,
}

// Compile-time assertion: Runtime must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Runtime>();
};

impl Runtime {
    /// A runtime using [`StructCompiler`].
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        Self::with_compiler(config, Box::new(StructCompiler))
    }

    /// A runtime using a custom layout compiler.
    pub fn with_compiler(
        config: RuntimeConfig,
        compiler: Box<dyn LayoutCompiler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: SNodeRegistry::new(),
            compiler,
            trees: RwLock::new(Trees::default()),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Root registry of this runtime.
    pub fn registry(&self) -> &SNodeRegistry {
        &self.registry
    }

    /// A builder for a new tree, using this runtime's layout mode.
    pub fn fields_builder(&self) -> FieldsBuilder<'_> {
        FieldsBuilder::new(self, self.registry.create_root(self.config.layout))
    }

    /// Seal, compile and (unless `compile_only`) materialize `draft`.
    pub(crate) fn finalize_tree(
        &self,
        draft: SNodeTreeDraft,
        compile_only: bool,
    ) -> Result<SNode, SNodeError> {
        let mut trees = self.trees_mut();
        let sealed = self.registry.finalize(draft)?;
        let id = SNodeTreeId(trees.slots.len() as u32);
        let tree = Arc::new(self.compiler.compile(CompileRequest {
            tree: id,
            sealed: &sealed,
            compile_only,
        })?);
        let storage = if compile_only {
            None
        } else {
            let storage = TreeStorage::new(&tree, &self.config).map_err(|e| match e {
                AccessError::AllocationFailed {
                    requested,
                    capacity,
                } => SNodeError::AllocationFailed {
                    requested,
                    capacity,
                },
                other => SNodeError::invalid(other.to_string()),
            })?;
            Some(Mutex::new(storage))
        };
        tracing::debug!(
            tree = id.0,
            nodes = tree.len(),
            root_bytes = tree.root_size_bytes(),
            compile_only,
            "snode tree finalized"
        );
        trees.by_root.insert(tree.root_id(), id);
        trees.slots.push(TreeSlot {
            tree: Arc::clone(&tree),
            storage,
            destroyed: false,
        });
        Ok(SNode::root(tree))
    }

    /// Number of trees finalized against this runtime, destroyed ones
    /// included.
    pub fn snode_tree_size(&self) -> usize {
        self.trees().slots.len()
    }

    /// Root of tree `i`; `None` if out of range or destroyed.
    pub fn snode_root(&self, i: usize) -> Option<SNode> {
        let trees = self.trees();
        let slot = trees.slots.get(i)?;
        if slot.destroyed {
            return None;
        }
        Some(SNode::root(Arc::clone(&slot.tree)))
    }

    /// Compiled tree `id`, destroyed or not.
    pub fn tree(&self, id: SNodeTreeId) -> Option<Arc<SNodeTree>> {
        self.trees()
            .slots
            .get(id.0 as usize)
            .map(|slot| Arc::clone(&slot.tree))
    }

    /// Place node storing `member`, if it was placed into a finalized tree
    /// of this runtime.
    pub fn snode_of(&self, member: &FieldMember) -> Option<SNode> {
        let placement = member.placement()?;
        let trees = self.trees();
        let id = trees.by_root.get(&placement.root)?;
        let tree = &trees.slots[id.0 as usize].tree;
        let node = tree.place_of(member.id())?;
        SNode::new(Arc::clone(tree), node)
    }

    /// Release the storage of tree `id`.
    ///
    /// Handles stay valid for layout queries; sparse operations on the tree
    /// fail with [`AccessError::TreeDestroyed`].
    pub fn destroy_snode_tree(&self, id: SNodeTreeId) -> Result<(), AccessError> {
        let mut trees = self.trees_mut();
        let slot = trees
            .slots
            .get_mut(id.0 as usize)
            .ok_or(AccessError::UnknownTree { tree: id })?;
        if slot.destroyed {
            return Err(AccessError::TreeDestroyed { tree: id });
        }
        slot.destroyed = true;
        slot.storage = None;
        tracing::debug!(tree = id.0, "snode tree destroyed");
        Ok(())
    }

    /// Activate the cell of `node` at `indices` along its whole path.
    pub fn activate(&self, node: &SNode, indices: &[i32]) -> Result<(), AccessError> {
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            storage.activate(tree, target, &coords)
        })
    }

    /// Release the cell of a pointer, bitmasked or dynamic `node`.
    pub fn deactivate(&self, node: &SNode, indices: &[i32]) -> Result<(), AccessError> {
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            storage.deactivate(tree, target, &coords)
        })
    }

    /// Whether the cell of `node` at `indices` is active.
    pub fn is_active(&self, node: &SNode, indices: &[i32]) -> Result<bool, AccessError> {
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            storage.is_active(tree, target, &coords)
        })
    }

    /// Append `value` to the dynamic list of `node` in the parent cell at
    /// `indices`; returns the insertion position.
    pub fn append(
        &self,
        node: &SNode,
        indices: &[i32],
        value: impl Into<Scalar>,
    ) -> Result<u32, AccessError> {
        let value = value.into();
        self.with_storage(node, |storage, tree| {
            let coords = parent_coords(node, indices)?;
            storage.append(tree, node.compiled(), &coords, value)
        })
    }

    /// Length of the dynamic list of `node` in the parent cell at `indices`.
    pub fn length(&self, node: &SNode, indices: &[i32]) -> Result<u32, AccessError> {
        self.with_storage(node, |storage, tree| {
            let coords = parent_coords(node, indices)?;
            storage.length(tree, node.compiled(), &coords)
        })
    }

    /// Runtime-wide address of the cell of `node` at `indices`.
    ///
    /// Fails with [`AccessError::Inactive`] if the path is not active.
    pub fn get_addr(&self, node: &SNode, indices: &[i32]) -> Result<u64, AccessError> {
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            let addr = storage.cell_address(tree, target, &coords)?;
            Ok(addr.global(tree.id()))
        })
    }

    /// Read the value stored at place `node`.
    pub fn read(&self, node: &SNode, indices: &[i32]) -> Result<Scalar, AccessError> {
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            storage.read(tree, target, &coords)
        })
    }

    /// Write `value` to place `node`, activating its path.
    pub fn write(
        &self,
        node: &SNode,
        indices: &[i32],
        value: impl Into<Scalar>,
    ) -> Result<(), AccessError> {
        let value = value.into();
        self.with_storage(node, |storage, tree| {
            let target = node.compiled();
            let coords = resolve(target, indices)?;
            storage.write(tree, target, &coords, value)
        })
    }

    /// Live pointer blocks or dynamic chunks of `node`.
    pub fn num_dynamically_allocated(&self, node: &SNode) -> Result<usize, AccessError> {
        self.with_storage(node, |storage, _| {
            Ok(storage.num_dynamically_allocated(node.id()))
        })
    }

    /// Deactivate every cell of `node`'s subtree in the whole tree.
    pub fn deactivate_all(&self, node: &SNode) -> Result<(), AccessError> {
        self.with_storage(node, |storage, tree| {
            storage.deactivate_all(tree, node.compiled());
            Ok(())
        })
    }

    /// Bytes of the storage pool handed out for `node`'s tree.
    pub fn used_bytes(&self, node: &SNode) -> Result<usize, AccessError> {
        self.with_storage(node, |storage, _| Ok(storage.used_bytes()))
    }

    fn with_storage<R>(
        &self,
        node: &SNode,
        f: impl FnOnce(&mut TreeStorage, &SNodeTree) -> Result<R, AccessError>,
    ) -> Result<R, AccessError> {
        let id = node.tree_id();
        let trees = self.trees();
        let slot = trees
            .slots
            .get(id.0 as usize)
            .ok_or(AccessError::UnknownTree { tree: id })?;
        if !Arc::ptr_eq(&slot.tree, node.tree()) {
            return Err(AccessError::ForeignNode);
        }
        if slot.destroyed {
            return Err(AccessError::TreeDestroyed { tree: id });
        }
        let storage = slot
            .storage
            .as_ref()
            .ok_or(AccessError::NotMaterialized { tree: id })?;
        let mut guard = lock(storage);
        f(&mut guard, &slot.tree)
    }

    fn trees(&self) -> RwLockReadGuard<'_, Trees> {
        self.trees.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn trees_mut(&self) -> RwLockWriteGuard<'_, Trees> {
        self.trees.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: SNodeRegistry::new(),
            compiler: Box::new(StructCompiler),
            trees: RwLock::new(Trees::default()),
        }
    }
}

fn lock(storage: &Mutex<TreeStorage>) -> MutexGuard<'_, TreeStorage> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates of the parent cell of `node` from parent-space `indices`.
fn parent_coords(node: &SNode, indices: &[i32]) -> Result<Coords, AccessError> {
    let parent = node
        .parent(1)
        .ok_or(AccessError::WrongKind {
            op: "parent",
            ty: node.ty(),
        })?;
    resolve(parent.compiled(), indices)
}

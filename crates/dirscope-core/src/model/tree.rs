/// Arena-backed scan tree with incremental upward aggregation.
///
/// All nodes live in a single `Vec<Node>`. Relationships use `NodeIndex`
/// (a thin `u32` wrapper) rather than heap pointers; destroyed subtrees
/// tombstone their slots onto a free list and bump the slot generation so
/// that outstanding weak handles fail to resolve instead of dereferencing
/// a recycled node.
///
/// Aggregates are maintained incrementally: every insertion, removal and
/// watcher delta walks the parent chain once. The scanner's `read_jobs`
/// counters ride the same chain and drive the done flag (a node is done
/// exactly when no directory in its subtree is still being enumerated).
use super::node::{Node, NodeIndex, NodeKind, NodeRef};
use compact_str::CompactString;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Fatal structural errors. `InvariantViolation` indicates a bug in the
/// caller (e.g. attaching children to a file) and aborts the scan.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Aggregate deltas carried up the parent chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub size_logical: u64,
    pub size_physical: u64,
    pub items: u64,
    pub files: u64,
    pub folders: u64,
    pub last_change: i64,
}

impl Totals {
    /// Fold another delta into this one. Sums add; `last_change` is a max.
    pub fn merge(&mut self, other: Totals) {
        self.size_logical += other.size_logical;
        self.size_physical += other.size_physical;
        self.items += other.items;
        self.files += other.files;
        self.folders += other.folders;
        self.last_change = self.last_change.max(other.last_change);
    }

    /// The aggregate contribution of a single node (its subtree sums plus
    /// itself, as seen by its parent).
    pub fn of(node: &Node) -> Self {
        let (own_item, own_file, own_folder) = match node.kind {
            NodeKind::File | NodeKind::HardlinkFileRef => (1, 1, 0),
            NodeKind::Directory
            | NodeKind::HardlinksRoot
            | NodeKind::HardlinkIndexSet
            | NodeKind::HardlinkIndex => (1, 0, 1),
            // Synthetic space leaves and roots do not count as items.
            _ => (0, 0, 0),
        };
        Self {
            size_logical: node.size_logical,
            size_physical: node.size_physical,
            items: node.items_count + own_item,
            files: node.files_count + own_file,
            folders: node.folders_count + own_folder,
            last_change: node.last_change,
        }
    }
}

/// The complete tree produced by a scan.
#[derive(Debug, Default)]
pub struct FileTree {
    nodes: Vec<Node>,
    free_slots: Vec<NodeIndex>,
    /// Root node indices — a single drive/directory root, or one
    /// `MyComputer` container with per-drive children.
    pub roots: Vec<NodeIndex>,
}

impl FileTree {
    /// Create an empty tree with pre-allocated capacity.
    ///
    /// `estimated_nodes` should be a rough upper bound (e.g. 1_000_000 for
    /// a typical system drive). The arena grows if needed, but
    /// pre-allocation avoids repeated re-allocation during scanning.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(estimated_nodes),
            free_slots: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Allocate a node in the arena, reusing a tombstoned slot when one is
    /// available, and return its index.
    pub fn add_node(&mut self, mut node: Node) -> NodeIndex {
        match self.free_slots.pop() {
            Some(idx) => {
                node.generation = self.nodes[idx.idx()].generation;
                self.nodes[idx.idx()] = node;
                idx
            }
            None => {
                let idx = NodeIndex::new(self.nodes.len());
                self.nodes.push(node);
                idx
            }
        }
    }

    /// Install `node` as a new root.
    pub fn add_root(&mut self, node: Node) -> NodeIndex {
        let idx = self.add_node(node);
        self.roots.push(idx);
        idx
    }

    /// Attach an existing node under `parent`, appending to the child
    /// sequence. With `propagate`, the child's current aggregate is added
    /// upward and the ancestors' done flags are invalidated.
    ///
    /// Fails with `InvariantViolation` if `parent` is a leaf kind.
    pub fn add_child(
        &mut self,
        parent: NodeIndex,
        child: NodeIndex,
        propagate: bool,
    ) -> Result<(), TreeError> {
        if self.nodes[parent.idx()].is_leaf() {
            return Err(TreeError::InvariantViolation(format!(
                "cannot attach a child to leaf kind {:?}",
                self.nodes[parent.idx()].kind
            )));
        }
        self.nodes[child.idx()].parent = Some(parent);
        self.nodes[parent.idx()].children.push(child);

        if propagate {
            let totals = Totals::of(&self.nodes[child.idx()]);
            self.upward_set_undone(parent);
            self.upward_add(parent, totals);
        }

        // A new directory brings a pending read job for itself.
        let jobs = self.nodes[child.idx()].read_jobs;
        if jobs > 0 {
            self.upward_add_read_jobs(parent, jobs);
        }
        Ok(())
    }

    /// Detach `child` from `parent`, subtract its aggregate from the
    /// ancestor chain, and destroy the subtree. Outstanding `NodeRef`s
    /// into the subtree stop resolving.
    pub fn remove_child(&mut self, parent: NodeIndex, child: NodeIndex) -> Result<(), TreeError> {
        let pos = self.nodes[parent.idx()]
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                TreeError::InvariantViolation("remove_child: not a child of parent".into())
            })?;
        self.nodes[parent.idx()].children.remove(pos);

        let totals = Totals::of(&self.nodes[child.idx()]);
        self.upward_subtract(parent, totals);
        let jobs = self.nodes[child.idx()].read_jobs;
        if jobs > 0 {
            self.upward_subtract_read_jobs(parent, jobs);
        }
        self.destroy_subtree(child);
        Ok(())
    }

    /// Tombstone `idx` and every descendant, bumping slot generations and
    /// queueing the slots for reuse.
    fn destroy_subtree(&mut self, idx: NodeIndex) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            let node = &mut self.nodes[i.idx()];
            stack.extend(node.children.drain(..));
            node.alive = false;
            node.generation = node.generation.wrapping_add(1);
            node.parent = None;
            self.free_slots.push(i);
        }
    }

    /// Add `totals` to `start` and every ancestor. `last_change` is a max,
    /// not a sum.
    pub fn upward_add(&mut self, start: NodeIndex, totals: Totals) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            node.size_logical += totals.size_logical;
            node.size_physical += totals.size_physical;
            node.items_count += totals.items;
            node.files_count += totals.files;
            node.folders_count += totals.folders;
            node.last_change = node.last_change.max(totals.last_change);
            cursor = node.parent;
        }
    }

    /// Subtract `totals` from `start` and every ancestor. `last_change` is
    /// left as-is: a stale maximum is harmless and recomputed on refresh.
    pub fn upward_subtract(&mut self, start: NodeIndex, totals: Totals) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            node.size_logical = node.size_logical.saturating_sub(totals.size_logical);
            node.size_physical = node.size_physical.saturating_sub(totals.size_physical);
            node.items_count = node.items_count.saturating_sub(totals.items);
            node.files_count = node.files_count.saturating_sub(totals.files);
            node.folders_count = node.folders_count.saturating_sub(totals.folders);
            cursor = node.parent;
        }
    }

    /// Clear the done flag on `start` and every ancestor.
    pub fn upward_set_undone(&mut self, start: NodeIndex) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            node.done = false;
            cursor = node.parent;
        }
    }

    /// Restore the done flag from `start` upward wherever no read jobs
    /// remain outstanding.
    pub fn upward_restore_done(&mut self, start: NodeIndex) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            if node.read_jobs != 0 {
                break;
            }
            node.done = true;
            cursor = node.parent;
        }
    }

    pub(crate) fn upward_add_read_jobs(&mut self, start: NodeIndex, jobs: u32) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            node.read_jobs += jobs;
            node.done = false;
            cursor = node.parent;
        }
    }

    fn upward_subtract_read_jobs(&mut self, start: NodeIndex, jobs: u32) {
        let mut cursor = Some(start);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            node.read_jobs = node.read_jobs.saturating_sub(jobs);
            cursor = node.parent;
        }
    }

    /// Record that the directory `dir` finished enumeration: one read job
    /// is retired along the chain, and every node whose counter reaches
    /// zero becomes done and has its children sorted size-descending.
    ///
    /// Returns the indices that transitioned to done, deepest first — the
    /// causal `child done ≺ parent done` order.
    pub fn finish_read_job(&mut self, dir: NodeIndex) -> Vec<NodeIndex> {
        let mut completed = Vec::new();
        let mut cursor = Some(dir);
        while let Some(i) = cursor {
            let node = &mut self.nodes[i.idx()];
            debug_assert!(node.read_jobs > 0, "read_jobs underflow");
            node.read_jobs = node.read_jobs.saturating_sub(1);
            let parent = node.parent;
            if node.read_jobs == 0 && !node.done {
                node.done = true;
                self.sort_children_by_size(i);
                completed.push(i);
            }
            cursor = parent;
        }
        completed
    }

    /// Sort the direct children of `idx` by physical size descending
    /// (stable; ties keep insertion order).
    pub fn sort_children_by_size(&mut self, idx: NodeIndex) {
        let mut children = std::mem::take(&mut self.nodes[idx.idx()].children);
        children.sort_by(|a, b| {
            self.nodes[b.idx()]
                .size_physical
                .cmp(&self.nodes[a.idx()].size_physical)
        });
        self.nodes[idx.idx()].children = children;
    }

    /// Take a weak handle to `idx`.
    pub fn handle(&self, idx: NodeIndex) -> NodeRef {
        NodeRef {
            index: idx,
            generation: self.nodes[idx.idx()].generation,
        }
    }

    /// Re-validate a weak handle. Returns `None` when the node has been
    /// destroyed (or its slot recycled) since the handle was taken.
    pub fn resolve(&self, r: NodeRef) -> Option<NodeIndex> {
        let node = self.nodes.get(r.index.idx())?;
        (node.alive && node.generation == r.generation).then_some(r.index)
    }

    /// Get the node at the given index.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.idx()]
    }

    /// Get a mutable reference to the node at the given index.
    #[inline]
    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.idx()]
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstruct the full path for a node by walking up to the nearest
    /// ancestor that carries one (roots always do). Hardlink file
    /// references store their target path directly.
    pub fn full_path(&self, index: NodeIndex) -> PathBuf {
        let mut segments: Vec<&str> = Vec::new();
        let mut cursor = index;
        loop {
            let node = &self.nodes[cursor.idx()];
            if let Some(base) = &node.full_path {
                let mut path = base.clone();
                for seg in segments.iter().rev() {
                    path.push(seg);
                }
                return path;
            }
            segments.push(node.name.as_str());
            match node.parent {
                Some(p) => cursor = p,
                None => break,
            }
        }
        // Rootless subtree (mid-destruction or synthetic): names only.
        let mut path = PathBuf::new();
        for seg in segments.iter().rev() {
            path.push(seg);
        }
        path
    }

    /// Find the node for `path` under `root` by walking name components.
    /// Synthetic children are never matched. Returns `None` when any
    /// component is missing (e.g. the path sits behind an unfollowed
    /// reparse point).
    pub fn find_by_path(&self, root: NodeIndex, path: &Path) -> Option<NodeIndex> {
        let base = self.nodes[root.idx()].full_path.as_deref()?;
        let rel = path.strip_prefix(base).ok()?;
        let mut cursor = root;
        for comp in rel.components() {
            let Component::Normal(name) = comp else {
                continue;
            };
            let name = name.to_string_lossy();
            cursor = *self.nodes[cursor.idx()].children.iter().find(|&&c| {
                let child = &self.nodes[c.idx()];
                matches!(child.kind, NodeKind::Directory | NodeKind::File | NodeKind::Drive)
                    && child.name.as_str() == name
            })?;
        }
        Some(cursor)
    }

    /// Locate the drive ancestor of `idx` (or `idx` itself).
    pub fn parent_drive(&self, idx: NodeIndex) -> Option<NodeIndex> {
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            if self.nodes[i.idx()].kind == NodeKind::Drive {
                return Some(i);
            }
            cursor = self.nodes[i.idx()].parent;
        }
        None
    }

    /// Find the unique child of `idx` with the given kind.
    pub fn find_child_of_kind(&self, idx: NodeIndex, kind: NodeKind) -> Option<NodeIndex> {
        self.nodes[idx.idx()]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c.idx()].kind == kind)
    }

    /// Depth of `idx` below its root (roots are depth 0).
    pub fn depth(&self, idx: NodeIndex) -> usize {
        let mut depth = 0;
        let mut cursor = self.nodes[idx.idx()].parent;
        while let Some(i) = cursor {
            depth += 1;
            cursor = self.nodes[i.idx()].parent;
        }
        depth
    }

    /// Iterate the subtree of `root` depth-first (preorder), including
    /// `root` itself.
    pub fn walk(&self, root: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut stack = vec![root];
        std::iter::from_fn(move || {
            let idx = stack.pop()?;
            stack.extend(self.nodes[idx.idx()].children.iter().rev());
            Some(idx)
        })
    }

    /// Convenience constructor for a synthetic child attached in one step.
    pub fn attach_synthetic(
        &mut self,
        parent: NodeIndex,
        kind: NodeKind,
        name: &str,
    ) -> Result<NodeIndex, TreeError> {
        let idx = self.add_node(Node::new_synthetic(kind, CompactString::new(name)));
        self.add_child(parent, idx, true)?;
        Ok(idx)
    }
}

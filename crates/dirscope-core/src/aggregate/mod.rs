/// Post-scan aggregation passes.
///
/// Runs once per scan root after every directory underneath has finished
/// enumeration, and again on refresh:
///
/// 1. **Hardlink billing.** Files observed with the same non-zero content
///    identity are re-billed: their physical bytes leave the directory
///    chain and a single contribution (the largest observed) lands under
///    `<Hardlinks>/Index Set NN/Index 0x…`. Logical sizes stay put.
/// 2. **Free/unknown synthesis.** Drives get exactly one `<Free Space>`
///    and one `<Unknown>` child; unknown covers the bytes the OS reports
///    as used that the tally did not account for.
///
/// Hardlink billing runs first: until the overcount is removed, the
/// unknown slice would be computed against inflated tallies.
use crate::fs::{attr, VolumeStats};
use crate::model::{FileTree, Node, NodeIndex, NodeKind, Totals};
use compact_str::CompactString;
use std::collections::HashMap;
use tracing::debug;

/// Number of `Index Set` buckets the hardlink index is split into.
/// Purely a navigation aid for very link-heavy volumes.
const INDEX_SET_COUNT: u128 = 20;

pub const FREE_SPACE_NAME: &str = "<Free Space>";
pub const UNKNOWN_NAME: &str = "<Unknown>";
pub const HARDLINKS_NAME: &str = "<Hardlinks>";

/// Run the aggregation passes for a completed scan root and restore the
/// done flags along the chain above it.
pub fn finish_root(tree: &mut FileTree, root: NodeIndex, stats: Option<VolumeStats>) {
    hardlink_adjustment(tree, root);

    if tree.node(root).kind == NodeKind::Drive {
        if let Some(stats) = stats {
            synthesize_free_and_unknown(tree, root, stats);
        }
    }

    tree.upward_restore_done(root);
}

/// Attach the `<Free Space>` and `<Unknown>` children of a drive.
///
/// `unknown = max(0, (total − free) − tallied_physical)`, where the tally
/// is the drive's physical sum before either synthetic child exists.
fn synthesize_free_and_unknown(tree: &mut FileTree, drive: NodeIndex, stats: VolumeStats) {
    debug_assert!(tree.find_child_of_kind(drive, NodeKind::FreeSpace).is_none());

    let tallied = tree.node(drive).size_physical;
    let unknown = stats.used().saturating_sub(tallied);

    attach_sized(tree, drive, NodeKind::FreeSpace, FREE_SPACE_NAME, stats.free);
    attach_sized(tree, drive, NodeKind::Unknown, UNKNOWN_NAME, unknown);
}

/// Recompute an existing `<Unknown>` child after part of the drive was
/// refreshed.
pub fn update_unknown(tree: &mut FileTree, drive: NodeIndex, stats: VolumeStats) {
    let Some(unknown) = tree.find_child_of_kind(drive, NodeKind::Unknown) else {
        return;
    };
    let free = tree
        .find_child_of_kind(drive, NodeKind::FreeSpace)
        .map(|f| tree.node(f).size_physical)
        .unwrap_or(0);
    let old = tree.node(unknown).size_physical;
    let tallied = tree
        .node(drive)
        .size_physical
        .saturating_sub(free)
        .saturating_sub(old);
    let new = stats.used().saturating_sub(tallied);

    tree.upward_subtract(
        unknown,
        Totals {
            size_logical: old,
            size_physical: old,
            ..Totals::default()
        },
    );
    tree.upward_add(
        unknown,
        Totals {
            size_logical: new,
            size_physical: new,
            ..Totals::default()
        },
    );
    tree.upward_restore_done(drive);
}

fn attach_sized(tree: &mut FileTree, parent: NodeIndex, kind: NodeKind, name: &str, size: u64) {
    let mut node = Node::new_synthetic(kind, CompactString::new(name));
    node.size_logical = size;
    node.size_physical = size;
    let idx = tree.add_node(node);
    // The parent is a drive, never a leaf; attach cannot fail.
    let _ = tree.add_child(parent, idx, true);
}

/// Re-bill every hardlink group under `root` exactly once.
///
/// Walks the subtree (never descending into reparse points — their
/// content identities belong to other volumes), groups files by
/// `file_index`, and for every group of two or more:
///
/// - subtracts each file's physical size from its ancestor chain and
///   flags the file, keeping its logical size;
/// - creates an `Index 0x…` folder carrying the group's maximum observed
///   physical size (the one contribution that propagates upward), with
///   one zero-billed file reference per link.
pub fn hardlink_adjustment(tree: &mut FileTree, root: NodeIndex) {
    let mut groups: HashMap<u128, Vec<NodeIndex>> = HashMap::new();
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        let node = tree.node(idx);
        if node.kind == NodeKind::File && node.file_index != 0 && !node.is_hardlink {
            groups.entry(node.file_index).or_default().push(idx);
        }
        if !node.is_leaf() && node.attributes & attr::REPARSE == 0 {
            stack.extend(node.children.iter().copied());
        }
    }

    let mut groups: Vec<(u128, Vec<NodeIndex>)> = groups
        .into_iter()
        .filter(|(_, files)| files.len() >= 2)
        .collect();
    if groups.is_empty() {
        return;
    }
    groups.sort_by_key(|&(index, _)| index);
    debug!("{} hardlink group(s) under root", groups.len());

    let hardlinks = ensure_child(tree, root, NodeKind::HardlinksRoot, HARDLINKS_NAME);

    for (index, files) in groups {
        let representative = files
            .iter()
            .map(|&f| tree.node(f).size_physical)
            .max()
            .unwrap_or(0);

        let set_name = format!("Index Set {:02}", index % INDEX_SET_COUNT);
        let set = ensure_child(tree, hardlinks, NodeKind::HardlinkIndexSet, &set_name);

        let mut folder = Node::new_synthetic(
            NodeKind::HardlinkIndex,
            CompactString::new(format!("Index {index:#018x}")),
        );
        folder.file_index = index;
        folder.size_physical = representative;
        let folder = {
            let idx = tree.add_node(folder);
            let _ = tree.add_child(set, idx, true);
            idx
        };

        for file in files {
            let node = tree.node(file);
            let raw_physical = node.size_physical;
            let mut file_ref = Node::new_synthetic(
                NodeKind::HardlinkFileRef,
                CompactString::new(node.name.as_str()),
            );
            file_ref.full_path = Some(tree.full_path(file));
            file_ref.file_index = index;
            file_ref.size_logical = node.size_logical;
            // Mirrors the zeroed original: the index folder alone carries
            // the group's physical bytes.
            file_ref.size_physical = 0;
            file_ref.last_change = node.last_change;

            // Reference entries are bookkeeping: attached without upward
            // propagation so the folder's single contribution stays the
            // only one.
            let ref_idx = tree.add_node(file_ref);
            let _ = tree.add_child(folder, ref_idx, false);

            tree.node_mut(file).is_hardlink = true;
            tree.upward_subtract(
                file,
                Totals {
                    size_physical: raw_physical,
                    ..Totals::default()
                },
            );
        }

        tree.sort_children_by_size(folder);
    }

    // Order the buckets and restore their done flags (attaching folders
    // invalidated the chain).
    let sets = tree.node(hardlinks).children.clone();
    for set in sets {
        tree.sort_children_by_size(set);
        tree.node_mut(set).done = true;
    }
    tree.sort_children_by_size(hardlinks);
    tree.node_mut(hardlinks).done = true;
}

fn ensure_child(tree: &mut FileTree, parent: NodeIndex, kind: NodeKind, name: &str) -> NodeIndex {
    let existing = tree.node(parent).children.iter().copied().find(|&c| {
        let child = tree.node(c);
        child.kind == kind && child.name == name
    });
    match existing {
        Some(idx) => idx,
        None => {
            let idx = tree.add_node(Node::new_synthetic(kind, CompactString::new(name)));
            let _ = tree.add_child(parent, idx, true);
            idx
        }
    }
}

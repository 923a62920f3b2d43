/// Column identities and the total order used by list views and layout.
use super::node::NodeIndex;
use super::tree::FileTree;
use std::cmp::Ordering;

/// Sortable columns of the hierarchical list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    Name,
    SizePhysical,
    SizeLogical,
    Items,
    Files,
    Folders,
    LastChange,
    Attributes,
    Owner,
}

/// Compare two siblings on `column`, breaking ties with `tie_column`.
///
/// The name column orders by kind rank first (containers before files,
/// synthetic entries last) and then case-insensitively by name, which
/// keeps the sort stable across case-only renames.
pub fn compare(
    tree: &FileTree,
    a: NodeIndex,
    b: NodeIndex,
    column: Column,
    tie_column: Column,
) -> Ordering {
    let primary = compare_one(tree, a, b, column);
    if primary != Ordering::Equal || column == tie_column {
        return primary;
    }
    compare_one(tree, a, b, tie_column)
}

fn compare_one(tree: &FileTree, a: NodeIndex, b: NodeIndex, column: Column) -> Ordering {
    let na = tree.node(a);
    let nb = tree.node(b);
    match column {
        Column::Name => na
            .kind
            .rank()
            .cmp(&nb.kind.rank())
            .then_with(|| caseless_cmp(&na.name, &nb.name)),
        Column::SizePhysical => na.size_physical.cmp(&nb.size_physical),
        Column::SizeLogical => na.size_logical.cmp(&nb.size_logical),
        Column::Items => na.items_count.cmp(&nb.items_count),
        Column::Files => na.files_count.cmp(&nb.files_count),
        Column::Folders => na.folders_count.cmp(&nb.folders_count),
        Column::LastChange => na.last_change.cmp(&nb.last_change),
        Column::Attributes => sort_attributes(na.attributes).cmp(&sort_attributes(nb.attributes)),
        Column::Owner => caseless_cmp(
            na.owner.as_deref().unwrap_or(""),
            nb.owner.as_deref().unwrap_or(""),
        ),
    }
}

fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Weight attributes so that "heavier" combinations (system + hidden)
/// sort after lighter ones regardless of raw bit positions.
fn sort_attributes(attributes: u32) -> u32 {
    use crate::fs::attr;
    let mut weight = 0;
    for (bit, rank) in [
        (attr::READ_ONLY, 1u32),
        (attr::ARCHIVE, 2),
        (attr::COMPRESSED, 4),
        (attr::ENCRYPTED, 8),
        (attr::SPARSE, 16),
        (attr::REPARSE, 32),
        (attr::HIDDEN, 64),
        (attr::SYSTEM, 128),
    ] {
        if attributes & bit != 0 {
            weight |= rank;
        }
    }
    weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use compact_str::CompactString;
    use std::path::PathBuf;

    fn fixture() -> (FileTree, NodeIndex, NodeIndex, NodeIndex) {
        let mut tree = FileTree::with_capacity(8);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("data"),
            PathBuf::from("/data"),
        ));
        let dir = tree.add_node(Node::new_dir(CompactString::new("zeta")));
        tree.add_child(root, dir, true).unwrap();
        let file = tree.add_node(Node::new_file(CompactString::new("Alpha.txt"), 500, 500));
        tree.add_child(root, file, true).unwrap();
        (tree, root, dir, file)
    }

    /// Directories sort before files on the name column even when the
    /// file name is alphabetically earlier.
    #[test]
    fn name_column_ranks_directories_first() {
        let (tree, _, dir, file) = fixture();
        assert_eq!(
            compare(&tree, dir, file, Column::Name, Column::Name),
            Ordering::Less
        );
    }

    #[test]
    fn tie_break_uses_secondary_column() {
        let mut tree = FileTree::with_capacity(8);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("data"),
            PathBuf::from("/data"),
        ));
        let a = tree.add_node(Node::new_file(CompactString::new("a"), 100, 100));
        tree.add_child(root, a, true).unwrap();
        let b = tree.add_node(Node::new_file(CompactString::new("b"), 100, 100));
        tree.add_child(root, b, true).unwrap();

        // Same size; the name column decides.
        assert_eq!(
            compare(&tree, a, b, Column::SizeLogical, Column::Name),
            Ordering::Less
        );
    }

    /// Sorting must be stable: sorting an already-sorted sequence again
    /// (or pre-permuting equal elements) never reorders equal keys.
    #[test]
    fn sort_is_stable_for_equal_keys() {
        let mut tree = FileTree::with_capacity(8);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("data"),
            PathBuf::from("/data"),
        ));
        let mut nodes = Vec::new();
        for name in ["one", "two", "three"] {
            let f = tree.add_node(Node::new_file(CompactString::new(name), 42, 42));
            tree.add_child(root, f, true).unwrap();
            nodes.push(f);
        }
        let mut sorted = nodes.clone();
        sorted.sort_by(|&x, &y| compare(&tree, x, y, Column::SizeLogical, Column::SizeLogical));
        assert_eq!(sorted, nodes, "equal keys must keep insertion order");
    }
}

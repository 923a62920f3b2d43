/// Largest-files view.
///
/// Two ways in: a live consumer fed by the scanner's `FileCompleted`
/// channel (bounded, drained in batches, trimmed to capacity), and a
/// one-shot post-scan computation using partial selection for trees that
/// were scanned without a feed attached.
use crate::model::{FileTree, NodeIndex, NodeKind, NodeRef};
use crate::scanner::progress::FileHit;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// A single entry in the largest-files results.
#[derive(Clone, Copy, Debug)]
pub struct LargestFile {
    pub node: NodeRef,
    pub size_logical: u64,
}

/// Resolved entry for display.
#[derive(Clone, Debug)]
pub struct LargestFileInfo {
    pub path: PathBuf,
    pub size_logical: u64,
}

/// Live top-N collector.
///
/// The consumer thread drains the feed until the scanner drops its end,
/// keeping an ordered list of at most `capacity` entries. Memory is
/// bounded by the capacity here and by the feed channel's own bound.
pub struct TopFiles {
    list: Arc<Mutex<Vec<LargestFile>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TopFiles {
    /// Start consuming `feed`, keeping the `capacity` largest files.
    pub fn spawn(feed: Receiver<FileHit>, capacity: usize) -> Self {
        let list = Arc::new(Mutex::new(Vec::with_capacity(capacity.min(4_096))));
        let shared = list.clone();
        let thread = thread::Builder::new()
            .name("dirscope-topn".into())
            .spawn(move || {
                let mut batch = Vec::with_capacity(256);
                while let Ok(first) = feed.recv() {
                    batch.push(first);
                    while batch.len() < 256 {
                        match feed.try_recv() {
                            Ok(hit) => batch.push(hit),
                            Err(_) => break,
                        }
                    }
                    let mut list = shared.lock();
                    for hit in batch.drain(..) {
                        insert_trimmed(&mut list, hit, capacity);
                    }
                }
            })
            .expect("failed to spawn top-N consumer");
        Self {
            list,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Wait for the feed to drain (the scanner has finished or been
    /// cancelled).
    pub fn wait(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Current contents, largest first.
    pub fn snapshot(&self) -> Vec<LargestFile> {
        self.list.lock().clone()
    }

    /// Current contents with paths, skipping entries whose nodes have
    /// since been removed from the tree.
    pub fn snapshot_resolved(&self, tree: &FileTree) -> Vec<LargestFileInfo> {
        self.list
            .lock()
            .iter()
            .filter_map(|entry| {
                let idx = tree.resolve(entry.node)?;
                Some(LargestFileInfo {
                    path: tree.full_path(idx),
                    size_logical: entry.size_logical,
                })
            })
            .collect()
    }
}

fn insert_trimmed(list: &mut Vec<LargestFile>, hit: FileHit, capacity: usize) {
    if capacity == 0 {
        return;
    }
    if list.len() >= capacity {
        // Full and smaller than the current minimum: nothing to do.
        if hit.size_logical <= list.last().map(|e| e.size_logical).unwrap_or(0) {
            return;
        }
    }
    let pos = list
        .partition_point(|e| e.size_logical >= hit.size_logical);
    list.insert(
        pos,
        LargestFile {
            node: hit.node,
            size_logical: hit.size_logical,
        },
    );
    list.truncate(capacity);
}

/// One-shot: the `n` largest files under `root`.
///
/// Uses `select_nth_unstable_by` (O(n) average) to bring the top-n
/// entries to the front, then sorts only those — much cheaper than a
/// full sort when the tree is large.
pub fn largest_files(tree: &FileTree, root: NodeIndex, n: usize) -> Vec<LargestFileInfo> {
    if n == 0 {
        return Vec::new();
    }
    let mut files: Vec<NodeIndex> = tree
        .walk(root)
        .filter(|&idx| tree.node(idx).kind == NodeKind::File)
        .collect();

    if files.len() > n {
        files.select_nth_unstable_by(n - 1, |&a, &b| {
            tree.node(b).size_logical.cmp(&tree.node(a).size_logical)
        });
        files.truncate(n);
    }
    files.sort_unstable_by(|&a, &b| tree.node(b).size_logical.cmp(&tree.node(a).size_logical));

    files
        .into_iter()
        .map(|idx| LargestFileInfo {
            path: tree.full_path(idx),
            size_logical: tree.node(idx).size_logical,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use compact_str::CompactString;
    use std::path::PathBuf;

    fn tree_with_sizes(sizes: &[u64]) -> (FileTree, NodeIndex) {
        let mut tree = FileTree::with_capacity(16);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("/data"),
            PathBuf::from("/data"),
        ));
        for (i, &size) in sizes.iter().enumerate() {
            let f = tree.add_node(Node::new_file(
                CompactString::new(format!("f{i}.bin")),
                size,
                size,
            ));
            tree.add_child(root, f, true).unwrap();
        }
        (tree, root)
    }

    #[test]
    fn largest_files_sorted_descending_and_capped() {
        let (tree, root) = tree_with_sizes(&[50, 400, 10, 300, 200]);
        let top = largest_files(&tree, root, 3);
        let sizes: Vec<u64> = top.iter().map(|f| f.size_logical).collect();
        assert_eq!(sizes, vec![400, 300, 200]);
    }

    #[test]
    fn zero_capacity_returns_empty() {
        let (tree, root) = tree_with_sizes(&[1, 2, 3]);
        assert!(largest_files(&tree, root, 0).is_empty());
    }

    #[test]
    fn live_consumer_trims_to_capacity() {
        let (tree, root) = tree_with_sizes(&[]);
        let (tx, rx) = crossbeam_channel::bounded(64);
        let top = TopFiles::spawn(rx, 2);

        // Feed hits referencing an arbitrary (live) node.
        let node = tree.handle(root);
        for size in [10u64, 500, 50, 300] {
            tx.send(FileHit {
                node,
                size_logical: size,
            })
            .unwrap();
        }
        drop(tx);
        top.wait();

        let sizes: Vec<u64> = top.snapshot().iter().map(|e| e.size_logical).collect();
        assert_eq!(sizes, vec![500, 300]);
    }

    #[test]
    fn snapshot_resolved_skips_removed_nodes() {
        let (mut tree, root) = tree_with_sizes(&[100]);
        let file = tree.node(root).children[0];
        let weak = tree.handle(file);

        let (tx, rx) = crossbeam_channel::bounded(4);
        let top = TopFiles::spawn(rx, 4);
        tx.send(FileHit {
            node: weak,
            size_logical: 100,
        })
        .unwrap();
        drop(tx);
        top.wait();

        assert_eq!(top.snapshot_resolved(&tree).len(), 1);
        tree.remove_child(root, file).unwrap();
        assert!(top.snapshot_resolved(&tree).is_empty());
    }
}

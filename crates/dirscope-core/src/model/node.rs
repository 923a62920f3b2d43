/// A single node in the arena-allocated scan tree.
///
/// Nodes are stored in a flat `Vec<Node>` for cache-friendly traversal.
/// Parent-child relationships use indices rather than pointers; weak
/// references carry a generation counter so holders can re-validate after
/// a subtree has been destroyed and its slots reused.
use compact_str::CompactString;
use std::path::PathBuf;

/// Lightweight index into the arena `Vec<Node>`.
///
/// Uses `u32` to keep nodes small — supports up to ~4 billion nodes,
/// which is more than enough for any real filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`, panicking if it exceeds `u32::MAX`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Weak handle to a node: an index plus the generation the slot had when
/// the handle was taken. Cross-structures (search results, top-N lists,
/// duplicate sets, hardlink refs) hold these instead of `NodeIndex` and
/// must go through [`crate::model::FileTree::resolve`] before use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub index: NodeIndex,
    pub generation: u32,
}

/// Discriminates what a node represents.
///
/// Scanned entries are `Drive`, `Directory` and `File`; the rest are
/// synthesized during aggregation (free/unknown space, the hardlink index
/// hierarchy) or act as the multi-root container (`MyComputer`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    MyComputer,
    Drive,
    Directory,
    File,
    FreeSpace,
    Unknown,
    HardlinksRoot,
    HardlinkIndexSet,
    HardlinkIndex,
    HardlinkFileRef,
}

impl NodeKind {
    /// `true` for kinds that can never have children attached.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            Self::File | Self::FreeSpace | Self::Unknown | Self::HardlinkFileRef
        )
    }

    /// Fixed ordering rank used by the name column: containers sort before
    /// files, synthetic entries after both.
    pub fn rank(self) -> u8 {
        match self {
            Self::MyComputer => 0,
            Self::Drive => 1,
            Self::Directory => 2,
            Self::File => 3,
            Self::FreeSpace => 4,
            Self::Unknown => 5,
            Self::HardlinksRoot => 6,
            Self::HardlinkIndexSet => 7,
            Self::HardlinkIndex => 8,
            Self::HardlinkFileRef => 9,
        }
    }
}

/// Axis-aligned rectangle assigned to a node by the treemap layout.
///
/// Uses the half-open pixel convention of the renderer: a node covers
/// columns `left..right` and rows `top..bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Marker for children the layout decided not to draw (zero-size
    /// siblings past the end of a row, or rows that ran out of pixels).
    pub const SENTINEL: Rect = Rect {
        left: -1,
        top: -1,
        right: -1,
        bottom: -1,
    };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// A single entry in the tree.
///
/// Aggregate fields (`size_logical`, `size_physical`, the counts and
/// `last_change`) hold the subtree totals for container kinds and are kept
/// current by upward propagation; see [`crate::model::FileTree`].
#[derive(Debug, Clone)]
pub struct Node {
    /// Kind tag; variant-specific data lives in the optional fields below.
    pub kind: NodeKind,

    /// Entry name only (NOT the full path). Full paths are reconstructed
    /// on demand by walking up via `parent`; only roots and hardlink file
    /// references carry one directly.
    pub name: CompactString,

    /// Full path for roots and hardlink file references; `None` elsewhere.
    pub full_path: Option<PathBuf>,

    /// Index of the parent node. `None` for roots. Lookup only — the
    /// parent's child sequence owns this node.
    pub parent: Option<NodeIndex>,

    /// Ordered child sequence. Sorted size-descending when the node
    /// completes enumeration (the treemap layout relies on that order).
    pub children: Vec<NodeIndex>,

    /// Logical byte count (file length; subtree sum for containers).
    pub size_logical: u64,

    /// Physical byte count (allocated on disk; subtree sum for containers).
    /// Zero for files that have been re-billed to the hardlink index.
    pub size_physical: u64,

    /// Total descendants (files + folders).
    pub items_count: u64,

    /// Descendant file count.
    pub files_count: u64,

    /// Descendant folder count.
    pub folders_count: u64,

    /// Most recent change in the subtree, as 100 ns intervals since the
    /// Unix epoch (UTC).
    pub last_change: i64,

    /// Attribute bitset, see [`crate::fs::attr`].
    pub attributes: u32,

    /// Resolved owner identifier, when the scan was asked to compute it.
    pub owner: Option<CompactString>,

    /// OS-assigned content identity (inode / NTFS file index). Zero when
    /// unavailable. Non-zero values observed more than once on a drive
    /// identify hardlinks.
    pub file_index: u128,

    /// Lowercased extension with leading dot, files only.
    pub extension: Option<CompactString>,

    /// Directories in this subtree (including this node) that have not yet
    /// finished enumeration. The node is done exactly when this is zero.
    pub read_jobs: u32,

    /// Subtree fully enumerated and aggregated.
    pub done: bool,

    /// File participates in a hardlink group; its physical bytes are billed
    /// under the drive's hardlink index instead of its directory chain.
    pub is_hardlink: bool,

    /// The entry could not be read (e.g. access denied). The node stays in
    /// the tree so callers can see where errors occurred.
    pub is_error: bool,

    /// Rectangle assigned by the last treemap layout pass, if any.
    pub rect: Option<Rect>,

    /// Slot generation; bumped when the slot is recycled.
    pub(crate) generation: u32,

    /// `false` once the node has been destroyed and the slot queued for reuse.
    pub(crate) alive: bool,
}

impl Node {
    fn blank(kind: NodeKind, name: CompactString) -> Self {
        Self {
            kind,
            name,
            full_path: None,
            parent: None,
            children: Vec::new(),
            size_logical: 0,
            size_physical: 0,
            items_count: 0,
            files_count: 0,
            folders_count: 0,
            last_change: 0,
            attributes: 0,
            owner: None,
            file_index: 0,
            extension: None,
            read_jobs: 0,
            done: false,
            is_hardlink: false,
            is_error: false,
            rect: None,
            generation: 0,
            alive: true,
        }
    }

    /// Create a file node. Files are born done — they have no enumeration
    /// of their own.
    pub fn new_file(name: CompactString, size_logical: u64, size_physical: u64) -> Self {
        let extension = extension_of(&name);
        Self {
            size_logical,
            size_physical,
            extension,
            done: true,
            ..Self::blank(NodeKind::File, name)
        }
    }

    /// Create a directory node with one pending read job (its own
    /// enumeration).
    pub fn new_dir(name: CompactString) -> Self {
        Self {
            read_jobs: 1,
            ..Self::blank(NodeKind::Directory, name)
        }
    }

    /// Create a drive root for the given path.
    pub fn new_drive(name: CompactString, path: PathBuf) -> Self {
        Self {
            full_path: Some(path),
            read_jobs: 1,
            ..Self::blank(NodeKind::Drive, name)
        }
    }

    /// Create the synthetic multi-root container.
    pub fn new_my_computer(name: CompactString) -> Self {
        Self::blank(NodeKind::MyComputer, name)
    }

    /// Create a synthetic leaf or hardlink-hierarchy node of the given kind.
    /// Synthetic nodes have no path and are done from birth.
    pub fn new_synthetic(kind: NodeKind, name: CompactString) -> Self {
        Self {
            done: true,
            ..Self::blank(kind, name)
        }
    }

    /// Create an error placeholder (e.g. an access-denied directory).
    /// Error placeholders are done leaves; no ancestor is failed by them.
    pub fn new_error(kind: NodeKind, name: CompactString, attributes: u32) -> Self {
        Self {
            attributes,
            is_error: true,
            done: true,
            ..Self::blank(kind, name)
        }
    }

    /// `true` if this node can never have children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf() || self.is_error
    }
}

/// Extract the lowercased extension (with leading dot) from a file name.
/// Names without a dot, or with nothing before the dot, have no extension.
pub fn extension_of(name: &str) -> Option<CompactString> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    let mut ext = CompactString::with_capacity(name.len() - dot);
    ext.push('.');
    for ch in name[dot + 1..].chars() {
        ext.extend(ch.to_lowercase());
    }
    Some(ext)
}

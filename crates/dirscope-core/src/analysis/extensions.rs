/// Size-aware extension summary — per-extension byte/file totals driving
/// both the legend and the treemap coloring.
///
/// Every palette color is pre-normalized to the fixed palette brightness
/// before storage; rendering re-scales per shading. The top extensions
/// (by bytes) each get a distinct palette entry; everything past the
/// palette collapses into the last entry ("other"). Descriptions are
/// filled lazily by the external shell-metadata collaborator.
use crate::model::{FileTree, NodeIndex, NodeKind};
use crate::treemap::render::{
    make_bright_color, ColorFlag, RenderColor, PALETTE_BRIGHTNESS,
};
use compact_str::CompactString;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Base cushion colors, equalized by [`default_palette`] before use.
const DEFAULT_CUSHION_COLORS: [[u8; 3]; 13] = [
    [0, 0, 255],
    [255, 0, 0],
    [0, 255, 0],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
    [150, 150, 255],
    [255, 150, 150],
    [150, 255, 150],
    [150, 255, 255],
    [255, 150, 255],
    [255, 255, 150],
    [255, 255, 255],
];

/// The default palette, normalized to the palette brightness.
pub fn default_palette() -> Vec<[u8; 3]> {
    DEFAULT_CUSHION_COLORS
        .iter()
        .map(|&rgb| make_bright_color(rgb, PALETTE_BRIGHTNESS))
        .collect()
}

/// Totals and presentation data for one extension.
#[derive(Clone, Debug, Default)]
pub struct ExtensionRecord {
    pub bytes: u64,
    pub files: u64,
    pub color: [u8; 3],
    /// Filled lazily by the shell-metadata service; empty until then.
    pub description: Option<String>,
}

/// Per-extension totals for a (sub)tree, ordered by bytes descending.
#[derive(Default)]
pub struct ExtensionSummary {
    records: HashMap<CompactString, ExtensionRecord>,
    order: Vec<CompactString>,
    other_color: [u8; 3],
}

impl ExtensionSummary {
    /// Aggregate the files under `root` and assign palette colors.
    pub fn rebuild(tree: &FileTree, root: NodeIndex, palette: &[[u8; 3]]) -> Self {
        debug_assert!(!palette.is_empty());
        let mut records: HashMap<CompactString, ExtensionRecord> = HashMap::new();

        for idx in tree.walk(root) {
            let node = tree.node(idx);
            if node.kind != NodeKind::File {
                continue;
            }
            let ext = node.extension.clone().unwrap_or_default();
            let record = records.entry(ext).or_default();
            record.bytes += node.size_logical;
            record.files += 1;
        }

        let mut order: Vec<CompactString> = records.keys().cloned().collect();
        order.sort_by(|a, b| {
            records[b]
                .bytes
                .cmp(&records[a].bytes)
                .then_with(|| a.cmp(b))
        });

        // Distinct colors for the leading extensions; the rest share the
        // palette's final entry.
        let other_color = *palette.last().expect("non-empty palette");
        let distinct = if order.len() <= palette.len() {
            order.len()
        } else {
            palette.len() - 1
        };
        for (i, ext) in order.iter().enumerate() {
            let color = if i < distinct {
                palette[i]
            } else {
                other_color
            };
            records.get_mut(ext).expect("keyed from records").color = color;
        }

        Self {
            records,
            order,
            other_color,
        }
    }

    /// Extensions ordered by bytes descending.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtensionRecord)> {
        self.order
            .iter()
            .map(move |ext| (ext.as_str(), &self.records[ext]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn record(&self, extension: &str) -> Option<&ExtensionRecord> {
        self.records.get(extension)
    }

    /// Cushion color for a file extension (`None` = no extension).
    pub fn color_for(&self, extension: Option<&str>) -> [u8; 3] {
        let key = extension.unwrap_or("");
        self.records
            .get(key)
            .map(|r| r.color)
            .unwrap_or(self.other_color)
    }

    /// Deliver a lazily-resolved description from the metadata service.
    pub fn set_description(&mut self, extension: &str, description: String) {
        if let Some(record) = self.records.get_mut(extension) {
            record.description = Some(description);
        }
    }
}

/// Shared summary with atomic swap-in of rebuilds.
#[derive(Clone, Default)]
pub struct SharedExtensions {
    inner: Arc<RwLock<Arc<ExtensionSummary>>>,
}

impl SharedExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current summary (cheap clone of the inner Arc).
    pub fn get(&self) -> Arc<ExtensionSummary> {
        self.inner.read().clone()
    }

    /// Rebuild from the tree and swap the result in atomically.
    pub fn rebuild(&self, tree: &FileTree, root: NodeIndex) {
        let fresh = Arc::new(ExtensionSummary::rebuild(tree, root, &default_palette()));
        *self.inner.write() = fresh;
    }
}

/// Resolve a node's cushion color: files by extension, synthetic kinds
/// by their fixed colors, containers black (they are never leaves unless
/// empty).
pub fn graph_color(tree: &FileTree, idx: NodeIndex, summary: &ExtensionSummary) -> RenderColor {
    let node = tree.node(idx);
    match node.kind {
        NodeKind::Unknown => RenderColor {
            rgb: [255, 255, 0],
            flag: ColorFlag::Lighter,
        },
        NodeKind::FreeSpace => RenderColor {
            rgb: [100, 100, 100],
            flag: ColorFlag::Darker,
        },
        NodeKind::HardlinksRoot
        | NodeKind::HardlinkIndexSet
        | NodeKind::HardlinkIndex
        | NodeKind::HardlinkFileRef => RenderColor {
            rgb: [200, 150, 100],
            flag: ColorFlag::Lighter,
        },
        NodeKind::File => RenderColor::plain(summary.color_for(node.extension.as_deref())),
        _ => RenderColor::plain([0, 0, 0]),
    }
}

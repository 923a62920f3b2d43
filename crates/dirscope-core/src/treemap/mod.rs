/// Treemap layout — assigns every node a rectangle proportional to its
/// size and renders the leaves through the cushion shader.
///
/// Two squarification strategies share one recursion contract:
/// `layout(node, rect)` stores the rect on the node, partitions it among
/// the children, and recurses. Children are expected sorted by size
/// descending (the completion sort already does this for physical sizes;
/// use [`sort_tree_for_layout`] before drawing logical sizes). Zero-size
/// children terminate their row and are marked with the sentinel rect so
/// hit-testing skips them. Grid mode reserves one pixel at the right and
/// bottom of every rectangle for the grid line.
pub mod render;

use crate::model::{FileTree, NodeIndex, NodeKind, Rect};
use render::{add_ridge, RenderColor, Shading, Surface, TreemapBitmap};

/// Which squarification strategy partitions the children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreemapStyle {
    /// Rows of similar proportion with a minimum child aspect of 0.4.
    KDirStat,
    /// Classical squarification driven by the worst-aspect-ratio formula.
    SequoiaView,
}

#[derive(Clone, Copy, Debug)]
pub struct TreemapOptions {
    pub style: TreemapStyle,
    pub grid: bool,
    pub grid_color: [u8; 3],
    /// Overall brightness, applied relative to the palette brightness.
    pub brightness: f64,
    /// Cushion ridge height at the root level.
    pub height: f64,
    /// Ridge height decay per recursion level, in (0, 1].
    pub scale_factor: f64,
    /// Ambient light fraction; ≥ 1 disables shading entirely.
    pub ambient_light: f64,
    /// Light direction (negative x = from the left, negative y = above).
    pub light_x: f64,
    pub light_y: f64,
}

impl Default for TreemapOptions {
    fn default() -> Self {
        Self {
            style: TreemapStyle::KDirStat,
            grid: false,
            grid_color: [0, 0, 0],
            brightness: 0.88,
            height: 0.38,
            scale_factor: 0.91,
            ambient_light: 0.13,
            light_x: -1.0,
            light_y: -1.0,
        }
    }
}

/// Treemap renderer with the derived light vector cached.
pub struct Treemap {
    options: TreemapOptions,
    lx: f64,
    ly: f64,
    lz: f64,
}

/// Whether rectangles are sized by logical or physical bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeMode {
    Physical,
    Logical,
}

impl Treemap {
    pub fn new(options: TreemapOptions) -> Self {
        let mut map = Self {
            options,
            lx: 0.0,
            ly: 0.0,
            lz: 1.0,
        };
        map.set_options(options);
        map
    }

    /// Install new options and re-derive the normalized light vector.
    pub fn set_options(&mut self, options: TreemapOptions) {
        self.options = options;
        const LZ: f64 = 10.0;
        let len =
            (options.light_x * options.light_x + options.light_y * options.light_y + LZ * LZ)
                .sqrt();
        self.lx = options.light_x / len;
        self.ly = options.light_y / len;
        self.lz = LZ / len;
    }

    pub fn options(&self) -> &TreemapOptions {
        &self.options
    }

    fn is_cushion_shading(&self) -> bool {
        self.options.ambient_light < 1.0
            && self.options.height > 0.0
            && self.options.scale_factor > 0.0
    }

    /// Lay out the subtree of `root` into a `width × height` surface and
    /// render it. Rectangle assignments are written back onto the nodes;
    /// one pixel at the right and bottom belongs to the grid/border.
    pub fn draw(
        &self,
        tree: &mut FileTree,
        root: NodeIndex,
        width: u32,
        height: u32,
        mode: SizeMode,
        color_of: &dyn Fn(&FileTree, NodeIndex) -> RenderColor,
    ) -> TreemapBitmap {
        let mut bitmap = TreemapBitmap::new(width as usize, height as usize);
        bitmap.fill(self.options.grid_color);

        let rc = Rect::new(0, 0, width as i32 - 1, height as i32 - 1);
        if rc.width() <= 0 || rc.height() <= 0 {
            return bitmap;
        }

        if tm_size(tree, root, mode) == 0 {
            tree.node_mut(root).rect = Some(rc);
            return bitmap;
        }

        let shading = Shading {
            ambient: self.options.ambient_light,
            brightness: self.options.brightness,
            lx: self.lx,
            ly: self.ly,
            lz: self.lz,
            cushion: self.is_cushion_shading(),
        };
        let surface: Surface = [0.0; 4];
        self.recurse_draw(
            tree,
            &mut bitmap,
            root,
            rc,
            true,
            &surface,
            self.options.height,
            mode,
            color_of,
            &shading,
        );
        bitmap
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse_draw(
        &self,
        tree: &mut FileTree,
        bitmap: &mut TreemapBitmap,
        item: NodeIndex,
        rc: Rect,
        as_root: bool,
        psurface: &Surface,
        h: f64,
        mode: SizeMode,
        color_of: &dyn Fn(&FileTree, NodeIndex) -> RenderColor,
        shading: &Shading,
    ) {
        debug_assert!(rc.width() >= 0 && rc.height() >= 0);
        tree.node_mut(item).rect = Some(rc);

        let grid_width = if self.options.grid { 1 } else { 0 };
        if rc.width() <= grid_width || rc.height() <= grid_width {
            return;
        }

        let mut surface: Surface = [0.0; 4];
        if shading.cushion {
            surface = *psurface;
            if !as_root {
                add_ridge(&rc, &mut surface, h);
            }
        }

        if tm_children(tree, item).is_empty() {
            self.render_leaf(tree, bitmap, item, rc, &surface, color_of, shading);
        } else {
            match self.options.style {
                TreemapStyle::KDirStat => self.kdirstat_draw_children(
                    tree, bitmap, item, rc, &surface, h, mode, color_of, shading,
                ),
                TreemapStyle::SequoiaView => self.sequoia_draw_children(
                    tree, bitmap, item, rc, &surface, h, mode, color_of, shading,
                ),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_leaf(
        &self,
        tree: &FileTree,
        bitmap: &mut TreemapBitmap,
        item: NodeIndex,
        mut rc: Rect,
        surface: &Surface,
        color_of: &dyn Fn(&FileTree, NodeIndex) -> RenderColor,
        shading: &Shading,
    ) {
        if self.options.grid {
            rc.top += 1;
            rc.left += 1;
            if rc.width() <= 0 || rc.height() <= 0 {
                return;
            }
        }
        render::render_rectangle(bitmap, &rc, surface, color_of(tree, item), shading);
    }

    /// Rows of similar proportion, learned from the KDirStat layout: the
    /// rectangle is divided into full-width rows, each greedily filled
    /// until the next child would fall below the minimum aspect.
    #[allow(clippy::too_many_arguments)]
    fn kdirstat_draw_children(
        &self,
        tree: &mut FileTree,
        bitmap: &mut TreemapBitmap,
        parent: NodeIndex,
        rc: Rect,
        surface: &Surface,
        h: f64,
        mode: SizeMode,
        color_of: &dyn Fn(&FileTree, NodeIndex) -> RenderColor,
        shading: &Shading,
    ) {
        let children = tm_children(tree, parent).to_vec();
        debug_assert!(!children.is_empty());

        let mut child_width = vec![0.0f64; children.len()];
        let mut rows: Vec<f64> = Vec::new();
        let mut children_per_row: Vec<usize> = Vec::new();

        let horizontal = kdirstat_arrange_children(
            tree,
            parent,
            &children,
            rc,
            mode,
            &mut child_width,
            &mut rows,
            &mut children_per_row,
        );

        let width = if horizontal { rc.width() } else { rc.height() };
        let height = if horizontal { rc.height() } else { rc.width() };

        let mut c = 0;
        let mut top = (if horizontal { rc.top } else { rc.left }) as f64;
        for (row_index, &row_height) in rows.iter().enumerate() {
            let f_bottom = top + row_height * height as f64;
            let mut bottom = f_bottom as i32;
            if row_index == rows.len() - 1 {
                bottom = if horizontal { rc.bottom } else { rc.right };
            }
            let mut left = (if horizontal { rc.left } else { rc.top }) as f64;
            let mut i = 0;
            while i < children_per_row[row_index] {
                let child = children[c];
                debug_assert!(child_width[c] >= 0.0);
                let f_right = left + child_width[c] * width as f64;
                let mut right = f_right as i32;

                let last_child = i == children_per_row[row_index] - 1
                    || child_width[c + 1] == 0.0;
                if last_child {
                    right = if horizontal { rc.right } else { rc.bottom };
                }

                let rc_child = if horizontal {
                    Rect::new(left as i32, top as i32, right, bottom)
                } else {
                    Rect::new(top as i32, left as i32, bottom, right)
                };
                self.recurse_draw(
                    tree,
                    bitmap,
                    child,
                    rc_child,
                    false,
                    surface,
                    h * self.options.scale_factor,
                    mode,
                    color_of,
                    shading,
                );

                if last_child {
                    // Zero-size children fill out the row: mark them all
                    // as not drawn.
                    i += 1;
                    c += 1;
                    while i < children_per_row[row_index] {
                        tree.node_mut(children[c]).rect = Some(Rect::SENTINEL);
                        i += 1;
                        c += 1;
                    }
                    break;
                }

                left = f_right;
                i += 1;
                c += 1;
            }
            top = f_bottom;
        }
    }

    /// The classical squarification method.
    #[allow(clippy::too_many_arguments)]
    fn sequoia_draw_children(
        &self,
        tree: &mut FileTree,
        bitmap: &mut TreemapBitmap,
        parent: NodeIndex,
        rc: Rect,
        surface: &Surface,
        h: f64,
        mode: SizeMode,
        color_of: &dyn Fn(&FileTree, NodeIndex) -> RenderColor,
        shading: &Shading,
    ) {
        let children = tm_children(tree, parent).to_vec();
        let mut remaining = rc;
        let mut remaining_size = tm_size(tree, parent, mode);
        debug_assert!(remaining_size > 0);

        let size_per_square_pixel =
            remaining_size as f64 / remaining.width() as f64 / remaining.height() as f64;

        let mut head = 0;
        while head < children.len() {
            debug_assert!(remaining.width() > 0 && remaining.height() > 0);

            let horizontal = remaining.width() >= remaining.height();
            let height = if horizontal {
                remaining.height()
            } else {
                remaining.width()
            };

            // Row height squared, in size units, for the ratio formula.
            let hh = (height as f64) * (height as f64) * size_per_square_pixel;
            debug_assert!(hh > 0.0);

            let row_begin = head;
            let mut row_end = head;
            let mut worst = f64::MAX;
            let rmax = tm_size(tree, children[row_begin], mode);
            let mut sum: u64 = 0;

            while row_end < children.len() {
                let rmin = tm_size(tree, children[row_end], mode);
                if rmin == 0 {
                    // The rest are zero-size: absorb them into this row.
                    row_end = children.len();
                    break;
                }

                // Worst aspect ratio if child(row_end) joined the row,
                // straight from the squarified-treemaps formula.
                let ss = (sum + rmin) as f64 * (sum + rmin) as f64;
                let ratio1 = hh * rmax as f64 / ss;
                let ratio2 = ss / hh / rmin as f64;
                let next_worst = ratio1.max(ratio2);

                if next_worst > worst {
                    break;
                }
                sum += rmin;
                row_end += 1;
                worst = next_worst;
            }
            debug_assert!(sum > 0);

            let mut width = if horizontal {
                remaining.width()
            } else {
                remaining.height()
            };
            if sum < remaining_size {
                width = (sum as f64 / remaining_size as f64 * width as f64) as i32;
            }

            let mut rc_row = Rect::new(0, 0, 0, 0);
            let mut f_begin;
            if horizontal {
                rc_row.left = remaining.left;
                rc_row.right = remaining.left + width;
                f_begin = remaining.top as f64;
            } else {
                rc_row.top = remaining.top;
                rc_row.bottom = remaining.top + width;
                f_begin = remaining.left as f64;
            }

            let mut i = row_begin;
            while i < row_end {
                let begin = f_begin as i32;
                let fraction = tm_size(tree, children[i], mode) as f64 / sum as f64;
                let f_end = f_begin + fraction * height as f64;
                let mut end = f_end as i32;

                let last_child =
                    i == row_end - 1 || tm_size(tree, children[i + 1], mode) == 0;
                if last_child {
                    end = if horizontal {
                        remaining.top + height
                    } else {
                        remaining.left + height
                    };
                }

                let rc_child = if horizontal {
                    Rect::new(rc_row.left, begin, rc_row.right, end)
                } else {
                    Rect::new(begin, rc_row.top, end, rc_row.bottom)
                };
                debug_assert!(rc_child.left <= rc_child.right);
                debug_assert!(rc_child.top <= rc_child.bottom);

                self.recurse_draw(
                    tree,
                    bitmap,
                    children[i],
                    rc_child,
                    false,
                    surface,
                    h * self.options.scale_factor,
                    mode,
                    color_of,
                    shading,
                );

                if last_child {
                    for &skipped in &children[i + 1..row_end] {
                        tree.node_mut(skipped).rect = Some(Rect::SENTINEL);
                    }
                    break;
                }
                f_begin = f_end;
                i += 1;
            }

            if horizontal {
                remaining.left += width;
            } else {
                remaining.top += width;
            }
            remaining_size = remaining_size.saturating_sub(sum);
            head += row_end - row_begin;

            if remaining.width() <= 0 || remaining.height() <= 0 {
                for &skipped in &children[head..] {
                    tree.node_mut(skipped).rect = Some(Rect::SENTINEL);
                }
                break;
            }
        }
    }
}

/// Split the children into rows. Returns whether the rows run
/// horizontally; fills `child_width` (fraction of the row), `rows`
/// (fraction of the rectangle's height) and `children_per_row`.
#[allow(clippy::too_many_arguments)]
fn kdirstat_arrange_children(
    tree: &FileTree,
    parent: NodeIndex,
    children: &[NodeIndex],
    rc: Rect,
    mode: SizeMode,
    child_width: &mut [f64],
    rows: &mut Vec<f64>,
    children_per_row: &mut Vec<usize>,
) -> bool {
    debug_assert!(!children.is_empty());

    if tm_size(tree, parent, mode) == 0 {
        // Everything is zero-sized: one row of equal slivers.
        rows.push(1.0);
        children_per_row.push(children.len());
        for w in child_width.iter_mut() {
            *w = 1.0 / children.len() as f64;
        }
        return true;
    }

    let horizontal = rc.width() >= rc.height();
    // Shorter-over-longer ratio, always ≥ 1.
    let width = if horizontal {
        if rc.height() > 0 {
            rc.width() as f64 / rc.height() as f64
        } else {
            1.0
        }
    } else if rc.width() > 0 {
        rc.height() as f64 / rc.width() as f64
    } else {
        1.0
    };

    let mut next_child = 0;
    while next_child < children.len() {
        let (row_height, children_used) = kdirstat_calculate_next_row(
            tree, parent, children, next_child, width, mode, child_width,
        );
        rows.push(row_height);
        children_per_row.push(children_used);
        next_child += children_used;
    }

    horizontal
}

/// Greedily extend one row until the next child's aspect would drop
/// below the minimum proportion. Returns the row height (fraction of the
/// rectangle) and the number of children consumed (zero-size stragglers
/// included).
fn kdirstat_calculate_next_row(
    tree: &FileTree,
    parent: NodeIndex,
    children: &[NodeIndex],
    next_child: usize,
    width: f64,
    mode: SizeMode,
    child_width: &mut [f64],
) -> (f64, usize) {
    const MIN_PROPORTION: f64 = 0.4;
    debug_assert!(width >= 1.0);

    let my_size = tm_size(tree, parent, mode) as f64;
    debug_assert!(my_size > 0.0);

    let mut size_used: u64 = 0;
    let mut row_height = 0.0;
    let mut i = next_child;
    while i < children.len() {
        let child_size = tm_size(tree, children[i], mode);
        if child_size == 0 {
            // Children are size-descending; the first zero can't be the
            // row opener.
            debug_assert!(i > next_child);
            break;
        }

        size_used += child_size;
        let virtual_row_height = size_used as f64 / my_size;

        // Rectangle(my_size)    = width × 1.0
        // Rectangle(child_size) = child_width × virtual_row_height
        let cw = child_size as f64 / my_size * width / virtual_row_height;
        if cw / virtual_row_height < MIN_PROPORTION {
            // Always holds for the opener because width ≥ 1.
            debug_assert!(i > next_child);
            break;
        }
        row_height = virtual_row_height;
        i += 1;
    }

    // Zero-size children close out the row.
    while i < children.len() && tm_size(tree, children[i], mode) == 0 {
        i += 1;
    }
    let children_used = i - next_child;

    let row_size = my_size * row_height;
    for j in 0..children_used {
        let child_size = tm_size(tree, children[next_child + j], mode) as f64;
        child_width[next_child + j] = if row_size > 0.0 {
            child_size / row_size
        } else {
            0.0
        };
    }

    (row_height, children_used)
}

/// The size a node occupies in the treemap.
pub fn tm_size(tree: &FileTree, idx: NodeIndex, mode: SizeMode) -> u64 {
    let node = tree.node(idx);
    match mode {
        SizeMode::Physical => node.size_physical,
        SizeMode::Logical => node.size_logical,
    }
}

/// Children as the treemap sees them: hardlink index folders are leaves
/// (their file references are bookkeeping, not space).
pub fn tm_children(tree: &FileTree, idx: NodeIndex) -> &[NodeIndex] {
    let node = tree.node(idx);
    if node.kind == NodeKind::HardlinkIndex {
        return &[];
    }
    &node.children
}

/// Re-sort every container's children by the given size measure,
/// descending. Call before `draw` when rendering a measure the
/// completion sort did not use.
pub fn sort_tree_for_layout(tree: &mut FileTree, root: NodeIndex, mode: SizeMode) {
    let containers: Vec<NodeIndex> = tree
        .walk(root)
        .filter(|&idx| !tree.node(idx).children.is_empty())
        .collect();
    for idx in containers {
        let mut children = std::mem::take(&mut tree.node_mut(idx).children);
        children.sort_by(|&a, &b| tm_size(tree, b, mode).cmp(&tm_size(tree, a, mode)));
        tree.node_mut(idx).children = children;
    }
}

/// Hit test: the deepest node whose rectangle contains `(x, y)`, or
/// `None` outside the root rectangle. Sentinel rects never match.
pub fn find_by_point(tree: &FileTree, item: NodeIndex, x: i32, y: i32) -> Option<NodeIndex> {
    let rc = tree.node(item).rect?;
    if rc.is_sentinel() || !rc.contains(x, y) {
        return None;
    }

    for &child in tm_children(tree, item) {
        if let Some(crc) = tree.node(child).rect {
            if !crc.is_sentinel() && crc.contains(x, y) {
                return find_by_point(tree, child, x, y).or(Some(child));
            }
        }
    }
    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use compact_str::CompactString;
    use std::path::PathBuf;

    fn flat_tree(sizes: &[u64]) -> (FileTree, NodeIndex, Vec<NodeIndex>) {
        let mut tree = FileTree::with_capacity(32);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("/data"),
            PathBuf::from("/data"),
        ));
        let mut nodes = Vec::new();
        for (i, &size) in sizes.iter().enumerate() {
            let f = tree.add_node(Node::new_file(
                CompactString::new(format!("f{i}")),
                size,
                size,
            ));
            tree.add_child(root, f, true).unwrap();
            nodes.push(f);
        }
        tree.finish_read_job(root);
        (tree, root, nodes)
    }

    fn plain_colors(_tree: &FileTree, _idx: NodeIndex) -> RenderColor {
        RenderColor::plain([150, 150, 150])
    }

    /// Sizes 7 and 3 split a 100×50 rect 7:3 along one horizontal row;
    /// the zero-size sibling is sentinel-marked.
    #[test]
    fn rows_layout_with_zero_size_child() {
        // Size-descending order, as the layout contract requires.
        let (mut tree, root, nodes) = flat_tree(&[7, 3, 0]);
        let map = Treemap::new(TreemapOptions::default());
        // Drawing area is one pixel larger: the right/bottom border line.
        map.draw(&mut tree, root, 101, 51, SizeMode::Logical, &plain_colors);

        let rc7 = tree.node(nodes[0]).rect.unwrap();
        let rc3 = tree.node(nodes[1]).rect.unwrap();
        let rc0 = tree.node(nodes[2]).rect.unwrap();

        assert_eq!(rc0, Rect::SENTINEL);
        assert_eq!(rc7, Rect::new(0, 0, 70, 50));
        assert_eq!(rc3, Rect::new(70, 0, 100, 50));
    }

    fn assert_containment_and_disjointness(
        tree: &FileTree,
        root: NodeIndex,
    ) {
        let rc = tree.node(root).rect.expect("root rect");
        let child_rects: Vec<Rect> = tree
            .node(root)
            .children
            .iter()
            .filter_map(|&c| tree.node(c).rect)
            .filter(|r| !r.is_sentinel())
            .collect();

        for r in &child_rects {
            assert!(
                r.left >= rc.left && r.right <= rc.right && r.top >= rc.top && r.bottom <= rc.bottom,
                "child {r:?} escapes parent {rc:?}"
            );
        }
        for (i, a) in child_rects.iter().enumerate() {
            for b in child_rects.iter().skip(i + 1) {
                let overlap_w = a.right.min(b.right) - a.left.max(b.left);
                let overlap_h = a.bottom.min(b.bottom) - a.top.max(b.top);
                assert!(
                    overlap_w <= 0 || overlap_h <= 0,
                    "rects {a:?} and {b:?} overlap"
                );
            }
        }
        for &child in &tree.node(root).children {
            if tree.node(child).rect.is_some() && !tree.node(child).children.is_empty() {
                assert_containment_and_disjointness(tree, child);
            }
        }
    }

    #[test]
    fn kdirstat_containment_and_disjointness() {
        let (mut tree, root, _) = flat_tree(&[40, 25, 13, 9, 6, 4, 2, 1]);
        let map = Treemap::new(TreemapOptions::default());
        map.draw(&mut tree, root, 200, 120, SizeMode::Logical, &plain_colors);
        assert_containment_and_disjointness(&tree, root);
    }

    #[test]
    fn sequoia_containment_and_disjointness() {
        let (mut tree, root, _) = flat_tree(&[6, 6, 4, 3, 2, 2, 1]);
        let map = Treemap::new(TreemapOptions {
            style: TreemapStyle::SequoiaView,
            ..TreemapOptions::default()
        });
        map.draw(&mut tree, root, 240, 160, SizeMode::Logical, &plain_colors);
        assert_containment_and_disjointness(&tree, root);
    }

    /// Rectangle areas track size proportions (up to integer rounding).
    #[test]
    fn areas_are_proportional() {
        for style in [TreemapStyle::KDirStat, TreemapStyle::SequoiaView] {
            let (mut tree, root, nodes) = flat_tree(&[500, 300, 200]);
            let map = Treemap::new(TreemapOptions {
                style,
                ..TreemapOptions::default()
            });
            map.draw(&mut tree, root, 201, 101, SizeMode::Logical, &plain_colors);

            let total_area = 200.0 * 100.0;
            for (&node, &size) in nodes.iter().zip(&[500u64, 300, 200]) {
                let rc = tree.node(node).rect.unwrap();
                let area = (rc.width() * rc.height()) as f64;
                let expected = size as f64 / 1000.0 * total_area;
                let deviation = (area - expected).abs() / expected;
                assert!(
                    deviation < 0.05,
                    "{style:?}: size {size} got area {area}, expected ~{expected}"
                );
            }
        }
    }

    /// Greedy row building: a row is closed exactly when admitting the
    /// next child would worsen the worst aspect ratio. For [8, 1, 1] in a
    /// 100×100 square, admitting a 1 next to the 8 worsens the ratio
    /// (8.1 vs 1.25), so the 8 stands alone and the two 1s stack in the
    /// remaining strip.
    #[test]
    fn sequoia_rows_close_on_ratio_regression() {
        let (mut tree, root, nodes) = flat_tree(&[8, 1, 1]);
        let map = Treemap::new(TreemapOptions {
            style: TreemapStyle::SequoiaView,
            ..TreemapOptions::default()
        });
        map.draw(&mut tree, root, 101, 101, SizeMode::Logical, &plain_colors);

        assert_eq!(tree.node(nodes[0]).rect.unwrap(), Rect::new(0, 0, 80, 100));
        assert_eq!(tree.node(nodes[1]).rect.unwrap(), Rect::new(80, 0, 100, 50));
        assert_eq!(
            tree.node(nodes[2]).rect.unwrap(),
            Rect::new(80, 50, 100, 100)
        );
    }

    #[test]
    fn hit_test_finds_deepest_leaf() {
        let mut tree = FileTree::with_capacity(16);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("/data"),
            PathBuf::from("/data"),
        ));
        let dir = tree.add_node(Node::new_dir(CompactString::new("sub")));
        tree.add_child(root, dir, true).unwrap();
        let inner = tree.add_node(Node::new_file(CompactString::new("inner"), 600, 600));
        tree.add_child(dir, inner, true).unwrap();
        let outer = tree.add_node(Node::new_file(CompactString::new("outer"), 400, 400));
        tree.add_child(root, outer, true).unwrap();
        tree.finish_read_job(dir);
        tree.finish_read_job(root);

        let map = Treemap::new(TreemapOptions::default());
        map.draw(&mut tree, root, 101, 101, SizeMode::Logical, &plain_colors);

        let rc = tree.node(inner).rect.unwrap();
        let hit = find_by_point(&tree, root, rc.left, rc.top).unwrap();
        assert_eq!(hit, inner, "deepest leaf wins");

        // Outside the root rectangle.
        assert_eq!(find_by_point(&tree, root, 5_000, 5_000), None);
    }

    /// With every child zero-sized but the parent non-zero the layout
    /// would divide by zero; such parents render as empty space instead.
    #[test]
    fn zero_size_root_renders_flat() {
        let (mut tree, root, _) = flat_tree(&[0, 0]);
        let map = Treemap::new(TreemapOptions::default());
        let bitmap = map.draw(&mut tree, root, 50, 50, SizeMode::Logical, &plain_colors);
        assert_eq!(bitmap.width, 50);
        assert_eq!(tree.node(root).rect.unwrap(), Rect::new(0, 0, 49, 49));
    }

    #[test]
    fn logical_sort_helper_orders_for_layout() {
        let mut tree = FileTree::with_capacity(8);
        let root = tree.add_root(Node::new_drive(
            CompactString::new("/data"),
            PathBuf::from("/data"),
        ));
        // Logical order differs from physical: sparse big file.
        let sparse = tree.add_node(Node::new_file(CompactString::new("sparse"), 1_000, 10));
        tree.add_child(root, sparse, true).unwrap();
        let solid = tree.add_node(Node::new_file(CompactString::new("solid"), 100, 100));
        tree.add_child(root, solid, true).unwrap();
        tree.finish_read_job(root);
        assert_eq!(tree.node(root).children, vec![solid, sparse]);

        sort_tree_for_layout(&mut tree, root, SizeMode::Logical);
        assert_eq!(tree.node(root).children, vec![sparse, solid]);
    }
}

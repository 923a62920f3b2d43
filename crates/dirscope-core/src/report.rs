/// Line-oriented report export.
///
/// One header line with the root's metadata, then one tab-separated row
/// per node in depth-first order:
///
/// `DEPTH  SIZE_PHYS  SIZE_LOG  ITEMS  FILES  FOLDERS  LAST_CHANGE  ATTRIBUTES  NAME`
///
/// Sizes are decimal bytes, timestamps ISO-8601 UTC, attributes the
/// 8-character positional field (`????????` where the kind has none).
use crate::fs::{format_attributes, ticks_to_datetime};
use crate::model::{FileTree, NodeIndex, NodeKind};
use csv::{QuoteStyle, WriterBuilder};
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("write error: {0}")]
    Csv(#[from] csv::Error),
}

/// Write the report for the subtree of `root` to `out`.
pub fn export_report(
    tree: &FileTree,
    root: NodeIndex,
    out: &mut dyn Write,
) -> Result<(), ReportError> {
    let node = tree.node(root);
    writeln!(
        out,
        "dirscope report: {} (physical {} bytes, logical {} bytes, {} items, generated {})",
        tree.full_path(root).display(),
        node.size_physical,
        node.size_logical,
        node.items_count,
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
    )?;

    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .from_writer(out);

    let base_depth = tree.depth(root);
    for idx in tree.walk(root) {
        let node = tree.node(idx);
        let depth = tree.depth(idx) - base_depth;
        let attributes = match node.kind {
            NodeKind::File | NodeKind::Directory | NodeKind::Drive => Some(node.attributes),
            _ => None,
        };
        writer.write_record([
            depth.to_string(),
            node.size_physical.to_string(),
            node.size_logical.to_string(),
            node.items_count.to_string(),
            node.files_count.to_string(),
            node.folders_count.to_string(),
            ticks_to_datetime(node.last_change)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string(),
            format_attributes(attributes),
            sanitize(&node.name),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Tab/newline in a name would corrupt the row structure.
fn sanitize(name: &str) -> String {
    name.replace(['\t', '\n', '\r'], " ")
}

/// Derived views — structures computed from (and weakly referencing)
/// the scan tree.
pub mod duplicates;
pub mod extensions;
pub mod search;
pub mod top_files;

pub use duplicates::{find_duplicates, DuplicateGroup, Fingerprint};
pub use extensions::{
    default_palette, graph_color, ExtensionRecord, ExtensionSummary, SharedExtensions,
};
pub use search::{search, SearchQuery, SearchResults};
pub use top_files::{largest_files, LargestFile, LargestFileInfo, TopFiles};

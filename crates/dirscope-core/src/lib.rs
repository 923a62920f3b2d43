/// dirscope core — scanning, analysis, and treemap rendering.
///
/// This crate contains all business logic with zero UI dependencies.
/// It is designed to be reusable across different frontends (CLI, GUI,
/// TUI).
///
/// # Modules
///
/// - [`model`] — Arena-allocated scan tree and supporting types.
/// - [`fs`] — Abstract filesystem interface (OS-backed and in-memory).
/// - [`scanner`] — Parallel crawl with suspend/resume/cancel and
///   progress reporting.
/// - [`aggregate`] — Free/unknown synthesis and hardlink billing.
/// - [`watcher`] — Filesystem change stream → tree mutations.
/// - [`analysis`] — Derived views: top-N, duplicates, search, extension
///   summary.
/// - [`treemap`] — Squarified layout and cushion-shaded rendering.
/// - [`hints`] — Typed invalidation events for presenters.
/// - [`report`] — Line-oriented report export.
/// - [`platform`] — Local volume enumeration.
pub mod aggregate;
pub mod analysis;
pub mod fs;
pub mod hints;
pub mod model;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod treemap;
pub mod watcher;

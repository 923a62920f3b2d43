//! dirscope — disk space analyser.
//!
//! Thin binary entry point: command parsing, config merge, and result
//! presentation. All scanning, analysis, and rendering logic lives in
//! the `dirscope-core` crate.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{ConfigFile, ScanFlags, Settings};
use dirscope_core::analysis::{self, SharedExtensions, TopFiles};
use dirscope_core::fs::{FsEnumerator, OsFs};
use dirscope_core::hints::HintBus;
use dirscope_core::model::{size::format_count, size::format_size, NodeIndex};
use dirscope_core::scanner::progress::{CancelReason, ScanEvent, ScanOutcome};
use dirscope_core::scanner::queue::NoPause;
use dirscope_core::scanner::{self, LiveTree, ScanError, ScanHandle};
use dirscope_core::treemap::{self, SizeMode, Treemap, TreemapOptions};
use dirscope_core::{platform, report};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "dirscope",
    version,
    about = "Analyse where disk space goes: parallel scan, hardlink-aware accounting, treemap rendering"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    flags: ScanFlags,
}

#[derive(Subcommand)]
enum Command {
    /// Scan one or more paths and print a summary
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Scan every local volume
    ScanAllLocal,
    /// Scan a path, re-run the refresh pass, and verify the aggregates
    Refresh { path: PathBuf },
    /// Scan a path and write the tab-separated report
    ExportReport { path: PathBuf, out: PathBuf },
    /// Scan a path and render the cushion treemap to a PPM image
    RenderTreemap {
        path: PathBuf,
        out: PathBuf,
        #[arg(long, default_value_t = 1024)]
        width: u32,
        #[arg(long, default_value_t = 768)]
        height: u32,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dirscope: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let settings = config::merge(&ConfigFile::load(), &cli.flags);

    match cli.command {
        Command::Scan { paths } => scan_and_summarize(paths, &settings),
        Command::ScanAllLocal => {
            let volumes = platform::enumerate_local_volumes();
            if volumes.is_empty() {
                eprintln!("dirscope: no local volumes found");
                return Ok(ExitCode::from(2));
            }
            for vol in &volumes {
                info!("volume: {}", vol.describe());
            }
            let paths = volumes.into_iter().map(|v| v.mount_point).collect();
            scan_and_summarize(paths, &settings)
        }
        Command::Refresh { path } => refresh_command(path, &settings),
        Command::ExportReport { path, out } => export_command(path, out, &settings),
        Command::RenderTreemap {
            path,
            out,
            width,
            height,
        } => render_command(path, out, width, height, &settings),
    }
}

/// Run a scan to completion. `Ok(Err(code))` carries a non-zero exit for
/// unavailable roots and cancellations.
fn run_scan(
    paths: Vec<PathBuf>,
    settings: &Settings,
) -> anyhow::Result<Result<(ScanHandle, Option<TopFiles>), ExitCode>> {
    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(settings.options.compute_owner));
    let hints = HintBus::new();

    let handle = match scanner::start_scan(paths, settings.options.clone(), fs, hints) {
        Ok(handle) => handle,
        Err(ScanError::RootUnavailable(path)) => {
            eprintln!("dirscope: root unavailable: {}", path.display());
            return Ok(Err(ExitCode::from(2)));
        }
        Err(e) => return Err(e.into()),
    };

    let top = handle
        .take_file_hits()
        .map(|feed| TopFiles::spawn(feed, settings.options.top_files));

    // Drain progress while the scan runs; the channel disconnects when
    // the scanner threads wind down.
    while let Ok(event) = handle.events.recv() {
        match event {
            ScanEvent::Update {
                files_found,
                dirs_found,
                current_path,
                ..
            } => info!("scanned {files_found} files / {dirs_found} dirs ({current_path})"),
            ScanEvent::Error { path, message } => info!("skipped {path}: {message}"),
            ScanEvent::Complete { duration, .. } => {
                info!("scan finished in {duration:?}");
            }
            _ => {}
        }
    }

    match handle.await_completion() {
        ScanOutcome::Finished => {}
        ScanOutcome::Cancelled(CancelReason::InvariantViolation) => {
            eprintln!("dirscope: internal invariant violation, partial results discarded");
            return Ok(Err(ExitCode::from(4)));
        }
        ScanOutcome::Cancelled(_) => {
            eprintln!("dirscope: scan cancelled");
            return Ok(Err(ExitCode::from(3)));
        }
    }
    if let Some(top) = &top {
        top.wait();
    }
    Ok(Ok((handle, top)))
}

fn scan_and_summarize(paths: Vec<PathBuf>, settings: &Settings) -> anyhow::Result<ExitCode> {
    let (handle, top) = match run_scan(paths, settings)? {
        Ok(done) => done,
        Err(code) => return Ok(code),
    };
    let root = handle.roots[0];

    print_summary(&handle.live_tree, root);

    if let Some(top) = top {
        let tree = handle.live_tree.read();
        let entries = top.snapshot_resolved(&tree);
        if !entries.is_empty() {
            println!("\nLargest files:");
            for entry in entries {
                println!("  {:>12}  {}", format_size(entry.size_logical), entry.path.display());
            }
        }
    }

    if settings.options.scan_for_duplicates {
        let groups = analysis::find_duplicates(&handle.live_tree, root, &NoPause);
        println!("\nDuplicate sets: {}", groups.len());
        let tree = handle.live_tree.read();
        for group in groups.iter().take(10) {
            println!(
                "  {} x {} ({} wasted)",
                group.files.len(),
                format_size(group.size_logical),
                format_size(group.wasted_bytes()),
            );
            for &node in &group.files {
                if let Some(idx) = tree.resolve(node) {
                    println!("    {}", tree.full_path(idx).display());
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_summary(tree: &LiveTree, root: NodeIndex) {
    let guard = tree.read();
    let node = guard.node(root);
    println!(
        "{}: {} physical, {} logical, {} items ({} files, {} folders)",
        guard.full_path(root).display(),
        format_size(node.size_physical),
        format_size(node.size_logical),
        format_count(node.items_count),
        format_count(node.files_count),
        format_count(node.folders_count),
    );

    println!("\nTop entries:");
    for &child in node.children.iter().take(15) {
        let c = guard.node(child);
        let share = if node.size_physical > 0 {
            c.size_physical as f64 / node.size_physical as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "  {:>12}  {:>5.1}%  {}{}",
            format_size(c.size_physical),
            share,
            c.name,
            if c.is_error { "  [unreadable]" } else { "" },
        );
    }

    let extensions = SharedExtensions::new();
    extensions.rebuild(&guard, root);
    let summary = extensions.get();
    if !summary.is_empty() {
        println!("\nExtensions:");
        for (ext, record) in summary.iter().take(10) {
            let label = if ext.is_empty() { "(none)" } else { ext };
            println!(
                "  {:>12}  {:>8} files  {}",
                format_size(record.bytes),
                format_count(record.files),
                label,
            );
        }
    }
}

fn refresh_command(path: PathBuf, settings: &Settings) -> anyhow::Result<ExitCode> {
    let (handle, _) = match run_scan(vec![path], settings)? {
        Ok(done) => done,
        Err(code) => return Ok(code),
    };
    let root = handle.roots[0];

    let before = snapshot(&handle.live_tree, root);
    let fs: Arc<dyn FsEnumerator> = Arc::new(OsFs::new(settings.options.compute_owner));
    scanner::refresh(&handle.live_tree, &fs, root, &settings.options)?;
    let after = snapshot(&handle.live_tree, root);

    print_summary(&handle.live_tree, root);
    if before == after {
        println!("\nrefresh: aggregates unchanged");
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "\nrefresh: aggregates changed (before {before:?}, after {after:?}) — the subtree was modified during the run"
        );
        Ok(ExitCode::SUCCESS)
    }
}

fn snapshot(tree: &LiveTree, root: NodeIndex) -> (u64, u64, u64) {
    let guard = tree.read();
    let node = guard.node(root);
    (node.size_physical, node.size_logical, node.items_count)
}

fn export_command(path: PathBuf, out: PathBuf, settings: &Settings) -> anyhow::Result<ExitCode> {
    let (handle, _) = match run_scan(vec![path], settings)? {
        Ok(done) => done,
        Err(code) => return Ok(code),
    };
    let root = handle.roots[0];

    let mut file = std::fs::File::create(&out)
        .with_context(|| format!("cannot create {}", out.display()))?;
    {
        let tree = handle.live_tree.read();
        report::export_report(&tree, root, &mut file)?;
    }
    println!("report written to {}", out.display());
    Ok(ExitCode::SUCCESS)
}

fn render_command(
    path: PathBuf,
    out: PathBuf,
    width: u32,
    height: u32,
    settings: &Settings,
) -> anyhow::Result<ExitCode> {
    let (handle, _) = match run_scan(vec![path], settings)? {
        Ok(done) => done,
        Err(code) => return Ok(code),
    };
    let root = handle.roots[0];
    let mode = if settings.use_logical {
        SizeMode::Logical
    } else {
        SizeMode::Physical
    };

    let extensions = SharedExtensions::new();
    let bitmap = {
        let mut tree = handle.live_tree.write();
        extensions.rebuild(&tree, root);
        let summary = extensions.get();
        if mode == SizeMode::Logical {
            treemap::sort_tree_for_layout(&mut tree, root, mode);
        }
        let map = Treemap::new(TreemapOptions::default());
        map.draw(&mut tree, root, width, height, mode, &|tree, idx| {
            analysis::graph_color(tree, idx, &summary)
        })
    };

    let mut file = std::fs::File::create(&out)
        .with_context(|| format!("cannot create {}", out.display()))?;
    write!(file, "P6\n{} {}\n255\n", bitmap.width, bitmap.height)?;
    let mut row = Vec::with_capacity(bitmap.width * 3);
    for y in 0..bitmap.height as i32 {
        row.clear();
        for x in 0..bitmap.width as i32 {
            row.extend_from_slice(&bitmap.rgb_at(x, y));
        }
        file.write_all(&row)?;
    }
    println!("treemap written to {}", out.display());
    Ok(ExitCode::SUCCESS)
}

/// Name search over the live tree — glob or regex, with whole-phrase and
/// case-sensitivity flags.
///
/// The matcher is compiled once and reused across a depth-first walk of
/// the tree. Results hold weak references; when the watcher or a refresh
/// removes a referenced node, the corresponding hit is detached via the
/// `NodeRemoved` hint.
use crate::hints::Hint;
use crate::model::{FileTree, NodeIndex, NodeKind, NodeRef};
use crossbeam_channel::Receiver;
use regex::{Regex, RegexBuilder};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub pattern: String,
    /// Interpret `pattern` as a regex; otherwise as a glob (`*`, `?`).
    pub use_regex: bool,
    pub case_sensitive: bool,
    /// Require the whole name to match rather than any substring.
    pub whole_phrase: bool,
}

impl SearchQuery {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            use_regex: false,
            case_sensitive: false,
            whole_phrase: true,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            use_regex: true,
            case_sensitive: false,
            whole_phrase: false,
        }
    }

    /// Compile the matcher. Whole-phrase queries are anchored so that
    /// `is_match` means "the entire name matches".
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        let body = if self.use_regex {
            self.pattern.clone()
        } else {
            glob_to_regex(&self.pattern)
        };
        let anchored = if self.whole_phrase {
            format!("^(?:{body})$")
        } else {
            body
        };
        RegexBuilder::new(&anchored)
            .case_insensitive(!self.case_sensitive)
            .build()
    }
}

/// Translate a glob into regex source: `*` → `.*`, `?` → `.`, everything
/// else matched literally.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ => {
                if regex_syntax_char(ch) {
                    out.push('\\');
                }
                out.push(ch);
            }
        }
    }
    out
}

fn regex_syntax_char(ch: char) -> bool {
    matches!(
        ch,
        '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
    )
}

/// One match, with the path snapshotted at search time.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub node: NodeRef,
    pub name: String,
    pub path: PathBuf,
}

/// A result set that tracks node removals.
#[derive(Default)]
pub struct SearchResults {
    hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Drop the hit for a removed node, if present.
    pub fn detach(&mut self, removed: NodeRef) {
        self.hits.retain(|hit| hit.node != removed);
    }

    /// Drain a hint receiver, detaching every removal it carries.
    pub fn apply_hints(&mut self, hints: &Receiver<Hint>) {
        while let Ok(hint) = hints.try_recv() {
            if let Hint::NodeRemoved(node) = hint {
                self.detach(node);
            }
        }
    }
}

/// Run `query` over the subtree of `root`, matching entry names.
///
/// Only scanned entries (directories and files) can be hits; the
/// starting root and the synthetic kinds (drive containers, free/unknown
/// space, the hardlink index) are enumerated but never returned.
pub fn search(
    tree: &FileTree,
    root: NodeIndex,
    query: &SearchQuery,
) -> Result<SearchResults, regex::Error> {
    let matcher = query.compile()?;
    let mut results = SearchResults::default();

    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        let node = tree.node(idx);
        let searchable = idx != root
            && matches!(node.kind, NodeKind::Directory | NodeKind::File);
        if searchable && matcher.is_match(&node.name) {
            results.hits.push(SearchHit {
                node: tree.handle(idx),
                name: node.name.to_string(),
                path: tree.full_path(idx),
            });
        }
        stack.extend(node.children.iter().copied());
    }
    Ok(results)
}

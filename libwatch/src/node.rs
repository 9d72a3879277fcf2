use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::ignore::IgnoreList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    len: u64,
    modified: Option<SystemTime>,
    is_dir: bool,
}

impl Snapshot {
    fn of(meta: &Metadata) -> Self {
        Snapshot {
            len: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        }
    }
}

/// One watched path. Directories carry their children, files do not.
///
/// A node's own flag only records what was seen at that node; whether a
/// subtree changed is answered by [`ChangeNode::has_changed`] walking the tree.
#[derive(Debug)]
pub struct ChangeNode {
    path: PathBuf,
    snapshot: Option<Snapshot>,
    ignore_checked: bool,
    ignored: bool,
    changed: bool,
    children: Option<Vec<ChangeNode>>,
}

impl ChangeNode {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ChangeNode {
            path: path.into(),
            snapshot: None,
            ignore_checked: false,
            ignored: false,
            changed: false,
            children: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// This node's own flag, without looking at descendants.
    pub fn self_changed(&self) -> bool {
        self.changed
    }

    pub fn children(&self) -> &[ChangeNode] {
        self.children.as_deref().unwrap_or_default()
    }

    /// Evaluate the ignore set once. The answer sticks for the node's lifetime.
    fn check_ignore(&mut self, ignore: &IgnoreList) -> bool {
        if !self.ignore_checked {
            self.ignore_checked = true;
            if ignore.should_ignore(&self.path) {
                debug!(path = %self.path.display(), "ignored");
                self.ignored = true;
            }
        }
        self.ignored
    }

    pub fn scan(&mut self, ignore: &IgnoreList) {
        if self.check_ignore(ignore) {
            return;
        }

        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to stat watched path: {e}");
                return;
            }
        };
        let current = Snapshot::of(&meta);

        if meta.is_dir() {
            if self.snapshot.is_some_and(|previous| !previous.is_dir) {
                self.changed = true;
            }
            self.snapshot = Some(current);
            self.scan_children(ignore);
        } else {
            // the first observation of a file is never a change
            if let Some(previous) = self.snapshot
                && previous != current
            {
                self.changed = true;
            }
            self.snapshot = Some(current);
            self.children = None;
        }

        if self.changed {
            debug!(path = %self.path.display(), "changed");
        }
    }

    fn scan_children(&mut self, ignore: &IgnoreList) {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to list watched directory: {e}");
                return;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(path = %self.path.display(), "failed to read directory entry: {e}");
                    None
                }
            })
            .collect();
        paths.sort();

        let previous = self.children.take().unwrap_or_default();
        let previous_tracked = previous.iter().filter(|c| !c.ignored).count();
        let mut known: HashMap<PathBuf, ChangeNode> = previous
            .into_iter()
            .map(|child| (child.path.clone(), child))
            .collect();

        let mut children = Vec::with_capacity(paths.len());
        for path in paths {
            let child = match known.remove(&path) {
                Some(child) => child,
                None => {
                    let mut child = ChangeNode::new(path);
                    // ignored newcomers are kept but never count as a change
                    if !child.check_ignore(ignore) {
                        self.changed = true;
                    }
                    child
                }
            };
            children.push(child);
        }

        if children.iter().filter(|c| !c.ignored).count() != previous_tracked {
            self.changed = true;
        }

        for child in children.iter_mut() {
            child.scan(ignore);
        }
        self.children = Some(children);
    }

    pub fn has_changed(&self) -> bool {
        self.changed || self.children().iter().any(ChangeNode::has_changed)
    }

    pub fn reset(&mut self) {
        self.changed = false;
        if let Some(children) = self.children.as_mut() {
            children.iter_mut().for_each(ChangeNode::reset);
        }
    }
}

/// The roots of one watch plus the ignore patterns they share.
#[derive(Debug)]
pub struct WatchSet {
    roots: Vec<ChangeNode>,
    ignore: IgnoreList,
}

impl WatchSet {
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>, ignore: IgnoreList) -> Self {
        WatchSet {
            roots: roots.into_iter().map(ChangeNode::new).collect(),
            ignore,
        }
    }

    pub fn roots(&self) -> &[ChangeNode] {
        &self.roots
    }

    pub fn scan(&mut self) {
        for root in self.roots.iter_mut() {
            root.scan(&self.ignore);
        }
    }

    pub fn has_changed(&self) -> bool {
        self.roots.iter().any(ChangeNode::has_changed)
    }

    pub fn reset(&mut self) {
        self.roots.iter_mut().for_each(ChangeNode::reset);
    }
}

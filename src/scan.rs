//! Directory scanning: finds folders that hold image sequences ("effects").
//!
//! The walk is depth-first in natural order. A folder that directly contains
//! at least one supported image is recorded as an effect and never descended
//! into; any other folder is treated as a category and walked further, up to
//! the configured depth.
//!
//! [`Scanner`] is a resumable cursor: it stops at progress checkpoints and at
//! the directory budget so the owner can redraw or ask the user, then picks
//! up exactly where it left off.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::natural;

/// Extensions (lowercase, without dot) recognized as animation frames.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Return `true` if `path` has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|e| *e == ext)
        })
}

/// Supported images directly inside `dir`, naturally sorted by file name.
///
/// Symlinks are followed, so a link to a directory never counts as a frame.
/// Unreadable directories yield an empty list.
pub fn list_images(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), "list images failed: {err}");
            return Vec::new();
        }
    };

    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| is_supported_image(p) && p.is_file())
        .collect();
    natural::sort_by_key(&mut images, |p| {
        p.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    });
    images
}

/// Grouping label derived from an effect's path relative to the scan root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Effects sitting directly under the scan root.
    Root,
    /// Parent folder of the effect, `/`-separated, relative to the root.
    Folder(String),
}

impl Category {
    pub fn from_relative(relative: &Path) -> Self {
        let parts: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            Self::Root
        } else {
            Self::Folder(parts.join("/"))
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Root => "root",
            Self::Folder(label) => label,
        }
    }

    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A folder of sequence frames, identified by its absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Effect {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub category: Category,
    pub image_count: usize,
}

impl Effect {
    /// Current frame files on disk, naturally sorted.
    pub fn frame_files(&self) -> Vec<PathBuf> {
        list_images(&self.path)
    }
}

/// Bookkeeping about how a scan pass went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub dirs_scanned: usize,
    pub budget: usize,
    /// The caller declined to continue at a budget prompt.
    pub stopped_early: bool,
    /// The pass took longer than the configured warning threshold.
    pub slow: bool,
    pub elapsed: Duration,
}

/// Effects discovered by one scan pass, bucketed by category in discovery
/// order.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    buckets: BTreeMap<Category, Vec<Arc<Effect>>>,
    summary: ScanSummary,
}

impl ScanResult {
    fn insert(&mut self, effect: Effect) {
        self.buckets
            .entry(effect.category.clone())
            .or_default()
            .push(Arc::new(effect));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[must_use]
    pub fn effect_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Category buckets; bucket contents are in discovery order.
    pub fn categories(&self) -> impl Iterator<Item = (&Category, &[Arc<Effect>])> {
        self.buckets.iter().map(|(c, v)| (c, v.as_slice()))
    }

    pub fn effects(&self) -> impl Iterator<Item = &Arc<Effect>> {
        self.buckets.values().flatten()
    }

    pub fn find(&self, path: &Path) -> Option<&Arc<Effect>> {
        self.effects().find(|e| e.path == path)
    }

    #[must_use]
    pub const fn summary(&self) -> &ScanSummary {
        &self.summary
    }
}

/// Options controlling an effect scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Folder levels below the root that are classified. `0` finds nothing.
    pub max_depth: usize,
    /// Directories visited before the first budget prompt.
    pub dir_budget: usize,
    /// Budget added each time the caller chooses to continue.
    pub budget_increment: usize,
    /// Directories between progress checkpoints. `0` disables them.
    pub progress_every: usize,
    /// Log a warning when a pass runs longer than this.
    pub slow_scan_warning: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            dir_budget: 500,
            budget_increment: 1000,
            progress_every: 5,
            slow_scan_warning: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub dirs_scanned: usize,
    pub budget: usize,
    pub effects_found: usize,
}

/// Answer to a budget prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// Checkpoint reached; call [`Scanner::poll`] again to continue.
    Progress(ScanProgress),
    /// Directory budget reached; call [`Scanner::resume`] before polling.
    BudgetExceeded(ScanProgress),
    /// Nothing left to visit.
    Complete,
}

type Walk = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// Resumable depth-first effect scan.
pub struct Scanner {
    root: PathBuf,
    options: ScanOptions,
    walk: Option<Walk>,
    /// Entry that tripped the budget check, classified after `Continue`.
    pending: Option<DirEntry>,
    awaiting_decision: bool,
    result: ScanResult,
    scanned: usize,
    budget: usize,
    since_checkpoint: usize,
    stopped_early: bool,
    started: Instant,
}

impl Scanner {
    pub fn new(root: &Path, options: ScanOptions) -> Self {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let walk = if root.is_dir() {
            let walk: Walk = WalkDir::new(&root)
                .follow_links(true)
                .min_depth(1)
                .max_depth(options.max_depth)
                .sort_by(|a, b| {
                    natural::compare(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
                })
                .into_iter()
                .filter_entry(should_visit as fn(&DirEntry) -> bool);
            Some(walk)
        } else {
            info!(root = %root.display(), "scan root is not a directory; nothing found");
            None
        };
        let budget = options.dir_budget;

        Self {
            root,
            options,
            walk,
            pending: None,
            awaiting_decision: false,
            result: ScanResult::default(),
            scanned: 0,
            budget,
            since_checkpoint: 0,
            stopped_early: false,
            started: Instant::now(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn progress(&self) -> ScanProgress {
        ScanProgress {
            dirs_scanned: self.scanned,
            budget: self.budget,
            effects_found: self.result.effect_count(),
        }
    }

    /// Advance to the next checkpoint.
    ///
    /// While a budget prompt is unanswered this keeps returning
    /// [`ScanStatus::BudgetExceeded`] without doing any work.
    pub fn poll(&mut self) -> ScanStatus {
        if self.awaiting_decision {
            return ScanStatus::BudgetExceeded(self.progress());
        }

        loop {
            let entry = match self.pending.take() {
                Some(entry) => entry,
                None => {
                    let Some(entry) = self.next_dir() else {
                        self.walk = None;
                        return ScanStatus::Complete;
                    };
                    self.scanned += 1;
                    if self.scanned >= self.budget {
                        debug!(scanned = self.scanned, budget = self.budget, "scan budget reached");
                        self.pending = Some(entry);
                        self.awaiting_decision = true;
                        return ScanStatus::BudgetExceeded(self.progress());
                    }
                    entry
                }
            };

            self.classify(&entry);

            self.since_checkpoint += 1;
            if self.options.progress_every > 0 && self.since_checkpoint >= self.options.progress_every {
                self.since_checkpoint = 0;
                return ScanStatus::Progress(self.progress());
            }
        }
    }

    /// Answer an outstanding budget prompt.
    pub fn resume(&mut self, decision: BudgetDecision) {
        if !self.awaiting_decision {
            return;
        }
        self.awaiting_decision = false;
        match decision {
            BudgetDecision::Continue => {
                self.budget += self.options.budget_increment;
                info!(budget = self.budget, "continuing scan with enlarged budget");
            }
            BudgetDecision::Stop => {
                info!(scanned = self.scanned, "scan stopped at budget; keeping partial results");
                self.pending = None;
                self.walk = None;
                self.stopped_early = true;
            }
        }
    }

    /// Consume the scanner and return what it found.
    pub fn finish(mut self) -> ScanResult {
        let elapsed = self.started.elapsed();
        let slow = self.options.slow_scan_warning.is_some_and(|limit| elapsed > limit);
        if slow {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "scan took unusually long; showing the effects found so far"
            );
        }
        self.result.summary = ScanSummary {
            dirs_scanned: self.scanned,
            budget: self.budget,
            stopped_early: self.stopped_early,
            slow,
            elapsed,
        };
        info!(
            root = %self.root.display(),
            effects = self.result.effect_count(),
            dirs = self.scanned,
            "scan complete"
        );
        self.result
    }

    fn next_dir(&mut self) -> Option<DirEntry> {
        let walk = self.walk.as_mut()?;
        loop {
            match walk.next()? {
                Ok(entry) => return Some(entry),
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!(path, "skipping unreadable entry: {err}");
                }
            }
        }
    }

    fn classify(&mut self, entry: &DirEntry) {
        let path = entry.path();
        let image_count = list_images(path).len();
        if image_count == 0 {
            // Category folder; the walk descends into it on its own.
            return;
        }

        // Directories at max depth were never opened, so there is nothing to
        // skip and popping would cut the parent short.
        if entry.depth() < self.options.max_depth
            && let Some(walk) = self.walk.as_mut()
        {
            walk.skip_current_dir();
        }

        let relative_path = path.strip_prefix(&self.root).unwrap_or(path).to_path_buf();
        let effect = Effect {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: path.to_path_buf(),
            category: Category::from_relative(&relative_path),
            relative_path,
            image_count,
        };
        debug!(effect = %effect.relative_path.display(), frames = image_count, "effect found");
        self.result.insert(effect);
    }
}

fn should_visit(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_none_or(|n| !n.starts_with('.') && !n.starts_with('$'))
}

/// Scan `root` to completion, asking `on_budget` at each budget prompt.
#[instrument(skip(options, on_budget), fields(root = %root.display(), max_depth = options.max_depth))]
pub fn scan_effects<F>(root: &Path, options: &ScanOptions, mut on_budget: F) -> ScanResult
where
    F: FnMut(ScanProgress) -> BudgetDecision,
{
    let mut scanner = Scanner::new(root, options.clone());
    loop {
        match scanner.poll() {
            ScanStatus::Progress(_) => {}
            ScanStatus::BudgetExceeded(progress) => scanner.resume(on_budget(progress)),
            ScanStatus::Complete => break,
        }
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_filter_matches_supported_extensions() {
        assert!(is_supported_image(Path::new("a/frame_01.png")));
        assert!(is_supported_image(Path::new("FRAME.JPG")));
        assert!(is_supported_image(Path::new("x.Jpeg")));
        assert!(is_supported_image(Path::new("anim.gif")));
        assert!(!is_supported_image(Path::new("clip.webp")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("png")));
    }

    #[test]
    fn category_from_relative_path() {
        assert_eq!(Category::from_relative(Path::new("fire")), Category::Root);
        assert_eq!(
            Category::from_relative(Path::new("magic/fire")),
            Category::Folder("magic".into())
        );
        assert_eq!(
            Category::from_relative(&Path::new("magic").join("big").join("fire")),
            Category::Folder("magic/big".into())
        );
    }
}

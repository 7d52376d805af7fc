//! Turns a flat [`ScanResult`] into the display tree and the playback order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::natural::NaturalKey;
use crate::scan::{Category, Effect, ScanResult};

/// Effect entry as shown in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectLeaf {
    pub name: String,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub image_count: usize,
}

impl EffectLeaf {
    fn from_effect(effect: &Effect) -> Self {
        Self {
            name: effect.name.clone(),
            path: effect.path.clone(),
            relative_path: effect.relative_path.clone(),
            image_count: effect.image_count,
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({} frames)", self.name, self.image_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TreeNode {
    Category { label: String, effects: Vec<EffectLeaf> },
    /// Effects from the root category hang directly off the top level.
    Effect(EffectLeaf),
}

/// Two-level presentation hierarchy: category → effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayTree {
    pub nodes: Vec<TreeNode>,
}

impl DisplayTree {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &EffectLeaf> {
        self.nodes.iter().flat_map(|node| match node {
            TreeNode::Category { effects, .. } => effects.iter().collect::<Vec<_>>(),
            TreeNode::Effect(leaf) => vec![leaf],
        })
    }
}

/// Flat, filtered sequence of effects used for auto-advance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    entries: Vec<Arc<Effect>>,
}

impl Playlist {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Effect>> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Effect>> {
        self.entries.iter()
    }

    /// Index of the effect at `path`, used to re-find a selection after a
    /// rebuild.
    pub fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }

    /// Entry after `index`, wrapping to the first after the last.
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some((index + 1) % self.entries.len())
        }
    }
}

/// Build the display tree and playlist for `scan`, keeping only effects whose
/// name contains `filter` (case-insensitive, surrounding whitespace ignored).
pub fn build(scan: &ScanResult, filter: &str) -> (DisplayTree, Playlist) {
    let needle = filter.trim().to_lowercase();

    let mut categories: Vec<(&Category, &[Arc<Effect>])> = scan.categories().collect();
    categories.sort_by_cached_key(|(category, _)| NaturalKey::new(category.label()));

    let mut tree = DisplayTree::default();
    let mut playlist = Playlist::default();

    for (category, bucket) in categories {
        let mut effects: Vec<&Arc<Effect>> = bucket
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .collect();
        if effects.is_empty() {
            continue;
        }
        effects.sort_by(|a, b| {
            NaturalKey::new(&a.name)
                .cmp(&NaturalKey::new(&b.name))
                .then_with(|| a.path.cmp(&b.path))
        });

        playlist.entries.extend(effects.iter().map(|e| Arc::clone(e)));

        let leaves = effects.iter().map(|e| EffectLeaf::from_effect(e));
        if category.is_root() {
            tree.nodes.extend(leaves.map(TreeNode::Effect));
        } else {
            tree.nodes.push(TreeNode::Category {
                label: category.label().to_string(),
                effects: leaves.collect(),
            });
        }
    }

    (tree, playlist)
}

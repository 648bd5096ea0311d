//! The Tree Registry: the small, authoritative table of product/branch/locale
//! configurations that everything else in the scheduler derives its indices
//! from.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A named product/branch configuration.
///
/// Two trees are equal iff every field here matches; there is no derived or
/// transient state on this type, so `#[derive(PartialEq)]` is exactly the
/// equality the registry contract (`upsertTree`) needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub name: String,
    pub repo: String,
    /// role -> branch name, minimally "en" and "l10n".
    pub branches: BTreeMap<String, String>,
    /// source branch -> l10n.ini paths (base ini plus includes).
    pub l10ninis: BTreeMap<String, Vec<String>>,
    /// source branch -> compare directories.
    pub branch2dirs: BTreeMap<String, Vec<String>>,
    /// Single top-level directory for single-module products.
    pub tld: Option<String>,
    /// Path (within the source branch) of the all-locales manifest.
    pub all_locales: Option<String>,
    pub locales: Vec<String>,
}

impl Tree {
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Tree {
            name: name.into(),
            repo: repo.into(),
            branches: BTreeMap::new(),
            l10ninis: BTreeMap::new(),
            branch2dirs: BTreeMap::new(),
            tld: None,
            all_locales: None,
            locales: Vec::new(),
        }
    }

    pub fn en_branch(&self) -> Option<&str> {
        self.branches.get("en").map(String::as_str)
    }

    pub fn l10n_branch(&self) -> Option<&str> {
        self.branches.get("l10n").map(String::as_str)
    }

    /// Appends `dirs` to `branch2dirs[branch]`, deduplicating.
    ///
    /// The historical implementation appended unconditionally, so the same
    /// directory could appear twice when an ini was (re)loaded more than
    /// once. We dedupe here: nothing in the buildset consumer depends on
    /// duplicate entries, and a deduped index is simply correct (see
    /// DESIGN.md for the open-question writeup).
    pub fn add_dirs(&mut self, branch: impl Into<String>, dirs: impl IntoIterator<Item = String>) {
        let entry = self.branch2dirs.entry(branch.into()).or_default();
        for dir in dirs {
            if !entry.contains(&dir) {
                entry.push(dir);
            }
        }
    }

    pub fn add_ini(&mut self, branch: impl Into<String>, ini: impl Into<String>) {
        let entry = self.l10ninis.entry(branch.into()).or_default();
        let ini = ini.into();
        if !entry.contains(&ini) {
            entry.push(ini);
        }
    }
}

/// The authoritative mapping from tree name to `Tree`, plus the bookkeeping
/// `upsertTree` needs to decide whether a full en-US rebuild is owed once the
/// next reload for that tree completes.
#[derive(Debug, Default)]
pub struct TreeRegistry {
    trees: HashMap<String, Tree>,
    /// Tree names whose most recent upsert actually changed something, and
    /// therefore owe a `checkEnUS` pass once their triggering reload
    /// finishes (the dispatcher drains this via `take_to_do`).
    to_do: BTreeSet<String>,
}

/// Outcome of `upsert`, used by the caller (the tree loader driver) to
/// decide whether a derived-index rebuild is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// An identical tree was already registered; nothing changed.
    Unchanged,
    /// The tree was new or differed from what was registered; the registry
    /// now holds the new value and indices must be rebuilt.
    Replaced,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Tree> {
        self.trees.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tree> {
        self.trees.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// `upsertTree(t)`: replace-if-different, mark "to-do" on replacement.
    pub fn upsert(&mut self, tree: Tree) -> UpsertOutcome {
        match self.trees.get(&tree.name) {
            Some(existing) if existing == &tree => UpsertOutcome::Unchanged,
            _ => {
                self.to_do.insert(tree.name.clone());
                self.trees.insert(tree.name.clone(), tree);
                UpsertOutcome::Replaced
            }
        }
    }

    /// Drains the set of tree names that owe a `checkEnUS` pass after their
    /// next reload completion. The dispatcher calls this once per reload
    /// completion and folds the result into `treesToDo`.
    pub fn take_to_do(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.to_do)
    }

    /// Clears the registry entirely; used before the startup reload burst
    /// (the tree loader driver re-populates it tree-by-tree as reloads
    /// complete).
    pub fn clear(&mut self) {
        self.trees.clear();
        self.to_do.clear();
    }
}

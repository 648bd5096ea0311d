//! Derived indices rebuilt from the Tree Registry: the lookups the
//! dispatcher actually consults on the hot path.
//!
//! Both index types are a pure function of the registry (invariant 1 in the
//! spec's data model). `DerivedIndex::rebuild` throws away whatever was
//! there before and recomputes from scratch every time — the registry is
//! small (tens of trees) so this is not a performance concern, and it's a
//! lot easier to reason about than an incremental add/remove diff.

use std::collections::{BTreeMap, BTreeSet};

use crate::tree::TreeRegistry;

/// Per-source-branch derived lookups.
#[derive(Debug, Default, Clone)]
pub struct BranchIndex {
    /// ini path -> tree names that declare it.
    pub inis: BTreeMap<String, Vec<String>>,
    /// compare directory -> tree names that declare it.
    pub dirs: BTreeMap<String, Vec<String>>,
    /// all-locales manifest path -> tree names that declare it.
    pub all_locales: BTreeMap<String, BTreeSet<String>>,
    /// trees whose `tld` puts them in this (single-module) branch.
    pub topleveltrees: BTreeSet<String>,
}

/// Per-l10n-branch derived lookups.
#[derive(Debug, Default, Clone)]
pub struct L10nIndex {
    /// directory -> tree names that compare it on this l10n branch.
    pub dirs: BTreeMap<String, BTreeSet<String>>,
}

/// The full set of derived indices, keyed by branch name.
#[derive(Debug, Default)]
pub struct DerivedIndex {
    by_source_branch: BTreeMap<String, BranchIndex>,
    by_l10n_branch: BTreeMap<String, L10nIndex>,
}

impl DerivedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_branch(&self, branch: &str) -> Option<&BranchIndex> {
        self.by_source_branch.get(branch)
    }

    pub fn l10n_branch(&self, branch: &str) -> Option<&L10nIndex> {
        self.by_l10n_branch.get(branch)
    }

    pub fn has_source_branch(&self, branch: &str) -> bool {
        self.by_source_branch.contains_key(branch)
    }

    pub fn has_l10n_branch(&self, branch: &str) -> bool {
        self.by_l10n_branch.contains_key(branch)
    }

    /// Rebuilds both indices from scratch against the current registry
    /// contents. See §4.1 for the exact rebuild algorithm.
    pub fn rebuild(&mut self, registry: &TreeRegistry) {
        let mut by_source_branch: BTreeMap<String, BranchIndex> = BTreeMap::new();
        let mut by_l10n_branch: BTreeMap<String, L10nIndex> = BTreeMap::new();

        for tree in registry.iter() {
            for (branch, dirs) in &tree.branch2dirs {
                let index = by_source_branch.entry(branch.clone()).or_default();
                for dir in dirs {
                    push_unique(index.dirs.entry(dir.clone()).or_default(), &tree.name);
                }

                if let Some(l10n_branch) = tree.l10n_branch() {
                    let l10n_index = by_l10n_branch.entry(l10n_branch.to_string()).or_default();
                    for dir in dirs {
                        l10n_index
                            .dirs
                            .entry(dir.clone())
                            .or_default()
                            .insert(tree.name.clone());
                    }
                }
            }

            for (branch, inis) in &tree.l10ninis {
                let index = by_source_branch.entry(branch.clone()).or_default();
                for ini in inis {
                    push_unique(index.inis.entry(ini.clone()).or_default(), &tree.name);
                }
            }

            if let Some(tld) = &tree.tld {
                if let Some(l10n_branch) = tree.l10n_branch() {
                    by_l10n_branch
                        .entry(l10n_branch.to_string())
                        .or_default()
                        .dirs
                        .entry(tld.clone())
                        .or_default()
                        .insert(tree.name.clone());
                }
                if let Some(en_branch) = tree.en_branch() {
                    by_source_branch
                        .entry(en_branch.to_string())
                        .or_default()
                        .topleveltrees
                        .insert(tree.name.clone());
                }
            }

            if let Some(all_locales) = &tree.all_locales {
                if let Some(en_branch) = tree.en_branch() {
                    by_source_branch
                        .entry(en_branch.to_string())
                        .or_default()
                        .all_locales
                        .entry(all_locales.clone())
                        .or_default()
                        .insert(tree.name.clone());
                }
            }
        }

        self.by_source_branch = by_source_branch;
        self.by_l10n_branch = by_l10n_branch;
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn registry_with(trees: Vec<Tree>) -> TreeRegistry {
        let mut registry = TreeRegistry::new();
        for t in trees {
            registry.upsert(t);
        }
        registry
    }

    fn sample_tree() -> Tree {
        let mut t = Tree::new("test", "http://localhost/");
        t.branches.insert("en".into(), "test-branch".into());
        t.branches.insert("l10n".into(), "l10n-test".into());
        t.add_dirs("test-branch", vec!["test-app".into()]);
        t.add_ini("test-branch", "test-app/locales/l10n.ini");
        t.locales = vec!["de".into(), "fr".into()];
        t
    }

    #[test]
    fn rebuild_indexes_dirs_and_inis() {
        let registry = registry_with(vec![sample_tree()]);
        let mut index = DerivedIndex::new();
        index.rebuild(&registry);

        let branch_index = index.source_branch("test-branch").unwrap();
        assert_eq!(branch_index.dirs["test-app"], vec!["test".to_string()]);
        assert_eq!(
            branch_index.inis["test-app/locales/l10n.ini"],
            vec!["test".to_string()]
        );
    }

    #[test]
    fn rebuild_indexes_tld_and_all_locales() {
        let mut t = sample_tree();
        t.tld = Some("mobile".into());
        t.all_locales = Some("app/locales/all-locales".into());
        let registry = registry_with(vec![t]);

        let mut index = DerivedIndex::new();
        index.rebuild(&registry);

        let branch_index = index.source_branch("test-branch").unwrap();
        assert!(branch_index.topleveltrees.contains("test"));
        assert!(branch_index.all_locales["app/locales/all-locales"].contains("test"));

        let l10n_index = index.l10n_branch("l10n-test").unwrap();
        assert!(l10n_index.dirs["mobile"].contains("test"));
    }

    #[test]
    fn rebuild_indexes_compare_dirs_into_l10n_branch_even_without_tld() {
        let registry = registry_with(vec![sample_tree()]);
        let mut index = DerivedIndex::new();
        index.rebuild(&registry);

        let l10n_index = index.l10n_branch("l10n-test").unwrap();
        assert!(l10n_index.dirs["test-app"].contains("test"));
    }

    #[test]
    fn unrelated_branch_has_no_entries() {
        let registry = registry_with(vec![sample_tree()]);
        let mut index = DerivedIndex::new();
        index.rebuild(&registry);

        assert!(!index.has_source_branch("other-branch"));
        assert!(!index.has_l10n_branch("other-branch"));
    }

    #[test]
    fn rebuild_replaces_stale_entries() {
        let mut registry = TreeRegistry::new();
        registry.upsert(sample_tree());

        let mut index = DerivedIndex::new();
        index.rebuild(&registry);
        assert!(index.source_branch("test-branch").is_some());

        registry.clear();
        index.rebuild(&registry);
        assert!(index.source_branch("test-branch").is_none());
    }
}

//! The dispatcher: `addChange`'s synchronous core.
//!
//! Everything here is plain data manipulation over the registry, the
//! derived indices, and the pending buffer — no I/O. The one place this
//! needs to reach outside itself is an all-locales manifest fetch, which is
//! genuinely asynchronous; rather than make every dispatch call async for
//! that one case, `begin_dispatch` returns the fetch requests it needs run
//! and lets the caller (the scheduler) await them afterward.

use std::collections::BTreeSet;

use crate::change::Change;
use crate::scheduler::SchedulerCore;

/// What the scheduler needs to do after a synchronous dispatch pass.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The Gate was closed; `change` was appended to its FIFO.
    Deferred,
    /// The change didn't match any known branch, or matched no locale on
    /// any tree it touched; nothing was scheduled.
    Discarded,
    /// Comparisons (if any) were scheduled directly into the pending
    /// buffer; these all-locales fetches still need to run.
    Scheduled {
        all_locales_fetches: Vec<AllLocalesRequest>,
    },
    /// One or more trees need an `l10n.ini` reload before dispatch can
    /// continue. The Gate is already closed by the time this is returned.
    NeedsReload {
        trees: Vec<String>,
        triggering: Change,
    },
}

/// A deferred all-locales manifest fetch, queued by `checkEnUS` for the
/// caller to run asynchronously.
#[derive(Debug, Clone)]
pub struct AllLocalesRequest {
    pub tree: String,
    pub path: String,
    pub triggering: Change,
}

impl SchedulerCore {
    /// `addChange`'s synchronous entry point (steps 1-4 of §4.3, minus the
    /// all-locales fetch itself).
    pub(crate) fn begin_dispatch(&mut self, change: Change) -> DispatchOutcome {
        if self.gate.is_closed() {
            self.gate.defer(change);
            return DispatchOutcome::Deferred;
        }

        if change.resolved_locale().is_some() {
            let scheduled = self.dispatch_l10n_change(&change);
            return if scheduled {
                DispatchOutcome::Scheduled {
                    all_locales_fetches: Vec::new(),
                }
            } else {
                DispatchOutcome::Discarded
            };
        }

        self.dispatch_source_change(change)
    }

    fn dispatch_source_change(&mut self, change: Change) -> DispatchOutcome {
        if !self.index.has_source_branch(&change.branch) {
            return DispatchOutcome::Discarded;
        }

        let mut ini_triggers = BTreeSet::new();
        {
            let branch_index = self.index.source_branch(&change.branch).unwrap();
            for file in &change.files {
                if let Some(trees) = branch_index.inis.get(file) {
                    ini_triggers.extend(trees.iter().cloned());
                }
            }
        }

        if !ini_triggers.is_empty() {
            self.gate.begin_reload();
            return DispatchOutcome::NeedsReload {
                trees: ini_triggers.into_iter().collect(),
                triggering: change,
            };
        }

        let all_locales_fetches = self.check_en_us(&change);
        DispatchOutcome::Scheduled { all_locales_fetches }
    }

    /// `checkEnUS(change)`: drains `treesToDo`, walks the change's files for
    /// all-locales matches and `"locales/en-US"` matches, and schedules
    /// comparisons for the resulting tree set. Returns the all-locales
    /// fetches that still need to run.
    pub(crate) fn check_en_us(&mut self, change: &Change) -> Vec<AllLocalesRequest> {
        let mut trees_to_do = self.registry.take_to_do();
        let mut to_trigger = BTreeSet::new();
        let mut fetches = Vec::new();

        if let Some(branch_index) = self.index.source_branch(&change.branch) {
            for file in &change.files {
                if let Some(tree_names) = branch_index.all_locales.get(file) {
                    for tree_name in tree_names {
                        fetches.push(AllLocalesRequest {
                            tree: tree_name.clone(),
                            path: file.clone(),
                            triggering: change.clone(),
                        });
                    }
                }

                if let Some(idx) = file.find("locales/en-US") {
                    let left = &file[..idx];
                    let module = left.strip_suffix('/').unwrap_or(left);

                    if module.is_empty() {
                        for tree_name in &branch_index.topleveltrees {
                            to_trigger.insert(tree_name.clone());
                        }
                    } else if let Some(tree_names) = branch_index.dirs.get(module) {
                        to_trigger.extend(tree_names.iter().cloned());
                    }
                }
            }
        }

        trees_to_do.extend(to_trigger);

        for tree_name in &trees_to_do {
            self.schedule_comparisons_for_tree(tree_name, change);
        }

        fetches
    }

    /// Schedules a comparison for every locale currently known to `tree`,
    /// carrying `change` as the justification.
    pub(crate) fn schedule_comparisons_for_tree(&mut self, tree_name: &str, change: &Change) {
        let locales = match self.registry.get(tree_name) {
            Some(tree) => tree.locales.clone(),
            None => return, // reload-introduced to-do entry that no longer resolves (§5)
        };

        for locale in locales {
            self.pending.push(tree_name, &locale, vec![change.clone()]);
        }
        self.flush_needed = true;
    }

    /// The l10n path (§4.3 step 4). Returns whether anything was scheduled.
    fn dispatch_l10n_change(&mut self, change: &Change) -> bool {
        let Some(l10n_index) = self.index.l10n_branch(&change.branch) else {
            return false;
        };

        let mut matched_trees = BTreeSet::new();
        for file in &change.files {
            for (dir, trees) in &l10n_index.dirs {
                if file.starts_with(dir.as_str()) {
                    matched_trees.extend(trees.iter().cloned());
                }
            }
        }

        let locale = change.resolved_locale().expect("caller only routes l10n changes here");

        let mut scheduled = false;
        for tree_name in matched_trees {
            let known = self
                .registry
                .get(&tree_name)
                .map(|t| t.locales.iter().any(|l| l == locale))
                .unwrap_or(false);

            if known {
                self.pending.push(&tree_name, locale, vec![change.clone()]);
                self.flush_needed = true;
                scheduled = true;
            }
        }

        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    fn sample_tree() -> Tree {
        let mut t = Tree::new("test", "http://localhost/");
        t.branches.insert("en".into(), "test-branch".into());
        t.branches.insert("l10n".into(), "l10n-test".into());
        t.add_dirs("test-branch", vec!["test-app".into()]);
        t.add_ini("test-branch", "test-app/locales/l10n.ini");
        t.locales = vec!["de".into(), "fr".into()];
        t
    }

    fn core_with_tree() -> SchedulerCore {
        let mut core = SchedulerCore::new();
        core.registry.upsert(sample_tree());
        core.registry.take_to_do();
        core.rebuild_index();
        core
    }

    #[test]
    fn l10n_change_pends_one_entry() {
        let mut core = core_with_tree();
        let change = Change::new(1, "l10n-test", vec!["test-app/file.dtd".into()])
            .with_locale("de");

        let outcome = core.begin_dispatch(change.clone());
        assert!(matches!(outcome, DispatchOutcome::Scheduled { .. }));
        assert_eq!(core.pending.get("test", "de").unwrap(), &[change]);
        assert!(core.pending.get("test", "fr").is_none());
    }

    #[test]
    fn en_us_change_fans_out_to_all_locales() {
        let mut core = core_with_tree();
        let change = Change::new(
            2,
            "test-branch",
            vec!["test-app/locales/en-US/file.dtd".into()],
        );

        core.begin_dispatch(change.clone());
        assert_eq!(core.pending.get("test", "de").unwrap(), &[change.clone()]);
        assert_eq!(core.pending.get("test", "fr").unwrap(), &[change]);
    }

    #[test]
    fn unknown_branch_is_discarded() {
        let mut core = core_with_tree();
        let change = Change::new(3, "other", vec!["x".into()]);
        let outcome = core.begin_dispatch(change);
        assert!(matches!(outcome, DispatchOutcome::Discarded));
        assert!(core.pending.is_empty());
    }

    #[test]
    fn l10n_change_with_unknown_locale_is_dropped() {
        let mut core = core_with_tree();
        let change = Change::new(4, "l10n-test", vec!["test-app/file.dtd".into()])
            .with_locale("ja");
        let outcome = core.begin_dispatch(change);
        assert!(matches!(outcome, DispatchOutcome::Discarded));
        assert!(core.pending.is_empty());
    }

    #[test]
    fn ini_change_closes_gate_and_reports_reload() {
        let mut core = core_with_tree();
        let change = Change::new(5, "test-branch", vec!["test-app/locales/l10n.ini".into()]);

        let outcome = core.begin_dispatch(change.clone());
        assert!(core.gate.is_closed());
        match outcome {
            DispatchOutcome::NeedsReload { trees, triggering } => {
                assert_eq!(trees, vec!["test".to_string()]);
                assert_eq!(triggering, change);
            }
            other => panic!("expected NeedsReload, got {other:?}"),
        }
    }

    #[test]
    fn change_while_gate_closed_is_deferred() {
        let mut core = core_with_tree();
        core.gate.begin_reload();

        let change = Change::new(6, "test-branch", vec!["test-app/locales/en-US/x".into()]);
        let outcome = core.begin_dispatch(change);
        assert!(matches!(outcome, DispatchOutcome::Deferred));
        assert!(core.pending.is_empty());
    }

    #[test]
    fn single_module_product_matches_empty_mod_via_topleveltrees() {
        let mut t = sample_tree();
        t.tld = Some("test-app".into());
        let mut core = SchedulerCore::new();
        core.registry.upsert(t);
        core.registry.take_to_do();
        core.rebuild_index();

        let change = Change::new(7, "test-branch", vec!["locales/en-US/file.dtd".into()]);
        core.begin_dispatch(change.clone());

        assert_eq!(core.pending.get("test", "de").unwrap(), &[change.clone()]);
        assert_eq!(core.pending.get("test", "fr").unwrap(), &[change]);
    }

    #[test]
    fn all_locales_file_returns_fetch_request() {
        let mut t = sample_tree();
        t.all_locales = Some("test-app/locales/all-locales".into());
        let mut core = SchedulerCore::new();
        core.registry.upsert(t);
        core.registry.take_to_do();
        core.rebuild_index();

        let change = Change::new(
            8,
            "test-branch",
            vec!["test-app/locales/all-locales".into()],
        );
        let outcome = core.begin_dispatch(change);
        match outcome {
            DispatchOutcome::Scheduled { all_locales_fetches } => {
                assert_eq!(all_locales_fetches.len(), 1);
                assert_eq!(all_locales_fetches[0].tree, "test");
            }
            other => panic!("expected Scheduled, got {other:?}"),
        }
    }
}

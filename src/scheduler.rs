//! The scheduler service: owns the registry, both derived indices, the
//! pending buffer and the gate, and drives them from one single-threaded
//! executor. `SchedulerCore` is the plain-data half (everything in
//! `dispatcher.rs` is an `impl SchedulerCore` block); `SchedulerState` is the
//! async half that awaits collaborators and redrives deferred changes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::join_all;

use crate::buildset::Buildset;
use crate::change::Change;
use crate::config::SchedulerConfig;
use crate::dispatcher::{AllLocalesRequest, DispatchOutcome};
use crate::error::{SchedulerError, SchedulerResult};
use crate::external::{ComparisonBuilder, PushHistory, TreeBuilder};
use crate::gate::Gate;
use crate::index::DerivedIndex;
use crate::pending::PendingBuffer;
use crate::tree::TreeRegistry;

/// The synchronous core: registry, derived indices, pending buffer, gate.
/// Every method that mutates this lives in `dispatcher.rs` or here, and none
/// of them ever holds a borrow across an `.await`.
#[derive(Debug, Default)]
pub struct SchedulerCore {
    pub(crate) registry: TreeRegistry,
    pub(crate) index: DerivedIndex,
    pub(crate) pending: PendingBuffer,
    pub(crate) gate: Gate,
    /// Set whenever the pending buffer gains an entry; cleared by `flush`.
    /// Lets a flush that finds nothing to do skip the (still-cheap, but
    /// unnecessary) drain-and-reiterate.
    pub(crate) flush_needed: bool,
}

impl SchedulerCore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index.rebuild(&self.registry);
    }

    /// Applies an all-locales fetch completion (§4.5): diff the new locale
    /// list against the tree's current one, adopt it, and schedule a
    /// comparison for each newly added locale.
    pub(crate) fn apply_all_locales(
        &mut self,
        tree_name: &str,
        new_locales: Vec<String>,
        triggering: &Change,
    ) {
        let Some(tree) = self.registry.get_mut(tree_name) else {
            return;
        };

        let added: Vec<String> = new_locales
            .iter()
            .filter(|locale| !tree.locales.iter().any(|l| l == *locale))
            .cloned()
            .collect();
        tree.locales = new_locales;

        for locale in &added {
            self.pending.push(tree_name, locale, vec![triggering.clone()]);
        }
        if !added.is_empty() {
            self.flush_needed = true;
        }
    }
}

/// The scheduler's async orchestration layer. Not `Clone`; shared via `Rc`
/// across tasks spawned on the same `LocalSet`.
pub struct SchedulerState {
    core: Rc<RefCell<SchedulerCore>>,
    tree_builder: Arc<dyn TreeBuilder>,
    comparison_builder: Arc<dyn ComparisonBuilder>,
    push_history: Arc<dyn PushHistory>,
    config: SchedulerConfig,
}

impl SchedulerState {
    pub fn new(
        tree_builder: Arc<dyn TreeBuilder>,
        comparison_builder: Arc<dyn ComparisonBuilder>,
        push_history: Arc<dyn PushHistory>,
        config: SchedulerConfig,
    ) -> Self {
        SchedulerState {
            core: Rc::new(RefCell::new(SchedulerCore::new())),
            tree_builder,
            comparison_builder,
            push_history,
            config,
        }
    }

    /// Loads every tree named in `trees` from scratch, used by the tree
    /// loader driver at startup (the registry is cleared first so a fresh
    /// reload burst starts from nothing, per §4.5).
    pub async fn load_initial_trees(&self, tree_names: &[String]) -> SchedulerResult<()> {
        self.core.borrow_mut().registry.clear();
        let deferred = self.run_reload(tree_names.to_vec(), None).await?;
        for change in deferred {
            self.add_change(change).await?;
        }
        Ok(())
    }

    /// `addChange`: dispatches synchronously, awaiting whatever the
    /// dispatcher asks for (an all-locales fetch, or a tree reload), and
    /// redrives any changes the Gate deferred while a reload it triggered
    /// was running.
    pub async fn add_change(&self, change: Change) -> SchedulerResult<()> {
        let mut queue = VecDeque::new();
        queue.push_back(change);

        while let Some(change) = queue.pop_front() {
            let outcome = self.core.borrow_mut().begin_dispatch(change);

            match outcome {
                DispatchOutcome::Deferred | DispatchOutcome::Discarded => {}
                DispatchOutcome::Scheduled { all_locales_fetches } => {
                    for fetch in all_locales_fetches {
                        self.run_all_locales_fetch(fetch).await;
                    }
                }
                DispatchOutcome::NeedsReload { trees, triggering } => {
                    let deferred = self.run_reload(trees, Some(triggering)).await?;
                    queue.extend(deferred);
                }
            }
        }

        Ok(())
    }

    async fn run_all_locales_fetch(&self, fetch: AllLocalesRequest) {
        let tree = self.core.borrow().registry.get(&fetch.tree).cloned();
        let Some(tree) = tree else {
            return;
        };

        match self.tree_builder.fetch_all_locales(&tree, &fetch.path).await {
            Ok(new_locales) => {
                self.core
                    .borrow_mut()
                    .apply_all_locales(&fetch.tree, new_locales, &fetch.triggering);
            }
            Err(error) => {
                // §4.3 edge case: locale list unchanged, no new-locale builds.
                tracing::warn!(tree = %fetch.tree, %error, "all-locales fetch failed");
            }
        }
    }

    /// Submits one reload buildset per tree in `trees`, awaits the tree
    /// builder's load of each, folds the results into the registry, rebuilds
    /// the derived indices, and releases the Gate. Returns whatever changes
    /// were deferred while the Gate was closed, for the caller to redrive.
    async fn run_reload(
        &self,
        trees: Vec<String>,
        triggering: Option<Change>,
    ) -> SchedulerResult<VecDeque<Change>> {
        self.core.borrow_mut().gate.begin_reload();

        let loads = trees.into_iter().map(|name| {
            let triggering = triggering.clone();
            async move {
                let buildset = Buildset::reload(&name, triggering.as_ref());
                if let Err(error) = self.comparison_builder.submit(buildset).await {
                    tracing::warn!(tree = %name, %error, "reload buildset submission failed");
                }
                let loaded = self.tree_builder.load_tree(&name, triggering.as_ref()).await;
                (name, loaded)
            }
        });

        let results = join_all(loads).await;

        let mut core = self.core.borrow_mut();
        for (name, loaded) in results {
            match loaded {
                Ok(tree) => {
                    core.registry.upsert(tree);
                }
                Err(error) => {
                    tracing::warn!(tree = %name, %error, "tree reload failed; registry entry unchanged");
                }
            }
        }
        core.rebuild_index();
        let deferred = core.gate.end_reload();
        Ok(deferred)
    }

    /// Drains the pending buffer and submits one comparison buildset per
    /// `(tree, locale)` entry. Production code calls this after the
    /// configured coalescing delay; tests call it directly.
    pub async fn flush(&self) -> SchedulerResult<()> {
        let entries = {
            let mut core = self.core.borrow_mut();
            if !core.flush_needed {
                return Ok(());
            }
            core.flush_needed = false;
            core.pending.drain()
        };

        for ((tree_name, locale), changes) in entries {
            let tree = self.core.borrow().registry.get(&tree_name).cloned();
            let Some(tree) = tree else {
                continue;
            };

            let buildset =
                Buildset::comparison(&tree, &locale, changes, self.push_history.as_ref()).await;
            self.comparison_builder
                .submit(buildset)
                .await
                .map_err(|source| SchedulerError::BuildsetSubmission {
                    tree: tree_name.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn schedule_flush(&self) -> SchedulerResult<()> {
        if !self.config.flush_delay.is_zero() {
            tokio::time::sleep(self.config.flush_delay).await;
        }
        self.flush().await
    }

    /// The production run loop: consumes changes from `incoming` until the
    /// channel closes, dispatching each on its own local task so a change
    /// whose dispatch suspends on a reload doesn't block changes arriving
    /// behind it. Must run inside a `tokio::task::LocalSet`.
    pub async fn run(self: Arc<Self>, mut incoming: tokio::sync::mpsc::Receiver<Change>) {
        while let Some(change) = incoming.recv().await {
            let state = Arc::clone(&self);
            tokio::task::spawn_local(async move {
                if let Err(error) = state.add_change(change).await {
                    tracing::error!(%error, "failed to dispatch change");
                }
                if let Err(error) = state.schedule_flush().await {
                    tracing::error!(%error, "failed to flush pending comparisons");
                }
            });
        }
    }
}

//! Collaborator traits for the subsystems this crate treats as external:
//! the tree builder (remote `l10n.ini` discovery), the build system (reload
//! and comparison buildset submission), and push history (revision
//! resolution at a cutoff time).
//!
//! The scheduler core depends only on these traits. Production adapters
//! (HTTP/process-backed) live in `collaborators::http`; tests substitute the
//! in-memory fakes in `test_support`.

use async_trait::async_trait;

use crate::buildset::Buildset;
use crate::change::Change;
use crate::tree::Tree;

/// Loads the remote `l10n.ini` graph for a tree and assembles a [`Tree`].
///
/// Implementations are expected to recursively follow `includes.*` /
/// `include_<title>` sections (possibly across repos) and, when a tree's
/// configured locale list is `"all"`, fetch the all-locales manifest too —
/// all per §4.5 / §6.
#[async_trait]
pub trait TreeBuilder: Send + Sync {
    /// Fetches and parses the tree named `name` from the tree-registry
    /// file's `repo`/`mozilla`/`l10n.ini` triple. `triggering` is `Some` when
    /// this call is a reload provoked by an `l10n.ini` change rather than
    /// the startup load.
    async fn load_tree(
        &self,
        name: &str,
        triggering: Option<&Change>,
    ) -> Result<Tree, anyhow::Error>;

    /// Fetches the newline-separated `all-locales` manifest at `path` within
    /// `tree`'s source branch, returning the parsed locale codes.
    async fn fetch_all_locales(
        &self,
        tree: &Tree,
        path: &str,
    ) -> Result<Vec<String>, anyhow::Error>;
}

/// Accepts buildsets (both reload and comparison) destined for the external
/// build system.
#[async_trait]
pub trait ComparisonBuilder: Send + Sync {
    /// Submits `buildset` and waits for the external system to accept or
    /// finish it. A reload's "completion" is what releases the Gate (§4.2);
    /// failure is still a completion (§5's cancellation policy), so this
    /// returns `Ok(())` even when the submission's own result is a build
    /// failure — only transport/submission errors are `Err`.
    async fn submit(&self, buildset: Buildset) -> Result<(), anyhow::Error>;
}

/// Resolves the latest revision on the `"default"` branch of a repository
/// as of a cutoff time, per §4.4 / §6.
#[async_trait]
pub trait PushHistory: Send + Sync {
    /// Returns a short revision, or the `"default"` sentinel when no
    /// qualifying push exists (or the push database is unreachable — §7
    /// treats that as equivalent to "no prior push").
    async fn latest_revision_on_default(&self, repo_name: &str, cutoff: f64) -> String;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// A single recorded push for [`FakePush`].
    #[derive(Debug, Clone)]
    pub struct Push {
        pub date: f64,
        pub revision: String,
    }

    /// An in-memory [`PushHistory`] fake: `add` records pushes per repo,
    /// `latest_revision_on_default` returns the latest one at or before the
    /// cutoff.
    #[derive(Debug, Default)]
    pub struct FakePush {
        pushes: Mutex<BTreeMap<String, Vec<Push>>>,
    }

    impl FakePush {
        pub fn add(&mut self, repo: &str, push: Push) {
            self.pushes
                .get_mut()
                .unwrap()
                .entry(repo.to_string())
                .or_default()
                .push(push);
        }
    }

    #[async_trait]
    impl PushHistory for FakePush {
        async fn latest_revision_on_default(&self, repo_name: &str, cutoff: f64) -> String {
            let pushes = self.pushes.lock().unwrap();
            pushes
                .get(repo_name)
                .into_iter()
                .flatten()
                .filter(|p| p.date <= cutoff)
                .max_by(|a, b| a.date.partial_cmp(&b.date).unwrap())
                .map(|p| p.revision.clone())
                .unwrap_or_else(|| "default".to_string())
        }
    }

    /// An in-memory [`TreeBuilder`] fake driven entirely by pre-seeded
    /// trees and manifests; never touches the network.
    #[derive(Debug, Default)]
    pub struct FakeTreeBuilder {
        trees: Mutex<BTreeMap<String, Tree>>,
        all_locales: Mutex<BTreeMap<String, Vec<String>>>,
        pub fail: Mutex<Vec<String>>,
    }

    impl FakeTreeBuilder {
        pub fn seed_tree(&self, tree: Tree) {
            self.trees.lock().unwrap().insert(tree.name.clone(), tree);
        }

        pub fn seed_all_locales(&self, path: &str, locales: Vec<String>) {
            self.all_locales
                .lock()
                .unwrap()
                .insert(path.to_string(), locales);
        }

        pub fn fail_next(&self, name: &str) {
            self.fail.lock().unwrap().push(name.to_string());
        }
    }

    #[async_trait]
    impl TreeBuilder for FakeTreeBuilder {
        async fn load_tree(
            &self,
            name: &str,
            _triggering: Option<&Change>,
        ) -> Result<Tree, anyhow::Error> {
            if let Some(pos) = self.fail.lock().unwrap().iter().position(|n| n == name) {
                self.fail.lock().unwrap().remove(pos);
                anyhow::bail!("simulated load failure for {name}");
            }
            self.trees
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no seeded tree named {name}"))
        }

        async fn fetch_all_locales(
            &self,
            _tree: &Tree,
            path: &str,
        ) -> Result<Vec<String>, anyhow::Error> {
            self.all_locales
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no seeded all-locales manifest at {path}"))
        }
    }

    /// An in-memory [`ComparisonBuilder`] fake that just records every
    /// buildset it was handed, in submission order.
    #[derive(Debug, Default)]
    pub struct RecordingBuilder {
        pub submitted: Mutex<Vec<Buildset>>,
    }

    #[async_trait]
    impl ComparisonBuilder for RecordingBuilder {
        async fn submit(&self, buildset: Buildset) -> Result<(), anyhow::Error> {
            self.submitted.lock().unwrap().push(buildset);
            Ok(())
        }
    }
}

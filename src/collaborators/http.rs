//! HTTP/process-backed collaborator implementations. These are the
//! production adapters behind the traits in `external.rs`; tests use the
//! in-memory fakes in `external::test_support` instead.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use ini::Ini;
use serde::Deserialize;

use crate::buildset::{normalize_revision, Buildset, DEFAULT_REVISION};
use crate::change::Change;
use crate::external::{ComparisonBuilder, PushHistory, TreeBuilder};
use crate::loader::{LocalesSpec, TreeRegistryEntry};
use crate::tree::Tree;

fn raw_file_url(repo: &str, branch: &str, path: &str) -> String {
    let repo = repo.trim_end_matches('/');
    format!("{repo}/{branch}/raw-file/default/{path}")
}

/// Fetches and parses the `l10n.ini` graph for each tree named in the
/// tree-registry file, following `includes.*` / `include_<title>` sections
/// (possibly across repos), per §4.5 / §6.
pub struct HttpTreeBuilder {
    client: reqwest::Client,
    entries: BTreeMap<String, TreeRegistryEntry>,
}

impl HttpTreeBuilder {
    pub fn new(client: reqwest::Client, entries: Vec<TreeRegistryEntry>) -> Self {
        HttpTreeBuilder {
            client,
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    async fn fetch_text(&self, repo: &str, branch: &str, path: &str) -> Result<String, anyhow::Error> {
        let url = raw_file_url(repo, branch, path);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    fn load_ini_recursive<'a>(
        &'a self,
        tree: &'a mut Tree,
        branch: String,
        repo: String,
        path: String,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<(), anyhow::Error>> {
        async move {
            let key = format!("{repo}#{branch}#{path}");
            if !visited.insert(key) {
                return Ok(());
            }

            let content = self.fetch_text(&repo, &branch, &path).await?;
            let ini = Ini::load_from_str(&content)?;
            tree.add_ini(branch.clone(), path.clone());

            if let Some(general) = ini.section(Some("general")) {
                if let Some(all) = general.get("all") {
                    tree.all_locales = Some(all.to_string());
                }
            }

            if let Some(compare) = ini.section(Some("compare")) {
                if let Some(dirs) = compare.get("dirs") {
                    tree.add_dirs(branch.clone(), dirs.split_whitespace().map(str::to_string));
                }
                if let Some(tld) = compare.get("tld") {
                    tree.tld = Some(tld.to_string());
                }
            }

            if let Some(extras) = ini.section(Some("extras")) {
                if let Some(dirs) = extras.get("dirs") {
                    tree.add_dirs(branch.clone(), dirs.split_whitespace().map(str::to_string));
                }
            }

            let includes: Vec<(String, String)> = ini
                .section(Some("includes"))
                .map(|section| {
                    section
                        .iter()
                        .map(|(title, path)| (title.to_string(), path.to_string()))
                        .collect()
                })
                .unwrap_or_default();

            for (title, include_path) in includes {
                let override_section = ini.section(Some(format!("include_{title}")));
                let (inc_repo, inc_branch, inc_path) = match override_section {
                    Some(section) => (
                        section.get("repo").unwrap_or(&repo).to_string(),
                        section.get("mozilla").unwrap_or(&branch).to_string(),
                        section
                            .get("l10n.ini")
                            .unwrap_or(&include_path)
                            .to_string(),
                    ),
                    None => (repo.clone(), branch.clone(), include_path.clone()),
                };

                self.load_ini_recursive(tree, inc_branch, inc_repo, inc_path, visited)
                    .await?;
            }

            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl TreeBuilder for HttpTreeBuilder {
    async fn load_tree(
        &self,
        name: &str,
        _triggering: Option<&Change>,
    ) -> Result<Tree, anyhow::Error> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("tree '{name}' is not in the tree-registry file"))?;

        let mut tree = Tree::new(entry.name.clone(), entry.repo.clone());
        tree.branches.insert("en".to_string(), entry.mozilla.clone());
        tree.branches.insert("l10n".to_string(), entry.l10n.clone());

        let mut visited = HashSet::new();
        self.load_ini_recursive(
            &mut tree,
            entry.mozilla.clone(),
            entry.repo.clone(),
            entry.l10n_ini.clone(),
            &mut visited,
        )
        .await?;

        if let LocalesSpec::Fixed(locales) = &entry.locales {
            tree.locales = locales.clone();
        }
        // LocalesSpec::All leaves `tree.locales` empty; the scheduler fetches
        // the all-locales manifest once `tree.all_locales` lands in the
        // derived index (§4.3 `checkEnUS`, §4.5).

        Ok(tree)
    }

    async fn fetch_all_locales(&self, tree: &Tree, path: &str) -> Result<Vec<String>, anyhow::Error> {
        let branch = tree
            .en_branch()
            .ok_or_else(|| anyhow::anyhow!("tree '{}' has no en branch", tree.name))?;
        let content = self.fetch_text(&tree.repo, branch, path).await?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ChangesetEntry {
    node: String,
    #[serde(default)]
    branch: String,
}

#[derive(Debug, Deserialize)]
struct PushLogEntry {
    date: f64,
    #[serde(default)]
    changesets: Vec<ChangesetEntry>,
}

impl PushLogEntry {
    /// The latest changeset in this push that landed on `"default"` (§4.4:
    /// "the latest changeset on `default`" — a push can contain changesets
    /// on other branches, e.g. a merge).
    fn latest_default_changeset(&self) -> Option<&str> {
        self.changesets
            .iter()
            .filter(|c| c.branch.is_empty() || c.branch == "default")
            .last()
            .map(|c| c.node.as_str())
    }
}

/// Queries a Mercurial-style `json-pushes` endpoint for the latest revision
/// on a repository's default branch at or before a cutoff time.
pub struct HttpPushHistory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPushHistory {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        HttpPushHistory {
            client,
            base_url: base_url.into(),
        }
    }

    async fn query(&self, repo_name: &str, cutoff: f64) -> Result<Option<String>, anyhow::Error> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/{repo_name}/json-pushes?full=1");
        let pushes: BTreeMap<String, PushLogEntry> =
            self.client.get(&url).send().await?.error_for_status()?.json().await?;

        Ok(pushes
            .values()
            .filter(|entry| entry.date <= cutoff && entry.latest_default_changeset().is_some())
            .max_by(|a, b| a.date.partial_cmp(&b.date).unwrap())
            .and_then(|entry| entry.latest_default_changeset())
            .map(str::to_string))
    }
}

#[async_trait]
impl PushHistory for HttpPushHistory {
    async fn latest_revision_on_default(&self, repo_name: &str, cutoff: f64) -> String {
        match self.query(repo_name, cutoff).await {
            Ok(Some(revision)) => normalize_revision(&revision).to_string(),
            Ok(None) => DEFAULT_REVISION.to_string(),
            Err(error) => {
                tracing::warn!(repo = repo_name, %error, "push history lookup failed; treating as no prior push");
                DEFAULT_REVISION.to_string()
            }
        }
    }
}

/// Submits reload and comparison buildsets to the external build system over
/// HTTP as JSON POSTs.
pub struct HttpComparisonBuilder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpComparisonBuilder {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        HttpComparisonBuilder {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ComparisonBuilder for HttpComparisonBuilder {
    async fn submit(&self, buildset: Buildset) -> Result<(), anyhow::Error> {
        self.client
            .post(&self.endpoint)
            .json(&buildset)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

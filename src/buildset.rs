//! Buildset construction: turning a `(tree, locale, changes)` triple (or a
//! reload request) into the property-bagged unit of work the external build
//! system consumes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::change::Change;
use crate::external::PushHistory;
use crate::tree::Tree;

/// The sentinel meaning "tip of default branch" / "no prior push".
pub const DEFAULT_REVISION: &str = "default";

/// A historical sentinel some change sources emit for an empty repository;
/// normalized to [`DEFAULT_REVISION`] wherever it's observed.
const EMPTY_REPO_SENTINEL: &str = "000000000000";

/// Normalizes a revision string coming from an external system: the
/// all-zero sentinel some historical variants produce is folded into the
/// `"default"` sentinel this crate emits everywhere else.
pub fn normalize_revision(revision: &str) -> &str {
    if revision == EMPTY_REPO_SENTINEL {
        DEFAULT_REVISION
    } else {
        revision
    }
}

/// What kind of unit of work a [`Buildset`] represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildsetKind {
    /// A configuration-reload request for one tree, submitted to the tree
    /// builder.
    Reload { tree: String },
    /// A per-locale comparison request, submitted to the comparison
    /// builder.
    Comparison { tree: String, locale: String },
}

/// A property value plus the component that set it, mirroring the
/// `{value, source}` pairs buildbot-style systems expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub value: JsonValue,
    pub source: String,
}

impl Property {
    pub fn new(value: impl Into<JsonValue>, source: impl Into<String>) -> Self {
        Property {
            value: value.into(),
            source: source.into(),
        }
    }
}

/// The source stamp: which branch this work is pinned against, and the
/// changes that justified scheduling it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStamp {
    pub branch: String,
    pub changes: Vec<Change>,
    pub revision: Option<String>,
}

/// A unit of work submitted to the external build system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Buildset {
    pub builders: Vec<String>,
    pub source_stamp: SourceStamp,
    pub properties: BTreeMap<String, Property>,
    pub reason: Option<String>,
    pub kind: BuildsetKind,
}

impl Buildset {
    /// Builds the reload buildset submitted by the tree loader driver for
    /// one tree (either at startup or because an `l10n.ini` changed).
    pub fn reload(tree_name: &str, triggering: Option<&Change>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            "tree".to_string(),
            Property::new(JsonValue::String(tree_name.to_string()), "scheduler"),
        );

        let changes = triggering.cloned().into_iter().collect();
        Buildset {
            builders: vec!["tree-builder".to_string()],
            source_stamp: SourceStamp {
                branch: triggering
                    .map(|c| c.branch.clone())
                    .unwrap_or_default(),
                changes,
                revision: None,
            },
            properties,
            reason: Some(format!("reload tree {tree_name}")),
            kind: BuildsetKind::Reload {
                tree: tree_name.to_string(),
            },
        }
    }

    /// Builds the comparison buildset for `(tree, locale)` given the
    /// accumulated changes, resolving per-role revisions against the push
    /// history at the latest change timestamp. See §4.4.
    pub async fn comparison(
        tree: &Tree,
        locale: &str,
        changes: Vec<Change>,
        push_history: &dyn PushHistory,
    ) -> Buildset {
        let when = changes
            .iter()
            .filter_map(|c| c.timestamp)
            .fold(None, |acc: Option<f64>, ts| {
                Some(acc.map_or(ts, |acc| acc.max(ts)))
            });

        let mut properties = BTreeMap::new();
        let mut role_names = Vec::new();

        for (role, branch) in &tree.branches {
            role_names.push(role.clone());

            let repo = if role == "l10n" {
                format!("{branch}/{locale}")
            } else {
                branch.clone()
            };

            let resolved = match when {
                Some(cutoff) => {
                    let revision = push_history.latest_revision_on_default(&repo, cutoff).await;
                    normalize_revision(&revision).to_string()
                }
                None => DEFAULT_REVISION.to_string(),
            };

            properties.insert(
                format!("{role}_branch"),
                Property::new(JsonValue::String(branch.clone()), "scheduler"),
            );
            properties.insert(
                format!("{role}_revision"),
                Property::new(JsonValue::String(resolved), "scheduler"),
            );
        }

        role_names.sort();

        properties.insert(
            "tree".to_string(),
            Property::new(JsonValue::String(tree.name.clone()), "scheduler"),
        );
        properties.insert(
            "locale".to_string(),
            Property::new(JsonValue::String(locale.to_string()), "scheduler"),
        );

        let l10n_ini = tree
            .en_branch()
            .and_then(|en| tree.l10ninis.get(en))
            .and_then(|inis| inis.first())
            .cloned()
            .unwrap_or_default();
        properties.insert(
            "l10n.ini".to_string(),
            Property::new(JsonValue::String(l10n_ini), "scheduler"),
        );
        properties.insert(
            "revisions".to_string(),
            Property::new(
                JsonValue::Array(role_names.into_iter().map(JsonValue::String).collect()),
                "scheduler",
            ),
        );

        let branch = tree.en_branch().unwrap_or_default().to_string();

        Buildset {
            builders: vec!["comparison-builder".to_string()],
            source_stamp: SourceStamp {
                branch,
                changes,
                revision: None,
            },
            properties,
            reason: Some(format!("compare {} / {}", tree.name, locale)),
            kind: BuildsetKind::Comparison {
                tree: tree.name.clone(),
                locale: locale.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::test_support::{FakePush, Push};

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
    fn normalizes_legacy_sentinel() {
        assert_eq!(normalize_revision("000000000000"), "default");
        assert_eq!(normalize_revision("abc123"), "abc123");
    }

    #[tokio::test]
    async fn comparison_without_timestamp_uses_default_sentinel() {
        let tree = sample_tree();
        let changes = vec![Change::new(1, "l10n-test", vec!["a".into()])];
        let push = FakePush::default();

        let buildset = Buildset::comparison(&tree, "de", changes, &push).await;

        assert_eq!(
            buildset.properties["en_revision"].value,
            JsonValue::String("default".into())
        );
        assert_eq!(
            buildset.properties["l10n_revision"].value,
            JsonValue::String("default".into())
        );
        assert_eq!(
            buildset.properties["tree"].value,
            JsonValue::String("test".into())
        );
        assert_eq!(
            buildset.properties["revisions"].value,
            JsonValue::Array(vec!["en".into(), "l10n".into()])
        );
    }

    #[tokio::test]
    async fn comparison_resolves_revisions_at_cutoff() {
        let tree = sample_tree();
        let changes = vec![Change::new(1, "l10n-test", vec!["a".into()]).with_timestamp(100.0)];

        let mut push = FakePush::default();
        push.add("test-branch", Push { date: 90.0, revision: "aaa111".into() });
        push.add("test-branch", Push { date: 150.0, revision: "zzz999".into() });
        push.add("l10n-test/de", Push { date: 95.0, revision: "bbb222".into() });

        let buildset = Buildset::comparison(&tree, "de", changes, &push).await;

        assert_eq!(
            buildset.properties["en_revision"].value,
            JsonValue::String("aaa111".into())
        );
        assert_eq!(
            buildset.properties["l10n_revision"].value,
            JsonValue::String("bbb222".into())
        );
    }

    #[tokio::test]
    async fn comparison_normalizes_empty_repo_sentinel() {
        let tree = sample_tree();
        let changes = vec![Change::new(1, "l10n-test", vec!["a".into()]).with_timestamp(100.0)];

        let mut push = FakePush::default();
        push.add(
            "test-branch",
            Push {
                date: 50.0,
                revision: "000000000000".into(),
            },
        );

        let buildset = Buildset::comparison(&tree, "de", changes, &push).await;
        assert_eq!(
            buildset.properties["en_revision"].value,
            JsonValue::String("default".into())
        );
    }

    #[test]
    fn reload_buildset_carries_triggering_change() {
        let change = Change::new(7, "test-branch", vec!["test-app/locales/l10n.ini".into()]);
        let buildset = Buildset::reload("test", Some(&change));
        assert_eq!(buildset.source_stamp.changes, vec![change]);
        assert_eq!(
            buildset.kind,
            BuildsetKind::Reload {
                tree: "test".to_string()
            }
        );
    }
}

//! The tree-registry file: the one piece of on-disk configuration the
//! scheduler reads directly (everything else — the `l10n.ini` graph itself
//! — is the tree builder collaborator's job, since fetching it is the part
//! that varies by deployment).

use std::path::Path;

use ini::Ini;

use crate::error::SchedulerError;

/// What a tree section's `locales` key asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalesSpec {
    /// `locales = all`: the tree builder must fetch the all-locales
    /// manifest named in the tree's `l10n.ini` to learn the locale set.
    All,
    /// `locales = de fr ja ...`: the fixed locale set to use as-is.
    Fixed(Vec<String>),
}

/// One `[<tree-name>]` section of the tree-registry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRegistryEntry {
    pub name: String,
    pub repo: String,
    pub mozilla: String,
    pub l10n: String,
    pub l10n_ini: String,
    pub locales: LocalesSpec,
}

/// Parses the tree-registry file into one entry per section. Every section
/// must carry `repo`, `mozilla`, `l10n`, `l10n.ini`, and `locales`; a
/// section missing any of them is a configuration error, not something to
/// silently skip.
pub fn parse_tree_registry_file(path: &Path) -> Result<Vec<TreeRegistryEntry>, SchedulerError> {
    let ini = Ini::load_from_file(path).map_err(|source| SchedulerError::TreeRegistryFile {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, source.to_string()),
    })?;

    let mut entries = Vec::new();
    for (section, properties) in ini.iter() {
        let Some(name) = section else { continue };

        let required = |key: &str| -> Result<String, SchedulerError> {
            properties
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| SchedulerError::TreeRegistrySection {
                    section: name.to_string(),
                    reason: format!("missing required key '{key}'"),
                })
        };

        let locales = match properties.get("locales") {
            Some("all") => LocalesSpec::All,
            Some(list) => LocalesSpec::Fixed(
                list.split_whitespace().map(str::to_string).collect(),
            ),
            None => {
                return Err(SchedulerError::TreeRegistrySection {
                    section: name.to_string(),
                    reason: "missing required key 'locales'".to_string(),
                })
            }
        };

        entries.push(TreeRegistryEntry {
            name: name.to_string(),
            repo: required("repo")?,
            mozilla: required("mozilla")?,
            l10n: required("l10n")?,
            l10n_ini: required("l10n.ini")?,
            locales,
        });
    }

    Ok(entries)
}

//! The immutable change record ingested from the (external) change source,
//! and the small amount of locale-resolution logic that sits right at the
//! dispatcher's front door.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single push/commit observed on either the source (en-US) branch family
/// or one of the per-locale branches.
///
/// This is produced by an external change source (a push-database poller)
/// and is treated as opaque data by everything in this crate except the
/// dispatcher and buildset submitter. The `Deserialize` impl is what lets
/// the CLI harness read change records as newline-delimited JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Monotonically assigned change number from the change source.
    pub number: u64,
    pub who: String,
    pub revision: String,
    pub comment: String,
    /// UTC seconds since epoch, with sub-second precision.
    pub timestamp: Option<f64>,
    /// The branch this change landed on (a source branch or an l10n branch).
    pub branch: String,
    /// Repo-relative paths touched by this change.
    pub files: Vec<String>,
    /// Locale code, when already known to the change source.
    pub locale: Option<String>,
    /// Free-form property bag; some change sources stash `locale` here
    /// instead of as a first-class field.
    pub properties: HashMap<String, String>,
}

impl Change {
    pub fn new(number: u64, branch: impl Into<String>, files: Vec<String>) -> Self {
        Change {
            number,
            who: String::new(),
            revision: String::new(),
            comment: String::new(),
            timestamp: None,
            branch: branch.into(),
            files,
            locale: None,
            properties: HashMap::new(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Resolves where (if anywhere) this change's locale came from.
    ///
    /// The historical change source checks for a `locale` attribute first
    /// and only falls back to the property bag when it's absent; we keep
    /// that order here rather than merging the two into one lookup so the
    /// provenance survives for logging.
    pub fn locale_origin(&self) -> LocaleOrigin<'_> {
        if let Some(locale) = self.locale.as_deref() {
            LocaleOrigin::Present(locale)
        } else if let Some(locale) = self.properties.get("locale") {
            LocaleOrigin::FromProperties(locale)
        } else {
            LocaleOrigin::Absent
        }
    }

    /// Convenience accessor used by the dispatcher: is this an l10n-side
    /// change (has a locale, from either source) or a source-side change?
    pub fn resolved_locale(&self) -> Option<&str> {
        match self.locale_origin() {
            LocaleOrigin::Present(l) | LocaleOrigin::FromProperties(l) => Some(l),
            LocaleOrigin::Absent => None,
        }
    }
}

/// Where a change's locale attribute came from, resolved once at dispatch
/// entry rather than re-derived at each call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleOrigin<'a> {
    Present(&'a str),
    FromProperties(&'a str),
    Absent,
}

impl LocaleOrigin<'_> {
    pub fn is_l10n_change(&self) -> bool {
        !matches!(self, LocaleOrigin::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_present_directly() {
        let change = Change::new(1, "l10n-test", vec!["a".into()]).with_locale("de");
        assert_eq!(change.locale_origin(), LocaleOrigin::Present("de"));
        assert!(change.locale_origin().is_l10n_change());
    }

    #[test]
    fn locale_from_properties_when_field_absent() {
        let change =
            Change::new(1, "l10n-test", vec!["a".into()]).with_property("locale", "fr");
        assert_eq!(change.locale_origin(), LocaleOrigin::FromProperties("fr"));
    }

    #[test]
    fn absent_locale_is_source_change() {
        let change = Change::new(1, "test-branch", vec!["a".into()]);
        assert_eq!(change.locale_origin(), LocaleOrigin::Absent);
        assert!(!change.locale_origin().is_l10n_change());
    }

    #[test]
    fn direct_field_takes_precedence_over_properties() {
        let change = Change::new(1, "l10n-test", vec!["a".into()])
            .with_locale("de")
            .with_property("locale", "fr");
        assert_eq!(change.locale_origin(), LocaleOrigin::Present("de"));
    }
}

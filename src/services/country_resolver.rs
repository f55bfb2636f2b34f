//! Country Resolver: ISIN to ISO-3166 alpha-2 country code.
//!
//! Three-tier lookup: explicit override (case-insensitive ISIN key) → first
//! two characters of the ISIN → `"XX"` (unknown). Overrides are persisted as
//! a JSON document; `add_override`/`remove_override` rewrite it in place.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountrySource {
    Override,
    Isin,
    Unknown,
}

impl CountrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountrySource::Override => "override",
            CountrySource::Isin => "isin",
            CountrySource::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OverrideEntry {
    country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

/// Either `{country_code, name?, note?}` or the shorthand `"CC"` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawOverrideValue {
    Full(OverrideEntry),
    Shorthand(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct OverridesDocument {
    #[serde(default)]
    overrides: HashMap<String, RawOverrideValue>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

pub struct CountryResolver {
    path: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

impl CountryResolver {
    /// Load overrides from `path`. A missing or unparsable file yields an
    /// empty override set rather than failing the resolver's construction.
    pub fn load(path: Option<&Path>) -> Self {
        let mut overrides = HashMap::new();

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<OverridesDocument>(&content) {
                    Ok(doc) => {
                        for (isin, value) in doc.overrides {
                            let code = match value {
                                RawOverrideValue::Full(entry) => entry.country_code,
                                RawOverrideValue::Shorthand(code) => code,
                            };
                            overrides.insert(isin.to_uppercase(), code.to_uppercase());
                        }
                    }
                    Err(e) => log::info!("could not parse country overrides {:?}: {}", path, e),
                },
                Err(e) => log::info!("could not load country overrides {:?}: {}", path, e),
            }
        }

        Self {
            path: path.map(Path::to_path_buf),
            overrides,
        }
    }

    /// Three-tier resolution: override → first two ISIN characters → "XX".
    pub fn resolve(&self, isin: &str) -> (String, CountrySource) {
        if isin.is_empty() {
            return ("XX".to_string(), CountrySource::Unknown);
        }

        let isin_upper = isin.to_uppercase();
        if let Some(code) = self.overrides.get(&isin_upper) {
            return (code.clone(), CountrySource::Override);
        }

        if isin.len() >= 2 {
            return (isin_upper[..2].to_string(), CountrySource::Isin);
        }

        ("XX".to_string(), CountrySource::Unknown)
    }

    pub fn has_override(&self, isin: &str) -> bool {
        self.overrides.contains_key(&isin.to_uppercase())
    }

    /// Add or replace an override, updating the in-memory map and, if a
    /// path was supplied at load time, rewriting the override file.
    pub fn add_override(
        &mut self,
        isin: &str,
        country_code: &str,
        name: Option<&str>,
        note: Option<&str>,
    ) -> Result<()> {
        let isin_upper = isin.to_uppercase();
        let country_upper = country_code.to_uppercase();
        self.overrides.insert(isin_upper.clone(), country_upper.clone());

        if let Some(path) = self.path.clone() {
            self.rewrite_file(&path, |doc| {
                doc.overrides.insert(
                    isin_upper.clone(),
                    RawOverrideValue::Full(OverrideEntry {
                        country_code: country_upper.clone(),
                        name: name.map(str::to_string),
                        note: note.map(str::to_string),
                    }),
                );
            })?;
        }
        Ok(())
    }

    pub fn remove_override(&mut self, isin: &str) -> Result<()> {
        let isin_upper = isin.to_uppercase();
        self.overrides.remove(&isin_upper);

        if let Some(path) = self.path.clone() {
            self.rewrite_file(&path, |doc| {
                doc.overrides.remove(&isin_upper);
            })?;
        }
        Ok(())
    }

    fn rewrite_file(
        &self,
        path: &Path,
        mutate: impl FnOnce(&mut OverridesDocument),
    ) -> Result<()> {
        let mut doc = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => OverridesDocument::default(),
        };
        mutate(&mut doc);
        let serialized = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_isin_is_unknown() {
        let resolver = CountryResolver::load(None);
        assert_eq!(resolver.resolve(""), ("XX".to_string(), CountrySource::Unknown));
    }

    #[test]
    fn falls_back_to_isin_prefix() {
        let resolver = CountryResolver::load(None);
        assert_eq!(
            resolver.resolve("US0378331005"),
            ("US".to_string(), CountrySource::Isin)
        );
    }

    #[test]
    fn override_takes_precedence_and_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(
            &path,
            r#"{"overrides": {"us0378331005": {"country_code": "ie"}}}"#,
        )
        .unwrap();

        let resolver = CountryResolver::load(Some(&path));
        assert_eq!(
            resolver.resolve("US0378331005"),
            ("IE".to_string(), CountrySource::Override)
        );
    }

    #[test]
    fn shorthand_override_form_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(&path, r#"{"overrides": {"IE00ABCDEF12": "ie"}}"#).unwrap();

        let resolver = CountryResolver::load(Some(&path));
        assert_eq!(
            resolver.resolve("IE00ABCDEF12"),
            ("IE".to_string(), CountrySource::Override)
        );
    }

    #[test]
    fn add_override_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        let mut resolver = CountryResolver::load(Some(&path));

        resolver
            .add_override("US0378331005", "ie", Some("Example ADR"), None)
            .unwrap();
        assert_eq!(
            resolver.resolve("us0378331005"),
            ("IE".to_string(), CountrySource::Override)
        );

        let reloaded = CountryResolver::load(Some(&path));
        assert_eq!(
            reloaded.resolve("US0378331005"),
            ("IE".to_string(), CountrySource::Override)
        );
    }

    #[test]
    fn remove_override_falls_back_to_isin_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(&path, r#"{"overrides": {"US0378331005": "IE"}}"#).unwrap();

        let mut resolver = CountryResolver::load(Some(&path));
        resolver.remove_override("US0378331005").unwrap();
        assert_eq!(
            resolver.resolve("US0378331005"),
            ("US".to_string(), CountrySource::Isin)
        );
    }

    #[test]
    fn missing_overrides_file_is_not_fatal() {
        let resolver = CountryResolver::load(Some(Path::new("/nonexistent/overrides.json")));
        assert!(!resolver.has_override("US0378331005"));
    }
}

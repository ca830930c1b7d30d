//! Keyed array declarations
//!
//! Provides [`KeyedArrays`] for mapping array field paths to the identity
//! field their elements are matched on.

use std::collections::BTreeMap;

use mkt_document::FieldPath;

/// Identity fields for arrays of objects, keyed by dotted path
///
/// Paths skip array positions: `goals.kpis` names the `kpis` array inside
/// every element of `goals`. Arrays without an entry are replaced wholesale.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyedArrays {
    identities: BTreeMap<String, String>,
}

impl KeyedArrays {
    /// Create an empty declaration set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            identities: BTreeMap::new(),
        }
    }

    /// Declare `path` as keyed by `identity`
    #[inline]
    #[must_use]
    pub fn with(mut self, path: &str, identity: &str) -> Self {
        self.register(path, identity);
        self
    }

    /// Declare `path` as keyed by `identity`
    pub fn register(&mut self, path: &str, identity: &str) {
        self.identities.insert(path.to_string(), identity.to_string());
    }

    /// Identity field for an array path, if declared
    #[inline]
    #[must_use]
    pub fn identity_for(&self, path: &FieldPath) -> Option<&str> {
        self.identities.get(&path.to_string()).map(String::as_str)
    }

    /// Identity field for a dotted path string
    #[inline]
    #[must_use]
    pub fn identity_for_str(&self, path: &str) -> Option<&str> {
        self.identities.get(path).map(String::as_str)
    }

    /// Declared paths and their identity fields
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.identities
            .iter()
            .map(|(path, identity)| (path.as_str(), identity.as_str()))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for KeyedArrays {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        let mut arrays = Self::new();
        for (path, identity) in iter {
            arrays.register(path, identity);
        }
        arrays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_path() {
        let arrays = KeyedArrays::new()
            .with("goals", "type")
            .with("goals.kpis", "metricName");

        let nested = FieldPath::single("goals").child("kpis");
        assert_eq!(arrays.identity_for(&nested), Some("metricName"));
        assert_eq!(arrays.identity_for_str("goals"), Some("type"));
        assert_eq!(arrays.identity_for_str("kpis"), None);
    }

    #[test]
    fn collect_from_pairs() {
        let arrays: KeyedArrays = [("audience", "segment"), ("contentMix", "category")]
            .into_iter()
            .collect();
        assert_eq!(arrays.len(), 2);
        assert!(!arrays.is_empty());
    }
}

//! The set of configuration keys a probe reads.

use std::collections::HashSet;

/// Keys to probe. Duplicate keys are ignored; iteration order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfigurationOptions {
    keys: HashSet<String>,
}

impl AppConfigurationOptions {
    /// Empty key set; the probe reports healthy without reading anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key to be checked. Chainable.
    pub fn add_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.keys.insert(key.into());
        self
    }

    /// Configured keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Whether `key` will be read.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no keys are configured.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AppConfigurationOptions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_key_chains_and_deduplicates() {
        let mut options = AppConfigurationOptions::new();
        options.add_key("a").add_key("b").add_key("a");

        assert_eq!(options.len(), 2);
        assert!(options.contains("a"));
        assert!(options.contains("b"));
    }

    #[test]
    fn empty_by_default() {
        let options = AppConfigurationOptions::default();
        assert!(options.is_empty());
        assert_eq!(options.keys().count(), 0);
    }

    #[test]
    fn keys_are_not_validated() {
        let mut options = AppConfigurationOptions::new();
        options.add_key("").add_key("with spaces/and:colons");
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn collects_from_iterator() {
        let options: AppConfigurationOptions = ["x", "y", "x"].into_iter().collect();
        let mut keys: Vec<_> = options.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["x", "y"]);
    }
}

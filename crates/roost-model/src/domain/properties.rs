use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque key/value property bag.
///
/// Used for spawn options, custom options, spawner custom properties and finalization data.
/// Keys are kept sorted so the argument list built from a bag is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a bag containing a single key–value pair.
    pub fn single<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut p = Self::new();
        p.insert(key, value);
        p
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Combine two bags; entries from `other` replace entries with the same key.
    pub fn merged(&self, other: &Properties) -> Properties {
        let mut out = self.0.clone();
        out.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Properties(out)
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::Properties;

    #[test]
    fn single_creates_one_entry() {
        let p = Properties::single("map", "arena");
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("map"), Some("arena"));
        assert!(p.get("mode").is_none());
    }

    #[test]
    fn merged_other_overrides_base() {
        let base: Properties = [("map", "arena"), ("players", "8")].into_iter().collect();
        let other: Properties = [("map", "desert"), ("mode", "ctf")].into_iter().collect();

        let merged = base.merged(&other);

        assert_eq!(merged.get("map"), Some("desert"));
        assert_eq!(merged.get("players"), Some("8"));
        assert_eq!(merged.get("mode"), Some("ctf"));
        assert_eq!(base.get("map"), Some("arena"));
    }

    #[test]
    fn serializes_as_plain_object() {
        let p: Properties = [("b", "2"), ("a", "1")].into_iter().collect();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"a":"1","b":"2"}"#);

        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}

use std::collections::BTreeMap;
use std::iter::FromIterator;
use std::ops::{Deref, DerefMut};

/// Environment variables, kept in a `BTreeMap` so rendering always emits
/// them in the same order regardless of the map's insertion order — part
/// of the byte-stable-output invariant.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvVars(pub BTreeMap<String, String>);

impl Deref for EnvVars {
    type Target = BTreeMap<String, String>;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl DerefMut for EnvVars {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.0 }
}

impl IntoIterator for EnvVars {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;
    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a EnvVars {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

impl FromIterator<(String, String)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        EnvVars(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_sorted_order() {
        let mut e = EnvVars::default();
        e.insert("ZEBRA".into(), "1".into());
        e.insert("APPLE".into(), "2".into());
        let keys: Vec<&String> = e.keys().collect();
        assert_eq!(keys, vec!["APPLE", "ZEBRA"]);
    }
}

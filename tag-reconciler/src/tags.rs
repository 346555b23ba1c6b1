//! Tag sets and the additive merge of managed tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key carrying the application identifier, matched ignoring case
pub const APP_ID_TAG: &str = "AppId";

/// Value written when creation time or creator cannot be resolved
pub const UNKNOWN: &str = "NA";

/// Tags attached to one resource.
///
/// Keys keep the casing the platform stores them with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value of the key equal to `key` ignoring ASCII case.
    ///
    /// If several keys differ only by case, the one sorting last wins.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .next_back()
    }

    /// Value of the AppId tag, if the resource carries one
    pub fn app_id(&self) -> Option<&str> {
        self.get_ignore_case(APP_ID_TAG)
    }

    /// Overwrites the managed keys with `values`, leaving every other key untouched.
    pub fn merge(&mut self, keys: &TagKeys, values: ManagedTags) {
        self.insert(&keys.app_name, values.app_name);
        self.insert(&keys.app_id, values.app_id);
        self.insert(&keys.owner, values.owner);
        self.insert(&keys.ctime, values.ctime);
        self.insert(&keys.creator, values.creator);
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Keys of the tags owned by the reconciler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagKeys {
    pub app_name: String,
    pub app_id: String,
    pub owner: String,
    pub ctime: String,
    pub creator: String,
}

impl TagKeys {
    pub fn with_prefix(prefix: &str) -> Self {
        TagKeys {
            app_name: format!("{prefix}appname"),
            app_id: format!("{prefix}appid"),
            owner: format!("{prefix}owner"),
            ctime: format!("{prefix}ctime"),
            creator: format!("{prefix}creator"),
        }
    }

    #[cfg(test)]
    pub fn all(&self) -> [&str; 5] {
        [
            &self.app_name,
            &self.app_id,
            &self.owner,
            &self.ctime,
            &self.creator,
        ]
    }
}

/// Values for the managed tags of one resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedTags {
    pub app_name: String,
    pub app_id: String,
    pub owner: String,
    pub ctime: String,
    pub creator: String,
}

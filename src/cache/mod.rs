//! Durable typed key-value cache.
//!
//! Each save writes a new uniquely named `<type>_<suffix>.cache` file holding
//! a MessagePack `{timestamp, cache_type, payload}` record. Loads pick the
//! newest valid file of the requested type and prune anything unusable on the
//! way.

pub mod store;

pub use store::CacheStore;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// File extension for cache entries.
pub const CACHE_EXTENSION: &str = "cache";

/// What kind of payload a cache entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    MemberList,
    Killboard,
    TextFile,
    Screenshot,
}

impl CacheType {
    pub const ALL: [CacheType; 4] = [
        CacheType::MemberList,
        CacheType::Killboard,
        CacheType::TextFile,
        CacheType::Screenshot,
    ];

    /// Filename prefix, also the serialized tag.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheType::MemberList => "memberlist",
            CacheType::Killboard => "killboard",
            CacheType::TextFile => "textfile",
            CacheType::Screenshot => "screenshot",
        }
    }

    /// Returns true if `file_name` belongs to this type.
    pub fn owns(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.prefix())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|rest| rest.ends_with(&format!(".{}", CACHE_EXTENSION)))
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Which cache types an eviction applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheScope {
    All,
    Only(CacheType),
}

impl CacheScope {
    pub fn types(&self) -> Vec<CacheType> {
        match self {
            CacheScope::All => CacheType::ALL.to_vec(),
            CacheScope::Only(t) => vec![*t],
        }
    }
}

/// A value that can be stored in the cache.
pub trait CachePayload: Serialize + DeserializeOwned {
    /// Empty payloads are not worth persisting.
    fn is_empty_payload(&self) -> bool;
}

impl<K, V> CachePayload for BTreeMap<K, V>
where
    K: Serialize + DeserializeOwned + Ord,
    V: Serialize + DeserializeOwned,
{
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> CachePayload for HashMap<K, V>
where
    K: Serialize + DeserializeOwned + Eq + std::hash::Hash,
    V: Serialize + DeserializeOwned,
{
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl<T> CachePayload for Vec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owns_matches_prefix_and_extension() {
        assert!(CacheType::MemberList.owns("memberlist_20250101_abcd.cache"));
        assert!(!CacheType::MemberList.owns("memberlist_20250101_abcd.json"));
        assert!(!CacheType::MemberList.owns("killboard_20250101_abcd.cache"));
        assert!(!CacheType::TextFile.owns("textfilex_1.cache"));
    }

    #[test]
    fn test_scope_all_lists_every_type() {
        assert_eq!(CacheScope::All.types().len(), 4);
        assert_eq!(
            CacheScope::Only(CacheType::Killboard).types(),
            vec![CacheType::Killboard]
        );
    }

    #[test]
    fn test_tag_serializes_as_prefix() {
        for t in CacheType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.prefix()));
        }
    }
}

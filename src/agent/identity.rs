use serde::{Deserialize, Serialize};
use std::fmt;

/// An identity the broker is willing to authenticate as
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Identity {
    UnixUser { name: String },
    UnixGroup { name: String },
}

impl Identity {
    pub fn unix_user(name: impl Into<String>) -> Self {
        Identity::UnixUser { name: name.into() }
    }

    pub fn unix_group(name: impl Into<String>) -> Self {
        Identity::UnixGroup { name: name.into() }
    }

    /// Only unix users can be prompted for a password
    pub fn is_unix_user(&self) -> bool {
        matches!(self, Identity::UnixUser { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Identity::UnixUser { name } | Identity::UnixGroup { name } => name,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::UnixUser { name } => write!(f, "unix-user:{}", name),
            Identity::UnixGroup { name } => write!(f, "unix-group:{}", name),
        }
    }
}

/// Extra key/value information about the request, in broker order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    entries: Vec<(String, String)>,
}

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Details {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut details = Details::new();
        for (k, v) in iter {
            details.insert(k, v);
        }
        details
    }
}

/// Reduce the broker's identity list to the unix users that can be prompted,
/// dropping duplicates but keeping first-seen order.
pub(crate) fn candidate_users(identities: &[Identity]) -> Vec<Identity> {
    let mut candidates: Vec<Identity> = Vec::with_capacity(identities.len());
    for identity in identities.iter().filter(|i| i.is_unix_user()) {
        if !candidates.contains(identity) {
            candidates.push(identity.clone());
        }
    }
    candidates
}

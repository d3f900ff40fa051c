//! Namespaced, string-valued metadata attached to trials and suggestions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key/value pairs stored under a single namespace.
pub type Namespace = BTreeMap<String, String>;

/// Metadata bag: namespace -> key -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    namespaces: BTreeMap<String, Namespace>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of a namespace, if anything was stored in it.
    pub fn ns(&self, namespace: &str) -> Option<&Namespace> {
        self.namespaces.get(namespace)
    }

    /// Mutable view of a namespace, creating it on first use.
    pub fn ns_mut(&mut self, namespace: &str) -> &mut Namespace {
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&str> {
        self.ns(namespace)
            .and_then(|ns| ns.get(key))
            .map(String::as_str)
    }

    pub fn insert(&mut self, namespace: &str, key: impl Into<String>, value: impl Into<String>) {
        self.ns_mut(namespace).insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.values().all(BTreeMap::is_empty)
    }

    /// Copy every namespace of `other` into `self`, overwriting duplicate keys.
    pub fn merge(&mut self, other: &Metadata) {
        for (namespace, values) in &other.namespaces {
            let target = self.ns_mut(namespace);
            for (key, value) in values {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

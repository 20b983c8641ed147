//! Process-wide cache of network metadata keyed by (exchange, asset).
//!
//! Backed by `DashMap` so the matcher can read while nothing writes; the
//! scanner only inserts between the fetch phase and the matching phase.

use std::sync::Arc;

use common::{ExchangeId, NetworkMap};
use dashmap::DashMap;
use tracing::debug;

use crate::arb::NetworkLookup;

type Key = (ExchangeId, String);

#[derive(Debug, Clone, Default)]
pub struct NetworkCache {
    entries: Arc<DashMap<Key, Arc<NetworkMap>>>,
}

fn key(exchange: ExchangeId, asset: &str) -> Key {
    (exchange, asset.trim().to_ascii_uppercase())
}

impl NetworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, exchange: ExchangeId, asset: &str) -> Option<Arc<NetworkMap>> {
        self.entries
            .get(&key(exchange, asset))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, exchange: ExchangeId, asset: &str) -> bool {
        self.entries.contains_key(&key(exchange, asset))
    }

    pub fn insert(&self, exchange: ExchangeId, asset: &str, networks: NetworkMap) {
        self.entries.insert(key(exchange, asset), Arc::new(networks));
    }

    /// Drop every entry for `exchange`.
    pub fn invalidate(&self, exchange: ExchangeId) {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != exchange);
        debug!(
            "Network cache: dropped {} entries for {}",
            before - self.entries.len(),
            exchange
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
        debug!("Network cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NetworkLookup for NetworkCache {
    fn networks(&self, exchange: ExchangeId, asset: &str) -> Option<Arc<NetworkMap>> {
        self.get(exchange, asset)
    }
}

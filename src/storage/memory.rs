// src/storage/memory.rs
use dashmap::DashMap;
use crate::models::server::{ Endpoint, ServerRecord };

/// Latest record per endpoint. Safe to update from many probe completions.
#[derive(Default)]
pub struct ServerStore {
    servers: DashMap<String, ServerRecord>,
}

impl ServerStore {
    pub fn new() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }

    /// Stores `record`, replacing any earlier one for the same endpoint.
    /// Returns true when the endpoint was not known before.
    pub fn upsert(&self, record: ServerRecord) -> bool {
        self.servers.insert(record.endpoint.key(), record).is_none()
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<ServerRecord> {
        self.servers.get(&endpoint.key()).map(|r| r.value().clone())
    }

    pub fn remove(&self, endpoint: &Endpoint) -> Option<ServerRecord> {
        self.servers.remove(&endpoint.key()).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn clear(&self) {
        self.servers.clear();
    }

    /// All records, lowest latency first.
    pub fn snapshot(&self) -> Vec<ServerRecord> {
        let mut servers: Vec<ServerRecord> = self.servers.iter().map(|r| r.value().clone()).collect();
        servers.sort_by(|a, b| a.latency_ms.cmp(&b.latency_ms).then_with(|| a.endpoint.key().cmp(&b.endpoint.key())));
        servers
    }

    pub fn total_players(&self) -> u64 {
        self.servers.iter().map(|r| u64::from(r.value().num_players)).sum()
    }
}

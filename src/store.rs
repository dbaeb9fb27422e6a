use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Persistence boundary: find-or-create a stored document by natural key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Finds a stored record of `doctype` matching `record` on every field
    /// in `key_fields`; updates it when found, inserts otherwise.
    async fn upsert(
        &self,
        doctype: &str,
        record: &Value,
        key_fields: &[&str],
    ) -> Result<UpsertOutcome, ConnectorError>;

    /// All stored records of `doctype` for one vendor. Used by the
    /// existing-bill filter.
    async fn find_existing(&self, doctype: &str, vendor: &str)
        -> Result<Vec<Value>, ConnectorError>;
}

/// In-memory store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of every stored record of one doctype.
    pub fn documents(&self, doctype: &str) -> Vec<Value> {
        self.docs().get(doctype).cloned().unwrap_or_default()
    }

    pub fn insert(&self, doctype: &str, record: Value) {
        self.docs()
            .entry(doctype.to_string())
            .or_default()
            .push(record);
    }
}

fn keys_match(stored: &Value, record: &Value, key_fields: &[&str]) -> bool {
    key_fields
        .iter()
        .all(|field| stored.get(field) == record.get(field))
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert(
        &self,
        doctype: &str,
        record: &Value,
        key_fields: &[&str],
    ) -> Result<UpsertOutcome, ConnectorError> {
        let mut docs = self.docs();
        let stored = docs.entry(doctype.to_string()).or_default();

        if let Some(existing) = stored.iter_mut().find(|s| keys_match(s, record, key_fields)) {
            *existing = record.clone();
            Ok(UpsertOutcome::Updated)
        } else {
            stored.push(record.clone());
            Ok(UpsertOutcome::Created)
        }
    }

    async fn find_existing(
        &self,
        doctype: &str,
        vendor: &str,
    ) -> Result<Vec<Value>, ConnectorError> {
        let docs = self.docs();
        Ok(docs
            .get(doctype)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|s| s.get("vendor").and_then(|v| v.as_str()) == Some(vendor))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

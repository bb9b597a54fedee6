use std::collections::HashMap;

use crate::model::GeocodeResult;

/// Per-run memo of resolved rows keyed by normalized address.
///
/// Entries are never evicted. The empty key is an ordinary entry holding the
/// "no address provided" row.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, GeocodeResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&GeocodeResult> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, result: GeocodeResult) {
        self.entries.insert(key.into(), result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

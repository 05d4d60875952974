// Tab- and session-scoped key/value storage

use dashmap::DashMap;
use std::sync::Arc;

/// Synchronous string storage with the semantics of browser web storage.
pub trait KeyValueStorage: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str);

    fn remove_item(&self, key: &str);

    fn clear(&self);

    /// Return the non-blank value under `key`, storing `create()` first when it
    /// is missing or blank. Implementations shared between tabs must do this
    /// atomically; the default is a plain read followed by a write.
    fn get_or_insert_with(&self, key: &str, create: &mut dyn FnMut() -> String) -> String {
        if let Some(existing) = self.get_item(key).filter(|v| !v.trim().is_empty()) {
            return existing;
        }
        let created = create();
        self.set_item(key, &created);
        created
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    fn set_item(&self, key: &str, value: &str) {
        self.items.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }

    fn clear(&self) {
        self.items.clear();
    }

    // The entry guard holds the shard lock, so racing callers see one value.
    fn get_or_insert_with(&self, key: &str, create: &mut dyn FnMut() -> String) -> String {
        let mut entry = self.items.entry(key.to_string()).or_insert_with(|| create());
        if entry.value().trim().is_empty() {
            *entry.value_mut() = create();
        }
        entry.value().clone()
    }
}

/// The storage pair a browser tab sees: its own tab storage plus the
/// session storage shared by every tab of the same browser session.
#[derive(Clone)]
pub struct BrowsingContext {
    tab: Arc<dyn KeyValueStorage>,
    session: Arc<dyn KeyValueStorage>,
}

impl BrowsingContext {
    pub fn new(tab: Arc<dyn KeyValueStorage>, session: Arc<dyn KeyValueStorage>) -> Self {
        Self { tab, session }
    }

    /// Fresh in-memory tab and session storage.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// A new tab opened in the same browser session.
    pub fn open_tab(&self) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::clone(&self.session))
    }

    pub fn tab_storage(&self) -> &dyn KeyValueStorage {
        self.tab.as_ref()
    }

    pub fn session_storage(&self) -> &dyn KeyValueStorage {
        self.session.as_ref()
    }
}

impl std::fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowsingContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("k").is_none());

        storage.set_item("k", "v1");
        storage.set_item("k", "v2");
        assert_eq!(storage.get_item("k").as_deref(), Some("v2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("k");
        assert!(storage.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_keeps_existing_value() {
        let storage = MemoryStorage::new();
        let mut calls = 0;
        let mut create = || {
            calls += 1;
            format!("v{}", calls)
        };

        assert_eq!(storage.get_or_insert_with("k", &mut create), "v1");
        assert_eq!(storage.get_or_insert_with("k", &mut create), "v1");

        storage.set_item("k", "  ");
        assert_eq!(storage.get_or_insert_with("k", &mut create), "v2");
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_open_tab_shares_session_only() {
        let first = BrowsingContext::in_memory();
        first.tab_storage().set_item("tab", "a");
        first.session_storage().set_item("session", "s");

        let second = first.open_tab();
        assert!(second.tab_storage().get_item("tab").is_none());
        assert_eq!(
            second.session_storage().get_item("session").as_deref(),
            Some("s")
        );
    }
}

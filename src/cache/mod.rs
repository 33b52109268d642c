//! Persistent selector cache
//!
//! One JSON file per platform maps application ids to
//! `page - element - strategy` keys and the selector that last worked for
//! them. The file is rewritten on every change so that the in-memory map and
//! the durable copy never drift apart. Entries never expire; they are only
//! removed after a failed resolution.

use crate::driver::traits::Platform;
use crate::error::{EngineError, Result};
use crate::selector::strategy::{classify, LocatorStrategy};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Separator between key parts. Keys stay readable in the cache file.
pub const KEY_SEPARATOR: &str = " - ";

type AppEntries = BTreeMap<String, String>;
type Store = BTreeMap<String, AppEntries>;

/// Composite cache key `(page, element, strategy)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: String,
    pub element: String,
    pub strategy: LocatorStrategy,
}

impl CacheKey {
    pub fn new(page: &str, element: &str, strategy: LocatorStrategy) -> Self {
        Self {
            page: page.to_string(),
            element: element.to_string(),
            strategy,
        }
    }

    /// Key prefix shared by every strategy of one logical element
    pub fn prefix(page: &str, element: &str) -> String {
        format!("{}{}{}{}", page, KEY_SEPARATOR, element, KEY_SEPARATOR)
    }

    /// Parse a three-part key. The strategy is the last part, so element
    /// names containing the separator survive.
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, tag) = raw.rsplit_once(KEY_SEPARATOR)?;
        let (page, element) = head.split_once(KEY_SEPARATOR)?;
        let strategy = LocatorStrategy::from_tag(tag)?;
        Some(Self::new(page, element, strategy))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.page, KEY_SEPARATOR, self.element, KEY_SEPARATOR, self.strategy
        )
    }
}

/// Selector cache for one platform, shared by every run against it
pub struct SelectorCache {
    path: PathBuf,
    platform: Platform,
    store: Mutex<Store>,
}

impl SelectorCache {
    /// Location of the cache file for a platform
    pub fn cache_file(dir: &Path, platform: Platform) -> PathBuf {
        dir.join(format!("selectors-{}.json", platform))
    }

    /// Load the cache for `platform` from `dir`.
    ///
    /// A missing or corrupt file yields an empty cache. Legacy two-part keys
    /// are upgraded and written back before this returns.
    pub fn load(dir: &Path, platform: Platform) -> Result<Self> {
        let path = Self::cache_file(dir, platform);
        let mut store = read_store(&path);

        let migrated = migrate_legacy_keys(&mut store);
        let cache = Self {
            path,
            platform,
            store: Mutex::new(store),
        };

        if migrated > 0 {
            info!(
                "Migrated {} legacy cache keys in {}",
                migrated,
                cache.path.display()
            );
            let store = cache.lock();
            cache.persist(&store)?;
            drop(store);
        }

        Ok(cache)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scope the cache to one application id
    pub fn for_app(self: &Arc<Self>, app_id: &str) -> AppCache {
        AppCache {
            cache: Arc::clone(self),
            app_id: app_id.to_string(),
        }
    }

    pub fn get(&self, app_id: &str, key: &CacheKey) -> Option<String> {
        self.lock()
            .get(app_id)
            .and_then(|entries| entries.get(&key.to_string()))
            .cloned()
    }

    /// Insert or overwrite an entry and persist the whole store
    pub fn put(&self, app_id: &str, key: &CacheKey, selector: &str) -> Result<()> {
        self.commit(|store| {
            store
                .entry(app_id.to_string())
                .or_default()
                .insert(key.to_string(), selector.to_string());
            ((), true)
        })?;
        debug!("Cached [{}] {} -> {}", app_id, key, selector);
        Ok(())
    }

    /// Remove an entry and persist. Returns whether anything was removed.
    pub fn invalidate(&self, app_id: &str, key: &CacheKey) -> Result<bool> {
        let removed = self.commit(|store| {
            let removed = match store.get_mut(app_id) {
                Some(entries) => entries.remove(&key.to_string()).is_some(),
                None => false,
            };
            if store.get(app_id).is_some_and(|e| e.is_empty()) {
                store.remove(app_id);
            }
            (removed, removed)
        })?;
        if removed {
            debug!("Invalidated [{}] {}", app_id, key);
        }
        Ok(removed)
    }

    /// First entry stored for `(page, element)` under any strategy
    pub fn find_by_prefix(
        &self,
        app_id: &str,
        page: &str,
        element: &str,
    ) -> Option<(CacheKey, String)> {
        let prefix = CacheKey::prefix(page, element);
        let store = self.lock();
        let entries = store.get(app_id)?;
        let found = entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .find_map(|(k, v)| CacheKey::parse(k).map(|key| (key, v.clone())));
        found
    }

    /// All entries, optionally restricted to one application
    pub fn entries(&self, app_id: Option<&str>) -> Vec<(String, String, String)> {
        self.lock()
            .iter()
            .filter(|(app, _)| app_id.map_or(true, |id| id == app.as_str()))
            .flat_map(|(app, entries)| {
                entries
                    .iter()
                    .map(move |(k, v)| (app.clone(), k.clone(), v.clone()))
            })
            .collect()
    }

    /// Drop every entry of an application. Returns the number removed.
    pub fn clear_app(&self, app_id: &str) -> Result<usize> {
        self.commit(|store| {
            let removed = store.remove(app_id).map_or(0, |entries| entries.len());
            (removed, removed > 0)
        })
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the store and swap it in only once the
    /// copy is on disk. `change` reports whether anything needs writing.
    fn commit<R>(&self, change: impl FnOnce(&mut Store) -> (R, bool)) -> Result<R> {
        let mut store = self.lock();
        let mut next = store.clone();
        let (result, changed) = change(&mut next);
        if changed {
            self.persist(&next)?;
            *store = next;
        }
        Ok(result)
    }

    /// Write the whole store. Called with the lock held.
    fn persist(&self, store: &Store) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Cache(format!("{}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(store)
            .map_err(|e| EngineError::Cache(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| EngineError::Cache(format!("{}: {}", self.path.display(), e)))
    }
}

/// Cache view bound to one application id
#[derive(Clone)]
pub struct AppCache {
    cache: Arc<SelectorCache>,
    app_id: String,
}

impl AppCache {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.cache.get(&self.app_id, key)
    }

    pub fn put(&self, key: &CacheKey, selector: &str) -> Result<()> {
        self.cache.put(&self.app_id, key, selector)
    }

    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        self.cache.invalidate(&self.app_id, key)
    }

    pub fn find_by_prefix(&self, page: &str, element: &str) -> Option<(CacheKey, String)> {
        self.cache.find_by_prefix(&self.app_id, page, element)
    }
}

fn read_store(path: &Path) -> Store {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Store::new(),
        Err(e) => {
            warn!("Could not read selector cache {}: {}", path.display(), e);
            return Store::new();
        }
    };

    if content.trim().is_empty() {
        return Store::new();
    }

    match serde_json::from_str::<Store>(&content) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                "Selector cache {} is corrupt, starting empty: {}",
                path.display(),
                e
            );
            Store::new()
        }
    }
}

/// Upgrade `page - element` keys to `page - element - strategy`, inferring
/// the strategy from the stored selector. A key is legacy when its last part
/// is not a strategy tag. Existing three-part keys win.
fn migrate_legacy_keys(store: &mut Store) -> usize {
    let mut migrated = 0;
    for entries in store.values_mut() {
        let legacy: Vec<String> = entries
            .keys()
            .filter(|k| k.contains(KEY_SEPARATOR) && CacheKey::parse(k).is_none())
            .cloned()
            .collect();

        for old_key in legacy {
            let Some(selector) = entries.remove(&old_key) else {
                continue;
            };
            let strategy = classify(Some(&selector));
            let new_key = format!("{}{}{}", old_key, KEY_SEPARATOR, strategy);
            entries.entry(new_key).or_insert(selector);
            migrated += 1;
        }
    }
    migrated
}

use super::extended::ExtendedFields;
use super::types::{CacheKey, CatalogItem, FailureKind, FetchState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Slot {
    item: CatalogItem,
    stored_at: Instant,
}

/// In-memory catalog cache. The map lock is only held to find or insert a
/// slot; every slot carries its own lock, and no lock is held across I/O.
pub(crate) struct CatalogCache {
    entries: RwLock<HashMap<CacheKey, Arc<Mutex<Slot>>>>,
    ttl: Duration,
    epoch: AtomicU64,
}

impl CatalogCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn slot(&self, key: &CacheKey) -> Option<Arc<Mutex<Slot>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Ready items and permanent failures younger than the TTL.
    pub(crate) fn get_fresh(&self, key: &CacheKey) -> Option<CatalogItem> {
        let slot = self.slot(key)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let cacheable = match slot.item.fetch_state {
            FetchState::Ready | FetchState::Failed(FailureKind::Permanent) => true,
            FetchState::Failed(FailureKind::Transient) | FetchState::Pending | FetchState::Absent => {
                false
            }
        };

        if cacheable && slot.stored_at.elapsed() < self.ttl {
            Some(slot.item.clone())
        } else {
            None
        }
    }

    /// Whatever is stored for `key`, stale or not.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<CatalogItem> {
        let slot = self.slot(key)?;
        let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        Some(slot.item.clone())
    }

    /// Stores `item` as Ready. Extended fields held by a higher-precedence source
    /// survive the refresh. Results from a previous epoch are not stored.
    /// Returns the stored view.
    pub(crate) fn publish(&self, mut item: CatalogItem, epoch: u64) -> CatalogItem {
        item.fetch_state = FetchState::Ready;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if epoch != self.epoch() {
            debug!(key = %item.key(), "Dropping result of a previous cache epoch");
            return item;
        }

        match entries.get(&item.key()) {
            Some(slot) => {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let mut extended = std::mem::take(&mut slot.item.extended);
                extended.refresh_from(item.extended);
                item.extended = extended;

                slot.item = item.clone();
                slot.stored_at = Instant::now();
            }
            None => {
                entries.insert(
                    item.key(),
                    Arc::new(Mutex::new(Slot {
                        item: item.clone(),
                        stored_at: Instant::now(),
                    })),
                );
            }
        }

        item
    }

    /// Records a failed fetch. A transient failure never replaces a Ready item;
    /// the stale item is returned instead.
    pub(crate) fn record_failure(
        &self,
        key: CacheKey,
        failure: FailureKind,
        epoch: u64,
    ) -> CatalogItem {
        let failed = CatalogItem::failed(key.id.clone(), key.kind, failure);

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if epoch != self.epoch() {
            return failed;
        }

        match entries.get(&key) {
            Some(slot) => {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

                if failure == FailureKind::Transient && slot.item.is_ready() {
                    return slot.item.clone();
                }

                slot.item = failed.clone();
                slot.stored_at = Instant::now();
            }
            None => {
                entries.insert(
                    key,
                    Arc::new(Mutex::new(Slot {
                        item: failed.clone(),
                        stored_at: Instant::now(),
                    })),
                );
            }
        }

        failed
    }

    /// Merges `fields` into the stored item. Returns the resulting item, or
    /// `None` when nothing is stored for `key`.
    pub(crate) fn merge_extended(
        &self,
        key: &CacheKey,
        fields: ExtendedFields,
    ) -> Option<CatalogItem> {
        let slot = self.slot(key)?;
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        slot.item.extended.merge(fields);

        Some(slot.item.clone())
    }

    /// Drops every entry and starts a new epoch.
    pub(crate) fn invalidate(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::extended::{FieldSource, Sourced};
    use crate::services::catalog::types::BasicFields;
    use crate::types::ItemKind;

    fn album(id: &str, label: &str) -> CatalogItem {
        CatalogItem::ready(
            id.into(),
            ItemKind::Album,
            BasicFields {
                name: format!("Album {}", id),
                ..BasicFields::default()
            },
            ExtendedFields {
                label: Some(Sourced::new(label.to_string(), FieldSource::Catalog)),
                ..ExtendedFields::default()
            },
        )
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id.into(), ItemKind::Album)
    }

    #[tokio::test(start_paused = true)]
    async fn should_expire_entries_after_ttl() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.publish(album("a", "Label"), cache.epoch());

        assert!(cache.get_fresh(&key("a")).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.get_fresh(&key("a")).is_none());
        assert!(cache.get(&key("a")).is_some());
    }

    #[tokio::test]
    async fn should_keep_ready_item_on_transient_failure() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.publish(album("a", "Label"), cache.epoch());

        let item = cache.record_failure(key("a"), FailureKind::Transient, cache.epoch());

        assert!(item.is_ready());
        assert!(cache.get(&key("a")).unwrap().is_ready());

        let item = cache.record_failure(key("a"), FailureKind::Permanent, cache.epoch());

        assert!(item.is_permanently_failed());
        assert!(cache.get_fresh(&key("a")).unwrap().is_permanently_failed());
    }

    #[tokio::test]
    async fn should_never_serve_transient_failures_as_fresh() {
        let cache = CatalogCache::new(Duration::from_secs(60));

        cache.record_failure(key("a"), FailureKind::Transient, cache.epoch());

        assert!(cache.get_fresh(&key("a")).is_none());
    }

    #[tokio::test]
    async fn should_retain_provider_fields_across_refresh() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        cache.publish(album("a", "Old label"), cache.epoch());
        cache.merge_extended(
            &key("a"),
            ExtendedFields {
                description: Some(Sourced::new(
                    "From provider".to_string(),
                    FieldSource::Provider,
                )),
                ..ExtendedFields::default()
            },
        );

        let stored = cache.publish(album("a", "New label"), cache.epoch());

        assert_eq!(
            stored.extended.label,
            Some(Sourced::new("New label".to_string(), FieldSource::Catalog))
        );
        assert_eq!(
            stored.extended.description,
            Some(Sourced::new("From provider".to_string(), FieldSource::Provider))
        );
    }

    #[tokio::test]
    async fn should_not_publish_results_of_previous_epoch() {
        let cache = CatalogCache::new(Duration::from_secs(60));
        let epoch = cache.epoch();

        cache.invalidate();
        let delivered = cache.publish(album("a", "Label"), epoch);

        assert!(delivered.is_ready());
        assert_eq!(cache.len(), 0);
    }
}

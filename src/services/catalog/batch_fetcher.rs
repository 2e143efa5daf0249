use super::cache::CatalogCache;
use super::in_flight::{Claim, InFlight, InFlightGuard, InFlightWaiter};
use super::traits::{CatalogApi, CatalogApiError};
use super::types::{CacheKey, CatalogItem, FailureKind};
use crate::types::{CatalogId, ItemKind};
use crate::utils::exponential_backoff;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub(crate) struct FetcherConfig {
    pub(crate) concurrency: usize,
    pub(crate) retry_limit: u32,
    pub(crate) attempt_timeout: Duration,
    pub(crate) retry_base_delay: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry_limit: 3,
            attempt_timeout: Duration::from_secs(10),
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub(crate) enum FetchPriority {
    /// A list the user is looking at.
    Foreground,
    /// Precache and playlist sync. Limited to half of the fetch slots.
    Background,
}

pub(crate) struct BatchFetcher {
    api: Arc<dyn CatalogApi>,
    cache: Arc<CatalogCache>,
    in_flight: InFlight<CacheKey, CatalogItem>,
    permits: Semaphore,
    background_permits: Semaphore,
    config: FetcherConfig,
}

impl BatchFetcher {
    pub(crate) fn new(
        api: Arc<dyn CatalogApi>,
        cache: Arc<CatalogCache>,
        config: FetcherConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);

        Self {
            api,
            cache,
            in_flight: InFlight::new(),
            permits: Semaphore::new(concurrency),
            background_permits: Semaphore::new((concurrency / 2).max(1)),
            config,
        }
    }

    pub(crate) fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    /// Returns one item per distinct id: fresh cache hits as they are, everything
    /// else fetched in batches of at most `max_batch_size` ids. Failures come
    /// back as `Failed` items, never as errors.
    pub(crate) async fn get_or_fetch(
        &self,
        ids: &[CatalogId],
        kind: ItemKind,
        priority: FetchPriority,
    ) -> HashMap<CatalogId, CatalogItem> {
        let mut items = HashMap::new();
        let mut seen = HashSet::new();
        let mut misses = vec![];

        for id in ids {
            if !seen.insert(id) {
                continue;
            }

            match self.cache.get_fresh(&CacheKey::new(id.clone(), kind)) {
                Some(item) => {
                    items.insert(id.clone(), item);
                }
                None => misses.push(id.clone()),
            }
        }

        if misses.is_empty() {
            return items;
        }

        let batch_size = self.api.max_batch_size(kind).max(1);

        debug!(
            %kind,
            hits = items.len(),
            misses = misses.len(),
            ?priority,
            "Fetching catalog items"
        );

        let chunks = misses
            .chunks(batch_size)
            .map(|chunk| self.fetch_chunk(chunk, kind, priority));

        for fetched in join_all(chunks).await {
            items.extend(fetched);
        }

        items
    }

    async fn fetch_chunk(
        &self,
        ids: &[CatalogId],
        kind: ItemKind,
        priority: FetchPriority,
    ) -> HashMap<CatalogId, CatalogItem> {
        let mut items = HashMap::new();
        let mut owned: Vec<InFlightGuard<CacheKey, CatalogItem>> = vec![];
        let mut waiters: Vec<(CatalogId, InFlightWaiter<CatalogItem>)> = vec![];

        // The semaphores are never closed.
        let background_permit = match priority {
            FetchPriority::Background => self.background_permits.acquire().await.ok(),
            FetchPriority::Foreground => None,
        };
        let permit = self.permits.acquire().await.ok();

        let epoch = self.cache.epoch();

        for id in ids {
            let key = CacheKey::new(id.clone(), kind);

            if let Some(item) = self.cache.get_fresh(&key) {
                items.insert(id.clone(), item);
                continue;
            }

            match self.in_flight.claim(key) {
                Claim::Owner(guard) => match self.cache.get_fresh(guard.key()) {
                    // Published between the check above and the claim.
                    Some(item) => {
                        guard.resolve(item.clone());
                        items.insert(id.clone(), item);
                    }
                    None => owned.push(guard),
                },
                Claim::Waiter(waiter) => waiters.push((id.clone(), waiter)),
            }
        }

        if !owned.is_empty() {
            let owned_ids: Vec<CatalogId> = owned
                .iter()
                .map(|guard| guard.key().id.clone())
                .collect();

            let (mut fetched, failure) = match self.fetch_with_retry(&owned_ids, kind).await {
                Ok(fetched) => (
                    fetched
                        .into_iter()
                        .filter(|item| item.kind == kind)
                        .map(|item| (item.id.clone(), item))
                        .collect::<HashMap<_, _>>(),
                    None,
                ),
                Err(failure) => (HashMap::new(), Some(failure)),
            };

            for guard in owned {
                let key = guard.key().clone();

                let item = match (failure, fetched.remove(&key.id)) {
                    (None, Some(item)) => self.cache.publish(item, epoch),
                    (None, None) => {
                        self.cache
                            .record_failure(key.clone(), FailureKind::Permanent, epoch)
                    }
                    (Some(failure), _) => self.cache.record_failure(key.clone(), failure, epoch),
                };

                guard.resolve(item.clone());
                items.insert(key.id, item);
            }
        }

        drop(permit);
        drop(background_permit);

        for (id, waiter) in waiters {
            let item = match waiter.wait().await {
                Some(item) => item,
                None => CatalogItem::failed(id.clone(), kind, FailureKind::Transient),
            };

            items.insert(id, item);
        }

        items
    }

    async fn fetch_with_retry(
        &self,
        ids: &[CatalogId],
        kind: ItemKind,
    ) -> Result<Vec<CatalogItem>, FailureKind> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.api.fetch_batch(ids, kind),
            )
            .await
            {
                Ok(Ok(items)) => return Ok(items),
                Ok(Err(error)) => error,
                Err(_) => CatalogApiError::Timeout,
            };

            if !error.is_transient() {
                warn!(%kind, ids = ids.len(), ?error, "Catalog batch failed permanently");
                return Err(FailureKind::Permanent);
            }

            if attempt >= self.config.retry_limit {
                warn!(%kind, ids = ids.len(), attempt, ?error, "Catalog batch retries exhausted");
                return Err(FailureKind::Transient);
            }

            let delay = exponential_backoff(self.config.retry_base_delay, attempt, MAX_RETRY_DELAY)
                .max(error.retry_after().unwrap_or_default().min(MAX_RETRY_DELAY));

            debug!(%kind, attempt, ?delay, ?error, "Retrying catalog batch");

            tokio::time::sleep(delay).await;
        }
    }
}

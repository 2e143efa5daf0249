use crate::services::catalog::{BatchFetcher, CatalogItem, FetchPriority};
use crate::services::enrichment::{EnrichmentEvent, EnrichmentPipeline, EnrichmentSubscription};
use crate::types::{CatalogId, ItemKind, ListToken};
use actix_web::web::{Data, Json, Path};
use actix_web::{HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct BrowseSession {
    subscription: EnrichmentSubscription,
    last_access: Instant,
}

/// Enrichment subscriptions of the lists currently shown to clients. A list
/// not polled for `idle_timeout` is cancelled once another list opens.
pub(crate) struct BrowseSessions {
    sessions: Mutex<HashMap<ListToken, BrowseSession>>,
    idle_timeout: Duration,
}

impl BrowseSessions {
    pub(crate) fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    fn insert(&self, subscription: EnrichmentSubscription) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        sessions.retain(|list_token, session| {
            if now.duration_since(session.last_access) < self.idle_timeout {
                return true;
            }

            session.subscription.cancel();
            debug!(%list_token, "Idle list expired");
            false
        });

        sessions.insert(
            subscription.list_token(),
            BrowseSession {
                subscription,
                last_access: now,
            },
        );
    }

    /// `None` when the token is unknown. Finished sessions are forgotten.
    fn drain(&self, list_token: &ListToken) -> Option<(Vec<EnrichmentEvent>, bool)> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(list_token)?;
        session.last_access = Instant::now();
        let (events, finished) = session.subscription.drain();

        if finished {
            sessions.remove(list_token);
        }

        Some((events, finished))
    }

    fn remove(&self, list_token: &ListToken) -> Option<EnrichmentSubscription> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(list_token)
            .map(|session| session.subscription)
    }
}

#[derive(Deserialize)]
pub(crate) struct BrowseRequest {
    kind: ItemKind,
    ids: Vec<CatalogId>,
}

#[derive(Serialize)]
struct BrowseResponse {
    list_token: ListToken,
    items: Vec<CatalogItem>,
}

#[derive(Serialize)]
struct EventsResponse {
    events: Vec<EnrichmentEvent>,
    closed: bool,
}

/// Rows come back in request order, one per id, and enrichment continues in
/// the background.
pub(crate) async fn browse_list(
    request: Json<BrowseRequest>,
    fetcher: Data<Arc<BatchFetcher>>,
    pipeline: Data<Arc<EnrichmentPipeline>>,
    sessions: Data<Arc<BrowseSessions>>,
) -> impl Responder {
    let BrowseRequest { kind, ids } = request.into_inner();

    let fetched = fetcher
        .get_or_fetch(&ids, kind, FetchPriority::Foreground)
        .await;
    let rows = ids
        .iter()
        .map(|id| {
            fetched
                .get(id)
                .cloned()
                .unwrap_or_else(|| CatalogItem::absent(id.clone(), kind))
        })
        .collect::<Vec<_>>();

    let list_token = ListToken::new();
    let (items, subscription) = pipeline.enrich(list_token, rows);
    sessions.insert(subscription);

    debug!(%list_token, %kind, rows = items.len(), "List opened");

    HttpResponse::Ok().json(BrowseResponse { list_token, items })
}

pub(crate) async fn list_events(
    list_token: Path<ListToken>,
    sessions: Data<Arc<BrowseSessions>>,
) -> impl Responder {
    match sessions.drain(&list_token) {
        Some((events, finished)) => HttpResponse::Ok().json(EventsResponse {
            events,
            closed: finished,
        }),
        None => HttpResponse::NotFound().finish(),
    }
}

/// Called when the list is no longer shown.
pub(crate) async fn close_list(
    list_token: Path<ListToken>,
    sessions: Data<Arc<BrowseSessions>>,
) -> impl Responder {
    match sessions.remove(&list_token) {
        Some(mut subscription) => {
            subscription.cancel();
            debug!(list_token = %list_token.into_inner(), "List closed");
            HttpResponse::NoContent().finish()
        }
        None => HttpResponse::NotFound().finish(),
    }
}

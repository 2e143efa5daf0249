use crate::services::catalog::BatchFetcher;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Drops every cached item. Fetches already in flight are not stored.
pub(crate) async fn invalidate_cache(fetcher: Data<Arc<BatchFetcher>>) -> impl Responder {
    let dropped = fetcher.cache().len();
    fetcher.cache().invalidate();

    info!(dropped, "Catalog cache invalidated");

    HttpResponse::Ok().json(json!({ "dropped_items": dropped }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::testing::{track, CatalogApiMock};
    use crate::services::catalog::{CatalogCache, FetchPriority, FetcherConfig};
    use crate::types::ItemKind;
    use actix_web::{test, web, App};
    use std::time::Duration;

    #[actix_rt::test]
    async fn should_refetch_items_after_invalidation() {
        let api = Arc::new(CatalogApiMock::new());
        api.add_item(track("t1", "al1", "ar1", 180_000));
        let fetcher = Arc::new(BatchFetcher::new(
            api.clone(),
            Arc::new(CatalogCache::new(Duration::from_secs(3600))),
            FetcherConfig::default(),
        ));

        fetcher
            .get_or_fetch(&["t1".into()], ItemKind::Track, FetchPriority::Foreground)
            .await;
        assert_eq!(fetcher.cache().len(), 1);

        let app = test::init_service(
            App::new()
                .app_data(Data::new(Arc::clone(&fetcher)))
                .route("/cache/invalidate", web::post().to(invalidate_cache)),
        )
        .await;
        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/cache/invalidate")
                .to_request(),
        )
        .await;

        assert!(response.status().is_success());
        assert_eq!(fetcher.cache().len(), 0);

        fetcher
            .get_or_fetch(&["t1".into()], ItemKind::Track, FetchPriority::Foreground)
            .await;
        assert_eq!(api.batch_calls_for(ItemKind::Track), 2);
    }
}

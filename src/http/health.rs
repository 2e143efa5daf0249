use crate::services::catalog::BatchFetcher;
use crate::VERSION;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;

pub(crate) async fn readiness_check(fetcher: Data<Arc<BatchFetcher>>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "version": VERSION,
        "cached_items": fetcher.cache().len(),
    }))
}

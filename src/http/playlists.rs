use crate::services::playlist_sync::{PlaylistSyncEngine, SyncRun};
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// The pass runs on its own task; a client hanging up does not cancel it.
pub(crate) async fn sync_playlists(engine: Data<Arc<PlaylistSyncEngine>>) -> impl Responder {
    match Arc::clone(engine.get_ref()).spawn_sync().await {
        Ok(Ok(SyncRun::Completed(report))) => HttpResponse::Ok().json(report),
        Ok(Ok(SyncRun::Coalesced)) => HttpResponse::Accepted().json(json!({ "queued": true })),
        Ok(Err(error)) => {
            error!(%error, "Playlist sync failed");
            HttpResponse::BadGateway().json(json!({ "error": error.to_string() }))
        }
        Err(error) => {
            error!(%error, "Playlist sync task failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub(crate) async fn last_sync_report(engine: Data<Arc<PlaylistSyncEngine>>) -> impl Responder {
    match engine.last_report() {
        Some(report) => HttpResponse::Ok().json(report),
        None => HttpResponse::NoContent().finish(),
    }
}

use crate::config::Config;
use crate::impls::create_enrichment_provider;
use crate::services::catalog::{BatchFetcher, CatalogApi, CatalogCache};
use crate::services::enrichment::EnrichmentPipeline;
use crate::services::playlist_sync::PlaylistSyncEngine;
use crate::services::precache::PrecacheScheduler;
use crate::services::receiver::{LibrespotLauncher, ReceiverSupervisor};
use crate::services::spotify_client::{AccessToken, SpotifyClient};
use crate::storage::OnDiskStorage;
use actix_rt::signal::unix;
use actix_web::web::Data;
use actix_web::{web, App, HttpServer};
use futures_lite::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;
mod http;
mod impls;
mod services;
mod storage;
mod types;
mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    let mut terminate = unix::signal(unix::SignalKind::terminate())?;
    let mut interrupt = unix::signal(unix::SignalKind::interrupt())?;

    dotenv::dotenv().ok();
    env_logger::init();

    let config = Arc::from(Config::from_env());

    info!(version = VERSION, "Starting application...");

    let access_token = match (
        &config.catalog_access_token_file,
        &config.catalog_access_token,
    ) {
        (Some(path), _) => AccessToken::File(PathBuf::from(path)),
        (None, Some(token)) => AccessToken::Static(token.clone()),
        (None, None) => {
            panic!("Either CATALOG_ACCESS_TOKEN_FILE or CATALOG_ACCESS_TOKEN must be set")
        }
    };
    let catalog_api: Arc<dyn CatalogApi> = Arc::new(
        SpotifyClient::create(
            &config.catalog_api_endpoint,
            access_token,
            &config.catalog_market,
        )
        .expect("Unable to initialize catalog client"),
    );

    let cache = Arc::new(CatalogCache::new(config.cache_ttl()));
    let fetcher = Arc::new(BatchFetcher::new(
        Arc::clone(&catalog_api),
        cache,
        config.fetcher_config(),
    ));

    let provider = create_enrichment_provider(
        config.content_provider,
        config.lastfm_api_key.as_deref(),
    );
    let pipeline = Arc::new(EnrichmentPipeline::new(
        Arc::clone(&fetcher),
        provider,
        config.enrichment_concurrency,
    ));
    let sessions = Arc::new(http::BrowseSessions::new(config.browse_idle_timeout()));

    let snapshot_storage = OnDiskStorage::create(config.state_storage_directory.clone());
    let playlist_sync = Arc::new(PlaylistSyncEngine::new(
        Arc::clone(&catalog_api),
        Arc::clone(&fetcher),
        Arc::new(snapshot_storage),
        config.playlist_sync_config(),
    ));

    let (receiver, receiver_task) = ReceiverSupervisor::spawn(
        config.receiver_config(),
        Arc::new(LibrespotLauncher::new()),
    );

    let shutdown = CancellationToken::new();

    let precache = config.precache_enabled.then(|| {
        Arc::new(PrecacheScheduler::new(
            Arc::clone(&catalog_api),
            Arc::clone(&fetcher),
        ))
        .spawn(
            Duration::from_secs(config.precache_interval),
            shutdown.clone(),
        )
    });
    let precache_trigger = precache.as_ref().map(|handle| handle.trigger());

    let playlist_sync_task = config.playlist_sync_enabled.then(|| {
        Arc::clone(&playlist_sync).spawn_periodic(
            Duration::from_secs(config.playlist_sync_interval),
            shutdown.clone(),
        )
    });

    let shutdown_timeout = config.shutdown_timeout;
    let bind_address = config.bind_address.clone();

    let server = HttpServer::new({
        let receiver = receiver.clone();

        move || {
            App::new()
                .app_data(Data::new(Arc::clone(&fetcher)))
                .app_data(Data::new(Arc::clone(&pipeline)))
                .app_data(Data::new(Arc::clone(&sessions)))
                .app_data(Data::new(Arc::clone(&playlist_sync)))
                .app_data(Data::new(precache_trigger.clone()))
                .app_data(Data::new(receiver.clone()))
                .service(web::resource("/health").route(web::get().to(http::readiness_check)))
                .service(web::resource("/browse").route(web::post().to(http::browse_list)))
                .service(
                    web::resource("/browse/{list_token}/events")
                        .route(web::get().to(http::list_events)),
                )
                .service(
                    web::resource("/browse/{list_token}")
                        .route(web::delete().to(http::close_list)),
                )
                .service(
                    web::resource("/playlists/sync")
                        .route(web::post().to(http::sync_playlists))
                        .route(web::get().to(http::last_sync_report)),
                )
                .service(
                    web::resource("/cache/invalidate")
                        .route(web::post().to(http::invalidate_cache)),
                )
                .service(web::resource("/precache").route(web::post().to(http::request_precache)))
                .service(web::resource("/receiver").route(web::get().to(http::receiver_status)))
                .service(
                    web::resource("/receiver/start").route(web::post().to(http::start_receiver)),
                )
                .service(
                    web::resource("/receiver/stop").route(web::post().to(http::stop_receiver)),
                )
                .service(
                    web::resource("/receiver/retry").route(web::post().to(http::retry_receiver)),
                )
        }
    })
    .shutdown_timeout(shutdown_timeout)
    .bind(bind_address)?
    .run();

    let server_handle = server.handle();

    actix_rt::spawn({
        async move {
            if let Err(error) = server.await {
                error!(?error, "Error on http server");
            }
        }
    });

    info!("Application started");

    interrupt.recv().or(terminate.recv()).await;

    info!("Received shutdown signal. Shutting down gracefully...");

    shutdown.cancel();
    server_handle.stop(true).await;

    if let Some(precache) = precache {
        precache.join().await;
    }
    if let Some(task) = playlist_sync_task {
        if let Err(error) = task.await {
            warn!(?error, "Playlist sync task ended abnormally");
        }
    }

    receiver.shutdown().await;
    if let Err(error) = receiver_task.await {
        warn!(?error, "Receiver supervisor ended abnormally");
    }

    info!("Application stopped");

    Ok(())
}

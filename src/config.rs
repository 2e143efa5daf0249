use crate::services::catalog::FetcherConfig;
use crate::services::playlist_sync::PlaylistSyncConfig;
use crate::services::receiver::{ReceiverBackendKind, ReceiverConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30u64
}

fn default_catalog_api_endpoint() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_catalog_market() -> String {
    "from_token".to_string()
}

fn default_state_storage_directory() -> String {
    "data/state".to_string()
}

fn default_playlists_directory() -> String {
    "data/playlists".to_string()
}

fn default_playlist_file_prefix() -> String {
    "Spotify - ".to_string()
}

fn default_proxy_port() -> u16 {
    52308
}

fn default_fetch_concurrency() -> usize {
    5
}

fn default_fetch_retry_limit() -> u32 {
    3
}

fn default_fetch_attempt_timeout() -> u64 {
    10
}

fn default_fetch_retry_base_delay_ms() -> u64 {
    500
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_enrichment_concurrency() -> usize {
    2
}

fn default_browse_idle_timeout() -> u64 {
    10 * 60
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    30 * 60
}

fn default_playlist_sync_concurrency() -> usize {
    3
}

fn default_connect_backend() -> ReceiverBackendKind {
    ReceiverBackendKind::PulseaudioRtp
}

fn default_connect_alsa_device() -> String {
    "hw:2,0".to_string()
}

fn default_connect_device_name() -> String {
    "Spotify Kodi Connect@{}".to_string()
}

fn default_connect_bitrate() -> u32 {
    320
}

fn default_connect_device_type() -> String {
    "tv".to_string()
}

fn default_librespot_path() -> String {
    "librespot".to_string()
}

fn default_receiver_max_attempts() -> u32 {
    5
}

fn default_receiver_grace_period() -> u64 {
    3
}

fn default_receiver_backoff_base_ms() -> u64 {
    1000
}

fn default_receiver_stop_timeout() -> u64 {
    5
}

fn default_pa_rtp_address() -> String {
    "127.0.0.1".to_string()
}

fn default_pa_rtp_port() -> u16 {
    24643
}

fn default_pa_rtp_sink() -> String {
    "spotify_kodi_connect".to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ContentProviderKind {
    #[serde(alias = "0", alias = "off")]
    None,
    LastFm,
    MusicBrainz,
}

fn default_content_provider() -> ContentProviderKind {
    ContentProviderKind::None
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_bind_address")]
    pub(crate) bind_address: String,
    #[serde(default = "default_shutdown_timeout")]
    pub(crate) shutdown_timeout: u64,

    #[serde(default = "default_catalog_api_endpoint")]
    pub(crate) catalog_api_endpoint: String,
    pub(crate) catalog_access_token: Option<String>,
    pub(crate) catalog_access_token_file: Option<String>,
    #[serde(default = "default_catalog_market")]
    pub(crate) catalog_market: String,

    #[serde(default = "default_state_storage_directory")]
    pub(crate) state_storage_directory: String,
    #[serde(default = "default_playlists_directory")]
    pub(crate) playlists_directory: String,
    #[serde(default = "default_playlist_file_prefix")]
    pub(crate) playlist_file_prefix: String,
    #[serde(default = "default_proxy_port")]
    pub(crate) proxy_port: u16,

    #[serde(default = "default_fetch_concurrency")]
    pub(crate) fetch_concurrency: usize,
    #[serde(default = "default_fetch_retry_limit")]
    pub(crate) fetch_retry_limit: u32,
    #[serde(default = "default_fetch_attempt_timeout")]
    pub(crate) fetch_attempt_timeout: u64,
    #[serde(default = "default_fetch_retry_base_delay_ms")]
    pub(crate) fetch_retry_base_delay_ms: u64,
    #[serde(default = "default_cache_ttl")]
    pub(crate) cache_ttl: u64,
    #[serde(default = "default_enrichment_concurrency")]
    pub(crate) enrichment_concurrency: usize,
    #[serde(default = "default_browse_idle_timeout")]
    pub(crate) browse_idle_timeout: u64,

    #[serde(default = "default_true")]
    pub(crate) precache_enabled: bool,
    #[serde(default = "default_interval")]
    pub(crate) precache_interval: u64,
    #[serde(default = "default_true")]
    pub(crate) playlist_sync_enabled: bool,
    #[serde(default = "default_interval")]
    pub(crate) playlist_sync_interval: u64,
    #[serde(default = "default_playlist_sync_concurrency")]
    pub(crate) playlist_sync_concurrency: usize,

    #[serde(default = "default_content_provider")]
    pub(crate) content_provider: ContentProviderKind,
    pub(crate) lastfm_api_key: Option<String>,

    #[serde(default)]
    pub(crate) connect_receiver: bool,
    #[serde(default = "default_connect_backend")]
    pub(crate) connect_backend: ReceiverBackendKind,
    #[serde(default = "default_connect_alsa_device")]
    pub(crate) connect_alsa_device: String,
    #[serde(default = "default_connect_device_name")]
    pub(crate) connect_device_name: String,
    #[serde(default)]
    pub(crate) connect_options: String,
    #[serde(default = "default_connect_bitrate")]
    pub(crate) connect_bitrate: u32,
    #[serde(default = "default_connect_device_type")]
    pub(crate) connect_device_type: String,
    pub(crate) connect_onevent_path: Option<String>,
    #[serde(default = "default_librespot_path")]
    pub(crate) librespot_path: String,
    #[serde(default = "default_receiver_max_attempts")]
    pub(crate) receiver_max_attempts: u32,
    #[serde(default = "default_receiver_grace_period")]
    pub(crate) receiver_grace_period: u64,
    #[serde(default = "default_receiver_backoff_base_ms")]
    pub(crate) receiver_backoff_base_ms: u64,
    #[serde(default = "default_receiver_stop_timeout")]
    pub(crate) receiver_stop_timeout: u64,
    #[serde(default = "default_pa_rtp_address")]
    pub(crate) pa_rtp_address: String,
    #[serde(default = "default_pa_rtp_port")]
    pub(crate) pa_rtp_port: u16,
    #[serde(default = "default_pa_rtp_sink")]
    pub(crate) pa_rtp_sink: String,
}

impl Config {
    pub(crate) fn from_env() -> Self {
        match envy::from_env::<Self>() {
            Ok(config) => config,
            Err(error) => panic!("Invalid environment configuration: {:#?}", error),
        }
    }

    pub(crate) fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            concurrency: self.fetch_concurrency.max(1),
            retry_limit: self.fetch_retry_limit.max(1),
            attempt_timeout: Duration::from_secs(self.fetch_attempt_timeout),
            retry_base_delay: Duration::from_millis(self.fetch_retry_base_delay_ms),
        }
    }

    pub(crate) fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub(crate) fn browse_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.browse_idle_timeout)
    }

    pub(crate) fn playlist_sync_config(&self) -> PlaylistSyncConfig {
        PlaylistSyncConfig {
            concurrency: self.playlist_sync_concurrency.max(1),
            playlists_directory: PathBuf::from(&self.playlists_directory),
            file_prefix: self.playlist_file_prefix.clone(),
            proxy_port: self.proxy_port,
        }
    }

    pub(crate) fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            enabled: self.connect_receiver,
            backend: self.connect_backend,
            alsa_device: self.connect_alsa_device.clone(),
            device_name: self.connect_device_name.clone(),
            options: self.connect_options.clone(),
            bitrate: self.connect_bitrate,
            device_type: self.connect_device_type.clone(),
            onevent_path: self.connect_onevent_path.clone(),
            librespot_path: self.librespot_path.clone(),
            max_attempts: self.receiver_max_attempts.max(1),
            grace_period: Duration::from_secs(self.receiver_grace_period),
            backoff_base: Duration::from_millis(self.receiver_backoff_base_ms),
            stop_timeout: Duration::from_secs(self.receiver_stop_timeout),
            pa_rtp_address: self.pa_rtp_address.clone(),
            pa_rtp_port: self.pa_rtp_port,
            pa_rtp_sink: self.pa_rtp_sink.clone(),
        }
    }
}

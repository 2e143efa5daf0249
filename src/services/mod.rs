pub(crate) mod catalog;
pub(crate) mod enrichment;
pub(crate) mod playlist_sync;
pub(crate) mod precache;
pub(crate) mod receiver;
pub(crate) mod spotify_client;

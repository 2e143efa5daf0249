mod browse;
mod cache;
mod health;
mod playlists;
mod precache;
mod receiver;

pub(crate) use browse::{browse_list, close_list, list_events, BrowseSessions};
pub(crate) use cache::invalidate_cache;
pub(crate) use health::readiness_check;
pub(crate) use playlists::{last_sync_report, sync_playlists};
pub(crate) use precache::request_precache;
pub(crate) use receiver::{receiver_status, retry_receiver, start_receiver, stop_receiver};

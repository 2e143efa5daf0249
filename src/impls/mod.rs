mod content_provider;
mod snapshot_store;

pub(crate) use content_provider::*;

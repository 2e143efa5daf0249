use serde::{Deserialize, Serialize};
use std::ops::Deref;
use uuid::Uuid;

#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct CatalogId(pub(crate) String);

impl Deref for CatalogId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for CatalogId {
    fn from(value: &str) -> Self {
        CatalogId(value.to_string())
    }
}

impl From<String> for CatalogId {
    fn from(value: String) -> Self {
        CatalogId(value)
    }
}

impl std::fmt::Display for CatalogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ItemKind {
    Track,
    Album,
    Artist,
    Playlist,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemKind::Track => "track",
            ItemKind::Album => "album",
            ItemKind::Artist => "artist",
            ItemKind::Playlist => "playlist",
        };

        write!(f, "{}", name)
    }
}

/// Identifies one rendered list so that enrichment events can be routed back to it.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct ListToken(Uuid);

impl ListToken {
    pub(crate) fn new() -> Self {
        ListToken(Uuid::new_v4())
    }
}

impl From<Uuid> for ListToken {
    fn from(value: Uuid) -> Self {
        ListToken(value)
    }
}

impl std::fmt::Display for ListToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

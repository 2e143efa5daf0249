mod lastfm;
mod musicbrainz;
mod pacing;

pub use lastfm::*;
pub use musicbrainz::*;

pub const USER_AGENT: &str = "CatalogEngine/0.1 (music metadata)";

#[derive(Debug, PartialEq, Clone, Default)]
pub struct ArtistInfo {
    pub biography: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ContentProviderError {
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
    #[error(transparent)]
    ParseError(#[from] ParseError),
}

pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

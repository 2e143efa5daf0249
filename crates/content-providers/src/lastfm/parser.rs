use crate::{non_empty, ArtistInfo, ParseError};
use serde_json::Value;

const READ_MORE: &str = "Read more on Last.fm";
const IMAGE_SIZE_PRIORITY: [&str; 3] = ["extralarge", "large", "medium"];

/// Last.fm appends a "Read more on Last.fm" link to every bio and wiki.
fn strip_read_more(text: &str) -> String {
    let trimmed = text.trim();

    let without_link = match trimmed.rfind("<a href") {
        Some(position) if trimmed[position..].contains(READ_MORE) => &trimmed[..position],
        _ => trimmed.strip_suffix(READ_MORE).unwrap_or(trimmed),
    };

    without_link.trim().to_string()
}

fn pick_image(images: &[Value]) -> Option<String> {
    IMAGE_SIZE_PRIORITY.iter().find_map(|size| {
        images
            .iter()
            .filter(|image| image["size"].as_str() == Some(size))
            .find_map(|image| image["#text"].as_str().and_then(non_empty))
    })
}

pub(crate) fn parse_artist_info(raw_json: &str) -> Result<ArtistInfo, ParseError> {
    let value: Value = serde_json::from_str(raw_json)?;
    let artist = &value["artist"];

    if artist.is_null() {
        return Ok(ArtistInfo::default());
    }

    let biography = artist["bio"]["content"]
        .as_str()
        .map(strip_read_more)
        .and_then(|bio| non_empty(&bio));
    let image_url = artist["image"]
        .as_array()
        .and_then(|images| pick_image(images));

    Ok(ArtistInfo {
        biography,
        image_url,
    })
}

pub(crate) fn parse_album_description(raw_json: &str) -> Result<Option<String>, ParseError> {
    let value: Value = serde_json::from_str(raw_json)?;

    Ok(value["album"]["wiki"]["content"]
        .as_str()
        .map(strip_read_more)
        .and_then(|content| non_empty(&content)))
}

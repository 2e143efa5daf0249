use crate::{non_empty, ParseError};
use serde_json::Value;

pub(crate) fn parse_artist_search(raw_json: &str) -> Result<Option<String>, ParseError> {
    let value: Value = serde_json::from_str(raw_json)?;

    Ok(value["artists"]
        .as_array()
        .and_then(|artists| artists.first())
        .and_then(|artist| artist["id"].as_str())
        .and_then(non_empty))
}

/// Wikipedia page title referenced by the artist's url relations.
pub(crate) fn parse_wikipedia_title(raw_json: &str) -> Result<Option<String>, ParseError> {
    let value: Value = serde_json::from_str(raw_json)?;

    let url = value["relations"].as_array().and_then(|relations| {
        relations
            .iter()
            .filter(|relation| {
                relation["type"]
                    .as_str()
                    .map_or(false, |kind| kind.eq_ignore_ascii_case("wikipedia"))
            })
            .find_map(|relation| match &relation["url"] {
                Value::Object(url) => url.get("resource").and_then(Value::as_str),
                Value::String(url) => Some(url.as_str()),
                _ => None,
            })
    });

    Ok(url.and_then(page_title_from_url))
}

pub(crate) fn page_title_from_url(url: &str) -> Option<String> {
    let (_, path) = url.split_once("wiki/")?;
    let path = path.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next()?;

    if segment.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(segment).ok()?;

    non_empty(&decoded.replace('_', " "))
}

pub(crate) fn parse_wikipedia_extract(raw_json: &str) -> Result<Option<String>, ParseError> {
    let value: Value = serde_json::from_str(raw_json)?;

    Ok(value["query"]["pages"].as_object().and_then(|pages| {
        pages
            .iter()
            .filter(|(page_id, _)| page_id.as_str() != "-1")
            .find_map(|(_, page)| page["extract"].as_str().and_then(non_empty))
    }))
}

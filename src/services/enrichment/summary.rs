use crate::services::catalog::CatalogItem;

/// Fallback album description composed from catalog detail.
pub(crate) fn album_summary(album: &CatalogItem) -> Option<String> {
    let mut parts = vec![];

    if let Some(release_date) = non_blank(album.basic.release_date.as_deref()) {
        parts.push(format!("Released {}.", release_date));
    }

    if let Some(label) = &album.extended.label {
        if let Some(label) = non_blank(Some(&label.value)) {
            parts.push(format!("Label: {}.", label));
        }
    }

    if let Some(copyrights) = &album.extended.copyrights {
        let texts = non_blank_values(&copyrights.value);

        if !texts.is_empty() {
            parts.push(texts.join(" "));
        }
    }

    if let Some(genres) = &album.extended.genres {
        let genres = non_blank_values(&genres.value);

        if !genres.is_empty() {
            parts.push(format!("Genre: {}.", genres.join(" / ")));
        }
    }

    join_parts(parts)
}

/// Fallback artist biography composed from genres and follower count.
pub(crate) fn artist_summary(artist: &CatalogItem) -> Option<String> {
    let mut parts = vec![];

    if let Some(genres) = &artist.extended.genres {
        let genres = non_blank_values(&genres.value);

        if !genres.is_empty() {
            parts.push(format!("Genres: {}.", genres.join(", ")));
        }
    }

    if let Some(followers) = &artist.extended.follower_count {
        parts.push(format_followers(followers.value));
    }

    join_parts(parts)
}

pub(crate) fn format_followers(followers: u64) -> String {
    if followers >= 1_000_000 {
        format!("{:.1}M followers.", followers as f64 / 1_000_000.0)
    } else if followers >= 1_000 {
        format!("{:.1}K followers.", followers as f64 / 1_000.0)
    } else {
        format!("{} followers.", followers)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn non_blank_values(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}

fn join_parts(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::testing::{album, artist};
    use crate::services::catalog::{FieldSource, Sourced};

    #[test]
    fn should_compose_album_summary_from_catalog_detail() {
        let mut item = album("al1", "ar1", "Deconstruction");
        item.extended.genres = Some(Sourced::new(
            vec!["dream trance".into(), "".into(), "piano".into()],
            FieldSource::Catalog,
        ));

        assert_eq!(
            album_summary(&item).as_deref(),
            Some(
                "Released 1996-02-19. Label: Deconstruction. (P) 1996 Deconstruction \
                 Genre: dream trance / piano."
            )
        );
    }

    #[test]
    fn should_skip_empty_album_parts() {
        let mut item = album("al1", "ar1", " ");
        item.basic.release_date = None;
        item.extended.copyrights = None;

        assert_eq!(album_summary(&item), None);
    }

    #[test]
    fn should_compose_artist_summary() {
        assert_eq!(
            artist_summary(&artist("ar1", &["trance", "dream trance"], 1_234_567)).as_deref(),
            Some("Genres: trance, dream trance. 1.2M followers.")
        );
        assert_eq!(
            artist_summary(&artist("ar2", &[], 15_300)).as_deref(),
            Some("15.3K followers.")
        );
        assert_eq!(
            artist_summary(&artist("ar3", &["idm"], 999)).as_deref(),
            Some("Genres: idm. 999 followers.")
        );
    }
}

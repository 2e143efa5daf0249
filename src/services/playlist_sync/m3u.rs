use crate::services::catalog::CatalogItem;
use xxhash_rust::xxh64::xxh64;

const MAX_FILENAME_LEN: usize = 200;
const EXTENSION: &str = ".m3u";
const HEADER: &str = "#EXTM3U\n";
const TITLE_PREFIX: &str = "#EXTINF:0,";
const UNKNOWN: &str = "Unknown";

const DEFAULT_TITLE: &str = "Playlist";

fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_ascii_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.trim() {
        "" => DEFAULT_TITLE.to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn compose_filename(prefix: &str, name: &str, suffix: &str) -> String {
    let budget = MAX_FILENAME_LEN
        .saturating_sub(prefix.chars().count())
        .saturating_sub(suffix.chars().count())
        .saturating_sub(EXTENSION.len());
    let truncated: String = sanitize(name).chars().take(budget).collect();

    format!("{}{}{}{}", prefix, truncated, suffix, EXTENSION)
}

/// `prefix` + sanitized `name` + `.m3u`, at most 200 characters long.
pub(crate) fn safe_playlist_filename(prefix: &str, name: &str) -> String {
    compose_filename(prefix, name, "")
}

/// Like [`safe_playlist_filename`], with up to `id_len` characters of the
/// playlist id appended so playlists sharing a name get distinct files.
pub(crate) fn disambiguated_playlist_filename(
    prefix: &str,
    name: &str,
    id: &str,
    id_len: usize,
) -> String {
    let local_id = id.rsplit(':').next().unwrap_or(id);
    let mut short_id: String = local_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(id_len)
        .collect();
    if short_id.is_empty() {
        short_id = listing_hash(id).chars().take(id_len.max(6)).collect();
    }

    compose_filename(prefix, name, &format!(" ({})", short_id))
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace(',', "\\,")
}

fn track_entry(track: &CatalogItem, proxy_port: u16) -> String {
    let duration_s = track.basic.duration_ms.unwrap_or_default() / 1000;

    let artists = track
        .basic
        .artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let artists = match artists.trim() {
        "" => UNKNOWN,
        artists => artists,
    };
    let title = match track.basic.name.trim() {
        "" => UNKNOWN,
        title => title,
    };

    format!(
        "#EXTINF:{},{}\nhttp://localhost:{}/track/{}/{}\n",
        duration_s,
        escape_label(&format!("{} - {}", artists, title)),
        proxy_port,
        track.id,
        duration_s
    )
}

/// Renders the playlist file. Identical input always renders identical bytes.
pub(crate) fn render_playlist(name: &str, tracks: &[CatalogItem], proxy_port: u16) -> String {
    let mut content = format!("{}{}{}\n\n", HEADER, TITLE_PREFIX, playlist_title(name));

    for track in tracks {
        content.push_str(&track_entry(track, proxy_port));
    }

    content
}

/// Replaces the playlist title of rendered content. `None` if `content` does
/// not look like a rendered playlist.
pub(crate) fn retitle(content: &str, name: &str) -> Option<String> {
    let rest = content.strip_prefix(HEADER)?.strip_prefix(TITLE_PREFIX)?;
    let (_, entries) = rest.split_once('\n')?;

    Some(format!(
        "{}{}{}\n{}",
        HEADER,
        TITLE_PREFIX,
        playlist_title(name),
        entries
    ))
}

fn playlist_title(name: &str) -> &str {
    match name.trim() {
        "" => DEFAULT_TITLE,
        trimmed => trimmed,
    }
}

pub(crate) fn listing_hash(content: &str) -> String {
    format!("{:016x}", xxh64(content.as_bytes(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::testing::track;
    use crate::services::catalog::ParentRef;

    #[test]
    fn should_render_header_and_entries() {
        let mut first = track("t1", "al1", "ar1", 215_999);
        first.basic.name = "Children".into();
        first.basic.artists = vec![
            ParentRef {
                id: "ar1".into(),
                name: "Robert Miles".into(),
            },
            ParentRef {
                id: "ar2".into(),
                name: "Back\\slash".into(),
            },
        ];
        let mut second = track("t2", "al1", "ar1", 0);
        second.basic.name = "".into();
        second.basic.artists = vec![];

        let content = render_playlist("Dream, Trance", &[first, second], 52308);

        assert_eq!(
            content,
            "#EXTM3U\n\
             #EXTINF:0,Dream, Trance\n\
             \n\
             #EXTINF:215,Robert Miles\\, Back\\\\slash - Children\n\
             http://localhost:52308/track/t1/215\n\
             #EXTINF:0,Unknown - Unknown\n\
             http://localhost:52308/track/t2/0\n"
        );
    }

    #[test]
    fn should_render_empty_playlist() {
        assert_eq!(
            render_playlist("Empty", &[], 1),
            "#EXTM3U\n#EXTINF:0,Empty\n\n"
        );
    }

    #[test]
    fn should_sanitize_file_names() {
        assert_eq!(
            safe_playlist_filename("Spotify - ", "AC/DC: Best? <Live>"),
            "Spotify - AC_DC_ Best_ _Live_.m3u"
        );
        assert_eq!(
            safe_playlist_filename("Spotify - ", "  \t "),
            "Spotify - _.m3u"
        );
        assert_eq!(safe_playlist_filename("Spotify - ", "   "), "Spotify - Playlist.m3u");
    }

    #[test]
    fn should_limit_file_name_length() {
        let filename = safe_playlist_filename("Spotify - ", &"ü".repeat(500));

        assert_eq!(filename.chars().count(), 200);
        assert!(filename.ends_with("ü.m3u"));
    }

    #[test]
    fn should_trim_playlist_title() {
        assert_eq!(
            render_playlist("  Road Trip \t", &[], 1),
            "#EXTM3U\n#EXTINF:0,Road Trip\n\n"
        );
        assert_eq!(
            render_playlist(" ", &[], 1),
            "#EXTM3U\n#EXTINF:0,Playlist\n\n"
        );
        assert_eq!(
            retitle(&render_playlist("Old", &[], 1), "").unwrap(),
            "#EXTM3U\n#EXTINF:0,Playlist\n\n"
        );
    }

    #[test]
    fn should_append_short_id_to_disambiguate_file_names() {
        assert_eq!(
            disambiguated_playlist_filename("Spotify - ", "Mix", "spotify:playlist:37i9dQZF1DX", 6),
            "Spotify - Mix (37i9dQ).m3u"
        );
        assert_eq!(
            disambiguated_playlist_filename("Spotify - ", "Mix", "p2", 6),
            "Spotify - Mix (p2).m3u"
        );

        let long = disambiguated_playlist_filename("Spotify - ", &"a".repeat(500), "p2", 6);
        assert_eq!(long.chars().count(), 200);
        assert!(long.ends_with("a (p2).m3u"));
    }

    #[test]
    fn should_retitle_rendered_content() {
        let content = render_playlist("Old", &[track("t1", "al1", "ar1", 1000)], 80);

        let retitled = retitle(&content, "New").unwrap();

        assert_eq!(retitled, render_playlist("New", &[track("t1", "al1", "ar1", 1000)], 80));
        assert_eq!(retitle("not a playlist", "New"), None);
    }

    #[test]
    fn should_hash_content_deterministically() {
        assert_eq!(listing_hash("abc"), listing_hash("abc"));
        assert_ne!(listing_hash("abc"), listing_hash("abd"));
        assert_eq!(listing_hash("abc").len(), 16);
    }
}

//! MIME classification for podcast files
//!
//! Maps mimetypes to the coarse categories used in feed documents and
//! derives the content types of a whole podcast from its files.

use crate::constants::mimetype::TYPE_THRESHOLD;

const TORRENT_EXT: &str = ".torrent";

/// Returns the simplified category for the given mimetype
///
/// All "wanted" mimetypes map to audio/video/image (plus the special
/// vimeo marker); everything else returns None.
pub fn get_type(mimetype: Option<&str>) -> Option<&'static str> {
    let mimetype = mimetype?;

    let (category, subtype) = mimetype.split_once('/')?;
    match category {
        "audio" => Some("audio"),
        "video" => Some("video"),
        "image" => Some("image"),
        _ => match subtype {
            "ogg" => Some("audio"),
            "x-youtube" => Some("video"),
            "x-vimeo" => Some("vimeo"),
            _ => None,
        },
    }
}

/// Returns the mimetype; if none is declared it is guessed from the URL
///
/// A trailing `.torrent` extension is stripped first so feeds that link
/// to torrent-wrapped enclosures still classify as the wrapped media.
pub fn get_mimetype(declared: Option<&str>, url: &str) -> Option<String> {
    let (declared, url) = if let Some(stripped) = url.strip_suffix(TORRENT_EXT) {
        (None, stripped)
    } else {
        (declared.filter(|m| !m.is_empty()), url)
    };

    if let Some(mimetype) = declared {
        return Some(mimetype.to_string());
    }

    // Strip the query string before guessing by extension
    let path = url.split('?').next().unwrap_or(url);
    mime_guess::from_path(path).first_raw().map(str::to_string)
}

/// Returns the types of a podcast, most frequent first
///
/// A podcast is considered to be of a given type if at least
/// `TYPE_THRESHOLD` of its files classify as that type.
pub fn get_podcast_types<'a, I>(mimetypes: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    // Count per category, preserving first-seen order for stable ties
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    let mut total = 0usize;

    for mimetype in mimetypes {
        let Some(category) = get_type(Some(mimetype)) else {
            continue;
        };
        total += 1;
        match counts.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category, 1)),
        }
    }

    if total == 0 {
        return Vec::new();
    }

    // Stable sort keeps insertion order between equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .filter(|(_, count)| *count as f64 / total as f64 >= TYPE_THRESHOLD)
        .map(|(category, _)| category.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_type() {
        assert_eq!(get_type(Some("audio/mpeg")), Some("audio"));
        assert_eq!(get_type(Some("video/mp4")), Some("video"));
        assert_eq!(get_type(Some("image/png")), Some("image"));
        assert_eq!(get_type(Some("application/ogg")), Some("audio"));
        assert_eq!(get_type(Some("application/x-youtube")), Some("video"));
        assert_eq!(get_type(Some("application/x-vimeo")), Some("vimeo"));
        assert_eq!(get_type(Some("text/html")), None);
        assert_eq!(get_type(Some("noslash")), None);
        assert_eq!(get_type(None), None);
    }

    #[test]
    fn test_get_mimetype_declared_wins() {
        assert_eq!(
            get_mimetype(Some("audio/mpeg"), "http://example.com/e.ogg"),
            Some("audio/mpeg".to_string())
        );
    }

    #[test]
    fn test_get_mimetype_guessed_from_extension() {
        assert_eq!(
            get_mimetype(None, "http://example.com/episode.mp3"),
            Some("audio/mpeg".to_string())
        );
        assert_eq!(get_mimetype(None, "http://example.com/episode"), None);
    }

    #[test]
    fn test_get_mimetype_torrent_stripped() {
        assert_eq!(
            get_mimetype(
                Some("application/x-bittorrent"),
                "http://example.com/episode.mp3.torrent"
            ),
            Some("audio/mpeg".to_string())
        );
    }

    #[test]
    fn test_podcast_types_threshold() {
        // 8 audio, 2 video: 2/10 meets the 20% threshold
        let mut mimetypes = vec!["audio/mpeg"; 8];
        mimetypes.extend(vec!["video/mp4"; 2]);
        assert_eq!(
            get_podcast_types(mimetypes.iter().copied()),
            vec!["audio".to_string(), "video".to_string()]
        );

        // 9 audio, 1 video: 1/10 falls below the threshold
        let mut mimetypes = vec!["audio/mpeg"; 9];
        mimetypes.push("video/mp4");
        assert_eq!(
            get_podcast_types(mimetypes.iter().copied()),
            vec!["audio".to_string()]
        );
    }

    #[test]
    fn test_podcast_types_idempotent_ordering() {
        let mimetypes = ["video/mp4", "audio/mpeg", "audio/mpeg"];
        let first = get_podcast_types(mimetypes.iter().copied());
        let second = get_podcast_types(mimetypes.iter().copied());
        assert_eq!(first, vec!["audio".to_string(), "video".to_string()]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_podcast_types_empty() {
        assert_eq!(get_podcast_types(std::iter::empty()), Vec::<String>::new());
    }
}

//! Generic RSS/Atom feed extraction
//!
//! `feed-rs` drives the heavy lifting; a supplemental single-pass XML
//! scan recovers the handful of fields it does not surface (iTunes
//! durations and authors, feed relocation markers).

use feed_rs::model as rss;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::fetch::FeedResource;
use crate::parse::models::{Episode, Feed, File};
use crate::parse::{vimeo, youtube, ParseError};
use crate::utils::time::parse_time;
use crate::utils::url::url_fix;
use crate::{mimetype, parse};

/// How entry `<link>` elements are turned into files
///
/// The generic path recognizes both YouTube and Vimeo watch URLs; the
/// source adapters restrict extraction to their own platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFileMode {
    Standard,
    YoutubeOnly,
    VimeoOnly,
}

/// Generic parser for RSS and Atom documents
///
/// Source adapters reuse its extraction and override the pieces their
/// platform does differently.
pub struct Feedparser;

impl Feedparser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a fetched resource into a normalized feed
    pub fn parse_resource(
        &self,
        resource: &FeedResource,
        link_mode: LinkFileMode,
    ) -> Result<Feed, ParseError> {
        // A recorded permanent redirect can leave us without a body; the
        // relocation still has to reach the caller
        if resource.content.is_empty() {
            if resource.permanent_redirect.is_some() {
                let mut feed = self.feed_shell(resource);
                feed.set_episodes(Vec::new());
                return Ok(feed);
            }
            return Err(ParseError::InvalidDocument("empty document".to_string()));
        }

        let parsed = feed_rs::parser::parse(resource.content.as_slice())
            .map_err(|e| ParseError::InvalidDocument(e.to_string()))?;
        let extras = scan_extras(&resource.content);

        let mut feed = self.extract_feed(&parsed, &extras, resource);

        let episodes = parsed
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                self.extract_episode(entry, extras.items.get(index), link_mode)
            })
            .collect();
        feed.set_episodes(episodes);

        Ok(feed)
    }

    /// The resource-derived parts of a feed, without document contents
    pub fn feed_shell(&self, resource: &FeedResource) -> Feed {
        let mut feed = Feed::new(resource.urls.clone());
        feed.new_location = resource.permanent_redirect.clone();
        feed.http_last_modified = resource.last_modified_raw.clone();
        feed.http_etag = resource.etag.clone();
        feed
    }

    fn extract_feed(
        &self,
        parsed: &rss::Feed,
        extras: &Supplement,
        resource: &FeedResource,
    ) -> Feed {
        let mut feed = self.feed_shell(resource);

        feed.title = parsed.title.as_ref().map(|t| t.content.clone());
        feed.link = parsed
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .map(|l| l.href.clone());
        feed.description = parsed.description.as_ref().map(|d| d.content.clone());
        feed.language = parsed.language.clone();
        feed.author = parsed
            .authors
            .first()
            .map(|a| a.name.clone())
            .or_else(|| extras.channel_author.clone());

        if feed.new_location.is_none() {
            feed.new_location = extras.new_location.clone();
        }

        feed.logo = parsed
            .logo
            .as_ref()
            .map(|l| l.uri.clone())
            .or_else(|| parsed.icon.as_ref().map(|i| i.uri.clone()))
            .map(|uri| url_fix(&uri));

        feed.tags = self.extract_tags(parsed);
        feed.hub = link_with_rel(&parsed.links, "hub");
        feed.flattr = link_with_rel(&parsed.links, "payment");

        feed
    }

    /// Tags are the union of comma-split `term`s and `label`s of all
    /// category-like nodes
    fn extract_tags(&self, parsed: &rss::Feed) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        let mut push = |tag: &str| {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        };

        for category in &parsed.categories {
            for part in category.term.split(',') {
                push(part);
            }
            if let Some(label) = &category.label {
                push(label);
            }
        }

        tags
    }

    pub fn extract_episode(
        &self,
        entry: &rss::Entry,
        extras: Option<&ItemExtras>,
        link_mode: LinkFileMode,
    ) -> Episode {
        let mut episode = Episode::default();

        episode.guid = Some(entry.id.clone()).filter(|id| !id.is_empty());
        episode.title = entry.title.as_ref().map(|t| t.content.clone());
        episode.link = entry.links.first().map(|l| l.href.clone());
        episode.author = entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .or_else(|| extras.and_then(|e| e.author.clone()));

        episode.description = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| episode.link.clone());

        episode.content = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .filter(|body| !body.is_empty());

        episode.duration = extras
            .and_then(|e| e.duration.as_deref())
            .and_then(parse_time)
            .or_else(|| {
                entry
                    .media
                    .iter()
                    .find_map(|m| m.duration)
                    .map(|d| d.as_secs() as u32)
            });

        // dates before 1970 don't fit a released timestamp
        episode.released = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.timestamp())
            .filter(|ts| *ts >= 0);

        episode.flattr = link_with_rel(&entry.links, "payment");

        for file in self.extract_files(entry, link_mode) {
            episode.add_file(file);
        }

        episode
    }

    /// Files come from enclosures and media:content (merged by feed-rs),
    /// then from watch-page links of the video platforms
    fn extract_files(&self, entry: &rss::Entry, link_mode: LinkFileMode) -> Vec<File> {
        let mut files = Vec::new();

        if link_mode == LinkFileMode::Standard {
            for media in &entry.media {
                for content in &media.content {
                    let Some(url) = content.url.as_ref().map(|u| u.to_string()) else {
                        continue;
                    };
                    let declared = content.content_type.as_ref().map(|m| m.to_string());
                    let guessed = mimetype::get_mimetype(declared.as_deref(), &url);
                    if mimetype::get_type(guessed.as_deref()).is_none() {
                        continue;
                    }
                    files.push(File::new(vec![url], guessed, content.size));
                }
            }
        }

        for link in &entry.links {
            if link_mode != LinkFileMode::VimeoOnly && youtube::is_video_link(&link.href) {
                files.push(File::new(
                    vec![link.href.clone()],
                    Some("application/x-youtube".to_string()),
                    None,
                ));
            } else if link_mode != LinkFileMode::YoutubeOnly && vimeo::is_video_link(&link.href) {
                files.push(File::new(
                    vec![link.href.clone()],
                    Some("application/x-vimeo".to_string()),
                    None,
                ));
            }
        }

        files
    }
}

impl Default for Feedparser {
    fn default() -> Self {
        Self::new()
    }
}

/// The always-matching fallback adapter
pub struct FeedparserAdapter {
    parser: Feedparser,
}

impl FeedparserAdapter {
    pub fn new() -> Self {
        Self {
            parser: Feedparser::new(),
        }
    }
}

impl Default for FeedparserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl parse::FeedAdapter for FeedparserAdapter {
    fn handles_url(&self, _url: &str) -> bool {
        true
    }

    async fn parse(
        &self,
        _ctx: &parse::ParseContext,
        resource: &FeedResource,
        _opts: &parse::ParseOptions,
    ) -> Result<Feed, ParseError> {
        self.parser.parse_resource(resource, LinkFileMode::Standard)
    }
}

fn link_with_rel(links: &[rss::Link], rel: &str) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some(rel))
        .map(|l| l.href.clone())
}

/// Fields feed-rs does not surface, recovered by a direct XML pass
#[derive(Debug, Default)]
pub struct Supplement {
    pub new_location: Option<String>,
    pub channel_author: Option<String>,
    pub items: Vec<ItemExtras>,
}

#[derive(Debug, Default, Clone)]
pub struct ItemExtras {
    pub duration: Option<String>,
    pub author: Option<String>,
}

/// Single streaming pass over the document for iTunes extras and
/// relocation markers
fn scan_extras(content: &[u8]) -> Supplement {
    let mut reader = Reader::from_reader(content);
    reader.trim_text(true);

    let mut supplement = Supplement::default();
    let mut buf = Vec::new();
    let mut element_stack: Vec<String> = Vec::new();
    let mut item_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if is_item_element(&name) {
                    item_depth += 1;
                    supplement.items.push(ItemExtras::default());
                }
                element_stack.push(name);
            }
            Ok(Event::End(_)) => {
                if let Some(name) = element_stack.pop() {
                    if is_item_element(&name) {
                        item_depth = item_depth.saturating_sub(1);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(element) = element_stack.last() else {
                    buf.clear();
                    continue;
                };
                let text = t.unescape().unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    buf.clear();
                    continue;
                }

                if item_depth > 0 {
                    let extras = supplement.items.last_mut().expect("item stack tracked");
                    match element.as_str() {
                        "itunes:duration" => extras.duration.get_or_insert(text),
                        "itunes:author" => extras.author.get_or_insert(text),
                        _ => {
                            buf.clear();
                            continue;
                        }
                    };
                } else {
                    match element.as_str() {
                        "itunes:new-feed-url" | "newlocation" => {
                            supplement.new_location.get_or_insert(text)
                        }
                        "itunes:author" => supplement.channel_author.get_or_insert(text),
                        _ => {
                            buf.clear();
                            continue;
                        }
                    };
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    supplement
}

fn is_item_element(name: &str) -> bool {
    name == "item" || name == "entry"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource_with(content: &str) -> FeedResource {
        let mut resource = FeedResource::empty("http://example.com/feed");
        resource.content = content.as_bytes().to_vec();
        resource
    }

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Test Cast</title>
    <link>http://example.com/</link>
    <description>A test podcast</description>
    <language>en</language>
    <itunes:author>The Author</itunes:author>
    <itunes:new-feed-url>http://example.com/newfeed</itunes:new-feed-url>
    <atom:link rel="hub" href="http://hub.example.com/"/>
    <category>Technology, Linux</category>
    <item>
      <guid>ep-1</guid>
      <title>Episode 1</title>
      <link>http://example.com/1</link>
      <description>First one</description>
      <itunes:duration>05:10</itunes:duration>
      <pubDate>Mon, 03 Feb 2020 10:00:00 GMT</pubDate>
      <enclosure url="http://example.com/1.mp3" length="1234" type="audio/mpeg"/>
    </item>
    <item>
      <guid>ep-2</guid>
      <title>Episode 2</title>
      <link>http://example.com/2</link>
      <description>Second one</description>
      <itunes:duration>1:05:10</itunes:duration>
      <pubDate>Mon, 10 Feb 2020 10:00:00 GMT</pubDate>
      <enclosure url="http://example.com/2.mp3" length="5678" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_sample_rss() {
        let parser = Feedparser::new();
        let feed = parser
            .parse_resource(&resource_with(SAMPLE_RSS), LinkFileMode::Standard)
            .unwrap();

        assert_eq!(feed.title.as_deref(), Some("Test Cast"));
        assert_eq!(feed.link.as_deref(), Some("http://example.com/"));
        assert_eq!(feed.description.as_deref(), Some("A test podcast"));
        assert_eq!(feed.language.as_deref(), Some("en"));
        assert_eq!(feed.hub.as_deref(), Some("http://hub.example.com/"));
        assert_eq!(feed.new_location.as_deref(), Some("http://example.com/newfeed"));
        assert!(feed.tags.contains(&"Technology".to_string()));
        assert!(feed.tags.contains(&"Linux".to_string()));
        assert_eq!(feed.episodes.len(), 2);
        assert_eq!(feed.content_types, vec!["audio"]);
    }

    #[test]
    fn test_episode_extraction() {
        let parser = Feedparser::new();
        let feed = parser
            .parse_resource(&resource_with(SAMPLE_RSS), LinkFileMode::Standard)
            .unwrap();

        let first = &feed.episodes[0];
        assert_eq!(first.guid.as_deref(), Some("ep-1"));
        assert_eq!(first.title.as_deref(), Some("Episode 1"));
        assert_eq!(first.duration, Some(310));
        assert_eq!(first.files.len(), 1);
        assert_eq!(first.files[0].urls, vec!["http://example.com/1.mp3"]);
        assert_eq!(first.files[0].mimetype.as_deref(), Some("audio/mpeg"));
        assert_eq!(first.files[0].filesize, Some(1234));
        assert!(first.released.is_some());

        let second = &feed.episodes[1];
        assert_eq!(second.duration, Some(3910));
    }

    #[test]
    fn test_common_title_derivation_on_parse() {
        let parser = Feedparser::new();
        let feed = parser
            .parse_resource(&resource_with(SAMPLE_RSS), LinkFileMode::Standard)
            .unwrap();

        assert_eq!(feed.common_title.as_deref(), Some("Episode "));
        assert_eq!(feed.episodes[0].number, Some(1));
        assert_eq!(feed.episodes[1].number, Some(2));
    }

    #[test]
    fn test_invalid_document() {
        let parser = Feedparser::new();
        let result = parser.parse_resource(
            &resource_with("this is not xml at all"),
            LinkFileMode::Standard,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_permanent_redirect_without_body() {
        let parser = Feedparser::new();
        let mut resource = FeedResource::empty("http://example.com/feed");
        resource.permanent_redirect = Some("http://other.example.com/feed".to_string());
        resource.last_modified_local = Utc::now();

        let feed = parser
            .parse_resource(&resource, LinkFileMode::Standard)
            .unwrap();
        assert_eq!(
            feed.new_location.as_deref(),
            Some("http://other.example.com/feed")
        );
        assert!(feed.episodes.is_empty());
    }

    #[test]
    fn test_scan_extras() {
        let extras = scan_extras(SAMPLE_RSS.as_bytes());
        assert_eq!(
            extras.new_location.as_deref(),
            Some("http://example.com/newfeed")
        );
        assert_eq!(extras.channel_author.as_deref(), Some("The Author"));
        assert_eq!(extras.items.len(), 2);
        assert_eq!(extras.items[0].duration.as_deref(), Some("05:10"));
        assert_eq!(extras.items[1].duration.as_deref(), Some("1:05:10"));
    }

    #[test]
    fn test_youtube_links_become_files() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Uploads</title>
  <entry>
    <id>yt:video:abc</id>
    <title>Clip</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=abc123"/>
    <updated>2020-02-03T10:00:00Z</updated>
  </entry>
</feed>"#;
        let parser = Feedparser::new();
        let feed = parser
            .parse_resource(&resource_with(atom), LinkFileMode::Standard)
            .unwrap();
        let files = &feed.episodes[0].files;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].mimetype.as_deref(), Some("application/x-youtube"));
    }
}

//! Normalized feed documents
//!
//! Plain records for the JSON output plus the derivations that run over
//! a finished episode list: common-title detection, episode numbering and
//! the podcast-level content-type summary.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

use crate::mimetype;
use crate::parse::text::TextProcessor;
use crate::utils::text::longest_substr;

/// A normalized podcast feed
#[derive(Debug, Default, Clone, Serialize)]
pub struct Feed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flattr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_etag: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
    pub episodes: Vec<Episode>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub warnings: BTreeMap<String, String>,

    /// Longest title prefix shared by all episodes, kept for derivation
    #[serde(skip)]
    pub common_title: Option<String>,
    /// Set by adapters whose sources have a known fixed media type
    #[serde(skip)]
    content_types_override: Option<Vec<String>>,
}

impl Feed {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Default::default()
        }
    }

    /// A stub feed carrying nothing but the failed URL and the error
    pub fn stub(url: &str, key: &str, message: &str) -> Self {
        let mut feed = Self::new(vec![url.to_string()]);
        feed.add_error(key, message);
        feed
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors.insert(key.to_string(), message.to_string());
    }

    pub fn add_warning(&mut self, key: &str, message: &str) {
        self.warnings.insert(key.to_string(), message.to_string());
    }

    /// Install the episode list and run all episode-dependent derivations
    pub fn set_episodes(&mut self, episodes: Vec<Episode>) {
        self.episodes = episodes;
        self.derive();
    }

    /// Pin the content types instead of deriving them from files
    pub fn override_content_types(&mut self, types: Vec<String>) {
        self.content_types_override = Some(types.clone());
        self.content_types = types;
    }

    /// Apply a text processor to all free-text fields
    ///
    /// URL-ish and validator fields are left alone; the derived episode
    /// fields are recomputed afterwards from the processed titles.
    pub fn apply_text_processor(&mut self, processor: &TextProcessor) {
        for field in [
            &mut self.title,
            &mut self.description,
            &mut self.author,
            &mut self.language,
            &mut self.http_last_modified,
        ] {
            process_field(field, processor);
        }
        for tag in &mut self.tags {
            *tag = processor.process(tag);
        }

        for episode in &mut self.episodes {
            for field in [
                &mut episode.guid,
                &mut episode.title,
                &mut episode.description,
                &mut episode.content,
                &mut episode.author,
                &mut episode.language,
            ] {
                process_field(field, processor);
            }
        }

        self.derive();
    }

    /// Recompute common title, episode numbering and content types
    fn derive(&mut self) {
        self.common_title = self.compute_common_title();

        let number_re = Regex::new(r"^\W*(\d+)").expect("Invalid regex");
        let leading_re = Regex::new(r"^[\W\d]+").expect("Invalid regex");
        for episode in &mut self.episodes {
            episode.derive_title_parts(self.common_title.as_deref(), &number_re, &leading_re);
        }

        self.content_types = match &self.content_types_override {
            Some(types) => types.clone(),
            None => {
                let mimetypes = self
                    .episodes
                    .iter()
                    .flat_map(|e| e.files.iter())
                    .filter_map(|f| f.mimetype.as_deref());
                mimetype::get_podcast_types(mimetypes)
            }
        };
    }

    /// The longest substring shared by all episode titles, truncated at
    /// the first digit so episode numbers survive stripping
    fn compute_common_title(&self) -> Option<String> {
        let titles: Vec<&str> = self
            .episodes
            .iter()
            .filter_map(|e| e.title.as_deref())
            .filter(|t| !t.is_empty())
            .collect();

        if titles.is_empty() {
            return None;
        }

        let common = longest_substr(&titles);

        // consider only the part up to the first number, otherwise we risk
        // removing part of the number (eg a feed with episodes 100-199)
        let non_digit = Regex::new(r"^\D*").expect("Invalid regex");
        let common = non_digit
            .find(&common)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        if common.trim().chars().count() < 2 {
            return None;
        }

        Some(common)
    }
}

fn process_field(field: &mut Option<String>, processor: &TextProcessor) {
    if let Some(value) = field {
        *field = Some(processor.process(value));
    }
}

/// A normalized episode
#[derive(Debug, Default, Clone, Serialize)]
pub struct Episode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Release time in unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released: Option<i64>,
    pub files: Vec<File>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flattr: Option<String>,
}

impl Episode {
    /// Derive `number` and `short_title` from the non-repeating part of
    /// the title
    fn derive_title_parts(
        &mut self,
        common_title: Option<&str>,
        number_re: &Regex,
        leading_re: &Regex,
    ) {
        self.number = None;
        self.short_title = None;

        let (Some(title), Some(common)) = (self.title.as_deref(), common_title) else {
            return;
        };

        let stripped = title.replace(common, "");
        let stripped = stripped.trim();

        self.number = number_re
            .captures(stripped)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        self.short_title = Some(leading_re.replace(stripped, "").to_string());
    }

    /// Append a file unless one with the same URL list exists already
    pub fn add_file(&mut self, file: File) {
        if self.files.iter().any(|f| f.urls == file.urls) {
            return;
        }
        self.files.push(file);
    }
}

/// One media reference within an episode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct File {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

impl File {
    pub fn new(urls: Vec<String>, mimetype: Option<String>, filesize: Option<u64>) -> Self {
        Self {
            urls,
            mimetype,
            filesize,
        }
    }
}

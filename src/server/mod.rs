//! HTTP endpoints
//!
//! Two routes carry the whole service: `/parse` turns feed URLs into
//! normalized JSON documents, `/subscribe` is the PubSubHubbub callback
//! (GET for verification, POST for update notifications).

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED, VARY};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::parse::{Feed, LogoFormat, ParseContext, ParseOptions, ParserRegistry, TextProcessor};
use crate::pubsub::VerifyParams;

/// Shared state for all request handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ParserRegistry>,
    pub ctx: Arc<ParseContext>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/parse", get(parse).post(parse))
        .route("/subscribe", get(verify).post(notify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let flattr = state
        .ctx
        .config
        .flattr_thing
        .as_deref()
        .map(|thing| format!("<p>Flattr this service: {}</p>\n", thing))
        .unwrap_or_default();

    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>feedserve</title></head>\n<body>\n\
         <h1>feedserve</h1>\n\
         <p>Fetches podcast feeds and returns them as JSON.</p>\n\
         <p>Usage: <code>/parse?url=&lt;feed-url&gt;</code></p>\n{}\
         </body></html>\n",
        flattr
    ))
}

/// Query parameters of the parse endpoint
#[derive(Debug, Default)]
struct ParseQuery {
    urls: Vec<String>,
    inline_logo: bool,
    scale_logo: Option<u32>,
    logo_format: Option<LogoFormat>,
    strip_html: bool,
    process_text: Option<String>,
    use_cache: bool,
}

impl ParseQuery {
    fn from_raw(raw: Option<&str>) -> Self {
        let mut query = Self {
            use_cache: true,
            ..Default::default()
        };

        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "url" => query.urls.push(value.into_owned()),
                "inline_logo" => query.inline_logo = is_true(&value),
                "scale_logo" => {
                    query.scale_logo = value.parse().ok().filter(|&size: &u32| size > 0)
                }
                "logo_format" => query.logo_format = LogoFormat::from_name(&value),
                "strip_html" => query.strip_html = is_true(&value),
                "process_text" => query.process_text = Some(value.into_owned()),
                "use_cache" => query.use_cache = is_true(&value),
                _ => {}
            }
        }

        query
    }

    fn text_processor(&self) -> Option<TextProcessor> {
        // newer process_text wins over the deprecated strip_html flag
        if let Some(name) = &self.process_text {
            return TextProcessor::from_name(name);
        }
        if self.strip_html {
            return Some(TextProcessor::StripHtml);
        }
        None
    }
}

fn is_true(value: &str) -> bool {
    !matches!(value, "" | "0" | "false")
}

async fn parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = ParseQuery::from_raw(raw.as_deref());

    if query.urls.is_empty() {
        return (StatusCode::BAD_REQUEST, "parameter url missing").into_response();
    }

    let if_modified_since = headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let opts = ParseOptions {
        inline_logo: query.inline_logo,
        scale_to: query.scale_logo,
        logo_format: query.logo_format,
        text_processor: query.text_processor(),
        use_cache: query.use_cache,
        if_modified_since,
    };

    debug!(urls = ?query.urls, "parsing batch");
    let feeds = state.registry.parse_batch(&state.ctx, &query.urls, &opts).await;

    let accept = headers.get("accept").and_then(|v| v.to_str().ok());
    send_feeds(&feeds, accept)
}

fn send_feeds(feeds: &[Feed], accept: Option<&str>) -> Response {
    const SUPPORTED_FORMATS: [&str; 2] = ["text/html", "application/json"];

    let format = select_media_type(&SUPPORTED_FORMATS, accept);

    let mut response = match format {
        Some("text/html") => {
            let pretty = serde_json::to_string_pretty(feeds).unwrap_or_default();
            let escaped = escape_html(&pretty);
            Html(format!(
                "<!DOCTYPE html>\n<html><body><pre>{}</pre></body></html>\n",
                escaped
            ))
            .into_response()
        }
        // json is the default
        _ => {
            let dense = serde_json::to_string(feeds).unwrap_or_default();
            ([(CONTENT_TYPE, "application/json")], dense).into_response()
        }
    };

    if let Some(last_modified) = earliest_last_modified(feeds) {
        if let Ok(value) = last_modified.to_rfc2822().parse() {
            response.headers_mut().insert(LAST_MODIFIED, value);
        }
    }
    response
        .headers_mut()
        .insert(VARY, "Accept, User-Agent, Accept-Encoding".parse().unwrap());

    response
}

/// The earliest Last-Modified across all returned feeds
fn earliest_last_modified(feeds: &[Feed]) -> Option<DateTime<Utc>> {
    feeds
        .iter()
        .filter_map(|f| f.http_last_modified.as_deref())
        .filter_map(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .min()
}

async fn verify(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let mut params = VerifyParams {
        mode: String::new(),
        topic: String::new(),
        challenge: String::new(),
        lease_seconds: None,
        verify_token: String::new(),
    };

    for (key, value) in url::form_urlencoded::parse(raw.as_deref().unwrap_or("").as_bytes()) {
        match key.as_ref() {
            "hub.mode" => params.mode = value.into_owned(),
            "hub.topic" => params.topic = value.into_owned(),
            "hub.challenge" => params.challenge = value.into_owned(),
            "hub.lease_seconds" => params.lease_seconds = Some(value.into_owned()),
            "hub.verify_token" => params.verify_token = value.into_owned(),
            _ => {}
        }
    }

    let Some(subscriber) = &state.ctx.subscriber else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match subscriber.handle_verify(&params).await {
        Ok(Some(challenge)) => (StatusCode::OK, challenge).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "verification failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn notify(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let feed_url = url::form_urlencoded::parse(raw.as_deref().unwrap_or("").as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned());

    let Some(subscriber) = &state.ctx.subscriber else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(feed_url) = feed_url else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match subscriber.handle_notify(&feed_url).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(url = %feed_url, error = %e, "notification rejected");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Pick a media type from an Accept header with q-values
///
/// Entries are sorted by descending quality; the first supported one
/// wins. A wildcard sets the default quality for everything else.
fn select_media_type<'a>(supported: &[&'a str], accept: Option<&str>) -> Option<&'a str> {
    // json is what most clients mean when they send nothing
    let accept = accept.unwrap_or("application/json");

    let mut default_q = 1.0f32;
    let mut entries: Vec<(&str, f32)> = Vec::new();

    for part in accept.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (value, q) = match part.split_once(';') {
            Some((value, params)) => {
                let q = params
                    .split(';')
                    .filter_map(|p| p.trim().strip_prefix("q="))
                    .filter_map(|q| q.parse().ok())
                    .next()
                    .unwrap_or(1.0);
                (value.trim(), q)
            }
            None => (part, 1.0),
        };

        if value == "*" || value == "*/*" {
            default_q = q;
        }
        entries.push((value, q));
    }

    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (value, q) in &entries {
        if *q <= 0.0 {
            continue;
        }
        if let Some(matched) = supported.iter().copied().find(|s| s == value) {
            return Some(matched);
        }
    }

    if default_q > 0.0 {
        Some(supported[0])
    } else {
        None
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_urls() {
        let query = ParseQuery::from_raw(Some(
            "url=http%3A%2F%2Fa.example%2Ffeed&url=http%3A%2F%2Fb.example%2Ffeed",
        ));
        assert_eq!(
            query.urls,
            vec!["http://a.example/feed", "http://b.example/feed"]
        );
        assert!(query.use_cache);
        assert!(!query.inline_logo);
    }

    #[test]
    fn test_parse_query_options() {
        let query = ParseQuery::from_raw(Some(
            "url=x&inline_logo=1&scale_logo=64&logo_format=png&use_cache=0",
        ));
        assert!(query.inline_logo);
        assert_eq!(query.scale_logo, Some(64));
        assert_eq!(query.logo_format, Some(LogoFormat::Png));
        assert!(!query.use_cache);
    }

    #[test]
    fn test_parse_query_scale_zero_means_off() {
        let query = ParseQuery::from_raw(Some("url=x&scale_logo=0"));
        assert_eq!(query.scale_logo, None);
    }

    #[test]
    fn test_text_processor_selection() {
        let query = ParseQuery::from_raw(Some("url=x&strip_html=1"));
        assert_eq!(query.text_processor(), Some(TextProcessor::StripHtml));

        // process_text overrides the deprecated flag
        let query = ParseQuery::from_raw(Some("url=x&strip_html=1&process_text=markdown"));
        assert_eq!(query.text_processor(), Some(TextProcessor::Markdown));

        let query = ParseQuery::from_raw(Some("url=x&process_text=none"));
        assert_eq!(query.text_processor(), None);
    }

    #[test]
    fn test_select_media_type() {
        let supported = ["text/html", "application/json"];

        assert_eq!(select_media_type(&supported, None), Some("application/json"));
        assert_eq!(
            select_media_type(&supported, Some("application/json")),
            Some("application/json")
        );
        assert_eq!(
            select_media_type(&supported, Some("text/html")),
            Some("text/html")
        );
        assert_eq!(
            select_media_type(&supported, Some("text/html;q=0.5, application/json")),
            Some("application/json")
        );
        // unknown types fall back to the first supported entry
        assert_eq!(
            select_media_type(&supported, Some("application/xml")),
            Some("text/html")
        );
        assert_eq!(
            select_media_type(&supported, Some("application/xml, *;q=0")),
            None
        );
    }

    #[test]
    fn test_earliest_last_modified() {
        let mut older = Feed::new(vec!["http://a.example/feed".to_string()]);
        older.http_last_modified = Some("Mon, 03 Feb 2020 10:00:00 GMT".to_string());
        let mut newer = Feed::new(vec!["http://b.example/feed".to_string()]);
        newer.http_last_modified = Some("Mon, 10 Feb 2020 10:00:00 GMT".to_string());

        let earliest = earliest_last_modified(&[newer, older]).unwrap();
        assert_eq!(earliest.to_rfc2822(), "Mon, 3 Feb 2020 10:00:00 +0000");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a> & <b>"), "&lt;a&gt; &amp; &lt;b&gt;");
    }
}

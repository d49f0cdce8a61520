use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Message shown when the proxy gives us nothing better.
pub const DEFAULT_FETCH_ERROR: &str = "Failed to fetch feed";

/// Metadata about a newsletter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Story {
    /// Percent-encoded feed guid, safe to embed in a fragment
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
}

/// A fetched newsletter: its metadata and stories, newest first as served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Newsletter {
    pub publication: Publication,
    pub stories: Vec<Story>,
}

#[derive(Debug, Error)]
pub enum FeedFetchError {
    /// The proxy answered with a non-ok status and said why.
    #[error("{0}")]
    Upstream(String),
    #[error("Failed to fetch feed")]
    Rejected,
    #[error("Failed to fetch feed")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to fetch feed")]
    Malformed(#[from] serde_json::Error),
}

impl FeedFetchError {
    /// Text shown to the reader in place of the stories.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Anything that can turn a newsletter name into its stories.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, username: &str) -> Result<Newsletter, FeedFetchError>;
}

// Proxy response shapes. Every field is optional upstream.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    feed: Option<ProxyFeed>,
    #[serde(default)]
    items: Vec<ProxyItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ProxyFeed {
    title: Option<String>,
    description: Option<String>,
    image: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProxyItem {
    guid: Option<String>,
    title: Option<String>,
    author: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    content: Option<String>,
    // Usually an object with a link, sometimes an empty array.
    enclosure: Option<Value>,
    thumbnail: Option<String>,
    link: Option<String>,
}

/// Fetches feeds through an RSS-to-JSON proxy such as rss2json.com.
pub struct Rss2JsonClient {
    client: Client,
    config: Config,
}

impl Rss2JsonClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
        })
    }

    /// Interpret a proxy response body.
    pub fn parse_response(body: &[u8]) -> Result<Newsletter, FeedFetchError> {
        let response: ProxyResponse = serde_json::from_slice(body)?;

        if response.status.as_deref() != Some("ok") {
            return Err(match non_empty(response.message) {
                Some(message) => FeedFetchError::Upstream(message),
                None => FeedFetchError::Rejected,
            });
        }

        let feed = response.feed.unwrap_or_default();
        Ok(Newsletter {
            publication: Publication {
                title: feed.title,
                description: feed.description,
                image: feed.image,
                link: feed.link,
            },
            stories: response.items.into_iter().map(story_from_item).collect(),
        })
    }
}

#[async_trait]
impl FeedSource for Rss2JsonClient {
    async fn fetch_feed(&self, username: &str) -> Result<Newsletter, FeedFetchError> {
        let feed_url = self.config.feed_url_for(username);
        info!("Fetching feed for @{} ({})", username, feed_url);

        // The JSON status decides success, not the HTTP status.
        let response = self
            .client
            .get(&self.config.proxy_url)
            .query(&[("rss_url", feed_url.as_str())])
            .send()
            .await;

        let body = match response {
            Ok(response) => response.bytes().await,
            Err(e) => Err(e),
        }
        .map_err(|e| {
            warn!("Proxy request for @{} failed: {}", username, e);
            FeedFetchError::from(e)
        })?;

        let newsletter = Self::parse_response(&body).map_err(|e| {
            warn!("Proxy rejected feed for @{}: {:?}", username, e);
            e
        })?;

        info!(
            "Fetched {} stories for @{}",
            newsletter.stories.len(),
            username
        );
        Ok(newsletter)
    }
}

fn story_from_item(item: ProxyItem) -> Story {
    let image = item
        .enclosure
        .as_ref()
        .and_then(|e| e.get("link"))
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .map(str::to_string)
        .or_else(|| non_empty(item.thumbnail));

    Story {
        id: encode_story_id(item.guid.as_deref().unwrap_or_default()),
        title: item.title.unwrap_or_default(),
        author: item.author,
        date: item.pub_date.as_deref().and_then(parse_pub_date),
        excerpt: item.description,
        content: item.content,
        image,
        link: item.link,
    }
}

/// Percent-encode the way `encodeURIComponent` does.
pub fn encode_uri_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

pub fn encode_story_id(guid: &str) -> String {
    encode_uri_component(guid)
}

/// Parse a feed item's publication date.
///
/// The proxy reports `YYYY-MM-DD HH:MM:SS` in UTC; RFC 3339 and RFC 2822 are
/// accepted as well.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

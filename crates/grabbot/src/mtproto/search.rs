//! Keyword search across a fixed list of public channels

use async_trait::async_trait;

use super::client::MtProtoClient;
use super::error::MtProtoError;
use grabcore::config;

/// One matching channel post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    /// Public link of the channel the post came from
    pub channel: String,
    pub text: String,
}

#[async_trait]
pub trait ChannelSearch: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Vec<SearchHit>, MtProtoError>;
}

/// Username of a public channel given as `https://t.me/s/name`,
/// `https://t.me/name`, `@name` or `name`
pub fn channel_username(link: &str) -> Option<&str> {
    let link = link.trim();
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .unwrap_or(link);
    let path = rest
        .strip_prefix("t.me/")
        .or_else(|| rest.strip_prefix("telegram.me/"))
        .unwrap_or(rest);
    let path = path.strip_prefix("s/").unwrap_or(path);
    let name = path.trim_start_matches('@').split(['/', '?']).next()?;

    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Searches channels through a signed-in user session
pub struct MtProtoSearch {
    client: MtProtoClient,
    channels: Vec<String>,
    per_channel: usize,
    max_results: usize,
}

impl MtProtoSearch {
    pub fn new(client: MtProtoClient, channels: Vec<String>) -> Self {
        Self {
            client,
            channels,
            per_channel: config::search::PER_CHANNEL_LIMIT,
            max_results: config::search::MAX_RESULTS,
        }
    }

    /// None when the API credentials are not set
    pub async fn from_config() -> Result<Option<Self>, MtProtoError> {
        match MtProtoClient::from_config().await {
            Ok(client) => Ok(Some(Self::new(client, config::search::CHANNELS.clone()))),
            Err(MtProtoError::NotConfigured(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_channel(&self, username: &str, keyword: &str) -> Result<Vec<SearchHit>, MtProtoError> {
        let Some(chat) = self.client.inner().resolve_username(username).await? else {
            log::debug!("Channel @{} does not exist", username);
            return Ok(Vec::new());
        };

        let mut messages = self
            .client
            .inner()
            .search_messages(chat.pack())
            .query(keyword)
            .limit(self.per_channel);

        let mut hits = Vec::new();
        while let Some(message) = messages.next().await? {
            let text = message.text();
            if !text.trim().is_empty() {
                hits.push(SearchHit {
                    channel: format!("https://t.me/{}", username),
                    text: text.to_string(),
                });
            }
        }
        Ok(hits)
    }
}

#[async_trait]
impl ChannelSearch for MtProtoSearch {
    async fn search(&self, keyword: &str) -> Result<Vec<SearchHit>, MtProtoError> {
        let mut hits = Vec::new();
        for link in &self.channels {
            if hits.len() >= self.max_results {
                break;
            }
            let Some(username) = channel_username(link) else {
                log::warn!("Skipping malformed channel link {}", link);
                continue;
            };
            // one unreachable channel must not fail the whole search
            match self.search_channel(username, keyword).await {
                Ok(mut found) => hits.append(&mut found),
                Err(e) => log::debug!("Search in {} failed: {}", link, e),
            }
        }
        hits.truncate(self.max_results);
        log::info!("Keyword search for {:?} found {} posts", keyword, hits.len());
        Ok(hits)
    }
}

use std::time::Duration;

use consumer_types::TopicName;
use log::info;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::configs::{ConfigError, SourceConfig};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TopicList {
    topics: Vec<String>,
}

// nsqlookupd before 1.0 wraps every response in a status envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicsResponse {
    Current(TopicList),
    Legacy { data: TopicList },
}

pub fn parse_topics_response(body: &[u8]) -> Result<Vec<String>, serde_json::Error> {
    let response: TopicsResponse = serde_json::from_slice(body)?;
    Ok(match response {
        TopicsResponse::Current(list) => list.topics,
        TopicsResponse::Legacy { data } => data.topics,
    })
}

/// Asks the first configured nsqlookupd for every topic it knows about.
pub async fn discover_topics(source: &SourceConfig) -> Result<Vec<TopicName>, ConfigError> {
    let SourceConfig::Lookupd(addresses) = source else {
        return Err(ConfigError::DiscoveryWithoutLookupd);
    };
    let Some(address) = addresses.first() else {
        return Err(ConfigError::DiscoveryWithoutLookupd);
    };

    let url = format!("{}/topics", address.trim_end_matches('/'));
    let fetch_error = |source| ConfigError::Discovery {
        address: address.clone(),
        source,
    };
    let client = reqwest::Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .map_err(fetch_error)?;
    let body = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/vnd.nsq; version=1.0")
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?
        .bytes()
        .await
        .map_err(fetch_error)?;

    let names = parse_topics_response(&body).map_err(|source| ConfigError::DiscoveryResponse {
        address: address.clone(),
        source,
    })?;
    if names.is_empty() {
        return Err(ConfigError::NoTopicsDiscovered(address.clone()));
    }
    info!("Fetched topics: {}", names.join(", "));

    let topics = names
        .into_iter()
        .map(TopicName::new)
        .collect::<Result<Vec<_>, _>>()?;
    for topic in &topics {
        topic.channel()?;
    }
    Ok(topics)
}

/// [`discover_topics`], abandoned with `Ok(None)` once `shutdown` is cancelled.
pub async fn discover_topics_until(
    source: &SourceConfig,
    shutdown: &CancellationToken,
) -> Result<Option<Vec<TopicName>>, ConfigError> {
    tokio::select! {
        _ = shutdown.cancelled() => Ok(None),
        topics = discover_topics(source) => topics.map(Some),
    }
}

use std::fmt::Display;
use std::time::Duration;

use clap::Parser;
use consumer_types::{NameError, TopicName};
use thiserror::Error;

use crate::broker::ReaderConfig;

pub const DEFAULT_NSQD_TCP_ADDRESS: &str = "nsqd:4150";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Subscribe to NSQ topics and log every message received
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Whitespace-separated list of topics to consume
    #[arg(long, env = "TOPICS")]
    pub topics: Option<String>,

    /// A single topic to consume, used when TOPICS is blank
    #[arg(long, env = "TOPIC")]
    pub topic: Option<String>,

    /// nsqlookupd HTTP addresses; when set, daemons are discovered through them
    #[arg(
        long = "lookupd-http-address",
        env = "NSQLOOKUPD_HTTP_ADDRESSES",
        value_delimiter = ','
    )]
    pub lookupd_http_addresses: Vec<String>,

    /// Single nsqlookupd HTTP address, used when no --lookupd-http-address is given
    #[arg(long = "lookupd", env = "NSQLOOKUPD_HTTP_ADDRESS")]
    pub lookupd_http_address: Option<String>,

    /// nsqd TCP addresses to connect to directly when no lookupd is configured
    #[arg(
        long = "nsqd-tcp-address",
        env = "NSQD_TCP_ADDRESSES",
        value_delimiter = ',',
        default_value = DEFAULT_NSQD_TCP_ADDRESS
    )]
    pub nsqd_tcp_addresses: Vec<String>,

    /// Seconds between nsqlookupd polls
    #[arg(
        long,
        env = "LOOKUPD_POLL_INTERVAL",
        default_value_t = DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval: u64,

    /// Messages each reader may hold un-acknowledged at once
    #[arg(
        long,
        env = "MAX_IN_FLIGHT",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_in_flight: u32,

    /// Ask nsqlookupd for every known topic when none are configured
    #[arg(long, env = "DISCOVER_TOPICS")]
    pub discover_topics: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no topics configured: set TOPICS (space-separated) or TOPIC")]
    NoTopics,
    #[error("invalid topic configuration: {0}")]
    InvalidName(#[from] NameError),
    #[error("no nsqd or nsqlookupd addresses configured")]
    NoAddresses,
    #[error("topic discovery needs an nsqlookupd HTTP address")]
    DiscoveryWithoutLookupd,
    #[error("failed to fetch topics from {address}: {source}")]
    Discovery {
        address: String,
        source: reqwest::Error,
    },
    #[error("failed to parse topics from {address}: {source}")]
    DiscoveryResponse {
        address: String,
        source: serde_json::Error,
    },
    #[error("no topics found on {0}")]
    NoTopicsDiscovered(String),
}

/// Where readers find the daemons that hold their topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceConfig {
    Lookupd(Vec<String>),
    Nsqd(Vec<String>),
}

impl Display for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::Lookupd(addresses) => write!(f, "nsqlookupd {}", addresses.join(",")),
            SourceConfig::Nsqd(addresses) => write!(f, "nsqd {}", addresses.join(",")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsumerSettings {
    pub topics: Vec<TopicName>,
    pub source: SourceConfig,
    pub poll_interval: Duration,
    pub max_in_flight: u32,
    pub discover_topics: bool,
}

impl ConsumerSettings {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let topics = select_topics(args.topics.as_deref(), args.topic.as_deref())
            .into_iter()
            .map(TopicName::new)
            .collect::<Result<Vec<_>, _>>()?;
        for topic in &topics {
            topic.channel()?;
        }

        let mut lookupd = clean_addresses(&args.lookupd_http_addresses)
            .map(with_http_scheme)
            .collect::<Vec<_>>();
        if lookupd.is_empty() {
            lookupd.extend(
                args.lookupd_http_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|address| !address.is_empty())
                    .map(with_http_scheme),
            );
        }
        let nsqd = clean_addresses(&args.nsqd_tcp_addresses)
            .map(str::to_string)
            .collect::<Vec<_>>();
        let source = if !lookupd.is_empty() {
            SourceConfig::Lookupd(lookupd)
        } else if !nsqd.is_empty() {
            SourceConfig::Nsqd(nsqd)
        } else {
            return Err(ConfigError::NoAddresses);
        };

        if topics.is_empty() {
            if !args.discover_topics {
                return Err(ConfigError::NoTopics);
            }
            if !matches!(source, SourceConfig::Lookupd(_)) {
                return Err(ConfigError::DiscoveryWithoutLookupd);
            }
        }

        Ok(Self {
            topics,
            source,
            poll_interval: Duration::from_secs(args.poll_interval),
            max_in_flight: args.max_in_flight,
            discover_topics: args.discover_topics,
        })
    }

    /// One reader configuration per topic, in configuration order.
    pub fn reader_configs(&self) -> Result<Vec<ReaderConfig>, ConfigError> {
        if self.topics.is_empty() {
            return Err(ConfigError::NoTopics);
        }
        self.topics
            .iter()
            .map(|topic| {
                Ok(ReaderConfig {
                    topic: topic.clone(),
                    channel: topic.channel()?,
                    source: self.source.clone(),
                    poll_interval: self.poll_interval,
                    max_in_flight: self.max_in_flight,
                })
            })
            .collect()
    }
}

/// Splits a topic list on whitespace, dropping blanks. Order and duplicates are kept.
pub fn parse_topics(value: &str) -> Vec<&str> {
    value.split_whitespace().collect()
}

/// TOPICS wins when it holds at least one name; otherwise TOPIC is used.
pub fn select_topics<'a>(topics: Option<&'a str>, topic: Option<&'a str>) -> Vec<&'a str> {
    let many = topics.map(parse_topics).unwrap_or_default();
    if !many.is_empty() {
        return many;
    }
    topic.map(parse_topics).unwrap_or_default()
}

fn clean_addresses(addresses: &[String]) -> impl Iterator<Item = &str> {
    addresses
        .iter()
        .map(|address| address.trim())
        .filter(|address| !address.is_empty())
}

fn with_http_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

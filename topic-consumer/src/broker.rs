use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use consumer_types::{ChannelName, TopicName};
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configs::SourceConfig;
use crate::handler::MessageHandler;

/// Everything a queue client needs to open one subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    pub topic: TopicName,
    pub channel: ChannelName,
    pub source: SourceConfig,
    pub poll_interval: Duration,
    pub max_in_flight: u32,
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    fn name(&self) -> &str;

    /// Starts consuming `config.topic` on `config.channel`. Delivery begins as
    /// soon as this returns; every message goes through `handler`.
    async fn open_reader(&self, config: ReaderConfig, handler: MessageHandler) -> Result<Reader>;
}

/// One live subscription. The delivery task runs until [`Reader::close`].
#[derive(Debug)]
pub struct Reader {
    topic: TopicName,
    channel: ChannelName,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Reader {
    pub fn new(config: &ReaderConfig, shutdown: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            topic: config.topic.clone(),
            channel: config.channel.clone(),
            shutdown,
            task,
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub async fn close(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Reader for topic {} ended abnormally: {e}", self.topic);
        }
        info!("Closed reader for topic {} ({})", self.topic, self.channel);
    }
}

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use consumer_types::InputMessage;
use log::{debug, info, warn};
use tokio_nsq::{
    NSQChannel, NSQConsumer, NSQConsumerConfig, NSQConsumerConfigSources, NSQConsumerLookupConfig,
    NSQRequeueDelay, NSQTopic,
};
use tokio_util::sync::CancellationToken;

use crate::broker::{MessageBroker, Reader, ReaderConfig};
use crate::configs::SourceConfig;
use crate::handler::MessageHandler;

#[derive(Clone, Debug)]
pub struct NsqBroker {
    name: String,
}

impl NsqBroker {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    fn sources(source: &SourceConfig, poll_interval: Duration) -> NSQConsumerConfigSources {
        match source {
            SourceConfig::Lookupd(addresses) => NSQConsumerConfigSources::Lookup(
                NSQConsumerLookupConfig::new()
                    .set_poll_interval(poll_interval)
                    .set_addresses(addresses.iter().cloned().collect::<HashSet<_>>()),
            ),
            SourceConfig::Nsqd(addresses) => NSQConsumerConfigSources::Daemons(addresses.clone()),
        }
    }

    async fn deliver(
        mut consumer: NSQConsumer,
        handler: MessageHandler,
        shutdown: CancellationToken,
    ) {
        let topic = handler.topic().to_string();
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = consumer.consume_filtered() => message,
            };
            let Some(message) = message else {
                warn!("NSQ consumer for {topic} stopped delivering");
                break;
            };
            debug!("Received NSQ message on {topic}");
            let input = InputMessage {
                message: message.body.clone(),
                attempt: message.attempt,
            };
            if handler.handle(&input).is_success() {
                message.finish().await;
            } else {
                message.requeue(NSQRequeueDelay::DefaultDelay).await;
            }
        }
        // Dropping the consumer tears down its daemon connections.
        drop(consumer);
        debug!("NSQ consumer for {topic} released");
    }
}

#[async_trait]
impl MessageBroker for NsqBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_reader(&self, config: ReaderConfig, handler: MessageHandler) -> Result<Reader> {
        let topic = NSQTopic::new(config.topic.as_str())
            .ok_or_else(|| anyhow!("NSQ rejected topic name {}", config.topic))?;
        let channel = NSQChannel::new(config.channel.as_str())
            .ok_or_else(|| anyhow!("NSQ rejected channel name {}", config.channel))?;

        let consumer = NSQConsumerConfig::new(topic, channel)
            .set_max_in_flight(config.max_in_flight)
            .set_sources(Self::sources(&config.source, config.poll_interval))
            .build();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(Self::deliver(consumer, handler, shutdown.clone()));
        info!(
            "Started consumer for topic: {} (channel {}, {}, broker {})",
            config.topic, config.channel, config.source, self.name
        );
        Ok(Reader::new(&config, shutdown, task))
    }
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use consumer_types::{ChannelName, Disposition, InputMessage};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::broker::{MessageBroker, Reader, ReaderConfig};
use crate::handler::MessageHandler;

type Delivery = (InputMessage, oneshot::Sender<Disposition>);

#[derive(Clone, Debug)]
struct Subscription {
    id: u64,
    channel: ChannelName,
    sender: mpsc::Sender<Delivery>,
}

/// Queue client stand-in. Each published message goes to one reader per
/// distinct channel of its topic, and the publisher gets the dispositions back.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBroker {
    map: Arc<DashMap<String, Vec<Subscription>>>,
    rejected_topics: Arc<HashSet<String>>,
    next_id: Arc<AtomicU64>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl InMemoryBroker {
    /// A broker that refuses to open readers for the given topics.
    pub fn rejecting(topics: &[&str]) -> Self {
        Self {
            rejected_topics: Arc::new(topics.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn opened_readers(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_readers(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn live_readers(&self, topic: &str) -> usize {
        self.map.get(topic).map(|subs| subs.len()).unwrap_or(0)
    }

    pub async fn publish(&self, topic: &str, body: &[u8]) -> Result<Vec<Disposition>> {
        let targets = {
            let Some(subs) = self.map.get(topic) else {
                return Ok(vec![]);
            };
            let mut seen = HashSet::new();
            subs.iter()
                .filter(|sub| seen.insert(sub.channel.clone()))
                .map(|sub| sub.sender.clone())
                .collect::<Vec<_>>()
        };

        let mut dispositions = Vec::with_capacity(targets.len());
        for sender in targets {
            let (reply, result) = oneshot::channel();
            let message = InputMessage {
                message: body.to_vec(),
                attempt: 1,
            };
            sender.send((message, reply)).await?;
            dispositions.push(result.await?);
        }
        Ok(dispositions)
    }

    async fn deliver(
        self,
        topic: String,
        id: u64,
        handler: MessageHandler,
        mut rx: mpsc::Receiver<Delivery>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = rx.recv() => {
                    let Some((message, reply)) = delivery else {
                        break;
                    };
                    let _ = reply.send(handler.handle(&message));
                }
            }
        }
        if let Some(mut subs) = self.map.get_mut(&topic) {
            subs.retain(|sub| sub.id != id);
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn open_reader(&self, config: ReaderConfig, handler: MessageHandler) -> Result<Reader> {
        let topic = config.topic.to_string();
        if self.rejected_topics.contains(&topic) {
            bail!("refusing to open a reader for {topic}");
        }
        let (sender, rx) = mpsc::channel(10);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.map.entry(topic.clone()).or_default().push(Subscription {
            id,
            channel: config.channel.clone(),
            sender,
        });
        self.opened.fetch_add(1, Ordering::SeqCst);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.clone().deliver(
            topic,
            id,
            handler,
            rx,
            shutdown.clone(),
        ));
        Ok(Reader::new(&config, shutdown, task))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use consumer_types::TopicName;

    use super::*;
    use crate::configs::SourceConfig;

    fn config(topic: &str) -> ReaderConfig {
        let topic = TopicName::new(topic).unwrap();
        ReaderConfig {
            channel: topic.channel().unwrap(),
            topic,
            source: SourceConfig::Nsqd(vec!["nsqd:4150".to_string()]),
            poll_interval: Duration::from_secs(15),
            max_in_flight: 1,
        }
    }

    async fn open(broker: &InMemoryBroker, topic: &str) -> Reader {
        let config = config(topic);
        let handler = MessageHandler::new(config.topic.clone());
        broker.open_reader(config, handler).await.unwrap()
    }

    #[tokio::test]
    async fn a_published_message_gets_handled_by_the_reader_of_its_topic() {
        let broker = InMemoryBroker::default();
        let reader = open(&broker, "orders").await;

        let result = broker.publish("orders", br#"{"event":"created"}"#).await.unwrap();
        assert_eq!(result, vec![Disposition::Finish]);

        reader.close().await;
    }

    #[tokio::test]
    async fn a_published_message_doesnt_reach_other_topics() {
        let broker = InMemoryBroker::default();
        let reader = open(&broker, "orders").await;

        let result = broker.publish("payments", b"{}").await.unwrap();
        assert!(result.is_empty());

        reader.close().await;
    }

    #[tokio::test]
    async fn readers_sharing_a_channel_split_the_messages() {
        let broker = InMemoryBroker::default();
        let first = open(&broker, "orders").await;
        let second = open(&broker, "orders").await;
        assert_eq!(broker.live_readers("orders"), 2);

        let result = broker.publish("orders", b"[]").await.unwrap();
        assert_eq!(result, vec![Disposition::Finish]);

        first.close().await;
        second.close().await;
    }

    #[tokio::test]
    async fn closing_a_reader_unsubscribes_it() {
        let broker = InMemoryBroker::default();
        let reader = open(&broker, "orders").await;
        assert_eq!(reader.channel().as_str(), "orders_consumer");

        reader.close().await;
        assert_eq!(broker.live_readers("orders"), 0);
        assert_eq!(broker.closed_readers(), 1);
        assert!(broker.publish("orders", b"{}").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_topics_do_not_open() {
        let broker = InMemoryBroker::rejecting(&["payments"]);
        let config = config("payments");
        let handler = MessageHandler::new(config.topic.clone());
        assert!(broker.open_reader(config, handler).await.is_err());
        assert_eq!(broker.opened_readers(), 0);
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use log::{error, info};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::broker::{MessageBroker, Reader, ReaderConfig};
use crate::configs::ConsumerSettings;
use crate::handler::MessageHandler;

/// How often the idle loop wakes while readers do their work.
pub const IDLE_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

pub struct ConsumerRunner {
    broker: Arc<dyn MessageBroker>,
    settings: ConsumerSettings,
    state: watch::Sender<LifecycleState>,
}

impl ConsumerRunner {
    pub fn new(broker: Arc<dyn MessageBroker>, settings: ConsumerSettings) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            broker,
            settings,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Opens one reader per topic, idles until `shutdown` is cancelled, then
    /// closes every reader.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let configs = self.settings.reader_configs()?;
        let readers = self.open_readers(configs).await?;

        self.state.send_replace(LifecycleState::Running);
        info!(
            "Consuming {} topic(s) through {}: {}",
            readers.len(),
            self.broker.name(),
            describe_readers(&readers)
        );
        idle(&shutdown).await;

        self.state.send_replace(LifecycleState::ShuttingDown);
        info!("Shutting down consumers...");
        close_all(readers).await;
        self.state.send_replace(LifecycleState::Terminated);
        info!("All consumers closed");
        Ok(())
    }

    async fn open_readers(&self, configs: Vec<ReaderConfig>) -> Result<Vec<Reader>> {
        let mut readers = Vec::with_capacity(configs.len());
        for config in configs {
            let topic = config.topic.clone();
            let handler = MessageHandler::new(topic.clone());
            match self.broker.open_reader(config, handler).await {
                Ok(reader) => readers.push(reader),
                Err(e) => {
                    error!("Could not create consumer for topic {topic}: {e:?}");
                    close_all(readers).await;
                    return Err(e).context(format!("could not create consumer for topic {topic}"));
                }
            }
        }
        Ok(readers)
    }
}

async fn idle(shutdown: &CancellationToken) {
    let mut ticker = tokio::time::interval(IDLE_TICK);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
    }
}

fn describe_readers(readers: &[Reader]) -> String {
    readers
        .iter()
        .map(|reader| format!("{} ({})", reader.topic(), reader.channel()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn close_all(readers: Vec<Reader>) {
    join_all(readers.into_iter().map(Reader::close)).await;
}

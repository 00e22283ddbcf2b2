use std::sync::Arc;

use anyhow::{Context, Error};
use clap::Parser;
use env_logger::Env;
use log::info;
use tokio_util::sync::CancellationToken;
use topic_consumer::{
    broker::MessageBroker,
    configs::{Args, ConsumerSettings},
    consumer_runner::ConsumerRunner,
    discovery::discover_topics_until,
    nsq_broker::NsqBroker,
    signals::{cancel_on_signal, ShutdownSignals},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_logger();

    let signals = ShutdownSignals::install().context("failed to listen for shutdown signals")?;
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(signals, shutdown.clone()));

    let mut settings = ConsumerSettings::from_args(Args::parse())?;
    if settings.topics.is_empty() && settings.discover_topics {
        match discover_topics_until(&settings.source, &shutdown).await? {
            Some(topics) => settings.topics = topics,
            None => {
                info!("Shut down before any topics were discovered");
                return Ok(());
            }
        }
    }

    let broker: Arc<dyn MessageBroker> = Arc::new(NsqBroker::new("nsq".to_string()));
    info!("Setting up consumers");
    ConsumerRunner::new(broker, settings).run(shutdown).await
}

fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();
}

pub mod broker;
pub mod configs;
pub mod consumer_runner;
pub mod discovery;
pub mod handler;
#[cfg(test)]
pub mod in_memory_broker;
pub mod nsq_broker;
pub mod signals;

//! The broker handle shared by publishers, the command consumer and streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use registry_core::correlation::{CorrelationId, DEFAULT_RESULT_CHANNEL_PREFIX};
use registry_core::error::TransportError;
use registry_core::transport::{
    CommandDelivery, CommandPublisher, EventProducer, EventSubscription, EventTransport,
    MessageId, OutgoingCommand, ReceivedMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channels::{InMemoryProducer, InMemorySubscription};
use crate::commands::InMemoryCommandReceiver;

/// Broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How many times a negatively acknowledged command is redelivered before
    /// it is dead-lettered.
    pub max_redeliveries: u32,
    /// Prefix of every per-correlation result channel name.
    pub result_channel_prefix: String,
    /// How long a result channel nobody has subscribed to is kept before it
    /// is discarded together with its buffered messages.
    pub unclaimed_channel_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 3,
            result_channel_prefix: DEFAULT_RESULT_CHANNEL_PREFIX.to_owned(),
            unclaimed_channel_ttl: Duration::from_secs(10),
        }
    }
}

/// A per-correlation channel. `receiver` is parked here until the (single)
/// subscriber takes it.
pub(crate) struct Topic {
    pub(crate) sender: mpsc::UnboundedSender<ReceivedMessage>,
    pub(crate) receiver: Option<mpsc::UnboundedReceiver<ReceivedMessage>>,
    created_at: Instant,
}

impl Topic {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
            created_at: Instant::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.receiver.is_some() && self.created_at.elapsed() >= ttl
    }
}

pub(crate) struct BrokerInner {
    pub(crate) config: BrokerConfig,
    next_message_id: AtomicU64,
    commands_tx: Mutex<Option<mpsc::UnboundedSender<CommandDelivery>>>,
    commands_rx: Mutex<Option<mpsc::UnboundedReceiver<CommandDelivery>>>,
    dead_letters: Mutex<Vec<CommandDelivery>>,
    pub(crate) topics: Mutex<HashMap<String, Topic>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BrokerInner {
    pub(crate) fn next_message_id(&self) -> MessageId {
        self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Puts a delivery (back) on the command queue. Returns the delivery if
    /// the queue has shut down.
    pub(crate) fn enqueue_command(
        &self,
        delivery: CommandDelivery,
    ) -> Result<(), CommandDelivery> {
        match lock(&self.commands_tx).as_ref() {
            Some(tx) => tx.send(delivery).map_err(|err| err.0),
            None => Err(delivery),
        }
    }

    pub(crate) fn dead_letter(&self, delivery: CommandDelivery, reason: &str) {
        warn!(
            delivery_id = delivery.delivery_id,
            redelivery_count = delivery.redelivery_count,
            reason,
            "dead-lettering command"
        );
        lock(&self.dead_letters).push(delivery);
    }

    pub(crate) fn release_topic(&self, scope: &str) {
        if lock(&self.topics).remove(scope).is_some() {
            debug!(scope, "released result channel");
        }
    }

    /// Opens (or finds) the topic for `scope`, discarding unclaimed topics
    /// older than the configured ttl first.
    fn topic<'a>(&self, topics: &'a mut HashMap<String, Topic>, scope: &str) -> &'a mut Topic {
        let ttl = self.config.unclaimed_channel_ttl;
        let before = topics.len();
        topics.retain(|_, topic| !topic.is_stale(ttl));
        let discarded = before - topics.len();
        if discarded > 0 {
            debug!(discarded, "discarded unclaimed result channels");
        }
        topics.entry(scope.to_owned()).or_insert_with(Topic::new)
    }
}

/// In-process broker. Cloning is cheap; all clones share the same queues.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("config", &self.inner.config)
            .field("open_channels", &self.open_channel_count())
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl InMemoryBroker {
    /// Creates a broker with the given settings.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BrokerInner {
                config,
                next_message_id: AtomicU64::new(0),
                commands_tx: Mutex::new(Some(commands_tx)),
                commands_rx: Mutex::new(Some(commands_rx)),
                dead_letters: Mutex::new(Vec::new()),
                topics: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Takes the consuming end of the command queue. There is exactly one
    /// command consumer per broker.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SubscriptionActive` if the receiver was
    /// already taken.
    pub fn command_receiver(&self) -> Result<InMemoryCommandReceiver, TransportError> {
        let rx = lock(&self.inner.commands_rx)
            .take()
            .ok_or_else(|| TransportError::SubscriptionActive("commands".to_owned()))?;
        Ok(InMemoryCommandReceiver::new(Arc::clone(&self.inner), rx))
    }

    /// Stops accepting commands. The consumer drains what is queued and then
    /// observes the end of the queue.
    pub fn shutdown(&self) {
        lock(&self.inner.commands_tx).take();
    }

    /// Commands that exhausted their redeliveries.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<CommandDelivery> {
        lock(&self.inner.dead_letters).clone()
    }

    /// Number of result channels currently held by the broker.
    #[must_use]
    pub fn open_channel_count(&self) -> usize {
        lock(&self.inner.topics).len()
    }

    fn scope_for(&self, correlation_id: CorrelationId) -> String {
        correlation_id.scope(&self.inner.config.result_channel_prefix)
    }
}

#[async_trait]
impl CommandPublisher for InMemoryBroker {
    async fn publish(&self, command: OutgoingCommand) -> Result<(), TransportError> {
        let delivery = CommandDelivery {
            delivery_id: self.inner.next_message_id(),
            redelivery_count: 0,
            properties: command.properties,
            payload: command.payload,
        };
        let delivery_id = delivery.delivery_id;
        self.inner
            .enqueue_command(delivery)
            .map_err(|_| TransportError::Closed)?;
        debug!(delivery_id, "published command");
        Ok(())
    }
}

#[async_trait]
impl EventTransport for InMemoryBroker {
    async fn subscribe(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventSubscription>, TransportError> {
        let scope = self.scope_for(correlation_id);
        let receiver = {
            let mut topics = lock(&self.inner.topics);
            self.inner
                .topic(&mut topics, &scope)
                .receiver
                .take()
                .ok_or_else(|| TransportError::SubscriptionActive(scope.clone()))?
        };
        debug!(scope = %scope, "opened subscription");
        Ok(Box::new(InMemorySubscription::new(
            Arc::clone(&self.inner),
            scope,
            receiver,
        )))
    }

    async fn create_producer(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventProducer>, TransportError> {
        let scope = self.scope_for(correlation_id);
        let sender = {
            let mut topics = lock(&self.inner.topics);
            self.inner.topic(&mut topics, &scope).sender.clone()
        };
        Ok(Box::new(InMemoryProducer::new(
            Arc::clone(&self.inner),
            scope,
            sender,
        )))
    }
}

//! Transport doubles: scripted subscriptions and recording producers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use registry_core::correlation::CorrelationId;
use registry_core::error::TransportError;
use registry_core::transport::{
    CommandPublisher, EventProducer, EventSubscription, EventTransport, MessageId,
    OutgoingCommand, ReceivedMessage,
};

/// One scripted outcome of `EventSubscription::receive`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// A message with this payload arrives.
    Message(Vec<u8>),
    /// Nothing arrives before the timeout.
    Silence,
    /// The receive fails with a transport error carrying this reason.
    Fail(String),
    /// The receive never completes.
    Pending,
}

#[derive(Debug, Default)]
struct ProbeState {
    acknowledged: Vec<MessageId>,
    receive_calls: usize,
    unsubscribe_calls: usize,
}

/// Observes a `ScriptedSubscription` after it has been handed off.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SubscriptionProbe {
    /// Ids of acknowledged messages, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn acknowledged(&self) -> Vec<MessageId> {
        self.state.lock().unwrap().acknowledged.clone()
    }

    /// How many times `receive` was called.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn receive_calls(&self) -> usize {
        self.state.lock().unwrap().receive_calls
    }

    /// How many times `unsubscribe` was called.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn unsubscribe_calls(&self) -> usize {
        self.state.lock().unwrap().unsubscribe_calls
    }
}

/// An `EventSubscription` that plays back a script. Once the script runs
/// out, every receive reports silence.
#[derive(Debug)]
pub struct ScriptedSubscription {
    scope: String,
    steps: VecDeque<ScriptStep>,
    next_message_id: MessageId,
    fail_unsubscribe: bool,
    probe: SubscriptionProbe,
}

impl ScriptedSubscription {
    /// Creates a subscription that plays `steps` in order.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            scope: "scripted".to_owned(),
            steps: steps.into(),
            next_message_id: 0,
            fail_unsubscribe: false,
            probe: SubscriptionProbe::default(),
        }
    }

    /// Makes `unsubscribe` fail (it is still counted).
    #[must_use]
    pub fn failing_unsubscribe(mut self) -> Self {
        self.fail_unsubscribe = true;
        self
    }

    /// A handle for inspecting the subscription after it is moved.
    #[must_use]
    pub fn probe(&self) -> SubscriptionProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl EventSubscription for ScriptedSubscription {
    fn scope(&self) -> &str {
        &self.scope
    }

    async fn receive(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, TransportError> {
        self.probe.state.lock().unwrap().receive_calls += 1;
        match self.steps.pop_front() {
            Some(ScriptStep::Message(payload)) => {
                self.next_message_id += 1;
                Ok(Some(ReceivedMessage {
                    message_id: self.next_message_id,
                    payload,
                }))
            }
            Some(ScriptStep::Silence) | None => Ok(None),
            Some(ScriptStep::Fail(reason)) => Err(TransportError::ReceiveFailed {
                scope: self.scope.clone(),
                reason,
            }),
            Some(ScriptStep::Pending) => std::future::pending().await,
        }
    }

    async fn acknowledge(&mut self, message_id: MessageId) -> Result<(), TransportError> {
        self.probe
            .state
            .lock()
            .unwrap()
            .acknowledged
            .push(message_id);
        Ok(())
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        let calls = {
            let mut state = self.probe.state.lock().unwrap();
            state.unsubscribe_calls += 1;
            state.unsubscribe_calls
        };
        if self.fail_unsubscribe {
            return Err(TransportError::SubscriptionFailed {
                scope: self.scope.clone(),
                reason: "broker refused unsubscribe".to_owned(),
            });
        }
        if calls > 1 {
            return Err(TransportError::SubscriptionClosed(self.scope.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProducerLog {
    sent: Vec<(CorrelationId, Vec<u8>)>,
    created: usize,
    closed: usize,
}

/// An `EventTransport` that records what producers send and hands out one
/// pre-scripted subscription.
#[derive(Debug, Default)]
pub struct RecordingEventTransport {
    log: Arc<Mutex<ProducerLog>>,
    subscription: Mutex<Option<ScriptedSubscription>>,
    fail_send: bool,
    fail_close: bool,
}

impl RecordingEventTransport {
    /// Creates a transport whose producers always succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `subscription` to the first `subscribe` call.
    #[must_use]
    pub fn with_subscription(self, subscription: ScriptedSubscription) -> Self {
        *self.subscription.lock().unwrap() = Some(subscription);
        self
    }

    /// Makes every producer `send` fail.
    #[must_use]
    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Makes every producer `close` fail.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every accepted message, with the correlation id of its channel.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<(CorrelationId, Vec<u8>)> {
        self.log.lock().unwrap().sent.clone()
    }

    /// Number of producers created.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn producers_created(&self) -> usize {
        self.log.lock().unwrap().created
    }

    /// Number of `close` calls across all producers.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn producers_closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }
}

#[async_trait]
impl EventTransport for RecordingEventTransport {
    async fn subscribe(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventSubscription>, TransportError> {
        let subscription = self.subscription.lock().unwrap().take();
        match subscription {
            Some(subscription) => Ok(Box::new(subscription)),
            None => Err(TransportError::SubscriptionActive(correlation_id.to_string())),
        }
    }

    async fn create_producer(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventProducer>, TransportError> {
        self.log.lock().unwrap().created += 1;
        Ok(Box::new(RecordingProducer {
            correlation_id,
            log: Arc::clone(&self.log),
            fail_send: self.fail_send,
            fail_close: self.fail_close,
            next_message_id: 0,
        }))
    }
}

struct RecordingProducer {
    correlation_id: CorrelationId,
    log: Arc<Mutex<ProducerLog>>,
    fail_send: bool,
    fail_close: bool,
    next_message_id: MessageId,
}

#[async_trait]
impl EventProducer for RecordingProducer {
    async fn send(&mut self, payload: Vec<u8>) -> Result<MessageId, TransportError> {
        if self.fail_send {
            return Err(TransportError::PublishFailed {
                scope: self.correlation_id.to_string(),
                reason: "broker unavailable".to_owned(),
            });
        }
        self.log
            .lock()
            .unwrap()
            .sent
            .push((self.correlation_id, payload));
        self.next_message_id += 1;
        Ok(self.next_message_id)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.lock().unwrap().closed += 1;
        if self.fail_close {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

/// An `EventTransport` on which every operation fails.
#[derive(Debug)]
pub struct FailingEventTransport;

#[async_trait]
impl EventTransport for FailingEventTransport {
    async fn subscribe(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventSubscription>, TransportError> {
        Err(TransportError::SubscriptionFailed {
            scope: correlation_id.to_string(),
            reason: "broker unreachable".to_owned(),
        })
    }

    async fn create_producer(
        &self,
        correlation_id: CorrelationId,
    ) -> Result<Box<dyn EventProducer>, TransportError> {
        Err(TransportError::ProducerCreation {
            scope: correlation_id.to_string(),
            reason: "broker unreachable".to_owned(),
        })
    }
}

/// A `CommandPublisher` that records every published command.
#[derive(Debug, Default)]
pub struct RecordingCommandPublisher {
    published: Mutex<Vec<OutgoingCommand>>,
}

impl RecordingCommandPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of published commands.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<OutgoingCommand> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandPublisher for RecordingCommandPublisher {
    async fn publish(&self, command: OutgoingCommand) -> Result<(), TransportError> {
        self.published.lock().unwrap().push(command);
        Ok(())
    }
}

/// A `CommandPublisher` that always fails.
#[derive(Debug)]
pub struct FailingCommandPublisher;

#[async_trait]
impl CommandPublisher for FailingCommandPublisher {
    async fn publish(&self, _command: OutgoingCommand) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }
}

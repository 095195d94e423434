//! Publish/subscribe transport seen by the processor.
//!
//! Delivery is at-least-once: a message stays the consumer's responsibility until it is
//! acknowledged or rejected.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use crate::error::BusError;

/// Content type of JSON payloads.
pub const JSON: &str = "application/json";

/// One delivered message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// identifier, unique within a bus
    pub id: u64,
    pub topic: String,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Why a message was turned down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// the payload is not a JSON object
    MalformedPayload,
    /// a modeled feature is absent or not a number
    MissingRequiredFeature,
    /// anything else that went wrong with this message only
    ProcessingFailure,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::MissingRequiredFeature => "missing_required_feature",
            RejectReason::ProcessingFailure => "processing_failure",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.code())
    }
}

/// The stream of messages of a subscribed topic.
pub struct Subscription {
    topic: String,
    messages: Receiver<Message>,
}

impl Subscription {
    pub fn new(topic: &str, messages: Receiver<Message>) -> Self {
        Self {
            topic: topic.into(),
            messages,
        }
    }

    /// Waits at most `timeout` for the next message; `Ok(None)` when none arrived in time.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<Message>, BusError> {
        match self.messages.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Closed(self.topic.clone())),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Blocks for each message; ends when the topic is closed.
impl Iterator for Subscription {
    type Item = Message;

    fn next(&mut self) -> Option<Self::Item> {
        self.messages.recv().ok()
    }
}

/// Publish/subscribe primitives.
pub trait Bus {
    /// Starts consuming `topic` from its current position.
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;

    /// Returns once the bus has accepted the payload.
    fn publish(&self, topic: &str, payload: Vec<u8>, content_type: &str) -> Result<(), BusError>;

    fn acknowledge(&self, message: &Message) -> Result<(), BusError>;

    fn reject(&self, message: &Message, reason: RejectReason) -> Result<(), BusError>;
}

impl<B: Bus + ?Sized> Bus for &B {
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        (**self).subscribe(topic)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, content_type: &str) -> Result<(), BusError> {
        (**self).publish(topic, payload, content_type)
    }

    fn acknowledge(&self, message: &Message) -> Result<(), BusError> {
        (**self).acknowledge(message)
    }

    fn reject(&self, message: &Message, reason: RejectReason) -> Result<(), BusError> {
        (**self).reject(message, reason)
    }
}

/// What happened to a consumed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged(u64),
    Rejected(u64, RejectReason),
}

/// A topic queue. The receiver is handed to the first subscriber.
struct Topic {
    sender: Option<Sender<Message>>,
    receiver: Option<Receiver<Message>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Topic {
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }
}

/// In-process bus backed by channels.
///
/// Messages published before a subscriber attaches are kept. Each topic accepts one subscriber.
#[derive(Clone)]
pub struct ChannelBus {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    dispositions: Arc<Mutex<Vec<Disposition>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            dispositions: Arc::new(Mutex::new(vec![])),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stops accepting messages on `topic`; its subscription ends once drained.
    pub fn close(&self, topic: &str) -> Result<(), BusError> {
        let mut topics = self.lock_topics()?;
        topics.entry(topic.into()).or_insert_with(Topic::new).sender = None;
        Ok(())
    }

    /// Acknowledgements and rejections, in order.
    pub fn dispositions(&self) -> Vec<Disposition> {
        match self.dispositions.lock() {
            Ok(dispositions) => dispositions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_topics(&self) -> Result<MutexGuard<'_, HashMap<String, Topic>>, BusError> {
        self.topics
            .lock()
            .map_err(|_| BusError::Unavailable("topic registry lock poisoned".into()))
    }

    fn record(&self, disposition: Disposition) -> Result<(), BusError> {
        self.dispositions
            .lock()
            .map_err(|_| BusError::Unavailable("disposition log lock poisoned".into()))?
            .push(disposition);
        Ok(())
    }
}

impl Bus for ChannelBus {
    fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut topics = self.lock_topics()?;
        let receiver = topics
            .entry(topic.into())
            .or_insert_with(Topic::new)
            .receiver
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(topic.into()))?;
        Ok(Subscription::new(topic, receiver))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, content_type: &str) -> Result<(), BusError> {
        let mut topics = self.lock_topics()?;
        let sender = topics
            .entry(topic.into())
            .or_insert_with(Topic::new)
            .sender
            .as_ref()
            .ok_or_else(|| BusError::Closed(topic.into()))?;
        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            topic: topic.into(),
            payload,
            content_type: content_type.into(),
        };
        sender.send(message).map_err(|_| BusError::Publish {
            topic: topic.into(),
            reason: "subscriber dropped".into(),
        })
    }

    fn acknowledge(&self, message: &Message) -> Result<(), BusError> {
        self.record(Disposition::Acknowledged(message.id))
    }

    fn reject(&self, message: &Message, reason: RejectReason) -> Result<(), BusError> {
        self.record(Disposition::Rejected(message.id, reason))
    }
}

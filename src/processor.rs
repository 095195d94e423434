use std::{
    fmt::{Display, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use serde_json::{json, Map, Value};

use crate::{
    bus::{Bus, Message, RejectReason, JSON},
    error::{BusError, ProcessError},
    kmeans::Centroid,
    observation::{Observation, FEATURES},
    partition::PartitionedModels,
    pipeline::{ClusterAssignment, ClusteringPipeline},
};

/// How long an idle loop waits before checking for shutdown again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Payload characters quoted when a message is rejected.
const EXCERPT_LEN: usize = 120;

/// Topic names used by the processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    /// observations to cluster
    pub input: String,
    /// annotated observations
    pub output: String,
    /// centroid snapshots, if wanted
    pub model: Option<String>,
}

/// Asks a running processor to stop after its in-flight message.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Message counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub received: u64,
    pub assigned: u64,
    pub unassigned: u64,
    pub rejected: u64,
    pub publish_failures: u64,
}

impl Display for ProcessorStats {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{} received, {} assigned, {} unassigned, {} rejected, {} publish failures",
            self.received, self.assigned, self.unassigned, self.rejected, self.publish_failures
        )
    }
}

/// What became of one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// published and acknowledged
    Published(Option<ClusterAssignment>),
    /// rejected, the model is untouched
    Rejected(RejectReason),
    /// the model learned the observation but the result was not accepted by the bus;
    /// the message is left unacknowledged
    PublishFailed,
}

/// An observation ready to be published.
struct Annotated {
    key: Option<String>,
    assignment: Option<ClusterAssignment>,
    payload: Vec<u8>,
}

/// Consumes observations, clusters them and republishes them annotated.
pub struct EventProcessor<B: Bus> {
    bus: B,
    topics: Topics,
    models: PartitionedModels,
    shutdown: Shutdown,
    stats: ProcessorStats,
}

impl<B: Bus> EventProcessor<B> {
    pub fn new(bus: B, topics: Topics, models: PartitionedModels) -> Self {
        Self {
            bus,
            topics,
            models,
            shutdown: Shutdown::new(),
            stats: ProcessorStats::default(),
        }
    }

    /// A handle that stops `run` from another thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn models(&self) -> &PartitionedModels {
        &self.models
    }

    /// Processes the input topic in delivery order until it closes or shutdown is requested.
    ///
    /// Only a failing subscription is an error: every message level failure is reported to the
    /// bus and the loop goes on.
    pub fn run(&mut self) -> Result<ProcessorStats, BusError> {
        let mut subscription = self.bus.subscribe(&self.topics.input)?;
        info!(
            "consuming `{}`, publishing to `{}`",
            subscription.topic(),
            self.topics.output
        );
        while !self.shutdown.is_requested() {
            match subscription.poll(POLL_INTERVAL) {
                Ok(Some(message)) => {
                    self.handle(&message);
                }
                Ok(None) => {}
                Err(BusError::Closed(topic)) => {
                    info!("topic `{}` closed", topic);
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        info!("processor stopped: {}", self.stats);
        Ok(self.stats)
    }

    /// Processes one message: decode, cluster, publish, then acknowledge.
    pub fn handle(&mut self, message: &Message) -> Outcome {
        self.stats.received += 1;
        let annotated = match self.annotate(message) {
            Ok(annotated) => annotated,
            Err(err) => return self.reject(message, err),
        };
        if let Err(err) = self
            .bus
            .publish(&self.topics.output, annotated.payload, JSON)
        {
            error!("message {} left unacknowledged: {}", message.id, err);
            self.stats.publish_failures += 1;
            return Outcome::PublishFailed;
        }
        match annotated.assignment {
            Some(cluster) => {
                debug!("message {} assigned to cluster {}", message.id, cluster.index());
                self.stats.assigned += 1;
            }
            None => {
                debug!("message {} published unassigned", message.id);
                self.stats.unassigned += 1;
            }
        }
        if let Err(err) = self.bus.acknowledge(message) {
            warn!("cannot acknowledge message {}: {}", message.id, err);
        }
        self.publish_snapshot(&annotated.key);
        Outcome::Published(annotated.assignment)
    }

    /// Clusters the observation carried by `message`. The model only learns it once the
    /// annotated record is encoded.
    fn annotate(&mut self, message: &Message) -> Result<Annotated, ProcessError> {
        let mut observation = Observation::decode(&message.payload).map_err(ProcessError::Decode)?;
        observation.normalize_precipitation();
        let features = observation.features()?;
        let key = self.models.key(observation.location());
        let (assignment, payload) = self
            .models
            .model_mut(key.clone())
            .try_process(&features, |assignment| {
                observation.annotate(assignment);
                observation.encode().map(|payload| (assignment, payload))
            })
            .map_err(ProcessError::Encode)?;
        Ok(Annotated {
            key,
            assignment,
            payload,
        })
    }

    fn reject(&mut self, message: &Message, err: ProcessError) -> Outcome {
        let reason = err.reason();
        warn!(
            "rejecting message {} ({}): {}; payload: {}",
            message.id,
            reason,
            err,
            excerpt(&message.payload)
        );
        if let Err(err) = self.bus.reject(message, reason) {
            error!("cannot reject message {}: {}", message.id, err);
        }
        self.stats.rejected += 1;
        Outcome::Rejected(reason)
    }

    fn publish_snapshot(&self, key: &Option<String>) {
        let (topic, model) = match (&self.topics.model, self.models.model(key)) {
            (Some(topic), Some(model)) => (topic, model),
            _ => return,
        };
        let snapshot = serialize_model(key, model);
        let published = serde_json::to_vec(&snapshot)
            .map_err(|err| err.to_string())
            .and_then(|payload| {
                self.bus
                    .publish(topic, payload, JSON)
                    .map_err(|err| err.to_string())
            });
        if let Err(reason) = published {
            warn!("cannot publish model snapshot to `{}`: {}", topic, reason);
        }
    }
}

fn serialize_model(key: &Option<String>, model: &ClusteringPipeline) -> Value {
    let centroids: Vec<_> = model
        .model()
        .centroids()
        .iter()
        .map(serialize_component)
        .collect();
    json!({ "location": key, "centroids": centroids })
}

fn serialize_component(centroid: &Centroid<FEATURES>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("center".into(), json!(centroid.center()));
    map.insert("weight".into(), json!(centroid.weight()));
    map
}

/// The start of a payload, for logs.
fn excerpt(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut excerpt: String = text.chars().take(EXCERPT_LEN).collect();
    if text.chars().nth(EXCERPT_LEN).is_some() {
        excerpt.push_str("...");
    }
    excerpt
}

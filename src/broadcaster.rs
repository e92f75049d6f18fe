//! Topic-partitioned fan-out to live subscriber connections.
//!
//! A connection is the sending half of a bounded channel; whatever drains the
//! other half (a WebSocket task) owns the actual socket. Delivery is
//! best-effort: a send that fails for any reason, including a full buffer,
//! disconnects that subscriber from every topic and closes its channel.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Device,
    Group,
    System,
}

impl FromStr for TopicKind {
    type Err = BroadcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device" | "gpu" => Ok(TopicKind::Device),
            "group" | "subnet" => Ok(TopicKind::Group),
            "system" => Ok(TopicKind::System),
            other => Err(BroadcastError::UnknownTopic(other.to_string())),
        }
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TopicKind::Device => "device",
            TopicKind::Group => "group",
            TopicKind::System => "system",
        })
    }
}

/// A broadcast partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Device(String),
    Group(String),
    System,
}

impl Topic {
    /// Builds a topic from a kind name and an optional id. Device and group
    /// topics require an id; the system topic ignores it.
    pub fn parse(kind: &str, id: Option<&str>) -> Result<Self, BroadcastError> {
        Self::from_kind(kind.parse()?, id)
    }

    pub fn from_kind(kind: TopicKind, id: Option<&str>) -> Result<Self, BroadcastError> {
        match (kind, id) {
            (TopicKind::System, _) => Ok(Topic::System),
            (TopicKind::Device, Some(id)) if !id.is_empty() => Ok(Topic::Device(id.to_string())),
            (TopicKind::Group, Some(id)) if !id.is_empty() => Ok(Topic::Group(id.to_string())),
            (kind, _) => Err(BroadcastError::MissingTopicId(kind)),
        }
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            Topic::Device(_) => TopicKind::Device,
            Topic::Group(_) => TopicKind::Group,
            Topic::System => TopicKind::System,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("unknown topic kind: {0}")]
    UnknownTopic(String),
    #[error("{0} topic requires an id")]
    MissingTopicId(TopicKind),
    #[error("{0} is not connected")]
    NotConnected(ConnectionId),
}

/// Point-in-time subscriber counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub system_subscribers: usize,
    pub device_subscribers: HashMap<String, usize>,
    pub group_subscribers: HashMap<String, usize>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, mpsc::Sender<String>>,
    device_subs: HashMap<String, HashSet<ConnectionId>>,
    group_subs: HashMap<String, HashSet<ConnectionId>>,
    system_subs: HashSet<ConnectionId>,
}

impl Registry {
    fn partition_mut(&mut self, topic: &Topic) -> &mut HashSet<ConnectionId> {
        match topic {
            Topic::Device(id) => self.device_subs.entry(id.clone()).or_default(),
            Topic::Group(id) => self.group_subs.entry(id.clone()).or_default(),
            Topic::System => &mut self.system_subs,
        }
    }

    fn partition(&self, topic: &Topic) -> Option<&HashSet<ConnectionId>> {
        match topic {
            Topic::Device(id) => self.device_subs.get(id),
            Topic::Group(id) => self.group_subs.get(id),
            Topic::System => Some(&self.system_subs),
        }
    }

    fn remove(&mut self, id: ConnectionId) -> bool {
        let existed = self.connections.remove(&id).is_some();
        self.system_subs.remove(&id);
        for subs in [&mut self.device_subs, &mut self.group_subs] {
            subs.retain(|_, members| {
                members.remove(&id);
                !members.is_empty()
            });
        }
        existed
    }
}

#[derive(Default)]
pub struct SubscriptionBroadcaster {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl SubscriptionBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink and returns its connection id.
    pub fn connect(&self, sink: mpsc::Sender<String>) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let total = {
            let mut registry = self.registry.lock();
            registry.connections.insert(id, sink);
            registry.connections.len()
        };
        info!(connection = %id, total_connections = total, "subscriber connected");
        id
    }

    /// Removes the connection from every partition. Safe to call more than once.
    pub fn disconnect(&self, id: ConnectionId) {
        let (existed, total) = {
            let mut registry = self.registry.lock();
            let existed = registry.remove(id);
            (existed, registry.connections.len())
        };
        if existed {
            info!(connection = %id, total_connections = total, "subscriber disconnected");
        }
    }

    /// Adds the connection to a topic; subscribing twice is a no-op.
    pub fn subscribe(&self, id: ConnectionId, topic: &Topic) -> Result<(), BroadcastError> {
        let mut registry = self.registry.lock();
        if !registry.connections.contains_key(&id) {
            return Err(BroadcastError::NotConnected(id));
        }
        registry.partition_mut(topic).insert(id);
        debug!(connection = %id, topic = ?topic, "subscribed");
        Ok(())
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.registry.lock().connections.contains_key(&id)
    }

    pub fn is_subscribed(&self, id: ConnectionId, topic: &Topic) -> bool {
        self.registry
            .lock()
            .partition(topic)
            .is_some_and(|subs| subs.contains(&id))
    }

    pub fn connection_count(&self) -> usize {
        self.registry.lock().connections.len()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.registry.lock().partition(topic).map_or(0, HashSet::len)
    }

    /// Delivers to one connection. Any failure disconnects it; returns whether
    /// the message was queued.
    pub fn send(&self, id: ConnectionId, message: String) -> bool {
        let sink = self.registry.lock().connections.get(&id).cloned();
        let Some(sink) = sink else {
            return false;
        };
        match sink.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(connection = %id, error = %e, "send failed; disconnecting");
                self.disconnect(id);
                false
            }
        }
    }

    /// Sends to every subscriber of `topic` and drops the ones that failed.
    /// Returns how many deliveries succeeded.
    pub fn broadcast(&self, topic: &Topic, message: &str) -> usize {
        let targets: Vec<ConnectionId> = self
            .registry
            .lock()
            .partition(topic)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default();

        let total = targets.len();
        let delivered = targets
            .into_iter()
            .filter(|id| self.send(*id, message.to_string()))
            .count();
        if delivered < total {
            debug!(topic = ?topic, failed = total - delivered, "dropped failed subscribers");
        }
        delivered
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        let registry = self.registry.lock();
        ConnectionStats {
            total_connections: registry.connections.len(),
            system_subscribers: registry.system_subs.len(),
            device_subscribers: registry
                .device_subs
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
            group_subscribers: registry
                .group_subs
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }
}

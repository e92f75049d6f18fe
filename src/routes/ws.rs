// WebSocket handlers and stream logic

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};

use super::AppState;
use crate::aggregator::MetricsAggregator;
use crate::broadcaster::{ConnectionId, SubscriptionBroadcaster, Topic};
use crate::models::{Envelope, EnvelopeKind, now_millis};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Serialized envelope with the current snapshot for `topic`, or `None` if
/// there is nothing to send yet.
pub fn envelope_for(aggregator: &MetricsAggregator, topic: &Topic) -> Option<String> {
    let now = now_millis();
    let json = match topic {
        Topic::System => {
            let data = aggregator.system_metrics()?;
            Envelope::new(
                EnvelopeKind::SystemMetrics,
                None,
                data,
                aggregator.current_source(),
                now,
            )
            .to_json()
        }
        Topic::Device(id) => {
            let data = aggregator.device_metrics(id)?;
            let source = data.source;
            Envelope::new(EnvelopeKind::DeviceMetrics, Some(id.clone()), data, source, now)
                .to_json()
        }
        Topic::Group(id) => {
            let data = aggregator.group_metrics(id)?;
            Envelope::new(
                EnvelopeKind::GroupMetrics,
                Some(id.clone()),
                data,
                aggregator.current_source(),
                now,
            )
            .to_json()
        }
    };
    json.map_err(|e| {
        tracing::warn!(error = %e, operation = "serialize_envelope", "envelope serialization failed");
    })
    .ok()
}

/// Stops the push task and unregisters the connection on drop.
struct SubscriberGuard {
    broadcaster: Arc<SubscriptionBroadcaster>,
    id: ConnectionId,
    push: Option<JoinHandle<()>>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        if let Some(push) = self.push.take() {
            push.abort();
        }
        self.broadcaster.disconnect(self.id);
    }
}

pub(super) async fn ws_system(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let every = Duration::from_secs(state.config.publishing.system_push_interval_secs);
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_topic(socket, state, Topic::System, every).await {
            tracing::info!("System stream error: {}", e);
        }
    })
}

pub(super) async fn ws_device(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let every = Duration::from_secs(state.config.publishing.device_push_interval_secs);
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_topic(socket, state, Topic::Device(id), every).await {
            tracing::info!("Device stream error: {}", e);
        }
    })
}

pub(super) async fn ws_group(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let every = Duration::from_secs(state.config.publishing.group_push_interval_secs);
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_topic(socket, state, Topic::Group(id), every).await {
            tracing::info!("Group stream error: {}", e);
        }
    })
}

/// Periodically queues the topic's envelope through the broadcaster. Ends when
/// the connection is gone.
fn spawn_push_task(
    aggregator: Arc<MetricsAggregator>,
    broadcaster: Arc<SubscriptionBroadcaster>,
    id: ConnectionId,
    topic: Topic,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The initial envelope is sent on connect.
        tick.tick().await;
        loop {
            tick.tick().await;
            if !broadcaster.is_connected(id) {
                break;
            }
            if let Some(json) = envelope_for(&aggregator, &topic)
                && !broadcaster.send(id, json)
            {
                break;
            }
        }
    })
}

async fn send_timed(socket: &mut WebSocket, msg: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, socket.send(msg)).await, Ok(Ok(())))
}

async fn stream_topic(
    mut socket: WebSocket,
    state: AppState,
    topic: Topic,
    every: Duration,
) -> anyhow::Result<()> {
    let broadcaster = Arc::clone(&state.broadcaster);
    let (tx, mut rx) = mpsc::channel::<String>(state.config.publishing.subscriber_buffer);
    let id = broadcaster.connect(tx);
    let mut guard = SubscriberGuard {
        broadcaster: Arc::clone(&broadcaster),
        id,
        push: None,
    };
    broadcaster.subscribe(id, &topic)?;
    tracing::info!(connection = %id, topic = ?topic, "Client connected to stream");

    if let Some(json) = envelope_for(&state.aggregator, &topic) {
        broadcaster.send(id, json);
    }
    guard.push = Some(spawn_push_task(
        Arc::clone(&state.aggregator),
        Arc::clone(&broadcaster),
        id,
        topic,
        every,
    ));

    let mut ping_interval = interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping_interval.reset();
    loop {
        tokio::select! {
            queued = rx.recv() => {
                // None: the broadcaster dropped this connection.
                let Some(json) = queued else { break };
                if !send_timed(&mut socket, Message::Text(json.into())).await {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                if !send_timed(&mut socket, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    tracing::info!(connection = %id, "Client left stream");
    Ok(())
}

use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashSet;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::{FeedSource, NodeClient, ProtocolInfo, SourceEvent, UpstreamError};
use crate::feed::types::FeedTopic;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Tracks feed connection failures to avoid endless retry loops.
///
/// After `max_consecutive_failures` failures retries pause until `failure_reset_duration`
/// has elapsed since the last failure. Twice that many marks the feed permanently failed
/// until the next reset window.
#[derive(Debug)]
pub struct FeedFailureTracker {
    consecutive_failures: u32,
    last_failure_time: Instant,
    max_consecutive_failures: u32,
    failure_reset_duration: Duration,
    permanently_failed: bool,
}

impl Default for FeedFailureTracker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(300))
    }
}

impl FeedFailureTracker {
    #[must_use]
    pub fn new(max_consecutive_failures: u32, failure_reset_duration: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_time: Instant::now(),
            max_consecutive_failures: max_consecutive_failures.max(1),
            failure_reset_duration,
            permanently_failed: false,
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure_time = Instant::now();

        if self.consecutive_failures >= self.max_consecutive_failures * 2 {
            self.permanently_failed = true;
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.permanently_failed = false;
    }

    /// Returns whether reconnect attempts should pause.
    #[must_use]
    pub fn should_stop_retrying(&self) -> bool {
        if self.permanently_failed {
            return true;
        }

        self.consecutive_failures >= self.max_consecutive_failures &&
            self.last_failure_time.elapsed() < self.failure_reset_duration
    }

    /// Clears failure state once the reset window has passed since the last failure.
    pub fn reset_if_expired(&mut self) {
        if self.consecutive_failures >= self.max_consecutive_failures &&
            self.last_failure_time.elapsed() >= self.failure_reset_duration
        {
            self.consecutive_failures = 0;
            self.permanently_failed = false;
        }
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn is_permanently_failed(&self) -> bool {
        self.permanently_failed
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketSourceConfig {
    /// Buffered events before the reader waits on the consumer.
    pub channel_capacity: usize,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for WebSocketSourceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

struct SourceShared {
    network: String,
    feed_url: String,
    topics: DashSet<FeedTopic, RandomState>,
    events: Mutex<Option<mpsc::Sender<SourceEvent>>>,
    failure_tracker: Mutex<FeedFailureTracker>,
}

enum ConnectionEnd {
    Shutdown,
    Disconnected,
}

/// [`FeedSource`] over a JSON websocket.
///
/// The wire protocol is one subscribe message per topic
/// (`{"type":"subscribe","topic":"milestones"}`) and one message per event
/// (`{"topic":"milestones","payload":{...}}`). A single reader task owns the connection,
/// forwards events of registered topics into one channel in arrival order, and reconnects
/// with exponential backoff, resubscribing every registered topic.
pub struct WebSocketFeedSource {
    shared: Arc<SourceShared>,
    node: Option<Arc<NodeClient>>,
    commands: mpsc::UnboundedSender<FeedTopic>,
    config: WebSocketSourceConfig,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketFeedSource {
    /// Opens the initial connection and starts the reader task.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a websocket URL or the first connection attempt
    /// fails. Later disconnects are retried in the background.
    pub async fn connect(
        network: impl Into<String>,
        feed_url: impl Into<String>,
        node: Option<Arc<NodeClient>>,
        config: WebSocketSourceConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self, UpstreamError> {
        let shared = Arc::new(SourceShared {
            network: network.into(),
            feed_url: feed_url.into(),
            topics: DashSet::with_hasher(RandomState::new()),
            events: Mutex::new(None),
            failure_tracker: Mutex::new(FeedFailureTracker::default()),
        });

        validate_ws_url(&shared.feed_url)?;
        let stream = connect_websocket(&shared.network, &shared.feed_url).await?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(run_connection(
            Arc::clone(&shared),
            stream,
            command_rx,
            shutdown_rx,
            config.clone(),
        ));

        Ok(Self { shared, node, commands, config, reader: Mutex::new(Some(reader)) })
    }

    /// Waits for the reader task to exit after a shutdown signal.
    pub async fn join(&self) {
        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(network = %self.shared.network, error = %e, "feed reader task failed");
            }
        }
    }
}

#[async_trait]
impl FeedSource for WebSocketFeedSource {
    async fn protocol_info(&self) -> Result<ProtocolInfo, UpstreamError> {
        match &self.node {
            Some(node) => node.info().await,
            None => Err(UpstreamError::ConnectionFailed(format!(
                "no node endpoint configured for network {}",
                self.shared.network
            ))),
        }
    }

    async fn subscribe(
        &self,
        topics: &[FeedTopic],
    ) -> Result<mpsc::Receiver<SourceEvent>, UpstreamError> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        if self.shared.events.lock().replace(tx).is_some() {
            debug!(network = %self.shared.network, "replaced feed consumer");
        }

        for &topic in topics {
            if !self.shared.topics.insert(topic) {
                continue;
            }
            if self.commands.send(topic).is_err() {
                self.shared.topics.remove(&topic);
                return Err(UpstreamError::SubscriptionClosed(topic.to_string()));
            }
        }

        Ok(rx)
    }
}

impl Drop for WebSocketFeedSource {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

fn validate_ws_url(ws_url: &str) -> Result<(), UpstreamError> {
    if ws_url.trim().is_empty() {
        return Err(UpstreamError::InvalidResponse("WebSocket URL is empty".to_string()));
    }

    if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
        return Err(UpstreamError::InvalidResponse(format!(
            "Invalid WebSocket URL format: {ws_url}"
        )));
    }

    Ok(())
}

async fn connect_websocket(network: &str, ws_url: &str) -> Result<WsStream, UpstreamError> {
    info!(network = %network, ws_url = ws_url, "connecting to feed");

    match tokio_tungstenite::connect_async(ws_url).await {
        Ok((stream, response)) => {
            info!(network = %network, status = response.status().as_u16(), "feed connected");
            Ok(stream)
        }
        Err(e) => {
            warn!(network = %network, error = %e, "feed connection failed");
            Err(UpstreamError::ConnectionFailed(format!("WebSocket connection failed: {e}")))
        }
    }
}

async fn send_subscription_message(sink: &mut WsSink, topic: FeedTopic) -> Result<(), UpstreamError> {
    let message = serde_json::json!({ "type": "subscribe", "topic": topic.as_str() });

    sink.send(Message::Text(message.to_string().into()))
        .await
        .map_err(|e| UpstreamError::ConnectionFailed(format!("WebSocket send error: {e}")))
}

async fn run_connection(
    shared: Arc<SourceShared>,
    first: WsStream,
    mut commands: mpsc::UnboundedReceiver<FeedTopic>,
    mut shutdown_rx: broadcast::Receiver<()>,
    config: WebSocketSourceConfig,
) {
    let mut pending = Some(first);
    let mut reconnect_delay = config.initial_reconnect_delay;

    loop {
        let stream = match pending.take() {
            Some(stream) => stream,
            None => {
                let allowed = {
                    let mut tracker = shared.failure_tracker.lock();
                    tracker.reset_if_expired();
                    !tracker.should_stop_retrying()
                };

                let attempt = if allowed {
                    connect_websocket(&shared.network, &shared.feed_url).await
                } else {
                    debug!(network = %shared.network, "skipping reconnect due to failure tracker");
                    Err(UpstreamError::ConnectionFailed("retries paused".to_string()))
                };

                match attempt {
                    Ok(stream) => {
                        shared.failure_tracker.lock().record_success();
                        reconnect_delay = config.initial_reconnect_delay;
                        stream
                    }
                    Err(e) => {
                        if allowed {
                            record_failure(&shared, &e);
                        }
                        tokio::select! {
                            _ = shutdown_rx.recv() => break,
                            () = tokio::time::sleep(reconnect_delay) => {}
                        }
                        reconnect_delay =
                            std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
                        continue;
                    }
                }
            }
        };

        match pump_connection(&shared, stream, &mut commands, &mut shutdown_rx).await {
            ConnectionEnd::Shutdown => break,
            ConnectionEnd::Disconnected => {
                warn!(
                    network = %shared.network,
                    reconnect_delay_ms = reconnect_delay.as_millis() as u64,
                    "feed disconnected, reconnecting"
                );
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    () = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }

    // Dropping the sender ends the consumer's receiver.
    shared.events.lock().take();
    info!(network = %shared.network, "feed reader stopped");
}

fn record_failure(shared: &SourceShared, err: &UpstreamError) {
    let mut tracker = shared.failure_tracker.lock();
    tracker.record_failure();

    if tracker.is_permanently_failed() {
        error!(
            network = %shared.network,
            error = %err,
            "feed reconnect keeps failing, marking as permanently failed"
        );
    } else {
        debug!(
            network = %shared.network,
            failure_count = tracker.failure_count(),
            error = %err,
            "feed reconnect failed"
        );
    }
}

async fn pump_connection(
    shared: &SourceShared,
    stream: WsStream,
    commands: &mut mpsc::UnboundedReceiver<FeedTopic>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> ConnectionEnd {
    let (mut sink, mut reader): (WsSink, WsReader) = stream.split();

    // Topics already requested on this connection. A topic registered while the snapshot
    // below is taken also arrives as a command and must not be requested twice.
    let mut sent: HashSet<FeedTopic, RandomState> = HashSet::with_hasher(RandomState::new());

    let registered: Vec<FeedTopic> = shared.topics.iter().map(|topic| *topic).collect();
    for topic in registered {
        if let Err(e) = send_subscription_message(&mut sink, topic).await {
            warn!(network = %shared.network, topic = %topic, error = %e, "resubscribe failed");
            return ConnectionEnd::Disconnected;
        }
        sent.insert(topic);
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = sink.close().await;
                return ConnectionEnd::Shutdown;
            }
            command = commands.recv() => {
                let Some(topic) = command else {
                    let _ = sink.close().await;
                    return ConnectionEnd::Shutdown;
                };
                if !sent.insert(topic) {
                    continue;
                }
                if let Err(e) = send_subscription_message(&mut sink, topic).await {
                    warn!(network = %shared.network, topic = %topic, error = %e, "subscribe failed");
                    return ConnectionEnd::Disconnected;
                }
                debug!(network = %shared.network, topic = %topic, "subscribed to topic");
            }
            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => dispatch(shared, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => {
                    warn!(network = %shared.network, "feed connection closed");
                    return ConnectionEnd::Disconnected;
                }
                Some(Err(e)) => {
                    error!(network = %shared.network, error = %e, "feed websocket error");
                    return ConnectionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Forwards one event message of a registered topic to the consumer.
async fn dispatch(shared: &SourceShared, text: &str) {
    let Ok(mut json) = serde_json::from_str::<Value>(text) else {
        warn!(network = %shared.network, "failed to parse feed message");
        return;
    };

    let Some(topic) = json.get("topic").and_then(Value::as_str).and_then(FeedTopic::from_wire)
    else {
        trace!(network = %shared.network, message = text, "ignoring message without known topic");
        return;
    };

    let Some(payload) = json.get_mut("payload").map(Value::take) else {
        trace!(network = %shared.network, topic = %topic, "ignoring message without payload");
        return;
    };

    if !shared.topics.contains(&topic) {
        return;
    }

    // Clone the sender so the lock is not held across the await.
    let Some(sender) = shared.events.lock().clone() else {
        return;
    };

    if sender.send(SourceEvent::new(topic, payload)).await.is_err() {
        debug!(network = %shared.network, topic = %topic, "feed consumer dropped");
        let mut events = shared.events.lock();
        if events.as_ref().is_some_and(|current| current.same_channel(&sender)) {
            events.take();
        }
    }
}

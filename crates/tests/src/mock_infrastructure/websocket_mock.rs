//! Mock push feed server.
//!
//! Speaks the explorer feed protocol: clients send `{"type":"subscribe","topic":..}` and
//! receive `{"topic":..,"payload":..}` events. Events are queued by the test and written
//! to whichever connection is currently open.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{collections::VecDeque, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A mock feed server bound to a random local port.
pub struct MockWebSocketServer {
    addr: SocketAddr,
    message_queue: Arc<RwLock<VecDeque<Message>>>,
    received_messages: Arc<RwLock<Vec<String>>>,
    server_handle: JoinHandle<()>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl MockWebSocketServer {
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to a local port or retrieve the bound address.
    pub async fn new() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let message_queue = Arc::new(RwLock::new(VecDeque::new()));
        let received_messages = Arc::new(RwLock::new(Vec::new()));
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let server_handle = Self::spawn_server(
            listener,
            message_queue.clone(),
            received_messages.clone(),
            shutdown_tx.subscribe(),
        );

        Ok(Self { addr, message_queue, received_messages, server_handle, shutdown_tx })
    }

    fn spawn_server(
        listener: TcpListener,
        message_queue: Arc<RwLock<VecDeque<Message>>>,
        received_messages: Arc<RwLock<Vec<String>>>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let queue = message_queue.clone();
                            let received = received_messages.clone();
                            tokio::spawn(Self::handle_connection(stream, queue, received));
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        })
    }

    async fn handle_connection(
        stream: TcpStream,
        message_queue: Arc<RwLock<VecDeque<Message>>>,
        received_messages: Arc<RwLock<Vec<String>>>,
    ) {
        let Ok(ws_stream) = accept_async(stream).await else { return };

        let (mut write, mut read) = ws_stream.split();

        loop {
            {
                let mut queue = message_queue.write().await;
                while let Some(msg) = queue.pop_front() {
                    let closing = matches!(msg, Message::Close(_));
                    if write.send(msg).await.is_err() {
                        return;
                    }
                    // A closed connection must not drain events meant for the next one.
                    if closing {
                        return;
                    }
                }
            }

            tokio::select! {
                result = read.next() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            received_messages.write().await.push(text.to_string());
                        }
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                () = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    }

    /// Returns the WebSocket URL for connecting to this server.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn enqueue_message(&self, msg: Message) {
        self.message_queue.write().await.push_back(msg);
    }

    pub async fn enqueue_text(&self, text: impl Into<String>) {
        self.enqueue_message(Message::Text(text.into().into())).await;
    }

    /// Sends one event on `topic` (wire name, e.g. `"milestones"`).
    pub async fn send_event(&self, topic: &str, payload: Value) {
        let msg = json!({ "topic": topic, "payload": payload });
        self.enqueue_text(msg.to_string()).await;
    }

    /// Sends a close frame and drops the current connection.
    pub async fn send_close(&self) {
        self.enqueue_message(Message::Close(None)).await;
    }

    /// Topics named in subscribe requests received so far, in arrival order.
    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.received_messages
            .read()
            .await
            .iter()
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .filter(|msg| msg.get("type").and_then(Value::as_str) == Some("subscribe"))
            .filter_map(|msg| msg.get("topic").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Waits until at least `count` subscribe requests have arrived.
    pub async fn wait_for_subscriptions(&self, count: usize, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if self.subscribed_topics().await.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Shuts down the server.
    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.server_handle.abort();
    }
}

impl Drop for MockWebSocketServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.server_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_mock_websocket_server_creation() {
        let server = MockWebSocketServer::new().await.unwrap();
        assert!(server.url().starts_with("ws://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_mock_websocket_sends_events() {
        let server = MockWebSocketServer::new().await.unwrap();
        server.send_event("milestones", json!({"milestoneIndex": 1000})).await;

        let (mut ws_stream, _) = connect_async(&server.url()).await.expect("Failed to connect");

        let msg = tokio::time::timeout(Duration::from_secs(2), ws_stream.next())
            .await
            .expect("event within timeout");
        match msg {
            Some(Ok(Message::Text(text))) => {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(event["topic"], "milestones");
                assert_eq!(event["payload"]["milestoneIndex"], 1000);
            }
            other => panic!("Expected text message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mock_websocket_records_subscriptions() {
        let server = MockWebSocketServer::new().await.unwrap();
        let (mut ws_stream, _) = connect_async(&server.url()).await.expect("Failed to connect");

        for topic in ["blocks", "milestones"] {
            let request = json!({ "type": "subscribe", "topic": topic });
            ws_stream.send(Message::Text(request.to_string().into())).await.unwrap();
        }

        assert!(server.wait_for_subscriptions(2, Duration::from_secs(2)).await);
        assert_eq!(server.subscribed_topics().await, vec!["blocks", "milestones"]);
    }
}

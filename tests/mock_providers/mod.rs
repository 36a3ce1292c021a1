//! Mock realtime endpoint
//!
//! Simulates the upstream speech endpoint over WebSocket: accepts the
//! bridge's connection, records every client event it receives, and lets
//! tests inject arbitrary server events toward the bridge. Handshake
//! rejection and mid-session closes are scriptable for failure tests.

// Allow dead code in test infrastructure - not every test uses every knob
#![allow(dead_code)]

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

/// Scripted behavior for a mock endpoint.
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Reject the WebSocket handshake with this HTTP status.
    pub reject_handshake: Option<u16>,
    /// Close the connection after this many client events were received.
    pub close_after_events: Option<usize>,
    /// Send `session.created` as soon as a connection is established.
    pub auto_session_created: bool,
    /// Answer `session.update` with `session.updated`.
    pub auto_session_updated: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            reject_handshake: None,
            close_after_events: None,
            auto_session_created: true,
            auto_session_updated: true,
        }
    }
}

/// Shared state of a running mock endpoint.
pub struct MockRealtimeState {
    received: StdMutex<Vec<Value>>,
    pub connections: AtomicU64,
    outbound: StdMutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl MockRealtimeState {
    fn record(&self, event: Value) {
        self.received.lock().unwrap().push(event);
    }

    fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.outbound.lock().unwrap().take()
    }

    /// Snapshot of every client event received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_len(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Events of one type, in arrival order.
    pub fn events_of_type(&self, event_type: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|e| e["type"] == event_type)
            .collect()
    }

    /// Poll until an event matching `pred` arrives or the timeout passes.
    pub async fn wait_for<F>(&self, timeout: Duration, pred: F) -> Option<Value>
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = self.received().into_iter().find(|e| pred(e)) {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until at least one event of `event_type` arrived.
    pub async fn wait_for_type(&self, event_type: &str, timeout: Duration) -> Option<Value> {
        self.wait_for(timeout, |e| e["type"] == event_type).await
    }
}

/// A running mock realtime endpoint.
pub struct MockRealtime {
    /// `ws://127.0.0.1:{port}` base URL for the bridge to connect to.
    pub url: String,
    pub state: Arc<MockRealtimeState>,
    /// Raw JSON frames pushed here are sent to the connected bridge.
    pub to_client: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

impl MockRealtime {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockBehavior::default()).await
    }

    pub async fn spawn_with(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock realtime listener");
        let addr = listener.local_addr().expect("mock listener address");
        let (to_client, outbound_rx) = mpsc::unbounded_channel();

        let state = Arc::new(MockRealtimeState {
            received: StdMutex::new(Vec::new()),
            connections: AtomicU64::new(0),
            outbound: StdMutex::new(Some(outbound_rx)),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let state = accept_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, behavior).await {
                        eprintln!("mock realtime connection error: {}", e);
                    }
                });
            }
        });

        Self {
            url: format!("ws://{}", addr),
            state,
            to_client,
            handle,
        }
    }

    /// Inject a server event toward the bridge.
    pub fn send(&self, event: Value) {
        let _ = self.to_client.send(event.to_string());
    }

    pub fn send_audio_delta(&self, delta: &str) {
        self.send(json!({
            "type": "response.audio.delta",
            "response_id": "resp_mock",
            "item_id": "item_mock",
            "output_index": 0,
            "content_index": 0,
            "delta": delta,
        }));
    }
}

impl Drop for MockRealtime {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockRealtimeState>,
    behavior: MockBehavior,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(code) = behavior.reject_handshake {
        let reject = move |_req: &Request, _res: Response| -> Result<Response, ErrorResponse> {
            let response = http::Response::builder()
                .status(code)
                .body(Some("rejected by mock".to_string()))
                .unwrap();
            Err(response)
        };
        // The handshake error surfaces on the client side; nothing to do here.
        let _ = accept_hdr_async(stream, reject).await;
        return Ok(());
    }

    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    state.connections.fetch_add(1, Ordering::Relaxed);

    if behavior.auto_session_created {
        let created = json!({
            "type": "session.created",
            "event_id": "evt_mock_created",
            "session": { "id": "sess_mock" },
        });
        write.send(Message::Text(created.to_string().into())).await?;
    }

    let mut outbound = state.take_outbound();

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let event: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let is_session_update = event["type"] == "session.update";
                    state.record(event);

                    if is_session_update && behavior.auto_session_updated {
                        let updated = json!({
                            "type": "session.updated",
                            "event_id": "evt_mock_updated",
                            "session": { "id": "sess_mock" },
                        });
                        write.send(Message::Text(updated.to_string().into())).await?;
                    }

                    if let Some(limit) = behavior.close_after_events {
                        if state.received_len() >= limit {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            scripted = recv_or_pending(&mut outbound) => {
                write.send(Message::Text(scripted.into())).await?;
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
    Ok(())
}

// Pends forever when this connection does not own the script channel, so
// the select loop still serves reads.
async fn recv_or_pending(outbound: &mut Option<mpsc::UnboundedReceiver<String>>) -> String {
    match outbound {
        Some(rx) => match rx.recv().await {
            Some(frame) => frame,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

//! Socket Mode connection — one WebSocket, one background task.
//!
//! The task reads frames, forwards envelopes over an mpsc channel and writes
//! acknowledgments back. `connect` only returns once Slack has sent `hello`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EventSource;
use crate::error::StreamError;
use crate::frames::{salvage_envelope_id, Frame};
use crate::types::{Envelope, InboundEvent};

/// How long to wait for `hello` after the WebSocket handshake.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum StreamItem {
    Event(Envelope),
    Failed(String),
}

pub struct SocketModeStream {
    events: mpsc::UnboundedReceiver<StreamItem>,
    acks: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SocketModeStream {
    /// Connect to a URL from `apps.connections.open` and wait for `hello`.
    pub async fn connect(url: &str, ready_timeout: Duration) -> Result<Self, StreamError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        info!("Socket Mode WebSocket connected");
        Self::start(ws, ready_timeout).await
    }

    /// Drive an already-open WebSocket.
    pub async fn start<S>(ws: S, ready_timeout: Duration) -> Result<Self, StreamError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin
            + Send
            + 'static,
    {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (acks, ack_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_connection(ws, event_tx, ack_rx, ready_tx, cancel.clone()));

        // Dropping `stream` on the error paths below tears the task down.
        let mut stream = Self {
            events,
            acks,
            cancel,
            task: Some(task),
        };

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(())) => {
                info!("Socket Mode ready");
                Ok(stream)
            }
            Ok(Err(_)) => {
                let reason = match stream.events.try_recv() {
                    Ok(StreamItem::Failed(reason)) => reason,
                    _ => "connection closed before hello".to_string(),
                };
                Err(StreamError::NotReady(reason))
            }
            Err(_) => Err(StreamError::NotReady(format!(
                "no hello within {}s",
                ready_timeout.as_secs()
            ))),
        }
    }

    /// Close the socket and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Socket Mode task ended abnormally: {}", e);
            }
        }
        debug!("Socket Mode stream shut down");
    }
}

impl Drop for SocketModeStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl EventSource for SocketModeStream {
    async fn next_event(&mut self) -> Result<Option<Envelope>, StreamError> {
        match self.events.recv().await {
            Some(StreamItem::Event(envelope)) => Ok(Some(envelope)),
            Some(StreamItem::Failed(reason)) => Err(StreamError::Disconnected(reason)),
            None => Ok(None),
        }
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<(), StreamError> {
        if self.acks.send(envelope_id.to_string()).is_ok() {
            return Ok(());
        }
        // The task is gone; its failure reason, if any, is queued behind
        // deliveries nobody will read now.
        while let Ok(item) = self.events.try_recv() {
            if let StreamItem::Failed(reason) = item {
                return Err(StreamError::Disconnected(reason));
            }
        }
        Err(StreamError::Closed)
    }
}

fn ack_frame(envelope_id: &str) -> Message {
    Message::Text(serde_json::json!({ "envelope_id": envelope_id }).to_string().into())
}

async fn run_connection<S>(
    ws: S,
    events: mpsc::UnboundedSender<StreamItem>,
    mut acks: mpsc::UnboundedReceiver<String>,
    ready: oneshot::Sender<()>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut frames) = ws.split();
    let mut ready = Some(ready);

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Close frame not sent: {}", e);
                }
                break None;
            }
            Some(envelope_id) = acks.recv() => {
                if let Err(e) = sink.send(ack_frame(&envelope_id)).await {
                    break Some(format!("failed to send ack: {}", e));
                }
            }
            frame = frames.next() => match frame {
                Some(Ok(Message::Text(text))) => match Frame::parse(text.as_str()) {
                    Ok(Frame::Hello) => {
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(());
                        }
                    }
                    Ok(Frame::Disconnect { reason }) => {
                        break Some(format!("disconnect requested: {}", reason));
                    }
                    Ok(Frame::Envelope(envelope)) => {
                        if events.send(StreamItem::Event(envelope)).is_err() {
                            break None;
                        }
                    }
                    Err(e) => {
                        warn!("Unparseable Socket Mode frame: {}", e);
                        // Still hand it over so it is acked and not redelivered.
                        if let Some(envelope_id) = salvage_envelope_id(text.as_str()) {
                            let envelope = Envelope {
                                envelope_id: Some(envelope_id),
                                event: InboundEvent::Other {
                                    kind: "unparseable".to_string(),
                                },
                            };
                            if events.send(StreamItem::Event(envelope)).is_err() {
                                break None;
                            }
                        }
                    }
                },
                Some(Ok(Message::Close(close))) => {
                    let reason = close
                        .map(|c| format!("closed by server: {} {}", u16::from(c.code), c.reason.as_str()))
                        .unwrap_or_else(|| "closed by server".to_string());
                    break Some(reason);
                }
                // Ping/pong is answered inside tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("connection ended".to_string()),
            },
        }
    };

    if let Some(reason) = failure {
        warn!("Socket Mode connection lost: {}", reason);
        let _ = events.send(StreamItem::Failed(reason));
    }
}

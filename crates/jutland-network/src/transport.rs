//! Transport abstraction under a session.
//!
//! A session only needs an ordered stream of inbound [`Frame`]s and a way to
//! write frames back. The server adapts WebSockets to these traits; the
//! in-memory [`memory_transport`] pairs a session with a test or embedded
//! client over tokio channels.

use crate::error::{HubError, HubResult};
use crate::protocol::{Envelope, MessageType};
use std::future::Future;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Inbound half of a connection.
pub trait FrameSource: Send + 'static {
    /// Next frame, or `None` once the peer has gone away.
    fn recv(&mut self) -> impl Future<Output = HubResult<Option<Frame>>> + Send;
}

/// Outbound half of a connection.
pub trait FrameSink: Send + 'static {
    fn send(&mut self, frame: Frame) -> impl Future<Output = HubResult<()>> + Send;

    /// Release the connection. Called once, after the session has left the hub.
    fn close(&mut self) -> impl Future<Output = HubResult<()>> + Send;
}

pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> HubResult<Option<Frame>> {
        Ok(self.rx.recv().await)
    }
}

pub struct ChannelSink {
    tx: Option<mpsc::Sender<Frame>>,
}

impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Frame) -> HubResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| HubError::Transport("connection closed".to_string()))?;
        tx.send(frame)
            .await
            .map_err(|_| HubError::Transport("peer dropped".to_string()))
    }

    async fn close(&mut self) -> HubResult<()> {
        // Must not block: the client may have stopped reading
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(Frame::Close);
        }
        Ok(())
    }
}

/// Client end of an in-memory connection.
pub struct MemoryClient {
    to_session: mpsc::Sender<Frame>,
    from_session: mpsc::Receiver<Frame>,
}

impl MemoryClient {
    pub async fn send(&self, frame: Frame) -> HubResult<()> {
        self.to_session
            .send(frame)
            .await
            .map_err(|_| HubError::Transport("session dropped".to_string()))
    }

    pub async fn send_envelope(&self, envelope: &Envelope) -> HubResult<()> {
        self.send(Frame::Text(envelope.to_json()?)).await
    }

    /// Next raw frame; `None` when the session side is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_session.recv().await
    }

    /// Next envelope, answering transport pings along the way.
    ///
    /// Returns `None` on close or when the session side is gone.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.from_session.recv().await? {
                Frame::Text(text) => return Envelope::from_json(&text).ok(),
                Frame::Ping(payload) => {
                    let _ = self.to_session.send(Frame::Pong(payload)).await;
                }
                Frame::Pong(_) => {}
                Frame::Close => return None,
            }
        }
    }

    /// Next envelope of the given type, skipping others.
    pub async fn recv_kind(&mut self, kind: MessageType) -> Option<Envelope> {
        loop {
            let envelope = self.recv_envelope().await?;
            if envelope.kind == kind {
                return Some(envelope);
            }
        }
    }

    /// Whatever is queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_session.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub async fn close(&self) {
        let _ = self.to_session.send(Frame::Close).await;
    }
}

/// An in-memory connection: the client end plus the two halves a session runs on.
pub fn memory_transport(capacity: usize) -> (MemoryClient, ChannelSource, ChannelSink) {
    let (to_session, session_rx) = mpsc::channel(capacity.max(1));
    let (session_tx, from_session) = mpsc::channel(capacity.max(1));
    (
        MemoryClient {
            to_session,
            from_session,
        },
        ChannelSource { rx: session_rx },
        ChannelSink {
            tx: Some(session_tx),
        },
    )
}

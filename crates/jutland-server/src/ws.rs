//! WebSocket transport for hub sessions.
//!
//! The authenticated user arrives as an `X-User-Id` header on the upgrade
//! request, set by the gateway in front of this server.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jutland_network::{ActionHandler, Frame, FrameSink, FrameSource, HubError, HubHandle, HubResult, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

pub const USER_HEADER: &str = "x-user-id";

type Socket = WebSocketStream<TcpStream>;

pub struct WsSource {
    inner: SplitStream<Socket>,
}

impl FrameSource for WsSource {
    async fn recv(&mut self) -> HubResult<Option<Frame>> {
        loop {
            let message = match self.inner.next().await {
                None => return Ok(None),
                Some(Err(err)) => return Err(HubError::Transport(err.to_string())),
                Some(Ok(message)) => message,
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => Frame::Text(text),
                    Err(_) => return Err(HubError::Transport("binary frame is not utf-8".to_string())),
                },
                Message::Ping(payload) => Frame::Ping(payload),
                Message::Pong(payload) => Frame::Pong(payload),
                Message::Close(_) => Frame::Close,
                Message::Frame(_) => continue,
            };
            return Ok(Some(frame));
        }
    }
}

pub struct WsSink {
    inner: SplitSink<Socket, Message>,
}

impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> HubResult<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Ping(payload) => Message::Ping(payload),
            Frame::Pong(payload) => Message::Pong(payload),
            Frame::Close => Message::Close(None),
        };
        self.inner
            .send(message)
            .await
            .map_err(|err| HubError::Transport(err.to_string()))
    }

    async fn close(&mut self) -> HubResult<()> {
        self.inner
            .close()
            .await
            .map_err(|err| HubError::Transport(err.to_string()))
    }
}

/// Complete the WebSocket handshake, capturing the user header.
pub async fn accept(stream: TcpStream) -> Result<(Option<String>, WsSource, WsSink), tungstenite::Error> {
    let mut user_id = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        user_id = request
            .headers()
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(response)
    };
    let socket = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (sink, source) = socket.split();
    Ok((user_id, WsSource { inner: source }, WsSink { inner: sink }))
}

/// Run one client connection to completion.
pub async fn serve(stream: TcpStream, peer: SocketAddr, hub: HubHandle, handler: Arc<dyn ActionHandler>) {
    if let Err(err) = stream.set_nodelay(true) {
        warn!(%peer, error = %err, "failed to set nodelay");
    }
    let (user_id, source, sink) = match accept(stream).await {
        Ok(accepted) => accepted,
        Err(err) => {
            debug!(%peer, error = %err, "websocket handshake failed");
            return;
        }
    };
    info!(%peer, user_id = user_id.as_deref(), "websocket connected");

    let session = Session::new(hub, handler, user_id);
    if let Err(err) = session.run(source, sink).await {
        debug!(%peer, error = %err, "session ended with error");
    }
}

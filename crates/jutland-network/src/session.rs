//! Per-connection session loops.
//!
//! A session runs as a reader (the task calling [`Session::run`]) and a
//! spawned writer:
//!
//! - the reader parses inbound envelopes and talks to the hub
//! - the writer drains the session's outbound queue and pings the client
//!   every `ping_interval`; if no pong arrives within `pong_timeout` the
//!   session is declared dead
//!
//! Either side may start teardown. The writer always finishes it: it leaves
//! the hub (registry and room) and only then closes the transport.

use crate::error::{ActionError, HubError, HubResult};
use crate::handler::{ActionContext, ActionHandler};
use crate::hub::{HubHandle, OutboundQueue, SessionId};
use crate::protocol::{Envelope, MessageType};
use crate::transport::{Frame, FrameSink, FrameSource};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Time since the client last proved it is alive.
struct Liveness {
    started: Instant,
    last_pong_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_pong_ms.store(now, Ordering::Relaxed);
    }

    fn silence(&self) -> Duration {
        let last = Duration::from_millis(self.last_pong_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

/// One-shot teardown signal shared by the reader and writer.
#[derive(Clone)]
struct Teardown {
    closing: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<SessionState>>,
}

impl Teardown {
    /// Start closing. Returns whether this call was the first.
    fn trigger(&self) -> bool {
        let first = !self.closing.send_replace(true);
        if first {
            self.state.send_replace(SessionState::Closing);
        }
        first
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

async fn closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closing| *closing).await;
}

/// A client connection attached to the hub.
pub struct Session {
    hub: HubHandle,
    handler: Arc<dyn ActionHandler>,
    user_id: Option<String>,
    state: Arc<watch::Sender<SessionState>>,
}

impl Session {
    /// `user_id` is the already-authenticated user, if any.
    pub fn new(hub: HubHandle, handler: Arc<dyn ActionHandler>, user_id: Option<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            hub,
            handler,
            user_id,
            state: Arc::new(state),
        }
    }

    /// Follow the session's state transitions.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Drive the session until the connection closes.
    ///
    /// Returns the error that ended it, if any. By the time this returns the
    /// session is out of the hub and the transport has been closed.
    pub async fn run<S, K>(self, mut source: S, mut sink: K) -> HubResult<()>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let (session_id, queue) = match self.hub.register(self.user_id.clone()).await {
            Ok(registered) => registered,
            Err(err) => {
                self.state.send_replace(SessionState::Closing);
                let _ = sink.close().await;
                self.state.send_replace(SessionState::Closed);
                return Err(err);
            }
        };
        self.state.send_replace(SessionState::Active);
        info!(%session_id, user_id = self.user_id.as_deref(), "session active");

        let (closing, _) = watch::channel(false);
        let teardown = Teardown {
            closing: Arc::new(closing),
            state: Arc::clone(&self.state),
        };
        let liveness = Arc::new(Liveness::new());

        let writer = tokio::spawn(write_loop(Writer {
            hub: self.hub.clone(),
            session_id,
            queue,
            sink,
            liveness: Arc::clone(&liveness),
            teardown: teardown.clone(),
        }));

        let mut reader = Reader {
            hub: self.hub.clone(),
            handler: Arc::clone(&self.handler),
            session_id,
            user_id: self.user_id.clone(),
            game_id: None,
            liveness,
        };
        let read_result = reader.run(&mut source, teardown.subscribe()).await;
        if let Err(err) = &read_result {
            warn!(%session_id, error = %err, "session read failed");
        }
        teardown.trigger();

        let write_result = match writer.await {
            Ok(result) => result,
            Err(err) => {
                // Writer panicked; make sure the hub forgets the session anyway
                let _ = self.hub.unregister(session_id).await;
                Err(HubError::Transport(err.to_string()))
            }
        };
        self.state.send_replace(SessionState::Closed);
        info!(%session_id, "session closed");
        read_result.and(write_result)
    }
}

struct Reader {
    hub: HubHandle,
    handler: Arc<dyn ActionHandler>,
    session_id: SessionId,
    user_id: Option<String>,
    game_id: Option<String>,
    liveness: Arc<Liveness>,
}

impl Reader {
    async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        mut closing: watch::Receiver<bool>,
    ) -> HubResult<()> {
        loop {
            let frame = tokio::select! {
                _ = closed(&mut closing) => return Ok(()),
                frame = source.recv() => frame?,
            };
            match frame {
                None | Some(Frame::Close) => {
                    debug!(session_id = %self.session_id, "client closed connection");
                    return Ok(());
                }
                Some(Frame::Ping(_)) => {}
                Some(Frame::Pong(_)) => self.liveness.touch(),
                Some(Frame::Text(text)) => {
                    let envelope = Envelope::from_json(&text)?;
                    self.dispatch(envelope).await?;
                }
            }
        }
    }

    async fn dispatch(&mut self, envelope: Envelope) -> HubResult<()> {
        if !envelope.kind.is_inbound() {
            debug!(session_id = %self.session_id, kind = ?envelope.kind, "unsupported message type");
            return self
                .reply_error("unsupported_type", "unsupported message type")
                .await;
        }
        match envelope.kind {
            MessageType::Ping => self.reply(Envelope::pong()).await,
            MessageType::Pong => {
                self.liveness.touch();
                Ok(())
            }
            MessageType::JoinGame => match envelope.data.as_str() {
                Some(game_id) if !game_id.is_empty() => {
                    self.hub.join(self.session_id, game_id).await?;
                    self.game_id = Some(game_id.to_string());
                    self.reply(Envelope::notification("joined game").with_game(game_id))
                        .await
                }
                _ => {
                    self.reply_error("invalid_game_id", "join_game expects a game id string")
                        .await
                }
            },
            MessageType::LeaveGame => {
                let left = self.hub.leave(self.session_id).await?;
                self.game_id = None;
                let mut note = Envelope::notification("left game");
                note.game_id = left;
                self.reply(note).await
            }
            MessageType::GameAction => self.game_action(envelope).await,
            MessageType::ChatMessage => self.chat(envelope).await,
            // Outbound kinds were rejected above
            _ => Ok(()),
        }
    }

    async fn game_action(&mut self, envelope: Envelope) -> HubResult<()> {
        let ctx = ActionContext {
            session_id: self.session_id,
            user_id: self.user_id.clone(),
            game_id: envelope.game_id.or_else(|| self.game_id.clone()),
        };
        let handler = Arc::clone(&self.handler);
        let action_ctx = ctx.clone();
        let payload = envelope.data;
        let outcome = tokio::task::spawn_blocking(move || handler.handle(&action_ctx, payload))
            .await
            .unwrap_or_else(|err| Err(ActionError::new("internal", err.to_string())));
        match outcome {
            Ok(data) => {
                let mut update = Envelope::new(MessageType::GameUpdate, data);
                update.game_id = ctx.game_id;
                self.reply(update).await
            }
            Err(err) => {
                debug!(session_id = %self.session_id, code = %err.code, "game action rejected");
                self.reply_error(&err.code, &err.message).await
            }
        }
    }

    async fn chat(&mut self, envelope: Envelope) -> HubResult<()> {
        let Some(game_id) = self.game_id.clone() else {
            return self
                .reply_error("not_in_game", "join a game before chatting")
                .await;
        };
        let Some(message) = envelope.data.get("message").and_then(Value::as_str) else {
            return self
                .reply_error("invalid_chat", "chat_message expects {message}")
                .await;
        };
        let event = Envelope::game_event(
            &game_id,
            "chat_message",
            json!({ "message": message, "user_id": self.user_id }),
        )
        .with_user(self.user_id.clone());
        self.hub.broadcast_room(&game_id, event).await
    }

    async fn reply(&self, envelope: Envelope) -> HubResult<()> {
        self.hub.send_to(self.session_id, envelope).await
    }

    async fn reply_error(&self, code: &str, message: &str) -> HubResult<()> {
        self.reply(Envelope::error(code, message)).await
    }
}

/// A write that cannot complete within `limit` counts as a dead client.
async fn send_frame<K: FrameSink>(sink: &mut K, frame: Frame, limit: Duration) -> HubResult<()> {
    tokio::time::timeout(limit, sink.send(frame))
        .await
        .map_err(|_| HubError::Transport("write stalled".to_string()))?
}

struct Writer<K> {
    hub: HubHandle,
    session_id: SessionId,
    queue: OutboundQueue,
    sink: K,
    liveness: Arc<Liveness>,
    teardown: Teardown,
}

async fn write_loop<K: FrameSink>(mut w: Writer<K>) -> HubResult<()> {
    let ping_interval = w.hub.config().ping_interval;
    let pong_timeout = w.hub.config().pong_timeout;
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut closing = w.teardown.subscribe();

    let result = loop {
        tokio::select! {
            _ = closed(&mut closing) => break Ok(()),
            next = w.queue.recv() => match next {
                Some(text) => {
                    let frame = Frame::Text(text.to_string());
                    if let Err(err) = send_frame(&mut w.sink, frame, pong_timeout).await {
                        break Err(err);
                    }
                }
                None => {
                    debug!(session_id = %w.session_id, "outbound queue closed by hub");
                    break Ok(());
                }
            },
            _ = ping.tick() => {
                let silence = w.liveness.silence();
                if silence > pong_timeout {
                    break Err(HubError::LivenessTimeout(silence));
                }
                let frame = Frame::Ping(Vec::new());
                if let Err(err) = send_frame(&mut w.sink, frame, pong_timeout).await {
                    break Err(err);
                }
            }
        }
    };
    if let Err(err) = &result {
        warn!(session_id = %w.session_id, error = %err, "session writer stopped");
    }

    w.teardown.trigger();
    match w.hub.unregister(w.session_id).await {
        Ok(_) => {}
        Err(err) => debug!(session_id = %w.session_id, error = %err, "unregister skipped"),
    }
    if let Err(err) = w.sink.close().await {
        debug!(session_id = %w.session_id, error = %err, "transport close failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RejectActions;
    use crate::hub::{Hub, HubConfig};
    use crate::transport::{memory_transport, MemoryClient};
    use tokio::task::JoinHandle;

    type Started = (
        MemoryClient,
        JoinHandle<HubResult<()>>,
        watch::Receiver<SessionState>,
    );

    fn start(hub: &HubHandle, user: &str) -> Started {
        let (client, source, sink) = memory_transport(32);
        let session = Session::new(hub.clone(), Arc::new(RejectActions), Some(user.to_string()));
        let state = session.state();
        let task = tokio::spawn(session.run(source, sink));
        (client, task, state)
    }

    #[tokio::test]
    async fn test_ping_and_join() {
        let hub = Hub::spawn(HubConfig::default());
        let (mut client, _task, mut state) = start(&hub, "tovey");
        state.wait_for(|s| *s == SessionState::Active).await.unwrap();

        client.send_envelope(&Envelope::ping()).await.unwrap();
        assert_eq!(client.recv_envelope().await.unwrap().kind, MessageType::Pong);

        client.send_envelope(&Envelope::join_game("g1")).await.unwrap();
        let note = client.recv_envelope().await.unwrap();
        assert_eq!(note.kind, MessageType::Notification);
        assert_eq!(note.game_id.as_deref(), Some("g1"));
        assert_eq!(hub.stats().await.unwrap().room_size("g1"), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_tears_down() {
        let hub = Hub::spawn(HubConfig::default());
        let (mut client, task, state) = start(&hub, "tovey");

        client.send(Frame::Text("{not json".to_string())).await.unwrap();
        assert!(matches!(task.await.unwrap(), Err(HubError::Malformed(_))));
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(client.recv().await, Some(Frame::Close));
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test]
    async fn test_client_close_unregisters() {
        let hub = Hub::spawn(HubConfig::default());
        let (client, task, _state) = start(&hub, "tovey");
        client.send_envelope(&Envelope::join_game("g1")).await.unwrap();
        client.close().await;

        assert!(task.await.unwrap().is_ok());
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.sessions, 0);
        assert!(stats.rooms.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out() {
        let hub = Hub::spawn(HubConfig {
            ping_interval: Duration::from_secs(1),
            pong_timeout: Duration::from_secs(3),
            ..HubConfig::default()
        });
        let (mut client, task, _state) = start(&hub, "tovey");

        let mut pings = 0;
        loop {
            match client.recv().await {
                Some(Frame::Ping(_)) => pings += 1,
                Some(Frame::Close) | None => break,
                Some(other) => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(pings, 3);
        assert!(matches!(task.await.unwrap(), Err(HubError::LivenessTimeout(_))));
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answering_client_stays_alive() {
        let hub = Hub::spawn(HubConfig {
            ping_interval: Duration::from_secs(1),
            pong_timeout: Duration::from_secs(3),
            ..HubConfig::default()
        });
        let (mut client, _task, _state) = start(&hub, "tovey");

        for _ in 0..10 {
            match client.recv().await {
                Some(Frame::Ping(payload)) => client.send(Frame::Pong(payload)).await.unwrap(),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(hub.stats().await.unwrap().sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_writer_is_dropped() {
        let hub = Hub::spawn(HubConfig {
            ping_interval: Duration::from_secs(1),
            pong_timeout: Duration::from_secs(3),
            ..HubConfig::default()
        });
        // Room for one frame, and the client never reads
        let (client, source, sink) = memory_transport(1);
        let session = Session::new(hub.clone(), Arc::new(RejectActions), None);
        let task = tokio::spawn(session.run(source, sink));

        client.send_envelope(&Envelope::join_game("g1")).await.unwrap();
        while hub.stats().await.unwrap().room_size("g1") == 0 {
            tokio::task::yield_now().await;
        }
        hub.broadcast_room("g1", Envelope::notification("convoy sighted"))
            .await
            .unwrap();

        match task.await.unwrap() {
            Err(HubError::Transport(reason)) => assert_eq!(reason, "write stalled"),
            other => panic!("expected stalled write, got {other:?}"),
        }
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }
}

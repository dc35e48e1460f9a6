//! Hub coordinator: the session registry and per-game rooms.
//!
//! One coordinator task owns both tables. Everything else talks to it through
//! a cloneable [`HubHandle`], so registry mutation is serialized through a
//! single command queue and broadcasts to a room reach every member in the
//! order they were submitted.
//!
//! Each session has a bounded outbound queue. The coordinator never waits on
//! it: a full queue marks the session unresponsive and it is dropped from the
//! registry on the spot.

use crate::error::{HubError, HubResult};
use crate::protocol::Envelope;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Serialized envelopes waiting to be written to one session.
pub type OutboundQueue = mpsc::Receiver<Arc<str>>;

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Per-session outbound queue length before the session is dropped.
    pub outbound_capacity: usize,
    /// Coordinator command queue length.
    pub command_capacity: usize,
    /// How often a session pings its client.
    pub ping_interval: Duration,
    /// Silence after which a session is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            command_capacity: 1024,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// Snapshot of the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    /// Member count per open room.
    pub rooms: BTreeMap<String, usize>,
}

impl HubStats {
    pub fn room_size(&self, game_id: &str) -> usize {
        self.rooms.get(game_id).copied().unwrap_or(0)
    }
}

enum Command {
    Register {
        session_id: SessionId,
        user_id: Option<String>,
        outbound: mpsc::Sender<Arc<str>>,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    Join {
        session_id: SessionId,
        game_id: String,
        reply: oneshot::Sender<HubResult<Option<String>>>,
    },
    Leave {
        session_id: SessionId,
        reply: oneshot::Sender<HubResult<Option<String>>>,
    },
    Send {
        session_id: SessionId,
        envelope: Envelope,
    },
    BroadcastRoom {
        game_id: String,
        envelope: Envelope,
    },
    BroadcastAll {
        envelope: Envelope,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct Client {
    user_id: Option<String>,
    game_id: Option<String>,
    outbound: mpsc::Sender<Arc<str>>,
}

/// The coordinator. Constructed and driven only by [`Hub::spawn`].
pub struct Hub {
    sessions: HashMap<SessionId, Client>,
    rooms: HashMap<String, HashSet<SessionId>>,
}

impl Hub {
    /// Start the coordinator task on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (commands, rx) = mpsc::channel(config.command_capacity.max(1));
        let hub = Hub {
            sessions: HashMap::new(),
            rooms: HashMap::new(),
        };
        tokio::spawn(hub.run(rx));
        HubHandle {
            commands,
            config: Arc::new(config),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("hub coordinator started");
        while let Some(command) = commands.recv().await {
            match command {
                Command::Register {
                    session_id,
                    user_id,
                    outbound,
                    reply,
                } => {
                    debug!(%session_id, user_id = user_id.as_deref(), "session registered");
                    self.sessions.insert(
                        session_id,
                        Client {
                            user_id,
                            game_id: None,
                            outbound,
                        },
                    );
                    let _ = reply.send(());
                }
                Command::Unregister { session_id, reply } => {
                    let _ = reply.send(self.remove(session_id));
                }
                Command::Join {
                    session_id,
                    game_id,
                    reply,
                } => {
                    let _ = reply.send(self.join(session_id, game_id));
                }
                Command::Leave { session_id, reply } => {
                    let _ = reply.send(self.leave(session_id));
                }
                Command::Send {
                    session_id,
                    envelope,
                } => {
                    if let Some(text) = encode(&envelope) {
                        self.deliver(session_id, &text);
                    }
                }
                Command::BroadcastRoom { game_id, envelope } => {
                    self.broadcast_room(&game_id, &envelope);
                }
                Command::BroadcastAll { envelope } => {
                    let Some(text) = encode(&envelope) else {
                        continue;
                    };
                    let targets: Vec<SessionId> = self.sessions.keys().copied().collect();
                    for session_id in targets {
                        self.deliver(session_id, &text);
                    }
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
                Command::Shutdown { reply } => {
                    info!(sessions = self.sessions.len(), "hub shutting down");
                    self.sessions.clear();
                    self.rooms.clear();
                    let _ = reply.send(());
                    break;
                }
            }
        }
        info!("hub coordinator stopped");
    }

    fn join(&mut self, session_id: SessionId, game_id: String) -> HubResult<Option<String>> {
        let client = self
            .sessions
            .get_mut(&session_id)
            .ok_or(HubError::UnknownSession(session_id))?;
        if client.game_id.as_deref() == Some(game_id.as_str()) {
            return Ok(None);
        }
        let previous = client.game_id.replace(game_id.clone());
        debug!(%session_id, game_id, user_id = client.user_id.as_deref(), "session joined room");

        if let Some(previous) = &previous {
            self.leave_room(previous, session_id);
        }
        self.rooms.entry(game_id).or_default().insert(session_id);
        Ok(previous)
    }

    fn leave(&mut self, session_id: SessionId) -> HubResult<Option<String>> {
        let client = self
            .sessions
            .get_mut(&session_id)
            .ok_or(HubError::UnknownSession(session_id))?;
        let previous = client.game_id.take();
        if let Some(game_id) = &previous {
            self.leave_room(game_id, session_id);
        }
        Ok(previous)
    }

    fn leave_room(&mut self, game_id: &str, session_id: SessionId) {
        if let Some(members) = self.rooms.get_mut(game_id) {
            members.remove(&session_id);
            if members.is_empty() {
                self.rooms.remove(game_id);
                debug!(game_id, "room closed");
            }
        }
    }

    /// Drop a session from the registry and its room. Returns whether it was present.
    fn remove(&mut self, session_id: SessionId) -> bool {
        match self.sessions.remove(&session_id) {
            Some(client) => {
                if let Some(game_id) = &client.game_id {
                    self.leave_room(game_id, session_id);
                }
                debug!(%session_id, "session unregistered");
                true
            }
            None => false,
        }
    }

    fn broadcast_room(&mut self, game_id: &str, envelope: &Envelope) {
        let Some(members) = self.rooms.get(game_id) else {
            debug!(game_id, "broadcast to missing room dropped");
            return;
        };
        let targets: Vec<SessionId> = members.iter().copied().collect();
        let Some(text) = encode(envelope) else {
            return;
        };
        for session_id in targets {
            self.deliver(session_id, &text);
        }
    }

    fn deliver(&mut self, session_id: SessionId, text: &Arc<str>) {
        let Some(client) = self.sessions.get(&session_id) else {
            debug!(%session_id, "send to unknown session dropped");
            return;
        };
        match client.outbound.try_send(Arc::clone(text)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%session_id, "outbound queue full, disconnecting session");
                self.remove(session_id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%session_id, "outbound queue closed");
                self.remove(session_id);
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.sessions.len(),
            rooms: self
                .rooms
                .iter()
                .map(|(game_id, members)| (game_id.clone(), members.len()))
                .collect(),
        }
    }
}

fn encode(envelope: &Envelope) -> Option<Arc<str>> {
    match envelope.to_json() {
        Ok(text) => Some(Arc::from(text)),
        Err(err) => {
            warn!(error = %err, "failed to encode envelope");
            None
        }
    }
}

/// Handle to the coordinator. Cheap to clone; the only way to reach the registry.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    config: Arc<HubConfig>,
}

impl HubHandle {
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Whether the coordinator has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Add a session. Returns its id and the queue its writer drains.
    pub async fn register(&self, user_id: Option<String>) -> HubResult<(SessionId, OutboundQueue)> {
        let session_id = Uuid::new_v4();
        let (outbound, queue) = mpsc::channel(self.config.outbound_capacity.max(1));
        self.request(|reply| Command::Register {
            session_id,
            user_id,
            outbound,
            reply,
        })
        .await?;
        Ok((session_id, queue))
    }

    /// Remove a session from the registry and its room.
    ///
    /// Idempotent: returns `false` when the session was already gone.
    pub async fn unregister(&self, session_id: SessionId) -> HubResult<bool> {
        self.request(|reply| Command::Unregister { session_id, reply })
            .await
    }

    /// Move a session into a game's room, leaving its previous one.
    /// Returns the room it left.
    pub async fn join(&self, session_id: SessionId, game_id: &str) -> HubResult<Option<String>> {
        let game_id = game_id.to_string();
        self.request(|reply| Command::Join {
            session_id,
            game_id,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, session_id: SessionId) -> HubResult<Option<String>> {
        self.request(|reply| Command::Leave { session_id, reply })
            .await?
    }

    pub async fn send_to(&self, session_id: SessionId, envelope: Envelope) -> HubResult<()> {
        self.submit(Command::Send {
            session_id,
            envelope,
        })
        .await
    }

    /// Queue a broadcast to a room. A missing room is not an error.
    pub async fn broadcast_room(&self, game_id: &str, envelope: Envelope) -> HubResult<()> {
        self.submit(Command::BroadcastRoom {
            game_id: game_id.to_string(),
            envelope,
        })
        .await
    }

    /// Non-blocking [`broadcast_room`](Self::broadcast_room) for synchronous callers.
    pub fn try_broadcast_room(&self, game_id: &str, envelope: Envelope) -> HubResult<()> {
        self.commands
            .try_send(Command::BroadcastRoom {
                game_id: game_id.to_string(),
                envelope,
            })
            .map_err(|err| match err {
                TrySendError::Full(_) => HubError::Transport("hub command queue full".to_string()),
                TrySendError::Closed(_) => HubError::Shutdown,
            })
    }

    pub async fn broadcast_all(&self, envelope: Envelope) -> HubResult<()> {
        self.submit(Command::BroadcastAll { envelope }).await
    }

    pub async fn stats(&self) -> HubResult<HubStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Stop the coordinator. Every session's outbound queue closes.
    pub async fn shutdown(&self) -> HubResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    async fn submit(&self, command: Command) -> HubResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HubError::Shutdown)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> HubResult<T> {
        let (reply, rx) = oneshot::channel();
        self.submit(make(reply)).await?;
        rx.await.map_err(|_| HubError::Shutdown)
    }
}

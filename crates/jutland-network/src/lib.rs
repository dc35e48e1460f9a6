//! Jutland Realtime Layer
//!
//! This crate keeps connected clients in step with the game-state core:
//! - **Hub**: one coordinator task owning the session registry and rooms
//! - **Sessions**: a reader/writer pair per connection with liveness pings
//! - **Protocol**: the JSON message envelope clients speak
//!
//! # Architecture
//!
//! Sessions never touch shared maps. They send commands to the hub through a
//! [`HubHandle`]; the hub pushes serialized envelopes into each session's
//! bounded outbound queue. A room is the set of sessions that joined one game
//! id; core events reach it through [`HubEventSink`].
//!
//! # Modules
//!
//! - [`hub`]: Coordinator task, rooms and broadcast
//! - [`session`]: Per-connection reader and writer loops
//! - [`protocol`]: Message envelope
//! - [`transport`]: Frame source/sink traits and an in-memory transport
//! - [`handler`]: `game_action` handler trait and the hub-backed event sink

// Re-export core types
pub use jutland_core;

pub mod error;
pub mod handler;
pub mod hub;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::{ActionError, HubError, HubResult};
pub use handler::{ActionContext, ActionHandler, HubEventSink, RejectActions};
pub use hub::{Hub, HubConfig, HubHandle, HubStats, OutboundQueue, SessionId};
pub use protocol::{Envelope, MessageType};
pub use session::{Session, SessionState};
pub use transport::{
    memory_transport, ChannelSink, ChannelSource, Frame, FrameSink, FrameSource, MemoryClient,
};
